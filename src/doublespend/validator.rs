//! Deadline-bounded script validation of double-spend proofs

use crate::core::{ChainParams, ScriptError, ScriptVerifyFlags, Transaction};
use crate::doublespend::queue::DoubleSpendEvent;
use crate::doublespend::resolver::{NotificationCandidate, ScriptDetails};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Outcome of mempool acceptance checks, passed in with a detected double-spend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationState {
    /// Scripts of the double-spend transaction were verified during acceptance
    pub scripts_checked: bool,
}

impl ValidationState {
    pub fn checked() -> Self {
        Self {
            scripts_checked: true,
        }
    }
}

/// Cancellation token that also trips once a wall-clock deadline passes
#[derive(Debug, Clone)]
pub struct ValidationDeadline {
    token: CancellationToken,
    deadline: Instant,
}

impl ValidationDeadline {
    pub fn new(budget: Duration) -> Self {
        Self::with_token(CancellationToken::new(), budget)
    }

    pub fn with_token(token: CancellationToken, budget: Duration) -> Self {
        Self {
            token,
            deadline: Instant::now() + budget,
        }
    }

    /// Interpreters poll this between opcodes
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || Instant::now() >= self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// Script interpreter used to check a double-spend input
///
/// Implementations must return [`ScriptError::Cancelled`] when
/// `deadline.is_cancelled()` stops execution, never a verification failure.
pub trait ScriptInterpreter: Send + Sync {
    fn verify(
        &self,
        tx: &Transaction,
        input_index: usize,
        details: &ScriptDetails,
        flags: ScriptVerifyFlags,
        deadline: &ValidationDeadline,
    ) -> Result<(), ScriptError>;
}

/// Result of validating one notification candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid,
    /// The double-spend input does not satisfy its locking script
    Invalid(ScriptError),
    /// The deadline or a policy limit stopped validation
    Cancelled,
    /// The interpreter itself failed; says nothing about the relaying peer
    Aborted,
}

/// Runs the interpreter off the async workers with a validation deadline
#[derive(Clone)]
pub struct ScriptValidator {
    interpreter: Arc<dyn ScriptInterpreter>,
    params: ChainParams,
    max_duration: Duration,
}

impl ScriptValidator {
    pub fn new(
        interpreter: Arc<dyn ScriptInterpreter>,
        params: ChainParams,
        max_duration: Duration,
    ) -> Self {
        Self {
            interpreter,
            params,
            max_duration,
        }
    }

    pub async fn validate(
        &self,
        event: &DoubleSpendEvent,
        candidate: &NotificationCandidate,
    ) -> ValidationOutcome {
        if event.scripts_already_checked {
            return ValidationOutcome::Valid;
        }

        let details = candidate.script_details.clone();
        let flags = self
            .params
            .script_flags(details.spend_height, details.coin_height);
        let tx = event.double_spend_txn.clone();
        let input_index = candidate.double_spend_input as usize;
        let interpreter = self.interpreter.clone();
        let deadline = ValidationDeadline::new(self.max_duration);

        let result = tokio::task::spawn_blocking(move || {
            interpreter.verify(&tx, input_index, &details, flags, &deadline)
        })
        .await;

        match result {
            Ok(Ok(())) => ValidationOutcome::Valid,
            Ok(Err(e)) if e.is_cancelled() => ValidationOutcome::Cancelled,
            Ok(Err(e)) => ValidationOutcome::Invalid(e),
            Err(e) => {
                log::error!(
                    "Script check of {} input {} aborted: {}",
                    event.double_spend_txn.txid(),
                    input_index,
                    e
                );
                ValidationOutcome::Aborted
            }
        }
    }
}
