//! Double-spend handler
//!
//! Entry point for the mempool: queues each detected double-spend and lets
//! the fast pool resolve, validate and report it.

use crate::core::{ChainParams, CoinsView, TransactionRef, TxId};
use crate::doublespend::blacklist::EndpointBlacklist;
use crate::doublespend::config::{ConfigError, DoubleSpendConfig, NotificationLevel};
use crate::doublespend::ledger::NotifiedTxnLedger;
use crate::doublespend::pool::WorkerPools;
use crate::doublespend::queue::{DoubleSpendEvent, SubmissionQueue};
use crate::doublespend::resolver::NotificationResolver;
use crate::doublespend::sender::NotificationSender;
use crate::doublespend::slow_endpoint::SlowEndpointTracker;
use crate::doublespend::suspension::SuspensionTracker;
use crate::doublespend::transport::NotificationTransport;
use crate::doublespend::validator::{
    ScriptInterpreter, ScriptValidator, ValidationOutcome, ValidationState,
};
use crate::network::{NodeId, PeerMisbehavior};
use parking_lot::Mutex;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

/// Ban score added for relaying a double-spend with an invalid script
pub const INVALID_PROOF_PENALTY: u32 = 10;

// =============================================================================
// Shared State
// =============================================================================

/// Everything the handler mutates, behind one lock
#[derive(Debug)]
pub struct SharedState {
    pub(crate) queue: SubmissionQueue,
    pub(crate) suspension: SuspensionTracker,
    pub(crate) slow_endpoints: SlowEndpointTracker,
    pub(crate) ledger: NotifiedTxnLedger,
    pub(crate) blacklist: EndpointBlacklist,
}

impl SharedState {
    pub fn new(config: &DoubleSpendConfig) -> Self {
        Self {
            queue: SubmissionQueue::new(config.queue_max_memory_bytes),
            suspension: SuspensionTracker::new(),
            slow_endpoints: SlowEndpointTracker::new(config.slow_timeouts_per_hour),
            ledger: NotifiedTxnLedger::new(config.notified_txn_capacity),
            blacklist: EndpointBlacklist::new(config.blacklist_capacity),
        }
    }
}

/// Snapshot of the handler's bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HandlerStats {
    pub queued_events: usize,
    pub queued_memory_bytes: usize,
    pub notified_txns: usize,
    pub blacklisted_endpoints: usize,
    pub tracked_slow_endpoints: usize,
    pub tracked_peers: usize,
}

// =============================================================================
// Handler
// =============================================================================

#[derive(Clone)]
pub struct DoubleSpendHandler {
    inner: Arc<HandlerInner>,
}

struct HandlerInner {
    config: DoubleSpendConfig,
    state: Arc<Mutex<SharedState>>,
    pools: WorkerPools,
    resolver: NotificationResolver,
    validator: ScriptValidator,
    sender: NotificationSender,
    misbehavior: Arc<dyn PeerMisbehavior>,
}

impl DoubleSpendHandler {
    /// Build the handler and start its worker pools
    ///
    /// Must be called from within a tokio runtime unless notifications are
    /// switched off.
    pub fn new(
        config: DoubleSpendConfig,
        params: ChainParams,
        coins: Arc<dyn CoinsView>,
        interpreter: Arc<dyn ScriptInterpreter>,
        transport: Arc<dyn NotificationTransport>,
        misbehavior: Arc<dyn PeerMisbehavior>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let pools = if config.is_enabled() {
            WorkerPools::from_config(&config)
        } else {
            log::info!("Double-spend notifications disabled");
            WorkerPools::disabled()
        };

        let state = Arc::new(Mutex::new(SharedState::new(&config)));
        let resolver = NotificationResolver::new(coins, params);
        let validator =
            ScriptValidator::new(interpreter, params, config.max_validation_duration());
        let sender = NotificationSender::new(&config, transport, state.clone(), pools.slow.clone());

        Ok(Self {
            inner: Arc::new(HandlerInner {
                config,
                state,
                pools,
                resolver,
                validator,
                sender,
                misbehavior,
            }),
        })
    }

    /// Queue a detected double-spend for processing
    ///
    /// Never blocks and never fails; events that cannot be queued are
    /// dropped and logged.
    pub fn handle_double_spend(
        &self,
        double_spend_txn: TransactionRef,
        conflicting_txns: Vec<TransactionRef>,
        validation_state: &ValidationState,
        sender_peer: NodeId,
    ) {
        if !self.inner.config.is_enabled() {
            return;
        }
        let Some(fast) = &self.inner.pools.fast else {
            return;
        };
        if conflicting_txns.is_empty() {
            return;
        }

        let event = DoubleSpendEvent::new(
            double_spend_txn,
            conflicting_txns,
            validation_state.scripts_checked,
            sender_peer,
        );
        if !self.inner.state.lock().queue.enqueue(event) {
            return;
        }

        let handler = self.clone();
        if let Err(e) = fast.submit(async move { handler.process_next_event().await }) {
            // One task per queued event; give back the one just queued
            let dropped = self.inner.state.lock().queue.pop_back();
            log::warn!(
                "Failed to schedule double-spend processing: {}; dropped event for {:?}",
                e,
                dropped.map(|ev| ev.double_spend_txn.txid())
            );
        }
    }

    async fn process_next_event(&self) {
        let event = self.inner.state.lock().queue.dequeue_front();
        if let Some(event) = event {
            self.process_event(event).await;
        }
    }

    async fn process_event(&self, event: DoubleSpendEvent) {
        let peer = event.sender_peer;
        let std_inputs_only = match self.inner.config.notification_level {
            NotificationLevel::All => self.inner.state.lock().suspension.is_suspended(peer),
            _ => true,
        };

        for conflicting in &event.conflicting_txns {
            let Some(candidate) =
                self.inner
                    .resolver
                    .resolve(conflicting, &event.double_spend_txn, std_inputs_only)
            else {
                continue;
            };

            let enabled_txid = candidate.ds_enabled_txn.txid();
            if self.inner.state.lock().ledger.contains(&enabled_txid) {
                log::debug!("Already notified about double-spend of {}", enabled_txid);
                continue;
            }

            match self.inner.validator.validate(&event, &candidate).await {
                ValidationOutcome::Valid => {
                    let summary = self.inner.sender.send_notification(candidate).await;
                    log::debug!("Double-spend of {} handled: {:?}", enabled_txid, summary);
                }
                ValidationOutcome::Invalid(e) => {
                    let reason = format!(
                        "invalid double-spend {}: {}",
                        event.double_spend_txn.txid(),
                        e
                    );
                    log::warn!("Peer {} sent {}", peer, reason);
                    self.inner
                        .misbehavior
                        .misbehaving(peer, INVALID_PROOF_PENALTY, &reason);
                    return;
                }
                ValidationOutcome::Aborted => continue,
                ValidationOutcome::Cancelled => {
                    let suspended = self.inner.state.lock().suspension.record_cancellation(peer);
                    if suspended {
                        log::info!(
                            "Peer {} suspended to standard inputs after validation timeouts",
                            peer
                        );
                    } else {
                        log::info!(
                            "Validation of double-spend {} from peer {} cancelled",
                            event.double_spend_txn.txid(),
                            peer
                        );
                    }
                    return;
                }
            }
        }
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn config(&self) -> &DoubleSpendConfig {
        &self.inner.config
    }

    pub fn queued_events(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn queued_memory(&self) -> usize {
        self.inner.state.lock().queue.memory_bytes()
    }

    pub fn is_notified(&self, txid: &TxId) -> bool {
        self.inner.state.lock().ledger.contains(txid)
    }

    pub fn is_blacklisted(&self, endpoint: &SocketAddr) -> bool {
        self.inner
            .state
            .lock()
            .blacklist
            .is_blacklisted(&endpoint.to_string())
    }

    pub fn is_slow(&self, endpoint: &SocketAddr) -> bool {
        self.inner
            .state
            .lock()
            .slow_endpoints
            .is_slow(&endpoint.to_string())
    }

    pub fn is_suspended(&self, peer: NodeId) -> bool {
        self.inner.state.lock().suspension.is_suspended(peer)
    }

    pub fn stats(&self) -> HandlerStats {
        let state = self.inner.state.lock();
        HandlerStats {
            queued_events: state.queue.len(),
            queued_memory_bytes: state.queue.memory_bytes(),
            notified_txns: state.ledger.len(),
            blacklisted_endpoints: state.blacklist.len(),
            tracked_slow_endpoints: state.slow_endpoints.len(),
            tracked_peers: state.suspension.len(),
        }
    }

    #[cfg(test)]
    pub(crate) fn pools(&self) -> &WorkerPools {
        &self.inner.pools
    }
}

// =============================================================================
// Tests
// =============================================================================
