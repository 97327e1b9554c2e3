//! Double-spend attempt notification
//!
//! When the mempool sees two transactions spending the same output, this
//! module decides whether either of them asked to be told about it, checks
//! the double-spend's script and reports the conflict to the registered
//! endpoints.
//!
//! # Components
//! - Leaky-bucket counters for peer suspension and slow endpoints
//! - Endpoint blacklist and notified-transaction ledger
//! - Memory-bounded submission queue
//! - Candidate resolution, script validation, proof delivery
//! - Fast and slow worker pools behind [`DoubleSpendHandler`]

pub mod blacklist;
pub mod callback;
pub mod config;
pub mod counter;
pub mod handler;
pub mod ledger;
pub mod pool;
pub mod queue;
pub mod resolver;
pub mod sender;
pub mod slow_endpoint;
pub mod suspension;
pub mod transport;
pub mod validator;

#[cfg(test)]
pub(crate) mod testing;

pub use crate::network::NodeId;

pub use blacklist::EndpointBlacklist;
pub use callback::{CallbackError, DsCallbackMsg, SUPPORTED_VERSION};
pub use config::{ConfigError, DoubleSpendConfig, NotificationLevel};
pub use counter::DecayingCounter;
pub use handler::{DoubleSpendHandler, HandlerStats, SharedState, INVALID_PROOF_PENALTY};
pub use ledger::NotifiedTxnLedger;
pub use pool::{PoolError, WorkerPool, WorkerPools};
pub use queue::{DoubleSpendEvent, SubmissionQueue};
pub use resolver::{NotificationCandidate, NotificationResolver, ResolveError, ScriptDetails};
pub use sender::{EndpointResult, NotificationSender, NotificationSummary, SendError, SubmitOutcome};
pub use slow_endpoint::SlowEndpointTracker;
pub use suspension::SuspensionTracker;
pub use transport::{
    EndpointResponse, HttpTransport, NotificationTransport, SubmitRequest, TransportError,
    DSNT_HEADER,
};
pub use validator::{
    ScriptInterpreter, ScriptValidator, ValidationDeadline, ValidationOutcome, ValidationState,
};
