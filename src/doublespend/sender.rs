//! Delivery of double-spend proofs to callback endpoints
//!
//! Every callback address is contacted inline from the fast pool with a short
//! timeout. An endpoint that times out is handed to the slow pool, which
//! retries with a long timeout and its own attempt budget. Endpoints that
//! break the protocol are blacklisted.

use crate::doublespend::config::DoubleSpendConfig;
use crate::doublespend::handler::SharedState;
use crate::doublespend::pool::WorkerPool;
use crate::doublespend::resolver::NotificationCandidate;
use crate::doublespend::transport::{NotificationTransport, SubmitRequest, TransportError};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Notification errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("Endpoint {endpoint} violated the notification protocol: {reason}")]
    ProtocolViolation { endpoint: SocketAddr, reason: String },
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Result of one QUERY/SUBMIT exchange
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub submitted: bool,
    pub wants_proof: bool,
    pub retry: bool,
}

impl SubmitOutcome {
    fn not_wanted() -> Self {
        Self::default()
    }
}

/// How notifying one endpoint ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointResult {
    Submitted,
    NotWanted,
    TimedOut,
    Failed,
}

/// Per-call tally, mostly for logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationSummary {
    /// Endpoints tried inline
    pub contacted: usize,
    pub submitted: usize,
    pub not_wanted: usize,
    /// Endpoints handed to the slow pool
    pub escalated: usize,
    pub skipped: usize,
}

enum Route {
    Fast,
    Slow,
    Skip(&'static str),
}

#[derive(Clone)]
pub struct NotificationSender {
    inner: Arc<SenderInner>,
}

struct SenderInner {
    transport: Arc<dyn NotificationTransport>,
    state: Arc<Mutex<SharedState>>,
    slow_pool: Option<WorkerPool>,
    max_submit_attempts: u32,
    fast_timeout: Duration,
    slow_timeout: Duration,
    max_endpoints: usize,
    port: u16,
    skip_list: HashSet<IpAddr>,
    blacklist_duration: Duration,
}

impl NotificationSender {
    pub fn new(
        config: &DoubleSpendConfig,
        transport: Arc<dyn NotificationTransport>,
        state: Arc<Mutex<SharedState>>,
        slow_pool: Option<WorkerPool>,
    ) -> Self {
        Self {
            inner: Arc::new(SenderInner {
                transport,
                state,
                slow_pool,
                max_submit_attempts: config.max_submit_attempts,
                fast_timeout: config.endpoint_fast_timeout(),
                slow_timeout: config.endpoint_slow_timeout(),
                max_endpoints: config.max_endpoints_per_txn,
                port: config.endpoint_port,
                skip_list: config.endpoint_skip_list.iter().copied().collect(),
                blacklist_duration: config.blacklist_duration(),
            }),
        }
    }

    /// Send the proof in `candidate` to each of its callback endpoints
    pub async fn send_notification(&self, candidate: NotificationCandidate) -> NotificationSummary {
        let mut summary = NotificationSummary::default();
        let txid = candidate.ds_enabled_txn.txid();

        if self.inner.state.lock().ledger.contains(&txid) {
            log::debug!("Already notified about double-spend of {}", txid);
            return summary;
        }

        let proof = Bytes::from(candidate.conflicting_txn.to_bytes());
        let candidate = Arc::new(candidate);
        let mut seen = HashSet::new();

        for ip in &candidate.callback_message.addresses {
            if !seen.insert(*ip) {
                continue;
            }
            if seen.len() > self.inner.max_endpoints {
                log::debug!(
                    "Callback message of {} lists more than {} endpoints, ignoring the rest",
                    txid,
                    self.inner.max_endpoints
                );
                break;
            }

            let endpoint = SocketAddr::new(*ip, self.inner.port);
            match self.route(&endpoint) {
                Route::Skip(reason) => {
                    log::debug!("Skipping {} endpoint {}", reason, endpoint);
                    summary.skipped += 1;
                    continue;
                }
                Route::Slow => {
                    if self.escalate(endpoint, candidate.clone(), proof.clone()) {
                        summary.escalated += 1;
                    }
                    continue;
                }
                Route::Fast => {}
            }

            summary.contacted += 1;
            let result = self
                .run_attempts(endpoint, &candidate, &proof, self.inner.fast_timeout, true)
                .await;
            match result {
                EndpointResult::Submitted => summary.submitted += 1,
                EndpointResult::NotWanted => summary.not_wanted += 1,
                EndpointResult::TimedOut => {
                    if self.escalate(endpoint, candidate.clone(), proof.clone()) {
                        summary.escalated += 1;
                    }
                }
                EndpointResult::Failed => {}
            }
        }

        if summary.submitted > 0 || summary.not_wanted > 0 {
            self.inner.state.lock().ledger.record(txid);
        }
        summary
    }

    /// One QUERY and, if the endpoint is interested, one SUBMIT
    pub async fn query_and_submit_proof(
        &self,
        endpoint: SocketAddr,
        candidate: &NotificationCandidate,
        proof: Bytes,
        timeout: Duration,
    ) -> Result<SubmitOutcome, SendError> {
        let txid = candidate.ds_enabled_txn.txid();

        let response = self.inner.transport.query(endpoint, &txid, timeout).await?;
        let Some(wants_proof) = response.wants_proof else {
            return Err(self.protocol_violation(endpoint, "query response without interest header"));
        };
        if response.is_bad_request() {
            return Ok(SubmitOutcome::not_wanted());
        }
        if !response.is_ok() {
            return Err(self.protocol_violation(
                endpoint,
                &format!("unexpected query status {}", response.status),
            ));
        }
        if !wants_proof {
            return Ok(SubmitOutcome::not_wanted());
        }

        let request = SubmitRequest {
            txid,
            input: candidate.ds_enabled_input,
            conflicting_txid: candidate.conflicting_txn.txid(),
            conflicting_input: candidate.conflicting_input,
        };
        let response = self
            .inner
            .transport
            .submit(endpoint, &request, proof, timeout)
            .await?;
        let Some(wants_proof) = response.wants_proof else {
            return Err(
                self.protocol_violation(endpoint, "submit response without interest header")
            );
        };

        let submitted = response.is_ok();
        Ok(SubmitOutcome {
            submitted,
            wants_proof,
            retry: !submitted && wants_proof,
        })
    }

    async fn run_attempts(
        &self,
        endpoint: SocketAddr,
        candidate: &NotificationCandidate,
        proof: &Bytes,
        timeout: Duration,
        stop_on_timeout: bool,
    ) -> EndpointResult {
        let txid = candidate.ds_enabled_txn.txid();
        let attempts = self.inner.max_submit_attempts;

        for attempt in 1..=attempts {
            match self
                .query_and_submit_proof(endpoint, candidate, proof.clone(), timeout)
                .await
            {
                Ok(outcome) if outcome.submitted => {
                    log::info!("Sent double-spend proof for {} to {}", txid, endpoint);
                    return EndpointResult::Submitted;
                }
                Ok(outcome) if !outcome.wants_proof => {
                    log::debug!("Endpoint {} does not want proof for {}", endpoint, txid);
                    return EndpointResult::NotWanted;
                }
                Ok(outcome) if outcome.retry => {
                    log::debug!(
                        "Endpoint {} asked for a retry ({} of {})",
                        endpoint,
                        attempt,
                        attempts
                    );
                }
                Ok(_) => return EndpointResult::Failed,
                Err(SendError::Transport(TransportError::Timeout)) => {
                    self.record_timeout(&endpoint);
                    if stop_on_timeout {
                        return EndpointResult::TimedOut;
                    }
                    log::debug!(
                        "Endpoint {} timed out ({} of {})",
                        endpoint,
                        attempt,
                        attempts
                    );
                }
                Err(SendError::Transport(e)) => {
                    log::debug!(
                        "Notification to {} failed ({} of {}): {}",
                        endpoint,
                        attempt,
                        attempts,
                        e
                    );
                }
                Err(e) => {
                    log::warn!("{}", e);
                    return EndpointResult::Failed;
                }
            }
        }

        log::debug!("Giving up on {} after {} attempts", endpoint, attempts);
        EndpointResult::Failed
    }

    /// Retry `endpoint` from the slow pool with a full attempt budget
    fn escalate(
        &self,
        endpoint: SocketAddr,
        candidate: Arc<NotificationCandidate>,
        proof: Bytes,
    ) -> bool {
        let Some(pool) = &self.inner.slow_pool else {
            log::debug!("Slow pool disabled, not retrying {}", endpoint);
            return false;
        };

        let sender = self.clone();
        let task = async move {
            sender.notify_slow(endpoint, &candidate, proof).await;
        };
        match pool.submit(task) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Failed to schedule slow notification to {}: {}", endpoint, e);
                false
            }
        }
    }

    async fn notify_slow(
        &self,
        endpoint: SocketAddr,
        candidate: &NotificationCandidate,
        proof: Bytes,
    ) -> EndpointResult {
        if self.is_blacklisted(&endpoint) {
            return EndpointResult::Failed;
        }

        let result = self
            .run_attempts(endpoint, candidate, &proof, self.inner.slow_timeout, false)
            .await;
        if matches!(result, EndpointResult::Submitted | EndpointResult::NotWanted) {
            self.inner
                .state
                .lock()
                .ledger
                .record(candidate.ds_enabled_txn.txid());
        }
        result
    }

    fn route(&self, endpoint: &SocketAddr) -> Route {
        if self.inner.skip_list.contains(&endpoint.ip()) {
            return Route::Skip("skip-listed");
        }

        let addr = endpoint.to_string();
        let state = self.inner.state.lock();
        if state.blacklist.is_blacklisted(&addr) {
            Route::Skip("blacklisted")
        } else if state.slow_endpoints.is_slow(&addr) {
            Route::Slow
        } else {
            Route::Fast
        }
    }

    fn is_blacklisted(&self, endpoint: &SocketAddr) -> bool {
        self.inner
            .state
            .lock()
            .blacklist
            .is_blacklisted(&endpoint.to_string())
    }

    fn record_timeout(&self, endpoint: &SocketAddr) {
        let addr = endpoint.to_string();
        let mut state = self.inner.state.lock();
        let was_slow = state.slow_endpoints.is_slow(&addr);
        state.slow_endpoints.record_timeout(&addr);
        if !was_slow && state.slow_endpoints.is_slow(&addr) {
            log::info!("Endpoint {} marked slow", addr);
        }
    }

    fn protocol_violation(&self, endpoint: SocketAddr, reason: &str) -> SendError {
        let expiry = Instant::now() + self.inner.blacklist_duration;
        self.inner
            .state
            .lock()
            .blacklist
            .add(&endpoint.to_string(), expiry);
        log::info!("Blacklisted endpoint {}: {}", endpoint, reason);

        SendError::ProtocolViolation {
            endpoint,
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doublespend::testing::{endpoint, wait_for, CallKind, Fixture, CALLBACK_IP};
    use crate::doublespend::transport::EndpointResponse;
    use crate::doublespend::validator::ValidationState;

    fn reply(status: u16, wants_proof: Option<bool>) -> Result<EndpointResponse, TransportError> {
        Ok(EndpointResponse::new(status, wants_proof))
    }

    #[tokio::test]
    async fn test_interested_endpoint_gets_proof() {
        let fixture = Fixture::new();
        let config = DoubleSpendConfig::default();
        let (sender, state) = fixture.sender(&config);
        let (_, candidate) = fixture.candidate(ValidationState::default());
        let txid = candidate.ds_enabled_txn.txid();
        let proof_len = candidate.conflicting_txn.serialized_size();

        let summary = sender.send_notification(candidate.clone()).await;
        assert_eq!(summary.submitted, 1);
        assert!(state.lock().ledger.contains(&txid));
        assert!(state.lock().blacklist.is_empty());

        let calls = fixture.transport.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].kind, CallKind::Query);
        assert_eq!(calls[1].kind, CallKind::Submit);
        assert_eq!(calls[1].proof_len, proof_len);
        assert_eq!(calls[1].timeout, config.endpoint_fast_timeout());
        let request = calls[1].request.unwrap();
        assert_eq!(request.conflicting_txid, candidate.conflicting_txn.txid());
        assert_eq!(request.input, candidate.ds_enabled_input);

        // Second call is a no-op
        sender.send_notification(candidate).await;
        assert_eq!(fixture.transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_not_interested_recorded_without_submit() {
        let fixture = Fixture::new();
        let (sender, state) = fixture.sender(&DoubleSpendConfig::default());
        fixture.transport.set_query(endpoint(CALLBACK_IP), reply(200, Some(false)));
        let (_, candidate) = fixture.candidate(ValidationState::default());
        let txid = candidate.ds_enabled_txn.txid();

        let summary = sender.send_notification(candidate).await;
        assert_eq!(summary.not_wanted, 1);
        assert!(state.lock().ledger.contains(&txid));
        assert_eq!(fixture.transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_request_tolerated() {
        let fixture = Fixture::new();
        let (sender, state) = fixture.sender(&DoubleSpendConfig::default());
        fixture.transport.set_query(endpoint(CALLBACK_IP), reply(400, Some(true)));
        let (_, candidate) = fixture.candidate(ValidationState::default());

        let timeout = Duration::from_secs(1);

        let outcome = sender
            .query_and_submit_proof(endpoint(CALLBACK_IP), &candidate, Bytes::new(), timeout)
            .await
            .unwrap();
        assert_eq!(outcome, SubmitOutcome::default());
        assert!(state.lock().blacklist.is_empty());
    }

    #[tokio::test]
    async fn test_query_violations_blacklist() {
        let violations = [
            reply(200, None),
            reply(500, Some(true)),
            reply(301, Some(true)),
            reply(400, None),
        ];
        for bad in violations {
            let fixture = Fixture::new();
            let (sender, state) = fixture.sender(&DoubleSpendConfig::default());
            let target = endpoint(CALLBACK_IP);
            fixture.transport.set_query(target, bad);
            let (_, candidate) = fixture.candidate(ValidationState::default());
            let txid = candidate.ds_enabled_txn.txid();

            let summary = sender.send_notification(candidate.clone()).await;
            assert_eq!(summary.submitted, 0);
            assert!(state.lock().blacklist.is_blacklisted(&target.to_string()));
            assert!(!state.lock().ledger.contains(&txid));
            assert_eq!(fixture.transport.calls().len(), 1);

            // Blacklisted endpoints are not contacted again
            let summary = sender.send_notification(candidate).await;
            assert_eq!(summary.skipped, 1);
            assert_eq!(fixture.transport.calls().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_redirected_query_blacklists() {
        let fixture = Fixture::new();
        let (sender, state) = fixture.sender(&DoubleSpendConfig::default());
        let target = endpoint(CALLBACK_IP);
        fixture.transport.set_query(target, reply(302, Some(true)));
        let (_, candidate) = fixture.candidate(ValidationState::default());

        let err = sender
            .query_and_submit_proof(target, &candidate, Bytes::new(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SendError::ProtocolViolation {
                endpoint: target,
                reason: "unexpected query status 302".to_string(),
            }
        );
        assert!(state.lock().blacklist.is_blacklisted(&target.to_string()));
        assert_eq!(fixture.transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_without_header_is_violation() {
        let fixture = Fixture::new();
        let (sender, state) = fixture.sender(&DoubleSpendConfig::default());
        let target = endpoint(CALLBACK_IP);
        fixture.transport.push_submit(target, reply(200, None));
        let (_, candidate) = fixture.candidate(ValidationState::default());

        let err = sender
            .query_and_submit_proof(target, &candidate, Bytes::new(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::ProtocolViolation { .. }));
        assert!(state.lock().blacklist.is_blacklisted(&target.to_string()));
    }

    #[tokio::test]
    async fn test_submit_retry_then_success() {
        let fixture = Fixture::new();
        let (sender, state) = fixture.sender(&DoubleSpendConfig::default());
        let target = endpoint(CALLBACK_IP);
        fixture.transport.push_submit(target, reply(500, Some(true)));
        fixture.transport.push_submit(target, reply(200, Some(true)));
        let (_, candidate) = fixture.candidate(ValidationState::default());
        let txid = candidate.ds_enabled_txn.txid();

        let summary = sender.send_notification(candidate).await;
        assert_eq!(summary.submitted, 1);
        assert_eq!(fixture.transport.calls().len(), 4);
        assert!(state.lock().ledger.contains(&txid));
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let fixture = Fixture::new();
        let config = DoubleSpendConfig::default();
        let (sender, state) = fixture.sender(&config);
        let target = endpoint(CALLBACK_IP);
        for _ in 0..config.max_submit_attempts {
            fixture.transport.push_submit(target, reply(503, Some(true)));
        }
        let (_, candidate) = fixture.candidate(ValidationState::default());
        let txid = candidate.ds_enabled_txn.txid();

        let summary = sender.send_notification(candidate).await;
        assert_eq!(summary.submitted, 0);
        assert_eq!(
            fixture.transport.calls().len(),
            2 * config.max_submit_attempts as usize
        );
        assert!(!state.lock().ledger.contains(&txid));
        assert!(state.lock().blacklist.is_empty());
    }

    #[tokio::test]
    async fn test_submit_declined_stops() {
        let fixture = Fixture::new();
        let (sender, state) = fixture.sender(&DoubleSpendConfig::default());
        let target = endpoint(CALLBACK_IP);
        fixture.transport.push_submit(target, reply(500, Some(false)));
        let (_, candidate) = fixture.candidate(ValidationState::default());
        let txid = candidate.ds_enabled_txn.txid();

        let summary = sender.send_notification(candidate).await;
        assert_eq!(summary.not_wanted, 1);
        assert_eq!(fixture.transport.calls().len(), 2);
        assert!(state.lock().ledger.contains(&txid));
    }

    #[tokio::test]
    async fn test_connection_errors_retried_inline() {
        let fixture = Fixture::new();
        let config = DoubleSpendConfig::default();
        let (sender, state) = fixture.sender(&config);
        let target = endpoint(CALLBACK_IP);
        fixture
            .transport
            .set_query(target, Err(TransportError::Connect("refused".to_string())));
        let (_, candidate) = fixture.candidate(ValidationState::default());

        let summary = sender.send_notification(candidate).await;
        assert_eq!(summary.escalated, 0);
        assert_eq!(
            fixture.transport.calls().len(),
            config.max_submit_attempts as usize
        );
        assert!(state.lock().slow_endpoints.is_empty());
        assert!(state.lock().blacklist.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_timeout_escalates_to_slow_pool() {
        let fixture = Fixture::new();
        let config = DoubleSpendConfig::default();
        let (sender, state) = fixture.sender(&config);
        let target = endpoint(CALLBACK_IP);
        fixture.transport.set_query(target, Err(TransportError::Timeout));
        let (_, candidate) = fixture.candidate(ValidationState::default());

        let summary = sender.send_notification(candidate).await;
        assert_eq!(summary.contacted, 1);
        assert_eq!(summary.escalated, 1);
        assert_eq!(state.lock().slow_endpoints.len(), 1);

        // One inline attempt plus a full slow budget
        let expected = 1 + config.max_submit_attempts as usize;
        assert!(wait_for(|| fixture.transport.calls().len() == expected).await);
        let calls = fixture.transport.calls();
        assert_eq!(calls[0].timeout, config.endpoint_fast_timeout());
        assert!(calls[1..]
            .iter()
            .all(|c| c.timeout == config.endpoint_slow_timeout()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_endpoint_goes_straight_to_slow_pool() {
        let fixture = Fixture::new();
        let config = DoubleSpendConfig {
            slow_timeouts_per_hour: 1,
            ..Default::default()
        };
        let (sender, state) = fixture.sender(&config);
        let target = endpoint(CALLBACK_IP);

        fixture.transport.set_query(target, Err(TransportError::Timeout));
        let (_, first) = fixture.candidate(ValidationState::default());
        sender.send_notification(first).await;
        assert!(state.lock().slow_endpoints.is_slow(&target.to_string()));

        fixture.transport.set_query(target, reply(200, Some(true)));
        let (_, second) = fixture.candidate(ValidationState::default());
        let txid = second.ds_enabled_txn.txid();

        let summary = sender.send_notification(second).await;
        assert_eq!(summary.contacted, 0);
        assert_eq!(summary.escalated, 1);
        assert!(wait_for(|| state.lock().ledger.contains(&txid)).await);

        let calls = fixture.transport.calls_for(&txid);
        assert_eq!(calls.len(), 2);
        assert!(calls
            .iter()
            .all(|c| c.timeout == config.endpoint_slow_timeout()));
    }

    #[tokio::test]
    async fn test_endpoint_cap_and_dedup() {
        let fixture = Fixture::new();
        let config = DoubleSpendConfig {
            max_endpoints_per_txn: 2,
            ..Default::default()
        };
        let (sender, _) = fixture.sender(&config);
        let (_, candidate) = fixture.candidate_for(
            &["10.0.0.1", "10.0.0.1", "10.0.0.2", "10.0.0.3"],
            ValidationState::default(),
        );

        let summary = sender.send_notification(candidate).await;
        assert_eq!(summary.contacted, 2);
        let contacted: HashSet<SocketAddr> = fixture
            .transport
            .calls()
            .iter()
            .map(|c| c.endpoint)
            .collect();
        assert_eq!(
            contacted,
            HashSet::from([endpoint("10.0.0.1"), endpoint("10.0.0.2")])
        );
    }

    #[tokio::test]
    async fn test_skip_list() {
        let fixture = Fixture::new();
        let config = DoubleSpendConfig {
            endpoint_skip_list: vec!["10.0.0.1".parse().unwrap()],
            ..Default::default()
        };
        let (sender, _) = fixture.sender(&config);
        let (_, candidate) =
            fixture.candidate_for(&["10.0.0.1", "10.0.0.2"], ValidationState::default());

        let summary = sender.send_notification(candidate).await;
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.submitted, 1);
        assert!(fixture
            .transport
            .calls()
            .iter()
            .all(|c| c.endpoint == endpoint("10.0.0.2")));
    }
}
