//! Test doubles shared by the double-spend module tests

use crate::core::{
    ChainParams, Coin, MemoryCoinsView, OutPoint, Script, ScriptError, ScriptVerifyFlags,
    Transaction, TransactionRef, TxId, TxIn, TxOut, TX_VERSION,
};
use crate::doublespend::callback::DsCallbackMsg;
use crate::doublespend::config::DoubleSpendConfig;
use crate::doublespend::handler::{DoubleSpendHandler, SharedState};
use crate::doublespend::pool::WorkerPool;
use crate::doublespend::queue::DoubleSpendEvent;
use crate::doublespend::resolver::{NotificationCandidate, NotificationResolver, ScriptDetails};
use crate::doublespend::sender::NotificationSender;
use crate::doublespend::transport::{
    EndpointResponse, NotificationTransport, SubmitRequest, TransportError,
};
use crate::doublespend::validator::{
    ScriptInterpreter, ScriptValidator, ValidationDeadline, ValidationState,
};
use crate::network::MisbehaviorTracker;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const CALLBACK_IP: &str = "127.0.0.1";
pub const SENDER_PEER: i64 = 7;

// =============================================================================
// Script interpreter
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
    /// Spin until the deadline trips
    Stall,
    Panic,
}

pub struct MockInterpreter {
    verdict: Mutex<Verdict>,
    calls: AtomicUsize,
    last_flags: Mutex<Option<ScriptVerifyFlags>>,
}

impl MockInterpreter {
    pub fn new() -> Self {
        Self {
            verdict: Mutex::new(Verdict::Pass),
            calls: AtomicUsize::new(0),
            last_flags: Mutex::new(None),
        }
    }

    pub fn set_verdict(&self, verdict: Verdict) {
        *self.verdict.lock() = verdict;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_flags(&self) -> Option<ScriptVerifyFlags> {
        *self.last_flags.lock()
    }
}

impl ScriptInterpreter for MockInterpreter {
    fn verify(
        &self,
        _tx: &Transaction,
        _input_index: usize,
        _details: &ScriptDetails,
        flags: ScriptVerifyFlags,
        deadline: &ValidationDeadline,
    ) -> Result<(), ScriptError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_flags.lock() = Some(flags);

        let verdict = *self.verdict.lock();
        match verdict {
            Verdict::Pass => Ok(()),
            Verdict::Fail => Err(ScriptError::EvalFalse),
            Verdict::Stall => {
                while !deadline.is_cancelled() {
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(ScriptError::Cancelled)
            }
            Verdict::Panic => panic!("interpreter bug"),
        }
    }
}

// =============================================================================
// Transport
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Query,
    Submit,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub kind: CallKind,
    pub endpoint: SocketAddr,
    pub txid: TxId,
    pub timeout: Duration,
    pub request: Option<SubmitRequest>,
    pub proof_len: usize,
}

pub type Reply = Result<EndpointResponse, TransportError>;

/// Scripted endpoints; unscripted calls answer 200 with interest
pub struct MockTransport {
    query_replies: Mutex<HashMap<SocketAddr, Reply>>,
    submit_replies: Mutex<HashMap<SocketAddr, VecDeque<Reply>>>,
    calls: Mutex<Vec<Call>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            query_replies: Mutex::new(HashMap::new()),
            submit_replies: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_query(&self, endpoint: SocketAddr, reply: Reply) {
        self.query_replies.lock().insert(endpoint, reply);
    }

    pub fn push_submit(&self, endpoint: SocketAddr, reply: Reply) {
        self.submit_replies
            .lock()
            .entry(endpoint)
            .or_default()
            .push_back(reply);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, txid: &TxId) -> Vec<Call> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.txid == *txid)
            .cloned()
            .collect()
    }

    fn interested() -> Reply {
        Ok(EndpointResponse::new(200, Some(true)))
    }
}

#[async_trait]
impl NotificationTransport for MockTransport {
    async fn query(
        &self,
        endpoint: SocketAddr,
        txid: &TxId,
        timeout: Duration,
    ) -> Result<EndpointResponse, TransportError> {
        self.calls.lock().push(Call {
            kind: CallKind::Query,
            endpoint,
            txid: *txid,
            timeout,
            request: None,
            proof_len: 0,
        });
        self.query_replies
            .lock()
            .get(&endpoint)
            .cloned()
            .unwrap_or_else(Self::interested)
    }

    async fn submit(
        &self,
        endpoint: SocketAddr,
        request: &SubmitRequest,
        proof: Bytes,
        timeout: Duration,
    ) -> Result<EndpointResponse, TransportError> {
        self.calls.lock().push(Call {
            kind: CallKind::Submit,
            endpoint,
            txid: request.txid,
            timeout,
            request: Some(*request),
            proof_len: proof.len(),
        });
        self.submit_replies
            .lock()
            .get_mut(&endpoint)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(Self::interested)
    }
}

// =============================================================================
// Fixture
// =============================================================================

pub fn endpoint(ip: &str) -> SocketAddr {
    SocketAddr::new(ip.parse().unwrap(), DoubleSpendConfig::default().endpoint_port)
}

/// Poll `condition` for up to two seconds
pub async fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

pub struct Fixture {
    pub params: ChainParams,
    pub coins: Arc<MemoryCoinsView>,
    pub interpreter: Arc<MockInterpreter>,
    pub transport: Arc<MockTransport>,
    pub misbehavior: Arc<MisbehaviorTracker>,
    next_vout: AtomicU32,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            params: ChainParams::regtest(),
            coins: Arc::new(MemoryCoinsView::new(200)),
            interpreter: Arc::new(MockInterpreter::new()),
            transport: Arc::new(MockTransport::new()),
            misbehavior: Arc::new(MisbehaviorTracker::new()),
            next_vout: AtomicU32::new(0),
        }
    }

    /// Add a fresh standard coin to the UTXO view
    pub fn fund(&self) -> OutPoint {
        let vout = self.next_vout.fetch_add(1, Ordering::SeqCst);
        let outpoint = OutPoint::new(TxId::from_bytes([0x42; 32]), vout);
        self.coins.add_coin(
            outpoint,
            Coin::new(TxOut::new(10_000, Script::p2pkh(&[0x11; 20])), 150),
        );
        outpoint
    }

    /// A DSNT-enabled mempool transaction and a transaction double-spending it
    pub fn enabled_pair(&self, addresses: &[&str]) -> (TransactionRef, TransactionRef) {
        self.pair_with_message(DsCallbackMsg::new(
            addresses.iter().map(|a| a.parse().unwrap()).collect(),
            vec![0],
        ))
    }

    pub fn pair_with_message(&self, msg: DsCallbackMsg) -> (TransactionRef, TransactionRef) {
        let prevout = self.fund();
        let mempool_txn = Arc::new(Transaction::new(
            TX_VERSION,
            vec![TxIn::new(prevout, Script::new())],
            vec![
                TxOut::new(0, msg.output_script().unwrap()),
                TxOut::new(9_000, Script::p2pkh(&[0x22; 20])),
            ],
            0,
        ));
        let double_spend_txn = Arc::new(Transaction::new(
            TX_VERSION,
            vec![TxIn::new(prevout, Script::new())],
            vec![TxOut::new(9_500, Script::p2pkh(&[0x33; 20]))],
            0,
        ));
        (mempool_txn, double_spend_txn)
    }

    pub fn resolver(&self) -> NotificationResolver {
        NotificationResolver::new(self.coins.clone(), self.params)
    }

    pub fn validator(&self, max_duration: Duration) -> ScriptValidator {
        ScriptValidator::new(self.interpreter.clone(), self.params, max_duration)
    }

    pub fn candidate(&self, state: ValidationState) -> (DoubleSpendEvent, NotificationCandidate) {
        self.candidate_for(&[CALLBACK_IP], state)
    }

    pub fn candidate_for(
        &self,
        addresses: &[&str],
        state: ValidationState,
    ) -> (DoubleSpendEvent, NotificationCandidate) {
        let (mempool_txn, double_spend_txn) = self.enabled_pair(addresses);
        let candidate = self
            .resolver()
            .resolve(&mempool_txn, &double_spend_txn, true)
            .unwrap();
        let event = DoubleSpendEvent::new(
            double_spend_txn,
            vec![mempool_txn],
            state.scripts_checked,
            SENDER_PEER,
        );
        (event, candidate)
    }

    pub fn sender(
        &self,
        config: &DoubleSpendConfig,
    ) -> (NotificationSender, Arc<Mutex<SharedState>>) {
        let state = Arc::new(Mutex::new(SharedState::new(config)));
        let slow_pool = WorkerPool::new(
            "slow",
            config.slow_pool_threads,
            config.task_queue_capacity,
        );
        let sender =
            NotificationSender::new(config, self.transport.clone(), state.clone(), slow_pool);
        (sender, state)
    }

    pub fn handler(&self, config: DoubleSpendConfig) -> DoubleSpendHandler {
        DoubleSpendHandler::new(
            config,
            self.params,
            self.coins.clone(),
            self.interpreter.clone(),
            self.transport.clone(),
            self.misbehavior.clone(),
        )
        .unwrap()
    }
}
