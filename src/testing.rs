//! Test utilities and fake implementations of the collaborator traits
//!
//! These fakes stand in for the aggregator, the wallet, chain reads and time,
//! and can simulate the unhappy paths: outages, rejected prompts, reverts,
//! stalled confirmations and slow balance reads. They are designed to be used
//! in integration tests to drive a [`BridgeSession`](crate::BridgeSession)
//! end to end without a network.
//!
//! All fakes are cheap to clone and share state between clones, so a test can
//! keep a handle to adjust behaviour after handing one to the session.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use alloy_primitives::{Address, TxHash, U256};
use alloy_rpc_types::TransactionRequest;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Notify, Semaphore};

use crate::error::{BridgeError, Result};
use crate::protocol::{Chain, Token, NATIVE_TOKEN};
use crate::quote::QuoteQuery;
use crate::traits::{
    AggregatorApi, BalanceProvider, Clock, ConfirmationOutcome, SwitchOutcome, Wallet,
};

/// A closed-on-release gate. Waiters block until [`Gate::open`] is called.
#[derive(Debug, Clone)]
struct Gate(Arc<Semaphore>);

impl Gate {
    fn new() -> Self {
        Self(Arc::new(Semaphore::new(0)))
    }

    async fn pass(&self) {
        // Acquire only fails once the semaphore is closed, which is the release.
        let _ = self.0.acquire().await;
    }

    fn open(&self) {
        self.0.close();
    }
}

// ============================================================================
// Fake Aggregator
// ============================================================================

#[derive(Debug, Clone)]
enum QuoteBehaviour {
    Payload(Value),
    Unavailable {
        status: Option<u16>,
        message: String,
    },
}

#[derive(Debug, Default)]
struct AggregatorState {
    chains: Vec<Chain>,
    tokens: HashMap<u64, Vec<Token>>,
    registry_down: bool,
    quote: Option<QuoteBehaviour>,
    quote_calls: usize,
    registry_calls: usize,
    last_query: Option<QuoteQuery>,
}

/// A fake aggregator serving a fixed registry and a configurable quote.
///
/// This allows testing scenarios like:
/// - Registry outages
/// - Successful quotes with no executable route
/// - Aggregator errors with a user-facing message
/// - Asserting that validation failures never reach the network
#[derive(Clone, Debug, Default)]
pub struct FakeAggregator {
    state: Arc<Mutex<AggregatorState>>,
}

impl FakeAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_registry(&self, chains: Vec<Chain>, tokens: HashMap<u64, Vec<Token>>) {
        let mut state = self.state.lock().unwrap();
        state.chains = chains;
        state.tokens = tokens;
    }

    /// Make registry endpoints fail until called again with `false`.
    pub fn fail_registry(&self, down: bool) {
        self.state.lock().unwrap().registry_down = down;
    }

    /// Serve `payload` with a success status for every quote request.
    pub fn set_quote(&self, payload: Value) {
        self.state.lock().unwrap().quote = Some(QuoteBehaviour::Payload(payload));
    }

    /// Fail every quote request as if the aggregator returned `status`.
    pub fn set_quote_error(&self, status: Option<u16>, message: impl Into<String>) {
        self.state.lock().unwrap().quote = Some(QuoteBehaviour::Unavailable {
            status,
            message: message.into(),
        });
    }

    pub fn quote_calls(&self) -> usize {
        self.state.lock().unwrap().quote_calls
    }

    pub fn registry_calls(&self) -> usize {
        self.state.lock().unwrap().registry_calls
    }

    pub fn last_quote_query(&self) -> Option<QuoteQuery> {
        self.state.lock().unwrap().last_query.clone()
    }
}

#[async_trait]
impl AggregatorApi for FakeAggregator {
    async fn get_chains(&self) -> Result<Vec<Chain>> {
        let mut state = self.state.lock().unwrap();
        state.registry_calls += 1;
        if state.registry_down {
            return Err(BridgeError::AggregatorUnavailable {
                status: Some(503),
                message: "Simulated registry outage".to_string(),
            });
        }
        Ok(state.chains.clone())
    }

    async fn get_tokens(&self) -> Result<HashMap<u64, Vec<Token>>> {
        let state = self.state.lock().unwrap();
        if state.registry_down {
            return Err(BridgeError::AggregatorUnavailable {
                status: Some(503),
                message: "Simulated registry outage".to_string(),
            });
        }
        Ok(state.tokens.clone())
    }

    async fn get_quote(&self, query: &QuoteQuery) -> Result<Value> {
        let mut state = self.state.lock().unwrap();
        state.quote_calls += 1;
        state.last_query = Some(query.clone());
        match state.quote.clone() {
            Some(QuoteBehaviour::Payload(payload)) => Ok(payload),
            Some(QuoteBehaviour::Unavailable { status, message }) => {
                Err(BridgeError::AggregatorUnavailable { status, message })
            }
            None => Err(BridgeError::AggregatorUnavailable {
                status: None,
                message: "No quote configured".to_string(),
            }),
        }
    }
}

// ============================================================================
// Fake Wallet
// ============================================================================

#[derive(Debug)]
struct WalletState {
    chain_id: u64,
    switch_outcome: SwitchOutcome,
    drift_after_switch: Option<u64>,
    reject_signatures: bool,
    submission_failure: Option<String>,
    confirmation: ConfirmationOutcome,
    switch_requests: Vec<u64>,
    sent: Vec<TransactionRequest>,
}

/// A fake wallet whose prompts resolve according to configuration.
///
/// This allows testing scenarios like:
/// - Network switch approved, rejected, or unknown to the wallet
/// - The chain moving again right after a switch
/// - Signature rejected
/// - Transactions that revert or never confirm
/// - Prompts left pending while the test acts (`hold_*` / `release_*`)
#[derive(Clone, Debug)]
pub struct FakeWallet {
    state: Arc<Mutex<WalletState>>,
    sign_gate: Arc<Mutex<Option<Gate>>>,
    confirm_gate: Arc<Mutex<Option<Gate>>>,
}

impl FakeWallet {
    /// A wallet connected to `chain_id` that approves everything.
    pub fn new(chain_id: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(WalletState {
                chain_id,
                switch_outcome: SwitchOutcome::Switched,
                drift_after_switch: None,
                reject_signatures: false,
                submission_failure: None,
                confirmation: ConfirmationOutcome::Confirmed,
                switch_requests: Vec::new(),
                sent: Vec::new(),
            })),
            sign_gate: Arc::new(Mutex::new(None)),
            confirm_gate: Arc::new(Mutex::new(None)),
        }
    }

    /// Simulate the user switching networks in the wallet UI.
    pub fn set_chain(&self, chain_id: u64) {
        self.state.lock().unwrap().chain_id = chain_id;
    }

    pub fn set_switch_outcome(&self, outcome: SwitchOutcome) {
        self.state.lock().unwrap().switch_outcome = outcome;
    }

    /// After an approved switch, land on `chain_id` instead of the target.
    pub fn drift_after_switch(&self, chain_id: Option<u64>) {
        self.state.lock().unwrap().drift_after_switch = chain_id;
    }

    pub fn reject_signatures(&self, reject: bool) {
        self.state.lock().unwrap().reject_signatures = reject;
    }

    /// Fail broadcasts with a provider error carrying `message`.
    pub fn fail_submissions(&self, message: Option<&str>) {
        self.state.lock().unwrap().submission_failure = message.map(str::to_string);
    }

    pub fn set_confirmation(&self, outcome: ConfirmationOutcome) {
        self.state.lock().unwrap().confirmation = outcome;
    }

    /// Keep signature prompts open until [`FakeWallet::release_signatures`].
    pub fn hold_signatures(&self) {
        *self.sign_gate.lock().unwrap() = Some(Gate::new());
    }

    pub fn release_signatures(&self) {
        if let Some(gate) = self.sign_gate.lock().unwrap().take() {
            gate.open();
        }
    }

    /// Keep confirmations pending until [`FakeWallet::release_confirmations`].
    pub fn hold_confirmations(&self) {
        *self.confirm_gate.lock().unwrap() = Some(Gate::new());
    }

    pub fn release_confirmations(&self) {
        if let Some(gate) = self.confirm_gate.lock().unwrap().take() {
            gate.open();
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.state.lock().unwrap().chain_id
    }

    pub fn switch_requests(&self) -> Vec<u64> {
        self.state.lock().unwrap().switch_requests.clone()
    }

    pub fn sent_transactions(&self) -> Vec<TransactionRequest> {
        self.state.lock().unwrap().sent.clone()
    }
}

#[async_trait]
impl Wallet for FakeWallet {
    async fn connected_chain_id(&self) -> Result<u64> {
        Ok(self.state.lock().unwrap().chain_id)
    }

    async fn request_chain_switch(&self, chain_id: u64) -> Result<SwitchOutcome> {
        let mut state = self.state.lock().unwrap();
        state.switch_requests.push(chain_id);
        if state.switch_outcome == SwitchOutcome::Switched {
            state.chain_id = state.drift_after_switch.unwrap_or(chain_id);
        }
        Ok(state.switch_outcome)
    }

    async fn sign_and_send(&self, tx: TransactionRequest) -> Result<TxHash> {
        let gate = self.sign_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.pass().await;
        }

        let mut state = self.state.lock().unwrap();
        if state.reject_signatures {
            return Err(BridgeError::UserRejected);
        }
        if let Some(message) = &state.submission_failure {
            return Err(BridgeError::Provider(message.clone()));
        }
        state.sent.push(tx);
        Ok(TxHash::with_last_byte(state.sent.len() as u8))
    }

    async fn wait_for_confirmation(&self, _tx_hash: TxHash) -> Result<ConfirmationOutcome> {
        let gate = self.confirm_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.pass().await;
        }
        Ok(self.state.lock().unwrap().confirmation)
    }
}

// ============================================================================
// Fake Balance Provider
// ============================================================================

#[derive(Debug, Default)]
struct BalanceState {
    balances: HashMap<(u64, Address, Address), U256>,
    failing_chains: HashSet<u64>,
    held_chains: HashMap<u64, Gate>,
    pending: HashMap<u64, usize>,
    reads: usize,
}

/// A fake chain reader with per-chain failures and stalls.
///
/// This allows testing scenarios like:
/// - Failed reads degrading to a zero balance
/// - A slow read for one chain finishing after a newer read for another
#[derive(Clone, Debug, Default)]
pub struct FakeBalanceProvider {
    state: Arc<Mutex<BalanceState>>,
    pending_changed: Arc<Notify>,
}

impl FakeBalanceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_native(&self, chain_id: u64, owner: Address, amount: U256) {
        self.set_token(chain_id, NATIVE_TOKEN, owner, amount);
    }

    pub fn set_token(&self, chain_id: u64, token: Address, owner: Address, amount: U256) {
        self.state
            .lock()
            .unwrap()
            .balances
            .insert((chain_id, token, owner), amount);
    }

    pub fn fail_chain(&self, chain_id: u64) {
        self.state.lock().unwrap().failing_chains.insert(chain_id);
    }

    /// Stall reads on `chain_id` until [`FakeBalanceProvider::release`].
    pub fn hold(&self, chain_id: u64) {
        self.state
            .lock()
            .unwrap()
            .held_chains
            .insert(chain_id, Gate::new());
    }

    pub fn release(&self, chain_id: u64) {
        if let Some(gate) = self.state.lock().unwrap().held_chains.remove(&chain_id) {
            gate.open();
        }
    }

    /// Waits until a read on `chain_id` is stalled by [`FakeBalanceProvider::hold`].
    pub async fn wait_for_pending(&self, chain_id: u64) {
        loop {
            let notified = self.pending_changed.notified();
            if self
                .state
                .lock()
                .unwrap()
                .pending
                .get(&chain_id)
                .is_some_and(|n| *n > 0)
            {
                return;
            }
            notified.await;
        }
    }

    pub fn read_count(&self) -> usize {
        self.state.lock().unwrap().reads
    }

    async fn read(&self, chain_id: u64, token: Address, owner: Address) -> Result<U256> {
        let gate = {
            let mut state = self.state.lock().unwrap();
            state.reads += 1;
            let gate = state.held_chains.get(&chain_id).cloned();
            if gate.is_some() {
                *state.pending.entry(chain_id).or_default() += 1;
            }
            gate
        };

        if let Some(gate) = gate {
            self.pending_changed.notify_waiters();
            gate.pass().await;
            if let Some(n) = self.state.lock().unwrap().pending.get_mut(&chain_id) {
                *n = n.saturating_sub(1);
            }
        }

        let state = self.state.lock().unwrap();
        if state.failing_chains.contains(&chain_id) {
            return Err(BridgeError::Provider("Simulated RPC error".to_string()));
        }
        Ok(state
            .balances
            .get(&(chain_id, token, owner))
            .copied()
            .unwrap_or(U256::ZERO))
    }
}

#[async_trait]
impl BalanceProvider for FakeBalanceProvider {
    async fn native_balance(&self, chain_id: u64, owner: Address) -> Result<U256> {
        self.read(chain_id, NATIVE_TOKEN, owner).await
    }

    async fn token_balance(&self, chain_id: u64, token: Address, owner: Address) -> Result<U256> {
        self.read(chain_id, token, owner).await
    }
}

// ============================================================================
// Fake Clock
// ============================================================================

/// A fake clock that allows fast-forwarding time in tests.
///
/// This enables testing polling loops and display delays without actually
/// waiting.
#[derive(Clone, Debug)]
pub struct FakeClock {
    current_time: Arc<Mutex<Instant>>,
    sleep_log: Arc<Mutex<Vec<Duration>>>,
}

impl Default for FakeClock {
    fn default() -> Self {
        Self {
            current_time: Arc::new(Mutex::new(Instant::now())),
            sleep_log: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fast-forward the clock by the given duration
    pub fn advance(&self, duration: Duration) {
        let mut time = self.current_time.lock().unwrap();
        *time += duration;
    }

    /// Get the total time "slept" by this clock
    pub fn total_sleep_time(&self) -> Duration {
        self.sleep_log.lock().unwrap().iter().sum()
    }

    /// Get the number of times sleep was called
    pub fn sleep_count(&self) -> usize {
        self.sleep_log.lock().unwrap().len()
    }
}

#[async_trait]
impl Clock for FakeClock {
    async fn sleep(&self, duration: Duration) {
        self.sleep_log.lock().unwrap().push(duration);
        self.advance(duration);
        tokio::task::yield_now().await;
    }

    fn now(&self) -> Instant {
        *self.current_time.lock().unwrap()
    }
}
