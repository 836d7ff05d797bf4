//! Top-level bridge session.
//!
//! ```text
//! WalletDisconnected -> TradeSetup -> QuoteReview -> Executing -> Success
//!                           ^             ^             |
//!                           +-------------+-------------+  (failure)
//! ```
//!
//! Any step falls back to `WalletDisconnected` when the wallet disconnects.
//! The session never connects a wallet itself; it only reacts to
//! [`WalletEvent`]s.
//!
//! State lives behind a [`tokio::sync::Mutex`] that is never held across a
//! call into a collaborator. Every async completion is checked against the
//! session epoch (bumped on open, close and disconnect) and, for quotes and
//! balances, a request sequence number; stale completions are dropped.

use std::sync::Arc;

use alloy_primitives::{Address, TxHash, U256};
use bon::bon;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use crate::balance::{BalanceReader, BalanceReading};
use crate::config::{AggregatorConfig, SessionConfig};
use crate::error::{BridgeError, Result};
use crate::evaluator::{summarize, RouteSummary};
use crate::execution::{ExecutionAttempt, ExecutionController, ExecutionState};
use crate::protocol::{parse_address, Chain, Route, Token};
use crate::quote::{QuoteEngine, TradeRequest};
use crate::registry::{Registry, RegistryClient};
use crate::traits::{AggregatorApi, BalanceProvider, Clock, SwitchOutcome, Wallet};
use crate::units::format_display;

/// The screen the user is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStep {
    WalletDisconnected,
    TradeSetup,
    QuoteReview,
    Executing,
    Success,
}

/// Notifications from the wallet collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletEvent {
    Connected { address: Address, chain_id: u64 },
    Disconnected,
    AccountChanged { address: Address },
    ChainChanged { chain_id: u64 },
}

/// Read-only view of the session for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub step: SessionStep,
    pub address: Option<Address>,
    pub wallet_chain_id: Option<u64>,
    pub registry_ready: bool,
    pub from_chain: Option<Chain>,
    pub to_chain: Option<Chain>,
    pub from_token: Option<Token>,
    pub to_token: Option<Token>,
    pub amount: String,
    /// The custom recipient, or the connected address when none is set.
    pub recipient: Option<Address>,
    pub routes: Vec<Route>,
    pub selected_route: Option<Route>,
    pub summary: Option<RouteSummary>,
    pub balance: Option<U256>,
    pub balance_display: Option<String>,
    pub balance_degraded: bool,
    /// Dismissible message for the last recoverable error.
    pub banner: Option<String>,
    pub last_attempt: Option<ExecutionAttempt>,
    /// Explorer link for the last submitted transaction.
    pub explorer_url: Option<String>,
}

struct SessionState<W> {
    step: SessionStep,
    epoch: u64,
    quote_seq: u64,
    address: Option<Address>,
    wallet_chain_id: Option<u64>,
    registry: Option<Arc<Registry>>,
    from_chain: Option<Chain>,
    to_chain: Option<Chain>,
    from_token: Option<Token>,
    to_token: Option<Token>,
    amount: String,
    recipient: Option<Address>,
    routes: Vec<Route>,
    selected: Option<usize>,
    balance: Option<BalanceReading>,
    banner: Option<String>,
    last_attempt: Option<ExecutionAttempt>,
    active: Option<Arc<ExecutionController<W>>>,
}

impl<W> SessionState<W> {
    fn new() -> Self {
        Self {
            step: SessionStep::WalletDisconnected,
            epoch: 0,
            quote_seq: 0,
            address: None,
            wallet_chain_id: None,
            registry: None,
            from_chain: None,
            to_chain: None,
            from_token: None,
            to_token: None,
            amount: String::new(),
            recipient: None,
            routes: Vec::new(),
            selected: None,
            balance: None,
            banner: None,
            last_attempt: None,
            active: None,
        }
    }

    fn set_step(&mut self, step: SessionStep) {
        if self.step != step {
            info!(from = ?self.step, to = ?step, event = "session_step_changed");
            self.step = step;
        }
    }

    fn idle_step(&self) -> SessionStep {
        if self.address.is_some() {
            SessionStep::TradeSetup
        } else {
            SessionStep::WalletDisconnected
        }
    }

    fn invalid_state(&self, action: &'static str) -> BridgeError {
        BridgeError::InvalidState {
            from: format!("{:?}", self.step),
            action,
        }
    }

    fn ensure_editable(&self) -> Result<()> {
        if self.step == SessionStep::Executing {
            return Err(BridgeError::ExecutionInProgress);
        }
        Ok(())
    }

    fn registry(&self) -> Result<Arc<Registry>> {
        self.registry.clone().ok_or(BridgeError::RegistryNotReady)
    }

    /// Drops any quote so stale routes are never executed against new inputs.
    fn discard_quote(&mut self) {
        self.quote_seq += 1;
        self.routes.clear();
        self.selected = None;
        if matches!(self.step, SessionStep::QuoteReview | SessionStep::Success) {
            let step = self.idle_step();
            self.set_step(step);
        }
    }

    /// Back to trade setup with selections kept and the amount cleared.
    fn clear_trade(&mut self) {
        self.quote_seq += 1;
        self.routes.clear();
        self.selected = None;
        self.amount.clear();
        let step = self.idle_step();
        self.set_step(step);
    }

    fn abandon_execution(&mut self) {
        if let Some(controller) = self.active.take() {
            controller.abandon();
            debug!(event = "execution_abandoned");
        }
    }

    fn selected_route(&self) -> Option<&Route> {
        self.selected.and_then(|i| self.routes.get(i))
    }
}

struct Inner<A, W, B, C> {
    registry_client: RegistryClient<A>,
    quotes: QuoteEngine<A>,
    balances: BalanceReader<B>,
    wallet: Arc<W>,
    clock: C,
    config: SessionConfig,
    execution: Arc<watch::Sender<ExecutionState>>,
    state: Mutex<SessionState<W>>,
}

/// The bridge session controller.
///
/// Cheap to clone; clones share the same session.
///
/// # Examples
///
/// ```rust,ignore
/// use xchain_bridge::{BridgeSession, WalletEvent};
///
/// let session = BridgeSession::builder()
///     .aggregator(LiFiClient::production()?)
///     .wallet(wallet)
///     .balances(balances)
///     .clock(TokioClock::new())
///     .build();
///
/// session.open().await?;
/// session
///     .handle_wallet_event(WalletEvent::Connected { address, chain_id: 1 })
///     .await;
/// session.select_from_chain(1).await?;
/// session.select_to_chain(137).await?;
/// session.select_from_token("0x0000000000000000000000000000000000000000").await?;
/// session.select_to_token("0x3c499c542cef5e3811e1192ce70d8cc03d5c3359").await?;
/// session.set_amount("1.5").await?;
/// session.request_quote().await?;
/// let attempt = session.execute().await?;
/// ```
pub struct BridgeSession<A, W, B, C> {
    inner: Arc<Inner<A, W, B, C>>,
}

impl<A, W, B, C> Clone for BridgeSession<A, W, B, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[bon]
impl<A, W, B, C> BridgeSession<A, W, B, C>
where
    A: AggregatorApi + Clone,
    W: Wallet,
    B: BalanceProvider,
    C: Clock,
{
    #[builder]
    pub fn new(
        aggregator: A,
        wallet: W,
        balances: B,
        clock: C,
        #[builder(default)] aggregator_config: AggregatorConfig,
        #[builder(default)] config: SessionConfig,
    ) -> Self {
        let (execution, _) = watch::channel(ExecutionState::Idle);
        Self {
            inner: Arc::new(Inner {
                registry_client: RegistryClient::new(aggregator.clone()),
                quotes: QuoteEngine::new(aggregator, aggregator_config),
                balances: BalanceReader::new(balances),
                wallet: Arc::new(wallet),
                clock,
                config,
                execution: Arc::new(execution),
                state: Mutex::new(SessionState::new()),
            }),
        }
    }
}

impl<A, W, B, C> BridgeSession<A, W, B, C>
where
    A: AggregatorApi + Clone,
    W: Wallet,
    B: BalanceProvider,
    C: Clock,
{
    /// Loads the registry for a freshly opened session.
    ///
    /// Quote requests fail with [`BridgeError::RegistryNotReady`] until this
    /// completes. An execution still in flight is abandoned.
    pub async fn open(&self) -> Result<()> {
        let (epoch, was_executing) = {
            let mut state = self.inner.state.lock().await;
            state.epoch += 1;
            state.registry = None;
            state.banner = None;
            let was_executing = state.step == SessionStep::Executing;
            state.abandon_execution();
            if was_executing {
                let step = state.idle_step();
                state.set_step(step);
            }
            (state.epoch, was_executing)
        };
        if was_executing {
            self.inner.execution.send_replace(ExecutionState::Idle);
        }

        let result = self.inner.registry_client.load().await;

        let mut state = self.inner.state.lock().await;
        if state.epoch != epoch {
            return Err(BridgeError::Superseded);
        }
        match result {
            Ok(registry) => {
                state.registry = Some(registry);
                Ok(())
            }
            Err(e) => {
                state.banner = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Discards everything the session holds.
    ///
    /// An attempt awaiting confirmation keeps going on chain, but its
    /// resolution no longer reaches this session.
    pub async fn close(&self) {
        let mut state = self.inner.state.lock().await;
        state.abandon_execution();
        let (epoch, address, wallet_chain_id) =
            (state.epoch + 1, state.address, state.wallet_chain_id);
        *state = SessionState::new();
        state.epoch = epoch;
        state.address = address;
        state.wallet_chain_id = wallet_chain_id;
        let step = state.idle_step();
        state.set_step(step);
        drop(state);

        self.inner.balances.invalidate();
        self.inner.execution.send_replace(ExecutionState::Idle);
        info!(event = "session_closed");
    }

    /// Applies a wallet notification.
    pub async fn handle_wallet_event(&self, event: WalletEvent) {
        debug!(event_kind = ?event, event = "wallet_event");
        let refresh = {
            let mut state = self.inner.state.lock().await;
            match event {
                WalletEvent::Connected { address, chain_id } => {
                    state.address = Some(address);
                    state.wallet_chain_id = Some(chain_id);
                    if state.step == SessionStep::WalletDisconnected {
                        state.set_step(SessionStep::TradeSetup);
                    }
                    true
                }
                WalletEvent::Disconnected => {
                    state.epoch += 1;
                    state.abandon_execution();
                    state.address = None;
                    state.wallet_chain_id = None;
                    state.routes.clear();
                    state.selected = None;
                    state.quote_seq += 1;
                    state.balance = None;
                    state.set_step(SessionStep::WalletDisconnected);
                    self.inner.balances.invalidate();
                    self.inner.execution.send_replace(ExecutionState::Idle);
                    false
                }
                WalletEvent::AccountChanged { address } => {
                    if state.address == Some(address) {
                        false
                    } else {
                        if state.step == SessionStep::Executing {
                            state.epoch += 1;
                            state.abandon_execution();
                            self.inner.execution.send_replace(ExecutionState::Idle);
                        }
                        state.address = Some(address);
                        state.balance = None;
                        state.clear_trade();
                        self.inner.balances.invalidate();
                        true
                    }
                }
                WalletEvent::ChainChanged { chain_id } => {
                    state.wallet_chain_id = Some(chain_id);
                    false
                }
            }
        };

        if refresh {
            self.refresh_balance().await;
        }
    }

    /// Feeds wallet events into the session until the sender is dropped.
    pub async fn listen(&self, mut events: mpsc::Receiver<WalletEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_wallet_event(event).await;
        }
        debug!(event = "wallet_events_closed");
    }

    /// Selects the source chain and asks the wallet to follow it.
    ///
    /// Returns the wallet's answer, or `None` when no switch was needed. A
    /// refused switch keeps the selection; execution will ask again.
    pub async fn select_from_chain(&self, chain_id: u64) -> Result<Option<SwitchOutcome>> {
        let (needs_switch, epoch) = {
            let mut state = self.inner.state.lock().await;
            state.ensure_editable()?;
            let chain = state.registry()?.require_chain(chain_id)?.clone();

            if state.from_chain.as_ref().map(|c| c.id) != Some(chain_id) {
                state.from_chain = Some(chain);
                state.from_token = None;
                state.balance = None;
                state.discard_quote();
                self.inner.balances.invalidate();
            }

            let needs_switch =
                state.address.is_some() && state.wallet_chain_id != Some(chain_id);
            (needs_switch, state.epoch)
        };

        if !needs_switch {
            return Ok(None);
        }

        let outcome = self.inner.wallet.request_chain_switch(chain_id).await;

        let mut state = self.inner.state.lock().await;
        if state.epoch != epoch {
            return Ok(None);
        }
        match outcome {
            Ok(SwitchOutcome::Switched) => {
                state.wallet_chain_id = Some(chain_id);
                Ok(Some(SwitchOutcome::Switched))
            }
            Ok(outcome) => {
                warn!(chain_id = chain_id, outcome = ?outcome, event = "network_switch_declined");
                state.banner = Some(
                    match outcome {
                        SwitchOutcome::Unsupported => {
                            BridgeError::ChainNotConfigured { chain_id }
                        }
                        _ => BridgeError::NetworkSwitchRejected { chain_id },
                    }
                    .to_string(),
                );
                Ok(Some(outcome))
            }
            Err(e) => {
                state.banner = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Selects the destination chain. The wallet is never asked to switch.
    pub async fn select_to_chain(&self, chain_id: u64) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        state.ensure_editable()?;
        let chain = state.registry()?.require_chain(chain_id)?.clone();

        if state.to_chain.as_ref().map(|c| c.id) != Some(chain_id) {
            state.to_chain = Some(chain);
            state.to_token = None;
            state.discard_quote();
        }
        Ok(())
    }

    /// Selects the source token by address, in any letter case, and reads
    /// its balance.
    pub async fn select_from_token(&self, address: &str) -> Result<()> {
        {
            let mut state = self.inner.state.lock().await;
            state.ensure_editable()?;
            let chain_id = state
                .from_chain
                .as_ref()
                .map(|c| c.id)
                .ok_or_else(|| {
                    state.invalid_state("select a source token without a source chain")
                })?;
            let token = lookup_token(state.registry()?.as_ref(), chain_id, address)?;

            if state.from_token.as_ref() != Some(&token) {
                state.from_token = Some(token);
                state.balance = None;
                state.discard_quote();
                self.inner.balances.invalidate();
            }
        }

        self.refresh_balance().await;
        Ok(())
    }

    /// Selects the destination token by address, in any letter case.
    pub async fn select_to_token(&self, address: &str) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        state.ensure_editable()?;
        let chain_id = state
            .to_chain
            .as_ref()
            .map(|c| c.id)
            .ok_or_else(|| {
                state.invalid_state("select a destination token without a destination chain")
            })?;
        let token = lookup_token(state.registry()?.as_ref(), chain_id, address)?;

        if state.to_token.as_ref() != Some(&token) {
            state.to_token = Some(token);
            state.discard_quote();
        }
        Ok(())
    }

    /// Stores the amount as typed. It is validated when a quote is requested.
    pub async fn set_amount(&self, amount: &str) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        state.ensure_editable()?;
        let amount = amount.trim();
        if state.amount != amount {
            state.amount = amount.to_string();
            state.discard_quote();
        }
        Ok(())
    }

    /// Sets a custom recipient, or clears it with `None` or an empty string.
    ///
    /// # Errors
    ///
    /// An unparseable address returns [`BridgeError::InvalidAddress`] and the
    /// recipient falls back to the connected address.
    pub async fn set_recipient(&self, recipient: Option<&str>) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        state.ensure_editable()?;

        let input = recipient.map(str::trim).filter(|r| !r.is_empty());
        let parsed = match input {
            None => Ok(None),
            Some(text) => parse_address(text)
                .map(Some)
                .ok_or_else(|| BridgeError::InvalidAddress(text.to_string())),
        };

        let recipient = parsed.as_ref().ok().copied().flatten();
        if state.recipient != recipient {
            state.recipient = recipient;
            state.discard_quote();
        }
        parsed.map(|_| ())
    }

    /// Exchanges source and destination chains and tokens in one step.
    ///
    /// Applying it twice restores the original selection. The wallet is not
    /// asked to switch; execution checks the network anyway.
    pub async fn swap_sides(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock().await;
            state.ensure_editable()?;

            let state = &mut *state;
            std::mem::swap(&mut state.from_chain, &mut state.to_chain);
            std::mem::swap(&mut state.from_token, &mut state.to_token);
            state.balance = None;
            state.discard_quote();
            self.inner.balances.invalidate();
        }

        self.refresh_balance().await;
        Ok(())
    }

    /// Requests quotes for the current selection.
    ///
    /// On success the best route is selected and the session moves to
    /// [`SessionStep::QuoteReview`]. Validation failures leave the session
    /// untouched; aggregator failures are recorded as the banner with all
    /// selections kept.
    pub async fn request_quote(&self) -> Result<Route> {
        let (request, seq, epoch) = {
            let mut state = self.inner.state.lock().await;
            match state.step {
                SessionStep::WalletDisconnected => return Err(BridgeError::WalletNotConnected),
                SessionStep::Executing => return Err(BridgeError::ExecutionInProgress),
                _ => {}
            }
            if self.inner.execution.borrow().is_in_flight() {
                return Err(BridgeError::ExecutionInProgress);
            }
            state.registry()?;

            let sender = state.address.ok_or(BridgeError::WalletNotConnected)?;
            let (from_chain, from_token) = state
                .from_chain
                .clone()
                .zip(state.from_token.clone())
                .ok_or(BridgeError::TokenNotSelected { side: "source" })?;
            let (to_chain, to_token) = state
                .to_chain
                .clone()
                .zip(state.to_token.clone())
                .ok_or(BridgeError::TokenNotSelected {
                    side: "destination",
                })?;

            let request = TradeRequest::builder()
                .from_chain(from_chain)
                .to_chain(to_chain)
                .from_token(from_token)
                .to_token(to_token)
                .amount(state.amount.clone())
                .sender(sender)
                .maybe_recipient(state.recipient)
                .build();
            request.base_units()?;

            state.discard_quote();
            state.banner = None;
            (request, state.quote_seq, state.epoch)
        };

        let result = self.inner.quotes.get_routes(&request).await;

        let mut state = self.inner.state.lock().await;
        if state.epoch != epoch || state.quote_seq != seq {
            debug!(event = "stale_quote_discarded");
            return Err(BridgeError::Superseded);
        }
        match result {
            Ok(routes) => {
                let best = routes.first().cloned().ok_or(BridgeError::NoRouteFound)?;
                state.routes = routes;
                state.selected = Some(0);
                state.set_step(SessionStep::QuoteReview);
                Ok(best)
            }
            Err(e) => {
                state.banner = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Picks one of the candidates returned by the last quote.
    pub async fn select_route(&self, index: usize) -> Result<Route> {
        let mut state = self.inner.state.lock().await;
        if state.step != SessionStep::QuoteReview {
            return Err(state.invalid_state("select a route"));
        }
        let route = state
            .routes
            .get(index)
            .cloned()
            .ok_or(BridgeError::NoRouteSelected)?;
        state.selected = Some(index);
        Ok(route)
    }

    /// Executes the selected route.
    ///
    /// On confirmation the session shows [`SessionStep::Success`] for the
    /// configured display delay and then resets the trade. Failures that
    /// happen before broadcast return to [`SessionStep::QuoteReview`] with
    /// the route kept; reverts and timeouts return to
    /// [`SessionStep::TradeSetup`].
    ///
    /// # Errors
    ///
    /// Only precondition failures are returned as `Err`. The outcome of the
    /// attempt itself is on the returned [`ExecutionAttempt`]; use
    /// [`ExecutionAttempt::into_result`] to map it onto [`BridgeError`].
    pub async fn execute(&self) -> Result<ExecutionAttempt> {
        let (controller, route, epoch) = {
            let mut state = self.inner.state.lock().await;
            match state.step {
                SessionStep::QuoteReview => {}
                SessionStep::WalletDisconnected => return Err(BridgeError::WalletNotConnected),
                SessionStep::Executing => return Err(BridgeError::ExecutionInProgress),
                _ => return Err(state.invalid_state("execute")),
            }
            if self.inner.execution.borrow().is_in_flight() {
                return Err(BridgeError::ExecutionInProgress);
            }
            let route = state
                .selected_route()
                .cloned()
                .ok_or(BridgeError::NoRouteSelected)?;

            let controller = Arc::new(ExecutionController::with_state_channel(
                Arc::clone(&self.inner.wallet),
                Arc::clone(&self.inner.execution),
            ));
            state.active = Some(Arc::clone(&controller));
            state.banner = None;
            state.set_step(SessionStep::Executing);
            (controller, route, state.epoch)
        };

        let attempt = match controller.run(&route).await {
            Ok(attempt) => attempt,
            Err(e) => {
                let mut state = self.inner.state.lock().await;
                if state.epoch == epoch {
                    state.active = None;
                    state.set_step(SessionStep::QuoteReview);
                }
                return Err(e);
            }
        };

        {
            let mut state = self.inner.state.lock().await;
            if state.epoch != epoch {
                debug!(event = "stale_execution_ignored");
                return Ok(attempt);
            }
            state.active = None;
            state.last_attempt = Some(attempt.clone());

            match attempt.failure_reason {
                None => state.set_step(SessionStep::Success),
                Some(reason) => {
                    state.banner = attempt.clone().into_result().err().map(|e| e.to_string());
                    if reason.keeps_route() {
                        state.set_step(SessionStep::QuoteReview);
                    } else {
                        state.clear_trade();
                    }
                }
            }
        }

        if attempt.confirmed {
            self.inner
                .clock
                .sleep(self.inner.config.success_display_delay)
                .await;

            let reset = {
                let mut state = self.inner.state.lock().await;
                let reset = state.epoch == epoch && state.step == SessionStep::Success;
                if reset {
                    state.clear_trade();
                    self.inner.execution.send_replace(ExecutionState::Idle);
                }
                reset
            };
            if reset {
                self.refresh_balance().await;
            }
        }

        Ok(attempt)
    }

    /// Re-reads the source token balance of the connected address.
    ///
    /// Returns the reading if it was applied, `None` if there was nothing to
    /// read or a newer read superseded this one.
    pub async fn refresh_balance(&self) -> Option<BalanceReading> {
        let (owner, token, epoch) = {
            let state = self.inner.state.lock().await;
            (state.address?, state.from_token.clone()?, state.epoch)
        };

        let reading = self.inner.balances.get_balance(owner, &token).await;

        let mut state = self.inner.state.lock().await;
        if state.epoch != epoch || !self.inner.balances.is_current(&reading) {
            debug!(seq = reading.seq, event = "stale_balance_discarded");
            return None;
        }
        state.balance = Some(reading);
        Some(reading)
    }

    /// Clears the quote and amount, keeping chain and token selections.
    pub async fn reset_trade(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        state.ensure_editable()?;
        state.clear_trade();
        state.banner = None;
        if self.inner.execution.borrow().is_terminal() {
            self.inner.execution.send_replace(ExecutionState::Idle);
        }
        Ok(())
    }

    /// Subscribes to execution progress.
    pub fn execution_state(&self) -> watch::Receiver<ExecutionState> {
        self.inner.execution.subscribe()
    }

    pub async fn step(&self) -> SessionStep {
        self.inner.state.lock().await.step
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.state.lock().await;
        let selected_route = state.selected_route().cloned();
        let balance = state.balance.filter(|_| state.from_token.is_some());
        let explorer_url = state.last_attempt.as_ref().and_then(|attempt| {
            let tx_hash = attempt.submitted_tx_hash?;
            Some(explorer_tx_url(
                state.registry.as_deref(),
                attempt.route.required_chain_id,
                tx_hash,
            ))
        });

        SessionSnapshot {
            step: state.step,
            address: state.address,
            wallet_chain_id: state.wallet_chain_id,
            registry_ready: state.registry.is_some(),
            from_chain: state.from_chain.clone(),
            to_chain: state.to_chain.clone(),
            from_token: state.from_token.clone(),
            to_token: state.to_token.clone(),
            amount: state.amount.clone(),
            recipient: state.recipient.or(state.address),
            routes: state.routes.clone(),
            summary: selected_route.as_ref().map(summarize),
            selected_route,
            balance: balance.map(|b| b.amount),
            balance_display: balance.zip(state.from_token.as_ref()).map(|(b, token)| {
                format_display(
                    b.amount,
                    token.decimals,
                    self.inner.config.balance_display_decimals,
                )
            }),
            balance_degraded: balance.is_some_and(|b| b.degraded),
            banner: state.banner.clone(),
            last_attempt: state.last_attempt.clone(),
            explorer_url,
        }
    }
}

fn lookup_token(registry: &Registry, chain_id: u64, address: &str) -> Result<Token> {
    let parsed =
        parse_address(address).ok_or_else(|| BridgeError::InvalidAddress(address.to_string()))?;
    registry.require_token(chain_id, parsed).cloned()
}

fn explorer_tx_url(registry: Option<&Registry>, chain_id: u64, tx_hash: TxHash) -> String {
    registry
        .and_then(|r| r.chain(chain_id))
        .cloned()
        .unwrap_or_else(|| Chain::new(chain_id, chain_id.to_string()))
        .explorer_tx_url(tx_hash)
}
