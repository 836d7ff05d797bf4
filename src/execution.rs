//! Route execution state machine.
//!
//! ```text
//! Idle -> NetworkCheck -> [NetworkSwitching -> NetworkCheck]* -> Submitting
//!      -> AwaitingConfirmation -> Confirmed | Failed
//! ```
//!
//! A controller backs exactly one attempt at a time. States are published on
//! a [`watch`] channel so observers can render progress; once the controller
//! is abandoned it stops publishing and late wallet responses change nothing.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use alloy_network::TransactionBuilder;
use alloy_primitives::TxHash;
use alloy_rpc_types::TransactionRequest;
use tokio::sync::watch;
use tracing::{info, warn, Instrument};

use crate::error::{BridgeError, Result};
use crate::protocol::Route;
use crate::spans;
use crate::traits::{ConfirmationOutcome, SwitchOutcome, Wallet};

/// Network checks allowed per attempt before giving up on a wallet whose
/// chain keeps moving under us.
pub const MAX_NETWORK_CHECKS: u32 = 3;

/// Where an execution attempt currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExecutionState {
    #[default]
    Idle,
    NetworkCheck,
    NetworkSwitching {
        target_chain_id: u64,
    },
    Submitting,
    AwaitingConfirmation {
        tx_hash: TxHash,
    },
    Confirmed {
        tx_hash: TxHash,
    },
    Failed(FailureReason),
}

impl ExecutionState {
    /// True from the network check until a terminal state is reached.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            Self::NetworkCheck
                | Self::NetworkSwitching { .. }
                | Self::Submitting
                | Self::AwaitingConfirmation { .. }
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed { .. } | Self::Failed(_))
    }
}

/// Why an attempt ended in [`ExecutionState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    NetworkSwitchRejected,
    ChainNotConfigured,
    UserRejected,
    TransactionReverted,
    ConfirmationTimeout,
    /// The wallet could not report its network.
    WalletUnavailable,
}

impl FailureReason {
    /// Failures that happen before anything is broadcast. The route is still
    /// valid and the user can retry it as is.
    pub fn keeps_route(&self) -> bool {
        matches!(
            self,
            Self::NetworkSwitchRejected
                | Self::ChainNotConfigured
                | Self::UserRejected
                | Self::WalletUnavailable
        )
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NetworkSwitchRejected => "network switch rejected",
            Self::ChainNotConfigured => "chain not configured in wallet",
            Self::UserRejected => "transaction rejected by user",
            Self::TransactionReverted => "transaction reverted",
            Self::ConfirmationTimeout => "confirmation timed out",
            Self::WalletUnavailable => "wallet unavailable",
        };
        f.write_str(text)
    }
}

/// Record of one execution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionAttempt {
    pub route: Route,
    pub submitted_tx_hash: Option<TxHash>,
    pub confirmed: bool,
    pub failure_reason: Option<FailureReason>,
    /// Wallet or provider message behind the failure, when there was one.
    pub failure_detail: Option<String>,
    /// Every state this attempt passed through, in order.
    pub transitions: Vec<ExecutionState>,
}

impl ExecutionAttempt {
    fn new(route: Route) -> Self {
        Self {
            route,
            submitted_tx_hash: None,
            confirmed: false,
            failure_reason: None,
            failure_detail: None,
            transitions: Vec::new(),
        }
    }

    /// Converts the outcome into the crate error taxonomy.
    pub fn into_result(self) -> Result<TxHash> {
        let chain_id = self.route.required_chain_id;
        match (self.failure_reason, self.submitted_tx_hash) {
            (None, Some(tx_hash)) if self.confirmed => Ok(tx_hash),
            (Some(FailureReason::NetworkSwitchRejected), _) => {
                Err(BridgeError::NetworkSwitchRejected { chain_id })
            }
            (Some(FailureReason::ChainNotConfigured), _) => {
                Err(BridgeError::ChainNotConfigured { chain_id })
            }
            (Some(FailureReason::UserRejected), _) => Err(BridgeError::UserRejected),
            (Some(FailureReason::TransactionReverted), Some(tx_hash)) => {
                Err(BridgeError::TransactionReverted { tx_hash })
            }
            (Some(FailureReason::ConfirmationTimeout), Some(tx_hash)) => {
                Err(BridgeError::ConfirmationTimeout { tx_hash })
            }
            (reason, _) => Err(BridgeError::Provider(
                self.failure_detail
                    .or_else(|| reason.map(|r| r.to_string()))
                    .unwrap_or_else(|| "execution did not complete".to_string()),
            )),
        }
    }
}

/// Builds the transaction for `route` verbatim from the aggregator's request.
pub fn build_transaction(route: &Route) -> TransactionRequest {
    let data = &route.transaction_request;
    let tx = TransactionRequest::default()
        .with_to(data.to)
        .with_input(data.data.clone())
        .with_value(data.value)
        .with_chain_id(route.required_chain_id);
    match data.gas_limit {
        Some(gas_limit) => tx.with_gas_limit(gas_limit),
        None => tx,
    }
}

type Failure = (FailureReason, Option<String>);

/// Drives one route through network verification, submission and
/// confirmation.
///
/// # Examples
///
/// ```rust,ignore
/// let controller = ExecutionController::new(Arc::new(wallet));
/// let mut progress = controller.subscribe();
/// let attempt = controller.run(&route).await?;
/// ```
#[derive(Debug)]
pub struct ExecutionController<W> {
    wallet: Arc<W>,
    state: Arc<watch::Sender<ExecutionState>>,
    transitions: Mutex<Vec<ExecutionState>>,
    abandoned: AtomicBool,
}

impl<W> ExecutionController<W> {
    /// Detaches this controller from its channel. Whatever the wallet reports
    /// afterwards is ignored.
    pub fn abandon(&self) {
        self.abandoned.store(true, Ordering::SeqCst);
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::SeqCst)
    }
}

impl<W: Wallet> ExecutionController<W> {
    pub fn new(wallet: Arc<W>) -> Self {
        let (state, _) = watch::channel(ExecutionState::Idle);
        Self::with_state_channel(wallet, Arc::new(state))
    }

    /// Creates a controller that publishes on an existing channel.
    ///
    /// Controllers sharing a channel also share the one-attempt-at-a-time
    /// guard.
    pub fn with_state_channel(wallet: Arc<W>, state: Arc<watch::Sender<ExecutionState>>) -> Self {
        Self {
            wallet,
            state,
            transitions: Mutex::new(Vec::new()),
            abandoned: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ExecutionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ExecutionState {
        self.state.borrow().clone()
    }

    fn transition(&self, next: ExecutionState) {
        if let Ok(mut transitions) = self.transitions.lock() {
            transitions.push(next.clone());
        }
        if self.is_abandoned() {
            return;
        }
        self.state.send_replace(next);
    }

    /// Claims the channel for a new attempt.
    fn begin(&self) -> Result<()> {
        let claimed = self.state.send_if_modified(|state| {
            if state.is_in_flight() || self.is_abandoned() {
                return false;
            }
            *state = ExecutionState::NetworkCheck;
            true
        });
        if !claimed {
            return Err(BridgeError::ExecutionInProgress);
        }
        if let Ok(mut transitions) = self.transitions.lock() {
            transitions.clear();
            transitions.push(ExecutionState::NetworkCheck);
        }
        Ok(())
    }

    /// Executes `route`.
    ///
    /// Wallet-side failures do not surface as `Err`; they end the attempt in
    /// [`ExecutionState::Failed`] and are reported on the returned
    /// [`ExecutionAttempt`].
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ExecutionInProgress`] without side effects if
    /// another attempt on the same channel has not reached a terminal state.
    pub async fn run(&self, route: &Route) -> Result<ExecutionAttempt> {
        self.begin()?;

        let span = spans::execute_route(route);
        let mut attempt = ExecutionAttempt::new(route.clone());

        let outcome = self.drive(route, &mut attempt).instrument(span.clone()).await;
        let _guard = span.enter();
        match outcome {
            Ok(tx_hash) => {
                attempt.confirmed = true;
                info!(tx_hash = %tx_hash, event = "execution_confirmed");
                self.transition(ExecutionState::Confirmed { tx_hash });
            }
            Err((reason, detail)) => {
                spans::record_error_with_context(
                    &format!("{reason:?}"),
                    &reason.to_string(),
                    detail.as_deref(),
                );
                warn!(reason = %reason, detail = ?detail, event = "execution_failed");
                attempt.failure_reason = Some(reason);
                attempt.failure_detail = detail;
                self.transition(ExecutionState::Failed(reason));
            }
        }

        attempt.transitions = self
            .transitions
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default();
        Ok(attempt)
    }

    async fn drive(
        &self,
        route: &Route,
        attempt: &mut ExecutionAttempt,
    ) -> std::result::Result<TxHash, Failure> {
        self.ensure_network(route.required_chain_id).await?;

        self.transition(ExecutionState::Submitting);
        let tx_hash = match self.wallet.sign_and_send(build_transaction(route)).await {
            Ok(tx_hash) => tx_hash,
            Err(BridgeError::UserRejected) => return Err((FailureReason::UserRejected, None)),
            Err(e) => {
                return Err((FailureReason::TransactionReverted, Some(e.to_string())));
            }
        };

        attempt.submitted_tx_hash = Some(tx_hash);
        tracing::Span::current().record("tx_hash", tracing::field::display(tx_hash));
        info!(tx_hash = %tx_hash, event = "transaction_submitted");
        self.transition(ExecutionState::AwaitingConfirmation { tx_hash });

        match self.wallet.wait_for_confirmation(tx_hash).await {
            Ok(ConfirmationOutcome::Confirmed) => Ok(tx_hash),
            Ok(ConfirmationOutcome::Reverted) => Err((FailureReason::TransactionReverted, None)),
            Ok(ConfirmationOutcome::Timeout) => Err((FailureReason::ConfirmationTimeout, None)),
            Err(e) => Err((FailureReason::ConfirmationTimeout, Some(e.to_string()))),
        }
    }

    /// Loops between checking and switching until the wallet sits on
    /// `required`. The chain is re-read after every switch.
    async fn ensure_network(&self, required: u64) -> std::result::Result<(), Failure> {
        for check in 1..=MAX_NETWORK_CHECKS {
            let current = self
                .wallet
                .connected_chain_id()
                .await
                .map_err(|e| (FailureReason::WalletUnavailable, Some(e.to_string())))?;
            if current == required {
                return Ok(());
            }
            if check == MAX_NETWORK_CHECKS {
                break;
            }

            info!(
                current_chain = current,
                required_chain = required,
                event = "network_switch_requested"
            );
            self.transition(ExecutionState::NetworkSwitching {
                target_chain_id: required,
            });

            match self.wallet.request_chain_switch(required).await {
                Ok(SwitchOutcome::Switched) => self.transition(ExecutionState::NetworkCheck),
                Ok(SwitchOutcome::Rejected) => {
                    return Err((FailureReason::NetworkSwitchRejected, None))
                }
                Ok(SwitchOutcome::Unsupported) | Err(BridgeError::ChainNotConfigured { .. }) => {
                    return Err((FailureReason::ChainNotConfigured, None))
                }
                Err(e) => {
                    return Err((FailureReason::NetworkSwitchRejected, Some(e.to_string())))
                }
            }
        }

        Err((
            FailureReason::NetworkSwitchRejected,
            Some(format!(
                "wallet did not settle on chain {required} after {MAX_NETWORK_CHECKS} checks"
            )),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{fixtures::quote_step, normalize_quote_response};
    use crate::testing::FakeWallet;
    use alloy_primitives::{Bytes, U256};

    fn route_on(chain_id: u64) -> Route {
        let mut route = normalize_quote_response(&quote_step()).remove(0);
        route.required_chain_id = chain_id;
        route
    }

    #[tokio::test]
    async fn test_happy_path_on_matching_chain() {
        let wallet = Arc::new(FakeWallet::new(1));
        let controller = ExecutionController::new(wallet.clone());

        let attempt = controller.run(&route_on(1)).await.unwrap();

        assert!(attempt.confirmed);
        let tx_hash = attempt.submitted_tx_hash.unwrap();
        assert_eq!(
            attempt.transitions,
            vec![
                ExecutionState::NetworkCheck,
                ExecutionState::Submitting,
                ExecutionState::AwaitingConfirmation { tx_hash },
                ExecutionState::Confirmed { tx_hash },
            ]
        );
        assert!(wallet.switch_requests().is_empty());
        assert_eq!(attempt.into_result().unwrap(), tx_hash);
    }

    #[tokio::test]
    async fn test_switches_network_before_submitting() {
        let wallet = Arc::new(FakeWallet::new(1));
        let controller = ExecutionController::new(wallet.clone());

        let attempt = controller.run(&route_on(137)).await.unwrap();

        assert!(attempt.confirmed);
        assert_eq!(
            &attempt.transitions[..4],
            &[
                ExecutionState::NetworkCheck,
                ExecutionState::NetworkSwitching {
                    target_chain_id: 137
                },
                ExecutionState::NetworkCheck,
                ExecutionState::Submitting,
            ]
        );
        assert_eq!(wallet.switch_requests(), vec![137]);
    }

    #[tokio::test]
    async fn test_chain_drift_after_switch_is_rechecked() {
        let wallet = Arc::new(FakeWallet::new(1));
        wallet.drift_after_switch(Some(10));
        let controller = ExecutionController::new(wallet.clone());

        let attempt = controller.run(&route_on(137)).await.unwrap();

        assert_eq!(
            attempt.failure_reason,
            Some(FailureReason::NetworkSwitchRejected)
        );
        assert_eq!(wallet.switch_requests().len(), 2);
        assert!(wallet.sent_transactions().is_empty());
    }

    #[tokio::test]
    async fn test_switch_rejected_and_unsupported() {
        let wallet = Arc::new(FakeWallet::new(1));
        wallet.set_switch_outcome(SwitchOutcome::Rejected);
        let controller = ExecutionController::new(wallet.clone());
        let attempt = controller.run(&route_on(137)).await.unwrap();
        assert_eq!(
            attempt.failure_reason,
            Some(FailureReason::NetworkSwitchRejected)
        );
        assert!(attempt.failure_reason.unwrap().keeps_route());

        wallet.set_switch_outcome(SwitchOutcome::Unsupported);
        let attempt = controller.run(&route_on(137)).await.unwrap();
        assert_eq!(attempt.failure_reason, Some(FailureReason::ChainNotConfigured));
        assert!(matches!(
            attempt.into_result(),
            Err(BridgeError::ChainNotConfigured { chain_id: 137 })
        ));
    }

    #[tokio::test]
    async fn test_user_rejection() {
        let wallet = Arc::new(FakeWallet::new(1));
        wallet.reject_signatures(true);
        let controller = ExecutionController::new(wallet);

        let attempt = controller.run(&route_on(1)).await.unwrap();

        assert_eq!(attempt.failure_reason, Some(FailureReason::UserRejected));
        assert_eq!(attempt.submitted_tx_hash, None);
        assert_eq!(
            controller.state(),
            ExecutionState::Failed(FailureReason::UserRejected)
        );
    }

    #[tokio::test]
    async fn test_revert_and_timeout() {
        let wallet = Arc::new(FakeWallet::new(1));
        let controller = ExecutionController::new(wallet.clone());

        wallet.set_confirmation(ConfirmationOutcome::Reverted);
        let attempt = controller.run(&route_on(1)).await.unwrap();
        assert_eq!(
            attempt.failure_reason,
            Some(FailureReason::TransactionReverted)
        );
        assert!(attempt.submitted_tx_hash.is_some());
        assert!(!attempt.failure_reason.unwrap().keeps_route());

        wallet.set_confirmation(ConfirmationOutcome::Timeout);
        let attempt = controller.run(&route_on(1)).await.unwrap();
        assert!(matches!(
            attempt.into_result(),
            Err(BridgeError::ConfirmationTimeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_submission_failure_is_reverted_class() {
        let wallet = Arc::new(FakeWallet::new(1));
        wallet.fail_submissions(Some("quote expired"));
        let controller = ExecutionController::new(wallet);

        let attempt = controller.run(&route_on(1)).await.unwrap();

        assert_eq!(
            attempt.failure_reason,
            Some(FailureReason::TransactionReverted)
        );
        assert!(attempt.failure_detail.unwrap().contains("quote expired"));
    }

    #[tokio::test]
    async fn test_second_attempt_rejected_while_submitting() {
        let wallet = Arc::new(FakeWallet::new(1));
        wallet.hold_signatures();
        let controller = Arc::new(ExecutionController::new(wallet.clone()));
        let mut progress = controller.subscribe();

        let first = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.run(&route_on(1)).await })
        };
        progress
            .wait_for(|s| *s == ExecutionState::Submitting)
            .await
            .unwrap();

        let second = controller.run(&route_on(1)).await;
        assert!(matches!(second, Err(BridgeError::ExecutionInProgress)));
        assert_eq!(controller.state(), ExecutionState::Submitting);

        wallet.release_signatures();
        let first = first.await.unwrap().unwrap();
        assert!(first.confirmed);
        assert_eq!(wallet.sent_transactions().len(), 1);
    }

    #[tokio::test]
    async fn test_abandoned_controller_stops_publishing() {
        let wallet = Arc::new(FakeWallet::new(1));
        wallet.hold_confirmations();
        let controller = Arc::new(ExecutionController::new(wallet.clone()));
        let mut progress = controller.subscribe();

        let task = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.run(&route_on(1)).await })
        };
        progress
            .wait_for(|s| matches!(s, ExecutionState::AwaitingConfirmation { .. }))
            .await
            .unwrap();

        controller.abandon();
        wallet.release_confirmations();
        let attempt = task.await.unwrap().unwrap();

        assert!(attempt.confirmed);
        assert!(matches!(
            controller.state(),
            ExecutionState::AwaitingConfirmation { .. }
        ));
    }

    #[test]
    fn test_transaction_is_built_verbatim() {
        let route = route_on(1);
        let tx = build_transaction(&route);

        assert_eq!(tx.to, Some(route.transaction_request.to.into()));
        assert_eq!(
            tx.input.input(),
            Some(&Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]))
        );
        assert_eq!(tx.value, Some(U256::ZERO));
        assert_eq!(tx.chain_id, Some(1));
        assert_eq!(tx.gas, Some(200_000));
    }
}
