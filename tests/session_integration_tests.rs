//! End-to-end session tests against fake collaborators.
//!
//! Every scenario drives a [`BridgeSession`] the way a front-end would:
//! wallet events in, selections and amounts set, then quote and execute.

use std::collections::HashMap;
use std::time::Duration;

use alloy_primitives::{address, Address, U256};
use serde_json::{json, Value};
use xchain_bridge::testing::{FakeAggregator, FakeBalanceProvider, FakeClock, FakeWallet};
use xchain_bridge::traits::{ConfirmationOutcome, SwitchOutcome};
use xchain_bridge::{
    BridgeError, BridgeSession, Chain, ExecutionState, FailureReason, SessionConfig, SessionStep,
    Token, WalletEvent,
};

const OWNER: Address = address!("1111111111111111111111111111111111111111");
const OTHER: Address = address!("2222222222222222222222222222222222222222");
const USDC_ETH: Address = address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
const USDC_POLYGON: Address = address!("3c499c542cef5e3811e1192ce70d8cc03d5c3359");

type Session = BridgeSession<FakeAggregator, FakeWallet, FakeBalanceProvider, FakeClock>;

struct Harness {
    session: Session,
    api: FakeAggregator,
    wallet: FakeWallet,
    balances: FakeBalanceProvider,
    clock: FakeClock,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn quote_payload() -> Value {
    json!({
        "id": "quote-1",
        "type": "lifi",
        "tool": "stargate",
        "toolDetails": { "name": "Stargate" },
        "action": {
            "fromChainId": 1,
            "toChainId": 137,
            "fromToken": { "address": "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", "chainId": 1, "symbol": "USDC", "decimals": 6 },
            "toToken": { "address": "0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359", "chainId": 137, "symbol": "USDC", "decimals": 6 },
            "fromAmount": "100000000",
            "slippage": 0.005
        },
        "estimate": {
            "fromAmount": "100000000",
            "toAmount": "99500000",
            "toAmountMin": "99000000",
            "fromAmountUSD": "100.00",
            "toAmountUSD": "99.50",
            "executionDuration": 61,
            "feeCosts": [
                { "name": "Integrator Fee", "percentage": "0.005", "amountUSD": "0.50" }
            ],
            "gasCosts": [ { "type": "SEND", "amountUSD": "1.25" } ]
        },
        "transactionRequest": {
            "to": "0x1231deb6f5749ef6ce6943a275a1d3e7486f4eae",
            "data": "0xdeadbeef",
            "value": "0x0",
            "chainId": 1,
            "gasLimit": "0x30d40"
        }
    })
}

fn harness() -> Harness {
    init_tracing();

    let api = FakeAggregator::new();
    api.set_registry(
        vec![
            Chain::new(1, "Ethereum").with_block_explorer_url("https://etherscan.io"),
            Chain::new(137, "Polygon").with_block_explorer_url("https://polygonscan.com"),
        ],
        HashMap::from([
            (
                1,
                vec![
                    Token::native(1, "ETH", 18),
                    Token::new(1, USDC_ETH, "USDC", 6),
                ],
            ),
            (
                137,
                vec![
                    Token::native(137, "POL", 18),
                    Token::new(137, USDC_POLYGON, "USDC", 6),
                ],
            ),
        ]),
    );
    api.set_quote(quote_payload());

    let wallet = FakeWallet::new(1);
    let balances = FakeBalanceProvider::new();
    balances.set_token(1, USDC_ETH, OWNER, U256::from(250_000_000u64));
    balances.set_native(137, OWNER, U256::from(3_000_000_000_000_000_000u128));
    let clock = FakeClock::new();

    let session = BridgeSession::builder()
        .aggregator(api.clone())
        .wallet(wallet.clone())
        .balances(balances.clone())
        .clock(clock.clone())
        .config(SessionConfig {
            success_display_delay: Duration::from_secs(5),
            balance_display_decimals: 2,
        })
        .build();

    Harness {
        session,
        api,
        wallet,
        balances,
        clock,
    }
}

/// Opens the session, connects on `chain_id`, and selects USDC 1 -> 137.
async fn ready(h: &Harness, chain_id: u64) {
    h.session.open().await.unwrap();
    h.session
        .handle_wallet_event(WalletEvent::Connected {
            address: OWNER,
            chain_id,
        })
        .await;
    h.session.select_to_chain(137).await.unwrap();
    h.session
        .select_to_token("0x3C499C542CEF5E3811E1192CE70D8CC03D5C3359")
        .await
        .unwrap();
    h.session.select_from_chain(1).await.unwrap();
    h.session
        .select_from_token("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48")
        .await
        .unwrap();
    h.session.set_amount("100").await.unwrap();
}

#[tokio::test]
async fn test_happy_path_quote_execute_and_reset() {
    let h = harness();
    ready(&h, 1).await;

    let route = h.session.request_quote().await.unwrap();
    assert_eq!(route.required_chain_id, 1);

    let snapshot = h.session.snapshot().await;
    assert_eq!(snapshot.step, SessionStep::QuoteReview);
    let summary = snapshot.summary.expect("summary for selected route");
    assert_eq!(summary.display_duration, "~2 min");
    assert_eq!(summary.minimum_received, "99");
    assert_eq!(snapshot.balance_display.as_deref(), Some("250.00"));

    let attempt = h.session.execute().await.unwrap();
    assert!(attempt.confirmed);
    assert!(attempt.transitions.contains(&ExecutionState::Submitting));
    assert_eq!(h.wallet.sent_transactions().len(), 1);
    assert!(h.wallet.switch_requests().is_empty());

    // The success screen is held for the display delay, then the trade resets.
    assert_eq!(h.clock.total_sleep_time(), Duration::from_secs(5));
    let snapshot = h.session.snapshot().await;
    assert_eq!(snapshot.step, SessionStep::TradeSetup);
    assert!(snapshot.amount.is_empty());
    assert!(snapshot.routes.is_empty());
    assert_eq!(snapshot.from_token.map(|t| t.address), Some(USDC_ETH));
    assert_eq!(snapshot.to_token.map(|t| t.address), Some(USDC_POLYGON));
    assert!(snapshot
        .explorer_url
        .expect("explorer link")
        .starts_with("https://etherscan.io/tx/0x"));
    assert_eq!(*h.session.execution_state().borrow(), ExecutionState::Idle);
}

#[tokio::test]
async fn test_zero_amount_is_rejected_before_network() {
    let h = harness();
    ready(&h, 1).await;
    h.session.set_amount("0").await.unwrap();

    let result = h.session.request_quote().await;

    assert!(matches!(result, Err(BridgeError::InvalidAmount { .. })));
    assert_eq!(h.api.quote_calls(), 0);
    assert_eq!(h.session.step().await, SessionStep::TradeSetup);
}

#[tokio::test]
async fn test_quote_requires_connected_wallet_and_tokens() {
    let h = harness();
    h.session.open().await.unwrap();

    assert!(matches!(
        h.session.request_quote().await,
        Err(BridgeError::WalletNotConnected)
    ));

    h.session
        .handle_wallet_event(WalletEvent::Connected {
            address: OWNER,
            chain_id: 1,
        })
        .await;
    assert!(matches!(
        h.session.request_quote().await,
        Err(BridgeError::TokenNotSelected { side: "source" })
    ));
    assert_eq!(h.api.quote_calls(), 0);
}

#[tokio::test]
async fn test_registry_outage_blocks_quotes() {
    let h = harness();
    h.api.fail_registry(true);

    let opened = h.session.open().await;
    assert!(matches!(opened, Err(BridgeError::RegistryUnavailable(_))));

    h.session
        .handle_wallet_event(WalletEvent::Connected {
            address: OWNER,
            chain_id: 1,
        })
        .await;
    assert!(matches!(
        h.session.request_quote().await,
        Err(BridgeError::RegistryNotReady)
    ));
    assert!(h.session.snapshot().await.banner.is_some());
}

#[tokio::test]
async fn test_aggregator_message_is_surfaced_and_selections_kept() {
    let h = harness();
    ready(&h, 1).await;
    h.api.set_quote_error(Some(400), "Invalid fromAmount");

    let result = h.session.request_quote().await;

    assert!(matches!(
        result,
        Err(BridgeError::AggregatorUnavailable { status: Some(400), .. })
    ));
    let snapshot = h.session.snapshot().await;
    assert_eq!(snapshot.step, SessionStep::TradeSetup);
    assert!(snapshot.banner.unwrap().contains("Invalid fromAmount"));
    assert_eq!(snapshot.amount, "100");
    assert!(snapshot.from_token.is_some());
}

#[tokio::test]
async fn test_success_without_transaction_is_no_route() {
    let h = harness();
    ready(&h, 1).await;
    let mut payload = quote_payload();
    payload.as_object_mut().unwrap().remove("transactionRequest");
    h.api.set_quote(payload);

    assert!(matches!(
        h.session.request_quote().await,
        Err(BridgeError::NoRouteFound)
    ));
}

#[tokio::test]
async fn test_execution_switches_wallet_to_required_chain() {
    let h = harness();
    ready(&h, 1).await;
    h.session.request_quote().await.unwrap();
    h.wallet.set_chain(137);
    h.session
        .handle_wallet_event(WalletEvent::ChainChanged { chain_id: 137 })
        .await;

    let attempt = h.session.execute().await.unwrap();

    assert!(attempt.confirmed);
    assert_eq!(h.wallet.switch_requests(), vec![1]);
    assert!(attempt.transitions.contains(&ExecutionState::NetworkSwitching {
        target_chain_id: 1
    }));
}

#[tokio::test]
async fn test_rejected_switch_returns_to_review_without_sending() {
    let h = harness();
    ready(&h, 1).await;
    h.session.request_quote().await.unwrap();
    h.wallet.set_chain(137);
    h.wallet.set_switch_outcome(SwitchOutcome::Rejected);

    let attempt = h.session.execute().await.unwrap();

    assert_eq!(
        attempt.failure_reason,
        Some(FailureReason::NetworkSwitchRejected)
    );
    assert!(h.wallet.sent_transactions().is_empty());
    let snapshot = h.session.snapshot().await;
    assert_eq!(snapshot.step, SessionStep::QuoteReview);
    assert!(snapshot.selected_route.is_some());
    assert!(snapshot.banner.is_some());
}

#[tokio::test]
async fn test_user_rejection_keeps_route_for_retry() {
    let h = harness();
    ready(&h, 1).await;
    h.session.request_quote().await.unwrap();
    h.wallet.reject_signatures(true);

    let attempt = h.session.execute().await.unwrap();
    assert_eq!(attempt.failure_reason, Some(FailureReason::UserRejected));
    assert!(matches!(
        attempt.clone().into_result(),
        Err(BridgeError::UserRejected)
    ));
    assert_eq!(h.session.step().await, SessionStep::QuoteReview);

    h.wallet.reject_signatures(false);
    let retry = h.session.execute().await.unwrap();
    assert!(retry.confirmed);
}

#[tokio::test]
async fn test_revert_returns_to_setup_with_selections() {
    let h = harness();
    ready(&h, 1).await;
    h.session.request_quote().await.unwrap();
    h.wallet.set_confirmation(ConfirmationOutcome::Reverted);

    let attempt = h.session.execute().await.unwrap();

    assert_eq!(
        attempt.failure_reason,
        Some(FailureReason::TransactionReverted)
    );
    assert!(attempt.submitted_tx_hash.is_some());
    let snapshot = h.session.snapshot().await;
    assert_eq!(snapshot.step, SessionStep::TradeSetup);
    assert!(snapshot.routes.is_empty());
    assert!(snapshot.to_token.is_some());
    assert!(snapshot.explorer_url.is_some());
    assert_eq!(h.clock.sleep_count(), 0);
}

#[tokio::test]
async fn test_second_execution_is_refused_while_submitting() {
    let h = harness();
    ready(&h, 1).await;
    h.session.request_quote().await.unwrap();
    h.wallet.hold_signatures();

    let mut state = h.session.execution_state();
    let session = h.session.clone();
    let first = tokio::spawn(async move { session.execute().await });
    state
        .wait_for(|s| *s == ExecutionState::Submitting)
        .await
        .unwrap();

    assert!(matches!(
        h.session.execute().await,
        Err(BridgeError::ExecutionInProgress)
    ));
    assert!(matches!(
        h.session.request_quote().await,
        Err(BridgeError::ExecutionInProgress)
    ));
    assert!(matches!(
        h.session.set_amount("5").await,
        Err(BridgeError::ExecutionInProgress)
    ));

    h.wallet.release_signatures();
    let attempt = first.await.unwrap().unwrap();
    assert!(attempt.confirmed);
    assert_eq!(h.wallet.sent_transactions().len(), 1);
}

#[tokio::test]
async fn test_disconnect_while_awaiting_confirmation() {
    let h = harness();
    ready(&h, 1).await;
    h.session.request_quote().await.unwrap();
    h.wallet.hold_confirmations();

    let mut state = h.session.execution_state();
    let session = h.session.clone();
    let pending = tokio::spawn(async move { session.execute().await });
    state
        .wait_for(|s| matches!(s, ExecutionState::AwaitingConfirmation { .. }))
        .await
        .unwrap();

    h.session
        .handle_wallet_event(WalletEvent::Disconnected)
        .await;
    assert_eq!(h.session.step().await, SessionStep::WalletDisconnected);
    assert_eq!(*state.borrow(), ExecutionState::Idle);

    h.wallet.release_confirmations();
    let attempt = pending.await.unwrap().unwrap();
    assert!(attempt.confirmed);

    // The late confirmation does not resurrect the session.
    assert_eq!(h.session.step().await, SessionStep::WalletDisconnected);
    assert_eq!(*state.borrow(), ExecutionState::Idle);
    assert_eq!(h.clock.sleep_count(), 0);
}

#[tokio::test]
async fn test_latest_balance_read_wins() {
    let h = harness();
    ready(&h, 1).await;
    h.balances.hold(1);

    let session = h.session.clone();
    let slow = tokio::spawn(async move {
        session
            .select_from_token("0x0000000000000000000000000000000000000000")
            .await
    });
    h.balances.wait_for_pending(1).await;

    h.session.select_from_chain(137).await.unwrap();
    h.session
        .select_from_token("0x0000000000000000000000000000000000000000")
        .await
        .unwrap();
    h.balances.release(1);
    slow.await.unwrap().unwrap();

    let snapshot = h.session.snapshot().await;
    assert_eq!(snapshot.from_chain.map(|c| c.id), Some(137));
    assert_eq!(
        snapshot.balance,
        Some(U256::from(3_000_000_000_000_000_000u128))
    );
    assert_eq!(snapshot.balance_display.as_deref(), Some("3.00"));
}

#[tokio::test]
async fn test_failed_balance_read_shows_zero() {
    let h = harness();
    h.balances.fail_chain(1);
    ready(&h, 1).await;

    let snapshot = h.session.snapshot().await;
    assert_eq!(snapshot.balance, Some(U256::ZERO));
    assert!(snapshot.balance_degraded);
}

#[tokio::test]
async fn test_swap_sides_twice_restores_selection() {
    let h = harness();
    ready(&h, 1).await;
    let before = h.session.snapshot().await;

    h.session.swap_sides().await.unwrap();
    let swapped = h.session.snapshot().await;
    assert_eq!(swapped.from_token, before.to_token);
    assert_eq!(swapped.to_chain, before.from_chain);
    assert!(h.wallet.switch_requests().is_empty());

    h.session.swap_sides().await.unwrap();
    let restored = h.session.snapshot().await;
    assert_eq!(restored.from_chain, before.from_chain);
    assert_eq!(restored.to_chain, before.to_chain);
    assert_eq!(restored.from_token, before.from_token);
    assert_eq!(restored.to_token, before.to_token);
}

#[tokio::test]
async fn test_input_change_discards_quote() {
    let h = harness();
    ready(&h, 1).await;
    h.session.request_quote().await.unwrap();

    h.session.set_amount("50").await.unwrap();

    let snapshot = h.session.snapshot().await;
    assert_eq!(snapshot.step, SessionStep::TradeSetup);
    assert!(snapshot.selected_route.is_none());
    assert!(matches!(
        h.session.execute().await,
        Err(BridgeError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn test_custom_recipient_reaches_query() {
    let h = harness();
    ready(&h, 1).await;
    h.session
        .set_recipient(Some("0x2222222222222222222222222222222222222222"))
        .await
        .unwrap();

    h.session.request_quote().await.unwrap();

    let query = h.api.last_quote_query().unwrap();
    assert_eq!(query.to_address, Some(OTHER));
    assert_eq!(query.from_amount, U256::from(100_000_000u64));
}

#[tokio::test]
async fn test_account_change_resets_trade() {
    let h = harness();
    ready(&h, 1).await;
    h.session.request_quote().await.unwrap();

    h.session
        .handle_wallet_event(WalletEvent::AccountChanged { address: OTHER })
        .await;

    let snapshot = h.session.snapshot().await;
    assert_eq!(snapshot.step, SessionStep::TradeSetup);
    assert_eq!(snapshot.address, Some(OTHER));
    assert!(snapshot.routes.is_empty());
    assert_eq!(snapshot.balance, Some(U256::ZERO));
}

#[tokio::test]
async fn test_close_discards_state() {
    let h = harness();
    ready(&h, 1).await;
    h.session.request_quote().await.unwrap();

    h.session.close().await;

    let snapshot = h.session.snapshot().await;
    assert!(!snapshot.registry_ready);
    assert!(snapshot.from_token.is_none());
    assert_eq!(snapshot.step, SessionStep::TradeSetup);
    assert!(matches!(
        h.session.request_quote().await,
        Err(BridgeError::RegistryNotReady)
    ));
}

#[tokio::test]
async fn test_reopen_while_awaiting_confirmation_releases_session() {
    let h = harness();
    ready(&h, 1).await;
    h.session.request_quote().await.unwrap();
    h.wallet.hold_confirmations();

    let mut state = h.session.execution_state();
    let session = h.session.clone();
    let pending = tokio::spawn(async move { session.execute().await });
    state
        .wait_for(|s| matches!(s, ExecutionState::AwaitingConfirmation { .. }))
        .await
        .unwrap();

    h.session.open().await.unwrap();
    assert_eq!(h.session.step().await, SessionStep::TradeSetup);
    assert_eq!(*state.borrow(), ExecutionState::Idle);

    h.wallet.release_confirmations();
    let attempt = pending.await.unwrap().unwrap();
    assert!(attempt.confirmed);

    assert_eq!(h.session.step().await, SessionStep::TradeSetup);
    assert_eq!(*state.borrow(), ExecutionState::Idle);
    assert_eq!(h.clock.sleep_count(), 0);

    h.session.set_amount("50").await.unwrap();
    h.session.reset_trade().await.unwrap();
    h.session.set_amount("100").await.unwrap();
    let route = h.session.request_quote().await.unwrap();
    assert_eq!(route.required_chain_id, 1);
}
