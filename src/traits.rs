//! Collaborator seams for the bridge core.
//!
//! The route aggregator, the user's wallet, chain reads and time are all
//! reached through the traits in this module. Production implementations live
//! in [`crate::providers`]; [`crate::testing`] has fakes that can simulate
//! rejections, reverts, stalls and outages.
//!
//! # Example: Implementing a Test Fake
//!
//! ```rust,ignore
//! use xchain_bridge::traits::{SwitchOutcome, Wallet};
//!
//! struct AlwaysOnMainnet;
//!
//! #[async_trait::async_trait]
//! impl Wallet for AlwaysOnMainnet {
//!     async fn connected_chain_id(&self) -> Result<u64> {
//!         Ok(1)
//!     }
//!
//!     async fn request_chain_switch(&self, _chain_id: u64) -> Result<SwitchOutcome> {
//!         Ok(SwitchOutcome::Rejected)
//!     }
//!     // ...
//! }
//! ```

use std::collections::HashMap;
use std::time::{Duration, Instant};

use alloy_primitives::{Address, TxHash, U256};
use alloy_rpc_types::TransactionRequest;
use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::protocol::{Chain, Token};
use crate::quote::QuoteQuery;

/// Read access to the route aggregator's HTTP API.
///
/// # Test Scenarios
///
/// Implementing this trait with fakes enables testing:
/// - Registry outages blocking quotes
/// - Quotes without a transaction request (no route)
/// - Aggregator error messages surfaced to the user
#[async_trait]
pub trait AggregatorApi: Send + Sync {
    /// Lists the chains the aggregator supports.
    async fn get_chains(&self) -> Result<Vec<Chain>>;

    /// Lists tradable tokens keyed by chain id.
    async fn get_tokens(&self) -> Result<HashMap<u64, Vec<Token>>>;

    /// Requests a quote and returns the raw payload.
    ///
    /// The payload is normalized by the quote engine; implementations should
    /// not interpret it beyond HTTP status handling.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::AggregatorUnavailable`](crate::BridgeError::AggregatorUnavailable)
    /// on transport failure or a non-success status.
    async fn get_quote(&self, query: &QuoteQuery) -> Result<Value>;
}

/// Result of asking the wallet to change networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    Switched,
    /// The user declined the prompt.
    Rejected,
    /// The wallet does not know the chain.
    Unsupported,
}

/// Result of waiting for a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Confirmed,
    Reverted,
    Timeout,
}

/// Signing capability supplied by the connected wallet.
///
/// Connection management is not part of this trait: the session learns about
/// connects and disconnects through [`WalletEvent`](crate::WalletEvent)s.
///
/// # Test Scenarios
///
/// - Network switch rejected or chain unknown to the wallet
/// - Chain changing again while a switch resolves
/// - Signature rejected
/// - Reverted or never-mined transactions
#[async_trait]
pub trait Wallet: Send + Sync {
    /// The chain the wallet is currently connected to.
    async fn connected_chain_id(&self) -> Result<u64>;

    /// Asks the wallet to switch networks. May wait on human approval.
    async fn request_chain_switch(&self, chain_id: u64) -> Result<SwitchOutcome>;

    /// Signs and broadcasts `tx`. May wait on human approval.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UserRejected`](crate::BridgeError::UserRejected)
    /// when the user declines to sign.
    async fn sign_and_send(&self, tx: TransactionRequest) -> Result<TxHash>;

    /// Waits until `tx_hash` is mined, reverted or given up on.
    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> Result<ConfirmationOutcome>;
}

/// Read-only balance lookups on a given chain.
#[async_trait]
pub trait BalanceProvider: Send + Sync {
    /// Balance of the chain's native coin.
    async fn native_balance(&self, chain_id: u64, owner: Address) -> Result<U256>;

    /// ERC-20 `balanceOf(owner)` on `token`.
    async fn token_balance(&self, chain_id: u64, token: Address, owner: Address) -> Result<U256>;
}

/// Trait for time-based operations.
///
/// This trait abstracts sleep and time queries, enabling fast-forward testing
/// where tests can instantly advance through polling loops and display delays
/// without actually waiting.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Asynchronously sleeps for the given duration.
    async fn sleep(&self, duration: Duration);

    /// Returns the current instant in time.
    fn now(&self) -> Instant;
}
