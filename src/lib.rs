//! # xchain-bridge
//!
//! Quote acquisition and trade execution for a cross-chain bridging
//! front-end built on the LI.FI route aggregator.
//!
//! The crate owns the decisions between "the user picked two tokens" and
//! "the bridge transaction confirmed": it validates input, fetches and
//! normalizes quotes, derives display figures, drives the wallet through a
//! network check, signature and confirmation, and reads balances without
//! letting stale answers overwrite fresh ones. Rendering is left to the
//! caller, which watches a [`SessionSnapshot`] and the
//! [`ExecutionState`] channel.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use xchain_bridge::providers::{AlloyBalanceProvider, AlloyWallet, LiFiClient, TokioClock};
//! use xchain_bridge::{AggregatorConfig, BridgeSession, WalletEvent};
//! use alloy_primitives::address;
//! use alloy_provider::ProviderBuilder;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let owner = address!("742d35Cc6634C0532925a3b844Bc9e7595f8fA0d");
//! let mainnet = ProviderBuilder::new().connect("http://localhost:8545").await?;
//!
//! let session = BridgeSession::builder()
//!     .aggregator(LiFiClient::new(AggregatorConfig::from_env()?)?)
//!     .wallet(AlloyWallet::new(owner, 1, TokioClock::new()).with_chain(1, mainnet.clone()))
//!     .balances(AlloyBalanceProvider::new().with_chain(1, mainnet))
//!     .clock(TokioClock::new())
//!     .build();
//!
//! session.open().await?;
//! session
//!     .handle_wallet_event(WalletEvent::Connected { address: owner, chain_id: 1 })
//!     .await;
//! session.select_from_chain(1).await?;
//! session.select_to_chain(137).await?;
//! session.select_from_token("0x0000000000000000000000000000000000000000").await?;
//! session.select_to_token("0x3c499c542cef5e3811e1192ce70d8cc03d5c3359").await?;
//! session.set_amount("0.25").await?;
//!
//! let route = session.request_quote().await?;
//! println!("{}", xchain_bridge::evaluator::summarize(&route).exchange_rate);
//!
//! let attempt = session.execute().await?;
//! println!("{:?}", attempt.into_result());
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! Every external party is behind a trait in [`traits`], and [`testing`]
//! provides fakes that can reject, revert, stall or fail on demand.
//!
//! ## Public API
//!
//! - [`BridgeSession`] - the session state machine
//! - [`QuoteEngine`] and [`TradeRequest`] - quote acquisition on its own
//! - [`ExecutionController`] - wallet-driven execution of one route
//! - [`RegistryClient`] and [`BalanceReader`] - registry and balance reads
//! - [`BridgeError`] and [`Result`] - error handling
//! - [`units`] and [`evaluator`] - amount conversion and route figures

pub mod balance;
pub mod config;
mod contracts;
mod error;
pub mod evaluator;
pub mod execution;
mod protocol;
pub mod providers;
pub mod quote;
pub mod registry;
pub mod session;
pub mod testing;
pub mod traits;
pub mod units;

pub use balance::{BalanceReader, BalanceReading};
pub use config::{AggregatorConfig, IntegratorFee, PollingConfig, SessionConfig};
pub use contracts::erc20::Erc20Contract;
pub use error::{BridgeError, Result};
pub use evaluator::RouteSummary;
pub use execution::{ExecutionAttempt, ExecutionController, ExecutionState, FailureReason};
pub use protocol::{
    lowercase_hex, normalize_quote_response, parse_address, Chain, FeeCost, GasCost, Route,
    RouteStep, StepKind, Token, TransactionData, NATIVE_TOKEN,
};
pub use quote::{QuoteEngine, QuoteQuery, TradeRequest};
pub use registry::{Registry, RegistryClient};
pub use session::{BridgeSession, SessionSnapshot, SessionStep, WalletEvent};

// Public module for advanced users who need custom instrumentation
pub mod spans;
