use alloy_primitives::{Address, TxHash};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Invalid amount {input:?}: {reason}")]
    InvalidAmount { input: String, reason: String },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Chain/token registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("Chain/token registry has not been loaded yet")]
    RegistryNotReady,

    #[error("Unknown chain: {chain_id}")]
    UnknownChain { chain_id: u64 },

    #[error("Unknown token {address} on chain {chain_id}")]
    UnknownToken { chain_id: u64, address: Address },

    #[error("No route found for the requested transfer")]
    NoRouteFound,

    #[error("Aggregator unavailable: {message}")]
    AggregatorUnavailable {
        status: Option<u16>,
        message: String,
    },

    #[error("Network switch to chain {chain_id} was rejected")]
    NetworkSwitchRejected { chain_id: u64 },

    #[error("Chain {chain_id} is not configured in the wallet")]
    ChainNotConfigured { chain_id: u64 },

    #[error("Transaction rejected by the user")]
    UserRejected,

    #[error("Transaction {tx_hash} reverted")]
    TransactionReverted { tx_hash: TxHash },

    #[error("Timed out waiting for confirmation of {tx_hash}")]
    ConfirmationTimeout { tx_hash: TxHash },

    #[error("Wallet is not connected")]
    WalletNotConnected,

    #[error("An execution attempt is already in progress")]
    ExecutionInProgress,

    #[error("No route selected")]
    NoRouteSelected,

    #[error("No {side} token selected")]
    TokenNotSelected { side: &'static str },

    #[error("Superseded by a newer request")]
    Superseded,

    #[error("Cannot {action} while in {from}")]
    InvalidState { from: String, action: &'static str },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("RPC error: {0}")]
    Rpc(#[from] alloy_json_rpc::RpcError<alloy_transport::TransportErrorKind>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl BridgeError {
    /// Errors caught locally before any network request is issued.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidAmount { .. }
                | Self::InvalidAddress(_)
                | Self::RegistryNotReady
                | Self::UnknownChain { .. }
                | Self::UnknownToken { .. }
                | Self::TokenNotSelected { .. }
        )
    }

    /// Errors raised by the wallet while switching networks or submitting.
    ///
    /// These return the session to a retryable step instead of closing it.
    pub fn is_wallet_error(&self) -> bool {
        matches!(
            self,
            Self::NetworkSwitchRejected { .. }
                | Self::ChainNotConfigured { .. }
                | Self::UserRejected
                | Self::TransactionReverted { .. }
                | Self::ConfirmationTimeout { .. }
        )
    }

    pub(crate) fn invalid_amount(input: &str, reason: impl Into<String>) -> Self {
        Self::InvalidAmount {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
