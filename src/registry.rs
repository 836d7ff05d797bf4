//! Chain and token registry.
//!
//! The registry is fetched once per session open and held as an immutable
//! [`Registry`] snapshot. Lookups never go back to the network.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::Address;
use tracing::{info, Instrument};

use crate::error::{BridgeError, Result};
use crate::protocol::{parse_address, Chain, Token};
use crate::spans;
use crate::traits::AggregatorApi;

/// Immutable snapshot of supported chains and their tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    chains: Vec<Chain>,
    tokens: HashMap<u64, Vec<Token>>,
}

impl Registry {
    pub fn new(chains: Vec<Chain>, tokens: HashMap<u64, Vec<Token>>) -> Self {
        Self { chains, tokens }
    }

    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    pub fn chain(&self, chain_id: u64) -> Option<&Chain> {
        self.chains.iter().find(|c| c.id == chain_id)
    }

    /// Tokens tradable on `chain_id`; empty for unknown chains.
    pub fn tokens_for(&self, chain_id: u64) -> &[Token] {
        self.tokens.get(&chain_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn token(&self, chain_id: u64, address: Address) -> Option<&Token> {
        self.tokens_for(chain_id)
            .iter()
            .find(|t| t.address == address)
    }

    /// Looks a token up by its textual address in any letter case.
    pub fn find_token(&self, chain_id: u64, address: &str) -> Option<&Token> {
        parse_address(address).and_then(|address| self.token(chain_id, address))
    }

    /// Like [`Registry::token`] but with a typed error for the miss.
    pub fn require_token(&self, chain_id: u64, address: Address) -> Result<&Token> {
        self.token(chain_id, address)
            .ok_or(BridgeError::UnknownToken { chain_id, address })
    }

    pub fn require_chain(&self, chain_id: u64) -> Result<&Chain> {
        self.chain(chain_id)
            .ok_or(BridgeError::UnknownChain { chain_id })
    }
}

/// Loads [`Registry`] snapshots from the aggregator.
#[derive(Debug, Clone)]
pub struct RegistryClient<A> {
    api: A,
}

impl<A: AggregatorApi> RegistryClient<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    /// Fetches chains and tokens concurrently.
    ///
    /// # Errors
    ///
    /// Any failure of either request is reported as
    /// [`BridgeError::RegistryUnavailable`]; dependent actions stay blocked
    /// until a later load succeeds.
    pub async fn load(&self) -> Result<Arc<Registry>> {
        let span = spans::load_registry();
        async move {
            let (chains, tokens) =
                tokio::try_join!(self.api.get_chains(), self.api.get_tokens()).map_err(|e| {
                    spans::record_error(&e);
                    BridgeError::RegistryUnavailable(e.to_string())
                })?;

            let token_count: usize = tokens.values().map(Vec::len).sum();
            let span = tracing::Span::current();
            span.record("chains", chains.len());
            span.record("tokens", token_count);
            info!(
                chains = chains.len(),
                tokens = token_count,
                event = "registry_loaded"
            );

            Ok(Arc::new(Registry::new(chains, tokens)))
        }
        .instrument(span)
        .await
    }
}
