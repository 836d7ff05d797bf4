//! Alloy-based balance reads and transaction signing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_network::{Ethereum, ReceiptResponse, TransactionBuilder};
use alloy_primitives::{Address, TxHash, U256};
use alloy_provider::Provider;
use alloy_rpc_types::TransactionRequest;
use async_trait::async_trait;
use tracing::{debug, info, instrument, trace, warn, Instrument};

use crate::config::PollingConfig;
use crate::contracts::erc20::Erc20Contract;
use crate::error::{BridgeError, Result};
use crate::spans;
use crate::traits::{BalanceProvider, Clock, ConfirmationOutcome, SwitchOutcome, Wallet};

/// JSON-RPC error code wallets use for "user rejected the request".
const USER_REJECTED_CODE: i64 = 4001;

/// Production balance reader over one Alloy provider per chain.
///
/// # Examples
///
/// ```rust,no_run
/// use xchain_bridge::providers::AlloyBalanceProvider;
/// use alloy_provider::ProviderBuilder;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mainnet = ProviderBuilder::new().connect("https://eth.llamarpc.com").await?;
/// let balances = AlloyBalanceProvider::new().with_chain(1, mainnet);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AlloyBalanceProvider<P> {
    providers: HashMap<u64, P>,
}

impl<P> Default for AlloyBalanceProvider<P> {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }
}

impl<P> AlloyBalanceProvider<P>
where
    P: Provider<Ethereum> + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the read provider for `chain_id`.
    pub fn with_chain(mut self, chain_id: u64, provider: P) -> Self {
        self.providers.insert(chain_id, provider);
        self
    }

    fn provider(&self, chain_id: u64) -> Result<&P> {
        self.providers
            .get(&chain_id)
            .ok_or(BridgeError::ChainNotConfigured { chain_id })
    }
}

#[async_trait]
impl<P> BalanceProvider for AlloyBalanceProvider<P>
where
    P: Provider<Ethereum> + Clone + Send + Sync,
{
    #[instrument(skip(self), fields(owner = %owner))]
    async fn native_balance(&self, chain_id: u64, owner: Address) -> Result<U256> {
        trace!("Fetching native balance");
        let balance = self.provider(chain_id)?.get_balance(owner).await?;
        debug!(balance = %balance, "Native balance retrieved");
        Ok(balance)
    }

    #[instrument(skip(self), fields(token = %token, owner = %owner))]
    async fn token_balance(&self, chain_id: u64, token: Address, owner: Address) -> Result<U256> {
        let contract = Erc20Contract::new(token, self.provider(chain_id)?.clone());
        contract
            .balance_of(owner)
            .await
            .map_err(|e| BridgeError::Provider(e.to_string()))
    }
}

/// Production wallet backed by Alloy signing providers, one per chain.
///
/// Each provider must carry a wallet filler for `address`. Switching
/// networks selects a different provider; switching to a chain that has no
/// provider reports [`SwitchOutcome::Unsupported`]. Confirmation is detected
/// by polling for the receipt on the chain the transaction was sent to.
///
/// # Examples
///
/// ```rust,no_run
/// use xchain_bridge::providers::{AlloyWallet, TokioClock};
/// use xchain_bridge::PollingConfig;
/// use alloy_primitives::Address;
/// use alloy_provider::ProviderBuilder;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let provider = ProviderBuilder::new().connect("http://localhost:8545").await?;
/// let wallet = AlloyWallet::new(Address::ZERO, 1, TokioClock::new())
///     .with_chain(1, provider)
///     .with_polling(PollingConfig::default().with_poll_interval_secs(2));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AlloyWallet<P, C> {
    address: Address,
    providers: HashMap<u64, P>,
    current_chain: Arc<AtomicU64>,
    submitted: Arc<Mutex<HashMap<TxHash, u64>>>,
    polling: PollingConfig,
    clock: C,
}

impl<P, C> AlloyWallet<P, C>
where
    P: Provider<Ethereum> + Clone,
    C: Clock,
{
    pub fn new(address: Address, chain_id: u64, clock: C) -> Self {
        Self {
            address,
            providers: HashMap::new(),
            current_chain: Arc::new(AtomicU64::new(chain_id)),
            submitted: Arc::new(Mutex::new(HashMap::new())),
            polling: PollingConfig::default(),
            clock,
        }
    }

    /// Registers the signing provider for `chain_id`.
    pub fn with_chain(mut self, chain_id: u64, provider: P) -> Self {
        self.providers.insert(chain_id, provider);
        self
    }

    pub fn with_polling(mut self, polling: PollingConfig) -> Self {
        self.polling = polling;
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    fn provider(&self, chain_id: u64) -> Result<&P> {
        self.providers
            .get(&chain_id)
            .ok_or(BridgeError::ChainNotConfigured { chain_id })
    }

    fn chain_of(&self, tx_hash: &TxHash) -> u64 {
        self.submitted
            .lock()
            .ok()
            .and_then(|submitted| submitted.get(tx_hash).copied())
            .unwrap_or_else(|| self.current_chain.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl<P, C> Wallet for AlloyWallet<P, C>
where
    P: Provider<Ethereum> + Clone + Send + Sync,
    C: Clock,
{
    async fn connected_chain_id(&self) -> Result<u64> {
        Ok(self.current_chain.load(Ordering::SeqCst))
    }

    #[instrument(skip(self))]
    async fn request_chain_switch(&self, chain_id: u64) -> Result<SwitchOutcome> {
        if !self.providers.contains_key(&chain_id) {
            debug!(event = "chain_not_configured");
            return Ok(SwitchOutcome::Unsupported);
        }
        self.current_chain.store(chain_id, Ordering::SeqCst);
        info!(chain_id = chain_id, event = "network_switched");
        Ok(SwitchOutcome::Switched)
    }

    #[instrument(skip(self, tx), fields(to = ?tx.to))]
    async fn sign_and_send(&self, tx: TransactionRequest) -> Result<TxHash> {
        let chain_id = self.current_chain.load(Ordering::SeqCst);
        let provider = self.provider(chain_id)?;
        let tx = tx.with_from(self.address);

        let pending = provider.send_transaction(tx).await.map_err(|e| {
            if e.as_error_resp().map(|payload| payload.code) == Some(USER_REJECTED_CODE) {
                BridgeError::UserRejected
            } else {
                BridgeError::from(e)
            }
        })?;
        let tx_hash = *pending.tx_hash();

        if let Ok(mut submitted) = self.submitted.lock() {
            submitted.insert(tx_hash, chain_id);
        }
        info!(tx_hash = %tx_hash, chain_id = chain_id, event = "transaction_broadcast");
        Ok(tx_hash)
    }

    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> Result<ConfirmationOutcome> {
        let chain_id = self.chain_of(&tx_hash);
        let provider = self.provider(chain_id)?;
        let span = spans::wait_for_confirmation(tx_hash, chain_id, self.polling.max_attempts);

        async move {
            let interval = Duration::from_secs(self.polling.poll_interval_secs);
            for attempt in 1..=self.polling.max_attempts {
                match provider.get_transaction_receipt(tx_hash).await {
                    Ok(Some(receipt)) => {
                        let outcome = if receipt.status() {
                            ConfirmationOutcome::Confirmed
                        } else {
                            ConfirmationOutcome::Reverted
                        };
                        info!(
                            tx_hash = %tx_hash,
                            block_number = ?receipt.block_number(),
                            outcome = ?outcome,
                            event = "receipt_received"
                        );
                        return Ok(outcome);
                    }
                    Ok(None) => {
                        trace!(attempt = attempt, "Receipt not available yet");
                    }
                    Err(e) => {
                        warn!(attempt = attempt, error = %e, event = "receipt_poll_failed");
                    }
                }

                if attempt < self.polling.max_attempts {
                    self.clock.sleep(interval).await;
                }
            }

            warn!(
                tx_hash = %tx_hash,
                timeout_secs = self.polling.total_timeout_secs(),
                event = "confirmation_timeout"
            );
            Ok(ConfirmationOutcome::Timeout)
        }
        .instrument(span)
        .await
    }
}
