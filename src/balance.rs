//! Balance reads with last-request-wins sequencing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use tracing::{warn, Instrument};

use crate::protocol::Token;
use crate::spans;
use crate::traits::BalanceProvider;

/// Outcome of one balance read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceReading {
    /// Sequence number of the request that produced this reading.
    pub seq: u64,
    pub amount: U256,
    /// The read failed and `amount` is a zero placeholder.
    pub degraded: bool,
}

/// Reads spendable balances for the `(owner, chain, token)` in view.
///
/// Every read is stamped with a monotonically increasing sequence number.
/// A reading may only be displayed while [`BalanceReader::is_current`] holds
/// for it; anything older was superseded by a later request.
#[derive(Debug, Clone)]
pub struct BalanceReader<B> {
    provider: B,
    seq: Arc<AtomicU64>,
}

impl<B: BalanceProvider> BalanceReader<B> {
    pub fn new(provider: B) -> Self {
        Self {
            provider,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Sequence number of the most recent request.
    pub fn latest_seq(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, reading: &BalanceReading) -> bool {
        reading.seq == self.latest_seq()
    }

    /// Marks every in-flight read as superseded without issuing a new one.
    pub fn invalidate(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Reads `owner`'s balance of `token`.
    ///
    /// The native-coin sentinel reads the chain balance; anything else is an
    /// ERC-20 `balanceOf`. A failed read is logged and reported as a degraded
    /// zero rather than an error.
    pub async fn get_balance(&self, owner: Address, token: &Token) -> BalanceReading {
        let seq = self.invalidate();
        let span = spans::read_balance(token.chain_id, &token.address, &owner, seq);

        async move {
            let result = if token.is_native() {
                self.provider.native_balance(token.chain_id, owner).await
            } else {
                self.provider
                    .token_balance(token.chain_id, token.address, owner)
                    .await
            };

            match result {
                Ok(amount) => BalanceReading {
                    seq,
                    amount,
                    degraded: false,
                },
                Err(e) => {
                    warn!(
                        chain_id = token.chain_id,
                        token = %token.symbol,
                        error = %e,
                        event = "balance_read_failed"
                    );
                    BalanceReading {
                        seq,
                        amount: U256::ZERO,
                        degraded: true,
                    }
                }
            }
        }
        .instrument(span)
        .await
    }
}
