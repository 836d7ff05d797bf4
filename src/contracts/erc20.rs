// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
//! ERC20 contract bindings for balance reads

use alloy_network::Ethereum;
use alloy_primitives::{Address, U256};
use alloy_provider::Provider;
use alloy_sol_types::sol;
use tracing::debug;

use Erc20::Erc20Instance;

/// Read-only ERC20 wrapper used for token balances.
///
/// # Example
///
/// ```rust,no_run
/// use xchain_bridge::Erc20Contract;
/// use alloy_primitives::address;
/// use alloy_provider::ProviderBuilder;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let provider = ProviderBuilder::new().connect("http://localhost:8545").await?;
/// let usdc = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
///
/// let erc20 = Erc20Contract::new(usdc, provider);
/// let owner = address!("1234567890123456789012345678901234567890");
/// let balance = erc20.balance_of(owner).await?;
/// # Ok(())
/// # }
/// ```
pub struct Erc20Contract<P: Provider<Ethereum>> {
    instance: Erc20Instance<P>,
}

impl<P: Provider<Ethereum>> Erc20Contract<P> {
    pub fn new(address: Address, provider: P) -> Self {
        Self {
            instance: Erc20Instance::new(address, provider),
        }
    }

    /// `balanceOf(account)` as a raw base-unit amount.
    pub async fn balance_of(&self, account: Address) -> Result<U256, alloy_contract::Error> {
        let result = self.instance.balanceOf(account).call().await?;

        debug!(
            account = %account,
            balance = %result,
            contract_address = %self.instance.address(),
            event = "token_balance_retrieved"
        );

        Ok(result)
    }
}

sol!(
    #[allow(missing_docs)]
    #[sol(rpc)]
    contract Erc20 {
        function balanceOf(address account) external view returns (uint256);
    }
);
