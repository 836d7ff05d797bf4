//! Configuration for the aggregator client, receipt polling, and the session.

use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::{address, Address};
use rust_decimal::Decimal;

use crate::error::{BridgeError, Result};
use crate::protocol::parse_address;

/// Public LI.FI API endpoint.
pub const LIFI_API: &str = "https://li.quest/v1";

/// Integrator identifier sent when none is configured.
pub const DEFAULT_INTEGRATOR: &str = "xchain-bridge";

/// Integrator fee embedded in every quote unless configured otherwise (0.5%).
pub const DEFAULT_FEE_PERCENTAGE: Decimal = Decimal::from_parts(5, 0, 0, false, 3);

/// Address collecting the default integrator fee.
pub const DEFAULT_FEE_COLLECTOR: Address = address!("34accc793fd8c2a8e262c8c95b18d706bc6022f0");

/// Default HTTP timeout for aggregator requests in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// How long the success screen stays up before the session resets.
pub const SUCCESS_DISPLAY_DELAY: Duration = Duration::from_secs(5);

/// Fractional digits shown for balances.
pub const DEFAULT_BALANCE_DISPLAY_DECIMALS: usize = 6;

/// Fee the integrator asks the aggregator to embed in returned transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegratorFee {
    /// Fraction of the source amount, e.g. `0.005` for 0.5%.
    pub percentage: Decimal,
    /// Address receiving the fee.
    pub collector: Address,
}

impl IntegratorFee {
    pub fn new(percentage: Decimal, collector: Address) -> Result<Self> {
        if percentage < Decimal::ZERO || percentage >= Decimal::ONE {
            return Err(BridgeError::InvalidConfig(format!(
                "integrator fee must be in [0, 1), got {percentage}"
            )));
        }
        Ok(Self {
            percentage,
            collector,
        })
    }
}

impl Default for IntegratorFee {
    fn default() -> Self {
        Self {
            percentage: DEFAULT_FEE_PERCENTAGE,
            collector: DEFAULT_FEE_COLLECTOR,
        }
    }
}

/// Settings for talking to the route aggregator.
///
/// # Examples
///
/// ```rust
/// use xchain_bridge::{AggregatorConfig, IntegratorFee};
/// use alloy_primitives::Address;
/// use rust_decimal::Decimal;
///
/// let fee = IntegratorFee::new(Decimal::new(5, 3), Address::ZERO).unwrap();
/// let config = AggregatorConfig::default()
///     .with_integrator("my-dapp")
///     .with_fee(fee);
/// assert_eq!(config.integrator, "my-dapp");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorConfig {
    pub base_url: String,
    pub integrator: String,
    pub fee: Option<IntegratorFee>,
    pub api_key: Option<String>,
    pub slippage: Option<Decimal>,
    pub request_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            base_url: LIFI_API.to_string(),
            integrator: DEFAULT_INTEGRATOR.to_string(),
            fee: Some(IntegratorFee::default()),
            api_key: None,
            slippage: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl AggregatorConfig {
    /// Builds a configuration from the process environment.
    ///
    /// A `.env` file in the working directory is loaded first if present.
    /// Recognised variables: `LIFI_API_URL`, `LIFI_INTEGRATOR`, `LIFI_API_KEY`,
    /// `BRIDGE_FEE_PERCENTAGE`, `BRIDGE_FEE_COLLECTOR`, `BRIDGE_SLIPPAGE`.
    ///
    /// Either fee variable overrides its half of the default fee. A
    /// percentage of zero turns the fee off.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup("LIFI_API_URL") {
            config.base_url = url;
        }
        if let Some(integrator) = lookup("LIFI_INTEGRATOR") {
            config.integrator = integrator;
        }
        config.api_key = lookup("LIFI_API_KEY").filter(|k| !k.is_empty());

        let percentage = lookup("BRIDGE_FEE_PERCENTAGE")
            .map(|v| parse_decimal("BRIDGE_FEE_PERCENTAGE", &v))
            .transpose()?;
        let collector = lookup("BRIDGE_FEE_COLLECTOR")
            .map(|v| {
                parse_address(&v).ok_or_else(|| {
                    BridgeError::InvalidConfig(format!("BRIDGE_FEE_COLLECTOR is not an address: {v}"))
                })
            })
            .transpose()?;
        if percentage.is_some() || collector.is_some() {
            let default = IntegratorFee::default();
            let percentage = percentage.unwrap_or(default.percentage);
            config.fee = if percentage.is_zero() {
                None
            } else {
                Some(IntegratorFee::new(
                    percentage,
                    collector.unwrap_or(default.collector),
                )?)
            };
        }

        config.slippage = lookup("BRIDGE_SLIPPAGE")
            .map(|v| parse_decimal("BRIDGE_SLIPPAGE", &v))
            .transpose()?;

        Ok(config)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_integrator(mut self, integrator: impl Into<String>) -> Self {
        self.integrator = integrator.into();
        self
    }

    pub fn with_fee(mut self, fee: IntegratorFee) -> Self {
        self.fee = Some(fee);
        self
    }

    /// Sends quotes without an integrator fee.
    pub fn without_fee(mut self) -> Self {
        self.fee = None;
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_slippage(mut self, slippage: Decimal) -> Self {
        self.slippage = Some(slippage);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal> {
    Decimal::from_str(value.trim())
        .map_err(|e| BridgeError::InvalidConfig(format!("{key} is not a decimal ({value}): {e}")))
}

/// Configuration for receipt polling while waiting for confirmation.
///
/// # Examples
///
/// ```rust
/// use xchain_bridge::PollingConfig;
///
/// let config = PollingConfig::default()
///     .with_max_attempts(20)
///     .with_poll_interval_secs(3);
/// assert_eq!(config.total_timeout_secs(), 60);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    /// Maximum number of receipt lookups before giving up.
    pub max_attempts: u32,
    /// Seconds to wait between lookups.
    pub poll_interval_secs: u64,
}

impl Default for PollingConfig {
    /// 120 attempts, 5 seconds apart: a ten minute ceiling.
    fn default() -> Self {
        Self {
            max_attempts: 120,
            poll_interval_secs: 5,
        }
    }
}

impl PollingConfig {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_poll_interval_secs(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    /// Returns `max_attempts * poll_interval_secs`.
    pub fn total_timeout_secs(&self) -> u64 {
        self.max_attempts as u64 * self.poll_interval_secs
    }
}

/// Behaviour knobs for [`BridgeSession`](crate::BridgeSession).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub success_display_delay: Duration,
    pub balance_display_decimals: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            success_display_delay: SUCCESS_DISPLAY_DELAY,
            balance_display_decimals: DEFAULT_BALANCE_DISPLAY_DECIMALS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = AggregatorConfig::default();
        assert_eq!(config.base_url, "https://li.quest/v1");
        assert_eq!(config.integrator, DEFAULT_INTEGRATOR);
        assert_eq!(
            config.fee,
            Some(IntegratorFee {
                percentage: dec!(0.005),
                collector: address!("34accc793fd8c2a8e262c8c95b18d706bc6022f0"),
            })
        );
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_config_from_lookup() {
        let config = AggregatorConfig::from_lookup(lookup(&[
            ("LIFI_API_URL", "http://localhost:9000/v1"),
            ("LIFI_INTEGRATOR", "test-dapp"),
            ("BRIDGE_FEE_PERCENTAGE", "0.005"),
            (
                "BRIDGE_FEE_COLLECTOR",
                "0x34accc793fd8c2a8e262c8c95b18d706bc6022f0",
            ),
            ("BRIDGE_SLIPPAGE", "0.01"),
        ]))
        .unwrap();

        assert_eq!(config.base_url, "http://localhost:9000/v1");
        assert_eq!(config.integrator, "test-dapp");
        assert_eq!(
            config.fee,
            Some(IntegratorFee {
                percentage: dec!(0.005),
                collector: address!("34accc793fd8c2a8e262c8c95b18d706bc6022f0"),
            })
        );
        assert_eq!(config.slippage, Some(dec!(0.01)));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_fee_variables_override_default_separately() {
        let collector = address!("2222222222222222222222222222222222222222");
        let config = AggregatorConfig::from_lookup(lookup(&[(
            "BRIDGE_FEE_COLLECTOR",
            "0x2222222222222222222222222222222222222222",
        )]))
        .unwrap();

        assert_eq!(
            config.fee,
            Some(IntegratorFee {
                percentage: DEFAULT_FEE_PERCENTAGE,
                collector,
            })
        );
    }

    #[test]
    fn test_zero_fee_opts_out() {
        let config =
            AggregatorConfig::from_lookup(lookup(&[("BRIDGE_FEE_PERCENTAGE", "0")])).unwrap();
        assert!(config.fee.is_none());
        assert!(AggregatorConfig::default().without_fee().fee.is_none());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad_fee = AggregatorConfig::from_lookup(lookup(&[
            ("BRIDGE_FEE_PERCENTAGE", "abc"),
            ("BRIDGE_FEE_COLLECTOR", "0x34accc793fd8c2a8e262c8c95b18d706bc6022f0"),
        ]));
        assert!(matches!(bad_fee, Err(BridgeError::InvalidConfig(_))));

        let bad_collector = AggregatorConfig::from_lookup(lookup(&[
            ("BRIDGE_FEE_PERCENTAGE", "0.005"),
            ("BRIDGE_FEE_COLLECTOR", "nope"),
        ]));
        assert!(matches!(bad_collector, Err(BridgeError::InvalidConfig(_))));
    }

    #[test]
    fn test_fee_bounds() {
        assert!(IntegratorFee::new(dec!(0), Address::ZERO).is_ok());
        assert!(IntegratorFee::new(dec!(0.03), Address::ZERO).is_ok());
        assert!(IntegratorFee::new(dec!(1), Address::ZERO).is_err());
        assert!(IntegratorFee::new(dec!(-0.1), Address::ZERO).is_err());
    }

    #[test]
    fn test_polling_config() {
        let config = PollingConfig::default();
        assert_eq!(config.total_timeout_secs(), 600);

        let config = config.with_max_attempts(3).with_poll_interval_secs(2);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.total_timeout_secs(), 6);
    }

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.success_display_delay, Duration::from_secs(5));
        assert_eq!(config.balance_display_decimals, 6);
    }
}
