//! Human-facing figures derived from a [`Route`].
//!
//! Nothing here is cached on the route; every summary is computed fresh.

use rust_decimal::Decimal;

use crate::protocol::Route;
use crate::units::{from_base_units, pow10, ratio_to_decimal};

/// Fractional digits kept in the exchange rate.
const RATE_SCALE: u32 = 18;

/// Display figures for one route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSummary {
    /// Destination tokens received per source token.
    pub exchange_rate: Decimal,
    /// Gas costs plus gas-flagged fee lines, in USD.
    pub total_network_fee_usd: Decimal,
    /// Provider and integrator fee lines, in USD.
    pub total_provider_fee_usd: Decimal,
    /// Sum of the percentages of the provider and integrator fee lines.
    pub fee_percentage_total: Decimal,
    /// Estimated duration rendered as `~N min`.
    pub display_duration: String,
    /// Relative loss between the USD value sent and received.
    pub price_impact: Option<Decimal>,
    /// Destination amount guaranteed after slippage, as a decimal string.
    pub minimum_received: String,
    pub slippage: Option<Decimal>,
}

/// Summarizes `route` for display.
///
/// # Examples
///
/// ```rust,ignore
/// let summary = xchain_bridge::evaluator::summarize(&route);
/// println!("{} ({})", summary.exchange_rate, summary.display_duration);
/// ```
pub fn summarize(route: &Route) -> RouteSummary {
    let (gas_fees, provider_fees): (Vec<_>, Vec<_>) =
        route.fee_costs.iter().partition(|f| f.is_gas_fee);

    let total_network_fee_usd: Decimal = route
        .gas_costs
        .iter()
        .map(|g| g.amount_usd)
        .chain(gas_fees.iter().map(|f| f.amount_usd))
        .sum();
    let total_provider_fee_usd: Decimal = provider_fees.iter().map(|f| f.amount_usd).sum();
    let fee_percentage_total: Decimal = provider_fees.iter().map(|f| f.percentage).sum();

    RouteSummary {
        exchange_rate: exchange_rate(route),
        total_network_fee_usd,
        total_provider_fee_usd,
        fee_percentage_total,
        display_duration: display_duration(route.execution_duration_secs),
        price_impact: price_impact(route.from_amount_usd, route.to_amount_usd),
        minimum_received: from_base_units(route.to_amount_min, route.to_token.decimals),
        slippage: route.slippage,
    }
}

/// `(to / 10^to_decimals) / (from / 10^from_decimals)`, zero when nothing is
/// sent.
pub fn exchange_rate(route: &Route) -> Decimal {
    let numerator = route
        .to_amount
        .saturating_mul(pow10(route.from_token.decimals));
    let denominator = route
        .from_amount
        .saturating_mul(pow10(route.to_token.decimals));
    ratio_to_decimal(numerator, denominator, RATE_SCALE)
}

/// Renders a duration in whole minutes, rounding up.
///
/// Any positive duration shows at least one minute.
pub fn display_duration(secs: u64) -> String {
    format!("~{} min", secs.div_ceil(60))
}

fn price_impact(from_usd: Option<Decimal>, to_usd: Option<Decimal>) -> Option<Decimal> {
    match (from_usd, to_usd) {
        (Some(from), Some(to)) if !from.is_zero() => Some((from - to) / from),
        _ => None,
    }
}
