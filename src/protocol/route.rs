//! Normalized routes and the adapter that produces them from aggregator payloads.
//!
//! The aggregator answers in several shapes: a single quote step carrying its
//! own `transactionRequest`, a `{ "routes": [...] }` list, and routes whose
//! execution data is nested inside `steps` / `includedSteps`. Everything is
//! folded into [`Route`] here so that nothing downstream branches on the raw
//! response shape.

use alloy_primitives::{hex, Address, Bytes, U256};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::chain::{parse_address, RawToken, Token};
use super::decimal::optional_decimal;
use crate::units::parse_base_units;

/// A network (gas) cost line reported by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasCost {
    pub amount_usd: Decimal,
}

/// A fee line reported by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeCost {
    pub name: String,
    pub percentage: Decimal,
    pub amount_usd: Decimal,
    pub is_gas_fee: bool,
}

/// Whether a route step swaps on one chain or moves value across chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Swap,
    Bridge,
    Other,
}

/// One leg of a route, for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteStep {
    pub kind: StepKind,
    pub tool: String,
    pub from_symbol: String,
    pub to_symbol: String,
    pub from_decimals: u8,
    pub to_decimals: u8,
    pub from_amount: Option<U256>,
    pub to_amount: Option<U256>,
}

/// The transaction the wallet must sign to execute a route, taken verbatim
/// from the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionData {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas_limit: Option<u64>,
}

/// One executable path returned by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub id: String,
    pub from_token: Token,
    pub to_token: Token,
    pub from_amount: U256,
    pub to_amount: U256,
    pub to_amount_min: U256,
    pub from_amount_usd: Option<Decimal>,
    pub to_amount_usd: Option<Decimal>,
    pub execution_duration_secs: u64,
    pub gas_costs: Vec<GasCost>,
    pub fee_costs: Vec<FeeCost>,
    pub slippage: Option<Decimal>,
    pub provider_name: String,
    pub steps: Vec<RouteStep>,
    pub transaction_request: TransactionData,
    pub required_chain_id: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStep {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    tool_details: Option<RawToolDetails>,
    action: RawAction,
    #[serde(default)]
    estimate: Option<RawEstimate>,
    #[serde(default)]
    transaction_request: Option<RawTransactionRequest>,
    #[serde(default)]
    included_steps: Vec<RawStep>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawToolDetails {
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAction {
    from_chain_id: u64,
    from_token: RawToken,
    to_token: RawToken,
    #[serde(default)]
    from_amount: Option<String>,
    #[serde(default, deserialize_with = "optional_decimal")]
    slippage: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEstimate {
    #[serde(default)]
    from_amount: Option<String>,
    #[serde(default)]
    to_amount: Option<String>,
    #[serde(default)]
    to_amount_min: Option<String>,
    #[serde(default, rename = "fromAmountUSD", deserialize_with = "optional_decimal")]
    from_amount_usd: Option<Decimal>,
    #[serde(default, rename = "toAmountUSD", deserialize_with = "optional_decimal")]
    to_amount_usd: Option<Decimal>,
    #[serde(default, deserialize_with = "optional_decimal")]
    execution_duration: Option<Decimal>,
    #[serde(default)]
    fee_costs: Vec<RawFeeCost>,
    #[serde(default)]
    gas_costs: Vec<RawGasCost>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFeeCost {
    #[serde(default)]
    name: String,
    #[serde(default, deserialize_with = "optional_decimal")]
    percentage: Option<Decimal>,
    #[serde(default, rename = "amountUSD", deserialize_with = "optional_decimal")]
    amount_usd: Option<Decimal>,
    #[serde(default)]
    is_gas_fee: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct RawGasCost {
    #[serde(default, rename = "amountUSD", deserialize_with = "optional_decimal")]
    amount_usd: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTransactionRequest {
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    chain_id: Option<u64>,
    #[serde(default)]
    gas_limit: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRoute {
    #[serde(default)]
    id: Option<String>,
    from_chain_id: u64,
    from_amount: String,
    to_amount: String,
    #[serde(default)]
    to_amount_min: Option<String>,
    #[serde(default, rename = "fromAmountUSD", deserialize_with = "optional_decimal")]
    from_amount_usd: Option<Decimal>,
    #[serde(default, rename = "toAmountUSD", deserialize_with = "optional_decimal")]
    to_amount_usd: Option<Decimal>,
    from_token: RawToken,
    to_token: RawToken,
    #[serde(default)]
    steps: Vec<RawStep>,
    #[serde(default)]
    transaction_request: Option<RawTransactionRequest>,
}

/// Folds an aggregator quote payload into executable routes.
///
/// Candidates that cannot be executed (no transaction request, malformed
/// amounts or addresses) are dropped. An empty result means the aggregator
/// found no viable path.
pub fn normalize_quote_response(payload: &Value) -> Vec<Route> {
    let candidates: Vec<Option<Route>> = match payload.get("routes").and_then(Value::as_array) {
        Some(routes) => routes
            .iter()
            .map(|raw| {
                serde_json::from_value::<RawRoute>(raw.clone())
                    .map_err(|e| e.to_string())
                    .and_then(route_from_raw_route)
                    .map_err(|reason| debug!(reason = %reason, event = "route_candidate_dropped"))
                    .ok()
            })
            .collect(),
        None => vec![serde_json::from_value::<RawStep>(payload.clone())
            .map_err(|e| e.to_string())
            .and_then(route_from_step)
            .map_err(|reason| debug!(reason = %reason, event = "quote_payload_not_executable"))
            .ok()],
    };

    candidates.into_iter().flatten().collect()
}

fn route_from_step(step: RawStep) -> Result<Route, String> {
    let tx = step
        .transaction_request
        .as_ref()
        .ok_or("quote carries no transaction request")?;
    let transaction_request = transaction_from_raw(tx)?;
    let required_chain_id = tx.chain_id.unwrap_or(step.action.from_chain_id);

    let estimate = step
        .estimate
        .clone()
        .ok_or("quote carries no estimate")?;

    let from_amount = estimate
        .from_amount
        .as_deref()
        .or(step.action.from_amount.as_deref())
        .ok_or("quote carries no source amount")?;
    let from_amount = parse_amount(from_amount)?;
    let to_amount = estimate
        .to_amount
        .as_deref()
        .ok_or("quote carries no output amount")?;
    let to_amount = parse_amount(to_amount)?;
    let to_amount_min = estimate
        .to_amount_min
        .as_deref()
        .map(parse_amount)
        .transpose()?
        .unwrap_or(to_amount);

    let leg_estimates: Vec<&RawEstimate> = step
        .included_steps
        .iter()
        .filter_map(|s| s.estimate.as_ref())
        .collect();
    let (fee_costs, gas_costs) = if estimate.fee_costs.is_empty() && estimate.gas_costs.is_empty()
    {
        collect_costs(leg_estimates)
    } else {
        collect_costs(vec![&estimate])
    };

    let steps = if step.included_steps.is_empty() {
        vec![describe_step(&step)]
    } else {
        step.included_steps.iter().map(describe_step).collect()
    };

    Ok(Route {
        id: step.id.clone().unwrap_or_default(),
        from_token: Token::try_from(step.action.from_token.clone())?,
        to_token: Token::try_from(step.action.to_token.clone())?,
        from_amount,
        to_amount,
        to_amount_min,
        from_amount_usd: estimate.from_amount_usd,
        to_amount_usd: estimate.to_amount_usd,
        execution_duration_secs: duration_secs(estimate.execution_duration),
        gas_costs,
        fee_costs,
        slippage: step.action.slippage,
        provider_name: provider_name(&step),
        steps,
        transaction_request,
        required_chain_id,
    })
}

fn route_from_raw_route(route: RawRoute) -> Result<Route, String> {
    let (tx, tx_step) = match &route.transaction_request {
        Some(tx) => (tx, None),
        None => route
            .steps
            .iter()
            .find_map(|s| s.transaction_request.as_ref().map(|tx| (tx, Some(s))))
            .ok_or("route carries no transaction request")?,
    };
    let transaction_request = transaction_from_raw(tx)?;
    let required_chain_id = tx
        .chain_id
        .or(tx_step.map(|s| s.action.from_chain_id))
        .unwrap_or(route.from_chain_id);

    let to_amount = parse_amount(&route.to_amount)?;
    let to_amount_min = route
        .to_amount_min
        .as_deref()
        .map(parse_amount)
        .transpose()?
        .unwrap_or(to_amount);

    let estimates: Vec<&RawEstimate> = route
        .steps
        .iter()
        .flat_map(|s| {
            s.estimate
                .iter()
                .chain(s.included_steps.iter().filter_map(|i| i.estimate.as_ref()))
                .take(1)
        })
        .collect();
    let (fee_costs, gas_costs) = collect_costs(estimates);

    let execution_duration_secs = route
        .steps
        .iter()
        .map(|s| duration_secs(s.estimate.as_ref().and_then(|e| e.execution_duration)))
        .sum();

    let steps = route
        .steps
        .iter()
        .flat_map(|s| {
            if s.included_steps.is_empty() {
                vec![describe_step(s)]
            } else {
                s.included_steps.iter().map(describe_step).collect()
            }
        })
        .collect();

    Ok(Route {
        id: route.id.clone().unwrap_or_default(),
        from_token: Token::try_from(route.from_token.clone())?,
        to_token: Token::try_from(route.to_token.clone())?,
        from_amount: parse_amount(&route.from_amount)?,
        to_amount,
        to_amount_min,
        from_amount_usd: route.from_amount_usd,
        to_amount_usd: route.to_amount_usd,
        execution_duration_secs,
        gas_costs,
        fee_costs,
        slippage: route.steps.first().and_then(|s| s.action.slippage),
        provider_name: route
            .steps
            .first()
            .map(provider_name)
            .unwrap_or_else(|| "Route".to_string()),
        steps,
        transaction_request,
        required_chain_id,
    })
}

fn transaction_from_raw(tx: &RawTransactionRequest) -> Result<TransactionData, String> {
    let to = tx
        .to
        .as_deref()
        .and_then(parse_address)
        .ok_or("transaction request has no valid destination")?;
    let data = match tx.data.as_deref() {
        None | Some("") | Some("0x") => Bytes::new(),
        Some(data) => hex::decode(data)
            .map(Bytes::from)
            .map_err(|e| format!("invalid call data: {e}"))?,
    };
    let value = match tx.value.as_deref() {
        None | Some("") => U256::ZERO,
        Some(value) => parse_amount(value)?,
    };
    let gas_limit = tx
        .gas_limit
        .as_deref()
        .and_then(|g| parse_base_units(g).ok())
        .and_then(|g| u64::try_from(g).ok());

    Ok(TransactionData {
        to,
        data,
        value,
        gas_limit,
    })
}

fn collect_costs(estimates: Vec<&RawEstimate>) -> (Vec<FeeCost>, Vec<GasCost>) {
    let fees = estimates
        .iter()
        .flat_map(|e| e.fee_costs.iter())
        .map(|f| FeeCost {
            name: f.name.clone(),
            percentage: f.percentage.unwrap_or_default(),
            amount_usd: f.amount_usd.unwrap_or_default(),
            is_gas_fee: f.is_gas_fee,
        })
        .collect();
    let gas = estimates
        .iter()
        .flat_map(|e| e.gas_costs.iter())
        .map(|g| GasCost {
            amount_usd: g.amount_usd.unwrap_or_default(),
        })
        .collect();
    (fees, gas)
}

fn describe_step(step: &RawStep) -> RouteStep {
    let kind = match step.kind.as_deref() {
        Some("swap") => StepKind::Swap,
        Some("cross") | Some("bridge") => StepKind::Bridge,
        _ => StepKind::Other,
    };
    let estimate = step.estimate.as_ref();
    RouteStep {
        kind,
        tool: provider_name(step),
        from_symbol: step.action.from_token.symbol.clone(),
        to_symbol: step.action.to_token.symbol.clone(),
        from_decimals: step.action.from_token.decimals,
        to_decimals: step.action.to_token.decimals,
        from_amount: estimate
            .and_then(|e| e.from_amount.as_deref())
            .and_then(|a| parse_base_units(a).ok()),
        to_amount: estimate
            .and_then(|e| e.to_amount.as_deref())
            .and_then(|a| parse_base_units(a).ok()),
    }
}

fn provider_name(step: &RawStep) -> String {
    step.tool_details
        .as_ref()
        .map(|d| d.name.clone())
        .or_else(|| step.tool.clone())
        .unwrap_or_else(|| "Route".to_string())
}

fn duration_secs(duration: Option<Decimal>) -> u64 {
    duration
        .and_then(|d| d.max(Decimal::ZERO).ceil().to_u64())
        .unwrap_or(0)
}

fn parse_amount(value: &str) -> Result<U256, String> {
    parse_base_units(value).map_err(|e| e.to_string())
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_single_quote_step_is_normalized() {
        let routes = normalize_quote_response(&quote_step());
        assert_eq!(routes.len(), 1);

        let route = &routes[0];
        assert_eq!(route.id, "quote-1");
        assert_eq!(route.provider_name, "Stargate");
        assert_eq!(route.required_chain_id, 1);
        assert_eq!(route.from_amount, U256::from(100_000_000u64));
        assert_eq!(route.to_amount, U256::from(99_500_000u64));
        assert_eq!(route.to_amount_min, U256::from(99_000_000u64));
        assert_eq!(route.execution_duration_secs, 61);
        assert_eq!(route.slippage, Some(dec!(0.005)));
        assert_eq!(route.fee_costs.len(), 2);
        assert!(route.fee_costs[1].is_gas_fee);
        assert_eq!(route.gas_costs, vec![GasCost { amount_usd: dec!(1.25) }]);
        assert_eq!(route.steps.len(), 1);
        assert_eq!(route.steps[0].kind, StepKind::Bridge);
        assert_eq!(
            route.transaction_request.data,
            Bytes::from(vec![0xde, 0xad, 0xbe, 0xef])
        );
        assert_eq!(route.transaction_request.value, U256::ZERO);
        assert_eq!(route.transaction_request.gas_limit, Some(200_000));
        assert_eq!(
            route.from_token.address_hex(),
            USDC_ETH.to_ascii_lowercase()
        );
    }

    #[test]
    fn test_missing_transaction_request_yields_no_route() {
        let mut payload = quote_step();
        payload
            .as_object_mut()
            .unwrap()
            .remove("transactionRequest");
        assert!(normalize_quote_response(&payload).is_empty());
    }

    #[test]
    fn test_unrelated_payload_yields_no_route() {
        assert!(normalize_quote_response(&json!({})).is_empty());
        assert!(normalize_quote_response(&json!({"message": "No available quotes"})).is_empty());
        assert!(normalize_quote_response(&json!({"routes": []})).is_empty());
    }

    #[test]
    fn test_routes_list_with_nested_transaction() {
        let step = quote_step();
        let payload = json!({
            "routes": [
                {
                    "id": "no-tx",
                    "fromChainId": 1,
                    "fromAmount": "100000000",
                    "toAmount": "99900000",
                    "fromToken": step["action"]["fromToken"],
                    "toToken": step["action"]["toToken"],
                    "steps": [ { "action": step["action"], "estimate": step["estimate"] } ]
                },
                {
                    "id": "nested",
                    "fromChainId": 1,
                    "fromAmount": "100000000",
                    "toAmount": "99500000",
                    "fromAmountUSD": "100",
                    "toAmountUSD": "99.5",
                    "fromToken": step["action"]["fromToken"],
                    "toToken": step["action"]["toToken"],
                    "steps": [ step.clone() ]
                }
            ]
        });

        let routes = normalize_quote_response(&payload);
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].id, "nested");
        assert_eq!(routes[0].required_chain_id, 1);
        assert_eq!(routes[0].execution_duration_secs, 61);
        assert_eq!(routes[0].fee_costs.len(), 2);
        assert_eq!(routes[0].to_amount_min, routes[0].to_amount);
    }

    #[test]
    fn test_decimal_value_and_fractional_duration() {
        let mut payload = quote_step();
        payload["transactionRequest"]["value"] = json!("1500000000000000000");
        payload["estimate"]["executionDuration"] = json!(30.2);

        let route = &normalize_quote_response(&payload)[0];
        assert_eq!(
            route.transaction_request.value,
            U256::from(1_500_000_000_000_000_000u128)
        );
        assert_eq!(route.execution_duration_secs, 31);
    }

    #[test]
    fn test_invalid_destination_drops_candidate() {
        let mut payload = quote_step();
        payload["transactionRequest"]["to"] = json!("0x1234");
        assert!(normalize_quote_response(&payload).is_empty());
    }
}
