//! OpenTelemetry span helpers for bridge operations
//!
//! Span names are static and attributes are structured, so traces from many
//! sessions aggregate cleanly. Business logic enters these spans; it never
//! builds span names itself.
//!
//! # Example
//!
//! ```rust,no_run
//! use xchain_bridge::spans;
//! use alloy_primitives::{Address, TxHash};
//!
//! let span = spans::wait_for_confirmation(TxHash::ZERO, 137, 120);
//! let _guard = span.enter();
//! // poll for the receipt here
//! ```

use alloy_primitives::{Address, TxHash};
use tracing::Span;

use crate::protocol::Route;
use crate::quote::QuoteQuery;

/// Create span for loading the chain and token registry.
///
/// Children: `xchain_bridge.http_request` for each registry endpoint
#[inline]
pub fn load_registry() -> Span {
    tracing::info_span!(
        "xchain_bridge.load_registry",
        chains = tracing::field::Empty,
        tokens = tracing::field::Empty,
        error.type = tracing::field::Empty,
        error.message = tracing::field::Empty,
        error.source = tracing::field::Empty,
        otel.status_code = "OK",
    )
}

/// Create span for a quote request.
///
/// Children: `xchain_bridge.http_request`
#[inline]
pub fn get_quote(query: &QuoteQuery) -> Span {
    tracing::info_span!(
        "xchain_bridge.get_quote",
        from_chain = query.from_chain_id,
        to_chain = query.to_chain_id,
        from_token = %query.from_token,
        to_token = %query.to_token,
        from_amount = %query.from_amount,
        error.type = tracing::field::Empty,
        error.message = tracing::field::Empty,
        error.source = tracing::field::Empty,
        otel.status_code = "OK",
    )
}

/// Create span covering one execution attempt, from network check to
/// confirmation.
///
/// Children: `xchain_bridge.wait_for_confirmation`
#[inline]
pub fn execute_route(route: &Route) -> Span {
    tracing::info_span!(
        "xchain_bridge.execute_route",
        route_id = %route.id,
        provider = %route.provider_name,
        required_chain = route.required_chain_id,
        tx_to = %route.transaction_request.to,
        tx_value = %route.transaction_request.value,
        tx_hash = tracing::field::Empty,
        error.type = tracing::field::Empty,
        error.message = tracing::field::Empty,
        error.source = tracing::field::Empty,
        otel.status_code = "OK",
    )
}

/// Create span for a balance read.
#[inline]
pub fn read_balance(chain_id: u64, token: &Address, owner: &Address, seq: u64) -> Span {
    tracing::debug_span!(
        "xchain_bridge.read_balance",
        chain = chain_id,
        token = %token,
        owner = %owner,
        seq = seq,
    )
}

/// Create span for waiting on a submitted transaction.
///
/// Children: Provider RPC calls (polling)
#[inline]
pub fn wait_for_confirmation(tx_hash: TxHash, chain_id: u64, max_attempts: u32) -> Span {
    tracing::debug_span!(
        "xchain_bridge.wait_for_confirmation",
        tx_hash = %tx_hash,
        chain = chain_id,
        max_attempts = max_attempts,
    )
}

/// Create span for an HTTP request to the aggregator.
#[inline]
pub fn http_request(method: &str, url: &url::Url) -> Span {
    tracing::trace_span!(
        "xchain_bridge.http_request",
        http.method = method,
        http.url = %url,
        http.status_code = tracing::field::Empty,
    )
}

/// Record error attributes on the current span.
///
/// Follows OpenTelemetry semantic conventions for error tracking:
/// - error.type: The error type/variant
/// - error.message: Human-readable error message
/// - error.source: The underlying cause, when there is one
pub fn record_error<E: std::error::Error>(error: &E) {
    let current_span = tracing::Span::current();
    let message = error.to_string();
    current_span.record(
        "error.type",
        message.split(':').next().unwrap_or("Unknown"),
    );
    current_span.record("error.message", message.as_str());
    current_span.record("otel.status_code", "ERROR");

    if let Some(source) = error.source() {
        current_span.record("error.source", source.to_string());
    }
}

/// Record error attributes with custom context on the current span.
///
/// Used where the failure is a state rather than an error value, such as a
/// reverted transaction.
///
/// # Example
///
/// ```rust,no_run
/// use xchain_bridge::spans;
///
/// let span = tracing::info_span!("xchain_bridge.operation");
/// let _guard = span.enter();
///
/// spans::record_error_with_context(
///     "TransactionReverted",
///     "transaction reverted on chain 137",
///     None,
/// );
/// ```
pub fn record_error_with_context(
    error_type: &str,
    error_message: &str,
    additional_context: Option<&str>,
) {
    let current_span = tracing::Span::current();
    current_span.record("error.type", error_type);
    current_span.record("error.message", error_message);
    current_span.record("otel.status_code", "ERROR");

    if let Some(context) = additional_context {
        current_span.record("error.source", context);
    }
}
