//! Aggregator protocol types
//!
//! Chain and token metadata from the registry endpoints, and the normalized
//! [`Route`] produced from quote responses.

mod chain;
mod decimal;
mod route;

pub use chain::{lowercase_hex, parse_address, Chain, Token, NATIVE_TOKEN};
pub(crate) use chain::{RawChain, RawToken};
pub use route::{
    normalize_quote_response, FeeCost, GasCost, Route, RouteStep, StepKind, TransactionData,
};

#[cfg(test)]
pub(crate) use route::fixtures;
