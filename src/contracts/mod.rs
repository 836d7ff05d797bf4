//! Contract bindings
//!
//! Alloy-generated bindings for the on-chain reads the bridge performs
//! itself. Route execution never goes through a binding: the aggregator's
//! transaction request is sent verbatim.

pub mod erc20;
