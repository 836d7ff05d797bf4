//! Chain and token metadata as served by the aggregator registry.
//!
//! Addresses are held as [`Address`], so two spellings of the same address
//! that differ only in letter case compare equal. Rendering back to text goes
//! through [`Token::address_hex`], which always produces lowercase.

use alloy_chains::NamedChain;
use alloy_primitives::{hex, Address, TxHash};
use rust_decimal::Decimal;
use serde::Deserialize;

use super::decimal::optional_decimal;

/// Sentinel address standing in for a chain's native coin.
pub const NATIVE_TOKEN: Address = Address::ZERO;

/// Explorer used when neither the registry nor `alloy_chains` knows one.
const DEFAULT_EXPLORER: &str = "https://etherscan.io";

/// A chain supported by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    pub id: u64,
    pub name: String,
    pub native_currency_decimals: u8,
    pub block_explorer_url: Option<String>,
}

impl Chain {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            native_currency_decimals: 18,
            block_explorer_url: None,
        }
    }

    pub fn with_block_explorer_url(mut self, url: impl Into<String>) -> Self {
        self.block_explorer_url = Some(url.into());
        self
    }

    /// Base URL of the block explorer for this chain, without a trailing slash.
    pub fn explorer_url(&self) -> String {
        let url = self
            .block_explorer_url
            .clone()
            .or_else(|| {
                NamedChain::try_from(self.id)
                    .ok()
                    .and_then(|chain| chain.etherscan_urls())
                    .map(|(_, base)| base.to_string())
            })
            .unwrap_or_else(|| DEFAULT_EXPLORER.to_string());
        url.trim_end_matches('/').to_string()
    }

    /// Link to a transaction on this chain's block explorer.
    pub fn explorer_tx_url(&self, tx_hash: TxHash) -> String {
        format!("{}/tx/{tx_hash}", self.explorer_url())
    }
}

/// A tradable token on a specific chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub chain_id: u64,
    pub address: Address,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    pub price_usd: Option<Decimal>,
}

impl Token {
    pub fn new(chain_id: u64, address: Address, symbol: impl Into<String>, decimals: u8) -> Self {
        let symbol = symbol.into();
        Self {
            chain_id,
            address,
            name: symbol.clone(),
            symbol,
            decimals,
            price_usd: None,
        }
    }

    /// The native coin of `chain_id`.
    pub fn native(chain_id: u64, symbol: impl Into<String>, decimals: u8) -> Self {
        Self::new(chain_id, NATIVE_TOKEN, symbol, decimals)
    }

    pub fn with_price_usd(mut self, price: Decimal) -> Self {
        self.price_usd = Some(price);
        self
    }

    pub fn is_native(&self) -> bool {
        self.address == NATIVE_TOKEN
    }

    /// Lowercase `0x`-prefixed address.
    pub fn address_hex(&self) -> String {
        lowercase_hex(&self.address)
    }
}

/// Lowercase `0x`-prefixed rendering of an address.
pub fn lowercase_hex(address: &Address) -> String {
    format!("0x{}", hex::encode(address))
}

/// Parses an address regardless of letter case or checksum.
pub fn parse_address(input: &str) -> Option<Address> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.len() != 40 {
        return None;
    }
    let bytes = hex::decode(digits.to_ascii_lowercase()).ok()?;
    Some(Address::from_slice(&bytes))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawChain {
    id: u64,
    name: String,
    #[serde(default)]
    native_token: Option<RawNativeToken>,
    #[serde(default)]
    metamask: Option<RawMetamask>,
}

#[derive(Debug, Deserialize)]
struct RawNativeToken {
    decimals: u8,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMetamask {
    #[serde(default)]
    block_explorer_urls: Vec<String>,
    #[serde(default)]
    native_currency: Option<RawNativeToken>,
}

impl From<RawChain> for Chain {
    fn from(raw: RawChain) -> Self {
        let native_currency_decimals = raw
            .native_token
            .as_ref()
            .or_else(|| raw.metamask.as_ref().and_then(|m| m.native_currency.as_ref()))
            .map(|n| n.decimals)
            .unwrap_or(18);
        let block_explorer_url = raw
            .metamask
            .and_then(|m| m.block_explorer_urls.into_iter().next());

        Self {
            id: raw.id,
            name: raw.name,
            native_currency_decimals,
            block_explorer_url,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawToken {
    pub(crate) address: String,
    pub(crate) chain_id: u64,
    pub(crate) symbol: String,
    #[serde(default)]
    pub(crate) name: Option<String>,
    pub(crate) decimals: u8,
    #[serde(default, rename = "priceUSD", deserialize_with = "optional_decimal")]
    pub(crate) price_usd: Option<Decimal>,
}

impl TryFrom<RawToken> for Token {
    type Error = String;

    fn try_from(raw: RawToken) -> Result<Self, Self::Error> {
        let address = parse_address(&raw.address)
            .ok_or_else(|| format!("invalid token address {:?}", raw.address))?;
        Ok(Self {
            chain_id: raw.chain_id,
            address,
            name: raw.name.unwrap_or_else(|| raw.symbol.clone()),
            symbol: raw.symbol,
            decimals: raw.decimals,
            price_usd: raw.price_usd,
        })
    }
}
