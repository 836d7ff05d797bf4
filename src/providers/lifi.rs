//! LI.FI aggregator API client.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, trace, Instrument};
use url::Url;

use crate::config::AggregatorConfig;
use crate::error::{BridgeError, Result};
use crate::protocol::{Chain, RawChain, RawToken, Token};
use crate::quote::QuoteQuery;
use crate::spans;
use crate::traits::AggregatorApi;

const API_KEY_HEADER: &str = "x-lifi-api-key";

/// Production aggregator client for the LI.FI HTTP API.
///
/// # Examples
///
/// ```rust,no_run
/// use xchain_bridge::providers::LiFiClient;
/// use xchain_bridge::traits::AggregatorApi;
/// use xchain_bridge::AggregatorConfig;
///
/// # async fn example() -> Result<(), xchain_bridge::BridgeError> {
/// let client = LiFiClient::new(AggregatorConfig::from_env()?)?;
/// let chains = client.get_chains().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LiFiClient {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

#[derive(Deserialize)]
struct ChainsResponse {
    #[serde(default)]
    chains: Vec<RawChain>,
}

#[derive(Deserialize)]
struct TokensResponse {
    #[serde(default)]
    tokens: HashMap<String, Vec<RawToken>>,
}

impl LiFiClient {
    /// Creates a client from `config`.
    ///
    /// Only the transport settings are read here; integrator and fee
    /// parameters travel inside each [`QuoteQuery`].
    pub fn new(config: AggregatorConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            base_url: config.base_url,
            api_key: config.api_key,
            client,
        })
    }

    /// Creates a client for the public endpoint with default settings.
    pub fn production() -> Result<Self> {
        Self::new(AggregatorConfig::default())
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(Url::parse(&format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path
        ))?)
    }

    async fn get_json(&self, url: Url) -> Result<Value> {
        let span = spans::http_request("GET", &url);
        async move {
            let mut request = self.client.get(url.clone());
            if let Some(key) = &self.api_key {
                request = request.header(API_KEY_HEADER, key);
            }

            let response = request
                .send()
                .await
                .map_err(|e| BridgeError::AggregatorUnavailable {
                    status: None,
                    message: e.to_string(),
                })?;

            let status = response.status();
            tracing::Span::current().record("http.status_code", status.as_u16());
            trace!(status_code = %status, "Received response from aggregator");

            if !status.is_success() {
                return Err(error_from_response(response).await);
            }

            response
                .json::<Value>()
                .await
                .map_err(|e| BridgeError::AggregatorUnavailable {
                    status: Some(status.as_u16()),
                    message: format!("malformed response body: {e}"),
                })
        }
        .instrument(span)
        .await
    }
}

/// Builds an [`BridgeError::AggregatorUnavailable`] from a non-success
/// response, preferring the `message` field of a JSON error body.
async fn error_from_response(response: Response) -> BridgeError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_string()))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });

    debug!(status_code = status.as_u16(), message = %message, event = "aggregator_error");
    BridgeError::AggregatorUnavailable {
        status: Some(status.as_u16()),
        message,
    }
}

#[async_trait]
impl AggregatorApi for LiFiClient {
    #[instrument(skip(self))]
    async fn get_chains(&self) -> Result<Vec<Chain>> {
        let payload = self.get_json(self.endpoint("chains")?).await?;
        let response: ChainsResponse = serde_json::from_value(payload)?;
        let chains: Vec<Chain> = response.chains.into_iter().map(Chain::from).collect();
        debug!(count = chains.len(), "Chains fetched");
        Ok(chains)
    }

    #[instrument(skip(self))]
    async fn get_tokens(&self) -> Result<HashMap<u64, Vec<Token>>> {
        let payload = self.get_json(self.endpoint("tokens")?).await?;
        let response: TokensResponse = serde_json::from_value(payload)?;

        let mut tokens = HashMap::with_capacity(response.tokens.len());
        for (key, raw_tokens) in response.tokens {
            let Ok(chain_id) = key.parse::<u64>() else {
                debug!(key = %key, "Skipping token list with non-numeric chain key");
                continue;
            };
            let list: Vec<Token> = raw_tokens
                .into_iter()
                .filter(|raw| raw.chain_id == chain_id)
                .filter_map(|raw| {
                    Token::try_from(raw)
                        .map_err(|reason| trace!(reason = %reason, "Dropping token"))
                        .ok()
                })
                .collect();
            tokens.insert(chain_id, list);
        }

        debug!(chains = tokens.len(), "Tokens fetched");
        Ok(tokens)
    }

    #[instrument(skip(self, query), fields(from_chain = query.from_chain_id, to_chain = query.to_chain_id))]
    async fn get_quote(&self, query: &QuoteQuery) -> Result<Value> {
        let mut url = self.endpoint("quote")?;
        url.query_pairs_mut().extend_pairs(query.to_query_pairs());
        trace!(url = %url, "Requesting quote");
        self.get_json(url).await
    }
}
