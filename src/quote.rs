//! Quote acquisition.
//!
//! A [`TradeRequest`] is validated and converted to base units locally, then
//! sent to the aggregator as a [`QuoteQuery`]. Whatever comes back is folded
//! into [`Route`]s by the protocol adapter.

use alloy_primitives::{Address, U256};
use bon::Builder;
use rust_decimal::Decimal;
use tracing::{debug, info, Instrument};

use crate::config::{AggregatorConfig, IntegratorFee};
use crate::error::{BridgeError, Result};
use crate::protocol::{lowercase_hex, normalize_quote_response, Chain, Route, Token};
use crate::spans;
use crate::traits::AggregatorApi;
use crate::units::to_base_units;

/// A fully specified trade, constructed fresh for each quote attempt.
///
/// # Examples
///
/// ```rust
/// use xchain_bridge::{Chain, Token, TradeRequest};
/// use alloy_primitives::Address;
///
/// let request = TradeRequest::builder()
///     .from_chain(Chain::new(1, "Ethereum"))
///     .to_chain(Chain::new(137, "Polygon"))
///     .from_token(Token::native(1, "ETH", 18))
///     .to_token(Token::native(137, "POL", 18))
///     .amount("1.5")
///     .sender(Address::repeat_byte(0x11))
///     .build();
///
/// assert_eq!(request.recipient(), Address::repeat_byte(0x11));
/// ```
#[derive(Builder, Debug, Clone, PartialEq, Eq)]
pub struct TradeRequest {
    from_chain: Chain,
    to_chain: Chain,
    from_token: Token,
    to_token: Token,
    #[builder(into)]
    amount: String,
    sender: Address,
    recipient: Option<Address>,
}

impl TradeRequest {
    pub fn from_chain(&self) -> &Chain {
        &self.from_chain
    }

    pub fn to_chain(&self) -> &Chain {
        &self.to_chain
    }

    pub fn from_token(&self) -> &Token {
        &self.from_token
    }

    pub fn to_token(&self) -> &Token {
        &self.to_token
    }

    /// The amount exactly as the user typed it.
    pub fn amount(&self) -> &str {
        &self.amount
    }

    pub fn sender(&self) -> Address {
        self.sender
    }

    /// The custom recipient if one was supplied, otherwise the sender.
    pub fn recipient(&self) -> Address {
        self.recipient.unwrap_or(self.sender)
    }

    /// Converts the amount to base units of the source token.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidAmount`] when the amount does not parse or
    /// is zero.
    pub fn base_units(&self) -> Result<U256> {
        let amount = to_base_units(&self.amount, self.from_token.decimals)?;
        if amount.is_zero() {
            return Err(BridgeError::invalid_amount(
                &self.amount,
                "amount must be greater than zero",
            ));
        }
        Ok(amount)
    }
}

/// The request sent to the aggregator's quote endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteQuery {
    pub from_chain_id: u64,
    pub to_chain_id: u64,
    pub from_token: Address,
    pub to_token: Address,
    pub from_amount: U256,
    pub from_address: Address,
    /// Only set when it differs from `from_address`.
    pub to_address: Option<Address>,
    pub integrator: String,
    pub fee: Option<IntegratorFee>,
    pub slippage: Option<Decimal>,
}

impl QuoteQuery {
    /// Builds the query for `request`, validating it first.
    ///
    /// Both tokens must belong to the chains they were selected for.
    pub fn from_request(request: &TradeRequest, config: &AggregatorConfig) -> Result<Self> {
        for (token, chain) in [
            (&request.from_token, &request.from_chain),
            (&request.to_token, &request.to_chain),
        ] {
            if token.chain_id != chain.id {
                return Err(BridgeError::UnknownToken {
                    chain_id: chain.id,
                    address: token.address,
                });
            }
        }

        let from_amount = request.base_units()?;
        let recipient = request.recipient();

        Ok(Self {
            from_chain_id: request.from_chain.id,
            to_chain_id: request.to_chain.id,
            from_token: request.from_token.address,
            to_token: request.to_token.address,
            from_amount,
            from_address: request.sender,
            to_address: (recipient != request.sender).then_some(recipient),
            integrator: config.integrator.clone(),
            fee: config.fee,
            slippage: config.slippage,
        })
    }

    /// Query-string parameters in the order the aggregator documents them.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("fromChain", self.from_chain_id.to_string()),
            ("toChain", self.to_chain_id.to_string()),
            ("fromToken", lowercase_hex(&self.from_token)),
            ("toToken", lowercase_hex(&self.to_token)),
            ("fromAmount", self.from_amount.to_string()),
            ("fromAddress", lowercase_hex(&self.from_address)),
        ];
        if let Some(to_address) = &self.to_address {
            pairs.push(("toAddress", lowercase_hex(to_address)));
        }
        pairs.push(("integrator", self.integrator.clone()));
        if let Some(fee) = &self.fee {
            pairs.push(("fee", fee.percentage.normalize().to_string()));
            pairs.push(("feeCollector", lowercase_hex(&fee.collector)));
        }
        if let Some(slippage) = &self.slippage {
            pairs.push(("slippage", slippage.normalize().to_string()));
        }
        pairs
    }
}

/// Turns trade requests into executable routes.
#[derive(Debug, Clone)]
pub struct QuoteEngine<A> {
    api: A,
    config: AggregatorConfig,
}

impl<A: AggregatorApi> QuoteEngine<A> {
    pub fn new(api: A, config: AggregatorConfig) -> Self {
        Self { api, config }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Requests all executable candidates for `request`.
    ///
    /// Validation happens before any network call: a zero, negative or
    /// malformed amount fails with [`BridgeError::InvalidAmount`] and the
    /// aggregator is never contacted.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::NoRouteFound`] when the aggregator answers but offers
    ///   nothing executable
    /// - [`BridgeError::AggregatorUnavailable`] on transport or HTTP failure
    pub async fn get_routes(&self, request: &TradeRequest) -> Result<Vec<Route>> {
        let query = QuoteQuery::from_request(request, &self.config)?;
        let span = spans::get_quote(&query);

        async move {
            debug!(
                from_chain = query.from_chain_id,
                to_chain = query.to_chain_id,
                from_amount = %query.from_amount,
                event = "quote_requested"
            );

            let payload = self.api.get_quote(&query).await.inspect_err(|e| {
                spans::record_error(e);
            })?;

            let routes = normalize_quote_response(&payload);
            if routes.is_empty() {
                info!(event = "no_route_found");
                return Err(BridgeError::NoRouteFound);
            }

            info!(
                candidates = routes.len(),
                to_amount = %routes[0].to_amount,
                provider = %routes[0].provider_name,
                event = "quote_received"
            );
            Ok(routes)
        }
        .instrument(span)
        .await
    }

    /// Requests the best candidate for `request`.
    pub async fn get_quote(&self, request: &TradeRequest) -> Result<Route> {
        self.get_routes(request)
            .await?
            .into_iter()
            .next()
            .ok_or(BridgeError::NoRouteFound)
    }
}
