//! Live rate providers backed by public HTTP APIs.
//!
//! Each provider has one parser function for its payload so the shape of a
//! response can be tested without the network.

use std::collections::HashMap;
use std::time::Duration;

use agritrace_common::{Currency, CurrencyPair};
use async_trait::async_trait;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{RateError, RateResult};
use crate::provider::RateProvider;

const COINGECKO_URL: &str = "https://api.coingecko.com/api/v3/simple/price";
const EXCHANGE_RATE_API_URL: &str = "https://open.er-api.com/v6/latest";
const USER_AGENT: &str = "agritrace-rates/0.1";

fn build_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .pool_max_idle_per_host(4)
        .timeout(timeout)
        .build()
}

fn to_positive_decimal(provider: &str, pair: &CurrencyPair, value: f64) -> RateResult<Decimal> {
    match Decimal::from_f64(value) {
        Some(rate) if rate > Decimal::ZERO => Ok(rate),
        _ => Err(RateError::InvalidRate {
            provider: provider.to_string(),
            pair: pair.clone(),
            rate: value.to_string(),
        }),
    }
}

/// Crypto prices from CoinGecko's `simple/price` endpoint.
#[derive(Debug, Clone)]
pub struct CoinGeckoProvider {
    client: reqwest::Client,
    base_url: String,
    coin_ids: HashMap<Currency, String>,
    quotes: Vec<Currency>,
}

impl CoinGeckoProvider {
    pub const NAME: &'static str = "coingecko";

    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let coin_ids = [
            ("HBAR", "hedera-hashgraph"),
            ("BTC", "bitcoin"),
            ("ETH", "ethereum"),
        ]
        .into_iter()
        .map(|(code, id)| (Currency::new(code), id.to_string()))
        .collect();

        Ok(Self {
            client: build_client(timeout)?,
            base_url: COINGECKO_URL.to_string(),
            coin_ids,
            quotes: ["USD", "EUR", "KES", "NGN"].into_iter().map(Currency::new).collect(),
        })
    }

    /// Point the provider at a different endpoint.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Extract `body[coin_id][quote]` from a `simple/price` response.
    pub fn parse_simple_price(body: &Value, coin_id: &str, quote: &Currency) -> Option<f64> {
        body.get(coin_id)?
            .get(quote.code().to_lowercase())?
            .as_f64()
    }
}

#[async_trait]
impl RateProvider for CoinGeckoProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn fetch_rate(&self, pair: &CurrencyPair) -> RateResult<Decimal> {
        let coin_id = self
            .coin_ids
            .get(&pair.base)
            .filter(|_| self.quotes.contains(&pair.quote))
            .ok_or_else(|| RateError::UnsupportedPair {
                provider: Self::NAME.to_string(),
                pair: pair.clone(),
            })?;

        let failed = |reason: String| RateError::ProviderFetchFailed {
            provider: Self::NAME.to_string(),
            pair: pair.clone(),
            reason,
        };

        debug!(pair = %pair, coin_id = %coin_id, "Fetching CoinGecko price");

        let vs_currency = pair.quote.code().to_lowercase();
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[("ids", coin_id.as_str()), ("vs_currencies", vs_currency.as_str())])
            .send()
            .await
            .map_err(|e| failed(format!("HTTP error: {e}")))?;

        if !resp.status().is_success() {
            return Err(failed(format!("HTTP status {}", resp.status())));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| failed(format!("JSON parse error: {e}")))?;

        let value = Self::parse_simple_price(&body, coin_id, &pair.quote)
            .ok_or_else(|| failed("price missing from response".to_string()))?;

        to_positive_decimal(Self::NAME, pair, value)
    }

    fn supports_pair(&self, pair: &CurrencyPair) -> bool {
        self.coin_ids.contains_key(&pair.base) && self.quotes.contains(&pair.quote)
    }

    fn supported_pairs(&self) -> Vec<CurrencyPair> {
        let mut pairs: Vec<CurrencyPair> = self
            .coin_ids
            .keys()
            .flat_map(|base| {
                self.quotes
                    .iter()
                    .map(move |quote| CurrencyPair::new(base.clone(), quote.clone()))
            })
            .collect();
        pairs.sort();
        pairs
    }
}

/// Response from `open.er-api.com/v6/latest/{base}`.
#[derive(Debug, Deserialize)]
pub struct LatestRatesResponse {
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub base_code: String,
    #[serde(default)]
    pub rates: HashMap<String, f64>,
}

/// Fiat rates from the open ExchangeRate-API endpoint.
#[derive(Debug, Clone)]
pub struct ExchangeRateApiProvider {
    client: reqwest::Client,
    base_url: String,
}

impl ExchangeRateApiProvider {
    pub const NAME: &'static str = "exchangerate-api";

    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: EXCHANGE_RATE_API_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Pick the quote currency out of a `latest` response.
    pub fn parse_latest(body: &LatestRatesResponse, pair: &CurrencyPair) -> Result<f64, String> {
        if body.result != "success" {
            return Err(format!("provider reported result '{}'", body.result));
        }
        if !body.base_code.eq_ignore_ascii_case(pair.base.code()) {
            return Err(format!(
                "response base {} does not match {}",
                body.base_code, pair.base
            ));
        }
        body.rates
            .get(pair.quote.code())
            .copied()
            .ok_or_else(|| format!("no rate for {}", pair.quote))
    }
}

#[async_trait]
impl RateProvider for ExchangeRateApiProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn fetch_rate(&self, pair: &CurrencyPair) -> RateResult<Decimal> {
        if !self.supports_pair(pair) {
            return Err(RateError::UnsupportedPair {
                provider: Self::NAME.to_string(),
                pair: pair.clone(),
            });
        }

        let failed = |reason: String| RateError::ProviderFetchFailed {
            provider: Self::NAME.to_string(),
            pair: pair.clone(),
            reason,
        };

        let url = format!("{}/{}", self.base_url, pair.base.code());
        debug!(pair = %pair, url = %url, "Fetching fiat rates");

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| failed(format!("HTTP error: {e}")))?;

        if !resp.status().is_success() {
            return Err(failed(format!("HTTP status {}", resp.status())));
        }

        let body: LatestRatesResponse = resp
            .json()
            .await
            .map_err(|e| failed(format!("JSON parse error: {e}")))?;

        let value = Self::parse_latest(&body, pair).map_err(failed)?;
        to_positive_decimal(Self::NAME, pair, value)
    }

    fn supports_pair(&self, pair: &CurrencyPair) -> bool {
        !pair.base.is_crypto() && !pair.quote.is_crypto() && !pair.is_identity()
    }

    fn supported_pairs(&self) -> Vec<CurrencyPair> {
        ["KES", "UGX", "TZS", "NGN", "EUR", "GBP"]
            .into_iter()
            .map(|quote| CurrencyPair::new(Currency::usd(), Currency::new(quote)))
            .collect()
    }
}
