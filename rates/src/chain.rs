//! Ordered primary -> fallback provider resolution.

use std::sync::Arc;
use std::time::Duration;

use agritrace_common::CurrencyPair;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::error::{RateError, RateResult};
use crate::http::{CoinGeckoProvider, ExchangeRateApiProvider};
use crate::provider::{FallbackRateProvider, PinnedRateProvider, RateProvider};

/// A rate resolved by the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct RateQuote {
    pub pair: CurrencyPair,
    pub rate: Decimal,
    pub source: String,
}

/// Primary providers tried in order, then the fallback table.
///
/// The engine drives the two links separately so it can treat a fallback
/// quote differently from a live one.
pub struct ProviderChain {
    primaries: Vec<Arc<dyn RateProvider>>,
    fallback: Arc<dyn RateProvider>,
    timeout: Duration,
}

impl ProviderChain {
    pub fn new(
        primaries: Vec<Arc<dyn RateProvider>>,
        fallback: Arc<dyn RateProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            primaries,
            fallback,
            timeout,
        }
    }

    /// Stablecoin pins, CoinGecko and ExchangeRate-API, over the built-in fallback table.
    pub fn with_defaults(timeout: Duration) -> Result<Self, reqwest::Error> {
        let primaries: Vec<Arc<dyn RateProvider>> = vec![
            Arc::new(PinnedRateProvider),
            Arc::new(CoinGeckoProvider::new(timeout)?),
            Arc::new(ExchangeRateApiProvider::new(timeout)?),
        ];
        Ok(Self::new(
            primaries,
            Arc::new(FallbackRateProvider::builtin()),
            timeout,
        ))
    }

    pub fn primaries(&self) -> &[Arc<dyn RateProvider>] {
        &self.primaries
    }

    /// Try each primary provider that supports the pair, in order.
    pub async fn resolve_primary(&self, pair: &CurrencyPair) -> RateResult<RateQuote> {
        let mut last_error = None;

        for provider in self.primaries.iter().filter(|p| p.supports_pair(pair)) {
            match self.call(provider.as_ref(), pair).await {
                Ok(rate) => {
                    debug!(provider = provider.name(), pair = %pair, rate = %rate, "Got rate from provider");
                    return Ok(RateQuote {
                        pair: pair.clone(),
                        rate,
                        source: provider.name().to_string(),
                    });
                }
                Err(e) => {
                    warn!(provider = provider.name(), pair = %pair, error = %e, "Provider failed to return rate");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| RateError::UnsupportedPair {
            provider: "primary".to_string(),
            pair: pair.clone(),
        }))
    }

    /// Ask the fallback table.
    pub async fn resolve_fallback(&self, pair: &CurrencyPair) -> RateResult<RateQuote> {
        let rate = self.call(self.fallback.as_ref(), pair).await?;
        Ok(RateQuote {
            pair: pair.clone(),
            rate,
            source: self.fallback.name().to_string(),
        })
    }

    /// Probe a single provider with the chain's timeout and positivity check.
    pub async fn call(&self, provider: &dyn RateProvider, pair: &CurrencyPair) -> RateResult<Decimal> {
        let rate = tokio::time::timeout(self.timeout, provider.fetch_rate(pair))
            .await
            .map_err(|_| RateError::Timeout {
                provider: provider.name().to_string(),
                pair: pair.clone(),
            })??;

        if rate <= Decimal::ZERO {
            return Err(RateError::InvalidRate {
                provider: provider.name().to_string(),
                pair: pair.clone(),
                rate: rate.to_string(),
            });
        }
        Ok(rate)
    }
}
