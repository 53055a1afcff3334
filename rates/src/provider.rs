//! Rate provider trait and the built-in providers.

use std::collections::HashMap;

use agritrace_common::{Currency, CurrencyPair};
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::{RateError, RateResult};

/// Trait for rate sources.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Provider name, recorded as the rate's source.
    fn name(&self) -> &str;

    /// Units of quote per one unit of base.
    async fn fetch_rate(&self, pair: &CurrencyPair) -> RateResult<Decimal>;

    /// Check if this provider supports the given currency pair.
    fn supports_pair(&self, pair: &CurrencyPair) -> bool;

    /// Get all supported currency pairs.
    fn supported_pairs(&self) -> Vec<CurrencyPair>;
}

/// Stablecoins hard-pinned to 1.0 against USD and each other.
#[derive(Debug, Default, Clone, Copy)]
pub struct PinnedRateProvider;

impl PinnedRateProvider {
    pub const NAME: &'static str = "PINNED";

    fn is_usd_like(currency: &Currency) -> bool {
        currency.is_stablecoin() || *currency == Currency::usd()
    }
}

#[async_trait]
impl RateProvider for PinnedRateProvider {
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
        Ok(Decimal::ONE)
    }

    fn supports_pair(&self, pair: &CurrencyPair) -> bool {
        (pair.base.is_stablecoin() || pair.quote.is_stablecoin())
            && Self::is_usd_like(&pair.base)
            && Self::is_usd_like(&pair.quote)
    }

    fn supported_pairs(&self) -> Vec<CurrencyPair> {
        ["USDC", "USDT"]
            .into_iter()
            .flat_map(|coin| {
                let pair = CurrencyPair::new(Currency::new(coin), Currency::usd());
                [pair.inverse(), pair]
            })
            .collect()
    }
}

/// Fixed table of last-known-good rates, used when the primaries fail.
///
/// Quotes a pair directly or through the inverse of a listed pair.
#[derive(Debug, Clone)]
pub struct FallbackRateProvider {
    rates: HashMap<CurrencyPair, Decimal>,
}

impl FallbackRateProvider {
    pub const NAME: &'static str = "FALLBACK";

    /// Create a fallback table from explicit rates. Non-positive rates are ignored.
    pub fn new(rates: impl IntoIterator<Item = (CurrencyPair, Decimal)>) -> Self {
        Self {
            rates: rates
                .into_iter()
                .filter(|(_, rate)| *rate > Decimal::ZERO)
                .collect(),
        }
    }

    /// The built-in table.
    pub fn builtin() -> Self {
        let table = [
            ("HBAR", "USD", Decimal::new(7, 2)),
            ("BTC", "USD", Decimal::new(65_000, 0)),
            ("ETH", "USD", Decimal::new(3_200, 0)),
            ("USD", "KES", Decimal::new(12_900, 2)),
            ("USD", "UGX", Decimal::new(3_700, 0)),
            ("USD", "TZS", Decimal::new(2_650, 0)),
            ("USD", "NGN", Decimal::new(1_550, 0)),
            ("USD", "EUR", Decimal::new(92, 2)),
            ("USD", "GBP", Decimal::new(79, 2)),
        ];
        Self::new(table.into_iter().map(|(base, quote, rate)| {
            (CurrencyPair::new(Currency::new(base), Currency::new(quote)), rate)
        }))
    }

    fn lookup(&self, pair: &CurrencyPair) -> Option<Decimal> {
        if let Some(rate) = self.rates.get(pair) {
            return Some(*rate);
        }
        self.rates
            .get(&pair.inverse())
            .and_then(|rate| Decimal::ONE.checked_div(*rate))
    }
}

impl Default for FallbackRateProvider {
    fn default() -> Self {
        Self::builtin()
    }
}

#[async_trait]
impl RateProvider for FallbackRateProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn fetch_rate(&self, pair: &CurrencyPair) -> RateResult<Decimal> {
        self.lookup(pair).ok_or_else(|| RateError::UnsupportedPair {
            provider: Self::NAME.to_string(),
            pair: pair.clone(),
        })
    }

    fn supports_pair(&self, pair: &CurrencyPair) -> bool {
        self.rates.contains_key(pair) || self.rates.contains_key(&pair.inverse())
    }

    fn supported_pairs(&self) -> Vec<CurrencyPair> {
        let mut pairs: Vec<CurrencyPair> = self.rates.keys().cloned().collect();
        pairs.sort();
        pairs
    }
}

/// Mock rate provider for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateProvider {
    name: String,
    rates: dashmap::DashMap<CurrencyPair, Decimal>,
    failing: std::sync::atomic::AtomicBool,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateProvider {
    /// Create a new mock provider.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rates: dashmap::DashMap::new(),
            failing: std::sync::atomic::AtomicBool::new(false),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Set a rate for a currency pair.
    pub fn set_rate(&self, pair: CurrencyPair, rate: Decimal) {
        self.rates.insert(pair, rate);
    }

    /// Make every fetch fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    /// Number of `fetch_rate` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateProvider for MockRateProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_rate(&self, pair: &CurrencyPair) -> RateResult<Decimal> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(RateError::ProviderFetchFailed {
                provider: self.name.clone(),
                pair: pair.clone(),
                reason: "mock failure".to_string(),
            });
        }
        self.rates
            .get(pair)
            .map(|r| *r)
            .ok_or_else(|| RateError::UnsupportedPair {
                provider: self.name.clone(),
                pair: pair.clone(),
            })
    }

    fn supports_pair(&self, pair: &CurrencyPair) -> bool {
        self.rates.contains_key(pair)
    }

    fn supported_pairs(&self) -> Vec<CurrencyPair> {
        self.rates.iter().map(|r| r.key().clone()).collect()
    }
}
