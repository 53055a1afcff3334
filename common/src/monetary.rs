//! Currency, pair and rate record types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Currency code, fiat (ISO 4217) or crypto ticker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    /// Create a new currency from code.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().to_uppercase())
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Whether this is a crypto asset rather than a fiat currency.
    pub fn is_crypto(&self) -> bool {
        matches!(
            self.0.as_str(),
            "HBAR" | "BTC" | "ETH" | "USDC" | "USDT"
        )
    }

    /// Whether this is a USD-pegged stablecoin.
    pub fn is_stablecoin(&self) -> bool {
        matches!(self.0.as_str(), "USDC" | "USDT")
    }

    /// Get the standard decimal places for this currency.
    pub fn decimal_places(&self) -> u32 {
        match self.0.as_str() {
            "HBAR" | "BTC" | "ETH" => 8,
            "USDC" | "USDT" => 6,
            "JPY" | "KRW" | "UGX" | "RWF" | "XOF" | "XAF" => 0,
            _ => 2,
        }
    }

    pub fn usd() -> Self {
        Self::new("USD")
    }

    pub fn eur() -> Self {
        Self::new("EUR")
    }

    pub fn kes() -> Self {
        Self::new("KES")
    }

    pub fn hbar() -> Self {
        Self::new("HBAR")
    }

    pub fn usdc() -> Self {
        Self::new("USDC")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Currency {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// An ordered (base, quote) pair used as the key for rate lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CurrencyPair {
    /// Base currency (the unit being priced).
    pub base: Currency,
    /// Quote currency (the pricing currency).
    pub quote: Currency,
}

impl CurrencyPair {
    /// Create a new currency pair.
    pub fn new(base: Currency, quote: Currency) -> Self {
        Self { base, quote }
    }

    /// Get the inverse pair.
    pub fn inverse(&self) -> Self {
        Self {
            base: self.quote.clone(),
            quote: self.base.clone(),
        }
    }

    /// True when base and quote are the same currency.
    pub fn is_identity(&self) -> bool {
        self.base == self.quote
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Error parsing a `BASE/QUOTE` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairParseError(pub String);

impl fmt::Display for PairParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid currency pair '{}', expected BASE/QUOTE", self.0)
    }
}

impl std::error::Error for PairParseError {}

impl FromStr for CurrencyPair {
    type Err = PairParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, quote) = s
            .split_once('/')
            .ok_or_else(|| PairParseError(s.to_string()))?;
        let (base, quote) = (base.trim(), quote.trim());
        if base.is_empty() || quote.is_empty() {
            return Err(PairParseError(s.to_string()));
        }
        Ok(Self::new(Currency::new(base), Currency::new(quote)))
    }
}

/// A rate observed from a provider.
///
/// Entries are superseded rather than deleted: the current-value table is
/// upserted per pair and every entry is also appended to the history log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateEntry {
    /// The currency pair.
    #[serde(flatten)]
    pub pair: CurrencyPair,
    /// Units of quote per one unit of base. Always positive.
    pub rate: Decimal,
    /// Provider that produced the rate.
    pub source: String,
    /// When the rate was fetched.
    pub fetched_at: DateTime<Utc>,
}

impl RateEntry {
    /// Create a new rate entry.
    pub fn new(
        pair: CurrencyPair,
        rate: Decimal,
        source: impl Into<String>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            pair,
            rate,
            source: source.into(),
            fetched_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_pair_parse() {
        let pair: CurrencyPair = "hbar/usd".parse().unwrap();
        assert_eq!(pair.base, Currency::hbar());
        assert_eq!(pair.quote, Currency::usd());
        assert_eq!(pair.to_string(), "HBAR/USD");

        assert!("HBARUSD".parse::<CurrencyPair>().is_err());
        assert!("/USD".parse::<CurrencyPair>().is_err());
    }

    #[test]
    fn test_pair_inverse_and_identity() {
        let pair = CurrencyPair::new(Currency::usd(), Currency::kes());
        assert_eq!(pair.inverse().to_string(), "KES/USD");
        assert!(!pair.is_identity());
        assert!(CurrencyPair::new(Currency::usd(), Currency::usd()).is_identity());
    }

    #[test]
    fn test_currency_classification() {
        assert!(Currency::usdc().is_stablecoin());
        assert!(Currency::usdc().is_crypto());
        assert!(Currency::hbar().is_crypto());
        assert!(!Currency::hbar().is_stablecoin());
        assert!(!Currency::kes().is_crypto());
        assert_eq!(Currency::hbar().decimal_places(), 8);
        assert_eq!(Currency::new("UGX").decimal_places(), 0);
        assert_eq!(Currency::kes().decimal_places(), 2);
    }

    #[test]
    fn test_rate_entry_serializes_flat() {
        let entry = RateEntry::new(
            CurrencyPair::new(Currency::hbar(), Currency::usd()),
            dec!(0.071),
            "coingecko",
            Utc::now(),
        );
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["base"], "HBAR");
        assert_eq!(json["quote"], "USD");
        assert_eq!(json["source"], "coingecko");
    }
}
