//! Currency conversion records.

use agritrace_common::CurrencyPair;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RateError, RateResult};

/// A completed conversion of an amount from base to quote currency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversion {
    /// Unique conversion ID.
    pub id: Uuid,
    pub pair: CurrencyPair,
    /// Input amount, in base currency.
    pub amount: Decimal,
    /// Output amount, in quote currency, rounded to its decimal places.
    pub converted: Decimal,
    /// Rate applied.
    pub rate: Decimal,
    /// Where the rate came from.
    pub source: String,
    pub executed_at: DateTime<Utc>,
}

impl Conversion {
    /// Apply `rate` to `amount`, rounding to the quote currency's precision.
    pub fn apply(
        pair: CurrencyPair,
        amount: Decimal,
        rate: Decimal,
        source: impl Into<String>,
    ) -> RateResult<Self> {
        let converted = amount
            .checked_mul(rate)
            .ok_or_else(|| RateError::ConversionOverflow {
                pair: pair.clone(),
                amount: amount.to_string(),
            })?
            .round_dp(pair.quote.decimal_places());

        Ok(Self {
            id: Uuid::now_v7(),
            pair,
            amount,
            converted,
            rate,
            source: source.into(),
            executed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agritrace_common::Currency;
    use rust_decimal_macros::dec;

    #[test]
    fn test_conversion_rounds_to_quote_precision() {
        let pair = CurrencyPair::new(Currency::usd(), Currency::kes());
        let conversion = Conversion::apply(pair, dec!(10.555), dec!(129.37), "TEST").unwrap();

        assert_eq!(conversion.converted, dec!(1365.50));
        assert_eq!(conversion.pair.quote, Currency::kes());
    }

    #[test]
    fn test_crypto_keeps_eight_places() {
        let pair = CurrencyPair::new(Currency::usd(), Currency::hbar());
        let conversion = Conversion::apply(pair, dec!(1), dec!(14.285714285714), "TEST").unwrap();

        assert_eq!(conversion.converted, dec!(14.28571429));
    }

    #[test]
    fn test_overflowing_amount_is_an_error() {
        let pair = CurrencyPair::new(Currency::usd(), Currency::kes());
        let result = Conversion::apply(pair, Decimal::MAX / dec!(10), dec!(129.37), "TEST");

        match result {
            Err(RateError::ConversionOverflow { pair, .. }) => assert_eq!(pair.to_string(), "USD/KES"),
            other => panic!("expected overflow, got {other:?}"),
        }
    }
}
