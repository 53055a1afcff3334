//! Volatility detection between consecutive cached rates.

use agritrace_common::{CurrencyPair, EventType, NotificationEvent};
use rust_decimal::Decimal;
use serde_json::json;

/// Percent move from `previous` to `current`. `None` when `previous` is not positive.
///
/// A move too large to represent saturates at `Decimal::MAX`, which exceeds any threshold.
pub fn percent_change(previous: Decimal, current: Decimal) -> Option<Decimal> {
    if previous <= Decimal::ZERO {
        return None;
    }
    let change = current
        .checked_sub(previous)
        .map(|delta| delta.abs())
        .and_then(|delta| delta.checked_div(previous))
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or(Decimal::MAX);
    Some(change)
}

/// Strictly above the threshold; a move of exactly the threshold does not alert.
pub fn exceeds_threshold(change_pct: Decimal, threshold_pct: Decimal) -> bool {
    change_pct > threshold_pct
}

/// A detected move worth notifying about.
#[derive(Debug, Clone, PartialEq)]
pub struct VolatilityAlert {
    pub pair: CurrencyPair,
    pub previous_rate: Decimal,
    pub new_rate: Decimal,
    pub change_pct: Decimal,
    pub threshold_pct: Decimal,
}

impl VolatilityAlert {
    /// Compare two rates and build an alert if the move is over threshold.
    pub fn check(
        pair: &CurrencyPair,
        previous_rate: Decimal,
        new_rate: Decimal,
        threshold_pct: Decimal,
    ) -> Option<Self> {
        let change_pct = percent_change(previous_rate, new_rate)?;
        exceeds_threshold(change_pct, threshold_pct).then(|| Self {
            pair: pair.clone(),
            previous_rate,
            new_rate,
            change_pct,
            threshold_pct,
        })
    }

    pub fn to_event(&self) -> NotificationEvent {
        NotificationEvent::new(
            EventType::RateVolatilityAlert,
            "WARNING",
            json!({
                "pair": self.pair.to_string(),
                "previous_rate": self.previous_rate.to_string(),
                "new_rate": self.new_rate.to_string(),
                "change_percent": self.change_pct.round_dp(4).normalize().to_string(),
                "threshold_percent": self.threshold_pct.to_string(),
            }),
        )
    }
}
