//! Default intervals shared by the rate and early-warning services.

/// Default intervals.
pub mod constants {
    use chrono::Duration;

    /// Rate cache freshness window (1 hour).
    pub fn rate_cache_ttl() -> Duration {
        Duration::seconds(3600)
    }

    /// Sliding window for forecast fetch limiting (30 minutes).
    pub fn forecast_limit_window() -> Duration {
        Duration::minutes(30)
    }

    /// Age after which a cached rate is no longer kept as a last resort (7 days).
    pub fn rate_cache_retention() -> Duration {
        Duration::days(7)
    }
}
