//! Node configuration.

use std::str::FromStr;
use std::time::Duration;

use agritrace_ews::{ForecastConfig, OrchestratorConfig};
use agritrace_rates::RateEngineConfig;
use rust_decimal::Decimal;

/// Which weather provider backs the forecast adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherProvider {
    OpenWeather,
    OpenMeteo,
}

impl FromStr for WeatherProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openweather" => Ok(WeatherProvider::OpenWeather),
            "open-meteo" | "openmeteo" => Ok(WeatherProvider::OpenMeteo),
            other => Err(format!("Unknown weather provider: {other}")),
        }
    }
}

/// Main node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Postgres connection string. Required unless running on the in-memory store.
    pub database_url: Option<String>,
    /// Maximum pooled database connections.
    pub db_max_connections: u32,
    /// Log level used when `RUST_LOG` is unset.
    pub log_level: String,
    pub rates: RateEngineConfig,
    /// Period of the scheduled rate refresh.
    pub rate_refresh_interval: Duration,
    pub forecast: ForecastConfig,
    pub orchestrator: OrchestratorConfig,
    /// Period of the scheduled early-warning batch.
    pub ews_interval: Duration,
    pub weather_provider: WeatherProvider,
    pub openweather_api_key: Option<String>,
    /// Endpoint receiving operational notifications; logged only when unset.
    pub alert_webhook_url: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            db_max_connections: 5,
            log_level: "info".to_string(),
            rates: RateEngineConfig::default(),
            rate_refresh_interval: Duration::from_secs(15 * 60),
            forecast: ForecastConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            ews_interval: Duration::from_secs(6 * 60 * 60),
            weather_provider: WeatherProvider::OpenMeteo,
            openweather_api_key: None,
            alert_webhook_url: None,
        }
    }
}

impl NodeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`. Values that fail to parse keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        if let Some(url) = lookup("DATABASE_URL").filter(|v| !v.is_empty()) {
            config.database_url = Some(url);
        }

        if let Some(n) = lookup("DATABASE_MAX_CONNECTIONS").and_then(|v| v.parse().ok()) {
            config.db_max_connections = n;
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level;
        }

        if let Some(secs) = parsed("RATE_CACHE_TTL_SECS") {
            config.rates.cache_ttl = chrono::Duration::seconds(secs as i64);
        }

        if let Some(pct) = lookup("RATE_VOLATILITY_THRESHOLD_PCT").and_then(|v| Decimal::from_str(v.trim()).ok()) {
            config.rates.volatility_threshold_pct = pct;
        }

        if let Some(secs) = parsed("RATE_REFRESH_INTERVAL_SECS") {
            config.rate_refresh_interval = Duration::from_secs(secs);
        }

        if let Some(secs) = parsed("EWS_INTERVAL_SECS") {
            config.ews_interval = Duration::from_secs(secs);
        }

        if let Some(minutes) = parsed("EWS_RATE_LIMIT_WINDOW_MINUTES") {
            config.forecast.limit_window = chrono::Duration::minutes(minutes as i64);
        }

        if let Some(max) = parsed("EWS_RATE_LIMIT_MAX_REQUESTS") {
            config.forecast.max_requests = max as usize;
        }

        if let Some(temp) = lookup("EWS_HEAT_STRESS_TEMP_C").and_then(|v| v.trim().parse::<f64>().ok()) {
            config.orchestrator.heuristics.heat_stress_temp_c = temp;
        }

        if let Some(days) = parsed("EWS_DRY_SPELL_DAYS") {
            config.orchestrator.heuristics.dry_spell_days = days as usize;
        }

        if let Some(n) = parsed("EWS_MAX_CONCURRENT_FARMS") {
            config.orchestrator.max_concurrent_farms = n as usize;
        }

        if let Some(provider) = lookup("WEATHER_PROVIDER").and_then(|v| v.parse().ok()) {
            config.weather_provider = provider;
        }

        config.openweather_api_key = lookup("OPENWEATHER_API_KEY").filter(|v| !v.is_empty());
        config.alert_webhook_url = lookup("ALERT_WEBHOOK_URL").filter(|v| !v.is_empty());

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.rates.cache_ttl <= chrono::Duration::zero() {
            return Err("Rate cache TTL must be positive".to_string());
        }

        if self.rates.volatility_threshold_pct <= Decimal::ZERO {
            return Err("Volatility threshold must be positive".to_string());
        }

        if self.rate_refresh_interval.is_zero() || self.ews_interval.is_zero() {
            return Err("Scheduler intervals cannot be 0".to_string());
        }

        self.forecast.validate()?;
        self.orchestrator.validate()?;

        if self.weather_provider == WeatherProvider::OpenWeather && self.openweather_api_key.is_none() {
            return Err("OPENWEATHER_API_KEY is required for the openweather provider".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_vars(vars: &[(&str, &str)]) -> NodeConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        NodeConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rates.cache_ttl, chrono::Duration::seconds(3600));
        assert_eq!(config.forecast.max_requests, 10);
    }

    #[test]
    fn test_env_overrides() {
        let config = from_vars(&[
            ("DATABASE_URL", "postgres://localhost/agritrace"),
            ("RATE_CACHE_TTL_SECS", "600"),
            ("RATE_VOLATILITY_THRESHOLD_PCT", "7.5"),
            ("EWS_RATE_LIMIT_WINDOW_MINUTES", "15"),
            ("EWS_RATE_LIMIT_MAX_REQUESTS", "4"),
            ("EWS_HEAT_STRESS_TEMP_C", "33.5"),
            ("EWS_DRY_SPELL_DAYS", "5"),
            ("WEATHER_PROVIDER", "openweather"),
            ("OPENWEATHER_API_KEY", "secret"),
        ]);

        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/agritrace"));
        assert_eq!(config.rates.cache_ttl, chrono::Duration::seconds(600));
        assert_eq!(config.rates.volatility_threshold_pct, Decimal::new(75, 1));
        assert_eq!(config.forecast.limit_window, chrono::Duration::minutes(15));
        assert_eq!(config.forecast.max_requests, 4);
        assert_eq!(config.orchestrator.heuristics.heat_stress_temp_c, 33.5);
        assert_eq!(config.orchestrator.heuristics.dry_spell_days, 5);
        assert_eq!(config.weather_provider, WeatherProvider::OpenWeather);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unparseable_values_keep_defaults() {
        let config = from_vars(&[("RATE_CACHE_TTL_SECS", "soon"), ("WEATHER_PROVIDER", "sky")]);
        assert_eq!(config.rates.cache_ttl, chrono::Duration::seconds(3600));
        assert_eq!(config.weather_provider, WeatherProvider::OpenMeteo);
    }

    #[test]
    fn test_invalid_config() {
        let config = from_vars(&[("WEATHER_PROVIDER", "openweather")]);
        assert!(config.validate().is_err());

        let config = from_vars(&[("EWS_RATE_LIMIT_MAX_REQUESTS", "0")]);
        assert!(config.validate().is_err());

        let config = from_vars(&[("RATE_CACHE_TTL_SECS", "0")]);
        assert!(config.validate().is_err());
    }
}
