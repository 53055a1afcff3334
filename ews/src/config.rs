//! Early-warning system configuration.

use agritrace_common::constants;
use chrono::Duration;

/// Forecast fetching configuration.
#[derive(Debug, Clone)]
pub struct ForecastConfig {
    /// Sliding window for the per-farm fetch limit.
    pub limit_window: Duration,
    /// Fetches allowed per farm within `limit_window`.
    pub max_requests: usize,
    /// Upper bound on one provider call.
    pub timeout: std::time::Duration,
    /// Daily points kept from a provider response.
    pub max_daily_points: usize,
    /// Prepend the provider's current conditions when it reports them.
    pub include_current: bool,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            limit_window: constants::forecast_limit_window(),
            max_requests: 10,
            timeout: std::time::Duration::from_secs(10),
            max_daily_points: 7,
            include_current: true,
        }
    }
}

/// Thresholds for the fixed heuristic pass.
#[derive(Debug, Clone)]
pub struct HeuristicsConfig {
    /// Temperature (°C) above which a point counts towards heat stress.
    pub heat_stress_temp_c: f64,
    /// Dry points (< 1 mm) needed to flag drought.
    pub dry_spell_days: usize,
    /// Wind speed (m/s) above which a point counts towards flood risk.
    pub flood_wind_speed: f64,
}

impl Default for HeuristicsConfig {
    fn default() -> Self {
        Self {
            heat_stress_temp_c: 35.0,
            dry_spell_days: 7,
            flood_wind_speed: 20.0,
        }
    }
}

/// Batch orchestration configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Farms whose pipelines may run at the same time.
    pub max_concurrent_farms: usize,
    pub heuristics: HeuristicsConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_farms: 4,
            heuristics: HeuristicsConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_farms == 0 {
            return Err("Max concurrent farms cannot be 0".to_string());
        }
        if self.heuristics.dry_spell_days == 0 {
            return Err("Dry spell days cannot be 0".to_string());
        }
        Ok(())
    }
}

impl ForecastConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.limit_window <= Duration::zero() {
            return Err("Forecast rate limit window must be positive".to_string());
        }
        if self.max_requests == 0 {
            return Err("Forecast rate limit max requests cannot be 0".to_string());
        }
        Ok(())
    }
}
