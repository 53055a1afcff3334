//! AgriTrace Early-Warning System
//!
//! Fetches weather forecasts per farm, scores them against the disease rule
//! table and a fixed set of weather heuristics, and records severity-ranked
//! alerts for the farms at risk.
//!
//! # Example
//!
//! ```rust,ignore
//! use agritrace_ews::{EwsOrchestrator, FetchLimiter, ForecastAdapter, OpenMeteoSource};
//!
//! let limiter = Arc::new(FetchLimiter::new(config.limit_window, config.max_requests));
//! let source = Arc::new(OpenMeteoSource::new(config.timeout)?);
//! let adapter = Arc::new(ForecastAdapter::new(source, limiter, config));
//! let orchestrator = EwsOrchestrator::new(adapter, store, OrchestratorConfig::default());
//!
//! let report = orchestrator.run_batch().await?;
//! ```

pub mod alerts;
pub mod config;
pub mod error;
pub mod forecast;
pub mod heuristics;
pub mod orchestrator;
pub mod providers;
pub mod rate_limit;
pub mod rules;

pub use alerts::AlertGenerator;
pub use config::{ForecastConfig, HeuristicsConfig, OrchestratorConfig};
pub use error::{EwsError, EwsResult};
pub use forecast::{ForecastAdapter, ForecastSource, ParsedForecast};
#[cfg(any(test, feature = "test-utils"))]
pub use forecast::MockForecastSource;
pub use heuristics::Heuristic;
pub use orchestrator::{BatchReport, EwsOrchestrator, FarmOutcome};
pub use providers::{OpenMeteoSource, OpenWeatherSource};
pub use rate_limit::{FetchLimiter, SharedFetchLimiter};
pub use rules::{DiseaseRuleEvaluator, MIN_CONFIDENCE};
