//! AgriTrace Rate Engine
//!
//! Conversion rates for the payment flows: crypto and fiat pairs resolved
//! through a primary provider chain with a built-in fallback table, cached
//! with a TTL, persisted, and watched for volatility.
//!
//! # Features
//!
//! - Primary/fallback provider resolution with per-call timeouts
//! - Write-through cache with a stale-cache last resort
//! - Current-value upsert plus append-only history
//! - Volatility notifications between consecutive cached values
//! - Bulk refresh for scheduled invocation
//!
//! # Example
//!
//! ```rust,ignore
//! use agritrace_common::{Currency, CurrencyPair};
//! use agritrace_rates::{ProviderChain, RateCache, RateEngine, RateEngineConfig};
//!
//! let chain = ProviderChain::with_defaults(config.provider_timeout)?;
//! let engine = RateEngine::new(chain, Arc::new(RateCache::new()), store, notifier, config);
//!
//! let rate = engine.get_rate_for(Currency::hbar(), Currency::usd()).await?;
//! ```

pub mod cache;
pub mod chain;
pub mod conversion;
pub mod engine;
pub mod error;
pub mod http;
pub mod provider;
pub mod volatility;

pub use cache::{CacheSlot, CacheStats, RateCache, SharedRateCache};
pub use chain::{ProviderChain, RateQuote};
pub use conversion::Conversion;
pub use engine::{
    default_refresh_pairs, ProviderHealth, RateEngine, RateEngineConfig, RateLookup, RateOutcome,
    RefreshReport, SharedRateEngine,
};
pub use error::{RateError, RateResult};
pub use http::{CoinGeckoProvider, ExchangeRateApiProvider};
#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockRateProvider;
pub use provider::{FallbackRateProvider, PinnedRateProvider, RateProvider};
