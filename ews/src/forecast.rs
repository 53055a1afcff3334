//! Forecast sources and the rate-limited adapter in front of them.
//!
//! A source fetches its provider's native JSON and maps it with one parser
//! into [`ParsedForecast`]. The adapter owns the policy shared by every
//! source: the per-farm fetch limit, the call timeout and the point budget.

use std::sync::Arc;

use agritrace_common::{Coordinates, FarmId, ForecastPoint};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::config::ForecastConfig;
use crate::error::{EwsError, EwsResult};
use crate::rate_limit::SharedFetchLimiter;

/// A provider response mapped into provider-independent points.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedForecast {
    /// Current conditions, when the provider reports them.
    pub current: Option<ForecastPoint>,
    /// Daily points in provider order.
    pub daily: Vec<ForecastPoint>,
}

impl ParsedForecast {
    /// Up to `max_daily` daily points, optionally preceded by current conditions.
    pub fn into_points(self, max_daily: usize, include_current: bool) -> Vec<ForecastPoint> {
        let mut points = Vec::with_capacity(max_daily + 1);
        if include_current {
            points.extend(self.current);
        }
        points.extend(self.daily.into_iter().take(max_daily));
        points
    }
}

/// A weather provider.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    /// Provider id recorded next to stored forecasts.
    fn name(&self) -> &str;

    /// Fetch the provider's native payload for a position.
    async fn fetch_raw(&self, coords: Coordinates) -> EwsResult<Value>;

    /// Map a native payload into forecast points.
    fn parse(&self, body: &Value) -> EwsResult<ParsedForecast>;
}

/// Rate-limited, time-bounded access to one forecast source.
pub struct ForecastAdapter {
    source: Arc<dyn ForecastSource>,
    limiter: SharedFetchLimiter,
    config: ForecastConfig,
}

impl ForecastAdapter {
    pub fn new(source: Arc<dyn ForecastSource>, limiter: SharedFetchLimiter, config: ForecastConfig) -> Self {
        Self {
            source,
            limiter,
            config,
        }
    }

    pub fn provider(&self) -> &str {
        self.source.name()
    }

    /// Fetch the forecast for a farm.
    ///
    /// Fails with `RateLimitExceeded` before any network call once the farm
    /// has used its fetches for the window.
    #[instrument(skip(self), fields(provider = self.source.name()))]
    pub async fn fetch_forecast(&self, farm_id: &FarmId, coords: Coordinates) -> EwsResult<Vec<ForecastPoint>> {
        self.limiter.try_acquire(farm_id, Utc::now())?;

        let provider = self.source.name().to_string();
        let body = tokio::time::timeout(self.config.timeout, self.source.fetch_raw(coords))
            .await
            .map_err(|_| {
                warn!(farm_id = %farm_id, provider = %provider, "Forecast fetch timed out");
                EwsError::Timeout {
                    provider: provider.clone(),
                }
            })??;

        let parsed = self.source.parse(&body)?;
        let points = parsed.into_points(self.config.max_daily_points, self.config.include_current);

        debug!(
            farm_id = %farm_id,
            points = points.len(),
            fetches_left = self.limiter.remaining(farm_id, Utc::now()),
            "Fetched forecast"
        );
        Ok(points)
    }
}

/// Forecast source returning fixed points, for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockForecastSource {
    name: String,
    points: Vec<ForecastPoint>,
    failing: parking_lot::RwLock<Vec<Coordinates>>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockForecastSource {
    pub fn new(points: Vec<ForecastPoint>) -> Self {
        Self {
            name: "mock".to_string(),
            points,
            failing: parking_lot::RwLock::new(Vec::new()),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Fail every fetch for this position.
    pub fn fail_for(&self, coords: Coordinates) {
        self.failing.write().push(coords);
    }

    /// Number of `fetch_raw` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl ForecastSource for MockForecastSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_raw(&self, coords: Coordinates) -> EwsResult<Value> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.failing.read().contains(&coords) {
            return Err(EwsError::ProviderFetchFailed {
                provider: self.name.clone(),
                reason: "mock failure".to_string(),
            });
        }
        serde_json::to_value(&self.points).map_err(|e| EwsError::InvalidPayload {
            provider: self.name.clone(),
            reason: e.to_string(),
        })
    }

    fn parse(&self, body: &Value) -> EwsResult<ParsedForecast> {
        let daily = serde_json::from_value(body.clone()).map_err(|e| EwsError::InvalidPayload {
            provider: self.name.clone(),
            reason: e.to_string(),
        })?;
        Ok(ParsedForecast { current: None, daily })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::FetchLimiter;
    use chrono::Duration;

    fn point(day: i64) -> ForecastPoint {
        ForecastPoint::new(Utc::now() + Duration::days(day), 20.0, 2.0, 3.0, 60.0)
    }

    fn adapter(source: Arc<MockForecastSource>, max_requests: usize) -> ForecastAdapter {
        let limiter = Arc::new(FetchLimiter::new(Duration::minutes(30), max_requests));
        ForecastAdapter::new(source, limiter, ForecastConfig::default())
    }

    #[test]
    fn test_into_points_prepends_current_and_caps_daily() {
        let parsed = ParsedForecast {
            current: Some(point(0)),
            daily: (1..=9).map(point).collect(),
        };

        let points = parsed.clone().into_points(7, true);
        assert_eq!(points.len(), 8);
        assert_eq!(points[0], parsed.current.clone().unwrap());
        assert_eq!(points[1], parsed.daily[0]);

        assert_eq!(parsed.into_points(7, false).len(), 7);
    }

    #[tokio::test]
    async fn test_fetch_forecast() {
        let source = Arc::new(MockForecastSource::new(vec![point(0), point(1)]));
        let adapter = adapter(source.clone(), 10);

        let points = adapter
            .fetch_forecast(&FarmId::new("farm-1"), Coordinates::new(-1.29, 36.82))
            .await
            .unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!(source.calls(), 1);
        assert_eq!(adapter.provider(), "mock");
    }

    #[tokio::test]
    async fn test_rate_limited_fetch_skips_network() {
        let source = Arc::new(MockForecastSource::new(vec![point(0)]));
        let adapter = adapter(source.clone(), 1);
        let farm = FarmId::new("farm-1");
        let coords = Coordinates::new(-1.29, 36.82);

        adapter.fetch_forecast(&farm, coords).await.unwrap();
        let err = adapter.fetch_forecast(&farm, coords).await.unwrap_err();

        assert!(matches!(err, EwsError::RateLimitExceeded { .. }));
        assert_eq!(source.calls(), 1);
    }

    struct HangingSource;

    #[async_trait]
    impl ForecastSource for HangingSource {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn fetch_raw(&self, _coords: Coordinates) -> EwsResult<Value> {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok(Value::Null)
        }

        fn parse(&self, _body: &Value) -> EwsResult<ParsedForecast> {
            Ok(ParsedForecast::default())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_source_times_out() {
        let limiter = Arc::new(FetchLimiter::new(Duration::minutes(30), 10));
        let adapter = ForecastAdapter::new(Arc::new(HangingSource), limiter, ForecastConfig::default());

        let err = adapter
            .fetch_forecast(&FarmId::new("farm-1"), Coordinates::new(0.0, 0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, EwsError::Timeout { .. }));
    }
}
