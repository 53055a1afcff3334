//! Main rate engine implementation.

use std::sync::Arc;

use agritrace_common::{
    constants, Currency, CurrencyPair, EventType, NotificationEvent, RateEntry, SharedNotifier,
    SharedStore,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheStats, SharedRateCache};
use crate::chain::ProviderChain;
use crate::conversion::Conversion;
use crate::error::{RateError, RateResult};
use crate::volatility::VolatilityAlert;

/// Configuration for the rate engine.
#[derive(Debug, Clone)]
pub struct RateEngineConfig {
    /// How long a cached rate skips the providers.
    pub cache_ttl: Duration,
    /// Percent move between consecutive cached values that raises an alert.
    pub volatility_threshold_pct: Decimal,
    /// Upper bound on each provider call.
    pub provider_timeout: std::time::Duration,
    /// Pairs refreshed by `fetch_rates`.
    pub refresh_pairs: Vec<CurrencyPair>,
    /// Age after which `prune_cache` drops a slot.
    pub cache_retention: Duration,
}

impl Default for RateEngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl: constants::rate_cache_ttl(),
            volatility_threshold_pct: Decimal::TEN,
            provider_timeout: std::time::Duration::from_secs(10),
            refresh_pairs: default_refresh_pairs(),
            cache_retention: constants::rate_cache_retention(),
        }
    }
}

/// The crypto and fiat pairs the payment flows convert through.
pub fn default_refresh_pairs() -> Vec<CurrencyPair> {
    let crypto = ["HBAR", "BTC", "ETH", "USDC", "USDT"]
        .into_iter()
        .map(|base| CurrencyPair::new(Currency::new(base), Currency::usd()));
    let fiat = ["KES", "UGX", "TZS", "NGN", "EUR", "GBP"]
        .into_iter()
        .map(|quote| CurrencyPair::new(Currency::usd(), Currency::new(quote)));
    crypto.chain(fiat).collect()
}

/// How a lookup was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateOutcome {
    /// Base and quote are the same currency.
    Identity,
    /// Fresh cache slot; no provider was called.
    Cached,
    /// Live rate from a primary provider.
    Primary,
    /// Built-in fallback table.
    Fallback,
    /// Expired cache slot returned because every provider failed.
    Stale,
}

/// The result of a rate lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLookup {
    pub pair: CurrencyPair,
    pub rate: Decimal,
    pub source: String,
    pub outcome: RateOutcome,
    /// Whether this lookup wrote a value that moved past the volatility threshold.
    pub volatility_alert: bool,
    /// Persistence failures while recording this lookup.
    pub persistence_failures: usize,
}

impl RateLookup {
    fn new(pair: &CurrencyPair, rate: Decimal, source: impl Into<String>, outcome: RateOutcome) -> Self {
        Self {
            pair: pair.clone(),
            rate,
            source: source.into(),
            outcome,
            volatility_alert: false,
            persistence_failures: 0,
        }
    }
}

/// Per-pair results of a bulk refresh.
#[derive(Debug, Clone, Default)]
pub struct RefreshReport {
    pub results: Vec<(CurrencyPair, RateResult<RateLookup>)>,
}

impl RefreshReport {
    fn count(&self, outcome: RateOutcome) -> usize {
        self.results
            .iter()
            .filter(|(_, r)| matches!(r, Ok(lookup) if lookup.outcome == outcome))
            .count()
    }

    pub fn refreshed(&self) -> usize {
        self.count(RateOutcome::Primary) + self.count(RateOutcome::Identity)
    }

    pub fn fallbacks(&self) -> usize {
        self.count(RateOutcome::Fallback)
    }

    pub fn stale(&self) -> usize {
        self.count(RateOutcome::Stale)
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|(_, r)| r.is_err()).count()
    }

    pub fn volatility_alerts(&self) -> usize {
        self.results
            .iter()
            .filter(|(_, r)| matches!(r, Ok(lookup) if lookup.volatility_alert))
            .count()
    }

    pub fn persistence_failures(&self) -> usize {
        self.results
            .iter()
            .filter_map(|(_, r)| r.as_ref().ok())
            .map(|lookup| lookup.persistence_failures)
            .sum()
    }
}

/// Health of one primary provider.
#[derive(Debug, Clone)]
pub struct ProviderHealth {
    pub provider: String,
    pub probe_pair: CurrencyPair,
    pub healthy: bool,
    pub error: Option<String>,
}

/// The rate engine.
///
/// Holds no global state: the cache is injected so a process shares one
/// instance and each test can build its own.
pub struct RateEngine {
    chain: ProviderChain,
    cache: SharedRateCache,
    store: SharedStore,
    notifier: SharedNotifier,
    config: RateEngineConfig,
}

impl RateEngine {
    pub fn new(
        chain: ProviderChain,
        cache: SharedRateCache,
        store: SharedStore,
        notifier: SharedNotifier,
        config: RateEngineConfig,
    ) -> Self {
        Self {
            chain,
            cache,
            store,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &RateEngineConfig {
        &self.config
    }

    /// Get the current rate for a currency pair.
    pub async fn get_rate(&self, pair: &CurrencyPair) -> RateResult<Decimal> {
        Ok(self.lookup(pair).await?.rate)
    }

    /// Get rate between two currencies.
    pub async fn get_rate_for(&self, base: Currency, quote: Currency) -> RateResult<Decimal> {
        let pair = CurrencyPair::new(base, quote);
        self.get_rate(&pair).await
    }

    /// Resolve a pair: fresh cache, then primaries, then fallback, then stale cache.
    #[instrument(skip(self), fields(pair = %pair))]
    pub async fn lookup(&self, pair: &CurrencyPair) -> RateResult<RateLookup> {
        if pair.is_identity() {
            return Ok(RateLookup::new(pair, Decimal::ONE, "IDENTITY", RateOutcome::Identity));
        }

        if let Some(slot) = self.cache.get(pair) {
            if slot.is_fresh(Utc::now(), self.config.cache_ttl) {
                debug!("Using cached rate");
                return Ok(RateLookup::new(pair, slot.rate, "CACHE", RateOutcome::Cached));
            }
        }

        self.refresh(pair).await
    }

    /// Fetch a pair from the providers regardless of cache freshness.
    pub async fn refresh(&self, pair: &CurrencyPair) -> RateResult<RateLookup> {
        if pair.is_identity() {
            return Ok(RateLookup::new(pair, Decimal::ONE, "IDENTITY", RateOutcome::Identity));
        }

        let now = Utc::now();

        match self.chain.resolve_primary(pair).await {
            Ok(quote) => {
                let mut lookup = RateLookup::new(pair, quote.rate, quote.source, RateOutcome::Primary);
                lookup.volatility_alert = self.write_through(pair, quote.rate, now).await;
                lookup.persistence_failures = self.persist(&lookup, now).await;
                return Ok(lookup);
            }
            Err(e) => {
                warn!(pair = %pair, error = %e, "Primary rate resolution failed");
            }
        }

        match self.chain.resolve_fallback(pair).await {
            Ok(quote) => {
                let mut lookup = RateLookup::new(pair, quote.rate, quote.source, RateOutcome::Fallback);
                lookup.volatility_alert = self.write_through(pair, quote.rate, now).await;
                return Ok(lookup);
            }
            Err(e) => {
                warn!(pair = %pair, error = %e, "Fallback rate resolution failed");
            }
        }

        if let Some(slot) = self.cache.get(pair) {
            warn!(
                pair = %pair,
                cached_at = %slot.cached_at,
                "All providers failed, returning stale cached rate"
            );
            return Ok(RateLookup::new(pair, slot.rate, "CACHE", RateOutcome::Stale));
        }

        Err(RateError::RateUnavailable(pair.clone()))
    }

    /// Refresh every configured pair. A failing pair never stops the others.
    #[instrument(skip(self))]
    pub async fn fetch_rates(&self) -> RefreshReport {
        let mut report = RefreshReport::default();

        for pair in &self.config.refresh_pairs {
            let result = self.refresh(pair).await;
            if let Err(e) = &result {
                warn!(pair = %pair, error = %e, "Rate refresh failed");
            }
            report.results.push((pair.clone(), result));
        }

        info!(
            pairs = report.results.len(),
            refreshed = report.refreshed(),
            fallbacks = report.fallbacks(),
            stale = report.stale(),
            failed = report.failed(),
            "Rate refresh complete"
        );

        report
    }

    /// Convert an amount from the pair's base to its quote currency.
    #[instrument(skip(self), fields(pair = %pair, amount = %amount))]
    pub async fn convert(&self, amount: Decimal, pair: &CurrencyPair) -> RateResult<Conversion> {
        let lookup = self.lookup(pair).await?;
        let conversion = Conversion::apply(pair.clone(), amount, lookup.rate, lookup.source)?;

        info!(
            conversion_id = %conversion.id,
            converted = %conversion.converted,
            rate = %conversion.rate,
            "Conversion completed"
        );

        Ok(conversion)
    }

    /// Probe every primary provider with one of its pairs.
    /// Each failure raises a `HEALTH_CHECK_FAILED` notification.
    pub async fn health_check(&self) -> Vec<ProviderHealth> {
        let mut report = Vec::new();

        for provider in self.chain.primaries() {
            let Some(probe_pair) = provider.supported_pairs().into_iter().next() else {
                continue;
            };

            let health = match self.chain.call(provider.as_ref(), &probe_pair).await {
                Ok(_) => ProviderHealth {
                    provider: provider.name().to_string(),
                    probe_pair,
                    healthy: true,
                    error: None,
                },
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "Provider health check failed");
                    self.notify(NotificationEvent::new(
                        EventType::HealthCheckFailed,
                        "ERROR",
                        json!({
                            "provider": provider.name(),
                            "pair": probe_pair.to_string(),
                            "error": e.to_string(),
                        }),
                    ))
                    .await;
                    ProviderHealth {
                        provider: provider.name().to_string(),
                        probe_pair,
                        healthy: false,
                        error: Some(e.to_string()),
                    }
                }
            };
            report.push(health);
        }

        report
    }

    /// Drop cache slots older than the configured retention.
    pub fn prune_cache(&self) -> usize {
        self.cache.prune(Utc::now(), self.config.cache_retention)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats(Utc::now(), self.config.cache_ttl)
    }

    /// Cache the rate and compare it to the value it replaces.
    /// Returns whether a volatility alert was raised.
    async fn write_through(&self, pair: &CurrencyPair, rate: Decimal, now: DateTime<Utc>) -> bool {
        let Some(previous) = self.cache.put(pair.clone(), rate, now) else {
            return false;
        };

        match VolatilityAlert::check(pair, previous.rate, rate, self.config.volatility_threshold_pct) {
            Some(alert) => {
                warn!(
                    pair = %pair,
                    previous = %alert.previous_rate,
                    current = %alert.new_rate,
                    change_pct = %alert.change_pct,
                    "Rate volatility alert"
                );
                self.notify(alert.to_event()).await;
                true
            }
            None => false,
        }
    }

    /// Upsert the current value and append to history. Failures are logged
    /// and counted, never returned.
    async fn persist(&self, lookup: &RateLookup, now: DateTime<Utc>) -> usize {
        let entry = RateEntry::new(lookup.pair.clone(), lookup.rate, lookup.source.clone(), now);
        let mut failures = 0;

        if let Err(e) = self.store.upsert_rate(&entry).await {
            warn!(pair = %entry.pair, error = %e, code = e.error_code(), "Failed to persist current rate");
            failures += 1;
        }
        if let Err(e) = self.store.append_rate_history(&entry).await {
            warn!(pair = %entry.pair, error = %e, code = e.error_code(), "Failed to append rate history");
            failures += 1;
        }

        failures
    }

    async fn notify(&self, event: NotificationEvent) {
        let event_type = event.event_type;
        if let Err(e) = self.notifier.notify(event).await {
            warn!(event_type = %event_type, error = %e, "Notification failed");
        }
    }
}

/// Shared rate engine handle.
pub type SharedRateEngine = Arc<RateEngine>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RateCache;
    use crate::provider::{MockRateProvider, RateProvider};
    use agritrace_common::notify::RecordingNotifier;
    use agritrace_common::MemoryStore;
    use rust_decimal_macros::dec;

    struct Harness {
        engine: RateEngine,
        primary: Arc<MockRateProvider>,
        fallback: Arc<MockRateProvider>,
        cache: SharedRateCache,
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness_with(config: RateEngineConfig, notifier: RecordingNotifier) -> Harness {
        let primary = Arc::new(MockRateProvider::new("primary"));
        let fallback = Arc::new(MockRateProvider::new("fallback"));
        let cache: SharedRateCache = Arc::new(RateCache::new());
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(notifier);

        let chain = ProviderChain::new(
            vec![primary.clone() as Arc<dyn RateProvider>],
            fallback.clone(),
            std::time::Duration::from_secs(10),
        );
        let engine = RateEngine::new(chain, cache.clone(), store.clone(), notifier.clone(), config);

        Harness {
            engine,
            primary,
            fallback,
            cache,
            store,
            notifier,
        }
    }

    fn harness() -> Harness {
        harness_with(RateEngineConfig::default(), RecordingNotifier::new())
    }

    fn hbar_usd() -> CurrencyPair {
        CurrencyPair::new(Currency::hbar(), Currency::usd())
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_providers() {
        let h = harness();
        h.primary.set_rate(hbar_usd(), dec!(0.08));
        h.cache.put(hbar_usd(), dec!(0.07), Utc::now() - Duration::seconds(30));

        let rate = h.engine.get_rate(&hbar_usd()).await.unwrap();

        assert_eq!(rate, dec!(0.07));
        assert_eq!(h.primary.calls(), 0);
        assert_eq!(h.fallback.calls(), 0);
    }

    #[tokio::test]
    async fn test_expired_cache_refetches_and_persists() {
        let h = harness();
        h.primary.set_rate(hbar_usd(), dec!(0.071));
        h.cache.put(hbar_usd(), dec!(0.07), Utc::now() - Duration::hours(2));

        let lookup = h.engine.lookup(&hbar_usd()).await.unwrap();

        assert_eq!(lookup.outcome, RateOutcome::Primary);
        assert_eq!(lookup.rate, dec!(0.071));
        assert_eq!(lookup.source, "primary");
        assert_eq!(h.primary.calls(), 1);
        assert_eq!(h.cache.get(&hbar_usd()).unwrap().rate, dec!(0.071));
        assert_eq!(h.store.current_rate(&hbar_usd()).unwrap().rate, dec!(0.071));
        assert_eq!(h.store.rate_history().len(), 1);
    }

    #[tokio::test]
    async fn test_fallback_is_cached_but_not_persisted() {
        let h = harness();
        h.primary.set_rate(hbar_usd(), dec!(0.071));
        h.primary.set_failing(true);
        h.fallback.set_rate(hbar_usd(), dec!(0.07));

        let lookup = h.engine.lookup(&hbar_usd()).await.unwrap();

        assert_eq!(lookup.outcome, RateOutcome::Fallback);
        assert_eq!(lookup.rate, dec!(0.07));
        assert_eq!(h.cache.get(&hbar_usd()).unwrap().rate, dec!(0.07));
        assert!(h.store.current_rate(&hbar_usd()).is_none());
    }

    #[tokio::test]
    async fn test_stale_cache_is_last_resort() {
        let h = harness();
        h.cache.put(hbar_usd(), dec!(0.065), Utc::now() - Duration::days(3));

        let lookup = h.engine.lookup(&hbar_usd()).await.unwrap();

        assert_eq!(lookup.outcome, RateOutcome::Stale);
        assert_eq!(lookup.rate, dec!(0.065));
    }

    #[tokio::test]
    async fn test_rate_unavailable_without_cache() {
        let h = harness();
        h.primary.set_rate(hbar_usd(), dec!(0.071));
        h.primary.set_failing(true);

        let result = h.engine.get_rate(&hbar_usd()).await;

        assert!(matches!(result, Err(RateError::RateUnavailable(pair)) if pair == hbar_usd()));
    }

    #[tokio::test]
    async fn test_identity_pair() {
        let h = harness();
        let rate = h
            .engine
            .get_rate_for(Currency::kes(), Currency::kes())
            .await
            .unwrap();

        assert_eq!(rate, Decimal::ONE);
        assert_eq!(h.primary.calls(), 0);
    }

    #[tokio::test]
    async fn test_volatility_alert_above_threshold() {
        let h = harness();
        h.cache.put(hbar_usd(), dec!(100), Utc::now() - Duration::hours(2));
        h.primary.set_rate(hbar_usd(), dec!(110.5));

        let lookup = h.engine.lookup(&hbar_usd()).await.unwrap();

        assert!(lookup.volatility_alert);
        assert_eq!(h.notifier.count(EventType::RateVolatilityAlert), 1);
        let event = &h.notifier.events()[0];
        assert_eq!(event.details["pair"], "HBAR/USD");
        assert_eq!(event.details["change_percent"], "10.5");
    }

    #[tokio::test]
    async fn test_volatility_at_threshold_does_not_alert() {
        let h = harness();
        h.cache.put(hbar_usd(), dec!(100), Utc::now() - Duration::hours(2));
        h.primary.set_rate(hbar_usd(), dec!(110));

        let lookup = h.engine.lookup(&hbar_usd()).await.unwrap();

        assert!(!lookup.volatility_alert);
        assert_eq!(h.notifier.count(EventType::RateVolatilityAlert), 0);
    }

    #[tokio::test]
    async fn test_notifier_failure_does_not_fail_lookup() {
        let h = harness_with(RateEngineConfig::default(), RecordingNotifier::failing());
        h.cache.put(hbar_usd(), dec!(100), Utc::now() - Duration::hours(2));
        h.primary.set_rate(hbar_usd(), dec!(150));

        let rate = h.engine.get_rate(&hbar_usd()).await.unwrap();

        assert_eq!(rate, dec!(150));
        assert_eq!(h.notifier.events().len(), 1);
    }

    #[tokio::test]
    async fn test_persistence_failure_still_returns_rate() {
        let h = harness();
        h.store.fail_writes(true);
        h.primary.set_rate(hbar_usd(), dec!(0.071));

        let lookup = h.engine.lookup(&hbar_usd()).await.unwrap();

        assert_eq!(lookup.rate, dec!(0.071));
        assert_eq!(lookup.persistence_failures, 2);
        assert_eq!(h.cache.get(&hbar_usd()).unwrap().rate, dec!(0.071));
    }

    #[tokio::test]
    async fn test_fetch_rates_isolates_pair_failures() {
        let usd_kes = CurrencyPair::new(Currency::usd(), Currency::kes());
        let usd_ngn = CurrencyPair::new(Currency::usd(), Currency::new("NGN"));
        let config = RateEngineConfig {
            refresh_pairs: vec![hbar_usd(), usd_kes.clone(), usd_ngn.clone()],
            ..Default::default()
        };
        let h = harness_with(config, RecordingNotifier::new());
        h.primary.set_rate(hbar_usd(), dec!(0.071));
        h.fallback.set_rate(usd_kes.clone(), dec!(129));

        // Fresh cache must not short-circuit a scheduled refresh.
        h.cache.put(hbar_usd(), dec!(0.07), Utc::now());

        let report = h.engine.fetch_rates().await;

        assert_eq!(report.results.len(), 3);
        assert_eq!(report.refreshed(), 1);
        assert_eq!(report.fallbacks(), 1);
        assert_eq!(report.failed(), 1);
        assert!(matches!(&report.results[2].1, Err(RateError::RateUnavailable(p)) if *p == usd_ngn));
        assert_eq!(h.cache.get(&hbar_usd()).unwrap().rate, dec!(0.071));
    }

    #[tokio::test]
    async fn test_convert() {
        let h = harness();
        let usd_kes = CurrencyPair::new(Currency::usd(), Currency::kes());
        h.primary.set_rate(usd_kes.clone(), dec!(129.37));

        let conversion = h.engine.convert(dec!(250), &usd_kes).await.unwrap();

        assert_eq!(conversion.converted, dec!(32342.50));
        assert_eq!(conversion.source, "primary");
    }

    #[tokio::test]
    async fn test_convert_overflow_is_an_error() {
        let h = harness();
        let usd_kes = CurrencyPair::new(Currency::usd(), Currency::kes());
        h.primary.set_rate(usd_kes.clone(), dec!(129.37));

        let result = h.engine.convert(Decimal::MAX / dec!(10), &usd_kes).await;

        assert!(matches!(result, Err(RateError::ConversionOverflow { .. })));
        // The rate itself was still resolved and cached.
        assert_eq!(h.cache.get(&usd_kes).unwrap().rate, dec!(129.37));
    }

    #[tokio::test]
    async fn test_extreme_move_still_returns_rate() {
        let h = harness();
        h.cache.put(hbar_usd(), dec!(0.0000000000000000000000001), Utc::now() - Duration::hours(2));
        h.primary.set_rate(hbar_usd(), dec!(100000));

        let rate = h.engine.get_rate(&hbar_usd()).await.unwrap();

        assert_eq!(rate, dec!(100000));
        assert_eq!(h.notifier.count(EventType::RateVolatilityAlert), 1);
    }

    #[tokio::test]
    async fn test_health_check_notifies_failures() {
        let h = harness();
        h.primary.set_rate(hbar_usd(), dec!(0.071));
        h.primary.set_failing(true);

        let report = h.engine.health_check().await;

        assert_eq!(report.len(), 1);
        assert!(!report[0].healthy);
        assert_eq!(h.notifier.count(EventType::HealthCheckFailed), 1);
    }

    #[test]
    fn test_default_config() {
        let config = RateEngineConfig::default();
        assert_eq!(config.cache_ttl, Duration::seconds(3600));
        assert_eq!(config.volatility_threshold_pct, dec!(10));
        assert_eq!(config.refresh_pairs.len(), 11);
    }
}
