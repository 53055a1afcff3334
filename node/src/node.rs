//! Node wiring and the scheduled rate and early-warning loops.

use std::sync::Arc;
use std::time::Duration;

use agritrace_common::{SharedNotifier, SharedStore};
use agritrace_ews::{
    BatchReport, EwsOrchestrator, EwsResult, FetchLimiter, ForecastAdapter, ForecastSource,
    OpenMeteoSource, OpenWeatherSource, SharedFetchLimiter,
};
use agritrace_rates::{ProviderChain, RateCache, RateEngine, RefreshReport, SharedRateEngine};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{NodeConfig, WeatherProvider};
use crate::metrics::{Metrics, SharedMetrics};
use crate::state::NodeState;

/// How long `stop` waits for in-flight cycles.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// A running rate + early-warning node.
pub struct Node {
    config: NodeConfig,
    rates: SharedRateEngine,
    ews: Arc<EwsOrchestrator>,
    limiter: SharedFetchLimiter,
    metrics: SharedMetrics,
    state: Arc<RwLock<NodeState>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Node {
    /// Build the node with the live providers selected by `config`.
    pub fn new(config: NodeConfig, store: SharedStore, notifier: SharedNotifier) -> anyhow::Result<Self> {
        let chain = ProviderChain::with_defaults(config.rates.provider_timeout)?;

        let source: Arc<dyn ForecastSource> = match config.weather_provider {
            WeatherProvider::OpenMeteo => Arc::new(OpenMeteoSource::new(config.forecast.timeout)?),
            WeatherProvider::OpenWeather => {
                let api_key = config
                    .openweather_api_key
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("OPENWEATHER_API_KEY is not set"))?;
                Arc::new(OpenWeatherSource::new(api_key, config.forecast.timeout)?)
            }
        };

        Ok(Self::from_parts(config, chain, source, store, notifier))
    }

    /// Build the node around the given providers.
    pub fn from_parts(
        config: NodeConfig,
        chain: ProviderChain,
        source: Arc<dyn ForecastSource>,
        store: SharedStore,
        notifier: SharedNotifier,
    ) -> Self {
        let cache = Arc::new(RateCache::new());
        let rates = Arc::new(RateEngine::new(
            chain,
            cache,
            store.clone(),
            notifier,
            config.rates.clone(),
        ));

        let limiter = Arc::new(FetchLimiter::new(
            config.forecast.limit_window,
            config.forecast.max_requests,
        ));
        let adapter = Arc::new(ForecastAdapter::new(source, limiter.clone(), config.forecast.clone()));
        let ews = Arc::new(EwsOrchestrator::new(adapter, store, config.orchestrator.clone()));

        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config,
            rates,
            ews,
            limiter,
            metrics: Arc::new(Metrics::new()),
            state: Arc::new(RwLock::new(NodeState::Starting)),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn rates(&self) -> &SharedRateEngine {
        &self.rates
    }

    pub fn ews(&self) -> &Arc<EwsOrchestrator> {
        &self.ews
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    pub fn state(&self) -> NodeState {
        *self.state.read()
    }

    /// One rate refresh cycle plus cache maintenance.
    pub async fn refresh_rates(&self) -> RefreshReport {
        refresh_cycle(&self.rates, &self.metrics).await
    }

    /// One early-warning batch plus limiter maintenance.
    pub async fn run_ews(&self) -> EwsResult<BatchReport> {
        ews_cycle(&self.ews, &self.limiter, &self.metrics).await
    }

    /// Start the scheduled loops.
    #[instrument(skip(self))]
    pub fn start(&self) {
        *self.state.write() = NodeState::Running;

        let rates = self.rates.clone();
        let metrics = self.metrics.clone();
        let mut shutdown = self.shutdown_tx.subscribe();
        let period = self.config.rate_refresh_interval;
        let rate_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        refresh_cycle(&rates, &metrics).await;
                    }
                    _ = shutdown.changed() => break,
                }
            }
        });

        let ews = self.ews.clone();
        let limiter = self.limiter.clone();
        let metrics = self.metrics.clone();
        let mut shutdown = self.shutdown_tx.subscribe();
        let period = self.config.ews_interval;
        let ews_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = ews_cycle(&ews, &limiter, &metrics).await {
                            error!(error = %e, code = e.error_code(), "Early-warning batch failed");
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        });

        self.tasks.lock().extend([rate_task, ews_task]);

        info!(
            rate_interval_secs = self.config.rate_refresh_interval.as_secs(),
            ews_interval_secs = self.config.ews_interval.as_secs(),
            "Schedulers started"
        );
    }

    /// Signal the loops to stop and wait for in-flight cycles.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        *self.state.write() = NodeState::ShuttingDown;
        if self.shutdown_tx.send(true).is_err() {
            debug!("No scheduler loop was running");
        }

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        let drained = tokio::time::timeout(DRAIN_TIMEOUT, futures::future::join_all(tasks)).await;
        if drained.is_err() {
            warn!("Timed out waiting for scheduled cycles to finish");
        }

        *self.state.write() = NodeState::Stopped;

        let snapshot = self.metrics.snapshot();
        info!(metrics = ?snapshot, "Node stopped");
    }
}

async fn refresh_cycle(rates: &RateEngine, metrics: &Metrics) -> RefreshReport {
    let report = rates.fetch_rates().await;
    metrics.record_refresh(&report);
    info!(
        refreshed = report.refreshed(),
        fallbacks = report.fallbacks(),
        stale = report.stale(),
        failed = report.failed(),
        metrics = ?metrics.snapshot(),
        "Rate refresh cycle complete"
    );

    let pruned = rates.prune_cache();
    let stats = rates.cache_stats();
    info!(
        pruned,
        cached = stats.total_entries,
        fresh = stats.fresh_entries,
        stale = stats.stale_entries,
        "Rate cache maintenance"
    );
    report
}

async fn ews_cycle(
    ews: &EwsOrchestrator,
    limiter: &FetchLimiter,
    metrics: &Metrics,
) -> EwsResult<BatchReport> {
    let report = ews.run_batch().await?;
    metrics.record_batch(&report);
    limiter.prune(Utc::now());
    info!(
        farms = report.farms_processed(),
        failed = report.farms_failed(),
        alerts = report.alerts(),
        tracked_farms = limiter.tracked_farms(),
        metrics = ?metrics.snapshot(),
        "Early-warning cycle complete"
    );
    Ok(report)
}
