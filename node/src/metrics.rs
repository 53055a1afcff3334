//! Counters for the scheduled rate and early-warning cycles.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use agritrace_ews::BatchReport;
use agritrace_rates::RefreshReport;

/// Node metrics.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Completed rate refresh cycles.
    pub rate_cycles: AtomicU64,
    /// Pairs refreshed from a primary provider.
    pub rates_refreshed: AtomicU64,
    /// Pairs served from the fallback table.
    pub rate_fallbacks: AtomicU64,
    /// Pairs served from an expired cache slot.
    pub rate_stale: AtomicU64,
    /// Pairs with no rate at all.
    pub rate_failures: AtomicU64,
    pub volatility_alerts: AtomicU64,
    /// Failed writes across both services.
    pub persistence_failures: AtomicU64,
    /// Completed early-warning batches.
    pub ews_batches: AtomicU64,
    pub farms_processed: AtomicU64,
    pub farms_failed: AtomicU64,
    pub risk_findings: AtomicU64,
    pub alerts_generated: AtomicU64,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one rate refresh cycle.
    pub fn record_refresh(&self, report: &RefreshReport) {
        self.rate_cycles.fetch_add(1, Ordering::Relaxed);
        self.rates_refreshed
            .fetch_add(report.refreshed() as u64, Ordering::Relaxed);
        self.rate_fallbacks
            .fetch_add(report.fallbacks() as u64, Ordering::Relaxed);
        self.rate_stale.fetch_add(report.stale() as u64, Ordering::Relaxed);
        self.rate_failures
            .fetch_add(report.failed() as u64, Ordering::Relaxed);
        self.volatility_alerts
            .fetch_add(report.volatility_alerts() as u64, Ordering::Relaxed);
        self.persistence_failures
            .fetch_add(report.persistence_failures() as u64, Ordering::Relaxed);
    }

    /// Record one early-warning batch.
    pub fn record_batch(&self, report: &BatchReport) {
        self.ews_batches.fetch_add(1, Ordering::Relaxed);
        self.farms_processed
            .fetch_add(report.farms_processed() as u64, Ordering::Relaxed);
        self.farms_failed
            .fetch_add(report.farms_failed() as u64, Ordering::Relaxed);
        self.risk_findings
            .fetch_add(report.findings() as u64, Ordering::Relaxed);
        self.alerts_generated
            .fetch_add(report.alerts() as u64, Ordering::Relaxed);
        self.persistence_failures
            .fetch_add(report.persistence_failures() as u64, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rate_cycles: self.rate_cycles.load(Ordering::Relaxed),
            rates_refreshed: self.rates_refreshed.load(Ordering::Relaxed),
            rate_fallbacks: self.rate_fallbacks.load(Ordering::Relaxed),
            rate_stale: self.rate_stale.load(Ordering::Relaxed),
            rate_failures: self.rate_failures.load(Ordering::Relaxed),
            volatility_alerts: self.volatility_alerts.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
            ews_batches: self.ews_batches.load(Ordering::Relaxed),
            farms_processed: self.farms_processed.load(Ordering::Relaxed),
            farms_failed: self.farms_failed.load(Ordering::Relaxed),
            risk_findings: self.risk_findings.load(Ordering::Relaxed),
            alerts_generated: self.alerts_generated.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub rate_cycles: u64,
    pub rates_refreshed: u64,
    pub rate_fallbacks: u64,
    pub rate_stale: u64,
    pub rate_failures: u64,
    pub volatility_alerts: u64,
    pub persistence_failures: u64,
    pub ews_batches: u64,
    pub farms_processed: u64,
    pub farms_failed: u64,
    pub risk_findings: u64,
    pub alerts_generated: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;
