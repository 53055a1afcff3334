//! Row-store capability used by the rate engine and the early-warning system.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::{Alert, CurrencyPair, DiseaseRule, FarmId, FarmLocation, ForecastPoint, RateEntry, RiskFinding};

/// Persistence operations the core consumes.
#[async_trait]
pub trait Store: Send + Sync {
    /// Load all disease rules.
    async fn get_rules(&self) -> StoreResult<Vec<DiseaseRule>>;

    /// Insert or replace the current rate for the entry's pair.
    async fn upsert_rate(&self, entry: &RateEntry) -> StoreResult<()>;

    /// Append an entry to the rate history log.
    async fn append_rate_history(&self, entry: &RateEntry) -> StoreResult<()>;

    /// Record a fetched forecast for a farm.
    async fn insert_forecasts(
        &self,
        farm_id: &FarmId,
        points: &[ForecastPoint],
        provider: &str,
    ) -> StoreResult<()>;

    /// Record the findings of one evaluation run.
    async fn insert_risk_findings(&self, farm_id: &FarmId, findings: &[RiskFinding]) -> StoreResult<()>;

    /// Record newly generated alerts.
    async fn insert_alerts(&self, alerts: &[Alert]) -> StoreResult<()>;

    /// Farms that have coordinates on record.
    async fn get_farms_with_coordinates(&self) -> StoreResult<Vec<FarmLocation>>;
}

/// Shared store handle.
pub type SharedStore = Arc<dyn Store>;

/// A forecast point as recorded by `MemoryStore`.
#[derive(Debug, Clone)]
pub struct StoredForecast {
    pub farm_id: FarmId,
    pub provider: String,
    pub point: ForecastPoint,
}

#[derive(Debug, Default)]
struct MemoryState {
    rules: Vec<DiseaseRule>,
    farms: Vec<FarmLocation>,
    rates: HashMap<CurrencyPair, RateEntry>,
    rate_history: Vec<RateEntry>,
    forecasts: Vec<StoredForecast>,
    findings: Vec<(FarmId, RiskFinding)>,
    alerts: Vec<Alert>,
}

/// In-process store for tests and `--memory` runs.
///
/// Writes can be made to fail with [`MemoryStore::fail_writes`] to exercise
/// persistence-failure paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with rules and farms.
    pub fn with_data(rules: Vec<DiseaseRule>, farms: Vec<FarmLocation>) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.write();
            state.rules = rules;
            state.farms = farms;
        }
        store
    }

    /// Make every subsequent write fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn current_rate(&self, pair: &CurrencyPair) -> Option<RateEntry> {
        self.state.read().rates.get(pair).cloned()
    }

    pub fn rate_history(&self) -> Vec<RateEntry> {
        self.state.read().rate_history.clone()
    }

    pub fn forecasts(&self) -> Vec<StoredForecast> {
        self.state.read().forecasts.clone()
    }

    pub fn findings(&self) -> Vec<(FarmId, RiskFinding)> {
        self.state.read().findings.clone()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.state.read().alerts.clone()
    }

    fn check_writable(&self, operation: &str) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::persistence(operation, "writes disabled"));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_rules(&self) -> StoreResult<Vec<DiseaseRule>> {
        Ok(self.state.read().rules.clone())
    }

    async fn upsert_rate(&self, entry: &RateEntry) -> StoreResult<()> {
        self.check_writable("upsert_rate")?;
        self.state
            .write()
            .rates
            .insert(entry.pair.clone(), entry.clone());
        Ok(())
    }

    async fn append_rate_history(&self, entry: &RateEntry) -> StoreResult<()> {
        self.check_writable("append_rate_history")?;
        self.state.write().rate_history.push(entry.clone());
        Ok(())
    }

    async fn insert_forecasts(
        &self,
        farm_id: &FarmId,
        points: &[ForecastPoint],
        provider: &str,
    ) -> StoreResult<()> {
        self.check_writable("insert_forecasts")?;
        let mut state = self.state.write();
        state.forecasts.extend(points.iter().map(|point| StoredForecast {
            farm_id: farm_id.clone(),
            provider: provider.to_string(),
            point: point.clone(),
        }));
        Ok(())
    }

    async fn insert_risk_findings(&self, farm_id: &FarmId, findings: &[RiskFinding]) -> StoreResult<()> {
        self.check_writable("insert_risk_findings")?;
        let mut state = self.state.write();
        state
            .findings
            .extend(findings.iter().map(|f| (farm_id.clone(), f.clone())));
        Ok(())
    }

    async fn insert_alerts(&self, alerts: &[Alert]) -> StoreResult<()> {
        self.check_writable("insert_alerts")?;
        self.state.write().alerts.extend_from_slice(alerts);
        Ok(())
    }

    async fn get_farms_with_coordinates(&self) -> StoreResult<Vec<FarmLocation>> {
        Ok(self.state.read().farms.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Currency;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn entry(rate: rust_decimal::Decimal) -> RateEntry {
        RateEntry::new(
            CurrencyPair::new(Currency::usd(), Currency::kes()),
            rate,
            "TEST",
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_upsert_supersedes_and_history_appends() {
        let store = MemoryStore::new();
        store.upsert_rate(&entry(dec!(129.5))).await.unwrap();
        store.append_rate_history(&entry(dec!(129.5))).await.unwrap();
        store.upsert_rate(&entry(dec!(130.1))).await.unwrap();
        store.append_rate_history(&entry(dec!(130.1))).await.unwrap();

        let pair = CurrencyPair::new(Currency::usd(), Currency::kes());
        assert_eq!(store.current_rate(&pair).unwrap().rate, dec!(130.1));
        assert_eq!(store.rate_history().len(), 2);
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let store = MemoryStore::new();
        store.fail_writes(true);

        let err = store.upsert_rate(&entry(dec!(1))).await.unwrap_err();
        assert!(matches!(err, StoreError::PersistenceFailed { .. }));

        store.fail_writes(false);
        assert!(store.upsert_rate(&entry(dec!(1))).await.is_ok());
    }

    #[tokio::test]
    async fn test_seeded_farms() {
        let store = MemoryStore::with_data(vec![], vec![FarmLocation::new("farm-1", 1.0, 2.0)]);
        let farms = store.get_farms_with_coordinates().await.unwrap();
        assert_eq!(farms.len(), 1);
        assert!(store.get_rules().await.unwrap().is_empty());
    }
}
