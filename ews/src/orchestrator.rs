//! Per-farm early-warning pipeline.
//!
//! Each farm runs fetch, persist forecast, evaluate, persist findings,
//! generate and persist alerts, strictly in that order. Farms run
//! independently with bounded concurrency; one failing farm never stops
//! the batch.

use std::sync::Arc;

use agritrace_common::{Alert, DiseaseRule, FarmId, FarmLocation, RiskFinding, SharedStore, StoreError};
use futures::stream::{self, StreamExt};
use tracing::{error, info, instrument, warn};

use crate::alerts::AlertGenerator;
use crate::config::OrchestratorConfig;
use crate::error::{EwsError, EwsResult};
use crate::forecast::ForecastAdapter;
use crate::rules::DiseaseRuleEvaluator;

/// What one farm's pipeline produced.
#[derive(Debug, Clone)]
pub struct FarmOutcome {
    pub farm_id: FarmId,
    pub forecast_points: usize,
    pub findings: Vec<RiskFinding>,
    pub alerts: Vec<Alert>,
    /// Writes that failed; the findings and alerts above are still valid.
    pub persistence_failures: usize,
}

/// Summary of a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub succeeded: Vec<FarmOutcome>,
    pub failed: Vec<(FarmId, EwsError)>,
}

impl BatchReport {
    pub fn farms_processed(&self) -> usize {
        self.succeeded.len()
    }

    pub fn farms_failed(&self) -> usize {
        self.failed.len()
    }

    pub fn findings(&self) -> usize {
        self.succeeded.iter().map(|o| o.findings.len()).sum()
    }

    pub fn alerts(&self) -> usize {
        self.succeeded.iter().map(|o| o.alerts.len()).sum()
    }

    pub fn persistence_failures(&self) -> usize {
        self.succeeded.iter().map(|o| o.persistence_failures).sum()
    }
}

/// Early-warning orchestrator.
pub struct EwsOrchestrator {
    adapter: Arc<ForecastAdapter>,
    evaluator: DiseaseRuleEvaluator,
    alerts: AlertGenerator,
    store: SharedStore,
    config: OrchestratorConfig,
}

impl EwsOrchestrator {
    pub fn new(adapter: Arc<ForecastAdapter>, store: SharedStore, config: OrchestratorConfig) -> Self {
        Self {
            adapter,
            evaluator: DiseaseRuleEvaluator::new(config.heuristics.clone()),
            alerts: AlertGenerator::new(),
            store,
            config,
        }
    }

    /// Run the pipeline for every farm with coordinates.
    #[instrument(skip(self))]
    pub async fn run_batch(&self) -> EwsResult<BatchReport> {
        let farms = self.store.get_farms_with_coordinates().await?;
        let rules = self.load_rules().await;

        info!(farms = farms.len(), rules = rules.len(), "Starting early-warning batch");

        let results: Vec<(FarmId, EwsResult<FarmOutcome>)> = stream::iter(farms)
            .map(|farm| {
                let rules = &rules;
                async move {
                    let result = self.process_farm(&farm, rules).await;
                    (farm.id, result)
                }
            })
            .buffer_unordered(self.config.max_concurrent_farms.max(1))
            .collect()
            .await;

        let mut report = BatchReport::default();
        for (farm_id, result) in results {
            match result {
                Ok(outcome) => report.succeeded.push(outcome),
                Err(e) => {
                    error!(farm_id = %farm_id, error = %e, code = e.error_code(), "Farm pipeline failed");
                    report.failed.push((farm_id, e));
                }
            }
        }

        info!(
            processed = report.farms_processed(),
            failed = report.farms_failed(),
            findings = report.findings(),
            alerts = report.alerts(),
            persistence_failures = report.persistence_failures(),
            "Early-warning batch complete"
        );

        Ok(report)
    }

    /// Run the pipeline for one farm by id.
    pub async fn run_farm(&self, farm_id: &FarmId) -> EwsResult<FarmOutcome> {
        let farm = self
            .store
            .get_farms_with_coordinates()
            .await?
            .into_iter()
            .find(|farm| &farm.id == farm_id)
            .ok_or_else(|| EwsError::UnknownFarm(farm_id.clone()))?;
        let rules = self.load_rules().await;

        self.process_farm(&farm, &rules).await
    }

    /// Run the pipeline for one farm against a loaded rule table.
    #[instrument(skip(self, farm, rules), fields(farm_id = %farm.id))]
    pub async fn process_farm(&self, farm: &FarmLocation, rules: &[DiseaseRule]) -> EwsResult<FarmOutcome> {
        let coords = farm.coordinates();
        if !coords.is_valid() {
            return Err(EwsError::InvalidCoordinates {
                farm_id: farm.id.clone(),
                lat: farm.lat,
                lon: farm.lon,
            });
        }

        let points = self.adapter.fetch_forecast(&farm.id, coords).await?;
        let mut persistence_failures = 0;

        if let Err(e) = self
            .store
            .insert_forecasts(&farm.id, &points, self.adapter.provider())
            .await
        {
            persistence_failures += log_persistence_failure(&farm.id, "forecasts", &e);
        }

        let findings = self.evaluator.evaluate(rules, &points);
        if !findings.is_empty() {
            if let Err(e) = self.store.insert_risk_findings(&farm.id, &findings).await {
                persistence_failures += log_persistence_failure(&farm.id, "risk findings", &e);
            }
        }

        let alerts = self.alerts.generate(&farm.id, &findings);
        if !alerts.is_empty() {
            if let Err(e) = self.store.insert_alerts(&alerts).await {
                persistence_failures += log_persistence_failure(&farm.id, "alerts", &e);
            }
        }

        info!(
            points = points.len(),
            findings = findings.len(),
            alerts = alerts.len(),
            "Farm evaluated"
        );

        Ok(FarmOutcome {
            farm_id: farm.id.clone(),
            forecast_points: points.len(),
            findings,
            alerts,
            persistence_failures,
        })
    }

    /// Rule table for this run. The heuristics still run if it cannot be read.
    async fn load_rules(&self) -> Vec<DiseaseRule> {
        match self.store.get_rules().await {
            Ok(rules) => rules,
            Err(e) => {
                warn!(error = %e, "Failed to load disease rules, running heuristics only");
                Vec::new()
            }
        }
    }
}

fn log_persistence_failure(farm_id: &FarmId, what: &str, e: &StoreError) -> usize {
    warn!(farm_id = %farm_id, error = %e, code = e.error_code(), "Failed to persist {}", what);
    1
}
