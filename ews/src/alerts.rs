//! Mapping risk findings to farm alerts.

use agritrace_common::{Alert, FarmId, RiskFinding};
use chrono::{DateTime, Utc};

/// Builds one unsent alert per finding, keeping finding order.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertGenerator;

impl AlertGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(&self, farm_id: &FarmId, findings: &[RiskFinding]) -> Vec<Alert> {
        self.generate_at(farm_id, findings, Utc::now())
    }

    pub fn generate_at(&self, farm_id: &FarmId, findings: &[RiskFinding], created_at: DateTime<Utc>) -> Vec<Alert> {
        findings
            .iter()
            .map(|finding| Alert::disease_risk(farm_id.clone(), finding.clone(), created_at))
            .collect()
    }
}
