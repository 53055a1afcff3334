//! Disease rules, risk findings and alert records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{AlertId, FarmId, RuleId};

/// Threshold predicates a disease rule may declare.
///
/// Every field is optional; only declared fields count towards a rule's
/// confidence denominator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleConditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precipitation_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precipitation_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_speed_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_days: Option<u32>,
}

impl RuleConditions {
    /// Number of declared conditions, `duration_days` included.
    pub fn declared_count(&self) -> usize {
        [
            self.temp_min.is_some(),
            self.temp_max.is_some(),
            self.humidity_min.is_some(),
            self.precipitation_min.is_some(),
            self.precipitation_max.is_some(),
            self.wind_speed_min.is_some(),
            self.duration_days.is_some(),
        ]
        .iter()
        .filter(|declared| **declared)
        .count()
    }

    pub fn is_empty(&self) -> bool {
        self.declared_count() == 0
    }
}

/// A declarative disease rule. Read-only configuration owned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiseaseRule {
    pub id: RuleId,
    pub disease: String,
    pub conditions: RuleConditions,
    pub recommended_actions: String,
}

impl DiseaseRule {
    pub fn new(
        id: impl Into<RuleId>,
        disease: impl Into<String>,
        conditions: RuleConditions,
        recommended_actions: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            disease: disease.into(),
            conditions,
            recommended_actions: recommended_actions.into(),
        }
    }
}

/// A confidence-scored risk produced by one evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFinding {
    pub disease: String,
    /// In `[0, 1]`.
    pub confidence_score: f64,
    pub recommended_actions: String,
    /// Rule that produced the finding; `None` for the fixed heuristics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<RuleId>,
}

impl RiskFinding {
    pub fn new(
        disease: impl Into<String>,
        confidence_score: f64,
        recommended_actions: impl Into<String>,
    ) -> Self {
        Self {
            disease: disease.into(),
            confidence_score,
            recommended_actions: recommended_actions.into(),
            rule_id: None,
        }
    }

    pub fn from_rule(rule: &DiseaseRule, confidence_score: f64) -> Self {
        Self {
            disease: rule.disease.clone(),
            confidence_score,
            recommended_actions: rule.recommended_actions.clone(),
            rule_id: Some(rule.id.clone()),
        }
    }
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Classify a confidence score. Both thresholds are strict.
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence > 0.7 {
            Severity::High
        } else if confidence > 0.4 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    DiseaseRisk,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::DiseaseRisk => "DISEASE_RISK",
        }
    }
}

/// An alert raised for a farm.
///
/// Created unsent; a separate dispatch process flips `sent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub farm_id: FarmId,
    pub severity: Severity,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub message: String,
    /// Snapshot of the finding that raised the alert.
    pub payload: RiskFinding,
    pub sent: bool,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    /// Build an unsent disease-risk alert for a finding.
    pub fn disease_risk(farm_id: FarmId, finding: RiskFinding, created_at: DateTime<Utc>) -> Self {
        let severity = Severity::from_confidence(finding.confidence_score);
        let message = format!(
            "{} risk detected ({:.0}% confidence). {}",
            finding.disease,
            finding.confidence_score * 100.0,
            finding.recommended_actions
        );
        Self {
            id: AlertId::new(),
            farm_id,
            severity,
            alert_type: AlertType::DiseaseRisk,
            message,
            payload: finding,
            sent: false,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_boundaries() {
        assert_eq!(Severity::from_confidence(0.70), Severity::Medium);
        assert_eq!(Severity::from_confidence(0.71), Severity::High);
        assert_eq!(Severity::from_confidence(0.40), Severity::Low);
        assert_eq!(Severity::from_confidence(0.41), Severity::Medium);
        assert_eq!(Severity::from_confidence(0.0), Severity::Low);
        assert_eq!(Severity::from_confidence(1.0), Severity::High);
    }

    #[test]
    fn test_declared_count() {
        assert_eq!(RuleConditions::default().declared_count(), 0);
        assert!(RuleConditions::default().is_empty());

        let conditions = RuleConditions {
            temp_min: Some(30.0),
            humidity_min: Some(70.0),
            duration_days: Some(3),
            ..Default::default()
        };
        assert_eq!(conditions.declared_count(), 3);
    }

    #[test]
    fn test_conditions_deserialize_from_sparse_json() {
        let conditions: RuleConditions =
            serde_json::from_str(r#"{"temp_min": 25, "duration_days": 2}"#).unwrap();
        assert_eq!(conditions.temp_min, Some(25.0));
        assert_eq!(conditions.duration_days, Some(2));
        assert_eq!(conditions.declared_count(), 2);
    }

    #[test]
    fn test_alert_starts_unsent() {
        let finding = RiskFinding::new("FloodRisk", 0.5, "Move herd to higher ground");
        let alert = Alert::disease_risk(FarmId::new("farm-1"), finding, Utc::now());

        assert!(!alert.sent);
        assert_eq!(alert.severity, Severity::Medium);
        assert_eq!(alert.alert_type.as_str(), "DISEASE_RISK");
        assert!(alert.message.starts_with("FloodRisk risk detected (50% confidence)"));

        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["type"], "DISEASE_RISK");
        assert_eq!(json["severity"], "MEDIUM");
    }
}
