//! Disease rule evaluation.
//!
//! A rule scores `matched / declared` over its declared conditions. Each
//! threshold condition matches when any single point satisfies it. The
//! `duration_days` condition matches when the largest count of points
//! satisfying one of the other declared thresholds reaches `duration_days`.

use agritrace_common::{DiseaseRule, ForecastPoint, RiskFinding, RuleConditions};
use tracing::debug;

use crate::config::HeuristicsConfig;
use crate::heuristics;

/// Rule findings at or below this confidence are dropped.
pub const MIN_CONFIDENCE: f64 = 0.3;

/// Strictly above [`MIN_CONFIDENCE`].
pub fn should_emit(confidence: f64) -> bool {
    confidence > MIN_CONFIDENCE
}

/// Single-point threshold predicates a rule declares.
fn predicates(conditions: &RuleConditions) -> Vec<Box<dyn Fn(&ForecastPoint) -> bool>> {
    let mut predicates: Vec<Box<dyn Fn(&ForecastPoint) -> bool>> = Vec::new();

    if let Some(min) = conditions.temp_min {
        predicates.push(Box::new(move |p| p.temperature >= min));
    }
    if let Some(max) = conditions.temp_max {
        predicates.push(Box::new(move |p| p.temperature <= max));
    }
    if let Some(min) = conditions.humidity_min {
        predicates.push(Box::new(move |p| p.humidity >= min));
    }
    if let Some(min) = conditions.precipitation_min {
        predicates.push(Box::new(move |p| p.precipitation >= min));
    }
    if let Some(max) = conditions.precipitation_max {
        predicates.push(Box::new(move |p| p.precipitation <= max));
    }
    if let Some(min) = conditions.wind_speed_min {
        predicates.push(Box::new(move |p| p.wind_speed >= min));
    }

    predicates
}

/// Confidence of one rule against a forecast.
/// `None` for a rule that declares no conditions.
pub fn score_rule(rule: &DiseaseRule, forecast: &[ForecastPoint]) -> Option<f64> {
    let total = rule.conditions.declared_count();
    if total == 0 {
        return None;
    }

    let predicates = predicates(&rule.conditions);
    let counts: Vec<usize> = predicates
        .iter()
        .map(|predicate| forecast.iter().filter(|p| predicate(p)).count())
        .collect();

    let mut matched = counts.iter().filter(|count| **count > 0).count();

    if let Some(days) = rule.conditions.duration_days {
        let longest = counts.iter().copied().max().unwrap_or(0);
        if longest >= days as usize {
            matched += 1;
        }
    }

    Some(matched as f64 / total as f64)
}

/// Evaluates the rule table and the fixed heuristics.
#[derive(Debug, Clone, Default)]
pub struct DiseaseRuleEvaluator {
    heuristics: HeuristicsConfig,
}

impl DiseaseRuleEvaluator {
    pub fn new(heuristics: HeuristicsConfig) -> Self {
        Self { heuristics }
    }

    /// Rule-table findings in rule order, followed by heuristic findings.
    pub fn evaluate(&self, rules: &[DiseaseRule], forecast: &[ForecastPoint]) -> Vec<RiskFinding> {
        let mut findings = self.evaluate_rules(rules, forecast);
        findings.extend(heuristics::evaluate(forecast, &self.heuristics));
        findings
    }

    pub fn evaluate_rules(&self, rules: &[DiseaseRule], forecast: &[ForecastPoint]) -> Vec<RiskFinding> {
        rules
            .iter()
            .filter_map(|rule| {
                let confidence = score_rule(rule, forecast)?;
                debug!(rule_id = %rule.id, disease = %rule.disease, confidence, "Scored disease rule");
                should_emit(confidence).then(|| RiskFinding::from_rule(rule, confidence))
            })
            .collect()
    }
}
