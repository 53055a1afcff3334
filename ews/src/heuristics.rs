//! Fixed weather heuristics, independent of the rule table.

use agritrace_common::{ForecastPoint, RiskFinding};

use crate::config::HeuristicsConfig;

/// Precipitation (mm) below which a point counts as dry.
const DRY_POINT_MM: f64 = 1.0;
/// Points averaged by the fungal check.
const FUNGAL_WINDOW: usize = 3;
const FUNGAL_HUMIDITY_MIN: f64 = 80.0;
const FUNGAL_TEMP_RANGE: (f64, f64) = (15.0, 25.0);

/// The fixed heuristics, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heuristic {
    HeatStress,
    FloodRisk,
    DroughtRisk,
    FungalDisease,
}

impl Heuristic {
    pub const ALL: [Heuristic; 4] = [
        Heuristic::HeatStress,
        Heuristic::FloodRisk,
        Heuristic::DroughtRisk,
        Heuristic::FungalDisease,
    ];

    pub fn disease(&self) -> &'static str {
        match self {
            Heuristic::HeatStress => "HeatStress",
            Heuristic::FloodRisk => "FloodRisk",
            Heuristic::DroughtRisk => "DroughtRisk",
            Heuristic::FungalDisease => "FungalDisease",
        }
    }

    pub fn recommended_actions(&self) -> &'static str {
        match self {
            Heuristic::HeatStress => {
                "Provide shade and clean water; avoid moving animals in the midday heat."
            }
            Heuristic::FloodRisk => "Move livestock and feed stores to higher ground.",
            Heuristic::DroughtRisk => "Ration water and arrange supplementary feed.",
            Heuristic::FungalDisease => {
                "Keep bedding dry and inspect hooves and skin; consult a veterinarian on preventive treatment."
            }
        }
    }

    /// Confidence for this heuristic, or `None` when it does not fire.
    pub fn score(&self, forecast: &[ForecastPoint], config: &HeuristicsConfig) -> Option<f64> {
        match self {
            Heuristic::HeatStress => {
                let hot = forecast
                    .iter()
                    .filter(|p| p.temperature > config.heat_stress_temp_c)
                    .count();
                (hot > 2).then(|| (hot as f64 / 7.0).min(0.9))
            }
            Heuristic::FloodRisk => {
                let windy = forecast
                    .iter()
                    .filter(|p| p.wind_speed > config.flood_wind_speed)
                    .count();
                (windy > 1).then(|| (windy as f64 / 7.0).min(0.8))
            }
            Heuristic::DroughtRisk => {
                let dry = forecast
                    .iter()
                    .filter(|p| p.precipitation < DRY_POINT_MM)
                    .count();
                (dry >= config.dry_spell_days).then(|| (dry as f64 / 14.0).min(0.7))
            }
            Heuristic::FungalDisease => forecast.windows(FUNGAL_WINDOW).find_map(|window| {
                let n = window.len() as f64;
                let humidity = window.iter().map(|p| p.humidity).sum::<f64>() / n;
                let temperature = window.iter().map(|p| p.temperature).sum::<f64>() / n;
                let (low, high) = FUNGAL_TEMP_RANGE;
                (humidity > FUNGAL_HUMIDITY_MIN && (low..=high).contains(&temperature))
                    .then(|| (humidity / 100.0).min(0.9))
            }),
        }
    }

    fn finding(&self, confidence: f64) -> RiskFinding {
        RiskFinding::new(self.disease(), confidence, self.recommended_actions())
    }
}

/// Run every heuristic; findings come out in [`Heuristic::ALL`] order.
pub fn evaluate(forecast: &[ForecastPoint], config: &HeuristicsConfig) -> Vec<RiskFinding> {
    Heuristic::ALL
        .iter()
        .filter_map(|h| h.score(forecast, config).map(|confidence| h.finding(confidence)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    /// Points with the given temperatures, humidities, winds and precipitation.
    fn series(temps: &[f64], humidity: &[f64], wind: &[f64], precip: &[f64]) -> Vec<ForecastPoint> {
        let start = Utc::now();
        (0..temps.len())
            .map(|i| {
                ForecastPoint::new(
                    start + Duration::days(i as i64),
                    temps[i],
                    precip[i],
                    wind[i],
                    humidity[i],
                )
            })
            .collect()
    }

    fn config() -> HeuristicsConfig {
        HeuristicsConfig::default()
    }

    #[test]
    fn test_fungal_disease() {
        let forecast = series(&[18.0, 20.0, 22.0], &[85.0, 82.0, 90.0], &[3.0; 3], &[5.0; 3]);

        let findings = evaluate(&forecast, &config());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].disease, "FungalDisease");
        assert!((findings[0].confidence_score - 0.8567).abs() < 1e-3);
        assert!(findings[0].rule_id.is_none());
    }

    #[test]
    fn test_fungal_needs_temperature_in_range() {
        let forecast = series(&[26.0, 27.0, 28.0], &[85.0, 82.0, 90.0], &[3.0; 3], &[5.0; 3]);
        assert_eq!(Heuristic::FungalDisease.score(&forecast, &config()), None);

        let short = series(&[20.0, 20.0], &[90.0, 90.0], &[3.0; 2], &[5.0; 2]);
        assert_eq!(Heuristic::FungalDisease.score(&short, &config()), None);
    }

    #[test]
    fn test_flood_risk_needs_two_windy_points() {
        let forecast = series(&[20.0; 3], &[60.0; 3], &[25.0, 22.0, 18.0], &[5.0; 3]);
        let score = Heuristic::FloodRisk.score(&forecast, &config()).unwrap();
        assert!((score - 2.0 / 7.0).abs() < 1e-9);

        let calm = series(&[20.0; 3], &[60.0; 3], &[25.0, 20.0, 18.0], &[5.0; 3]);
        assert_eq!(Heuristic::FloodRisk.score(&calm, &config()), None);
    }

    #[test]
    fn test_heat_stress_capped() {
        let forecast = series(&[38.0; 8], &[30.0; 8], &[2.0; 8], &[5.0; 8]);
        assert_eq!(Heuristic::HeatStress.score(&forecast, &config()), Some(0.9));

        let two_hot = series(&[36.0, 37.0, 30.0], &[30.0; 3], &[2.0; 3], &[5.0; 3]);
        assert_eq!(Heuristic::HeatStress.score(&two_hot, &config()), None);
    }

    #[test]
    fn test_drought_uses_configured_dry_spell() {
        let forecast = series(&[25.0; 8], &[40.0; 8], &[2.0; 8], &[0.0; 8]);
        let score = Heuristic::DroughtRisk.score(&forecast, &config()).unwrap();
        assert!((score - 8.0 / 14.0).abs() < 1e-9);

        let strict = HeuristicsConfig {
            dry_spell_days: 9,
            ..config()
        };
        assert_eq!(Heuristic::DroughtRisk.score(&forecast, &strict), None);
    }

    #[test]
    fn test_evaluation_order() {
        let forecast = series(
            &[36.0, 37.0, 38.0, 36.0, 37.0, 38.0, 36.0],
            &[20.0; 7],
            &[21.0, 22.0, 2.0, 2.0, 2.0, 2.0, 2.0],
            &[0.0; 7],
        );

        let diseases: Vec<_> = evaluate(&forecast, &config())
            .into_iter()
            .map(|f| f.disease)
            .collect();
        assert_eq!(diseases, vec!["HeatStress", "FloodRisk", "DroughtRisk"]);
    }
}
