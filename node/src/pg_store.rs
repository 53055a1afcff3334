//! Postgres-backed `Store`.

use std::time::Duration;

use agritrace_common::{
    Alert, DiseaseRule, FarmId, FarmLocation, ForecastPoint, RateEntry, RiskFinding, RuleConditions,
    RuleId, Store, StoreError, StoreResult,
};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Executor, FromRow};
use tracing::{debug, info, warn};

const SCHEMA: &str = include_str!("../migrations/0001_rates_and_ews.sql");

#[derive(Debug, FromRow)]
struct RuleRow {
    id: String,
    disease: String,
    conditions: serde_json::Value,
    recommended_actions: String,
}

impl TryFrom<RuleRow> for DiseaseRule {
    type Error = StoreError;

    fn try_from(row: RuleRow) -> Result<Self, Self::Error> {
        let conditions: RuleConditions = serde_json::from_value(row.conditions)
            .map_err(|e| StoreError::Decode(format!("rule {}: {e}", row.id)))?;

        Ok(DiseaseRule {
            id: RuleId::new(row.id),
            disease: row.disease,
            conditions,
            recommended_actions: row.recommended_actions,
        })
    }
}

#[derive(Debug, FromRow)]
struct FarmRow {
    id: String,
    lat: f64,
    lon: f64,
}

impl From<FarmRow> for FarmLocation {
    fn from(row: FarmRow) -> Self {
        FarmLocation::new(row.id, row.lat, row.lon)
    }
}

/// Store over a Postgres connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        info!(max_connections, "Connected to Postgres");
        Ok(Self { pool })
    }

    /// Create any missing tables and indexes.
    pub async fn migrate(&self) -> StoreResult<()> {
        (&self.pool)
            .execute(SCHEMA)
            .await
            .map_err(|e| StoreError::persistence("migrate", e))?;
        debug!("Schema up to date");
        Ok(())
    }

    async fn insert_rate(&self, operation: &str, sql: &str, entry: &RateEntry) -> StoreResult<()> {
        sqlx::query(sql)
            .bind(entry.pair.base.code())
            .bind(entry.pair.quote.code())
            .bind(entry.rate)
            .bind(&entry.source)
            .bind(entry.fetched_at)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::persistence(operation, e))?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_rules(&self) -> StoreResult<Vec<DiseaseRule>> {
        let rows: Vec<RuleRow> = sqlx::query_as(
            "SELECT id, disease, conditions, recommended_actions FROM disease_rules ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::persistence("get_rules", e))?;

        rows.into_iter()
            .map(DiseaseRule::try_from)
            .collect::<StoreResult<Vec<_>>>()
            .map_err(|e| {
                warn!(error = %e, "Disease rule table has an undecodable row");
                e
            })
    }

    async fn upsert_rate(&self, entry: &RateEntry) -> StoreResult<()> {
        self.insert_rate(
            "upsert_rate",
            "INSERT INTO exchange_rates (base_currency, quote_currency, rate, source, fetched_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (base_currency, quote_currency) \
             DO UPDATE SET rate = EXCLUDED.rate, source = EXCLUDED.source, fetched_at = EXCLUDED.fetched_at",
            entry,
        )
        .await
    }

    async fn append_rate_history(&self, entry: &RateEntry) -> StoreResult<()> {
        self.insert_rate(
            "append_rate_history",
            "INSERT INTO exchange_rate_history (base_currency, quote_currency, rate, source, fetched_at) \
             VALUES ($1, $2, $3, $4, $5)",
            entry,
        )
        .await
    }

    async fn insert_forecasts(
        &self,
        farm_id: &FarmId,
        points: &[ForecastPoint],
        provider: &str,
    ) -> StoreResult<()> {
        let failed = |e: sqlx::Error| StoreError::persistence("insert_forecasts", e);
        let mut tx = self.pool.begin().await.map_err(failed)?;

        for point in points {
            sqlx::query(
                "INSERT INTO weather_forecasts \
                 (farm_id, provider, forecast_at, temperature, precipitation, wind_speed, humidity) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(farm_id.as_str())
            .bind(provider)
            .bind(point.timestamp)
            .bind(point.temperature)
            .bind(point.precipitation)
            .bind(point.wind_speed)
            .bind(point.humidity)
            .execute(&mut *tx)
            .await
            .map_err(failed)?;
        }

        tx.commit().await.map_err(failed)
    }

    async fn insert_risk_findings(&self, farm_id: &FarmId, findings: &[RiskFinding]) -> StoreResult<()> {
        let failed = |e: sqlx::Error| StoreError::persistence("insert_risk_findings", e);
        let mut tx = self.pool.begin().await.map_err(failed)?;

        for finding in findings {
            sqlx::query(
                "INSERT INTO disease_risks (farm_id, disease, confidence_score, recommended_actions, rule_id) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(farm_id.as_str())
            .bind(&finding.disease)
            .bind(finding.confidence_score)
            .bind(&finding.recommended_actions)
            .bind(finding.rule_id.as_ref().map(|id| id.as_str()))
            .execute(&mut *tx)
            .await
            .map_err(failed)?;
        }

        tx.commit().await.map_err(failed)
    }

    async fn insert_alerts(&self, alerts: &[Alert]) -> StoreResult<()> {
        let failed = |e: sqlx::Error| StoreError::persistence("insert_alerts", e);
        let mut tx = self.pool.begin().await.map_err(failed)?;

        for alert in alerts {
            sqlx::query(
                "INSERT INTO ews_alerts (id, farm_id, severity, type, message, payload, sent, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(*alert.id.as_uuid())
            .bind(alert.farm_id.as_str())
            .bind(alert.severity.as_str())
            .bind(alert.alert_type.as_str())
            .bind(&alert.message)
            .bind(Json(&alert.payload))
            .bind(alert.sent)
            .bind(alert.created_at)
            .execute(&mut *tx)
            .await
            .map_err(failed)?;
        }

        tx.commit().await.map_err(failed)
    }

    async fn get_farms_with_coordinates(&self) -> StoreResult<Vec<FarmLocation>> {
        let rows: Vec<FarmRow> = sqlx::query_as(
            "SELECT id, lat, lon FROM farms WHERE lat IS NOT NULL AND lon IS NOT NULL ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::persistence("get_farms_with_coordinates", e))?;

        Ok(rows.into_iter().map(FarmLocation::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule_row(conditions: serde_json::Value) -> RuleRow {
        RuleRow {
            id: "rule-1".to_string(),
            disease: "Anthrax".to_string(),
            conditions,
            recommended_actions: "Vaccinate.".to_string(),
        }
    }

    #[test]
    fn test_rule_row_conversion() {
        let rule = DiseaseRule::try_from(rule_row(json!({ "temp_min": 30.0 }))).unwrap();
        assert_eq!(rule.id.as_str(), "rule-1");
        assert_eq!(rule.conditions.declared_count(), 1);
    }

    #[test]
    fn test_malformed_conditions_are_a_decode_error() {
        let err = DiseaseRule::try_from(rule_row(json!({ "temp_min": "hot" }))).unwrap_err();
        assert!(matches!(&err, StoreError::Decode(msg) if msg.starts_with("rule rule-1")));
        assert_eq!(err.error_code(), "DECODE_ERROR");
    }

    #[test]
    fn test_farm_row_conversion() {
        let farm = FarmLocation::from(FarmRow {
            id: "farm-1".to_string(),
            lat: -1.29,
            lon: 36.82,
        });
        assert_eq!(farm.id.as_str(), "farm-1");
        assert!(farm.coordinates().is_valid());
    }

    #[test]
    fn test_schema_declares_every_table() {
        for table in [
            "farms",
            "exchange_rates",
            "exchange_rate_history",
            "weather_forecasts",
            "disease_rules",
            "disease_risks",
            "ews_alerts",
        ] {
            assert!(
                SCHEMA.contains(&format!("CREATE TABLE IF NOT EXISTS {table} (")),
                "missing table {table}"
            );
        }
    }
}
