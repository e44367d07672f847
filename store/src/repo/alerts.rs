use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_postgres::Row;

use crate::pool::Pool;

/// One user-defined alert. Inserts, updates and deletes fire the
/// `alert_config.*` channels via the table trigger; the signal worker
/// observes those to hot-reload its state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    pub id: String,
    pub name: String,
    pub strategy_type: String,
    pub symbol: String,
    pub interval: String,
    pub trigger_type: String,
    #[serde(default)]
    pub params: Value,
    pub is_enabled: bool,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<Row> for AlertConfig {
    fn from(row: Row) -> Self {
        Self {
            id: row.get("id"),
            name: row.get("name"),
            strategy_type: row.get("strategy_type"),
            symbol: row.get("symbol"),
            interval: row.get("interval"),
            trigger_type: row.get("trigger_type"),
            params: row.get("params"),
            is_enabled: row.get("is_enabled"),
            created_by: row.get("created_by"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

/// Partial update; `None` fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertConfigPatch {
    pub name: Option<String>,
    pub strategy_type: Option<String>,
    pub symbol: Option<String>,
    pub interval: Option<String>,
    pub trigger_type: Option<String>,
    pub params: Option<Value>,
    pub is_enabled: Option<bool>,
}

const SELECT_COLUMNS: &str = "id, name, strategy_type, symbol, interval, trigger_type, \
                              params, is_enabled, created_by, created_at, updated_at";

#[derive(Clone)]
pub struct AlertsRepo {
    pool: Pool,
}

impl AlertsRepo {
    #[must_use]
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, config: &AlertConfig) -> anyhow::Result<AlertConfig> {
        let client = self.pool.get().await?;
        let params = if config.params.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            config.params.clone()
        };
        let row = client
            .query_one(
                &format!(
                    "INSERT INTO alert_configs \
                     (id, name, strategy_type, symbol, interval, trigger_type, params, is_enabled, created_by) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
                     RETURNING {SELECT_COLUMNS}"
                ),
                &[
                    &config.id,
                    &config.name,
                    &config.strategy_type,
                    &config.symbol,
                    &config.interval,
                    &config.trigger_type,
                    &params,
                    &config.is_enabled,
                    &config.created_by,
                ],
            )
            .await?;
        Ok(AlertConfig::from(row))
    }

    pub async fn update(
        &self,
        id: &str,
        patch: &AlertConfigPatch,
    ) -> anyhow::Result<Option<AlertConfig>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    "UPDATE alert_configs SET \
                         name = COALESCE($2, name), \
                         strategy_type = COALESCE($3, strategy_type), \
                         symbol = COALESCE($4, symbol), \
                         interval = COALESCE($5, interval), \
                         trigger_type = COALESCE($6, trigger_type), \
                         params = COALESCE($7, params), \
                         is_enabled = COALESCE($8, is_enabled), \
                         updated_at = NOW() \
                     WHERE id = $1 \
                     RETURNING {SELECT_COLUMNS}"
                ),
                &[
                    &id,
                    &patch.name,
                    &patch.strategy_type,
                    &patch.symbol,
                    &patch.interval,
                    &patch.trigger_type,
                    &patch.params,
                    &patch.is_enabled,
                ],
            )
            .await?;
        Ok(row.map(AlertConfig::from))
    }

    pub async fn set_enabled(&self, id: &str, enabled: bool) -> anyhow::Result<Option<AlertConfig>> {
        self.update(
            id,
            &AlertConfigPatch {
                is_enabled: Some(enabled),
                ..AlertConfigPatch::default()
            },
        )
        .await
    }

    pub async fn delete(&self, id: &str) -> anyhow::Result<bool> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute("DELETE FROM alert_configs WHERE id = $1", &[&id])
            .await?;
        Ok(deleted > 0)
    }

    pub async fn find_by_id(&self, id: &str) -> anyhow::Result<Option<AlertConfig>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {SELECT_COLUMNS} FROM alert_configs WHERE id = $1"),
                &[&id],
            )
            .await?;
        Ok(row.map(AlertConfig::from))
    }

    pub async fn list(&self, enabled_only: bool) -> anyhow::Result<Vec<AlertConfig>> {
        let client = self.pool.get().await?;
        let query = if enabled_only {
            format!(
                "SELECT {SELECT_COLUMNS} FROM alert_configs WHERE is_enabled ORDER BY created_at"
            )
        } else {
            format!("SELECT {SELECT_COLUMNS} FROM alert_configs ORDER BY created_at")
        };
        let rows = client.query(&query, &[]).await?;
        Ok(rows.into_iter().map(AlertConfig::from).collect())
    }
}
