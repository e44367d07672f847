use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio_postgres::Row;

use crate::pool::Pool;

/// Input for one signal insert. Only non-null evaluations reach this type;
/// "no signal" rows are never persisted.
#[derive(Debug, Clone)]
pub struct SignalRecord {
    pub alert_id: String,
    pub strategy_type: String,
    pub symbol: String,
    pub interval: String,
    pub trigger_type: String,
    /// true = long, false = short.
    pub signal_value: bool,
    pub signal_reason: String,
    pub source_subscription_key: String,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignalRow {
    pub id: i64,
    pub alert_id: String,
    pub strategy_type: String,
    pub symbol: String,
    pub interval: String,
    pub trigger_type: String,
    pub signal_value: Option<bool>,
    pub signal_reason: String,
    pub computed_at: DateTime<Utc>,
    pub source_subscription_key: String,
    pub metadata: Value,
}

impl From<Row> for SignalRow {
    fn from(row: Row) -> Self {
        Self {
            id: row.get("id"),
            alert_id: row.get("alert_id"),
            strategy_type: row.get("strategy_type"),
            symbol: row.get("symbol"),
            interval: row.get("interval"),
            trigger_type: row.get("trigger_type"),
            signal_value: row.get("signal_value"),
            signal_reason: row.get("signal_reason"),
            computed_at: row.get("computed_at"),
            source_subscription_key: row.get("source_subscription_key"),
            metadata: row.get("metadata"),
        }
    }
}

const SELECT_COLUMNS: &str = "id, alert_id, strategy_type, symbol, interval, trigger_type, \
                              signal_value, signal_reason, computed_at, \
                              source_subscription_key, metadata";

/// Append-only signal log. Inserts fire `signal.new`.
#[derive(Clone)]
pub struct SignalsRepo {
    pool: Pool,
}

impl SignalsRepo {
    #[must_use]
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, record: &SignalRecord) -> anyhow::Result<i64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "INSERT INTO strategy_signals \
                 (alert_id, strategy_type, symbol, interval, trigger_type, \
                  signal_value, signal_reason, source_subscription_key, metadata) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
                 RETURNING id",
                &[
                    &record.alert_id,
                    &record.strategy_type,
                    &record.symbol,
                    &record.interval,
                    &record.trigger_type,
                    &record.signal_value,
                    &record.signal_reason,
                    &record.source_subscription_key,
                    &record.metadata,
                ],
            )
            .await?;
        Ok(row.get(0))
    }

    /// Recent signals, newest first, optionally scoped to one alert.
    pub async fn list(
        &self,
        alert_id: Option<&str>,
        limit: i64,
    ) -> anyhow::Result<Vec<SignalRow>> {
        let client = self.pool.get().await?;
        let rows = match alert_id {
            Some(alert_id) => {
                client
                    .query(
                        &format!(
                            "SELECT {SELECT_COLUMNS} FROM strategy_signals \
                             WHERE alert_id = $1 ORDER BY computed_at DESC LIMIT $2"
                        ),
                        &[&alert_id, &limit],
                    )
                    .await?
            }
            None => {
                client
                    .query(
                        &format!(
                            "SELECT {SELECT_COLUMNS} FROM strategy_signals \
                             ORDER BY computed_at DESC LIMIT $1"
                        ),
                        &[&limit],
                    )
                    .await?
            }
        };
        Ok(rows.into_iter().map(SignalRow::from).collect())
    }
}
