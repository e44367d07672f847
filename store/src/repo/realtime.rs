use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_postgres::Row;

use crate::pool::Pool;

/// One realtime row: last-known payload plus the subscriber-service set.
/// Invariant maintained here: a row exists iff `subscribers` is non-empty.
#[derive(Debug, Clone)]
pub struct RealtimeRow {
    pub subscription_key: String,
    pub data_type: String,
    pub data: Value,
    pub event_time: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub subscribers: Vec<String>,
}

impl From<Row> for RealtimeRow {
    fn from(row: Row) -> Self {
        Self {
            subscription_key: row.get("subscription_key"),
            data_type: row.get("data_type"),
            data: row.get("data"),
            event_time: row.get("event_time"),
            updated_at: row.get("updated_at"),
            subscribers: row.get("subscribers"),
        }
    }
}

#[derive(Clone)]
pub struct RealtimeRepo {
    pool: Pool,
}

impl RealtimeRepo {
    #[must_use]
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Registers `subscriber` for a key, creating the row when absent.
    ///
    /// Re-registration is idempotent: the subscriber id is removed from the
    /// array and prepended again, so the set never grows duplicates. Returns
    /// true when a new row was inserted (`subscription.add` fired).
    pub async fn add_subscription(
        &self,
        subscription_key: &str,
        data_type: &str,
        subscriber: &str,
    ) -> anyhow::Result<bool> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                r#"
                INSERT INTO realtime_data (subscription_key, data_type, subscribers)
                VALUES ($1, $2, ARRAY[$3])
                ON CONFLICT (subscription_key)
                DO UPDATE SET
                    subscribers = ARRAY_PREPEND($3, ARRAY_REMOVE(realtime_data.subscribers, $3))
                RETURNING (xmax = 0) AS is_insert
                "#,
                &[&subscription_key, &data_type, &subscriber],
            )
            .await?;
        Ok(row.get::<_, bool>("is_insert"))
    }

    /// Removes `subscriber` from a key and deletes the row once nobody is
    /// left. Returns true when the row was deleted (`subscription.remove`
    /// fired).
    pub async fn remove_subscription(
        &self,
        subscription_key: &str,
        subscriber: &str,
    ) -> anyhow::Result<bool> {
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE realtime_data SET subscribers = ARRAY_REMOVE(subscribers, $2) \
                 WHERE subscription_key = $1",
                &[&subscription_key, &subscriber],
            )
            .await?;

        let deleted = client
            .execute(
                "DELETE FROM realtime_data \
                 WHERE subscription_key = $1 AND cardinality(subscribers) = 0",
                &[&subscription_key],
            )
            .await?;
        Ok(deleted > 0)
    }

    /// Startup cleanup: drops `subscriber` from every row and deletes the
    /// rows that end up with no subscribers. Returns the number of deleted
    /// rows.
    pub async fn remove_service_subscriptions(&self, subscriber: &str) -> anyhow::Result<u64> {
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE realtime_data SET subscribers = ARRAY_REMOVE(subscribers, $1) \
                 WHERE $1 = ANY(subscribers)",
                &[&subscriber],
            )
            .await?;
        let deleted = client
            .execute(
                "DELETE FROM realtime_data WHERE cardinality(subscribers) = 0",
                &[],
            )
            .await?;
        Ok(deleted)
    }

    /// Writes the live payload. Single-writer per key (the exchange adapter);
    /// fires `realtime.update` through the table trigger.
    pub async fn update_data(
        &self,
        subscription_key: &str,
        data: &Value,
        event_time: Option<DateTime<Utc>>,
    ) -> anyhow::Result<bool> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE realtime_data \
                 SET data = $1, event_time = COALESCE($2, NOW()), updated_at = NOW() \
                 WHERE subscription_key = $3",
                &[data, &event_time, &subscription_key],
            )
            .await?;
        Ok(updated > 0)
    }

    pub async fn get(&self, subscription_key: &str) -> anyhow::Result<Option<RealtimeRow>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT subscription_key, data_type, data, event_time, updated_at, subscribers \
                 FROM realtime_data WHERE subscription_key = $1",
                &[&subscription_key],
            )
            .await?;
        Ok(row.map(RealtimeRow::from))
    }

    /// All keys currently materialised — the multiplexer's wanted set during
    /// a full sync.
    pub async fn all_keys(&self) -> anyhow::Result<Vec<String>> {
        let client = self.pool.get().await?;
        let rows = client
            .query("SELECT subscription_key FROM realtime_data", &[])
            .await?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    pub async fn count(&self) -> anyhow::Result<i64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one("SELECT COUNT(*) FROM realtime_data", &[])
            .await?;
        Ok(row.get(0))
    }
}
