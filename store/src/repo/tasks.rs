use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_postgres::Row;

use crate::pool::Pool;

#[derive(Debug, Clone)]
pub struct TaskRow {
    pub id: i64,
    pub task_type: String,
    pub payload: Value,
    pub result: Option<Value>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Row> for TaskRow {
    fn from(row: Row) -> Self {
        Self {
            id: row.get("id"),
            task_type: row.get("type"),
            payload: row.get("payload"),
            result: row.get("result"),
            status: row.get("status"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

/// Work queue over the tasks table. Inserts fire `task.new`; terminal status
/// transitions fire `task.completed` / `task.failed` via the table trigger.
#[derive(Clone)]
pub struct TasksRepo {
    pool: Pool,
}

impl TasksRepo {
    #[must_use]
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Enqueues a task and returns its id.
    pub async fn create(&self, task_type: &str, payload: &Value) -> anyhow::Result<i64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "INSERT INTO tasks (type, payload) VALUES ($1, $2) RETURNING id",
                &[&task_type, payload],
            )
            .await?;
        Ok(row.get(0))
    }

    /// Claims a pending task for processing. Returns false when another
    /// worker (or a duplicate delivery) got there first.
    pub async fn claim(&self, task_id: i64) -> anyhow::Result<bool> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE tasks SET status = 'processing', updated_at = NOW() \
                 WHERE id = $1 AND status = 'pending'",
                &[&task_id],
            )
            .await?;
        Ok(updated > 0)
    }

    /// Completes a task. `result` stays NULL for bulk task types whose output
    /// lives in a side table (history k-lines, account snapshots).
    pub async fn complete(&self, task_id: i64, result: Option<&Value>) -> anyhow::Result<bool> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE tasks SET result = $1, status = 'completed', updated_at = NOW() \
                 WHERE id = $2",
                &[&result, &task_id],
            )
            .await?;
        Ok(updated > 0)
    }

    /// Fails a task, recording the error string in the result column so the
    /// gateway can relay it to the client.
    pub async fn fail(&self, task_id: i64, error: &str) -> anyhow::Result<bool> {
        let client = self.pool.get().await?;
        let result = Value::String(error.to_owned());
        let updated = client
            .execute(
                "UPDATE tasks SET result = $1, status = 'failed', updated_at = NOW() \
                 WHERE id = $2",
                &[&result, &task_id],
            )
            .await?;
        Ok(updated > 0)
    }

    pub async fn get(&self, task_id: i64) -> anyhow::Result<Option<TaskRow>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT id, type, payload, result, status, created_at, updated_at \
                 FROM tasks WHERE id = $1",
                &[&task_id],
            )
            .await?;
        Ok(row.map(TaskRow::from))
    }

    pub async fn status(&self, task_id: i64) -> anyhow::Result<Option<String>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt("SELECT status FROM tasks WHERE id = $1", &[&task_id])
            .await?;
        Ok(row.map(|r| r.get(0)))
    }

    pub async fn pending_count(&self) -> anyhow::Result<i64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one("SELECT COUNT(*) FROM tasks WHERE status = 'pending'", &[])
            .await?;
        Ok(row.get(0))
    }

    /// Drops terminal tasks older than `days`.
    pub async fn cleanup_old(&self, days: i32) -> anyhow::Result<u64> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute(
                "DELETE FROM tasks \
                 WHERE status IN ('completed', 'failed') \
                   AND created_at < NOW() - make_interval(days => $1)",
                &[&days],
            )
            .await?;
        Ok(deleted)
    }
}
