use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::pool::Pool;

#[derive(Debug, Clone)]
pub struct AccountInfoRow {
    pub account_type: String,
    pub data: Value,
    pub update_time: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

/// Latest account snapshot per account type (SPOT / FUTURES). The adapter
/// writes it; the gateway re-queries it when an account task completes.
#[derive(Clone)]
pub struct AccountRepo {
    pool: Pool,
}

impl AccountRepo {
    #[must_use]
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn save(
        &self,
        account_type: &str,
        data: &Value,
        update_time: Option<i64>,
    ) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO account_info (account_type, data, update_time, updated_at) \
                 VALUES ($1, $2, $3, NOW()) \
                 ON CONFLICT (account_type) DO UPDATE SET \
                     data = EXCLUDED.data, \
                     update_time = EXCLUDED.update_time, \
                     updated_at = NOW()",
                &[&account_type, data, &update_time],
            )
            .await?;
        Ok(())
    }

    pub async fn get(&self, account_type: &str) -> anyhow::Result<Option<AccountInfoRow>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT account_type, data, update_time, updated_at \
                 FROM account_info WHERE account_type = $1",
                &[&account_type],
            )
            .await?;
        Ok(row.map(|row| AccountInfoRow {
            account_type: row.get("account_type"),
            data: row.get("data"),
            update_time: row.get("update_time"),
            updated_at: row.get("updated_at"),
        }))
    }
}
