use anyhow::Context;

use crate::pool::Pool;

const INIT: &str = include_str!("../migrations/0001_init.sql");

/// Applies the embedded schema. Idempotent: every statement is
/// `IF NOT EXISTS` / `CREATE OR REPLACE`, so services can race on startup.
pub async fn run(pool: &Pool) -> anyhow::Result<()> {
    let client = pool.get().await?;
    client
        .batch_execute(INIT)
        .await
        .context("Failed to apply schema migrations")?;
    tracing::info!("Schema migrations applied");
    Ok(())
}
