use anyhow::Context;
use deadpool_postgres::{Manager, ManagerConfig, RecyclingMethod};
use tokio_postgres::NoTls;

use crate::config::StoreConfig;

pub type Pool = deadpool_postgres::Pool;

/// Builds the shared connection pool. The notify listener does NOT use this
/// pool; it owns its own connection (see [`crate::listener`]).
pub fn build_pool(config: &StoreConfig) -> anyhow::Result<Pool> {
    let pg_config: tokio_postgres::Config = config
        .dsn
        .parse()
        .context("Failed to parse database dsn")?;

    let manager = Manager::from_config(
        pg_config,
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );

    Pool::builder(manager)
        .max_size(config.pool_max_size)
        .build()
        .context("Failed to build connection pool")
}

/// Publishes a notification by hand. Application code needs this for exactly
/// one event: the gateway's startup `subscription.clean` broadcast. Every
/// other channel is emitted by the table triggers.
pub async fn publish(pool: &Pool, channel: engine::Channel, payload: &str) -> anyhow::Result<()> {
    let client = pool.get().await?;
    client
        .execute("SELECT pg_notify($1, $2)", &[&channel.to_string(), &payload])
        .await?;
    Ok(())
}
