use serde::Serialize;
use tokio_postgres::Row;

use crate::pool::Pool;

/// One tradable symbol as known to the router's search/resolve handlers.
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeSymbol {
    pub exchange: String,
    pub symbol: String,
    pub market_type: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub status: String,
}

impl From<Row> for ExchangeSymbol {
    fn from(row: Row) -> Self {
        Self {
            exchange: row.get("exchange"),
            symbol: row.get("symbol"),
            market_type: row.get("market_type"),
            base_asset: row.get("base_asset"),
            quote_asset: row.get("quote_asset"),
            status: row.get("status"),
        }
    }
}

const SELECT_COLUMNS: &str = "exchange, symbol, market_type, base_asset, quote_asset, status";

/// Read-mostly symbol directory refreshed by the `system.fetch_exchange_info`
/// task.
#[derive(Clone)]
pub struct ExchangeInfoRepo {
    pool: Pool,
}

impl ExchangeInfoRepo {
    #[must_use]
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn upsert_symbols(&self, symbols: &[ExchangeSymbol]) -> anyhow::Result<u64> {
        if symbols.is_empty() {
            return Ok(0);
        }

        let client = self.pool.get().await?;
        let statement = client
            .prepare(
                "INSERT INTO exchange_info \
                 (exchange, symbol, market_type, base_asset, quote_asset, status, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, NOW()) \
                 ON CONFLICT (exchange, symbol, market_type) DO UPDATE SET \
                     base_asset = EXCLUDED.base_asset, \
                     quote_asset = EXCLUDED.quote_asset, \
                     status = EXCLUDED.status, \
                     updated_at = NOW()",
            )
            .await?;

        let mut written = 0;
        for s in symbols {
            written += client
                .execute(
                    &statement,
                    &[
                        &s.exchange,
                        &s.symbol,
                        &s.market_type,
                        &s.base_asset,
                        &s.quote_asset,
                        &s.status,
                    ],
                )
                .await?;
        }
        Ok(written)
    }

    /// Case-insensitive substring search over symbol and base asset.
    pub async fn search(
        &self,
        query: &str,
        exchange: &str,
        market_type: &str,
        limit: i64,
    ) -> anyhow::Result<Vec<ExchangeSymbol>> {
        let client = self.pool.get().await?;
        let pattern = format!("%{}%", query.to_uppercase());
        let rows = client
            .query(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM exchange_info \
                     WHERE exchange = $1 AND market_type = $2 \
                       AND (symbol LIKE $3 OR base_asset LIKE $3) \
                     ORDER BY symbol ASC LIMIT $4"
                ),
                &[&exchange, &market_type, &pattern, &limit],
            )
            .await?;
        Ok(rows.into_iter().map(ExchangeSymbol::from).collect())
    }

    pub async fn count(
        &self,
        query: &str,
        exchange: &str,
        market_type: &str,
    ) -> anyhow::Result<i64> {
        let client = self.pool.get().await?;
        let pattern = format!("%{}%", query.to_uppercase());
        let row = client
            .query_one(
                "SELECT COUNT(*) FROM exchange_info \
                 WHERE exchange = $1 AND market_type = $2 \
                   AND (symbol LIKE $3 OR base_asset LIKE $3)",
                &[&exchange, &market_type, &pattern],
            )
            .await?;
        Ok(row.get(0))
    }

    pub async fn resolve(
        &self,
        symbol: &str,
        exchange: &str,
        market_type: &str,
    ) -> anyhow::Result<Option<ExchangeSymbol>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM exchange_info \
                     WHERE exchange = $1 AND symbol = $2 AND market_type = $3"
                ),
                &[&exchange, &symbol, &market_type],
            )
            .await?;
        Ok(row.map(ExchangeSymbol::from))
    }
}
