use chrono::{DateTime, TimeZone, Utc};
use engine::Bar;
use tokio_postgres::Row;

use crate::pool::Pool;

/// One closed candle as persisted in `klines_history`. Times are epoch
/// milliseconds at this layer; the table stores TIMESTAMPTZ.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryKline {
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_volume: f64,
    pub trades: i64,
    pub taker_buy_base_volume: f64,
    pub taker_buy_quote_volume: f64,
}

impl HistoryKline {
    #[must_use]
    pub fn bar(&self) -> Bar {
        Bar {
            time: self.open_time,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}

impl From<Row> for HistoryKline {
    fn from(row: Row) -> Self {
        let open_time: DateTime<Utc> = row.get("open_time");
        let close_time: DateTime<Utc> = row.get("close_time");
        Self {
            open_time: open_time.timestamp_millis(),
            close_time: close_time.timestamp_millis(),
            open: row.get("open_price"),
            high: row.get("high_price"),
            low: row.get("low_price"),
            close: row.get("close_price"),
            volume: row.get("volume"),
            quote_volume: row.get("quote_volume"),
            trades: row.get("number_of_trades"),
            taker_buy_base_volume: row.get("taker_buy_base_volume"),
            taker_buy_quote_volume: row.get("taker_buy_quote_volume"),
        }
    }
}

const SELECT_COLUMNS: &str = "open_time, close_time, open_price, high_price, low_price, \
                              close_price, volume, quote_volume, number_of_trades, \
                              taker_buy_base_volume, taker_buy_quote_volume";

/// Append-only history. Upsert on conflict repairs rows ingested while the
/// candle was still forming.
#[derive(Clone)]
pub struct KlinesRepo {
    pool: Pool,
}

impl KlinesRepo {
    #[must_use]
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn upsert_batch(
        &self,
        symbol: &str,
        interval: &str,
        klines: &[HistoryKline],
    ) -> anyhow::Result<u64> {
        if klines.is_empty() {
            return Ok(0);
        }

        let client = self.pool.get().await?;
        let statement = client
            .prepare(
                r#"
                INSERT INTO klines_history (
                    symbol, interval, open_time, close_time,
                    open_price, high_price, low_price, close_price,
                    volume, quote_volume, number_of_trades,
                    taker_buy_base_volume, taker_buy_quote_volume
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                ON CONFLICT (symbol, interval, open_time) DO UPDATE SET
                    close_time = EXCLUDED.close_time,
                    open_price = EXCLUDED.open_price,
                    high_price = EXCLUDED.high_price,
                    low_price = EXCLUDED.low_price,
                    close_price = EXCLUDED.close_price,
                    volume = EXCLUDED.volume,
                    quote_volume = EXCLUDED.quote_volume,
                    number_of_trades = EXCLUDED.number_of_trades,
                    taker_buy_base_volume = EXCLUDED.taker_buy_base_volume,
                    taker_buy_quote_volume = EXCLUDED.taker_buy_quote_volume
                "#,
            )
            .await?;

        let mut written = 0;
        for kline in klines {
            let open_time = ms_to_utc(kline.open_time);
            let close_time = ms_to_utc(kline.close_time);
            written += client
                .execute(
                    &statement,
                    &[
                        &symbol,
                        &interval,
                        &open_time,
                        &close_time,
                        &kline.open,
                        &kline.high,
                        &kline.low,
                        &kline.close,
                        &kline.volume,
                        &kline.quote_volume,
                        &kline.trades,
                        &kline.taker_buy_base_volume,
                        &kline.taker_buy_quote_volume,
                    ],
                )
                .await?;
        }
        Ok(written)
    }

    /// Candles in `[from_ms, to_ms]` sorted ascending by open time.
    pub async fn query_range(
        &self,
        symbol: &str,
        interval: &str,
        from_ms: i64,
        to_ms: i64,
    ) -> anyhow::Result<Vec<HistoryKline>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM klines_history \
                     WHERE symbol = $1 AND interval = $2 \
                       AND open_time >= $3 AND open_time <= $4 \
                     ORDER BY open_time ASC"
                ),
                &[&symbol, &interval, &ms_to_utc(from_ms), &ms_to_utc(to_ms)],
            )
            .await?;
        Ok(rows.into_iter().map(HistoryKline::from).collect())
    }

    /// Probes the two endpoints of a requested range. Only the endpoints are
    /// validated; an interior gap does not force the async path.
    pub async fn endpoints_exist(
        &self,
        symbol: &str,
        interval: &str,
        from_ms: i64,
        to_ms: i64,
    ) -> anyhow::Result<(bool, bool)> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare(
                "SELECT EXISTS(SELECT 1 FROM klines_history \
                 WHERE symbol = $1 AND interval = $2 AND open_time = $3)",
            )
            .await?;

        let from_exists: bool = client
            .query_one(&statement, &[&symbol, &interval, &ms_to_utc(from_ms)])
            .await?
            .get(0);
        let to_exists: bool = client
            .query_one(&statement, &[&symbol, &interval, &ms_to_utc(to_ms)])
            .await?
            .get(0);
        Ok((from_exists, to_exists))
    }

    /// The latest `limit` candles, returned in ascending order.
    pub async fn latest(
        &self,
        symbol: &str,
        interval: &str,
        limit: i64,
    ) -> anyhow::Result<Vec<HistoryKline>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM klines_history \
                     WHERE symbol = $1 AND interval = $2 \
                     ORDER BY open_time DESC LIMIT $3"
                ),
                &[&symbol, &interval, &limit],
            )
            .await?;
        let mut klines: Vec<HistoryKline> = rows.into_iter().map(HistoryKline::from).collect();
        klines.reverse();
        Ok(klines)
    }
}

fn ms_to_utc(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}
