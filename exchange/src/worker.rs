use chrono::{TimeZone, Utc};
use engine::Interval;
use serde::Deserialize;
use serde_json::Value;
use store::{AccountRepo, ExchangeInfoRepo, ExchangeSymbol, HistoryKline, KlinesRepo, RealtimeRepo, TasksRepo};
use tools::misc::time::now_ms;
use tracing::{info, warn};

use crate::client::{FuturesApi, PrivateApi, SpotApi, models::RawKline};

/// Upstream page size; also the Binance API maximum.
const KLINES_BATCH_LIMIT: usize = 1000;

/// Fulfils rows of the task queue. Listens on `task.new`, claims the row,
/// performs the upstream work and transitions the row to `completed` or
/// `failed`. Task types that query the exchange are re-runnable, and a task
/// may be delivered more than once; the claim transition makes duplicates
/// harmless.
pub struct TaskWorker {
    tasks: TasksRepo,
    klines: KlinesRepo,
    account: AccountRepo,
    exchange_info: ExchangeInfoRepo,
    realtime: RealtimeRepo,
    spot: SpotApi,
    futures: FuturesApi,
    spot_private: PrivateApi,
    futures_private: PrivateApi,
}

#[derive(Debug, Deserialize)]
struct KlinesParams {
    symbol: String,
    interval: Interval,
    #[serde(default)]
    from_time: Option<i64>,
    #[serde(default)]
    to_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct QuotesParams {
    symbols: Vec<String>,
}

impl TaskWorker {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        tasks: TasksRepo,
        klines: KlinesRepo,
        account: AccountRepo,
        exchange_info: ExchangeInfoRepo,
        realtime: RealtimeRepo,
        spot: SpotApi,
        futures: FuturesApi,
        spot_private: PrivateApi,
        futures_private: PrivateApi,
    ) -> Self {
        Self {
            tasks,
            klines,
            account,
            exchange_info,
            realtime,
            spot,
            futures,
            spot_private,
            futures_private,
        }
    }

    /// Entry point for one `task.new` notification.
    pub async fn handle_task_new(&self, data: &Value) -> anyhow::Result<()> {
        let Some(task_id) = data.get("id").and_then(Value::as_i64) else {
            warn!("task.new notification without id, dropped");
            return Ok(());
        };
        let task_type = data
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let payload = data.get("payload").cloned().unwrap_or(Value::Null);

        if !self.tasks.claim(task_id).await? {
            // Already claimed: duplicate delivery or a competing worker.
            return Ok(());
        }

        info!(task_id, task_type, "Processing task");
        let started = std::time::Instant::now();

        let outcome = match task_type.as_str() {
            "get_klines" => self.handle_get_klines(&payload).await,
            "get_server_time" => self.handle_get_server_time().await,
            "get_quotes" => self.handle_get_quotes(&payload).await,
            "get_spot_account" => self.handle_account(false).await,
            "get_futures_account" => self.handle_account(true).await,
            "system.fetch_exchange_info" => self.handle_fetch_exchange_info().await,
            other => Err(anyhow::anyhow!("unknown task type: {other}")),
        };

        match outcome {
            Ok(result) => {
                self.tasks.complete(task_id, result.as_ref()).await?;
                metrics::counter!("exchange_tasks_completed").increment(1);
                info!(task_id, task_type, elapsed_ms = started.elapsed().as_millis() as u64, "Task completed");
            }
            Err(e) => {
                self.tasks.fail(task_id, &format!("{e:#}")).await?;
                metrics::counter!("exchange_tasks_failed").increment(1);
                warn!(task_id, task_type, "Task failed: {e:#}");
            }
        }
        Ok(())
    }

    /// Pages k-lines from `from_time` (or the most recent window when no
    /// range is given), upserting each batch into the history table. The
    /// task result stays NULL; consumers re-query the table.
    async fn handle_get_klines(&self, payload: &Value) -> anyhow::Result<Option<Value>> {
        let params: KlinesParams = serde_json::from_value(payload.clone())?;
        let (pair, perp) = split_symbol(&params.symbol);
        let binance_interval = params.interval.to_binance();

        let mut all_klines: Vec<RawKline> = Vec::new();
        let mut cursor = params.from_time;
        // Without a range the API returns the latest window in one call.
        let paged = params.from_time.is_some() || params.to_time.is_some();

        loop {
            let batch = if perp {
                self.futures
                    .get_klines(&pair, &binance_interval, cursor, params.to_time, KLINES_BATCH_LIMIT)
                    .await?
            } else {
                self.spot
                    .get_klines(&pair, &binance_interval, cursor, params.to_time, KLINES_BATCH_LIMIT)
                    .await?
            };

            if batch.is_empty() {
                break;
            }
            let short_batch = batch.len() < KLINES_BATCH_LIMIT;
            let last_close = batch.last().map(RawKline::close_time);
            all_klines.extend(batch);

            if !paged || short_batch {
                break;
            }
            // Next page starts just past the last candle, avoiding overlap.
            cursor = last_close.map(|t| t + 1);
            if let (Some(cursor), Some(to_time)) = (cursor, params.to_time)
                && cursor > to_time
            {
                break;
            }
        }

        let rows: Vec<HistoryKline> = all_klines.iter().map(RawKline::to_history).collect();
        let written = self
            .klines
            .upsert_batch(&params.symbol, params.interval.as_str(), &rows)
            .await?;
        info!(
            symbol = params.symbol,
            interval = %params.interval,
            written,
            "History k-lines stored"
        );

        Ok(None)
    }

    async fn handle_get_server_time(&self) -> anyhow::Result<Option<Value>> {
        let server_time = self.spot.get_server_time().await?;
        let iso_time = Utc
            .timestamp_millis_opt(server_time)
            .single()
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        Ok(Some(serde_json::json!({
            "server_time": server_time,
            "iso_time": iso_time,
        })))
    }

    /// Batches spot symbols into one HTTP call and fans out per futures
    /// symbol, then writes one consolidated quotes result onto the task row.
    async fn handle_get_quotes(&self, payload: &Value) -> anyhow::Result<Option<Value>> {
        let params: QuotesParams = serde_json::from_value(payload.clone())?;

        let mut spot_pairs: Vec<String> = Vec::new();
        let mut futures_pairs: Vec<String> = Vec::new();
        let mut original_by_pair: std::collections::HashMap<String, String> =
            std::collections::HashMap::new();

        for symbol in &params.symbols {
            let (pair, perp) = split_symbol(symbol);
            original_by_pair.insert(pair.clone(), symbol.clone());
            if perp {
                futures_pairs.push(pair);
            } else {
                spot_pairs.push(pair);
            }
        }

        let mut tickers = Vec::new();
        if !spot_pairs.is_empty() {
            tickers.extend(self.spot.get_24hr_tickers(&spot_pairs).await?);
        }
        if !futures_pairs.is_empty() {
            tickers.extend(self.futures.get_24hr_tickers(&futures_pairs).await?);
        }

        let quotes: Vec<Value> = tickers
            .iter()
            .map(|ticker| {
                let name = original_by_pair
                    .get(&ticker.symbol)
                    .cloned()
                    .unwrap_or_else(|| format!("BINANCE:{}", ticker.symbol));
                serde_json::json!({
                    "n": name,
                    "s": "ok",
                    "v": ticker.to_quote_value(),
                })
            })
            .collect();

        Ok(Some(serde_json::json!({
            "count": quotes.len(),
            "quotes": quotes,
        })))
    }

    /// Account snapshot: persists the raw document into `account_info` and
    /// refreshes the live `BINANCE:ACCOUNT@...` row when one is subscribed.
    /// The task result stays NULL.
    async fn handle_account(&self, futures_market: bool) -> anyhow::Result<Option<Value>> {
        let (api, account_type, key) = if futures_market {
            (&self.futures_private, "FUTURES", "BINANCE:ACCOUNT@FUTURES")
        } else {
            (&self.spot_private, "SPOT", "BINANCE:ACCOUNT@SPOT")
        };

        let snapshot = if futures_market {
            api.get_futures_account(now_ms()).await?
        } else {
            api.get_spot_account(now_ms()).await?
        };

        let update_time = snapshot.get("updateTime").and_then(Value::as_i64);
        self.account.save(account_type, &snapshot, update_time).await?;

        // Mirror the snapshot into the realtime store for live account
        // subscriptions; the adapter itself holds the row open.
        self.realtime
            .add_subscription(key, "ACCOUNT", crate::SUBSCRIBER_ID)
            .await?;
        self.realtime.update_data(key, &snapshot, None).await?;

        Ok(None)
    }

    async fn handle_fetch_exchange_info(&self) -> anyhow::Result<Option<Value>> {
        let spot_info = self.spot.get_exchange_info().await?;
        let futures_info = self.futures.get_exchange_info().await?;

        let mut symbols: Vec<ExchangeSymbol> = Vec::new();
        for (market_type, info) in [("SPOT", spot_info), ("FUTURES", futures_info)] {
            symbols.extend(info.symbols.into_iter().map(|descriptor| ExchangeSymbol {
                exchange: "BINANCE".to_owned(),
                symbol: descriptor.symbol,
                market_type: market_type.to_owned(),
                base_asset: descriptor.base_asset,
                quote_asset: descriptor.quote_asset,
                status: descriptor.status,
            }));
        }

        let written = self.exchange_info.upsert_symbols(&symbols).await?;
        info!(written, "Exchange info refreshed");
        Ok(None)
    }
}

/// `BINANCE:BTCUSDT.PERP` -> (`BTCUSDT`, true).
fn split_symbol(symbol: &str) -> (String, bool) {
    let bare = symbol.split_once(':').map_or(symbol, |(_, rest)| rest);
    match bare.strip_suffix(".PERP") {
        Some(pair) => (pair.to_uppercase(), true),
        None => (bare.to_uppercase(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_symbol() {
        assert_eq!(split_symbol("BINANCE:BTCUSDT"), ("BTCUSDT".to_owned(), false));
        assert_eq!(split_symbol("BINANCE:btcusdt.PERP"), ("BTCUSDT".to_owned(), true));
        assert_eq!(split_symbol("ETHUSDT"), ("ETHUSDT".to_owned(), false));
    }
}
