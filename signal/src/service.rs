use std::{
    collections::{HashMap, HashSet},
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use engine::{Bar, Channel, Interval, SubscriptionKey};
use serde_json::{Value, json};
use store::{
    AlertConfig, AlertsRepo, KlinesRepo, NotifyEvent, NotifyListener, RealtimeRepo, SignalRecord,
    SignalsRepo, StoreConfig, TasksRepo, migrations,
};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tools::{http::http_server::HttpServerProcess, misc::time::now_ms};
use tracing::{debug, error, info, warn};

use crate::{
    REQUIRED_KLINES, SUBSCRIBER_ID,
    cache::KlineBuffer,
    config::SignalConfig,
    strategy::{SignalValue, Strategy, StrategyRegistry, resolve_last},
    triggers::{KlineUpdate, TriggerState, TriggerType, should_execute},
    validator,
};

/// Back-fill task wait; the task is not cancelled on expiry, the loop just
/// issues a fresh one.
const FILL_WAIT: Duration = Duration::from_secs(5);
const FILL_RETRY_SLEEP: Duration = Duration::from_secs(2);
/// An incoming open time further than this many interval-widths past the
/// buffer tail means candles were missed.
const GAP_FACTOR_X10: i64 = 15;

struct AlertState {
    config: AlertConfig,
    key: String,
    strategy: Arc<dyn Strategy>,
    trigger: TriggerType,
    trigger_state: TriggerState,
}

#[derive(Default)]
struct WorkerState {
    /// alert id -> runtime state.
    alerts: HashMap<String, AlertState>,
    /// subscription key -> alert ids fed by that series.
    alerts_by_key: HashMap<String, HashSet<String>>,
    /// subscription key -> k-line buffer. The buffer is this worker's
    /// private view; the realtime row stays authoritative for broadcast.
    buffers: HashMap<String, KlineBuffer>,
}

struct WorkerCore {
    dsn: String,
    required_klines: usize,
    alerts_repo: AlertsRepo,
    signals_repo: SignalsRepo,
    tasks_repo: TasksRepo,
    klines_repo: KlinesRepo,
    realtime_repo: RealtimeRepo,
    registry: StrategyRegistry,
    state: Mutex<WorkerState>,
    /// Per-key locks serialising back-fill against concurrent updates.
    fill_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// The signal worker: consumes `realtime.update`, maintains per-series
/// k-line buffers, runs trigger engines and strategies, and persists
/// non-null signals (firing `signal.new`). Alert configs hot-reload via the
/// `alert_config.*` channels.
pub struct SignalWorker {
    pool: store::Pool,
    migrate: bool,
    core: Arc<WorkerCore>,
}

impl SignalWorker {
    pub fn from_config(store_config: &StoreConfig, config: &SignalConfig) -> Result<Self> {
        let pool = store::build_pool(store_config)?;

        let core = WorkerCore {
            dsn: store_config.dsn.clone(),
            required_klines: config.required_klines.unwrap_or(REQUIRED_KLINES),
            alerts_repo: AlertsRepo::new(pool.clone()),
            signals_repo: SignalsRepo::new(pool.clone()),
            tasks_repo: TasksRepo::new(pool.clone()),
            klines_repo: KlinesRepo::new(pool.clone()),
            realtime_repo: RealtimeRepo::new(pool.clone()),
            registry: StrategyRegistry::default(),
            state: Mutex::new(WorkerState::default()),
            fill_locks: Mutex::new(HashMap::new()),
        };

        Ok(Self {
            pool,
            migrate: store_config.migrate,
            core: Arc::new(core),
        })
    }
}

#[async_trait]
impl HttpServerProcess for SignalWorker {
    async fn pre_run(&self) -> Result<()> {
        if self.migrate {
            migrations::run(&self.pool).await?;
        }
        Ok(())
    }

    async fn run(&self, token: CancellationToken) -> Result<()> {
        self.core.load_alerts().await?;
        self.core.ensure_subscriptions(&token).await?;

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let listener = NotifyListener::new(
            self.core.dsn.clone(),
            vec![
                Channel::RealtimeUpdate,
                Channel::AlertConfigNew,
                Channel::AlertConfigUpdate,
                Channel::AlertConfigDelete,
            ],
        );
        let listener_task = tokio::spawn({
            let token = token.clone();
            async move { listener.run(events_tx, token).await }
        });

        info!("Signal worker started");

        // The notify callback only hands off; the per-key fill locks take
        // care of ordering where it matters.
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                event = events_rx.recv() => {
                    let Some(event) = event else { break };
                    self.dispatch(event, &token);
                }
            }
        }

        listener_task.abort();
        info!("Signal worker stopped");
        Ok(())
    }
}

impl SignalWorker {
    fn dispatch(&self, event: NotifyEvent, token: &CancellationToken) {
        let core = self.core.clone();
        let token = token.clone();
        match event.channel {
            Channel::RealtimeUpdate => {
                tokio::spawn(async move {
                    if let Err(e) = core.handle_realtime_update(&event.envelope.data, &token).await {
                        error!("Realtime update handling failed: {e:#}");
                    }
                });
            }
            Channel::AlertConfigNew | Channel::AlertConfigUpdate => {
                tokio::spawn(async move {
                    if let Err(e) = core.reload_alert(&event.envelope.data, &token).await {
                        error!("Alert reload failed: {e:#}");
                    }
                });
            }
            Channel::AlertConfigDelete => {
                tokio::spawn(async move {
                    if let Err(e) = core.remove_alert(&event.envelope.data).await {
                        error!("Alert removal failed: {e:#}");
                    }
                });
            }
            other => debug!(channel = %other, "Channel not handled by worker"),
        }
    }
}

impl WorkerCore {
    /// Loads enabled alert configs into runtime state.
    async fn load_alerts(&self) -> Result<()> {
        let configs = self.alerts_repo.list(true).await?;
        let mut state = self.state.lock().await;
        for config in configs {
            match self.build_alert_state(config) {
                Ok(alert) => {
                    state
                        .alerts_by_key
                        .entry(alert.key.clone())
                        .or_default()
                        .insert(alert.config.id.clone());
                    state.alerts.insert(alert.config.id.clone(), alert);
                }
                Err(e) => warn!("Skipping alert config: {e:#}"),
            }
        }
        info!(alerts = state.alerts.len(), "Alert configs loaded");
        Ok(())
    }

    fn build_alert_state(&self, config: AlertConfig) -> Result<AlertState> {
        let strategy = self
            .registry
            .get(&config.strategy_type)
            .with_context(|| format!("unknown strategy type: {}", config.strategy_type))?;
        let trigger = TriggerType::from_str(&config.trigger_type)
            .map_err(|_| anyhow::anyhow!("unknown trigger type: {}", config.trigger_type))?;
        let interval: Interval = config
            .interval
            .parse()
            .map_err(|e| anyhow::anyhow!("alert {}: {e}", config.id))?;
        let key = build_subscription_key(&config.symbol, &interval);

        Ok(AlertState {
            key,
            strategy,
            trigger,
            trigger_state: TriggerState::default(),
            config,
        })
    }

    /// Registers the worker as subscriber of every needed series and
    /// initialises the buffers, back-filling where history is inadequate.
    async fn ensure_subscriptions(&self, token: &CancellationToken) -> Result<()> {
        let keys: Vec<String> = {
            let state = self.state.lock().await;
            state.alerts_by_key.keys().cloned().collect()
        };

        for key in keys {
            self.realtime_repo
                .add_subscription(&key, "KLINE", SUBSCRIBER_ID)
                .await?;
            self.init_buffer(&key, token).await?;
        }
        Ok(())
    }

    /// Loads the latest window from the history table and validates it; on
    /// failure enters the fill loop until the series is whole.
    async fn init_buffer(&self, key: &str, token: &CancellationToken) -> Result<()> {
        let (symbol, interval) = split_key(key)?;

        let history = self
            .klines_repo
            .latest(&symbol, interval.as_str(), self.required_klines as i64)
            .await?;

        match validator::validate(&history, &interval, self.required_klines) {
            Ok(()) => {
                let buffer = KlineBuffer::from_history(&history, self.required_klines);
                info!(
                    key,
                    klines = buffer.len(),
                    "K-line buffer initialised from history"
                );
                self.state.lock().await.buffers.insert(key.to_owned(), buffer);
                Ok(())
            }
            Err(reason) => {
                warn!(key, %reason, "History invalid, entering fill loop");
                self.fill_klines(key, &symbol, &interval, token).await
            }
        }
    }

    /// Back-fill loop: enqueue a `get_klines` task, wait up to five seconds
    /// for its completion on a dedicated listen connection (reused across
    /// iterations), re-validate, retry until whole. Unbounded by design —
    /// correctness over deadlines.
    async fn fill_klines(
        &self,
        key: &str,
        symbol: &str,
        interval: &Interval,
        token: &CancellationToken,
    ) -> Result<()> {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let fill_token = token.child_token();
        let listener = NotifyListener::new(
            self.dsn.clone(),
            vec![Channel::TaskCompleted, Channel::TaskFailed],
        );
        let listener_task = tokio::spawn({
            let fill_token = fill_token.clone();
            async move { listener.run(events_tx, fill_token).await }
        });

        let mut attempt = 0u32;
        let result = loop {
            if token.is_cancelled() {
                break Err(anyhow::anyhow!("cancelled during back-fill"));
            }
            attempt += 1;

            let task_id = self
                .tasks_repo
                .create(
                    "get_klines",
                    &json!({"symbol": symbol, "interval": interval.as_str(), "limit": 1000}),
                )
                .await?;
            debug!(key, task_id, attempt, "Back-fill task enqueued");

            let status = self.wait_for_task(&mut events_rx, task_id).await?;
            if status.as_deref() == Some("completed") {
                let history = self
                    .klines_repo
                    .latest(symbol, interval.as_str(), self.required_klines as i64)
                    .await?;
                match validator::validate(&history, interval, self.required_klines) {
                    Ok(()) => {
                        let buffer = KlineBuffer::from_history(&history, self.required_klines);
                        info!(key, attempt, klines = buffer.len(), "Back-fill complete");
                        self.state.lock().await.buffers.insert(key.to_owned(), buffer);
                        break Ok(());
                    }
                    Err(reason) => {
                        warn!(key, attempt, %reason, "History still invalid after fill");
                    }
                }
            } else {
                warn!(key, task_id, attempt, ?status, "Back-fill task failed or timed out");
            }

            tokio::select! {
                _ = token.cancelled() => break Err(anyhow::anyhow!("cancelled during back-fill")),
                _ = tokio::time::sleep(FILL_RETRY_SLEEP) => {}
            }
        };

        fill_token.cancel();
        listener_task.abort();
        result
    }

    /// Select over (task notification, timeout). On timeout the row is
    /// consulted directly in case the notification was missed.
    async fn wait_for_task(
        &self,
        events_rx: &mut mpsc::UnboundedReceiver<NotifyEvent>,
        task_id: i64,
    ) -> Result<Option<String>> {
        let deadline = tokio::time::Instant::now() + FILL_WAIT;

        loop {
            match tokio::time::timeout_at(deadline, events_rx.recv()).await {
                Ok(Some(event)) => {
                    if event.envelope.data.get("id").and_then(Value::as_i64) == Some(task_id) {
                        let status = match event.channel {
                            Channel::TaskCompleted => "completed",
                            _ => "failed",
                        };
                        return Ok(Some(status.to_owned()));
                    }
                    // Someone else's task; keep waiting.
                }
                Ok(None) => bail!("fill listener closed"),
                Err(_) => {
                    // Timed out; the task may have completed unnoticed.
                    return self.tasks_repo.status(task_id).await;
                }
            }
        }
    }

    /// One `realtime.update` for a k-line series.
    async fn handle_realtime_update(&self, data: &Value, token: &CancellationToken) -> Result<()> {
        let Some(key) = data.get("subscription_key").and_then(Value::as_str) else {
            return Ok(());
        };
        if data.get("data_type").and_then(Value::as_str) != Some("KLINE") {
            return Ok(());
        }
        let kline = data.get("data").cloned().unwrap_or(Value::Null);

        let alert_ids: Vec<String> = {
            let state = self.state.lock().await;
            match state.alerts_by_key.get(key) {
                Some(ids) => ids.iter().cloned().collect(),
                None => return Ok(()),
            }
        };

        // While a back-fill holds the key's lock, concurrent updates are
        // dropped; the next update re-detects any remaining gap.
        let lock = {
            let mut locks = self.fill_locks.lock().await;
            locks.entry(key.to_owned()).or_default().clone()
        };
        let Ok(_guard) = lock.try_lock() else {
            debug!(key, "Fill in progress, update dropped");
            return Ok(());
        };

        let k = kline.get("k").unwrap_or(&kline);
        let update = KlineUpdate {
            open_time: k.get("t").and_then(Value::as_i64),
            close_time: k.get("T").and_then(Value::as_i64),
            is_closed: k.get("x").and_then(Value::as_bool).unwrap_or(false),
        };

        let buffer_missing = !self.state.lock().await.buffers.contains_key(key);
        if buffer_missing {
            self.init_buffer(key, token).await?;
        }

        // Continuity detection before the buffer mutates: a jump of more
        // than 1.5 intervals means candles were missed across a reconnect.
        let (_, interval) = split_key(key)?;
        let last_open_time = {
            let state = self.state.lock().await;
            state.buffers.get(key).and_then(KlineBuffer::last_open_time)
        };
        if let (Some(last), Some(new_time)) = (last_open_time, update.open_time) {
            let gap = new_time - last;
            if gap * 10 > interval.as_millis() * GAP_FACTOR_X10 {
                warn!(
                    key,
                    cache_last = last,
                    new_time,
                    gap_ms = gap,
                    "K-line gap detected, running synchronous back-fill"
                );
                let (symbol, interval) = split_key(key)?;
                self.fill_klines(key, &symbol, &interval, token).await?;
            }
        }

        // Apply the update and snapshot the frame.
        let bars: Vec<Bar> = {
            let mut state = self.state.lock().await;
            let Some(buffer) = state.buffers.get_mut(key) else {
                return Ok(());
            };
            if let Some(bar) = bar_from_kline(k) {
                buffer.upsert(bar);
            }
            buffer.bars().to_vec()
        };

        if bars.len() < self.required_klines {
            warn!(
                key,
                got = bars.len(),
                need = self.required_klines,
                "Buffer too small for evaluation"
            );
            return Ok(());
        }

        for alert_id in alert_ids {
            if let Err(e) = self.process_alert(&alert_id, key, &update, &bars).await {
                error!(alert_id, "Alert evaluation failed: {e:#}");
            }
        }
        Ok(())
    }

    /// Trigger decision, strategy evaluation, signal persistence.
    async fn process_alert(
        &self,
        alert_id: &str,
        key: &str,
        update: &KlineUpdate,
        bars: &[Bar],
    ) -> Result<()> {
        let now = now_ms();

        // Decide and commit the successor trigger state up front so dedupe
        // holds even when the evaluation yields no signal.
        let decision = {
            let mut state = self.state.lock().await;
            let Some(alert) = state.alerts.get_mut(alert_id) else {
                return Ok(());
            };
            if !alert.config.is_enabled {
                return Ok(());
            }

            let (fire, next_state) =
                should_execute(alert.trigger, &alert.trigger_state, update, now);
            alert.trigger_state = next_state;
            if !fire {
                None
            } else {
                Some((
                    alert.strategy.clone(),
                    alert.config.params.clone(),
                    alert.config.clone(),
                ))
            }
        };
        let Some((strategy, params, config)) = decision else {
            return Ok(());
        };

        // CPU-bound evaluation stays off the async workers.
        let frame: Vec<Bar> = bars.to_vec();
        let series = tokio::task::spawn_blocking(move || strategy.generate_signals(&frame, &params))
            .await??;
        let evaluation = resolve_last(&series);

        let Some(signal_value) = evaluation.value.as_db() else {
            debug!(alert_id, reason = evaluation.reason, "No signal");
            return Ok(());
        };

        // Only non-null evaluations are persisted; the insert trigger fires
        // signal.new which the gateway fans out on SIGNAL:<alert_id>.
        self.signals_repo
            .insert(&SignalRecord {
                alert_id: config.id.clone(),
                strategy_type: config.strategy_type.clone(),
                symbol: config.symbol.clone(),
                interval: config.interval.clone(),
                trigger_type: config.trigger_type.clone(),
                signal_value,
                signal_reason: evaluation.reason.clone(),
                source_subscription_key: key.to_owned(),
                metadata: json!({"processed_at_ms": now}),
            })
            .await?;
        metrics::counter!("signal_signals_computed").increment(1);

        info!(
            alert = config.name,
            symbol = config.symbol,
            interval = config.interval,
            long = matches!(evaluation.value, SignalValue::Long),
            reason = evaluation.reason,
            "Signal computed and saved"
        );
        Ok(())
    }

    /// `alert_config.new` / `alert_config.update`: rebuild the alert's
    /// runtime state from the notified row.
    async fn reload_alert(&self, data: &Value, token: &CancellationToken) -> Result<()> {
        let config: AlertConfig = serde_json::from_value(data.clone())
            .context("unparseable alert_config payload")?;
        let alert_id = config.id.clone();
        let enabled = config.is_enabled;

        let released_key = self.detach_alert(&alert_id).await;

        if enabled {
            let alert = self.build_alert_state(config)?;
            let key = alert.key.clone();
            {
                let mut state = self.state.lock().await;
                state
                    .alerts_by_key
                    .entry(key.clone())
                    .or_default()
                    .insert(alert_id.clone());
                state.alerts.insert(alert_id.clone(), alert);
            }

            self.realtime_repo
                .add_subscription(&key, "KLINE", SUBSCRIBER_ID)
                .await?;
            let buffer_missing = !self.state.lock().await.buffers.contains_key(&key);
            if buffer_missing {
                self.init_buffer(&key, token).await?;
            }
            info!(alert_id, key, "Alert config loaded");
        }

        if let Some(key) = released_key {
            self.release_key(&key).await?;
        }
        Ok(())
    }

    /// `alert_config.delete`.
    async fn remove_alert(&self, data: &Value) -> Result<()> {
        let Some(alert_id) = data.get("id").and_then(Value::as_str) else {
            return Ok(());
        };
        if let Some(key) = self.detach_alert(alert_id).await {
            self.release_key(&key).await?;
        }
        info!(alert_id, "Alert config removed");
        Ok(())
    }

    /// Unlinks an alert from the state maps, returning its key when the key
    /// lost its last alert.
    async fn detach_alert(&self, alert_id: &str) -> Option<String> {
        let mut state = self.state.lock().await;
        let alert = state.alerts.remove(alert_id)?;
        let key = alert.key;
        if let Some(ids) = state.alerts_by_key.get_mut(&key) {
            ids.remove(alert_id);
            if ids.is_empty() {
                state.alerts_by_key.remove(&key);
                state.buffers.remove(&key);
                return Some(key);
            }
        }
        None
    }

    /// Withdraws the worker from a series nothing references any more.
    async fn release_key(&self, key: &str) -> Result<()> {
        let still_used = self.state.lock().await.alerts_by_key.contains_key(key);
        if !still_used {
            self.realtime_repo
                .remove_subscription(key, SUBSCRIBER_ID)
                .await?;
            debug!(key, "Series released");
        }
        Ok(())
    }
}

/// `BINANCE:BTCUSDT` + `60` -> `BINANCE:BTCUSDT@KLINE_60`. A bare symbol
/// gets the default exchange prefix.
fn build_subscription_key(symbol: &str, interval: &Interval) -> String {
    let qualified = if symbol.contains(':') {
        symbol.to_owned()
    } else {
        format!("BINANCE:{symbol}")
    };
    format!("{qualified}@KLINE_{interval}")
}

/// Key -> (history-table symbol, interval).
fn split_key(key: &str) -> Result<(String, Interval)> {
    let parsed: SubscriptionKey = key
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid subscription key {key:?}: {e}"))?;
    let interval = parsed
        .interval()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("not a k-line key: {key:?}"))?;
    Ok((parsed.qualified_symbol(), interval))
}

/// Upstream kline object -> buffer bar. Decimal fields arrive as strings.
fn bar_from_kline(k: &Value) -> Option<Bar> {
    Some(Bar {
        time: k.get("t").and_then(Value::as_i64)?,
        open: field_f64(k, "o")?,
        high: field_f64(k, "h")?,
        low: field_f64(k, "l")?,
        close: field_f64(k, "c")?,
        volume: field_f64(k, "v")?,
    })
}

fn field_f64(value: &Value, field: &str) -> Option<f64> {
    match value.get(field)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_subscription_key() -> anyhow::Result<()> {
        let interval: Interval = "60".parse()?;
        assert_eq!(
            build_subscription_key("BINANCE:BTCUSDT", &interval),
            "BINANCE:BTCUSDT@KLINE_60"
        );
        assert_eq!(
            build_subscription_key("ETHUSDT", &interval),
            "BINANCE:ETHUSDT@KLINE_60"
        );
        Ok(())
    }

    #[test]
    fn test_split_key() -> anyhow::Result<()> {
        let (symbol, interval) = split_key("BINANCE:BTCUSDT@KLINE_60")?;
        assert_eq!(symbol, "BINANCE:BTCUSDT");
        assert_eq!(interval.as_str(), "60");

        assert!(split_key("BINANCE:BTCUSDT@QUOTES").is_err());
        assert!(split_key("garbage").is_err());
        Ok(())
    }

    #[test]
    fn test_bar_from_kline_parses_decimal_strings() {
        let k = serde_json::json!({
            "t": 1770640680000_i64, "o": "1", "h": "2", "l": "0.5", "c": "1.5", "v": "10"
        });
        let bar = bar_from_kline(&k).unwrap();
        assert_eq!(bar.time, 1_770_640_680_000);
        assert!((bar.close - 1.5).abs() < 1e-9);

        assert!(bar_from_kline(&serde_json::json!({"o": "1"})).is_none());
    }

    #[test]
    fn test_gap_threshold() {
        // Gap of exactly 1 interval: append. Gap of 3 intervals: fill.
        let interval_ms = 60_000_i64;
        let append_gap = interval_ms;
        let fill_gap = 3 * interval_ms;
        assert!(append_gap * 10 <= interval_ms * GAP_FACTOR_X10);
        assert!(fill_gap * 10 > interval_ms * GAP_FACTOR_X10);
    }
}
