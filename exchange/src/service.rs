use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use engine::Channel;
use serde_json::Value;
use store::{
    AccountRepo, ExchangeInfoRepo, KlinesRepo, NotifyListener, RealtimeRepo, StoreConfig,
    TasksRepo, migrations,
};
use tokio::{sync::mpsc, task::JoinSet};
use tools::http::http_server::HttpServerProcess;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    client::{Client, FuturesApi, MarketStream, PrivateApi, SpotApi, StreamSignal},
    config::{ExchangeConfig, HttpConfig},
    ingest::Ingestor,
    multiplexer::{Market, StreamMultiplexer},
    worker::TaskWorker,
};

/// The exchange adapter: owns all upstream I/O. Consumes `task.new` and the
/// `subscription.*` channels; writes the realtime table, the history table
/// and task results. It never drives business logic.
pub struct ExchangeService {
    dsn: String,
    pool: store::Pool,
    migrate: bool,
    spot_stream: Arc<MarketStream>,
    futures_stream: Arc<MarketStream>,
    multiplexer: Arc<StreamMultiplexer>,
    ingestor: Ingestor,
    worker: Arc<TaskWorker>,
}

impl ExchangeService {
    pub fn from_config(store_config: &StoreConfig, config: &ExchangeConfig) -> Result<Self> {
        let pool = store::build_pool(store_config)?;
        let http_config = HttpConfig::default();

        let spot = SpotApi::new(Client::new(config.spot_api_url.as_str(), &http_config)?);
        let futures = FuturesApi::new(Client::new(config.futures_api_url.as_str(), &http_config)?);
        let spot_private = PrivateApi::new(
            Client::new(config.spot_api_url.as_str(), &http_config)?,
            config.api_key.clone(),
            config.secret_key.clone(),
        );
        let futures_private = PrivateApi::new(
            Client::new(config.futures_api_url.as_str(), &http_config)?,
            config.api_key.clone(),
            config.secret_key.clone(),
        );

        let realtime = RealtimeRepo::new(pool.clone());
        let worker = TaskWorker::new(
            TasksRepo::new(pool.clone()),
            KlinesRepo::new(pool.clone()),
            AccountRepo::new(pool.clone()),
            ExchangeInfoRepo::new(pool.clone()),
            realtime.clone(),
            spot,
            futures,
            spot_private,
            futures_private,
        );

        let spot_stream = Arc::new(MarketStream::new("spot", config.spot_ws_url.clone()));
        let futures_stream = Arc::new(MarketStream::new("futures", config.futures_ws_url.clone()));
        let multiplexer = Arc::new(StreamMultiplexer::new(
            spot_stream.clone(),
            futures_stream.clone(),
            realtime.clone(),
        ));

        Ok(Self {
            dsn: store_config.dsn.clone(),
            pool,
            migrate: store_config.migrate,
            spot_stream,
            futures_stream,
            multiplexer,
            ingestor: Ingestor::new(realtime),
            worker: Arc::new(worker),
        })
    }

    fn spawn_market(
        &self,
        tasks: &mut JoinSet<Result<()>>,
        market: Market,
        stream: Arc<MarketStream>,
        token: &CancellationToken,
    ) {
        let (signals_tx, mut signals_rx) = mpsc::unbounded_channel();

        tasks.spawn({
            let stream = stream.clone();
            let token = token.clone();
            async move { stream.run(signals_tx, token).await }
        });

        tasks.spawn({
            let multiplexer = self.multiplexer.clone();
            let ingestor = self.ingestor.clone();
            let token = token.clone();
            async move {
                loop {
                    tokio::select! {
                        _ = token.cancelled() => return Ok(()),
                        signal = signals_rx.recv() => {
                            let Some(signal) = signal else { return Ok(()) };
                            match signal {
                                StreamSignal::Connected => {
                                    if let Err(e) = multiplexer.full_sync(market).await {
                                        error!(?market, "Full sync failed: {e:#}");
                                    }
                                }
                                StreamSignal::Event(event) => {
                                    if let Err(e) = ingestor.handle_event(market, event).await {
                                        error!(?market, "Failed to ingest event: {e:#}");
                                    }
                                }
                            }
                        }
                    }
                }
            }
        });
    }
}

#[async_trait]
impl HttpServerProcess for ExchangeService {
    async fn pre_run(&self) -> Result<()> {
        if self.migrate {
            migrations::run(&self.pool).await?;
        }
        Ok(())
    }

    async fn run(&self, token: CancellationToken) -> Result<()> {
        let mut tasks = JoinSet::new();

        // Dedicated notify connection: task queue + subscription lifecycle.
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let listener = NotifyListener::new(
            self.dsn.clone(),
            vec![
                Channel::TaskNew,
                Channel::SubscriptionAdd,
                Channel::SubscriptionRemove,
                Channel::SubscriptionClean,
            ],
        );
        tasks.spawn({
            let token = token.clone();
            async move { listener.run(events_tx, token).await }
        });

        self.spawn_market(&mut tasks, Market::Spot, self.spot_stream.clone(), &token);
        self.spawn_market(&mut tasks, Market::Futures, self.futures_stream.clone(), &token);

        info!("Exchange adapter started");

        // Fan-out loop. Task work is handed off so a slow upstream call
        // never blocks the notification stream.
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                event = events_rx.recv() => {
                    let Some(event) = event else { break };
                    match event.channel {
                        Channel::TaskNew => {
                            let worker = self.worker.clone();
                            let data = event.envelope.data;
                            tokio::spawn(async move {
                                if let Err(e) = worker.handle_task_new(&data).await {
                                    error!("Task handling failed: {e:#}");
                                }
                            });
                        }
                        Channel::SubscriptionAdd => {
                            if let Some(key) = subscription_key(&event.envelope.data)
                                && let Err(e) = self.multiplexer.handle_add(&key).await
                            {
                                error!(key, "Subscribe upstream failed: {e:#}");
                            }
                        }
                        Channel::SubscriptionRemove => {
                            if let Some(key) = subscription_key(&event.envelope.data)
                                && let Err(e) = self.multiplexer.handle_remove(&key).await
                            {
                                error!(key, "Unsubscribe upstream failed: {e:#}");
                            }
                        }
                        Channel::SubscriptionClean => {
                            if let Err(e) = self.multiplexer.handle_clean().await {
                                error!("Subscription clean failed: {e:#}");
                            }
                        }
                        other => warn!(channel = %other, "Unexpected channel"),
                    }
                }
            }
        }

        tasks.abort_all();
        info!("Exchange adapter stopped");
        Ok(())
    }
}

fn subscription_key(data: &Value) -> Option<String> {
    data.get("subscription_key")
        .and_then(Value::as_str)
        .map(str::to_owned)
}
