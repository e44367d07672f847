use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use engine::Channel;
use serde_json::json;
use store::{
    AccountRepo, AlertsRepo, ExchangeInfoRepo, KlinesRepo, NotifyListener, RealtimeRepo,
    SignalsRepo, StoreConfig, TasksRepo, migrations,
};
use tokio::{sync::mpsc, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tools::http::http_server::HttpServerProcess;
use tracing::{error, info};

use crate::{
    SUBSCRIBER_ID,
    alerts::AlertHandler,
    config::GatewayConfig,
    dispatcher::Dispatcher,
    hub::SessionHub,
    registry::SubscriptionRegistry,
    router::RequestRouter,
    session::{GatewayState, ws_router},
};

/// The API gateway: client WebSocket surface, subscription registry and the
/// notification dispatcher, wired over the shared store.
pub struct GatewayService {
    dsn: String,
    pool: store::Pool,
    migrate: bool,
    ws_addr: String,
    bootstrap_exchange_info: bool,
    hub: Arc<SessionHub>,
    registry: Arc<SubscriptionRegistry>,
    router: Arc<RequestRouter>,
    dispatcher: Arc<Dispatcher>,
    tasks: TasksRepo,
}

impl GatewayService {
    pub fn from_config(store_config: &StoreConfig, config: &GatewayConfig) -> Result<Self> {
        let pool = store::build_pool(store_config)?;

        let hub = Arc::new(SessionHub::new());
        let registry = Arc::new(SubscriptionRegistry::new(
            SUBSCRIBER_ID,
            RealtimeRepo::new(pool.clone()),
            pool.clone(),
        ));

        let tasks = TasksRepo::new(pool.clone());
        let router = Arc::new(RequestRouter::new(
            hub.clone(),
            registry.clone(),
            tasks.clone(),
            KlinesRepo::new(pool.clone()),
            ExchangeInfoRepo::new(pool.clone()),
            AlertHandler::new(AlertsRepo::new(pool.clone()), SignalsRepo::new(pool.clone())),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            hub.clone(),
            registry.clone(),
            KlinesRepo::new(pool.clone()),
            AccountRepo::new(pool.clone()),
        ));

        Ok(Self {
            dsn: store_config.dsn.clone(),
            pool,
            migrate: store_config.migrate,
            ws_addr: config.ws_addr.clone(),
            bootstrap_exchange_info: config.bootstrap_exchange_info,
            hub,
            registry,
            router,
            dispatcher,
            tasks,
        })
    }
}

#[async_trait]
impl HttpServerProcess for GatewayService {
    async fn pre_run(&self) -> Result<()> {
        if self.migrate {
            migrations::run(&self.pool).await?;
        }

        // Startup clean: drop rows this gateway wrote in a previous life and
        // tell the adapter to tear down the stale upstream subscriptions.
        // Client subscriptions are not restored; clients resubscribe.
        self.registry.clean_on_start().await?;

        if self.bootstrap_exchange_info {
            let task_id = self
                .tasks
                .create("system.fetch_exchange_info", &json!({"exchange": "BINANCE"}))
                .await?;
            info!(task_id, "Exchange info bootstrap task enqueued");
        }
        Ok(())
    }

    async fn run(&self, token: CancellationToken) -> Result<()> {
        let mut tasks = JoinSet::new();

        // One listener per gateway process, on its own connection.
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let listener = NotifyListener::new(
            self.dsn.clone(),
            vec![
                Channel::TaskCompleted,
                Channel::TaskFailed,
                Channel::RealtimeUpdate,
                Channel::SignalNew,
            ],
        );
        tasks.spawn({
            let token = token.clone();
            async move { listener.run(events_tx, token).await }
        });

        // Dispatch loop. Events are handled in arrival order: per-session
        // frame order is promised to clients, and the hub's queues never
        // block, so sequential dispatch is cheap.
        tasks.spawn({
            let dispatcher = self.dispatcher.clone();
            let token = token.clone();
            async move {
                loop {
                    tokio::select! {
                        _ = token.cancelled() => return Ok(()),
                        event = events_rx.recv() => {
                            let Some(event) = event else { return Ok(()) };
                            dispatcher.handle_event(event.channel, event.envelope).await;
                        }
                    }
                }
            }
        });

        // Client WebSocket listener.
        let state = Arc::new(GatewayState {
            hub: self.hub.clone(),
            registry: self.registry.clone(),
            router: self.router.clone(),
        });
        let listener = tokio::net::TcpListener::bind(&self.ws_addr)
            .await
            .with_context(|| format!("Failed to bind WebSocket address: {}", self.ws_addr))?;
        info!("Listening client WebSocket on {}", self.ws_addr);

        let shutdown = token.clone();
        tasks.spawn(async move {
            axum::serve(listener, ws_router(state))
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
                .context("WebSocket server failed")
        });

        token.cancelled().await;

        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Gateway task failed: {e:#}"),
                Err(e) => error!("Gateway task panicked: {e}"),
            }
        }
        info!("Gateway stopped");
        Ok(())
    }
}
