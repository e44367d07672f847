use std::sync::Arc;

use anyhow::{Context, Result};
use tools::http::http_server::{HttpServer, HttpServerConfig, HttpServerProcess};

use crate::{
    ServiceType,
    config::{Config, GeneralConfig},
    ui,
};

pub async fn start(service: ServiceType, config_path: std::path::PathBuf) -> Result<()> {
    let _cfg = match Config::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            ui::print_config_error(&config_path, &e);
            return Ok(());
        }
    };

    match service {
        ServiceType::Gateway => {
            #[cfg(feature = "gateway")]
            {
                let process = gateway::GatewayService::from_config(&_cfg.database, &_cfg.gateway)?;
                bootstrap(Arc::new(process), &_cfg.general).await?;
            }
            #[cfg(not(feature = "gateway"))]
            ui::print_feature_error("gateway");
        }
        ServiceType::Exchange => {
            #[cfg(feature = "exchange")]
            {
                let process = exchange::ExchangeService::from_config(&_cfg.database, &_cfg.exchange)?;
                bootstrap(Arc::new(process), &_cfg.general).await?;
            }
            #[cfg(not(feature = "exchange"))]
            ui::print_feature_error("exchange");
        }
        ServiceType::Signal => {
            #[cfg(feature = "signal")]
            {
                let process = signal::SignalWorker::from_config(&_cfg.database, &_cfg.signal)?;
                bootstrap(Arc::new(process), &_cfg.general).await?;
            }
            #[cfg(not(feature = "signal"))]
            ui::print_feature_error("signal");
        }
    }
    Ok(())
}

#[allow(dead_code)]
async fn bootstrap(process: Arc<dyn HttpServerProcess>, settings: &GeneralConfig) -> Result<()> {
    let server_config = HttpServerConfig {
        addr: settings.server_addr.clone(),
        metrics_addr: settings.metrics_addr.clone(),
        ..Default::default()
    };

    HttpServer::from_config(server_config)
        .with_processes(vec![process])
        .run()
        .await
        .context("HTTP Server failed")
}
