use std::path::Path;

use serde::Deserialize;
use tools::toml;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub general: GeneralConfig,
    pub database: store::StoreConfig,

    #[cfg(feature = "gateway")]
    #[serde(default)]
    pub gateway: gateway::GatewayConfig,

    #[cfg(feature = "exchange")]
    #[serde(default)]
    pub exchange: exchange::ExchangeConfig,

    #[cfg(feature = "signal")]
    #[serde(default)]
    pub signal: signal::SignalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    pub server_addr: String,
    pub metrics_addr: String,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        toml::parse_file::<Self>(path)
    }
}
