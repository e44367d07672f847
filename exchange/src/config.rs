use std::time::Duration;

use serde::Deserialize;

/// Upstream endpoints and credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_spot_api_url")]
    pub spot_api_url: String,
    #[serde(default = "default_futures_api_url")]
    pub futures_api_url: String,
    #[serde(default = "default_spot_ws_url")]
    pub spot_ws_url: String,
    #[serde(default = "default_futures_ws_url")]
    pub futures_ws_url: String,
    /// API key/secret for the signed account endpoints. Snapshot tasks fail
    /// with a descriptive error when unset.
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub secret_key: String,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            spot_api_url: default_spot_api_url(),
            futures_api_url: default_futures_api_url(),
            spot_ws_url: default_spot_ws_url(),
            futures_ws_url: default_futures_ws_url(),
            api_key: String::new(),
            secret_key: String::new(),
        }
    }
}

fn default_spot_api_url() -> String {
    "https://api.binance.com".to_owned()
}

fn default_futures_api_url() -> String {
    "https://fapi.binance.com".to_owned()
}

fn default_spot_ws_url() -> String {
    "wss://stream.binance.com:9443/ws".to_owned()
}

fn default_futures_ws_url() -> String {
    "wss://fstream.binance.com/ws".to_owned()
}

/// Connection-pool tuning for the upstream HTTP clients.
#[derive(Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub tcp_keepalive: Duration,
    pub tcp_keepalive_interval: Duration,
    pub tcp_keepalive_retries: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(120),
            pool_max_idle_per_host: 5,
            tcp_keepalive: Duration::from_secs(120),
            tcp_keepalive_interval: Duration::from_secs(30),
            tcp_keepalive_retries: 5,
        }
    }
}
