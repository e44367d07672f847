use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Client WebSocket listener (`/ws/market`); separate from the
    /// liveness/metrics listeners.
    #[serde(default = "default_ws_addr")]
    pub ws_addr: String,
    /// Enqueue a `system.fetch_exchange_info` task on startup so symbol
    /// search works on a fresh database.
    #[serde(default = "default_true")]
    pub bootstrap_exchange_info: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            ws_addr: default_ws_addr(),
            bootstrap_exchange_info: true,
        }
    }
}

fn default_ws_addr() -> String {
    "0.0.0.0:8800".to_owned()
}

fn default_true() -> bool {
    true
}
