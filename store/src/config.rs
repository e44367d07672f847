use serde::Deserialize;

/// Database settings shared by all services.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Connection string, e.g. `postgresql://user:pass@db:5432/trading`.
    pub dsn: String,
    #[serde(default = "default_pool_size")]
    pub pool_max_size: usize,
    /// Run the embedded schema migrations on startup.
    #[serde(default = "default_true")]
    pub migrate: bool,
}

fn default_pool_size() -> usize {
    16
}

fn default_true() -> bool {
    true
}
