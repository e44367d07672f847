use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SignalConfig {
    /// Override the strategy frame depth; defaults to [`crate::REQUIRED_KLINES`].
    #[serde(default)]
    pub required_klines: Option<usize>,
}
