pub mod cache;
pub mod config;
pub mod indicators;
pub mod service;
pub mod strategy;
pub mod triggers;
pub mod validator;

pub use config::SignalConfig;
pub use service::SignalWorker;

/// Subscriber-service identifier the worker writes into
/// `realtime_data.subscribers`.
pub const SUBSCRIBER_ID: &str = "signal-worker";

/// Closed k-lines a strategy frame must hold before evaluation.
pub const REQUIRED_KLINES: usize = 280;
