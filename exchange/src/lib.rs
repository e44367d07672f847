pub mod client;
pub mod config;
pub mod ingest;
pub mod multiplexer;
pub mod service;
pub mod worker;

pub use config::ExchangeConfig;
pub use service::ExchangeService;

/// Subscriber-service identifier written into `realtime_data.subscribers`
/// for rows the adapter itself registers (account snapshots).
pub const SUBSCRIBER_ID: &str = "exchange-adapter";
