pub mod config;
pub mod listener;
pub mod migrations;
pub mod pool;
pub mod repo;

pub use config::StoreConfig;
pub use listener::{NotifyEvent, NotifyListener};
pub use pool::{Pool, build_pool, publish};
pub use repo::{
    account::AccountRepo,
    alerts::{AlertConfig, AlertConfigPatch, AlertsRepo},
    exchange_info::{ExchangeInfoRepo, ExchangeSymbol},
    klines::{HistoryKline, KlinesRepo},
    realtime::{RealtimeRepo, RealtimeRow},
    signals::{SignalRecord, SignalRow, SignalsRepo},
    tasks::{TaskRow, TasksRepo},
};
