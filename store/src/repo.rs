pub mod account;
pub mod alerts;
pub mod exchange_info;
pub mod klines;
pub mod realtime;
pub mod signals;
pub mod tasks;
