pub mod interval;
pub mod kline;
pub mod notify;
pub mod protocol;
pub mod subkey;

pub use interval::Interval;
pub use kline::{Bar, Bars};
pub use notify::{Channel, Envelope};
pub use protocol::{ClientRequest, RequestKind, ServerFrame, error_code};
pub use subkey::{DataChannel, SubscriptionKey, is_signal_key};
