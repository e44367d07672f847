pub mod futures;
pub mod http;
pub mod models;
pub mod private;
pub mod spot;
pub mod stream;

pub use futures::FuturesApi;
pub use http::Client;
pub use private::PrivateApi;
pub use spot::SpotApi;
pub use stream::{MarketStream, StreamSignal};
