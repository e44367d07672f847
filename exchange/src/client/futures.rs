use futures_util::future::join_all;

use crate::client::{
    Client,
    models::{ExchangeInfoResponse, RawKline, Ticker24hr},
};

/// Public USD-M perpetual futures endpoints. Unlike spot, the ticker
/// endpoint takes a single symbol per call, so batch fetches fan out.
#[derive(Clone)]
pub struct FuturesApi {
    client: Client,
}

impl FuturesApi {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        start_time: Option<i64>,
        end_time: Option<i64>,
        limit: usize,
    ) -> anyhow::Result<Vec<RawKline>> {
        let mut query: Vec<(&str, String)> = vec![
            ("symbol", symbol.to_owned()),
            ("interval", interval.to_owned()),
            ("limit", limit.to_string()),
        ];
        if let Some(v) = start_time {
            query.push(("startTime", v.to_string()));
        }
        if let Some(v) = end_time {
            query.push(("endTime", v.to_string()));
        }

        self.client.get("/fapi/v1/klines", &query).await
    }

    pub async fn get_24hr_ticker(&self, symbol: &str) -> anyhow::Result<Ticker24hr> {
        let query = vec![("symbol", symbol.to_owned())];
        self.client.get("/fapi/v1/ticker/24hr", &query).await
    }

    /// Concurrent per-symbol fetch; one failing symbol fails the batch so
    /// the task surfaces the upstream error.
    pub async fn get_24hr_tickers(&self, symbols: &[String]) -> anyhow::Result<Vec<Ticker24hr>> {
        let futures = symbols.iter().map(|symbol| self.get_24hr_ticker(symbol));
        join_all(futures).await.into_iter().collect()
    }

    pub async fn get_exchange_info(&self) -> anyhow::Result<ExchangeInfoResponse> {
        self.client.get("/fapi/v1/exchangeInfo", &[]).await
    }
}
