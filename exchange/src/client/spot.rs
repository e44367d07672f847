use serde_json::Value;

use crate::client::{
    Client,
    models::{ExchangeInfoResponse, RawKline, ServerTime, Ticker24hr},
};

/// Public spot market endpoints.
#[derive(Clone)]
pub struct SpotApi {
    client: Client,
}

impl SpotApi {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// At most 1000 rows per call; callers page with
    /// `start_time = last close_time + 1`.
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

        self.client.get("/api/v3/klines", &query).await
    }

    /// Batch ticker fetch: one call for all symbols via the
    /// `symbols=["A","B"]` form.
    pub async fn get_24hr_tickers(&self, symbols: &[String]) -> anyhow::Result<Vec<Ticker24hr>> {
        let symbols_param = serde_json::to_string(symbols)?;
        let query = vec![("symbols", symbols_param)];

        self.client.get("/api/v3/ticker/24hr", &query).await
    }

    pub async fn get_server_time(&self) -> anyhow::Result<i64> {
        let time: ServerTime = self.client.get("/api/v3/time", &[]).await?;
        Ok(time.server_time)
    }

    pub async fn get_exchange_info(&self) -> anyhow::Result<ExchangeInfoResponse> {
        self.client.get("/api/v3/exchangeInfo", &[]).await
    }

    /// Liveness probe; an empty object on success.
    pub async fn ping(&self) -> anyhow::Result<Value> {
        self.client.get("/api/v3/ping", &[]).await
    }
}

#[cfg(test)]
mod tests {
    use crate::config::HttpConfig;

    use super::*;

    #[tokio::test]
    async fn test_get_klines_builds_query() -> anyhow::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v3/klines")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()),
                mockito::Matcher::UrlEncoded("interval".into(), "1h".into()),
                mockito::Matcher::UrlEncoded("limit".into(), "1000".into()),
                mockito::Matcher::UrlEncoded("startTime".into(), "1704067200000".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"[[1704067200000,"1","2","0.5","1.5","10",1704070799999,"15",3,"5","7.5","0"]]"#,
            )
            .create_async()
            .await;

        let api = SpotApi::new(Client::new(server.url(), &HttpConfig::default())?);
        let klines = api
            .get_klines("BTCUSDT", "1h", Some(1_704_067_200_000), None, 1000)
            .await?;

        mock.assert_async().await;
        assert_eq!(klines.len(), 1);
        assert_eq!(klines[0].open_time(), 1_704_067_200_000);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_24hr_tickers_batch() -> anyhow::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v3/ticker/24hr")
            .match_query(mockito::Matcher::UrlEncoded(
                "symbols".into(),
                r#"["BTCUSDT","ETHUSDT"]"#.into(),
            ))
            .with_status(200)
            .with_body(
                r#"[{"symbol":"BTCUSDT","lastPrice":"1.5","priceChange":"0.5",
                     "priceChangePercent":"50","highPrice":"2","lowPrice":"0.5",
                     "volume":"10","quoteVolume":"15","closeTime":1},
                    {"symbol":"ETHUSDT","lastPrice":"3","priceChange":"1",
                     "priceChangePercent":"50","highPrice":"4","lowPrice":"2",
                     "volume":"20","quoteVolume":"60","closeTime":2}]"#,
            )
            .create_async()
            .await;

        let api = SpotApi::new(Client::new(server.url(), &HttpConfig::default())?);
        let tickers = api
            .get_24hr_tickers(&["BTCUSDT".to_owned(), "ETHUSDT".to_owned()])
            .await?;

        mock.assert_async().await;
        assert_eq!(tickers.len(), 2);
        assert_eq!(tickers[1].symbol, "ETHUSDT");
        Ok(())
    }
}
