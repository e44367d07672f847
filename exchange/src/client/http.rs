use anyhow::{anyhow, bail};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::config::HttpConfig;

/// Thin wrapper around a tuned `reqwest::Client` bound to one API host.
#[derive(Clone)]
pub struct Client {
    host: String,
    inner_client: reqwest::Client,
}

impl Client {
    pub fn new(host: impl Into<String>, http_config: &HttpConfig) -> anyhow::Result<Self> {
        let client = Self {
            host: host.into(),
            inner_client: reqwest::Client::builder()
                .connect_timeout(http_config.connect_timeout)
                .pool_idle_timeout(http_config.pool_idle_timeout)
                .pool_max_idle_per_host(http_config.pool_max_idle_per_host)
                .tcp_keepalive(http_config.tcp_keepalive)
                .tcp_keepalive_interval(http_config.tcp_keepalive_interval)
                .tcp_keepalive_retries(http_config.tcp_keepalive_retries)
                .build()?,
        };

        Ok(client)
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> anyhow::Result<T> {
        let request = self
            .inner_client
            .get(format!("{}{path}", self.host))
            .query(query)
            .build()?;

        let response = self.inner_client.execute(request).await?;
        response_handler(response).await
    }

    /// GET with a pre-built query string. The signed endpoints need this:
    /// the signature is computed over the exact encoded query.
    pub async fn get_raw_query<T: DeserializeOwned>(
        &self,
        path: &str,
        raw_query: &str,
        headers: reqwest::header::HeaderMap,
    ) -> anyhow::Result<T> {
        let url = format!("{}{path}?{raw_query}", self.host);
        let request = self.inner_client.get(url).headers(headers).build()?;

        let response = self.inner_client.execute(request).await?;
        response_handler(response).await
    }
}

async fn response_handler<T: DeserializeOwned>(resp: Response) -> anyhow::Result<T> {
    match resp.status() {
        StatusCode::OK => resp.json::<T>().await.map_err(|e| anyhow!(e)),
        StatusCode::INTERNAL_SERVER_ERROR => {
            bail!("Internal Server Error");
        }
        StatusCode::SERVICE_UNAVAILABLE => {
            bail!("Service Unavailable");
        }
        StatusCode::UNAUTHORIZED => {
            bail!("Unauthorized");
        }
        code => {
            bail!(format!(
                "Received error: code={} msg={}",
                code,
                resp.text().await.map_err(|e| anyhow!(e))?
            ));
        }
    }
}
