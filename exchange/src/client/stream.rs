use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use anyhow::bail;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use serde_json::Value;
use tokio::{
    net::TcpStream,
    sync::{Mutex, mpsc},
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

/// Type alias for the WebSocket sink (writer).
type Writer = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Type alias for the WebSocket stream (reader).
type Reader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

const RECONNECT_BACKOFF: std::time::Duration = std::time::Duration::from_secs(2);

/// What a market stream reports to its owner.
#[derive(Debug)]
pub enum StreamSignal {
    /// Emitted after every successful (re)connect. The multiplexer answers
    /// with a full sync, which re-subscribes everything that is wanted.
    Connected,
    /// One upstream market-data frame, untouched.
    Event(Value),
}

/// One upstream market-data socket (spot or futures).
///
/// Owns the connection lifecycle: connect, read, reconnect forever on loss
/// with a fixed back-off. Subscribe/unsubscribe frames can be submitted from
/// other tasks at any time; while disconnected they are dropped, which is
/// safe because the post-reconnect full sync replays the wanted set.
pub struct MarketStream {
    name: &'static str,
    ws_url: String,
    writer: Arc<Mutex<Option<Writer>>>,
    request_id: AtomicU64,
}

impl MarketStream {
    #[must_use]
    pub fn new(name: &'static str, ws_url: String) -> Self {
        Self {
            name,
            ws_url,
            writer: Arc::new(Mutex::new(None)),
            request_id: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Submits a SUBSCRIBE frame for the given stream names.
    pub async fn subscribe(&self, streams: &[String]) -> anyhow::Result<()> {
        if streams.is_empty() {
            return Ok(());
        }
        info!(socket = self.name, ?streams, "Subscribing upstream");
        self.send_control("SUBSCRIBE", streams).await
    }

    /// Submits an UNSUBSCRIBE frame for the given stream names.
    pub async fn unsubscribe(&self, streams: &[String]) -> anyhow::Result<()> {
        if streams.is_empty() {
            return Ok(());
        }
        info!(socket = self.name, ?streams, "Unsubscribing upstream");
        self.send_control("UNSUBSCRIBE", streams).await
    }

    async fn send_control(&self, method: &str, streams: &[String]) -> anyhow::Result<()> {
        let frame = serde_json::json!({
            "method": method,
            "params": streams,
            "id": self.request_id.fetch_add(1, Ordering::Relaxed),
        });

        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(writer) => {
                writer.send(Message::Text(frame.to_string().into())).await?;
                Ok(())
            }
            None => {
                // Not connected; the reconnect full sync will replay this.
                debug!(socket = self.name, "Dropping {method} while disconnected");
                Ok(())
            }
        }
    }

    /// Connect/read/reconnect loop. Runs until cancelled; there is no retry
    /// cap and the back-off is fixed.
    pub async fn run(
        &self,
        signals: mpsc::UnboundedSender<StreamSignal>,
        token: CancellationToken,
    ) -> anyhow::Result<()> {
        let url = Url::parse(self.ws_url.as_str())?;

        loop {
            if token.is_cancelled() {
                return Ok(());
            }

            match connect_async(url.as_str()).await {
                Ok((stream, _)) => {
                    info!(socket = self.name, "Upstream socket connected");
                    let (writer, reader) = stream.split();
                    *self.writer.lock().await = Some(writer);

                    if signals.send(StreamSignal::Connected).is_err() {
                        return Ok(());
                    }

                    if let Err(e) = self.read_loop(reader, &signals, &token).await {
                        warn!(socket = self.name, "Upstream socket lost: {e:#}");
                    }
                    *self.writer.lock().await = None;

                    if token.is_cancelled() {
                        return Ok(());
                    }
                }
                Err(e) => {
                    warn!(socket = self.name, "Upstream connect failed: {e}");
                }
            }

            tokio::select! {
                _ = token.cancelled() => return Ok(()),
                _ = tokio::time::sleep(RECONNECT_BACKOFF) => {}
            }
        }
    }

    async fn read_loop(
        &self,
        mut reader: Reader,
        signals: &mpsc::UnboundedSender<StreamSignal>,
        token: &CancellationToken,
    ) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    let mut writer = self.writer.lock().await;
                    if let Some(ref mut writer) = *writer {
                        let _ = writer.send(Message::Close(None)).await;
                    }
                    return Ok(());
                }
                message = reader.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text_message(&text, signals);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let mut writer = self.writer.lock().await;
                            if let Some(ref mut writer) = *writer
                                && let Err(e) = writer.send(Message::Pong(data)).await
                            {
                                error!(socket = self.name, "Failed to send pong: {e:?}");
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            debug!(socket = self.name, "Upstream closed: {frame:?}");
                            bail!("closed by upstream");
                        }
                        Some(Err(e)) => bail!("read error: {e}"),
                        None => bail!("stream ended"),
                        _ => {}
                    }
                }
            }
        }
    }

    fn handle_text_message(&self, text: &str, signals: &mpsc::UnboundedSender<StreamSignal>) {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                error!(socket = self.name, "Failed to parse upstream frame: {e} - {text:?}");
                return;
            }
        };

        // Control acknowledgements look like {"result": null, "id": n}.
        if value.get("id").is_some() && value.get("result").is_some() {
            debug!(socket = self.name, "Upstream control acknowledged");
            return;
        }

        let _ = signals.send(StreamSignal::Event(value));
    }
}
