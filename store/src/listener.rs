use std::str::FromStr;

use engine::{Channel, Envelope};
use futures_util::{StreamExt, stream};
use tokio::sync::mpsc;
use tokio_postgres::{AsyncMessage, NoTls};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One decoded notification from the bus.
#[derive(Debug, Clone)]
pub struct NotifyEvent {
    pub channel: Channel,
    pub envelope: Envelope,
}

/// LISTEN side of the notify bus.
///
/// Owns a dedicated `tokio_postgres` connection — never one from the pool,
/// since pool recycling would silently drop the LISTEN registrations. On
/// connection loss it reconnects with a fixed 2 s back-off, forever, and
/// re-issues every LISTEN.
pub struct NotifyListener {
    dsn: String,
    channels: Vec<Channel>,
}

const RECONNECT_BACKOFF: std::time::Duration = std::time::Duration::from_secs(2);

impl NotifyListener {
    #[must_use]
    pub fn new(dsn: impl Into<String>, channels: Vec<Channel>) -> Self {
        Self {
            dsn: dsn.into(),
            channels,
        }
    }

    /// Listens on all eleven channels.
    #[must_use]
    pub fn all_channels(dsn: impl Into<String>) -> Self {
        Self::new(dsn, Channel::ALL.to_vec())
    }

    /// Runs until cancelled, forwarding decoded events into `tx`.
    ///
    /// Malformed payloads are logged and dropped; the listener itself never
    /// dies on bad input.
    pub async fn run(
        &self,
        tx: mpsc::UnboundedSender<NotifyEvent>,
        token: CancellationToken,
    ) -> anyhow::Result<()> {
        loop {
            if token.is_cancelled() {
                return Ok(());
            }

            match self.listen_once(&tx, &token).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("Notify connection lost: {e:#}, reconnecting");
                    tokio::select! {
                        _ = token.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(RECONNECT_BACKOFF) => {}
                    }
                }
            }
        }
    }

    /// One connection lifetime: connect, LISTEN, pump notifications until the
    /// connection drops (Err) or the token fires (Ok).
    async fn listen_once(
        &self,
        tx: &mpsc::UnboundedSender<NotifyEvent>,
        token: &CancellationToken,
    ) -> anyhow::Result<()> {
        let (client, mut connection) = tokio_postgres::connect(&self.dsn, NoTls).await?;

        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel();
        let pump = tokio::spawn(async move {
            let mut messages = stream::poll_fn(move |cx| connection.poll_message(cx));
            while let Some(message) = messages.next().await {
                match message {
                    Ok(AsyncMessage::Notification(notification)) => {
                        if raw_tx.send(notification).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("Notify connection error: {e}");
                        break;
                    }
                }
            }
        });

        // Channel names contain dots, so they must be quoted identifiers.
        for channel in &self.channels {
            client.batch_execute(&format!("LISTEN \"{channel}\"")).await?;
        }
        info!(channels = self.channels.len(), "Notify listener subscribed");

        let result = loop {
            tokio::select! {
                _ = token.cancelled() => break Ok(()),
                raw = raw_rx.recv() => {
                    let Some(raw) = raw else {
                        break Err(anyhow::anyhow!("notification stream ended"));
                    };
                    forward(raw, tx);
                }
            }
        };

        pump.abort();
        result
    }
}

fn forward(raw: tokio_postgres::Notification, tx: &mpsc::UnboundedSender<NotifyEvent>) {
    let Ok(channel) = Channel::from_str(raw.channel()) else {
        debug!(channel = raw.channel(), "Ignoring unknown notify channel");
        return;
    };

    match Envelope::parse(raw.payload()) {
        Ok(envelope) => {
            let _ = tx.send(NotifyEvent { channel, envelope });
        }
        Err(e) => {
            // Log and drop: one bad payload must not take the bus down.
            error!(channel = %channel, "Failed to parse notify payload: {e}");
        }
    }
}
