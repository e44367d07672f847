use std::{collections::HashSet, sync::Arc};

use engine::{DataChannel, SubscriptionKey, is_signal_key};
use store::RealtimeRepo;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::MarketStream;

/// Which upstream socket a series lives on. Routed by the `.PERP` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Market {
    Spot,
    Futures,
}

/// Upstream stream name for a subscription key, e.g.
/// `BINANCE:BTCUSDT@KLINE_1` -> `btcusdt@kline_1m`. Account keys have no
/// market stream.
#[must_use]
pub fn stream_name(key: &SubscriptionKey) -> Option<String> {
    let symbol = key.symbol.to_lowercase();
    match &key.channel {
        DataChannel::Kline(interval) => Some(format!("{symbol}@kline_{}", interval.to_binance())),
        DataChannel::Quotes => Some(format!("{symbol}@ticker")),
        DataChannel::Trade => Some(format!("{symbol}@trade")),
        DataChannel::Account(_) => None,
    }
}

#[must_use]
pub fn market_of(key: &SubscriptionKey) -> Market {
    if key.perp { Market::Futures } else { Market::Spot }
}

/// Fans client-level subscription keys into a single upstream subscription
/// per stream, and reconciles after reconnects.
pub struct StreamMultiplexer {
    spot: Arc<MarketStream>,
    futures: Arc<MarketStream>,
    realtime: RealtimeRepo,
    spot_subscribed: Mutex<HashSet<String>>,
    futures_subscribed: Mutex<HashSet<String>>,
}

impl StreamMultiplexer {
    #[must_use]
    pub fn new(spot: Arc<MarketStream>, futures: Arc<MarketStream>, realtime: RealtimeRepo) -> Self {
        Self {
            spot,
            futures,
            realtime,
            spot_subscribed: Mutex::new(HashSet::new()),
            futures_subscribed: Mutex::new(HashSet::new()),
        }
    }

    /// `subscription.add`: subscribe upstream unless the stream is already
    /// live. Duplicate notifications are absorbed by the subscribed set.
    pub async fn handle_add(&self, raw_key: &str) -> anyhow::Result<()> {
        let Some((market, stream)) = self.route(raw_key) else {
            return Ok(());
        };

        let mut subscribed = self.subscribed(market).lock().await;
        if subscribed.contains(&stream) {
            debug!(stream, "Stream already subscribed");
            return Ok(());
        }

        self.socket(market).subscribe(&[stream.clone()]).await?;
        subscribed.insert(stream);
        Ok(())
    }

    /// `subscription.remove`: drop the upstream stream.
    pub async fn handle_remove(&self, raw_key: &str) -> anyhow::Result<()> {
        let Some((market, stream)) = self.route(raw_key) else {
            return Ok(());
        };

        let mut subscribed = self.subscribed(market).lock().await;
        if subscribed.remove(&stream) {
            self.socket(market).unsubscribe(&[stream]).await?;
        }
        Ok(())
    }

    /// `subscription.clean`: tear everything down (gateway restarted).
    pub async fn handle_clean(&self) -> anyhow::Result<()> {
        for market in [Market::Spot, Market::Futures] {
            let mut subscribed = self.subscribed(market).lock().await;
            let streams: Vec<String> = subscribed.drain().collect();
            if !streams.is_empty() {
                info!(?market, count = streams.len(), "Cleaning upstream subscriptions");
                self.socket(market).unsubscribe(&streams).await?;
            }
        }
        Ok(())
    }

    /// Post-reconnect reconciliation: diff the wanted set (realtime table)
    /// against what this socket believes is subscribed and emit the deltas.
    pub async fn full_sync(&self, market: Market) -> anyhow::Result<()> {
        let mut wanted: HashSet<String> = HashSet::new();
        for raw_key in self.realtime.all_keys().await? {
            if let Some((key_market, stream)) = self.route(&raw_key)
                && key_market == market
            {
                wanted.insert(stream);
            }
        }

        let mut subscribed = self.subscribed(market).lock().await;
        // A fresh connection has no live streams regardless of what the old
        // one had; resubscribe the whole wanted set.
        let stale: Vec<String> = subscribed.difference(&wanted).cloned().collect();
        let to_subscribe: Vec<String> = wanted.iter().cloned().collect();

        if !stale.is_empty() {
            self.socket(market).unsubscribe(&stale).await?;
        }
        if !to_subscribe.is_empty() {
            self.socket(market).subscribe(&to_subscribe).await?;
        }

        info!(
            ?market,
            wanted = wanted.len(),
            dropped = stale.len(),
            "Full sync complete"
        );
        *subscribed = wanted;
        Ok(())
    }

    /// Key -> (market, upstream stream). `SIGNAL:` keys never reach the
    /// realtime table, but guard anyway; account keys have no stream.
    fn route(&self, raw_key: &str) -> Option<(Market, String)> {
        if is_signal_key(raw_key) {
            return None;
        }
        let key: SubscriptionKey = match raw_key.parse() {
            Ok(key) => key,
            Err(e) => {
                warn!(raw_key, "Ignoring unroutable subscription key: {e}");
                return None;
            }
        };
        stream_name(&key).map(|stream| (market_of(&key), stream))
    }

    fn socket(&self, market: Market) -> &MarketStream {
        match market {
            Market::Spot => &self.spot,
            Market::Futures => &self.futures,
        }
    }

    fn subscribed(&self, market: Market) -> &Mutex<HashSet<String>> {
        match market {
            Market::Spot => &self.spot_subscribed,
            Market::Futures => &self.futures_subscribed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_name_mapping() -> anyhow::Result<()> {
        let key: SubscriptionKey = "BINANCE:BTCUSDT@KLINE_1".parse()?;
        assert_eq!(stream_name(&key).as_deref(), Some("btcusdt@kline_1m"));
        assert_eq!(market_of(&key), Market::Spot);

        let key: SubscriptionKey = "BINANCE:ETHUSDT.PERP@KLINE_240".parse()?;
        assert_eq!(stream_name(&key).as_deref(), Some("ethusdt@kline_4h"));
        assert_eq!(market_of(&key), Market::Futures);

        let key: SubscriptionKey = "BINANCE:BTCUSDT@QUOTES".parse()?;
        assert_eq!(stream_name(&key).as_deref(), Some("btcusdt@ticker"));

        let key: SubscriptionKey = "BINANCE:ACCOUNT@SPOT".parse()?;
        assert_eq!(stream_name(&key), None);
        Ok(())
    }
}
