use chrono::{DateTime, TimeZone, Utc};
use engine::{Interval, SubscriptionKey};
use serde_json::Value;
use store::RealtimeRepo;
use tracing::{debug, warn};

use crate::multiplexer::Market;

/// Writes upstream frames into the realtime table. The adapter is the only
/// payload writer per key; every write fires `realtime.update` through the
/// table trigger, which is what fans the frame out to gateway and worker.
#[derive(Clone)]
pub struct Ingestor {
    realtime: RealtimeRepo,
}

impl Ingestor {
    #[must_use]
    pub fn new(realtime: RealtimeRepo) -> Self {
        Self { realtime }
    }

    pub async fn handle_event(&self, market: Market, event: Value) -> anyhow::Result<()> {
        let Some(key) = subscription_key_for(&event, market) else {
            debug!("Dropping unroutable upstream event");
            return Ok(());
        };

        let event_time = event
            .get("E")
            .and_then(Value::as_i64)
            .and_then(ms_to_utc);

        // No row means nobody subscribed (e.g. a frame raced an
        // unsubscribe); dropping it is correct.
        let updated = self
            .realtime
            .update_data(&key.to_string(), &event, event_time)
            .await?;
        if !updated {
            debug!(key = %key, "No realtime row for event, dropped");
        } else {
            metrics::counter!("exchange_frames_ingested").increment(1);
        }
        Ok(())
    }
}

/// Derives the routing key from a market frame: `e` is the event kind,
/// `s` the symbol, and for k-lines `k.i` the Binance interval.
#[must_use]
pub fn subscription_key_for(event: &Value, market: Market) -> Option<SubscriptionKey> {
    let kind = event.get("e")?.as_str()?;
    let symbol = event.get("s")?.as_str()?;
    let perp_suffix = match market {
        Market::Futures => ".PERP",
        Market::Spot => "",
    };
    let qualified = format!("{symbol}{perp_suffix}");

    match kind {
        "kline" => {
            let binance_interval = event.get("k")?.get("i")?.as_str()?;
            let interval = match Interval::from_binance(binance_interval) {
                Ok(interval) => interval,
                Err(e) => {
                    warn!("Unmappable kline interval: {e}");
                    return None;
                }
            };
            Some(SubscriptionKey::kline("BINANCE", &qualified, interval))
        }
        "24hrTicker" => format!("BINANCE:{qualified}@QUOTES").parse().ok(),
        "trade" => format!("BINANCE:{qualified}@TRADE").parse().ok(),
        _ => None,
    }
}

fn ms_to_utc(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kline_frame_routing() {
        let event = serde_json::json!({
            "e": "kline",
            "E": 1770640681000_i64,
            "s": "BTCUSDT",
            "k": {"i": "1m", "t": 1770640680000_i64, "x": false}
        });
        let key = subscription_key_for(&event, Market::Spot).unwrap();
        assert_eq!(key.to_string(), "BINANCE:BTCUSDT@KLINE_1");

        let key = subscription_key_for(&event, Market::Futures).unwrap();
        assert_eq!(key.to_string(), "BINANCE:BTCUSDT.PERP@KLINE_1");
    }

    #[test]
    fn test_ticker_and_trade_routing() {
        let ticker = serde_json::json!({"e": "24hrTicker", "s": "ETHUSDT"});
        let key = subscription_key_for(&ticker, Market::Spot).unwrap();
        assert_eq!(key.to_string(), "BINANCE:ETHUSDT@QUOTES");

        let trade = serde_json::json!({"e": "trade", "s": "ETHUSDT"});
        let key = subscription_key_for(&trade, Market::Spot).unwrap();
        assert_eq!(key.to_string(), "BINANCE:ETHUSDT@TRADE");

        let unknown = serde_json::json!({"e": "depthUpdate", "s": "ETHUSDT"});
        assert!(subscription_key_for(&unknown, Market::Spot).is_none());
    }
}
