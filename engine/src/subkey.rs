use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::interval::Interval;

/// Prefix of gateway-local signal keys. These are routed to client sessions
/// only; they are never persisted to the realtime table and never forwarded
/// upstream.
pub const SIGNAL_PREFIX: &str = "SIGNAL:";

/// Returns true for `SIGNAL:*`-class keys.
#[must_use]
pub fn is_signal_key(key: &str) -> bool {
    key.starts_with(SIGNAL_PREFIX)
}

/// Canonical identifier of one upstream data series.
///
/// Shape: `EXCHANGE:SYMBOL[.PERP]@CHANNEL[_PARAM]`, e.g.
/// `BINANCE:BTCUSDT@KLINE_1`, `BINANCE:ETHUSDT.PERP@QUOTES`,
/// `BINANCE:ACCOUNT@SPOT`. The formatted key is the primary key of the
/// realtime table and the routing key for client broadcast, so parsing and
/// formatting must round-trip exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub exchange: String,
    pub symbol: String,
    pub perp: bool,
    pub channel: DataChannel,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataChannel {
    Kline(Interval),
    Quotes,
    Trade,
    Account(AccountKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountKind {
    Spot,
    Futures,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseKeyError {
    #[error("missing ':' exchange separator in {0:?}")]
    MissingExchange(String),
    #[error("missing '@' channel separator in {0:?}")]
    MissingChannel(String),
    #[error("empty segment in {0:?}")]
    EmptySegment(String),
    #[error("unknown data channel {0:?}")]
    UnknownChannel(String),
    #[error("invalid kline interval {0:?}")]
    InvalidInterval(String),
}

impl SubscriptionKey {
    #[must_use]
    pub fn kline(exchange: &str, symbol: &str, interval: Interval) -> Self {
        let (symbol, perp) = match symbol.strip_suffix(".PERP") {
            Some(base) => (base, true),
            None => (symbol, false),
        };
        Self {
            exchange: exchange.to_owned(),
            symbol: symbol.to_owned(),
            perp,
            channel: DataChannel::Kline(interval),
        }
    }

    /// The `data_type` column value of the realtime table.
    #[must_use]
    pub fn data_type(&self) -> &'static str {
        match self.channel {
            DataChannel::Kline(_) => "KLINE",
            DataChannel::Quotes => "QUOTES",
            DataChannel::Trade => "TRADE",
            DataChannel::Account(_) => "ACCOUNT",
        }
    }

    /// Symbol with the exchange prefix and product suffix restored,
    /// e.g. `BINANCE:BTCUSDT.PERP`.
    #[must_use]
    pub fn qualified_symbol(&self) -> String {
        if self.perp {
            format!("{}:{}.PERP", self.exchange, self.symbol)
        } else {
            format!("{}:{}", self.exchange, self.symbol)
        }
    }

    #[must_use]
    pub fn interval(&self) -> Option<&Interval> {
        match &self.channel {
            DataChannel::Kline(interval) => Some(interval),
            _ => None,
        }
    }
}

impl FromStr for SubscriptionKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (exchange, rest) = s
            .split_once(':')
            .ok_or_else(|| ParseKeyError::MissingExchange(s.to_owned()))?;
        let (symbol_part, channel_part) = rest
            .split_once('@')
            .ok_or_else(|| ParseKeyError::MissingChannel(s.to_owned()))?;

        if exchange.is_empty() || symbol_part.is_empty() || channel_part.is_empty() {
            return Err(ParseKeyError::EmptySegment(s.to_owned()));
        }

        let (symbol, perp) = match symbol_part.strip_suffix(".PERP") {
            Some(base) => (base.to_owned(), true),
            None => (symbol_part.to_owned(), false),
        };

        let channel = match channel_part {
            "QUOTES" => DataChannel::Quotes,
            "TRADE" => DataChannel::Trade,
            "SPOT" | "FUTURES" if symbol == "ACCOUNT" => DataChannel::Account(
                channel_part
                    .parse()
                    .map_err(|_| ParseKeyError::UnknownChannel(channel_part.to_owned()))?,
            ),
            other => match other.strip_prefix("KLINE_") {
                Some(resolution) => DataChannel::Kline(
                    resolution
                        .parse()
                        .map_err(|_| ParseKeyError::InvalidInterval(resolution.to_owned()))?,
                ),
                None => return Err(ParseKeyError::UnknownChannel(other.to_owned())),
            },
        };

        Ok(Self {
            exchange: exchange.to_owned(),
            symbol,
            perp,
            channel,
        })
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.exchange, self.symbol)?;
        if self.perp {
            f.write_str(".PERP")?;
        }
        match &self.channel {
            DataChannel::Kline(interval) => write!(f, "@KLINE_{interval}"),
            DataChannel::Quotes => f.write_str("@QUOTES"),
            DataChannel::Trade => f.write_str("@TRADE"),
            DataChannel::Account(kind) => write!(f, "@{kind}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_parse_kline_key() -> anyhow::Result<()> {
        let key: SubscriptionKey = "BINANCE:BTCUSDT@KLINE_1".parse()?;
        assert_eq!(key.exchange, "BINANCE");
        assert_eq!(key.symbol, "BTCUSDT");
        assert!(!key.perp);
        assert_eq!(key.data_type(), "KLINE");
        assert_eq!(key.interval().map(Interval::as_str), Some("1"));
        Ok(())
    }

    #[test]
    fn test_parse_perp_and_account() -> anyhow::Result<()> {
        let key: SubscriptionKey = "BINANCE:BTCUSDT.PERP@QUOTES".parse()?;
        assert!(key.perp);
        assert_eq!(key.qualified_symbol(), "BINANCE:BTCUSDT.PERP");

        let key: SubscriptionKey = "BINANCE:ACCOUNT@SPOT".parse()?;
        assert_eq!(key.channel, DataChannel::Account(AccountKind::Spot));
        assert_eq!(key.data_type(), "ACCOUNT");
        Ok(())
    }

    #[test]
    fn test_rejects_malformed() {
        assert!("BTCUSDT@KLINE_1".parse::<SubscriptionKey>().is_err());
        assert!("BINANCE:BTCUSDT".parse::<SubscriptionKey>().is_err());
        assert!("BINANCE:BTCUSDT@DEPTH".parse::<SubscriptionKey>().is_err());
        assert!("BINANCE:BTCUSDT@KLINE_1h".parse::<SubscriptionKey>().is_err());
        // SPOT/FUTURES channels are only valid on the ACCOUNT pseudo-symbol.
        assert!("BINANCE:BTCUSDT@SPOT".parse::<SubscriptionKey>().is_err());
    }

    #[test]
    fn test_signal_keys_detected() {
        assert!(is_signal_key("SIGNAL:abc"));
        assert!(is_signal_key("SIGNAL:*"));
        assert!(!is_signal_key("BINANCE:BTCUSDT@KLINE_1"));
    }

    fn arb_key() -> impl Strategy<Value = String> {
        let exchange = prop_oneof!["BINANCE", "OKX", "BYBIT"];
        let symbol = "[A-Z]{2,10}";
        let perp = prop_oneof![Just(""), Just(".PERP")];
        let channel = prop_oneof![
            "(1|3|5|15|30|45|60|120|240|360|720)".prop_map(|r| format!("KLINE_{r}")),
            Just("KLINE_D".to_owned()),
            Just("KLINE_1D".to_owned()),
            Just("KLINE_W".to_owned()),
            Just("KLINE_M".to_owned()),
            Just("QUOTES".to_owned()),
            Just("TRADE".to_owned()),
        ];
        (exchange, symbol, perp, channel)
            .prop_map(|(e, s, p, c)| format!("{e}:{s}{p}@{c}"))
    }

    proptest! {
        // Formatting a parsed key yields the original string.
        #[test]
        fn prop_key_round_trip(raw in arb_key()) {
            let key: SubscriptionKey = raw.parse().unwrap();
            prop_assert_eq!(key.to_string(), raw);
        }
    }

    proptest! {
        #[test]
        fn prop_account_round_trip(kind in prop_oneof![Just("SPOT"), Just("FUTURES")]) {
            let raw = format!("BINANCE:ACCOUNT@{kind}");
            let key: SubscriptionKey = raw.parse().unwrap();
            prop_assert_eq!(key.to_string(), raw);
        }
    }
}
