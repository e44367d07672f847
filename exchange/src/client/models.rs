use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::Deserialize;
use store::HistoryKline;

/// One k-line row from the REST endpoint: a 12-column array mixing integer
/// timestamps and decimal strings. The trailing column is unused.
#[derive(Debug, Clone, Deserialize)]
pub struct RawKline(
    pub i64,     // open time
    pub Decimal, // open
    pub Decimal, // high
    pub Decimal, // low
    pub Decimal, // close
    pub Decimal, // volume
    pub i64,     // close time
    pub Decimal, // quote asset volume
    pub i64,     // number of trades
    pub Decimal, // taker buy base volume
    pub Decimal, // taker buy quote volume
    pub serde_json::Value,
);

impl RawKline {
    #[must_use]
    pub fn open_time(&self) -> i64 {
        self.0
    }

    #[must_use]
    pub fn close_time(&self) -> i64 {
        self.6
    }

    #[must_use]
    pub fn to_history(&self) -> HistoryKline {
        HistoryKline {
            open_time: self.0,
            close_time: self.6,
            open: decimal_f64(self.1),
            high: decimal_f64(self.2),
            low: decimal_f64(self.3),
            close: decimal_f64(self.4),
            volume: decimal_f64(self.5),
            quote_volume: decimal_f64(self.7),
            trades: self.8,
            taker_buy_base_volume: decimal_f64(self.9),
            taker_buy_quote_volume: decimal_f64(self.10),
        }
    }
}

fn decimal_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

/// 24-hour rolling ticker; the fields the quotes converter consumes.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker24hr {
    pub symbol: String,
    pub last_price: Decimal,
    pub price_change: Decimal,
    pub price_change_percent: Decimal,
    pub high_price: Decimal,
    pub low_price: Decimal,
    pub volume: Decimal,
    pub quote_volume: Decimal,
    pub close_time: i64,
}

impl Ticker24hr {
    /// TradingView quote value object (`lp`, `ch`, `chp`, ...).
    #[must_use]
    pub fn to_quote_value(&self) -> serde_json::Value {
        serde_json::json!({
            "lp": decimal_f64(self.last_price),
            "ch": decimal_f64(self.price_change),
            "chp": decimal_f64(self.price_change_percent),
            "high": decimal_f64(self.high_price),
            "low": decimal_f64(self.low_price),
            "volume": decimal_f64(self.volume),
            "quote_volume": decimal_f64(self.quote_volume),
            "timestamp": self.close_time,
        })
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerTime {
    pub server_time: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfoResponse {
    pub symbols: Vec<SymbolDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolDescriptor {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_kline_parses_rest_row() -> anyhow::Result<()> {
        let raw: RawKline = serde_json::from_str(
            r#"[1704067200000,"42000.1","42100.5","41900.0","42050.2","12.5",
                1704070799999,"525000.0",1500,"6.2","260000.0","0"]"#,
        )?;
        assert_eq!(raw.open_time(), 1_704_067_200_000);
        assert_eq!(raw.close_time(), 1_704_070_799_999);

        let history = raw.to_history();
        assert_eq!(history.trades, 1500);
        assert!((history.open - 42000.1).abs() < 1e-9);
        assert!((history.volume - 12.5).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_ticker_to_quote_value() -> anyhow::Result<()> {
        let ticker: Ticker24hr = serde_json::from_str(
            r#"{"symbol":"BTCUSDT","lastPrice":"69104.31","priceChange":"30.92",
                "priceChangePercent":"0.045","highPrice":"69109.88","lowPrice":"69073.39",
                "volume":"2.0217","quoteVolume":"139701.82","closeTime":1770640694074}"#,
        )?;
        let value = ticker.to_quote_value();
        assert_eq!(value["lp"], serde_json::json!(69104.31));
        assert_eq!(value["timestamp"], serde_json::json!(1_770_640_694_074_i64));
        Ok(())
    }
}
