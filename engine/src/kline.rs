use serde::{Deserialize, Serialize};

/// One TradingView-facing candle. `time` is the open time in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A `KLINES_DATA` payload body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bars {
    pub symbol: String,
    pub interval: String,
    pub bars: Vec<Bar>,
    pub count: usize,
    pub no_data: bool,
}

impl Bars {
    #[must_use]
    pub fn new(symbol: impl Into<String>, interval: impl Into<String>, bars: Vec<Bar>) -> Self {
        let count = bars.len();
        Self {
            symbol: symbol.into(),
            interval: interval.into(),
            bars,
            count,
            no_data: count == 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bars_counts_and_flags() {
        let bars = Bars::new("BINANCE:BTCUSDT", "60", vec![]);
        assert_eq!(bars.count, 0);
        assert!(bars.no_data);

        let bar = Bar {
            time: 0,
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 10.0,
        };
        let bars = Bars::new("BINANCE:BTCUSDT", "60", vec![bar]);
        assert_eq!(bars.count, 1);
        assert!(!bars.no_data);

        let json = serde_json::to_value(&bars).unwrap();
        assert_eq!(json["noData"], serde_json::json!(false));
        assert_eq!(json["bars"][0]["close"], serde_json::json!(1.5));
    }
}
