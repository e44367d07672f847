use serde_json::{Value, json};

/// Translates a stored upstream payload into the client-facing shape before
/// broadcast. Keyed by the realtime row's `data_type`.
#[must_use]
pub fn to_client_content(data_type: &str, data: &Value) -> Value {
    match data_type {
        "KLINE" => convert_kline(data),
        "QUOTES" => convert_quotes(data),
        // Trades and account documents are forwarded as-is.
        _ => data.clone(),
    }
}

/// Binance kline frame -> `{time, open, high, low, close, volume}`.
fn convert_kline(data: &Value) -> Value {
    let k = data.get("k").unwrap_or(data);
    json!({
        "time": k.get("t").cloned().unwrap_or(Value::Null),
        "open": to_f64(k.get("o")),
        "high": to_f64(k.get("h")),
        "low": to_f64(k.get("l")),
        "close": to_f64(k.get("c")),
        "volume": to_f64(k.get("v")),
    })
}

/// Binance 24hr ticker frame -> TradingView quote value.
fn convert_quotes(data: &Value) -> Value {
    let symbol = data.get("s").and_then(Value::as_str).unwrap_or_default();
    let ask = to_f64(data.get("a"));
    let bid = to_f64(data.get("b"));
    let spread = match (ask, bid) {
        (Some(ask), Some(bid)) => Some(ask - bid),
        _ => None,
    };

    json!({
        "n": format!("BINANCE:{symbol}"),
        "s": "ok",
        "v": {
            "ch": to_f64(data.get("p")),
            "chp": to_f64(data.get("P")),
            "lp": to_f64(data.get("c")),
            "ask": ask,
            "bid": bid,
            "spread": spread,
            "volume": to_f64(data.get("v")),
            "high": to_f64(data.get("h")),
            "low": to_f64(data.get("l")),
        }
    })
}

/// Upstream numerics arrive as decimal strings; tolerate plain numbers too.
fn to_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_kline_frame() {
        let data = json!({
            "e": "kline",
            "s": "BTCUSDT",
            "k": {"t": 1770640680000_i64, "o": "1", "h": "2", "l": "0.5", "c": "1.5", "v": "10"}
        });
        let content = to_client_content("KLINE", &data);
        assert_eq!(content["time"], json!(1_770_640_680_000_i64));
        assert_eq!(content["open"], json!(1.0));
        assert_eq!(content["close"], json!(1.5));
        assert_eq!(content["volume"], json!(10.0));
    }

    #[test]
    fn test_convert_quotes_frame() {
        let data = json!({
            "e": "24hrTicker", "s": "BTCUSDT",
            "c": "69104.31", "p": "30.92", "P": "0.045",
            "a": "69105.0", "b": "69104.0", "v": "2.02", "h": "69109.88", "l": "69073.39"
        });
        let content = to_client_content("QUOTES", &data);
        assert_eq!(content["n"], "BINANCE:BTCUSDT");
        assert_eq!(content["v"]["lp"], json!(69104.31));
        assert!((content["v"]["spread"].as_f64().unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_type_passthrough() {
        let data = json!({"anything": 1});
        assert_eq!(to_client_content("TRADE", &data), data);
        assert_eq!(to_client_content("ACCOUNT", &data), data);
    }
}
