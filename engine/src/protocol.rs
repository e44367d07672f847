use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use strum::{Display, EnumString};

pub const PROTOCOL_VERSION: &str = "2.0";

/// Wire error codes. The router is the only place that converts internal
/// errors into `ERROR` frames carrying one of these.
pub mod error_code {
    pub const INVALID_MESSAGE: &str = "INVALID_MESSAGE";
    pub const UNKNOWN_TYPE: &str = "UNKNOWN_TYPE";
    pub const INVALID_PARAMETERS: &str = "INVALID_PARAMETERS";
    pub const ALERT_NOT_FOUND: &str = "ALERT_NOT_FOUND";
    pub const SYMBOL_NOT_FOUND: &str = "SYMBOL_NOT_FOUND";
    pub const ACCOUNT_INFO_NOT_FOUND: &str = "ACCOUNT_INFO_NOT_FOUND";
    pub const TASK_FAILED: &str = "TASK_FAILED";
    pub const TASK_CREATION_FAILED: &str = "TASK_CREATION_FAILED";
    pub const REPOSITORY_NOT_INITIALIZED: &str = "REPOSITORY_NOT_INITIALIZED";
}

/// Request kinds accepted over the client WebSocket. The wire form is the
/// SCREAMING_SNAKE `type` field of the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestKind {
    GetConfig,
    GetServerTime,
    GetMetrics,
    GetKlines,
    GetSearchSymbols,
    GetResolveSymbol,
    GetQuotes,
    GetFuturesAccount,
    GetSpotAccount,
    Subscribe,
    Unsubscribe,
    CreateAlertConfig,
    ListAlertConfigs,
    UpdateAlertConfig,
    DeleteAlertConfig,
    EnableAlertConfig,
    DisableAlertConfig,
    ListSignals,
    Ping,
}

/// Client -> server envelope (protocol v2.0).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRequest {
    #[serde(default)]
    pub protocol_version: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub request_id: Option<String>,
    pub timestamp: i64,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(String),
}

impl ClientRequest {
    /// Parses and validates a raw client frame. A missing version is
    /// tolerated (assumed current); a mismatched one is rejected.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let request: Self = serde_json::from_str(raw)?;
        if let Some(version) = &request.protocol_version
            && version != PROTOCOL_VERSION
        {
            return Err(ProtocolError::UnsupportedVersion(version.clone()));
        }
        Ok(request)
    }
}

/// Server -> client envelope. `request_id` is present iff the frame answers
/// a request; pushes (`UPDATE`) omit it.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerFrame {
    pub protocol_version: &'static str,
    #[serde(rename = "type")]
    pub kind: String,
    pub request_id: Option<String>,
    pub timestamp: i64,
    pub data: Value,
}

impl ServerFrame {
    /// Phase-1 acknowledgement: `type:"ACK"`, empty data object.
    #[must_use]
    pub fn ack(request_id: Option<String>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            kind: "ACK".to_owned(),
            request_id,
            timestamp: now_ms(),
            data: Value::Object(serde_json::Map::new()),
        }
    }

    /// Phase-3 success frame; `kind` carries the concrete data type
    /// (`KLINES_DATA`, `CONFIG_DATA`, ...).
    #[must_use]
    pub fn success(kind: &str, request_id: Option<String>, data: Value) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            kind: kind.to_owned(),
            request_id,
            timestamp: now_ms(),
            data,
        }
    }

    #[must_use]
    pub fn error(code: &str, message: impl Into<String>, request_id: Option<String>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            kind: "ERROR".to_owned(),
            request_id,
            timestamp: now_ms(),
            data: serde_json::json!({
                "errorCode": code,
                "errorMessage": message.into(),
            }),
        }
    }

    /// Unsolicited push. The live payload travels under `content`; `payload`
    /// is reserved for the task table and never appears on the wire.
    #[must_use]
    pub fn update(subscription_key: &str, content: Value, event_type: Option<&str>) -> Self {
        let mut data = serde_json::Map::new();
        if let Some(event_type) = event_type {
            data.insert("eventType".to_owned(), Value::from(event_type));
        }
        data.insert("subscriptionKey".to_owned(), Value::from(subscription_key));
        data.insert("content".to_owned(), content);

        Self {
            protocol_version: PROTOCOL_VERSION,
            kind: "UPDATE".to_owned(),
            request_id: None,
            timestamp: now_ms(),
            data: Value::Object(data),
        }
    }

    #[must_use]
    pub fn pong() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            kind: "PONG".to_owned(),
            request_id: None,
            timestamp: now_ms(),
            data: Value::Object(serde_json::Map::new()),
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.kind != "ACK"
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_parse_request() -> anyhow::Result<()> {
        let request = ClientRequest::parse(
            r#"{"protocolVersion":"2.0","type":"GET_CONFIG","requestId":"r1","timestamp":0,"data":{}}"#,
        )?;
        assert_eq!(request.kind, "GET_CONFIG");
        assert_eq!(request.request_id.as_deref(), Some("r1"));
        assert_eq!(RequestKind::from_str(&request.kind)?, RequestKind::GetConfig);
        Ok(())
    }

    #[test]
    fn test_rejects_wrong_version_and_missing_fields() {
        let err = ClientRequest::parse(
            r#"{"protocolVersion":"1.0","type":"GET_CONFIG","timestamp":0}"#,
        );
        assert!(matches!(err, Err(ProtocolError::UnsupportedVersion(_))));

        // `type` and `timestamp` are required.
        assert!(ClientRequest::parse(r#"{"timestamp":0}"#).is_err());
        assert!(ClientRequest::parse(r#"{"type":"GET_CONFIG"}"#).is_err());
        assert!(ClientRequest::parse("not json").is_err());
    }

    #[test]
    fn test_ack_frame_shape() {
        let ack = ServerFrame::ack(Some("r1".to_owned()));
        let json = serde_json::to_value(&ack).unwrap();
        assert_eq!(json["type"], "ACK");
        assert_eq!(json["requestId"], "r1");
        assert_eq!(json["protocolVersion"], "2.0");
        assert_eq!(json["data"], serde_json::json!({}));
    }

    #[test]
    fn test_update_frame_has_no_request_id() {
        let update =
            ServerFrame::update("BINANCE:BTCUSDT@KLINE_1", serde_json::json!({"time": 1}), None);
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["type"], "UPDATE");
        assert!(json.get("requestId").is_none());
        assert_eq!(json["data"]["subscriptionKey"], "BINANCE:BTCUSDT@KLINE_1");
        assert_eq!(json["data"]["content"]["time"], 1);
    }

    #[test]
    fn test_request_kind_wire_names() {
        assert_eq!(RequestKind::GetKlines.to_string(), "GET_KLINES");
        assert_eq!(
            RequestKind::from_str("CREATE_ALERT_CONFIG").unwrap(),
            RequestKind::CreateAlertConfig
        );
        assert!(RequestKind::from_str("NOPE").is_err());
    }
}
