use std::sync::Arc;

use engine::{Bars, Channel, Envelope, ServerFrame, error_code};
use serde_json::{Value, json};
use store::{AccountRepo, KlinesRepo};
use tracing::{debug, error, info, warn};

use crate::{convert, hub::SessionHub, registry::SubscriptionRegistry};

/// Consumes the gateway's notify stream and turns events into per-session
/// frames:
///
/// - `task.completed` / `task.failed`: correlate back to the requesting
///   session; for bulk task kinds the result lives in a side table and is
///   re-queried here.
/// - `realtime.update`: translate the stored upstream payload to the client
///   shape and broadcast to every matching session.
/// - `signal.new`: broadcast on `SIGNAL:<alert_id>`.
/// - `alert_config.*`: observed by the signal worker only; ignored here.
pub struct Dispatcher {
    hub: Arc<SessionHub>,
    registry: Arc<SubscriptionRegistry>,
    klines: KlinesRepo,
    account: AccountRepo,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        hub: Arc<SessionHub>,
        registry: Arc<SubscriptionRegistry>,
        klines: KlinesRepo,
        account: AccountRepo,
    ) -> Self {
        Self {
            hub,
            registry,
            klines,
            account,
        }
    }

    /// One notification. Errors are contained per event: the dispatch loop
    /// must survive any payload.
    pub async fn handle_event(&self, channel: Channel, envelope: Envelope) {
        let result = match channel {
            Channel::TaskCompleted | Channel::TaskFailed => self.handle_task_event(&envelope.data).await,
            Channel::RealtimeUpdate => self.handle_realtime_update(&envelope.data).await,
            Channel::SignalNew => self.handle_signal_new(&envelope.data).await,
            Channel::AlertConfigNew | Channel::AlertConfigUpdate | Channel::AlertConfigDelete => Ok(()),
            other => {
                debug!(channel = %other, "Channel not handled by dispatcher");
                Ok(())
            }
        };

        if let Err(e) = result {
            error!(channel = %channel, "Dispatch failed: {e:#}");
        }
    }

    async fn handle_task_event(&self, data: &Value) -> anyhow::Result<()> {
        let Some(task_id) = data.get("id").and_then(Value::as_i64) else {
            warn!("Task notification without id, dropped");
            return Ok(());
        };
        let task_type = data.get("type").and_then(Value::as_str).unwrap_or_default();
        let status = data.get("status").and_then(Value::as_str).unwrap_or_default();

        // System tasks are never correlated to a client.
        if task_type.starts_with("system.") {
            return Ok(());
        }

        // Session already gone (or a task another gateway created): drop
        // silently. The correlation is cleared either way.
        let Some(session_id) = self.hub.take_task_session(task_id) else {
            debug!(task_id, "No session for task, dropped");
            return Ok(());
        };

        let payload = data.get("payload").cloned().unwrap_or(Value::Null);
        let request_id = payload
            .get("requestId")
            .and_then(Value::as_str)
            .map(str::to_owned);
        if let Some(request_id) = &request_id {
            self.hub.take_request_session(request_id);
        }

        let frame = if status == "failed" {
            task_error_frame(data, request_id)
        } else {
            match task_type {
                "get_klines" => self.klines_result_frame(&payload, request_id).await?,
                "get_spot_account" => self.account_result_frame("SPOT", request_id).await?,
                "get_futures_account" => self.account_result_frame("FUTURES", request_id).await?,
                _ => inline_result_frame(task_type, data.get("result"), request_id),
            }
        };

        info!(task_id, task_type, status, %session_id, "Task result delivered");
        self.hub.send(session_id, frame);
        Ok(())
    }

    /// `get_klines` results are bulk: re-query the history table with the
    /// task's own parameters and build the success frame from it.
    async fn klines_result_frame(
        &self,
        payload: &Value,
        request_id: Option<String>,
    ) -> anyhow::Result<ServerFrame> {
        let symbol = payload.get("symbol").and_then(Value::as_str).unwrap_or_default();
        let interval = payload.get("interval").and_then(Value::as_str).unwrap_or("60");
        let (Some(from_time), Some(to_time)) = (
            payload.get("from_time").and_then(Value::as_i64),
            payload.get("to_time").and_then(Value::as_i64),
        ) else {
            return Ok(ServerFrame::error(
                error_code::INVALID_PARAMETERS,
                "Invalid task payload",
                request_id,
            ));
        };

        let rows = self
            .klines
            .query_range(symbol, interval, from_time, to_time)
            .await?;
        let bars = Bars::new(symbol, interval, rows.iter().map(store::HistoryKline::bar).collect());

        let mut data = serde_json::to_value(&bars)?;
        if let Some(object) = data.as_object_mut() {
            object.insert("type".to_owned(), Value::from("klines"));
        }
        Ok(ServerFrame::success("KLINES_DATA", request_id, data))
    }

    /// Account results live in the snapshot table, not the task row.
    async fn account_result_frame(
        &self,
        account_type: &str,
        request_id: Option<String>,
    ) -> anyhow::Result<ServerFrame> {
        let Some(info) = self.account.get(account_type).await? else {
            return Ok(ServerFrame::error(
                error_code::ACCOUNT_INFO_NOT_FOUND,
                format!("Account info not found: {account_type}"),
                request_id,
            ));
        };

        Ok(ServerFrame::success(
            "ACCOUNT_DATA",
            request_id,
            json!({
                "type": format!("{}_account", account_type.to_lowercase()),
                "content": info.data,
                "updateTime": info.update_time,
            }),
        ))
    }

    async fn handle_realtime_update(&self, data: &Value) -> anyhow::Result<()> {
        let Some(key) = data.get("subscription_key").and_then(Value::as_str) else {
            warn!("realtime.update without subscription_key, dropped");
            return Ok(());
        };
        let data_type = data.get("data_type").and_then(Value::as_str).unwrap_or_default();
        let payload = data.get("data").cloned().unwrap_or(Value::Null);

        let sessions = self.registry.sessions_for(key).await;
        if sessions.is_empty() {
            return Ok(());
        }

        let content = convert::to_client_content(data_type, &payload);
        let frame = ServerFrame::update(key, content, None);
        self.hub.broadcast(&sessions, &frame);
        Ok(())
    }

    /// Signals broadcast on the gateway-local `SIGNAL:<alert_id>` key; a
    /// `SIGNAL:*` subscriber sees every alert.
    async fn handle_signal_new(&self, data: &Value) -> anyhow::Result<()> {
        let Some(alert_id) = data.get("alert_id").and_then(Value::as_str) else {
            warn!("signal.new without alert_id, dropped");
            return Ok(());
        };

        let key = format!("SIGNAL:{alert_id}");
        let sessions = self.registry.sessions_for(&key).await;
        if sessions.is_empty() {
            return Ok(());
        }

        let frame = ServerFrame::update(&key, data.clone(), Some("signal.new"));
        info!(key, sessions = sessions.len(), "Signal broadcast");
        self.hub.broadcast(&sessions, &frame);
        Ok(())
    }
}

fn task_error_frame(data: &Value, request_id: Option<String>) -> ServerFrame {
    // The adapter records the failure as a bare string in `result`; tolerate
    // an {"error": ...} object as well.
    let message = match data.get("result") {
        Some(Value::String(message)) => message.clone(),
        Some(Value::Object(object)) => object
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error")
            .to_owned(),
        _ => "Unknown error".to_owned(),
    };
    ServerFrame::error(
        error_code::TASK_FAILED,
        format!("Task failed: {message}"),
        request_id,
    )
}

/// Tasks whose result is inline on the row (server time, quotes).
fn inline_result_frame(
    task_type: &str,
    result: Option<&Value>,
    request_id: Option<String>,
) -> ServerFrame {
    let response_type = match task_type {
        "get_quotes" => "QUOTES_DATA",
        "get_server_time" => "SERVER_TIME_DATA",
        other => other,
    };

    let mut data = serde_json::Map::new();
    data.insert("type".to_owned(), Value::from(response_type));
    if let Some(Value::Object(fields)) = result {
        for (field, value) in fields {
            if field != "type" {
                data.insert(field.clone(), value.clone());
            }
        }
    }

    ServerFrame::success(response_type, request_id, Value::Object(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_error_frame_embeds_adapter_message() {
        let data = json!({"id": 1, "result": "upstream timed out"});
        let frame = task_error_frame(&data, Some("r1".to_owned()));
        assert_eq!(frame.kind, "ERROR");
        assert_eq!(frame.data["errorCode"], "TASK_FAILED");
        assert_eq!(frame.data["errorMessage"], "Task failed: upstream timed out");

        let data = json!({"id": 1, "result": {"error": "bad symbol"}});
        let frame = task_error_frame(&data, None);
        assert_eq!(frame.data["errorMessage"], "Task failed: bad symbol");
    }

    #[test]
    fn test_inline_result_frame_merges_result_fields() {
        let result = json!({"server_time": 123, "iso_time": "t"});
        let frame = inline_result_frame("get_server_time", Some(&result), Some("r1".to_owned()));
        assert_eq!(frame.kind, "SERVER_TIME_DATA");
        assert_eq!(frame.data["type"], "SERVER_TIME_DATA");
        assert_eq!(frame.data["server_time"], 123);

        let result = json!({"quotes": [], "count": 0});
        let frame = inline_result_frame("get_quotes", Some(&result), None);
        assert_eq!(frame.kind, "QUOTES_DATA");
        assert_eq!(frame.data["count"], 0);
    }
}
