use engine::{ServerFrame, error_code};
use serde::Deserialize;
use serde_json::{Value, json};
use store::{AlertConfig, AlertConfigPatch, AlertsRepo, SignalsRepo};
use tracing::error;
use uuid::Uuid;

/// In-process CRUD for alert configs plus the signal log listing. Every
/// handler returns the terminal frame; the router has already sent the ACK.
pub struct AlertHandler {
    alerts: AlertsRepo,
    signals: SignalsRepo,
}

#[derive(Debug, Deserialize)]
struct CreateAlertRequest {
    #[serde(default)]
    id: Option<String>,
    name: String,
    strategy_type: String,
    symbol: String,
    interval: String,
    trigger_type: String,
    #[serde(default)]
    params: Value,
    #[serde(default = "default_enabled")]
    is_enabled: bool,
    #[serde(default)]
    created_by: Option<String>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ListSignalsRequest {
    #[serde(default)]
    alert_id: Option<String>,
    #[serde(default = "default_signals_limit")]
    limit: i64,
}

fn default_signals_limit() -> i64 {
    50
}

impl AlertHandler {
    #[must_use]
    pub fn new(alerts: AlertsRepo, signals: SignalsRepo) -> Self {
        Self { alerts, signals }
    }

    pub async fn create(&self, data: &Value, request_id: Option<String>) -> ServerFrame {
        let request: CreateAlertRequest = match serde_json::from_value(data.clone()) {
            Ok(request) => request,
            Err(e) => {
                return ServerFrame::error(
                    error_code::INVALID_PARAMETERS,
                    format!("Invalid alert config: {e}"),
                    request_id,
                );
            }
        };

        let config = AlertConfig {
            id: request.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            name: request.name,
            strategy_type: request.strategy_type,
            symbol: request.symbol,
            interval: request.interval,
            trigger_type: request.trigger_type,
            params: request.params,
            is_enabled: request.is_enabled,
            created_by: request.created_by,
            created_at: None,
            updated_at: None,
        };

        match self.alerts.insert(&config).await {
            Ok(created) => alert_config_frame(&created, request_id),
            Err(e) => {
                error!("Alert create failed: {e:#}");
                ServerFrame::error("CREATE_ALERT_FAILED", format!("{e:#}"), request_id)
            }
        }
    }

    pub async fn list(&self, request_id: Option<String>) -> ServerFrame {
        match self.alerts.list(false).await {
            Ok(configs) => ServerFrame::success(
                "ALERT_CONFIG_DATA",
                request_id,
                json!({
                    "type": "alert_configs",
                    "count": configs.len(),
                    "configs": configs,
                }),
            ),
            Err(e) => {
                error!("Alert list failed: {e:#}");
                ServerFrame::error("LIST_ALERTS_FAILED", format!("{e:#}"), request_id)
            }
        }
    }

    pub async fn update(&self, data: &Value, request_id: Option<String>) -> ServerFrame {
        let Some(id) = alert_id(data) else {
            return missing_id(request_id);
        };
        let patch: AlertConfigPatch = match serde_json::from_value(data.clone()) {
            Ok(patch) => patch,
            Err(e) => {
                return ServerFrame::error(
                    error_code::INVALID_PARAMETERS,
                    format!("Invalid alert patch: {e}"),
                    request_id,
                );
            }
        };

        match self.alerts.update(&id, &patch).await {
            Ok(Some(updated)) => alert_config_frame(&updated, request_id),
            Ok(None) => not_found(&id, request_id),
            Err(e) => {
                error!("Alert update failed: {e:#}");
                ServerFrame::error("UPDATE_ALERT_FAILED", format!("{e:#}"), request_id)
            }
        }
    }

    pub async fn delete(&self, data: &Value, request_id: Option<String>) -> ServerFrame {
        let Some(id) = alert_id(data) else {
            return missing_id(request_id);
        };

        match self.alerts.delete(&id).await {
            Ok(true) => ServerFrame::success(
                "ALERT_CONFIG_DATA",
                request_id,
                json!({"type": "alert_config_deleted", "id": id}),
            ),
            Ok(false) => not_found(&id, request_id),
            Err(e) => {
                error!("Alert delete failed: {e:#}");
                ServerFrame::error("DELETE_ALERT_FAILED", format!("{e:#}"), request_id)
            }
        }
    }

    pub async fn set_enabled(
        &self,
        data: &Value,
        enabled: bool,
        request_id: Option<String>,
    ) -> ServerFrame {
        let Some(id) = alert_id(data) else {
            return missing_id(request_id);
        };

        match self.alerts.set_enabled(&id, enabled).await {
            Ok(Some(updated)) => alert_config_frame(&updated, request_id),
            Ok(None) => not_found(&id, request_id),
            Err(e) => {
                error!("Alert enable/disable failed: {e:#}");
                ServerFrame::error("ENABLE_ALERT_FAILED", format!("{e:#}"), request_id)
            }
        }
    }

    pub async fn list_signals(&self, data: &Value, request_id: Option<String>) -> ServerFrame {
        let request: ListSignalsRequest =
            serde_json::from_value(data.clone()).unwrap_or(ListSignalsRequest {
                alert_id: None,
                limit: default_signals_limit(),
            });

        match self.signals.list(request.alert_id.as_deref(), request.limit).await {
            Ok(signals) => ServerFrame::success(
                "SIGNAL_DATA",
                request_id,
                json!({
                    "type": "signals",
                    "count": signals.len(),
                    "signals": signals,
                }),
            ),
            Err(e) => {
                error!("Signal list failed: {e:#}");
                ServerFrame::error("LIST_SIGNALS_FAILED", format!("{e:#}"), request_id)
            }
        }
    }
}

fn alert_id(data: &Value) -> Option<String> {
    data.get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
}

fn alert_config_frame(config: &AlertConfig, request_id: Option<String>) -> ServerFrame {
    let mut data = serde_json::to_value(config).unwrap_or(Value::Null);
    if let Some(object) = data.as_object_mut() {
        object.insert("type".to_owned(), Value::from("alert_config"));
    }
    ServerFrame::success("ALERT_CONFIG_DATA", request_id, data)
}

fn missing_id(request_id: Option<String>) -> ServerFrame {
    ServerFrame::error(
        error_code::INVALID_PARAMETERS,
        "Missing alert id",
        request_id,
    )
}

fn not_found(id: &str, request_id: Option<String>) -> ServerFrame {
    ServerFrame::error(
        error_code::ALERT_NOT_FOUND,
        format!("Alert not found: {id}"),
        request_id,
    )
}
