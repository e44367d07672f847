use serde::Deserialize;
use serde_json::Value;
use strum::{Display, EnumString};

/// The pubsub channels emitted by the database triggers.
///
/// The string form is the Postgres channel name; `LISTEN` requires it
/// double-quoted because of the embedded dot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum Channel {
    #[strum(serialize = "task.new")]
    TaskNew,
    #[strum(serialize = "task.completed")]
    TaskCompleted,
    #[strum(serialize = "task.failed")]
    TaskFailed,
    #[strum(serialize = "realtime.update")]
    RealtimeUpdate,
    #[strum(serialize = "subscription.add")]
    SubscriptionAdd,
    #[strum(serialize = "subscription.remove")]
    SubscriptionRemove,
    #[strum(serialize = "subscription.clean")]
    SubscriptionClean,
    #[strum(serialize = "signal.new")]
    SignalNew,
    #[strum(serialize = "alert_config.new")]
    AlertConfigNew,
    #[strum(serialize = "alert_config.update")]
    AlertConfigUpdate,
    #[strum(serialize = "alert_config.delete")]
    AlertConfigDelete,
}

impl Channel {
    pub const ALL: [Self; 11] = [
        Self::TaskNew,
        Self::TaskCompleted,
        Self::TaskFailed,
        Self::RealtimeUpdate,
        Self::SubscriptionAdd,
        Self::SubscriptionRemove,
        Self::SubscriptionClean,
        Self::SignalNew,
        Self::AlertConfigNew,
        Self::AlertConfigUpdate,
        Self::AlertConfigDelete,
    ];
}

/// Uniform wrapper around every trigger-emitted payload:
/// `{event_id, event_type, timestamp, data: {...}}`.
///
/// Consumers work on the inner `data` object. All fields are optional so a
/// hand-published payload (the `subscription.clean` notify) still parses.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Envelope {
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn parse(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_channel_names_round_trip() {
        for channel in Channel::ALL {
            assert_eq!(Channel::from_str(&channel.to_string()).unwrap(), channel);
        }
        assert_eq!(Channel::TaskNew.to_string(), "task.new");
        assert_eq!(Channel::AlertConfigDelete.to_string(), "alert_config.delete");
    }

    #[test]
    fn test_envelope_extracts_inner_data() {
        let envelope = Envelope::parse(
            r#"{"event_id":"e1","event_type":"task.completed","timestamp":1,"data":{"id":7}}"#,
        )
        .unwrap();
        assert_eq!(envelope.event_type.as_deref(), Some("task.completed"));
        assert_eq!(envelope.data["id"], 7);

        // A hand-published clean notification has none of the wrapper fields.
        let envelope = Envelope::parse(r#"{"action":"clean_all"}"#).unwrap();
        assert!(envelope.event_type.is_none());
    }
}
