use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// When a buffer update causes a strategy evaluation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    OnceOnly,
    EachKline,
    EachKlineClose,
    EachMinute,
}

/// Per-alert trigger bookkeeping. Which fields matter depends on the
/// trigger type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerState {
    /// once_only: already fired.
    pub executed: bool,
    /// each_minute: last evaluation wall-clock.
    pub last_executed_at_ms: Option<i64>,
    /// each_kline_close: close time of the last evaluated candle.
    pub last_close_time: Option<i64>,
}

/// The slice of an incoming k-line update the engines look at.
#[derive(Debug, Clone, Copy, Default)]
pub struct KlineUpdate {
    pub open_time: Option<i64>,
    pub close_time: Option<i64>,
    /// Upstream close flag (`k.x`).
    pub is_closed: bool,
}

const MINUTE_WINDOW_MS: i64 = 60_000;

/// Decides whether this update evaluates, returning the successor state.
#[must_use]
pub fn should_execute(
    trigger: TriggerType,
    state: &TriggerState,
    update: &KlineUpdate,
    now_ms: i64,
) -> (bool, TriggerState) {
    match trigger {
        TriggerType::OnceOnly => {
            if state.executed {
                (false, state.clone())
            } else {
                (
                    true,
                    TriggerState {
                        executed: true,
                        ..TriggerState::default()
                    },
                )
            }
        }
        TriggerType::EachKline => (true, state.clone()),
        TriggerType::EachKlineClose => each_kline_close(state, update, now_ms),
        TriggerType::EachMinute => match state.last_executed_at_ms {
            Some(last) if now_ms - last < MINUTE_WINDOW_MS => (false, state.clone()),
            _ => (
                true,
                TriggerState {
                    last_executed_at_ms: Some(now_ms),
                    ..TriggerState::default()
                },
            ),
        },
    }
}

/// Fires once per closed candle. The close flag is authoritative; without
/// it, a candle whose close time has passed counts as closed. Dedupe is on
/// close-time identity, so a repeated close for the same candle evaluates
/// once.
fn each_kline_close(
    state: &TriggerState,
    update: &KlineUpdate,
    now_ms: i64,
) -> (bool, TriggerState) {
    let closed = update.is_closed
        || update
            .close_time
            .is_some_and(|close_time| now_ms > close_time);
    if !closed {
        return (false, state.clone());
    }

    let close_time = update.close_time;
    if close_time.is_some() && state.last_close_time == close_time {
        return (false, state.clone());
    }

    (
        true,
        TriggerState {
            last_close_time: close_time,
            ..TriggerState::default()
        },
    )
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_trigger_type_wire_names() {
        assert_eq!(TriggerType::EachKlineClose.to_string(), "each_kline_close");
        assert_eq!(
            TriggerType::from_str("once_only").unwrap(),
            TriggerType::OnceOnly
        );
    }

    #[test]
    fn test_once_only_fires_once() {
        let update = KlineUpdate::default();
        let (fire, state) = should_execute(TriggerType::OnceOnly, &TriggerState::default(), &update, 0);
        assert!(fire);
        assert!(state.executed);

        let (fire, _) = should_execute(TriggerType::OnceOnly, &state, &update, 1);
        assert!(!fire);
    }

    #[test]
    fn test_each_kline_always_fires() {
        let update = KlineUpdate::default();
        let (fire, _) = should_execute(TriggerType::EachKline, &TriggerState::default(), &update, 0);
        assert!(fire);
    }

    #[test]
    fn test_each_kline_close_dedupes_on_close_time() {
        let update = KlineUpdate {
            open_time: Some(0),
            close_time: Some(59_999),
            is_closed: true,
        };

        let (fire, state) =
            should_execute(TriggerType::EachKlineClose, &TriggerState::default(), &update, 0);
        assert!(fire);

        // Same close time again: exactly one evaluation in total.
        let (fire, state) = should_execute(TriggerType::EachKlineClose, &state, &update, 1);
        assert!(!fire);

        // The next candle's close fires again.
        let next = KlineUpdate {
            open_time: Some(60_000),
            close_time: Some(119_999),
            is_closed: true,
        };
        let (fire, _) = should_execute(TriggerType::EachKlineClose, &state, &next, 2);
        assert!(fire);
    }

    #[test]
    fn test_each_kline_close_ignores_forming_candle() {
        let update = KlineUpdate {
            open_time: Some(0),
            close_time: Some(59_999),
            is_closed: false,
        };
        // Now is before the close time: not closed yet.
        let (fire, _) =
            should_execute(TriggerType::EachKlineClose, &TriggerState::default(), &update, 30_000);
        assert!(!fire);

        // Wall clock passed the close time: counts as closed.
        let (fire, _) =
            should_execute(TriggerType::EachKlineClose, &TriggerState::default(), &update, 61_000);
        assert!(fire);
    }

    #[test]
    fn test_each_minute_window() {
        let update = KlineUpdate::default();
        let (fire, state) =
            should_execute(TriggerType::EachMinute, &TriggerState::default(), &update, 1_000);
        assert!(fire);

        let (fire, state) = should_execute(TriggerType::EachMinute, &state, &update, 40_000);
        assert!(!fire);

        let (fire, _) = should_execute(TriggerType::EachMinute, &state, &update, 61_001);
        assert!(fire);
    }
}
