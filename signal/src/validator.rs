use engine::Interval;
use store::HistoryKline;

/// Gap tolerance between consecutive open times, beyond the interval width.
const CONTINUITY_TOLERANCE_MS: i64 = 1_000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("insufficient history: {got}/{need}")]
    InsufficientCount { got: usize, need: usize },
    #[error("history not continuous at index {index}: gap of {gap_ms}ms")]
    NotContinuous { index: usize, gap_ms: i64 },
}

/// Two-condition check before a buffer may serve strategy evaluation:
/// enough rows, and consecutive open times one interval apart within a
/// small tolerance. Whether the last row is current is deliberately not
/// checked here; staleness is detected at runtime by the gap detector, so
/// a dead upstream cannot wedge startup in a validation loop.
pub fn validate(
    history: &[HistoryKline],
    interval: &Interval,
    required: usize,
) -> Result<(), ValidationError> {
    if history.len() < required {
        return Err(ValidationError::InsufficientCount {
            got: history.len(),
            need: required,
        });
    }

    let width = interval.as_millis();
    for (index, pair) in history.windows(2).enumerate() {
        let gap = pair[1].open_time - pair[0].open_time;
        if (gap - width).abs() > CONTINUITY_TOLERANCE_MS {
            return Err(ValidationError::NotContinuous {
                index: index + 1,
                gap_ms: gap,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(times: &[i64]) -> Vec<HistoryKline> {
        times
            .iter()
            .map(|&t| HistoryKline {
                open_time: t,
                close_time: t + 59_999,
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 0.0,
                quote_volume: 0.0,
                trades: 0,
                taker_buy_base_volume: 0.0,
                taker_buy_quote_volume: 0.0,
            })
            .collect()
    }

    #[test]
    fn test_continuous_history_passes() -> anyhow::Result<()> {
        let interval: Interval = "1".parse()?;
        let times: Vec<i64> = (0..5).map(|i| i * 60_000).collect();
        assert!(validate(&history(&times), &interval, 5).is_ok());
        Ok(())
    }

    #[test]
    fn test_insufficient_count_rejected() -> anyhow::Result<()> {
        let interval: Interval = "1".parse()?;
        let times: Vec<i64> = (0..4).map(|i| i * 60_000).collect();
        assert_eq!(
            validate(&history(&times), &interval, 5),
            Err(ValidationError::InsufficientCount { got: 4, need: 5 })
        );
        Ok(())
    }

    #[test]
    fn test_gap_rejected_but_tolerance_allowed() -> anyhow::Result<()> {
        let interval: Interval = "1".parse()?;
        // One missing candle between index 1 and 2.
        let times = [0, 60_000, 180_000, 240_000, 300_000];
        assert!(matches!(
            validate(&history(&times), &interval, 5),
            Err(ValidationError::NotContinuous { index: 2, .. })
        ));

        // Sub-second drift stays valid.
        let times = [0, 60_500, 120_500, 180_000, 240_000];
        assert!(validate(&history(&times), &interval, 5).is_ok());
        Ok(())
    }
}
