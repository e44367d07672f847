use engine::Bar;
use store::HistoryKline;

/// Ordered buffer of the latest closed (plus the currently forming) k-lines
/// for one series. An update with a known open time overwrites in place; a
/// new open time appends and the oldest bar drops once the buffer exceeds
/// its capacity.
#[derive(Debug, Clone)]
pub struct KlineBuffer {
    bars: Vec<Bar>,
    capacity: usize,
}

impl KlineBuffer {
    #[must_use]
    pub fn from_history(history: &[HistoryKline], capacity: usize) -> Self {
        let start = history.len().saturating_sub(capacity);
        Self {
            bars: history[start..].iter().map(HistoryKline::bar).collect(),
            capacity,
        }
    }

    /// Append-or-replace keyed on the bar's open time.
    pub fn upsert(&mut self, bar: Bar) {
        // Same-time updates are almost always the forming last bar.
        if let Some(existing) = self.bars.iter_mut().rev().find(|b| b.time == bar.time) {
            *existing = bar;
            return;
        }
        self.bars.push(bar);
        if self.bars.len() > self.capacity {
            let overflow = self.bars.len() - self.capacity;
            self.bars.drain(..overflow);
        }
    }

    #[must_use]
    pub fn last_open_time(&self) -> Option<i64> {
        self.bars.last().map(|bar| bar.time)
    }

    #[must_use]
    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
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
                high: 2.0,
                low: 0.5,
                close: 1.5,
                volume: 10.0,
                quote_volume: 15.0,
                trades: 1,
                taker_buy_base_volume: 5.0,
                taker_buy_quote_volume: 7.5,
            })
            .collect()
    }

    fn bar(time: i64, close: f64) -> Bar {
        Bar {
            time,
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close,
            volume: 10.0,
        }
    }

    #[test]
    fn test_same_open_time_overwrites() {
        let mut buffer = KlineBuffer::from_history(&history(&[0, 60_000]), 280);
        buffer.upsert(bar(60_000, 9.9));
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.bars().last().unwrap().close, 9.9);
    }

    #[test]
    fn test_new_open_time_appends_and_trims() {
        let mut buffer = KlineBuffer::from_history(&history(&[0, 60_000, 120_000]), 3);
        buffer.upsert(bar(180_000, 1.0));
        assert_eq!(buffer.len(), 3);
        // Oldest bar dropped.
        assert_eq!(buffer.bars()[0].time, 60_000);
        assert_eq!(buffer.last_open_time(), Some(180_000));
    }

    #[test]
    fn test_from_history_keeps_latest_window() {
        let times: Vec<i64> = (0..10).map(|i| i * 60_000).collect();
        let buffer = KlineBuffer::from_history(&history(&times), 4);
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.bars()[0].time, 6 * 60_000);
    }
}
