//! Small indicator helpers over close-price series. Inputs are the buffer's
//! bars in ascending time order; outputs are aligned to the same index.

/// Exponential moving average seeded with the first value.
#[must_use]
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    if values.is_empty() || period == 0 {
        return Vec::new();
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut current = values[0];
    out.push(current);
    for &value in &values[1..] {
        current = value * k + current * (1.0 - k);
        out.push(current);
    }
    out
}

/// MACD line, signal line and histogram.
#[must_use]
pub fn macd(
    values: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let fast_ema = ema(values, fast);
    let slow_ema = ema(values, slow);
    let macd_line: Vec<f64> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = ema(&macd_line, signal);
    let histogram: Vec<f64> = macd_line
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| m - s)
        .collect();
    (macd_line, signal_line, histogram)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ema_constant_series_is_flat() {
        let values = vec![5.0; 50];
        let out = ema(&values, 12);
        assert_eq!(out.len(), 50);
        assert!(out.iter().all(|v| (v - 5.0).abs() < 1e-12));
    }

    #[test]
    fn test_ema_tracks_trend() {
        let values: Vec<f64> = (0..100).map(f64::from).collect();
        let fast = ema(&values, 5);
        let slow = ema(&values, 50);
        // In a rising series the short EMA stays above the long one.
        assert!(fast.last().unwrap() > slow.last().unwrap());
    }

    #[test]
    fn test_macd_shapes_align() {
        let values: Vec<f64> = (0..300).map(|i| f64::from(i % 37)).collect();
        let (macd_line, signal_line, histogram) = macd(&values, 12, 26, 9);
        assert_eq!(macd_line.len(), values.len());
        assert_eq!(signal_line.len(), values.len());
        assert_eq!(histogram.len(), values.len());
    }
}
