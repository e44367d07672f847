use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// A chart resolution in TradingView notation.
///
/// Numeric resolutions are minutes (`"1"`, `"60"`, `"240"`); daily and above
/// use a letter suffix (`"D"`/`"1D"`, `"W"`/`"1W"`, `"M"`/`"1M"`). The
/// original spelling is preserved so formatting a parsed resolution yields
/// the input string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Interval(String);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid interval: {0:?}")]
pub struct InvalidInterval(pub String);

const MINUTE_MS: i64 = 60 * 1000;
const DAY_MS: i64 = 24 * 60 * MINUTE_MS;

impl Interval {
    /// Width of one period in milliseconds. Months are approximated as 30
    /// days, matching the history table's bucketing.
    #[must_use]
    pub fn as_millis(&self) -> i64 {
        match self.0.as_str() {
            "D" | "1D" => DAY_MS,
            "W" | "1W" => 7 * DAY_MS,
            "M" | "1M" => 30 * DAY_MS,
            minutes => minutes.parse::<i64>().unwrap_or(1) * MINUTE_MS,
        }
    }

    /// The equivalent Binance interval string (`"60"` -> `"1h"`).
    #[must_use]
    pub fn to_binance(&self) -> String {
        match self.0.as_str() {
            "D" | "1D" => "1d".to_owned(),
            "W" | "1W" => "1w".to_owned(),
            "M" | "1M" => "1M".to_owned(),
            minutes => {
                let m: i64 = minutes.parse().unwrap_or(1);
                if m >= 60 && m % 60 == 0 {
                    format!("{}h", m / 60)
                } else {
                    format!("{m}m")
                }
            }
        }
    }

    /// Parses a Binance interval string back into TradingView notation.
    pub fn from_binance(s: &str) -> Result<Self, InvalidInterval> {
        let parsed = match s {
            "1d" => "D".to_owned(),
            "1w" => "W".to_owned(),
            "1M" => "M".to_owned(),
            _ => {
                let (value, unit) = s.split_at(s.len().saturating_sub(1));
                let value: i64 = value.parse().map_err(|_| InvalidInterval(s.to_owned()))?;
                match unit {
                    "m" => value.to_string(),
                    "h" => (value * 60).to_string(),
                    _ => return Err(InvalidInterval(s.to_owned())),
                }
            }
        };
        Ok(Self(parsed))
    }

    /// Floors a millisecond timestamp to the open time of its period.
    #[must_use]
    pub fn align_ms(&self, ts_ms: i64) -> i64 {
        let width = self.as_millis();
        (ts_ms / width) * width
    }

    /// Open time of the last fully closed period as of `now_ms`.
    #[must_use]
    pub fn previous_period_start(&self, now_ms: i64) -> i64 {
        self.align_ms(now_ms) - self.as_millis()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Interval {
    type Err = InvalidInterval;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = match s {
            "" => false,
            "D" | "1D" | "W" | "1W" | "M" | "1M" => true,
            minutes => minutes.bytes().all(|b| b.is_ascii_digit()) && minutes != "0",
        };
        if !valid {
            return Err(InvalidInterval(s.to_owned()));
        }
        Ok(Self(s.to_owned()))
    }
}

impl TryFrom<String> for Interval {
    type Error = InvalidInterval;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Interval> for String {
    fn from(value: Interval) -> Self {
        value.0
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_millis() -> anyhow::Result<()> {
        assert_eq!("1".parse::<Interval>()?.as_millis(), 60_000);
        assert_eq!("60".parse::<Interval>()?.as_millis(), 3_600_000);
        assert_eq!("D".parse::<Interval>()?.as_millis(), 86_400_000);
        assert_eq!("1D".parse::<Interval>()?.as_millis(), 86_400_000);
        Ok(())
    }

    #[test]
    fn test_interval_binance_mapping() -> anyhow::Result<()> {
        assert_eq!("1".parse::<Interval>()?.to_binance(), "1m");
        assert_eq!("60".parse::<Interval>()?.to_binance(), "1h");
        assert_eq!("240".parse::<Interval>()?.to_binance(), "4h");
        assert_eq!("1D".parse::<Interval>()?.to_binance(), "1d");
        assert_eq!(Interval::from_binance("4h")?.as_str(), "240");
        assert_eq!(Interval::from_binance("1d")?.as_str(), "D");
        Ok(())
    }

    #[test]
    fn test_align_to_period_boundary() -> anyhow::Result<()> {
        let hour: Interval = "60".parse()?;
        // 2024-01-01T00:59:59.999Z floors to 00:00.
        assert_eq!(hour.align_ms(1_704_070_799_999), 1_704_067_200_000);
        assert_eq!(hour.align_ms(1_704_067_200_000), 1_704_067_200_000);
        Ok(())
    }

    #[test]
    fn test_rejects_invalid() {
        assert!("".parse::<Interval>().is_err());
        assert!("0".parse::<Interval>().is_err());
        assert!("1h".parse::<Interval>().is_err());
        assert!("abc".parse::<Interval>().is_err());
    }
}
