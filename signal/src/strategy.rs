use std::{collections::HashMap, sync::Arc};

use engine::Bar;
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Deserialize;
use serde_json::Value;

use crate::indicators;

/// Triple-valued evaluation outcome. Modelled as a tagged enum rather than
/// an optional boolean so "no signal" cannot be confused with "short".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalValue {
    Long,
    Short,
    None,
}

impl SignalValue {
    /// The `signal_value` column encoding: true = long, false = short;
    /// `None` rows are never written.
    #[must_use]
    pub fn as_db(self) -> Option<bool> {
        match self {
            Self::Long => Some(true),
            Self::Short => Some(false),
            Self::None => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Evaluation {
    pub value: SignalValue,
    pub reason: String,
}

/// Aligned Boolean series over the same index as the input frame.
#[derive(Debug, Clone)]
pub struct SignalSeries {
    pub entries: Vec<bool>,
    pub exits: Vec<bool>,
}

/// Only the last row matters for live alerts. If both exit and entry signal
/// there, exit wins.
#[must_use]
pub fn resolve_last(series: &SignalSeries) -> Evaluation {
    let entry = series.entries.last().copied().unwrap_or(false);
    let exit = series.exits.last().copied().unwrap_or(false);

    if exit {
        Evaluation {
            value: SignalValue::Short,
            reason: "exit signal".to_owned(),
        }
    } else if entry {
        Evaluation {
            value: SignalValue::Long,
            reason: "entry signal".to_owned(),
        }
    } else {
        Evaluation {
            value: SignalValue::None,
            reason: "no signal".to_owned(),
        }
    }
}

/// A strategy is a pure function `(bars, params) -> (entries, exits)`.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn generate_signals(&self, bars: &[Bar], params: &Value) -> anyhow::Result<SignalSeries>;
}

/// Name -> strategy lookup used when loading alert configs.
pub struct StrategyRegistry {
    strategies: HashMap<&'static str, Arc<dyn Strategy>>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        let mut registry = Self {
            strategies: HashMap::new(),
        };
        registry.register(Arc::new(RandomStrategy));
        registry.register(Arc::new(EmaCrossStrategy));
        registry.register(Arc::new(MacdCrossStrategy));
        registry
    }
}

impl StrategyRegistry {
    pub fn register(&mut self, strategy: Arc<dyn Strategy>) {
        self.strategies.insert(strategy.name(), strategy);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Strategy>> {
        self.strategies.get(name).cloned()
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.strategies.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// Pipeline validation strategy: the last row always signals, so every
/// closed candle produces a persisted signal and a broadcast. Not meant for
/// live trading decisions.
pub struct RandomStrategy;

#[derive(Debug, Deserialize)]
struct RandomParams {
    #[serde(default)]
    seed: Option<u64>,
    #[serde(default = "default_probability")]
    probability: f64,
}

fn default_probability() -> f64 {
    0.5
}

impl Strategy for RandomStrategy {
    fn name(&self) -> &'static str {
        "RandomStrategy"
    }

    fn generate_signals(&self, bars: &[Bar], params: &Value) -> anyhow::Result<SignalSeries> {
        let params: RandomParams = serde_json::from_value(params.clone()).unwrap_or(RandomParams {
            seed: None,
            probability: default_probability(),
        });
        let mut rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let mut entries: Vec<bool> = (0..bars.len())
            .map(|_| rng.random::<f64>() < params.probability)
            .collect();
        let exits: Vec<bool> = (0..bars.len())
            .map(|_| rng.random::<f64>() < params.probability)
            .collect();

        // The last row must carry a signal so the data path is observable.
        if let (Some(last_entry), Some(last_exit)) = (entries.last().copied(), exits.last().copied())
            && !last_entry
            && !last_exit
        {
            *entries.last_mut().unwrap() = true;
        }

        Ok(SignalSeries { entries, exits })
    }
}

/// Long when the fast EMA crosses above the slow one, short on the inverse
/// cross.
pub struct EmaCrossStrategy;

#[derive(Debug, Deserialize)]
struct EmaCrossParams {
    #[serde(default = "default_fast")]
    fast: usize,
    #[serde(default = "default_slow")]
    slow: usize,
}

fn default_fast() -> usize {
    12
}

fn default_slow() -> usize {
    26
}

impl Strategy for EmaCrossStrategy {
    fn name(&self) -> &'static str {
        "EmaCrossStrategy"
    }

    fn generate_signals(&self, bars: &[Bar], params: &Value) -> anyhow::Result<SignalSeries> {
        let params: EmaCrossParams = serde_json::from_value(params.clone()).unwrap_or(
            EmaCrossParams {
                fast: default_fast(),
                slow: default_slow(),
            },
        );
        if params.fast == 0 || params.slow == 0 || params.fast >= params.slow {
            anyhow::bail!("invalid EMA periods: fast={} slow={}", params.fast, params.slow);
        }

        let closes: Vec<f64> = bars.iter().map(|bar| bar.close).collect();
        let fast = indicators::ema(&closes, params.fast);
        let slow = indicators::ema(&closes, params.slow);

        Ok(cross_series(&fast, &slow))
    }
}

/// Long when the MACD line crosses above its signal line, short on the
/// inverse cross.
pub struct MacdCrossStrategy;

#[derive(Debug, Deserialize)]
struct MacdParams {
    #[serde(default = "default_fast")]
    fast: usize,
    #[serde(default = "default_slow")]
    slow: usize,
    #[serde(default = "default_signal")]
    signal: usize,
}

fn default_signal() -> usize {
    9
}

impl Strategy for MacdCrossStrategy {
    fn name(&self) -> &'static str {
        "MacdCrossStrategy"
    }

    fn generate_signals(&self, bars: &[Bar], params: &Value) -> anyhow::Result<SignalSeries> {
        let params: MacdParams = serde_json::from_value(params.clone()).unwrap_or(MacdParams {
            fast: default_fast(),
            slow: default_slow(),
            signal: default_signal(),
        });
        if params.fast == 0 || params.signal == 0 || params.fast >= params.slow {
            anyhow::bail!(
                "invalid MACD periods: fast={} slow={} signal={}",
                params.fast,
                params.slow,
                params.signal
            );
        }

        let closes: Vec<f64> = bars.iter().map(|bar| bar.close).collect();
        let (macd_line, signal_line, _) =
            indicators::macd(&closes, params.fast, params.slow, params.signal);

        Ok(cross_series(&macd_line, &signal_line))
    }
}

/// Entries on upward crosses of `a` over `b`, exits on downward crosses.
fn cross_series(a: &[f64], b: &[f64]) -> SignalSeries {
    let len = a.len().min(b.len());
    let mut entries = vec![false; len];
    let mut exits = vec![false; len];

    for i in 1..len {
        let was_above = a[i - 1] > b[i - 1];
        let is_above = a[i] > b[i];
        if !was_above && is_above {
            entries[i] = true;
        } else if was_above && !is_above {
            exits[i] = true;
        }
    }

    SignalSeries { entries, exits }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                time: i as i64 * 60_000,
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
            })
            .collect()
    }

    #[test]
    fn test_exit_wins_on_last_row() {
        let series = SignalSeries {
            entries: vec![false, true],
            exits: vec![false, true],
        };
        let evaluation = resolve_last(&series);
        assert_eq!(evaluation.value, SignalValue::Short);
        assert_eq!(evaluation.value.as_db(), Some(false));
    }

    #[test]
    fn test_neither_is_no_signal() {
        let series = SignalSeries {
            entries: vec![true, false],
            exits: vec![false, false],
        };
        assert_eq!(resolve_last(&series).value, SignalValue::None);
        assert_eq!(SignalValue::None.as_db(), None);
    }

    #[test]
    fn test_random_strategy_always_signals_last_row() -> anyhow::Result<()> {
        let bars = bars_from_closes(&[1.0; 50]);
        for seed in 0..20_u64 {
            let series = RandomStrategy.generate_signals(&bars, &json!({"seed": seed}))?;
            let last = series.entries.last().copied().unwrap() || series.exits.last().copied().unwrap();
            assert!(last, "seed {seed} produced a silent last row");
        }
        Ok(())
    }

    #[test]
    fn test_random_strategy_deterministic_with_seed() -> anyhow::Result<()> {
        let bars = bars_from_closes(&[1.0; 50]);
        let a = RandomStrategy.generate_signals(&bars, &json!({"seed": 7}))?;
        let b = RandomStrategy.generate_signals(&bars, &json!({"seed": 7}))?;
        assert_eq!(a.entries, b.entries);
        assert_eq!(a.exits, b.exits);
        Ok(())
    }

    #[test]
    fn test_ema_cross_detects_turn() -> anyhow::Result<()> {
        // Long decline then a sharp rally: the fast EMA must cross up.
        let mut closes = vec![0.0; 0];
        closes.extend((0..60).map(|i| 100.0 - f64::from(i)));
        closes.extend((0..40).map(|i| 40.0 + f64::from(i) * 3.0));
        let bars = bars_from_closes(&closes);

        let series = EmaCrossStrategy.generate_signals(&bars, &json!({"fast": 5, "slow": 20}))?;
        assert!(series.entries.iter().any(|&e| e));
        Ok(())
    }

    #[test]
    fn test_registry_lookup() {
        let registry = StrategyRegistry::default();
        assert!(registry.get("RandomStrategy").is_some());
        assert!(registry.get("EmaCrossStrategy").is_some());
        assert!(registry.get("MacdCrossStrategy").is_some());
        assert!(registry.get("NoSuchStrategy").is_none());
        assert_eq!(registry.names().len(), 3);
    }
}
