//! Threshold rules that turn a [`MarketState`] into a signal.
//!
//! Rules are an ordered list evaluated top to bottom; the first rule whose
//! conditions all hold wins. The default order is SHORT then LONG, so SHORT
//! takes priority when both would match.

use serde::{Deserialize, Deserializer, Serialize};

use super::engine::MarketState;
use crate::regime::MarketRegime;

/// Directional signal for one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    None,
    Long,
    Short,
}

impl Signal {
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Self::None)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Long => "LONG",
            Self::Short => "SHORT",
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounds for one direction. Unset bounds always pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Fractal dimension must be strictly below this.
    pub fractal_max: Option<f64>,
    /// Sentiment must be strictly above this.
    pub sentiment_min: Option<f64>,
    /// Sentiment must be strictly below this.
    pub sentiment_max: Option<f64>,
    /// Volatility index must be strictly above this.
    pub volatility_min: Option<f64>,
    /// Volatility index must be strictly below this.
    pub volatility_max: Option<f64>,
    /// Regime the state must be in.
    pub regime: Option<MarketRegime>,
}

impl ThresholdConfig {
    /// Panic profile: smooth trend, fearful sentiment, high volatility.
    pub fn short_default() -> Self {
        Self {
            fractal_max: Some(0.7),
            sentiment_min: Some(1.2),
            volatility_min: Some(25.0),
            regime: Some(MarketRegime::Volatile),
            ..Default::default()
        }
    }

    /// Complacency profile: smooth trend, greedy sentiment, low volatility.
    pub fn long_default() -> Self {
        Self {
            fractal_max: Some(0.8),
            sentiment_max: Some(0.5),
            volatility_max: Some(20.0),
            regime: Some(MarketRegime::Bull),
            ..Default::default()
        }
    }

    /// Deserialize a partial section over [`ThresholdConfig::short_default`].
    pub fn deserialize_short<'de, D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(ThresholdOverlay::deserialize(deserializer)?.apply(Self::short_default()))
    }

    /// Deserialize a partial section over [`ThresholdConfig::long_default`].
    pub fn deserialize_long<'de, D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(ThresholdOverlay::deserialize(deserializer)?.apply(Self::long_default()))
    }

    /// Evaluate each condition against `state`.
    pub fn conditions(&self, state: &MarketState) -> ConditionMap {
        let fractal = match (self.fractal_max, state.fractal_dimension) {
            (None, _) => true,
            (Some(max), Some(f)) => f < max,
            (Some(_), None) => false,
        };

        let s = state.sentiment_proxy;
        let sentiment = self.sentiment_min.map_or(true, |min| s > min)
            && self.sentiment_max.map_or(true, |max| s < max);

        let v = state.volatility_index;
        let volatility = self.volatility_min.map_or(true, |min| v > min)
            && self.volatility_max.map_or(true, |max| v < max);

        // Unknown never satisfies a regime requirement.
        let regime = match self.regime {
            None => true,
            Some(required) => required.is_known() && state.regime == required,
        };

        ConditionMap {
            fractal,
            sentiment,
            volatility,
            regime,
        }
    }
}

/// Keys present in a config section. Absent keys keep the base value.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ThresholdOverlay {
    fractal_max: Option<f64>,
    sentiment_min: Option<f64>,
    sentiment_max: Option<f64>,
    volatility_min: Option<f64>,
    volatility_max: Option<f64>,
    regime: Option<MarketRegime>,
}

impl ThresholdOverlay {
    fn apply(self, base: ThresholdConfig) -> ThresholdConfig {
        ThresholdConfig {
            fractal_max: self.fractal_max.or(base.fractal_max),
            sentiment_min: self.sentiment_min.or(base.sentiment_min),
            sentiment_max: self.sentiment_max.or(base.sentiment_max),
            volatility_min: self.volatility_min.or(base.volatility_min),
            volatility_max: self.volatility_max.or(base.volatility_max),
            regime: self.regime.or(base.regime),
        }
    }
}

/// Which conditions of a rule held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ConditionMap {
    pub fractal: bool,
    pub sentiment: bool,
    pub volatility: bool,
    pub regime: bool,
}

impl ConditionMap {
    pub fn all_met(&self) -> bool {
        self.fractal && self.sentiment && self.volatility && self.regime
    }

    pub fn met_count(&self) -> usize {
        [self.fractal, self.sentiment, self.volatility, self.regime]
            .iter()
            .filter(|c| **c)
            .count()
    }
}

/// One rule: the signal emitted when all thresholds hold.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalRule {
    pub signal: Signal,
    pub thresholds: ThresholdConfig,
}

/// Result of evaluating a state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalEvaluation {
    pub signal: Signal,
    /// Conditions of the rule that fired, or of the SHORT rule when none did.
    pub conditions: ConditionMap,
    pub short: ConditionMap,
    pub long: ConditionMap,
}

/// Ordered signal rules.
#[derive(Debug, Clone)]
pub struct SignalEvaluator {
    rules: Vec<SignalRule>,
}

impl Default for SignalEvaluator {
    fn default() -> Self {
        Self::new(ThresholdConfig::short_default(), ThresholdConfig::long_default())
    }
}

impl SignalEvaluator {
    /// SHORT rule first, then LONG.
    pub fn new(short: ThresholdConfig, long: ThresholdConfig) -> Self {
        Self {
            rules: vec![
                SignalRule {
                    signal: Signal::Short,
                    thresholds: short,
                },
                SignalRule {
                    signal: Signal::Long,
                    thresholds: long,
                },
            ],
        }
    }

    pub fn rules(&self) -> &[SignalRule] {
        &self.rules
    }

    fn thresholds_for(&self, signal: Signal) -> Option<&ThresholdConfig> {
        self.rules
            .iter()
            .find(|r| r.signal == signal)
            .map(|r| &r.thresholds)
    }

    /// Classify `state`. At most one signal is ever returned.
    pub fn evaluate(&self, state: &MarketState) -> SignalEvaluation {
        let short = self
            .thresholds_for(Signal::Short)
            .map(|t| t.conditions(state))
            .unwrap_or_default();
        let long = self
            .thresholds_for(Signal::Long)
            .map(|t| t.conditions(state))
            .unwrap_or_default();

        let fired = self.rules.iter().find_map(|rule| {
            let conditions = rule.thresholds.conditions(state);
            conditions.all_met().then_some((rule.signal, conditions))
        });

        let (signal, conditions) = fired.unwrap_or((Signal::None, short));

        SignalEvaluation {
            signal,
            conditions,
            short,
            long,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn state(fractal: Option<f64>, sentiment: f64, vix: f64, regime: MarketRegime) -> MarketState {
        let date = NaiveDate::from_ymd_opt(2020, 3, 9).unwrap();
        MarketState {
            date,
            price: 2746.56,
            fractal_dimension: fractal,
            volatility_index: vix,
            sentiment_proxy: sentiment,
            regime,
            source_window_end: date,
            source_window_len: 91,
        }
    }

    #[test]
    fn test_short_signal() {
        let eval = SignalEvaluator::default().evaluate(&state(
            Some(0.6),
            1.5,
            40.0,
            MarketRegime::Volatile,
        ));
        assert_eq!(eval.signal, Signal::Short);
        assert!(eval.conditions.all_met());
    }

    #[test]
    fn test_long_signal() {
        let eval = SignalEvaluator::default().evaluate(&state(
            Some(0.75),
            0.4,
            12.0,
            MarketRegime::Bull,
        ));
        assert_eq!(eval.signal, Signal::Long);
        assert_eq!(eval.conditions, eval.long);
        assert!(!eval.short.all_met());
    }

    #[test]
    fn test_short_wins_when_both_match() {
        let loose_long = ThresholdConfig {
            fractal_max: Some(0.8),
            ..Default::default()
        };
        let evaluator = SignalEvaluator::new(ThresholdConfig::short_default(), loose_long);
        let eval = evaluator.evaluate(&state(Some(0.6), 1.5, 40.0, MarketRegime::Volatile));

        assert!(eval.short.all_met());
        assert!(eval.long.all_met());
        assert_eq!(eval.signal, Signal::Short);
    }

    #[test]
    fn test_missing_fractal_never_matches() {
        let eval = SignalEvaluator::default().evaluate(&state(
            None,
            1.5,
            40.0,
            MarketRegime::Volatile,
        ));
        assert_eq!(eval.signal, Signal::None);
        assert!(!eval.short.fractal);
        assert_eq!(eval.short.met_count(), 3);
        // No signal still reports the SHORT conditions.
        assert_eq!(eval.conditions, eval.short);
    }

    #[test]
    fn test_unknown_regime_fails_requirement() {
        let eval = SignalEvaluator::default().evaluate(&state(
            Some(0.6),
            1.5,
            40.0,
            MarketRegime::Unknown,
        ));
        assert_eq!(eval.signal, Signal::None);
        assert!(!eval.short.regime);

        let unknown_required = ThresholdConfig {
            regime: Some(MarketRegime::Unknown),
            ..Default::default()
        };
        let c = unknown_required.conditions(&state(None, 1.0, 20.0, MarketRegime::Unknown));
        assert!(!c.regime);
    }

    #[test]
    fn test_bounds_are_strict() {
        let eval = SignalEvaluator::default().evaluate(&state(
            Some(0.6),
            1.2,
            25.0,
            MarketRegime::Volatile,
        ));
        assert!(!eval.short.sentiment);
        assert!(!eval.short.volatility);
        assert_eq!(eval.signal, Signal::None);
    }
}
