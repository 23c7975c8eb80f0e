//! Synthetic put/call-ratio-like sentiment score.
//!
//! `score = base + volatility_weight * (vix / volatility_pivot - 1)
//!          - momentum_weight * mean(return over momentum_window days)`,
//! clipped to `[floor, ceiling]`.
//!
//! High volatility and falling prices push the score up (fear); calm, rising
//! markets push it down (complacency). This approximates an options
//! sentiment feed that is not available; it is not a forecast.

use serde::{Deserialize, Serialize};

use super::stats::rolling_mean;

/// Coefficients of the sentiment formula.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SentimentConfig {
    pub base: f64,
    pub volatility_weight: f64,
    /// Volatility level considered neutral.
    pub volatility_pivot: f64,
    pub momentum_weight: f64,
    /// Trailing days averaged for the momentum term.
    pub momentum_window: usize,
    pub floor: f64,
    pub ceiling: f64,
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            base: 0.8,
            volatility_weight: 0.3,
            volatility_pivot: 20.0,
            momentum_weight: 10.0,
            momentum_window: 5,
            floor: 0.3,
            ceiling: 2.5,
        }
    }
}

/// Deterministic sentiment proxy.
#[derive(Debug, Clone, Default)]
pub struct SentimentProxy {
    config: SentimentConfig,
}

impl SentimentProxy {
    pub fn new(config: SentimentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SentimentConfig {
        &self.config
    }

    /// Score for a single day from its volatility level and trailing mean return.
    pub fn score(&self, volatility: f64, mean_return: f64) -> f64 {
        let c = &self.config;
        let raw = c.base + c.volatility_weight * (volatility / c.volatility_pivot - 1.0)
            - c.momentum_weight * mean_return;
        raw.clamp(c.floor, c.ceiling)
    }

    /// Per-day scores aligned with the inputs.
    ///
    /// A day is `None` until `momentum_window` returns are available.
    pub fn compute(&self, volatility: &[f64], returns: &[Option<f64>]) -> Vec<Option<f64>> {
        let momentum = rolling_mean(returns, self.config.momentum_window);
        volatility
            .iter()
            .zip(momentum)
            .map(|(vix, m)| m.map(|m| self.score(*vix, m)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_neutral_market_scores_base() {
        let proxy = SentimentProxy::default();
        assert_relative_eq!(proxy.score(20.0, 0.0), 0.8, epsilon = 1e-12);
    }

    #[test]
    fn test_fear_raises_score() {
        let proxy = SentimentProxy::default();
        // 0.8 + 0.3 * (30/20 - 1) + 10 * 0.02 = 1.15
        assert_relative_eq!(proxy.score(30.0, -0.02), 1.15, epsilon = 1e-12);
    }

    #[test]
    fn test_score_is_clipped() {
        let proxy = SentimentProxy::default();
        assert_relative_eq!(proxy.score(80.0, -0.10), 2.5);
        assert_relative_eq!(proxy.score(10.0, 0.10), 0.3);
    }

    #[test]
    fn test_compute_waits_for_momentum_window() {
        let proxy = SentimentProxy::default();
        let vix = vec![20.0; 7];
        let mut returns = vec![Some(0.0); 7];
        returns[0] = None;

        let scores = proxy.compute(&vix, &returns);
        assert_eq!(scores.len(), 7);
        assert!(scores[..5].iter().all(|s| s.is_none()));
        assert_relative_eq!(scores[5].unwrap(), 0.8, epsilon = 1e-12);
        assert_relative_eq!(scores[6].unwrap(), 0.8, epsilon = 1e-12);
    }
}
