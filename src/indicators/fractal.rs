//! Fractal dimension via Hurst exponent (rescaled-range analysis).
//!
//! Lower values indicate a smooth, trending path (volatility compression);
//! values near 1.5 are random-walk-like, higher values are choppy.
//!
//! For each lag `L` in `2..max_lag` the log-price series is split into
//! `n / L` non-overlapping chunks. Each chunk contributes `R / S` where `R` is
//! the range of the mean-centred cumulative sum and `S` the chunk's population
//! standard deviation (chunks with `S == 0` are skipped). The slope of
//! `ln(mean R/S)` against `ln(L)` is the Hurst exponent `H`, and the fractal
//! dimension is `2 - H`.

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::stats::{mean, ols_slope, population_std};

/// Fractal estimator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FractalConfig {
    /// Trailing closes fed to the estimator.
    pub window: usize,
    /// Exclusive upper bound on the lag range; input must hold `2 * max_lag` prices.
    pub max_lag: usize,
}

impl Default for FractalConfig {
    fn default() -> Self {
        Self {
            window: 60,
            max_lag: 20,
        }
    }
}

/// Rescaled-range fractal dimension estimator.
#[derive(Debug, Clone, Default)]
pub struct FractalEstimator {
    config: FractalConfig,
}

impl FractalEstimator {
    pub fn new(config: FractalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FractalConfig {
        &self.config
    }

    /// Fractal dimension of `prices` using the configured `max_lag`.
    pub fn estimate(&self, prices: &[f64]) -> Option<f64> {
        Self::estimate_with_lag(prices, self.config.max_lag)
    }

    /// Fractal dimension `2 - H`, or `None` when unavailable.
    ///
    /// Never panics: short input, non-positive prices and degenerate
    /// regressions all yield `None`.
    pub fn estimate_with_lag(prices: &[f64], max_lag: usize) -> Option<f64> {
        Self::hurst_exponent(prices, max_lag).map(|h| 2.0 - h)
    }

    /// Hurst exponent from R/S analysis.
    pub fn hurst_exponent(prices: &[f64], max_lag: usize) -> Option<f64> {
        if max_lag < 3 || prices.len() < max_lag * 2 {
            trace!(len = prices.len(), max_lag, "Fractal: insufficient data");
            return None;
        }
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            trace!("Fractal: non-positive price in input");
            return None;
        }

        let log_prices: Vec<f64> = prices.iter().map(|p| p.ln()).collect();

        let mut log_lags = Vec::with_capacity(max_lag);
        let mut log_rs = Vec::with_capacity(max_lag);

        for lag in 2..max_lag {
            if let Some(avg_rs) = Self::average_rescaled_range(&log_prices, lag) {
                log_lags.push((lag as f64).ln());
                log_rs.push(avg_rs.ln());
            }
        }

        let hurst = ols_slope(&log_lags, &log_rs);

        trace!(
            lags = log_lags.len(),
            hurst = ?hurst,
            "Fractal: Hurst exponent computed"
        );

        hurst
    }

    /// Mean R/S over the non-overlapping chunks of length `lag`.
    fn average_rescaled_range(series: &[f64], lag: usize) -> Option<f64> {
        let chunks = series.len() / lag;
        if chunks == 0 {
            return None;
        }

        let rs_values: Vec<f64> = series
            .chunks_exact(lag)
            .filter_map(|chunk| {
                let m = mean(chunk)?;
                let s = population_std(chunk)?;
                if s <= 0.0 {
                    return None;
                }

                let mut running = 0.0;
                let mut lo = f64::INFINITY;
                let mut hi = f64::NEG_INFINITY;
                for v in chunk {
                    running += v - m;
                    lo = lo.min(running);
                    hi = hi.max(running);
                }

                Some((hi - lo) / s)
            })
            .collect();

        mean(&rs_values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trending_series(len: usize) -> Vec<f64> {
        let mut v = Vec::with_capacity(len);
        let mut price = 100.0;
        for i in 0..len {
            price += 0.5 + 0.1 * (i as f64).sin().abs();
            v.push(price);
        }
        v
    }

    fn choppy_series(len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| if i % 2 == 0 { 105.0 } else { 95.0 })
            .collect()
    }

    #[test]
    fn test_short_input_returns_none() {
        let estimator = FractalEstimator::default();
        for len in [0, 1, 10, 39] {
            assert!(estimator.estimate(&trending_series(len)).is_none());
        }
        assert!(estimator.estimate(&trending_series(40)).is_some());
    }

    #[test]
    fn test_flat_series_returns_none() {
        let estimator = FractalEstimator::default();
        assert!(estimator.estimate(&vec![42.0; 60]).is_none());
    }

    #[test]
    fn test_non_positive_prices_return_none() {
        let mut prices = trending_series(60);
        prices[10] = 0.0;
        assert!(FractalEstimator::default().estimate(&prices).is_none());
    }

    #[test]
    fn test_linear_log_trend_is_reproducible() {
        let prices: Vec<f64> = (0..60).map(|i| (4.0 + 0.01 * i as f64).exp()).collect();
        let a = FractalEstimator::estimate_with_lag(&prices, 20);
        let b = FractalEstimator::estimate_with_lag(&prices, 20);
        assert!(a.is_some());
        assert_eq!(a, b);
        assert!(a.unwrap().is_finite());
    }

    #[test]
    fn test_trending_smoother_than_choppy() {
        let trend = FractalEstimator::estimate_with_lag(&trending_series(60), 20).unwrap();
        let chop = FractalEstimator::estimate_with_lag(&choppy_series(60), 20).unwrap();
        assert!(
            trend < chop,
            "trend dimension {:.3} should be below choppy {:.3}",
            trend,
            chop
        );
    }

    #[test]
    fn test_degenerate_lag_bound() {
        assert!(FractalEstimator::estimate_with_lag(&trending_series(60), 2).is_none());
    }
}
