//! Indicator engine.
//!
//! Combines the fractal estimator, regime classifier and sentiment proxy into
//! one [`MarketState`] snapshot for the last day of a window.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use crate::data::SeriesView;
use crate::indicators::{FractalConfig, FractalEstimator, SentimentConfig, SentimentProxy};
use crate::regime::{MarketRegime, RegimeClassifier, RegimeConfig};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndicatorError {
    #[error("Window too short: {actual} observations, need {required}")]
    WindowTooShort { required: usize, actual: usize },

    #[error("Sentiment unavailable on {0}: not enough return history")]
    MissingSentiment(NaiveDate),

    #[error("Non-finite {field} on {date}")]
    NonFinite { field: &'static str, date: NaiveDate },
}

/// Indicator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    /// Shortest window `evaluate` accepts.
    pub min_data_points: usize,
    pub fractal: FractalConfig,
    pub sentiment: SentimentConfig,
    pub regime: RegimeConfig,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            min_data_points: 60,
            fractal: FractalConfig::default(),
            sentiment: SentimentConfig::default(),
            regime: RegimeConfig::default(),
        }
    }
}

/// Indicator snapshot for one evaluation date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketState {
    pub date: NaiveDate,
    pub price: f64,
    /// `None` when the window was too short or degenerate.
    pub fractal_dimension: Option<f64>,
    pub volatility_index: f64,
    pub sentiment_proxy: f64,
    pub regime: MarketRegime,
    /// Last date of the window the state was computed from.
    pub source_window_end: NaiveDate,
    pub source_window_len: usize,
}

/// Computes a [`MarketState`] from a series window.
#[derive(Debug, Clone, Default)]
pub struct IndicatorEngine {
    config: IndicatorConfig,
    fractal: FractalEstimator,
    sentiment: SentimentProxy,
    regime: RegimeClassifier,
}

impl IndicatorEngine {
    pub fn new(config: IndicatorConfig) -> Self {
        Self {
            fractal: FractalEstimator::new(config.fractal.clone()),
            sentiment: SentimentProxy::new(config.sentiment.clone()),
            regime: RegimeClassifier::new(config.regime.clone()),
            config,
        }
    }

    pub fn config(&self) -> &IndicatorConfig {
        &self.config
    }

    /// State of the last day in `window`.
    ///
    /// The regime model is fit from this window alone.
    pub fn evaluate(&self, window: SeriesView<'_>) -> Result<MarketState, IndicatorError> {
        let required = self.config.min_data_points.max(1);
        let last = match window.last() {
            Some(last) if window.len() >= required => last,
            _ => {
                return Err(IndicatorError::WindowTooShort {
                    required,
                    actual: window.len(),
                })
            }
        };

        if !last.volatility_index.is_finite() {
            return Err(IndicatorError::NonFinite {
                field: "volatility_index",
                date: last.date,
            });
        }

        let closes = window.tail_closes(self.config.fractal.window);
        let fractal_dimension = self.fractal.estimate(&closes);

        let returns = window.returns();
        let regime = self.regime.current_regime(&returns);

        let sentiment_proxy = self
            .sentiment
            .compute(&window.volatility(), &returns)
            .last()
            .copied()
            .flatten()
            .ok_or(IndicatorError::MissingSentiment(last.date))?;

        trace!(
            date = %last.date,
            fractal = ?fractal_dimension,
            sentiment = sentiment_proxy,
            regime = %regime,
            "Indicators evaluated"
        );

        Ok(MarketState {
            date: last.date,
            price: last.close,
            fractal_dimension,
            volatility_index: last.volatility_index,
            sentiment_proxy,
            regime,
            source_window_end: last.date,
            source_window_len: window.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SeriesWindow;
    use crate::signal::{Signal, SignalEvaluator};
    use approx::assert_relative_eq;
    use chrono::Duration;

    fn flat_series(days: usize, price: f64, vix: f64) -> SeriesWindow {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        SeriesWindow::from_rows(
            (0..days).map(|i| (start + Duration::days(i as i64), price, vix, None)),
        )
        .unwrap()
    }

    #[test]
    fn test_flat_window_produces_neutral_state() {
        let series = flat_series(90, 4500.0, 20.0);
        let engine = IndicatorEngine::default();
        let state = engine.evaluate(series.as_view()).unwrap();

        assert_eq!(state.volatility_index, 20.0);
        assert_eq!(state.price, 4500.0);
        assert_relative_eq!(state.sentiment_proxy, 0.8, epsilon = 1e-12);
        assert!(state.fractal_dimension.is_none());
        assert_eq!(state.source_window_len, 90);

        let evaluation = SignalEvaluator::default().evaluate(&state);
        assert_eq!(evaluation.signal, Signal::None);
        assert!(!evaluation.short.fractal);
    }

    #[test]
    fn test_short_window_rejected() {
        let series = flat_series(59, 4500.0, 20.0);
        let err = IndicatorEngine::default()
            .evaluate(series.as_view())
            .unwrap_err();
        assert_eq!(
            err,
            IndicatorError::WindowTooShort {
                required: 60,
                actual: 59
            }
        );
    }

    #[test]
    fn test_state_reads_latest_values() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let rows: Vec<_> = (0..91)
            .map(|i| {
                let t = i as f64;
                let price = 4000.0 * (1.0 + 0.01 * (t * 0.7).sin()) + t;
                (start + Duration::days(i as i64), price, 15.0 + 0.1 * t, None)
            })
            .collect();
        let series = SeriesWindow::from_rows(rows).unwrap();
        let engine = IndicatorEngine::default();

        let state = engine.evaluate(series.view(90, 91).unwrap()).unwrap();
        let last = series.get(90).unwrap();
        assert_eq!(state.date, last.date);
        assert_eq!(state.price, last.close);
        assert_relative_eq!(state.volatility_index, 24.0, epsilon = 1e-9);
        assert!(state.fractal_dimension.is_some());
        assert!(state.sentiment_proxy >= 0.3 && state.sentiment_proxy <= 2.5);

        // Same window, same state.
        assert_eq!(engine.evaluate(series.view(90, 91).unwrap()).unwrap(), state);
    }
}
