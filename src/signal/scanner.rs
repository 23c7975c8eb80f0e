//! Rolling signal evaluation over a full history.
//!
//! Every evaluation date sees only the `lookback_days + 1` observations ending
//! at that date, so dates are independent and are evaluated in parallel.

use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::engine::{IndicatorEngine, MarketState};
use super::evaluator::{Signal, SignalEvaluation, SignalEvaluator};
use crate::data::SeriesWindow;

/// Window settings for a historical scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Observations before the evaluation date included in its window.
    pub lookback_days: usize,
    /// Dates whose window is shorter than this are skipped.
    pub min_data_points: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            lookback_days: 90,
            min_data_points: 60,
        }
    }
}

/// Indicator state and signal for one date of a scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyEvaluation {
    /// Index of the evaluation date in the scanned series.
    pub index: usize,
    pub date: NaiveDate,
    pub state: MarketState,
    pub evaluation: SignalEvaluation,
}

impl DailyEvaluation {
    pub fn signal(&self) -> Signal {
        self.evaluation.signal
    }
}

/// Evaluates the indicator engine and signal rules at every date.
#[derive(Debug, Clone, Default)]
pub struct SignalScanner {
    config: ScanConfig,
    engine: IndicatorEngine,
    evaluator: SignalEvaluator,
}

impl SignalScanner {
    pub fn new(config: ScanConfig, engine: IndicatorEngine, evaluator: SignalEvaluator) -> Self {
        Self {
            config,
            engine,
            evaluator,
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn engine(&self) -> &IndicatorEngine {
        &self.engine
    }

    pub fn evaluator(&self) -> &SignalEvaluator {
        &self.evaluator
    }

    /// Evaluate a single date (window ending at `index`).
    pub fn evaluate_at(&self, series: &SeriesWindow, index: usize) -> Option<DailyEvaluation> {
        let len = (self.config.lookback_days + 1).min(index + 1);
        if len < self.config.min_data_points {
            return None;
        }

        let window = match series.view(index, len) {
            Ok(w) => w,
            Err(e) => {
                warn!(index, error = %e, "Scan: invalid window, skipping date");
                return None;
            }
        };

        match self.engine.evaluate(window) {
            Ok(state) => {
                let evaluation = self.evaluator.evaluate(&state);
                Some(DailyEvaluation {
                    index,
                    date: state.date,
                    state,
                    evaluation,
                })
            }
            Err(e) => {
                warn!(index, error = %e, "Scan: indicator evaluation failed, skipping date");
                None
            }
        }
    }

    /// Evaluate every date with a full lookback window, in date order.
    pub fn scan(&self, series: &SeriesWindow) -> Vec<DailyEvaluation> {
        self.scan_with_progress(series, |_, _| {})
    }

    /// [`scan`](Self::scan), calling `on_progress(done, total)` after each date.
    pub fn scan_with_progress<F>(
        &self,
        series: &SeriesWindow,
        on_progress: F,
    ) -> Vec<DailyEvaluation>
    where
        F: Fn(usize, usize) + Sync,
    {
        let start = self.config.lookback_days;
        let indices: Vec<usize> = (start..series.len()).collect();
        let total = indices.len();

        info!(
            dates = total,
            lookback_days = self.config.lookback_days,
            "Scanning evaluation dates"
        );

        let progress = AtomicUsize::new(0);
        let evaluations: Vec<DailyEvaluation> = indices
            .par_iter()
            .filter_map(|&i| {
                let result = self.evaluate_at(series, i);

                let done = progress.fetch_add(1, Ordering::Relaxed) + 1;
                on_progress(done, total);
                if done % (total / 10).max(1) == 0 || done == total {
                    info!(
                        "  Scan: {:.0}% ({}/{} dates)",
                        done as f64 / total as f64 * 100.0,
                        done,
                        total
                    );
                }

                result
            })
            .collect();

        let signals = evaluations
            .iter()
            .filter(|e| e.signal().is_actionable())
            .count();
        info!(
            evaluated = evaluations.len(),
            signals, "Scan complete"
        );

        evaluations
    }

    /// Only the dates that produced a LONG or SHORT signal.
    pub fn signals(&self, series: &SeriesWindow) -> Vec<DailyEvaluation> {
        self.scan(series)
            .into_iter()
            .filter(|e| e.signal().is_actionable())
            .collect()
    }

    /// Evaluate the latest date of `series`.
    pub fn latest(&self, series: &SeriesWindow) -> Option<DailyEvaluation> {
        series
            .len()
            .checked_sub(1)
            .and_then(|last| self.evaluate_at(series, last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn wavy_series(days: usize) -> SeriesWindow {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        SeriesWindow::from_rows((0..days).map(|i| {
            let t = i as f64;
            (
                start + Duration::days(i as i64),
                4000.0 + 30.0 * (t * 0.3).sin() + t,
                18.0 + 2.0 * (t * 0.2).cos(),
                None,
            )
        }))
        .unwrap()
    }

    #[test]
    fn test_scan_starts_after_lookback() {
        let series = wavy_series(100);
        let scanner = SignalScanner::default();
        let evals = scanner.scan(&series);

        assert_eq!(evals.len(), 10);
        assert_eq!(evals[0].index, 90);
        assert_eq!(evals[9].index, 99);
        assert!(evals.windows(2).all(|w| w[0].index < w[1].index));
        assert!(evals.iter().all(|e| e.state.source_window_len == 91));
    }

    #[test]
    fn test_window_never_sees_the_future() {
        let series = wavy_series(100);
        let scanner = SignalScanner::default();
        let full = scanner.evaluate_at(&series, 95).unwrap();

        let truncated = SeriesWindow::from_rows(
            series.observations()[..96]
                .iter()
                .map(|o| (o.date, o.close, o.volatility_index, o.instrument)),
        )
        .unwrap();
        let past_only = scanner.evaluate_at(&truncated, 95).unwrap();

        assert_eq!(full.state, past_only.state);
    }

    #[test]
    fn test_short_history_skipped() {
        let series = wavy_series(80);
        let scanner = SignalScanner::new(
            ScanConfig {
                lookback_days: 90,
                min_data_points: 60,
            },
            IndicatorEngine::default(),
            SignalEvaluator::default(),
        );
        assert!(scanner.evaluate_at(&series, 50).is_none());
        assert!(scanner.evaluate_at(&series, 79).is_some());
        assert!(scanner.scan(&series).is_empty());

        let calls = AtomicUsize::new(0);
        let evals = SignalScanner::default().scan_with_progress(&wavy_series(95), |done, total| {
            assert!(done <= total);
            calls.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(evals.len(), 5);
        assert_eq!(calls.load(Ordering::Relaxed), 5);
        assert_eq!(scanner.latest(&series).unwrap().index, 79);
    }
}
