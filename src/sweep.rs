//! Parameter sweeps over the trade simulator.
//!
//! Signals are computed once; every grid combination replays them through its
//! own [`TradeSimulator`] in parallel.

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::backtest::{BacktestResult, SignalEvent, TradeSimulator, TradingConfig};
use crate::data::SeriesWindow;
use crate::metrics::MetricsCalculator;
use crate::signal::DailyEvaluation;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SweepError {
    #[error("Parameter grid has no combinations")]
    EmptyGrid,

    #[error("No actionable signals to replay")]
    NoSignals,
}

/// Parameter values to sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterGrid {
    /// Sleeve size, percent of portfolio.
    pub position_size_pct: Vec<f64>,
    /// Gain targets, percent; `None` disables the target.
    pub gain_target_pct: Vec<Option<f64>>,
    /// Stop losses, percent; `None` disables the stop.
    pub stop_loss_pct: Vec<Option<f64>>,
    pub max_hold_days: Vec<usize>,
}

impl Default for ParameterGrid {
    fn default() -> Self {
        Self {
            position_size_pct: vec![2.0, 3.0, 5.0],
            gain_target_pct: vec![Some(20.0), Some(30.0), Some(40.0)],
            stop_loss_pct: vec![Some(3.0), Some(5.0), Some(8.0)],
            max_hold_days: vec![5, 8, 12, 25],
        }
    }
}

impl ParameterGrid {
    /// Calculate total number of parameter combinations.
    pub fn total_combinations(&self) -> usize {
        self.position_size_pct.len()
            * self.gain_target_pct.len()
            * self.stop_loss_pct.len()
            * self.max_hold_days.len()
    }

    /// Generate all parameter combinations.
    pub fn combinations(&self) -> Vec<ParameterSet> {
        let mut combos = Vec::with_capacity(self.total_combinations());

        for &position_size_pct in &self.position_size_pct {
            for &gain_target_pct in &self.gain_target_pct {
                for &stop_loss_pct in &self.stop_loss_pct {
                    for &max_hold_days in &self.max_hold_days {
                        combos.push(ParameterSet {
                            position_size_pct,
                            gain_target_pct,
                            stop_loss_pct,
                            max_hold_days,
                        });
                    }
                }
            }
        }

        combos
    }
}

/// A single parameter set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub position_size_pct: f64,
    pub gain_target_pct: Option<f64>,
    pub stop_loss_pct: Option<f64>,
    pub max_hold_days: usize,
}

impl ParameterSet {
    /// Apply this parameter set to a trading config.
    pub fn apply_to_config(&self, config: &mut TradingConfig) {
        config.position_size_pct = self.position_size_pct;
        config.gain_target_pct = self.gain_target_pct;
        config.stop_loss_pct = self.stop_loss_pct;
        config.max_hold_days = self.max_hold_days;
    }

    /// Create a unique key for this parameter set.
    pub fn key(&self) -> String {
        let pct = |v: Option<f64>| v.map_or_else(|| "off".to_string(), |p| format!("{p:.0}"));
        format!(
            "size{:.1}_gain{}_stop{}_hold{}",
            self.position_size_pct,
            pct(self.gain_target_pct),
            pct(self.stop_loss_pct),
            self.max_hold_days
        )
    }
}

/// Summary of one sweep run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepSummary {
    pub params: ParameterSet,
    pub total_return_pct: f64,
    pub cagr: f64,
    pub win_rate: f64,
    pub max_drawdown_pct: f64,
    pub total_trades: usize,
    pub final_value: Decimal,
}

impl From<(&ParameterSet, &BacktestResult)> for SweepSummary {
    fn from((params, result): (&ParameterSet, &BacktestResult)) -> Self {
        let metrics = MetricsCalculator::calculate(result);
        Self {
            params: params.clone(),
            total_return_pct: metrics.total_return_pct,
            cagr: metrics.cagr,
            win_rate: metrics.win_rate,
            max_drawdown_pct: metrics.max_drawdown_pct,
            total_trades: metrics.total_trades,
            final_value: metrics.final_value,
        }
    }
}

/// Runs ranked by total return, best first.
#[derive(Debug, Clone, Serialize)]
pub struct SweepResult {
    pub runs: Vec<SweepSummary>,
}

impl SweepResult {
    pub fn best(&self) -> Option<&SweepSummary> {
        self.runs.first()
    }

    /// Table of the top `n` runs.
    pub fn summary(&self, n: usize) -> String {
        let mut out = format!(
            "Parameter Sweep: {} runs\n\
             {:<36} {:>10} {:>8} {:>8} {:>8} {:>7}",
            self.runs.len(),
            "Parameters",
            "Return %",
            "CAGR %",
            "Win %",
            "MaxDD %",
            "Trades"
        );
        for run in self.runs.iter().take(n) {
            out.push_str(&format!(
                "\n{:<36} {:>10.2} {:>8.2} {:>8.1} {:>8.2} {:>7}",
                run.params.key(),
                run.total_return_pct,
                run.cagr,
                run.win_rate * 100.0,
                run.max_drawdown_pct,
                run.total_trades
            ));
        }
        out
    }
}

/// Parallel grid search over trading parameters.
#[derive(Debug, Clone, Default)]
pub struct SweepRunner {
    param_grid: ParameterGrid,
    base_config: TradingConfig,
}

impl SweepRunner {
    pub fn new(base_config: TradingConfig) -> Self {
        Self {
            param_grid: ParameterGrid::default(),
            base_config,
        }
    }

    /// Set parameter grid.
    pub fn with_param_grid(mut self, grid: ParameterGrid) -> Self {
        self.param_grid = grid;
        self
    }

    pub fn param_grid(&self) -> &ParameterGrid {
        &self.param_grid
    }

    pub fn run(
        &self,
        series: &SeriesWindow,
        evaluations: &[DailyEvaluation],
    ) -> Result<SweepResult, SweepError> {
        self.run_with_progress(series, evaluations, |_, _| {})
    }

    /// Replay `evaluations` once per combination, calling
    /// `on_progress(done, total)` as runs finish.
    pub fn run_with_progress<F>(
        &self,
        series: &SeriesWindow,
        evaluations: &[DailyEvaluation],
        on_progress: F,
    ) -> Result<SweepResult, SweepError>
    where
        F: Fn(usize, usize) + Sync,
    {
        let combinations = self.param_grid.combinations();
        if combinations.is_empty() {
            return Err(SweepError::EmptyGrid);
        }

        let events: Vec<SignalEvent> = evaluations
            .iter()
            .filter(|e| e.signal().is_actionable())
            .map(SignalEvent::from)
            .collect();
        if events.is_empty() {
            return Err(SweepError::NoSignals);
        }

        // Same opening date as a full replay of `evaluations`.
        let start_index = evaluations.first().map_or(0, |e| e.index);

        let total = combinations.len();
        info!(
            combinations = total,
            signals = events.len(),
            "Running parameter sweep"
        );

        let progress = AtomicUsize::new(0);
        let mut runs: Vec<SweepSummary> = combinations
            .par_iter()
            .map(|params| {
                let mut config = self.base_config.clone();
                params.apply_to_config(&mut config);

                let simulator = TradeSimulator::new(config);
                let result = simulator.run_events_from(series, start_index, &events);

                let done = progress.fetch_add(1, Ordering::Relaxed) + 1;
                on_progress(done, total);
                if done % (total / 10).max(1) == 0 || done == total {
                    info!(
                        "  Sweep: {:.0}% ({}/{} combinations)",
                        done as f64 / total as f64 * 100.0,
                        done,
                        total
                    );
                }

                SweepSummary::from((params, &result))
            })
            .collect();

        runs.sort_by(|a, b| {
            b.total_return_pct
                .partial_cmp(&a.total_return_pct)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        if let Some(best) = runs.first() {
            info!(
                "Sweep complete: best params = {}, return = {:.2}%",
                best.params.key(),
                best.total_return_pct
            );
        }

        Ok(SweepResult { runs })
    }
}
