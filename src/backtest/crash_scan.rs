//! Forward drawdown after each signal.
//!
//! For every LONG/SHORT signal, finds the lowest close in the `horizon`
//! observations following the signal date (the signal day included) and
//! reports how far and how fast the index fell.

use chrono::NaiveDate;
use serde::Serialize;
use statrs::statistics::{Data, Median};

use crate::data::SeriesWindow;
use crate::signal::{DailyEvaluation, MarketState, Signal};

/// Default forward horizon in observations.
pub const DEFAULT_HORIZON: usize = 60;

/// Lowest close reached after a signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubsequentLow {
    pub low_date: NaiveDate,
    pub low_price: f64,
    /// `(low - entry) / entry`, percent; zero or negative.
    pub drop_pct: f64,
    /// Calendar days from signal to low.
    pub days_to_low: i64,
}

/// One scanned signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrashSignal {
    pub index: usize,
    pub date: NaiveDate,
    pub signal: Signal,
    pub state: MarketState,
    /// `None` when the signal is on the last observation.
    pub low: Option<SubsequentLow>,
}

/// Aggregate drawdown statistics over all signals with a forward window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrashScanSummary {
    pub total_signals: usize,
    pub signals_with_data: usize,
    pub mean_drop_pct: f64,
    pub median_drop_pct: f64,
    /// Most negative drop.
    pub worst_drop_pct: f64,
    /// Least negative drop.
    pub mildest_drop_pct: f64,
    pub mean_days_to_low: f64,
}

/// Looks forward from each signal for the subsequent low.
#[derive(Debug, Clone)]
pub struct CrashScan {
    horizon: usize,
}

impl Default for CrashScan {
    fn default() -> Self {
        Self::new(DEFAULT_HORIZON)
    }
}

impl CrashScan {
    pub fn new(horizon: usize) -> Self {
        Self { horizon }
    }

    /// Lowest close in `[index, index + horizon]`, first occurrence on ties.
    pub fn subsequent_low(&self, series: &SeriesWindow, index: usize) -> Option<SubsequentLow> {
        let obs = series.observations();
        let entry = obs.get(index)?;
        let forward = self.horizon.min(obs.len() - index - 1);
        if forward == 0 {
            return None;
        }

        let low = obs[index..=index + forward]
            .iter()
            .fold(entry, |lo, o| if o.close < lo.close { o } else { lo });

        Some(SubsequentLow {
            low_date: low.date,
            low_price: low.close,
            drop_pct: (low.close - entry.close) / entry.close * 100.0,
            days_to_low: (low.date - entry.date).num_days(),
        })
    }

    /// Scan every actionable evaluation.
    pub fn scan(&self, series: &SeriesWindow, evaluations: &[DailyEvaluation]) -> Vec<CrashSignal> {
        evaluations
            .iter()
            .filter(|e| e.signal().is_actionable())
            .map(|e| CrashSignal {
                index: e.index,
                date: e.date,
                signal: e.signal(),
                state: e.state.clone(),
                low: self.subsequent_low(series, e.index),
            })
            .collect()
    }

    pub fn summarize(signals: &[CrashSignal]) -> Option<CrashScanSummary> {
        let lows: Vec<&SubsequentLow> = signals.iter().filter_map(|s| s.low.as_ref()).collect();
        if lows.is_empty() {
            return None;
        }

        let drops: Vec<f64> = lows.iter().map(|l| l.drop_pct).collect();
        let n = drops.len() as f64;

        Some(CrashScanSummary {
            total_signals: signals.len(),
            signals_with_data: lows.len(),
            mean_drop_pct: drops.iter().sum::<f64>() / n,
            median_drop_pct: Data::new(drops.clone()).median(),
            worst_drop_pct: drops.iter().copied().fold(f64::INFINITY, f64::min),
            mildest_drop_pct: drops.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            mean_days_to_low: lows.iter().map(|l| l.days_to_low as f64).sum::<f64>() / n,
        })
    }
}
