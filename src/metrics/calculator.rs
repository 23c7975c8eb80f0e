//! Performance metrics calculator.
//!
//! Per-trade and portfolio statistics for a completed simulation.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median};

use super::DAYS_PER_YEAR;
use crate::backtest::{BacktestResult, EquityPoint, ExitReason, Trade};

/// Count and share of trades closed for one reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitCount {
    pub reason: ExitReason,
    pub count: usize,
    /// Percent of all trades.
    pub pct: f64,
    pub avg_hold_days: f64,
}

/// Performance metrics for a trade simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    // Basic statistics
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,

    // Portfolio
    pub initial_capital: Decimal,
    pub final_value: Decimal,
    pub total_pnl: Decimal,
    pub total_return_pct: f64,
    /// Years from first entry to last exit.
    pub span_years: f64,
    pub cagr: f64,
    pub trades_per_year: f64,

    // Portfolio return per trade, percent
    pub avg_return_pct: f64,
    pub median_return_pct: f64,
    pub best_return_pct: f64,
    pub worst_return_pct: f64,

    // Sleeve return per trade, percent
    pub avg_sleeve_return_pct: f64,
    pub best_sleeve_return_pct: f64,
    pub worst_sleeve_return_pct: f64,

    // Risk
    pub max_drawdown: Decimal,
    pub max_drawdown_pct: f64,

    pub avg_days_in_trade: f64,
    pub exits: Vec<ExitCount>,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self {
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate: 0.0,
            initial_capital: Decimal::ZERO,
            final_value: Decimal::ZERO,
            total_pnl: Decimal::ZERO,
            total_return_pct: 0.0,
            span_years: 0.0,
            cagr: 0.0,
            trades_per_year: 0.0,
            avg_return_pct: 0.0,
            median_return_pct: 0.0,
            best_return_pct: 0.0,
            worst_return_pct: 0.0,
            avg_sleeve_return_pct: 0.0,
            best_sleeve_return_pct: 0.0,
            worst_sleeve_return_pct: 0.0,
            max_drawdown: Decimal::ZERO,
            max_drawdown_pct: 0.0,
            avg_days_in_trade: 0.0,
            exits: Vec::new(),
        }
    }
}

impl PerformanceMetrics {
    /// Generate a summary report.
    pub fn summary(&self) -> String {
        let exits = self
            .exits
            .iter()
            .map(|e| format!("  {}: {} ({:.1}%)", e.reason, e.count, e.pct))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "Performance Summary\n\
             ====================\n\
             \n\
             Trades: {} (W: {}, L: {})\n\
             Win Rate: {:.1}%\n\
             \n\
             Initial Capital: ${:.2}\n\
             Final Value: ${:.2}\n\
             Total P&L: ${:.2}\n\
             Total Return: {:.2}%\n\
             CAGR: {:.2}%\n\
             Trades per Year: {:.1}\n\
             \n\
             Avg Trade: {:.2}%\n\
             Median Trade: {:.2}%\n\
             Best Trade: {:.2}%\n\
             Worst Trade: {:.2}%\n\
             \n\
             Avg Sleeve: {:.2}%\n\
             Best Sleeve: {:.2}%\n\
             Worst Sleeve: {:.2}%\n\
             \n\
             Max Drawdown: {:.2}%\n\
             Avg Days in Trade: {:.1}\n\
             \n\
             Exits:\n{}",
            self.total_trades,
            self.winning_trades,
            self.losing_trades,
            self.win_rate * 100.0,
            self.initial_capital,
            self.final_value,
            self.total_pnl,
            self.total_return_pct,
            self.cagr,
            self.trades_per_year,
            self.avg_return_pct,
            self.median_return_pct,
            self.best_return_pct,
            self.worst_return_pct,
            self.avg_sleeve_return_pct,
            self.best_sleeve_return_pct,
            self.worst_sleeve_return_pct,
            self.max_drawdown_pct,
            self.avg_days_in_trade,
            exits
        )
    }
}

/// Deepest decline of the trade-by-trade equity curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawdownAnalysis {
    pub max_drawdown: Decimal,
    pub max_drawdown_pct: f64,
    pub peak_date: Option<NaiveDate>,
    pub trough_date: Option<NaiveDate>,
    /// Completed declines that later made a new high.
    pub drawdown_periods: usize,
}

/// Metrics calculator.
pub struct MetricsCalculator;

impl MetricsCalculator {
    /// Calculate all metrics from a backtest result.
    pub fn calculate(result: &BacktestResult) -> PerformanceMetrics {
        let trades = &result.trades;
        let total_trades = trades.len();

        let total_pnl = result.final_value - result.initial_capital;
        let mut metrics = PerformanceMetrics {
            total_trades,
            initial_capital: result.initial_capital,
            final_value: result.final_value,
            total_pnl,
            total_return_pct: result.total_return_pct(),
            max_drawdown: result.max_drawdown,
            max_drawdown_pct: result.max_drawdown_pct,
            ..Default::default()
        };

        if trades.is_empty() {
            return metrics;
        }

        let winning_trades = trades.iter().filter(|t| t.is_winner()).count();
        metrics.winning_trades = winning_trades;
        metrics.losing_trades = total_trades - winning_trades;
        metrics.win_rate = winning_trades as f64 / total_trades as f64;

        let returns: Vec<f64> = trades.iter().map(Trade::return_pct).collect();
        metrics.avg_return_pct = mean(&returns);
        metrics.median_return_pct = Data::new(returns.clone()).median();
        metrics.best_return_pct = max(&returns);
        metrics.worst_return_pct = min(&returns);

        let sleeve: Vec<f64> = trades.iter().map(Trade::sleeve_return_pct).collect();
        metrics.avg_sleeve_return_pct = mean(&sleeve);
        metrics.best_sleeve_return_pct = max(&sleeve);
        metrics.worst_sleeve_return_pct = min(&sleeve);

        metrics.avg_days_in_trade =
            trades.iter().map(|t| t.hold_days as f64).sum::<f64>() / total_trades as f64;
        metrics.exits = Self::exit_breakdown(trades);

        if let (Some(first), Some(last)) = (trades.first(), trades.last()) {
            let years = (last.exit_date - first.entry_date).num_days() as f64 / DAYS_PER_YEAR;
            metrics.span_years = years;
            if years > 0.0 {
                metrics.trades_per_year = total_trades as f64 / years;
                metrics.cagr =
                    Self::calculate_cagr(result.initial_capital, result.final_value, years);
            }
        }

        metrics
    }

    /// Calculate CAGR (Compound Annual Growth Rate), percent.
    pub fn calculate_cagr(initial: Decimal, final_val: Decimal, years: f64) -> f64 {
        let init: f64 = initial.try_into().unwrap_or(0.0);
        let fin: f64 = final_val.try_into().unwrap_or(0.0);

        if init <= 0.0 || fin < 0.0 || years <= 0.0 {
            return 0.0;
        }

        ((fin / init).powf(1.0 / years) - 1.0) * 100.0
    }

    /// Trades per exit reason, most frequent first. Reasons with no trades
    /// are left out.
    pub fn exit_breakdown(trades: &[Trade]) -> Vec<ExitCount> {
        let mut counts: Vec<ExitCount> = ExitReason::ALL
            .iter()
            .filter_map(|&reason| {
                let matching: Vec<&Trade> =
                    trades.iter().filter(|t| t.exit_reason == reason).collect();
                if matching.is_empty() {
                    return None;
                }
                Some(ExitCount {
                    reason,
                    count: matching.len(),
                    pct: matching.len() as f64 / trades.len() as f64 * 100.0,
                    avg_hold_days: matching.iter().map(|t| t.hold_days as f64).sum::<f64>()
                        / matching.len() as f64,
                })
            })
            .collect();

        counts.sort_by(|a, b| b.count.cmp(&a.count));
        counts
    }

    /// Analyze drawdown from equity curve.
    pub fn analyze_drawdown(equity_curve: &[EquityPoint]) -> DrawdownAnalysis {
        let Some(first) = equity_curve.first() else {
            return DrawdownAnalysis {
                max_drawdown: Decimal::ZERO,
                max_drawdown_pct: 0.0,
                peak_date: None,
                trough_date: None,
                drawdown_periods: 0,
            };
        };

        let mut peak = first.value;
        let mut peak_date = first.date;
        let mut in_drawdown = false;
        let mut analysis = DrawdownAnalysis {
            max_drawdown: Decimal::ZERO,
            max_drawdown_pct: 0.0,
            peak_date: None,
            trough_date: None,
            drawdown_periods: 0,
        };

        for point in equity_curve {
            if point.value > peak {
                if in_drawdown {
                    analysis.drawdown_periods += 1;
                }
                peak = point.value;
                peak_date = point.date;
                in_drawdown = false;
                continue;
            }

            let drawdown = peak - point.value;
            if drawdown > Decimal::ZERO {
                in_drawdown = true;
            }
            if drawdown > analysis.max_drawdown {
                let dd: f64 = drawdown.try_into().unwrap_or(0.0);
                let pk: f64 = peak.try_into().unwrap_or(1.0);
                analysis.max_drawdown = drawdown;
                analysis.max_drawdown_pct = dd / pk * 100.0;
                analysis.peak_date = Some(peak_date);
                analysis.trough_date = Some(point.date);
            }
        }

        analysis
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

fn min(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::{InstrumentPricing, TradeDirection, TradingConfig};
    use approx::assert_relative_eq;
    use rust_decimal_macros::dec;

    fn trade(
        id: usize,
        entry: NaiveDate,
        exit: NaiveDate,
        before: Decimal,
        after: Decimal,
        sleeve_return: f64,
        reason: ExitReason,
    ) -> Trade {
        Trade {
            id,
            direction: TradeDirection::Short,
            entry_index: 0,
            exit_index: 0,
            entry_date: entry,
            exit_date: exit,
            entry_benchmark: 100.0,
            exit_benchmark: 100.0,
            entry_instrument: 100.0,
            exit_instrument: 100.0,
            pricing: InstrumentPricing::Synthetic,
            exit_reason: reason,
            hold_days: 4,
            benchmark_return: 0.0,
            sleeve_return,
            position_value: dec!(3000),
            portfolio_before: before,
            portfolio_after: after,
            entry_state: None,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn result(trades: Vec<Trade>, final_value: Decimal) -> BacktestResult {
        BacktestResult {
            config: TradingConfig::default(),
            start_date: date(2020, 1, 1),
            end_date: date(2022, 1, 1),
            trades,
            equity_curve: Vec::new(),
            initial_capital: dec!(100000),
            final_value,
            peak_value: final_value,
            max_drawdown: Decimal::ZERO,
            max_drawdown_pct: 0.0,
            signals_seen: 0,
            signals_ignored: 0,
        }
    }

    #[test]
    fn test_cagr() {
        // 100K -> 121K over 2 years = 10% CAGR
        let cagr =
            MetricsCalculator::calculate_cagr(Decimal::from(100000), Decimal::from(121000), 2.0);
        assert_relative_eq!(cagr, 10.0, epsilon = 1e-9);
        assert_eq!(
            MetricsCalculator::calculate_cagr(Decimal::ZERO, Decimal::from(1), 2.0),
            0.0
        );
    }

    #[test]
    fn test_calculate() {
        let trades = vec![
            trade(
                1,
                date(2020, 1, 6),
                date(2020, 1, 10),
                dec!(100000),
                dec!(102000),
                0.30,
                ExitReason::GainTarget,
            ),
            trade(
                2,
                date(2020, 6, 1),
                date(2020, 6, 5),
                dec!(102000),
                dec!(101490),
                -0.05,
                ExitReason::StopLoss,
            ),
            trade(
                3,
                date(2021, 1, 4),
                date(2021, 1, 8),
                dec!(101490),
                dec!(104534.70),
                0.40,
                ExitReason::GainTarget,
            ),
        ];
        let m = MetricsCalculator::calculate(&result(trades, dec!(104534.70)));

        assert_eq!(m.total_trades, 3);
        assert_eq!(m.winning_trades, 2);
        assert_relative_eq!(m.win_rate, 2.0 / 3.0, epsilon = 1e-12);
        assert_eq!(m.total_pnl, dec!(4534.70));
        assert_relative_eq!(m.best_return_pct, 3.0, epsilon = 1e-6);
        assert_relative_eq!(m.worst_return_pct, -0.5, epsilon = 1e-6);
        assert_relative_eq!(m.median_return_pct, 2.0, epsilon = 1e-6);
        assert_relative_eq!(m.best_sleeve_return_pct, 40.0, epsilon = 1e-9);
        assert_relative_eq!(m.worst_sleeve_return_pct, -5.0, epsilon = 1e-9);

        // 2020-01-06 .. 2021-01-08 is 368 days.
        assert_relative_eq!(m.span_years, 368.0 / 365.25, epsilon = 1e-12);
        assert_relative_eq!(m.trades_per_year, 3.0 / (368.0 / 365.25), epsilon = 1e-9);

        assert_eq!(m.exits[0].reason, ExitReason::GainTarget);
        assert_eq!(m.exits[0].count, 2);
        assert_eq!(m.exits[1].reason, ExitReason::StopLoss);
        assert_relative_eq!(m.exits[1].pct, 100.0 / 3.0, epsilon = 1e-9);
        assert!(m.summary().contains("GAIN_TARGET: 2"));
    }

    #[test]
    fn test_no_trades() {
        let m = MetricsCalculator::calculate(&result(Vec::new(), dec!(100000)));
        assert_eq!(m.total_trades, 0);
        assert_eq!(m.win_rate, 0.0);
        assert_eq!(m.cagr, 0.0);
        assert!(m.exits.is_empty());
    }

    #[test]
    fn test_drawdown_analysis() {
        let point = |d: u32, v: Decimal| EquityPoint {
            date: date(2020, 1, d),
            value: v,
            drawdown_pct: 0.0,
        };
        let curve = vec![
            point(1, dec!(100)),
            point(2, dec!(110)),
            point(3, dec!(99)),
            point(4, dec!(105)),
            point(5, dec!(120)),
            point(6, dec!(115)),
        ];
        let a = MetricsCalculator::analyze_drawdown(&curve);
        assert_eq!(a.max_drawdown, dec!(11));
        assert_relative_eq!(a.max_drawdown_pct, 10.0, epsilon = 1e-9);
        assert_eq!(a.peak_date, Some(date(2020, 1, 2)));
        assert_eq!(a.trough_date, Some(date(2020, 1, 3)));
        assert_eq!(a.drawdown_periods, 1);

        assert_eq!(MetricsCalculator::analyze_drawdown(&[]).max_drawdown_pct, 0.0);
    }
}
