//! Trade simulation engine.
//!
//! Replays precomputed daily signals over a series:
//! 1. Ignore signals while a position is open (at most one at a time)
//! 2. On an accepted signal, size the sleeve off current portfolio value
//! 3. Walk forward day by day, checking exit rules in priority order
//! 4. Mark the reserve with the benchmark and the sleeve with the instrument
//! 5. Record the trade and roll the portfolio into the next one

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::data::SeriesWindow;
use crate::policy::{FixedPercentPolicy, PositionSizing};
use crate::signal::{DailyEvaluation, MarketState, Signal};

use super::trade::{ExitReason, ExitRule, InstrumentPricing, Trade, TradeDirection};

/// Which signals open positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryMode {
    ShortOnly,
    AnySignal,
}

impl EntryMode {
    pub fn accepts(&self, signal: Signal) -> bool {
        match self {
            Self::ShortOnly => signal == Signal::Short,
            Self::AnySignal => signal.is_actionable(),
        }
    }
}

/// Configuration for trade simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    /// Starting portfolio value.
    pub initial_capital: Decimal,

    /// Percent of portfolio moved into the sleeve per trade.
    pub position_size_pct: f64,

    /// Sleeve gain (percent) that closes the trade; `None` disables.
    pub gain_target_pct: Option<f64>,

    /// Sleeve loss (percent) that closes the trade; `None` disables.
    pub stop_loss_pct: Option<f64>,

    /// Maximum trading days a position stays open.
    pub max_hold_days: usize,

    pub entry_mode: EntryMode,

    /// Leverage of the synthetic instrument on SHORT trades.
    pub short_leverage: f64,

    /// Leverage of the synthetic instrument on LONG trades.
    pub long_leverage: f64,

    /// Starting price of a synthetic instrument.
    pub synthetic_entry_price: f64,

    /// Use observed instrument closes for SHORT trades when fully available.
    pub use_instrument_prices: bool,

    /// Keep capital in the benchmark between trades instead of cash.
    pub invested_between_trades: bool,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            initial_capital: Decimal::from(100_000),
            position_size_pct: 3.0,
            gain_target_pct: Some(30.0),
            stop_loss_pct: Some(5.0),
            max_hold_days: 8,
            entry_mode: EntryMode::ShortOnly,
            short_leverage: -3.0,
            long_leverage: 1.0,
            synthetic_entry_price: 100.0,
            use_instrument_prices: true,
            invested_between_trades: false,
        }
    }
}

impl TradingConfig {
    /// Exit rules in priority order.
    pub fn exit_rules(&self) -> Vec<ExitRule> {
        ExitRule::ordered(
            self.gain_target_pct.map(|p| p / 100.0),
            self.stop_loss_pct.map(|p| p / 100.0),
            self.max_hold_days,
        )
    }

    fn leverage(&self, direction: TradeDirection) -> f64 {
        match direction {
            TradeDirection::Short => self.short_leverage,
            TradeDirection::Long => self.long_leverage,
        }
    }
}

/// A signal fed to the simulator.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalEvent {
    /// Index of the signal date in the simulated series.
    pub index: usize,
    pub signal: Signal,
    pub state: Option<MarketState>,
}

impl From<&DailyEvaluation> for SignalEvent {
    fn from(eval: &DailyEvaluation) -> Self {
        Self {
            index: eval.index,
            signal: eval.signal(),
            state: Some(eval.state.clone()),
        }
    }
}

/// Portfolio snapshot after a trade closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub value: Decimal,
    /// Drawdown from the running peak, percent.
    pub drawdown_pct: f64,
}

/// Portfolio value owned by a single run.
#[derive(Debug, Clone)]
pub struct PortfolioState {
    value: Decimal,
    /// Benchmark close the value was last marked at.
    mark_price: f64,
    peak: Decimal,
    max_drawdown: Decimal,
    max_drawdown_pct: f64,
    equity_curve: Vec<EquityPoint>,
}

impl PortfolioState {
    pub fn new(initial: Decimal, date: NaiveDate, mark_price: f64) -> Self {
        Self {
            value: initial,
            mark_price,
            peak: initial,
            max_drawdown: Decimal::ZERO,
            max_drawdown_pct: 0.0,
            equity_curve: vec![EquityPoint {
                date,
                value: initial,
                drawdown_pct: 0.0,
            }],
        }
    }

    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn peak(&self) -> Decimal {
        self.peak
    }

    pub fn max_drawdown(&self) -> Decimal {
        self.max_drawdown
    }

    pub fn max_drawdown_pct(&self) -> f64 {
        self.max_drawdown_pct
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    /// Grow the value with the benchmark from the last mark to `price`.
    fn mark_to_benchmark(&mut self, price: f64) {
        if self.mark_price > 0.0 {
            self.value = scale(self.value, price / self.mark_price);
        }
        self.mark_price = price;
    }

    /// Set a new value and record an equity point.
    fn record(&mut self, date: NaiveDate, value: Decimal, mark_price: f64) {
        self.value = value;
        self.mark_price = mark_price;

        if value > self.peak {
            self.peak = value;
        }
        let drawdown = self.peak - value;
        let drawdown_pct = if self.peak > Decimal::ZERO {
            let ratio: f64 = (drawdown / self.peak).try_into().unwrap_or(0.0);
            ratio * 100.0
        } else {
            0.0
        };
        if drawdown > self.max_drawdown {
            self.max_drawdown = drawdown;
        }
        if drawdown_pct > self.max_drawdown_pct {
            self.max_drawdown_pct = drawdown_pct;
        }

        self.equity_curve.push(EquityPoint {
            date,
            value,
            drawdown_pct,
        });
    }
}

/// `value * factor`, rounded to cents.
pub(crate) fn scale(value: Decimal, factor: f64) -> Decimal {
    match Decimal::try_from(factor) {
        Ok(f) => (value * f).round_dp(2),
        Err(_) => value,
    }
}

/// Result of a completed simulation.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestResult {
    pub config: TradingConfig,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub initial_capital: Decimal,
    pub final_value: Decimal,
    pub peak_value: Decimal,
    pub max_drawdown: Decimal,
    pub max_drawdown_pct: f64,
    /// Actionable signals received.
    pub signals_seen: usize,
    /// Actionable signals dropped because a position was open.
    pub signals_ignored: usize,
}

impl BacktestResult {
    pub fn total_trades(&self) -> usize {
        self.trades.len()
    }

    pub fn winning_trades(&self) -> usize {
        self.trades.iter().filter(|t| t.is_winner()).count()
    }

    /// Calculate win rate.
    pub fn win_rate(&self) -> f64 {
        if self.trades.is_empty() {
            return 0.0;
        }
        self.winning_trades() as f64 / self.trades.len() as f64
    }

    pub fn total_return_pct(&self) -> f64 {
        if self.initial_capital.is_zero() {
            return 0.0;
        }
        let ratio: f64 = ((self.final_value - self.initial_capital) / self.initial_capital)
            .try_into()
            .unwrap_or(0.0);
        ratio * 100.0
    }

    pub fn count_by_reason(&self, reason: ExitReason) -> usize {
        self.trades.iter().filter(|t| t.exit_reason == reason).count()
    }

    /// Generate summary string.
    pub fn summary(&self) -> String {
        format!(
            "Backtest Results ({} to {})\n\
             ----------------------------------------\n\
             Initial Capital: ${:.2}\n\
             Final Value: ${:.2}\n\
             Total Return: {:.2}%\n\
             Max Drawdown: {:.2}%\n\
             \n\
             Trades: {} (W: {})\n\
             Win Rate: {:.1}%\n\
             Exits: gain {} / stop {} / time {} / end {}\n\
             Signals: {} seen, {} ignored while in a trade",
            self.start_date,
            self.end_date,
            self.initial_capital,
            self.final_value,
            self.total_return_pct(),
            self.max_drawdown_pct,
            self.total_trades(),
            self.winning_trades(),
            self.win_rate() * 100.0,
            self.count_by_reason(ExitReason::GainTarget),
            self.count_by_reason(ExitReason::StopLoss),
            self.count_by_reason(ExitReason::TimeExit),
            self.count_by_reason(ExitReason::EndOfData),
            self.signals_seen,
            self.signals_ignored,
        )
    }
}

/// The trade simulator.
///
/// Holds configuration only; every run builds its own [`PortfolioState`], so
/// one simulator can serve many runs concurrently.
#[derive(Debug, Clone)]
pub struct TradeSimulator<P: PositionSizing = FixedPercentPolicy> {
    config: TradingConfig,
    rules: Vec<ExitRule>,
    sizing: P,
}

impl TradeSimulator<FixedPercentPolicy> {
    /// Simulator sizing trades with `config.position_size_pct`.
    pub fn new(config: TradingConfig) -> Self {
        let sizing = FixedPercentPolicy::new(config.position_size_pct);
        Self::with_sizing(config, sizing)
    }
}

impl Default for TradeSimulator<FixedPercentPolicy> {
    fn default() -> Self {
        Self::new(TradingConfig::default())
    }
}

impl<P: PositionSizing> TradeSimulator<P> {
    pub fn with_sizing(config: TradingConfig, sizing: P) -> Self {
        Self {
            rules: config.exit_rules(),
            config,
            sizing,
        }
    }

    pub fn config(&self) -> &TradingConfig {
        &self.config
    }

    pub fn exit_rules(&self) -> &[ExitRule] {
        &self.rules
    }

    /// Simulate over scanner output.
    pub fn run(&self, series: &SeriesWindow, evaluations: &[DailyEvaluation]) -> BacktestResult {
        let events: Vec<SignalEvent> = evaluations.iter().map(SignalEvent::from).collect();
        self.run_events(series, &events)
    }

    /// Simulate over bare `(index, signal)` pairs.
    pub fn run_signals(
        &self,
        series: &SeriesWindow,
        signals: &[(usize, Signal)],
    ) -> BacktestResult {
        let events: Vec<SignalEvent> = signals
            .iter()
            .map(|&(index, signal)| SignalEvent {
                index,
                signal,
                state: None,
            })
            .collect();
        self.run_events(series, &events)
    }

    /// Simulate over signal events ordered by index, starting at the first event.
    pub fn run_events(&self, series: &SeriesWindow, events: &[SignalEvent]) -> BacktestResult {
        let start_index = events.first().map_or(0, |e| e.index);
        self.run_events_from(series, start_index, events)
    }

    /// Simulate over signal events with the portfolio opened at `start_index`.
    ///
    /// Callers that pass only a subset of the evaluated dates use this so the
    /// run starts where the full evaluation history starts.
    pub fn run_events_from(
        &self,
        series: &SeriesWindow,
        start_index: usize,
        events: &[SignalEvent],
    ) -> BacktestResult {
        let obs = series.observations();
        let start = &obs[start_index.min(obs.len() - 1)];

        let mut portfolio =
            PortfolioState::new(self.config.initial_capital, start.date, start.close);
        let mut trades: Vec<Trade> = Vec::new();
        let mut next_free = 0usize;
        let mut signals_seen = 0usize;
        let mut signals_ignored = 0usize;

        for event in events {
            if !self.config.entry_mode.accepts(event.signal) {
                continue;
            }
            signals_seen += 1;

            if event.index >= obs.len() {
                warn!(
                    index = event.index,
                    len = obs.len(),
                    "Signal outside series, skipping"
                );
                continue;
            }
            if event.index < next_free {
                signals_ignored += 1;
                continue;
            }
            let Some(direction) = TradeDirection::from_signal(event.signal) else {
                continue;
            };

            if self.config.invested_between_trades {
                portfolio.mark_to_benchmark(obs[event.index].close);
            }

            let trade = self.execute(
                series,
                event,
                direction,
                trades.len() + 1,
                portfolio.value(),
            );
            portfolio.record(trade.exit_date, trade.portfolio_after, trade.exit_benchmark);
            next_free = trade.exit_index + 1;
            trades.push(trade);
        }

        let last = &obs[obs.len() - 1];
        if self.config.invested_between_trades {
            portfolio.mark_to_benchmark(last.close);
            let value = portfolio.value();
            if portfolio.equity_curve().last().map(|p| p.date) != Some(last.date) {
                portfolio.record(last.date, value, last.close);
            }
        }

        let result = BacktestResult {
            config: self.config.clone(),
            start_date: start.date,
            end_date: last.date,
            trades,
            equity_curve: portfolio.equity_curve().to_vec(),
            initial_capital: self.config.initial_capital,
            final_value: portfolio.value(),
            peak_value: portfolio.peak(),
            max_drawdown: portfolio.max_drawdown(),
            max_drawdown_pct: portfolio.max_drawdown_pct(),
            signals_seen,
            signals_ignored,
        };

        info!(
            trades = result.total_trades(),
            final_value = %result.final_value,
            total_return_pct = %format!("{:.2}", result.total_return_pct()),
            "Backtest complete"
        );

        result
    }

    /// Whether observed instrument closes cover the whole reachable horizon.
    fn real_prices_available(
        &self,
        series: &SeriesWindow,
        entry: usize,
        horizon_end: usize,
    ) -> bool {
        self.config.use_instrument_prices
            && series.observations()[entry..=horizon_end]
                .iter()
                .all(|o| o.instrument.is_some())
    }

    /// Open at `event.index`, walk to the exit, and account the trade.
    fn execute(
        &self,
        series: &SeriesWindow,
        event: &SignalEvent,
        direction: TradeDirection,
        id: usize,
        portfolio_before: Decimal,
    ) -> Trade {
        let obs = series.observations();
        let entry = event.index;
        let horizon_end = (entry + self.config.max_hold_days).min(obs.len() - 1);
        let entry_benchmark = obs[entry].close;
        let leverage = self.config.leverage(direction);

        // Pricing is fixed for the whole trade.
        let (pricing, entry_instrument) = match (direction, obs[entry].instrument) {
            (TradeDirection::Short, Some(price))
                if self.real_prices_available(series, entry, horizon_end) =>
            {
                (InstrumentPricing::Real, price)
            }
            _ => (InstrumentPricing::Synthetic, self.config.synthetic_entry_price),
        };

        let instrument_at = |j: usize| -> f64 {
            match (pricing, obs[j].instrument) {
                (InstrumentPricing::Real, Some(price)) => price,
                _ => {
                    let bench = obs[j].close / entry_benchmark - 1.0;
                    entry_instrument * (1.0 + leverage * bench)
                }
            }
        };

        debug!(
            id,
            date = %obs[entry].date,
            ?direction,
            ?pricing,
            entry_benchmark,
            entry_instrument,
            "Position opened"
        );

        let exit = (entry + 1..=horizon_end).find_map(|j| {
            let sleeve = instrument_at(j) / entry_instrument - 1.0;
            ExitRule::first_triggered(&self.rules, sleeve, j - entry).map(|reason| (j, reason))
        });
        let (exit_index, exit_reason) = exit.unwrap_or((horizon_end, ExitReason::EndOfData));

        let exit_benchmark = obs[exit_index].close;
        let exit_instrument = instrument_at(exit_index);
        let benchmark_return = exit_benchmark / entry_benchmark - 1.0;
        let sleeve_return = exit_instrument / entry_instrument - 1.0;

        let position_value = self.sizing.sleeve_value(portfolio_before);
        let reserve = portfolio_before - position_value;
        let portfolio_after =
            scale(reserve, 1.0 + benchmark_return) + scale(position_value, 1.0 + sleeve_return);

        let trade = Trade {
            id,
            direction,
            entry_index: entry,
            exit_index,
            entry_date: obs[entry].date,
            exit_date: obs[exit_index].date,
            entry_benchmark,
            exit_benchmark,
            entry_instrument,
            exit_instrument,
            pricing,
            exit_reason,
            hold_days: exit_index - entry,
            benchmark_return,
            sleeve_return,
            position_value,
            portfolio_before,
            portfolio_after,
            entry_state: event.state.clone(),
        };

        debug!(
            id,
            date = %trade.exit_date,
            reason = %trade.exit_reason,
            hold_days = trade.hold_days,
            sleeve_return_pct = %format!("{:.2}", trade.sleeve_return_pct()),
            portfolio_after = %trade.portfolio_after,
            "Position closed"
        );

        trade
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn day(i: usize) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(i as i64)
    }

    fn series(closes: &[f64], instrument: Option<Vec<Option<f64>>>) -> SeriesWindow {
        SeriesWindow::from_columns(
            (0..closes.len()).map(day).collect(),
            closes.to_vec(),
            vec![30.0; closes.len()],
            instrument,
        )
        .unwrap()
    }

    /// `n` closes compounding `daily` from 100.
    fn path(n: usize, daily: f64) -> Vec<f64> {
        (0..n).map(|i| 100.0 * (1.0 + daily).powi(i as i32)).collect()
    }

    fn to_f64(d: Decimal) -> f64 {
        d.try_into().unwrap()
    }

    #[test]
    fn test_decline_hits_gain_target() {
        // Ten days at -1%/day, then a sharp drop that takes the sleeve past +30%.
        let mut closes = path(11, -0.01);
        closes.push(closes[10] * 0.89);
        closes.extend([closes[11]; 10]);
        let s = series(&closes, None);

        let config = TradingConfig {
            max_hold_days: 8,
            ..TradingConfig::default()
        };
        let result = TradeSimulator::new(config).run_signals(&s, &[(10, Signal::Short)]);

        assert_eq!(result.total_trades(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::GainTarget);
        assert_eq!(trade.exit_index, 11);
        assert_eq!(trade.hold_days, 1);
        assert_eq!(trade.pricing, InstrumentPricing::Synthetic);
        assert_relative_eq!(trade.sleeve_return, 0.33, epsilon = 1e-9);

        // 97,000 reserve * 0.89 + 3,000 sleeve * 1.33.
        assert_relative_eq!(to_f64(trade.portfolio_after), 90_320.0, epsilon = 0.05);
    }

    #[test]
    fn test_stop_loss_on_rally() {
        let closes = path(15, 0.01);
        let s = series(&closes, None);
        let result = TradeSimulator::default().run_signals(&s, &[(0, Signal::Short)]);

        let trade = &result.trades[0];
        // -3 * 1% = -3% after day 1, -3 * 2.01% = -6.03% after day 2.
        assert_eq!(trade.exit_reason, ExitReason::StopLoss);
        assert_eq!(trade.hold_days, 2);
    }

    #[test]
    fn test_time_exit_and_hold_bound() {
        let closes = vec![100.0; 30];
        let s = series(&closes, None);
        let result = TradeSimulator::default()
            .run_signals(&s, &[(0, Signal::Short), (3, Signal::Short), (9, Signal::Short)]);

        assert_eq!(result.total_trades(), 2);
        assert_eq!(result.signals_ignored, 1);
        for trade in &result.trades {
            assert_eq!(trade.exit_reason, ExitReason::TimeExit);
            assert_eq!(trade.hold_days, 8);
        }
        assert_eq!(result.trades[1].entry_index, 9);
        assert_eq!(result.final_value, dec!(100000));
    }

    #[test]
    fn test_end_of_data() {
        let closes = vec![100.0; 5];
        let s = series(&closes, None);
        let result = TradeSimulator::default()
            .run_signals(&s, &[(2, Signal::Short)]);
        let trade = &result.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::EndOfData);
        assert_eq!(trade.exit_index, 4);
        assert_eq!(trade.hold_days, 2);

        // Signal on the final day closes immediately.
        let result = TradeSimulator::default().run_signals(&s, &[(4, Signal::Short)]);
        assert_eq!(result.trades[0].exit_reason, ExitReason::EndOfData);
        assert_eq!(result.trades[0].hold_days, 0);
        assert_eq!(result.final_value, dec!(100000));
    }

    #[test]
    fn test_signal_on_exit_day_is_ignored() {
        let closes = vec![100.0; 30];
        let s = series(&closes, None);
        let result = TradeSimulator::default()
            .run_signals(&s, &[(0, Signal::Short), (8, Signal::Short), (9, Signal::Short)]);
        assert_eq!(result.total_trades(), 2);
        assert_eq!(result.trades[1].entry_index, 9);
    }

    #[test]
    fn test_real_instrument_when_fully_available() {
        let closes = vec![100.0; 12];
        let inst: Vec<Option<f64>> = (0..12).map(|i| Some(20.0 + i as f64)).collect();
        let s = series(&closes, Some(inst));
        let result = TradeSimulator::default().run_signals(&s, &[(0, Signal::Short)]);
        let trade = &result.trades[0];

        assert_eq!(trade.pricing, InstrumentPricing::Real);
        assert_eq!(trade.entry_instrument, 20.0);
        // 20 -> 26 is +30% on day 6.
        assert_eq!(trade.exit_reason, ExitReason::GainTarget);
        assert_eq!(trade.exit_index, 6);
    }

    #[test]
    fn test_gap_in_instrument_forces_synthetic_for_whole_trade() {
        let closes = vec![100.0; 12];
        let mut inst: Vec<Option<f64>> = (0..12).map(|i| Some(20.0 + i as f64)).collect();
        inst[5] = None;
        let s = series(&closes, Some(inst));
        let result = TradeSimulator::default().run_signals(&s, &[(0, Signal::Short)]);
        let trade = &result.trades[0];

        assert_eq!(trade.pricing, InstrumentPricing::Synthetic);
        assert_eq!(trade.entry_instrument, 100.0);
        assert_eq!(trade.exit_instrument, 100.0);
        assert_eq!(trade.exit_reason, ExitReason::TimeExit);
    }

    #[test]
    fn test_long_signals_need_any_signal_mode() {
        let closes = path(20, 0.01);
        let s = series(&closes, None);
        let signals = [(0, Signal::Long)];

        let short_only = TradeSimulator::default().run_signals(&s, &signals);
        assert_eq!(short_only.total_trades(), 0);

        let config = TradingConfig {
            entry_mode: EntryMode::AnySignal,
            gain_target_pct: Some(5.0),
            ..TradingConfig::default()
        };
        let any = TradeSimulator::new(config).run_signals(&s, &signals);
        let trade = &any.trades[0];
        assert_eq!(trade.direction, TradeDirection::Long);
        assert_eq!(trade.exit_reason, ExitReason::GainTarget);
        assert_eq!(trade.hold_days, 5);
        assert!(trade.is_winner());
    }

    #[test]
    fn test_fixed_hold_mode() {
        let closes = path(40, -0.02);
        let s = series(&closes, None);
        let config = TradingConfig {
            gain_target_pct: None,
            stop_loss_pct: None,
            max_hold_days: 25,
            ..TradingConfig::default()
        };
        let result = TradeSimulator::new(config)
            .run_signals(&s, &[(0, Signal::Short), (30, Signal::Short)]);

        assert_eq!(result.trades[0].exit_reason, ExitReason::TimeExit);
        assert_eq!(result.trades[0].hold_days, 25);
        assert_eq!(result.trades[1].exit_reason, ExitReason::EndOfData);
        assert_eq!(result.trades[1].hold_days, 9);
    }

    #[test]
    fn test_invested_between_trades_tracks_benchmark() {
        let closes = path(30, 0.01);
        let s = series(&closes, None);
        let config = TradingConfig {
            invested_between_trades: true,
            ..TradingConfig::default()
        };
        let result = TradeSimulator::new(config).run_signals(&s, &[(0, Signal::None)]);

        assert_eq!(result.total_trades(), 0);
        let expected = 100_000.0 * closes[29] / closes[0];
        assert_relative_eq!(to_f64(result.final_value), expected, epsilon = 0.05);
    }

    #[test]
    fn test_portfolio_compounds_across_trades() {
        let mut closes = vec![100.0; 3];
        closes.extend([90.0; 13]);
        let s = series(&closes, None);

        let result =
            TradeSimulator::default().run_signals(&s, &[(2, Signal::Short), (12, Signal::Short)]);
        assert_eq!(result.total_trades(), 2);
        let first = &result.trades[0];
        let second = &result.trades[1];
        assert_eq!(second.portfolio_before, first.portfolio_after);
        assert_eq!(result.final_value, second.portfolio_after);
        assert_eq!(result.equity_curve.len(), 3);
    }
}
