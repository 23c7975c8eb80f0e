//! Trade records and exit rules.
//!
//! A position moves IDLE -> OPEN -> CLOSED exactly once. While open it is
//! checked daily against an ordered list of [`ExitRule`]s; the first rule that
//! fires closes it. A position still open when the data runs out is closed
//! with [`ExitReason::EndOfData`].

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::signal::{MarketState, Signal};

/// Side of the market a trade bets on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeDirection {
    /// Benchmark expected to fall; sleeve holds the inverse instrument.
    Short,
    /// Benchmark expected to rise.
    Long,
}

impl TradeDirection {
    pub fn from_signal(signal: Signal) -> Option<Self> {
        match signal {
            Signal::Short => Some(Self::Short),
            Signal::Long => Some(Self::Long),
            Signal::None => None,
        }
    }
}

/// Reason for exiting a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    /// Sleeve return reached the gain target.
    GainTarget,
    /// Sleeve return breached the stop.
    StopLoss,
    /// Maximum hold reached.
    TimeExit,
    /// Series ended before any rule fired.
    EndOfData,
}

impl ExitReason {
    pub const ALL: [ExitReason; 4] = [
        Self::GainTarget,
        Self::StopLoss,
        Self::TimeExit,
        Self::EndOfData,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GainTarget => "GAIN_TARGET",
            Self::StopLoss => "STOP_LOSS",
            Self::TimeExit => "TIME_EXIT",
            Self::EndOfData => "END_OF_DATA",
        }
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One exit condition. Returns are fractions (0.30 = 30%).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ExitRule {
    /// Sleeve return >= target.
    GainTarget(f64),
    /// Sleeve return <= -stop.
    StopLoss(f64),
    /// Held for at least this many trading days.
    MaxHold(usize),
}

impl ExitRule {
    /// Rules in priority order: gain, stop, time.
    pub fn ordered(gain: Option<f64>, stop: Option<f64>, max_hold: usize) -> Vec<ExitRule> {
        let mut rules = Vec::with_capacity(3);
        if let Some(g) = gain {
            rules.push(Self::GainTarget(g));
        }
        if let Some(s) = stop {
            rules.push(Self::StopLoss(s));
        }
        rules.push(Self::MaxHold(max_hold));
        rules
    }

    pub fn check(&self, sleeve_return: f64, hold_days: usize) -> Option<ExitReason> {
        match *self {
            Self::GainTarget(target) if sleeve_return >= target => Some(ExitReason::GainTarget),
            Self::StopLoss(stop) if sleeve_return <= -stop => Some(ExitReason::StopLoss),
            Self::MaxHold(days) if hold_days >= days => Some(ExitReason::TimeExit),
            _ => None,
        }
    }

    /// First rule to fire, top to bottom.
    pub fn first_triggered(
        rules: &[ExitRule],
        sleeve_return: f64,
        hold_days: usize,
    ) -> Option<ExitReason> {
        rules.iter().find_map(|r| r.check(sleeve_return, hold_days))
    }
}

/// How the traded sleeve was priced for a whole trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstrumentPricing {
    /// Observed instrument closes.
    Real,
    /// `entry * (1 + leverage * benchmark_return)`.
    Synthetic,
}

/// A completed trade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    /// Sequence number within the run, from 1.
    pub id: usize,
    pub direction: TradeDirection,
    pub entry_index: usize,
    pub exit_index: usize,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub entry_benchmark: f64,
    pub exit_benchmark: f64,
    pub entry_instrument: f64,
    pub exit_instrument: f64,
    pub pricing: InstrumentPricing,
    pub exit_reason: ExitReason,
    /// Trading days between entry and exit.
    pub hold_days: usize,
    /// Benchmark return over the hold (fraction).
    pub benchmark_return: f64,
    /// Sleeve return over the hold (fraction).
    pub sleeve_return: f64,
    pub position_value: Decimal,
    pub portfolio_before: Decimal,
    pub portfolio_after: Decimal,
    /// Indicator state that triggered the entry, when known.
    pub entry_state: Option<MarketState>,
}

impl Trade {
    /// Portfolio profit or loss.
    pub fn pnl(&self) -> Decimal {
        self.portfolio_after - self.portfolio_before
    }

    /// Portfolio return in percent.
    pub fn return_pct(&self) -> f64 {
        if self.portfolio_before.is_zero() {
            return 0.0;
        }
        let ratio: f64 = (self.pnl() / self.portfolio_before)
            .try_into()
            .unwrap_or(0.0);
        ratio * 100.0
    }

    pub fn sleeve_return_pct(&self) -> f64 {
        self.sleeve_return * 100.0
    }

    pub fn is_winner(&self) -> bool {
        self.pnl() > Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_exit_rule_priority() {
        let rules = ExitRule::ordered(Some(0.30), Some(0.05), 8);

        // Gain and time both satisfied: gain wins.
        assert_eq!(
            ExitRule::first_triggered(&rules, 0.35, 8),
            Some(ExitReason::GainTarget)
        );
        // Stop and time both satisfied: stop wins.
        assert_eq!(
            ExitRule::first_triggered(&rules, -0.06, 8),
            Some(ExitReason::StopLoss)
        );
        assert_eq!(
            ExitRule::first_triggered(&rules, 0.01, 8),
            Some(ExitReason::TimeExit)
        );
        assert_eq!(ExitRule::first_triggered(&rules, 0.01, 3), None);
    }

    #[test]
    fn test_boundaries_inclusive() {
        let rules = ExitRule::ordered(Some(0.30), Some(0.05), 8);
        assert_eq!(
            ExitRule::first_triggered(&rules, 0.30, 1),
            Some(ExitReason::GainTarget)
        );
        assert_eq!(
            ExitRule::first_triggered(&rules, -0.05, 1),
            Some(ExitReason::StopLoss)
        );
    }

    #[test]
    fn test_fixed_hold_rules() {
        let rules = ExitRule::ordered(None, None, 25);
        assert_eq!(rules, vec![ExitRule::MaxHold(25)]);
        assert_eq!(ExitRule::first_triggered(&rules, 5.0, 24), None);
        assert_eq!(
            ExitRule::first_triggered(&rules, -0.9, 25),
            Some(ExitReason::TimeExit)
        );
    }

    #[test]
    fn test_trade_return() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let trade = Trade {
            id: 1,
            direction: TradeDirection::Short,
            entry_index: 0,
            exit_index: 3,
            entry_date: d,
            exit_date: d,
            entry_benchmark: 100.0,
            exit_benchmark: 97.0,
            entry_instrument: 100.0,
            exit_instrument: 109.0,
            pricing: InstrumentPricing::Synthetic,
            exit_reason: ExitReason::TimeExit,
            hold_days: 3,
            benchmark_return: -0.03,
            sleeve_return: 0.09,
            position_value: dec!(3000),
            portfolio_before: dec!(100000),
            portfolio_after: dec!(97360),
            entry_state: None,
        };
        assert_eq!(trade.pnl(), dec!(-2640));
        assert!((trade.return_pct() + 2.64).abs() < 1e-9);
        assert!(!trade.is_winner());
        assert_eq!(ExitReason::EndOfData.to_string(), "END_OF_DATA");
    }
}
