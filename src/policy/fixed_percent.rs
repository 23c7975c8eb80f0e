//! Fixed-percentage sleeve sizing.
//!
//! Each trade moves a fixed share of the current portfolio value (not of the
//! initial capital) into the traded sleeve. The remainder stays in the
//! benchmark for the hold. Everything is reinvested after exit.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Sizes the traded sleeve of a trade.
pub trait PositionSizing: Send + Sync {
    /// Sleeve value for a trade opened with `portfolio_value`.
    fn sleeve_value(&self, portfolio_value: Decimal) -> Decimal;

    fn name(&self) -> &'static str;
}

/// Fixed percent of current portfolio value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixedPercentPolicy {
    /// Percent of portfolio, e.g. 3.0.
    pub position_size_pct: f64,
}

impl Default for FixedPercentPolicy {
    fn default() -> Self {
        Self {
            position_size_pct: 3.0,
        }
    }
}

impl FixedPercentPolicy {
    pub fn new(position_size_pct: f64) -> Self {
        Self { position_size_pct }
    }

    fn fraction(&self) -> Decimal {
        Decimal::try_from(self.position_size_pct / 100.0)
            .unwrap_or(Decimal::ZERO)
            .clamp(Decimal::ZERO, Decimal::ONE)
    }
}

impl PositionSizing for FixedPercentPolicy {
    fn sleeve_value(&self, portfolio_value: Decimal) -> Decimal {
        if portfolio_value <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (portfolio_value * self.fraction()).round_dp(2)
    }

    fn name(&self) -> &'static str {
        "fixed_percent"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_sizes_off_current_value() {
        let policy = FixedPercentPolicy::new(3.0);
        assert_eq!(policy.sleeve_value(dec!(100000)), dec!(3000));
        assert_eq!(policy.sleeve_value(dec!(120000)), dec!(3600));
    }

    #[test]
    fn test_out_of_range_percent_is_clamped() {
        assert_eq!(
            FixedPercentPolicy::new(150.0).sleeve_value(dec!(1000)),
            dec!(1000)
        );
        assert_eq!(
            FixedPercentPolicy::new(-5.0).sleeve_value(dec!(1000)),
            dec!(0)
        );
        assert_eq!(
            FixedPercentPolicy::default().sleeve_value(dec!(-10)),
            dec!(0)
        );
    }
}
