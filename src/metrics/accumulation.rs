//! Dip-buy accumulation statistics.

use std::collections::BTreeMap;

use chrono::Datelike;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::DAYS_PER_YEAR;
use crate::policy::{DipBuyEvent, DipBuyResult};

/// Progression activity within one calendar year. The initial lump sum is
/// not counted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearActivity {
    pub year: i32,
    pub buys: usize,
    pub invested: Decimal,
    /// Invested as percent of the annual cap.
    pub pct_of_cap: f64,
    pub skips: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccumulationMetrics {
    pub total_invested: Decimal,
    pub final_value: Decimal,
    pub total_return_pct: f64,
    pub annualized_return_pct: f64,
    /// Final value per unit of capital deployed.
    pub value_per_dollar: f64,
    pub buys: usize,
    pub resets: usize,
    pub skips: usize,
    pub years: Vec<YearActivity>,
}

impl AccumulationMetrics {
    pub fn calculate(result: &DipBuyResult) -> Self {
        let invested: f64 = result.total_invested.try_into().unwrap_or(0.0);
        let value: f64 = result.final_value.try_into().unwrap_or(0.0);
        let span_years =
            (result.end_date - result.start_date).num_days() as f64 / DAYS_PER_YEAR;

        let (total_return_pct, value_per_dollar, annualized_return_pct) = if invested > 0.0 {
            let ratio = value / invested;
            let annualized = if span_years > 0.0 {
                (ratio.powf(1.0 / span_years) - 1.0) * 100.0
            } else {
                0.0
            };
            ((ratio - 1.0) * 100.0, ratio, annualized)
        } else {
            (0.0, 0.0, 0.0)
        };

        let cap: f64 = result.config.annual_cap.try_into().unwrap_or(0.0);
        let mut by_year: BTreeMap<i32, YearActivity> = BTreeMap::new();
        for event in &result.events {
            let year = event.date().year();
            let entry = by_year.entry(year).or_insert(YearActivity {
                year,
                buys: 0,
                invested: Decimal::ZERO,
                pct_of_cap: 0.0,
                skips: 0,
            });
            match event {
                DipBuyEvent::Buy {
                    amount, sequence, ..
                } if *sequence > 0 => {
                    entry.buys += 1;
                    entry.invested += *amount;
                }
                DipBuyEvent::Skip { .. } => entry.skips += 1,
                _ => {}
            }
        }
        for year in by_year.values_mut() {
            let spent: f64 = year.invested.try_into().unwrap_or(0.0);
            year.pct_of_cap = if cap > 0.0 { spent / cap * 100.0 } else { 0.0 };
        }

        Self {
            total_invested: result.total_invested,
            final_value: result.final_value,
            total_return_pct,
            annualized_return_pct,
            value_per_dollar,
            buys: result.buys().count(),
            resets: result.resets().count(),
            skips: result.skips().count(),
            years: by_year
                .into_values()
                .filter(|y| y.buys > 0 || y.skips > 0)
                .collect(),
        }
    }

    pub fn summary(&self) -> String {
        let mut out = format!(
            "Accumulation Summary\n\
             ====================\n\
             \n\
             Total Invested: ${:.0}\n\
             Final Value: ${:.2}\n\
             Total Return: {:.2}%\n\
             Annualized Return: {:.2}%\n\
             Return per $1: ${:.2}\n\
             \n\
             Buys: {}  Resets: {}  Skipped: {}\n\
             \n\
             {:<6} {:<6} {:>14} {:>10} {:>8}",
            self.total_invested,
            self.final_value,
            self.total_return_pct,
            self.annualized_return_pct,
            self.value_per_dollar,
            self.buys,
            self.resets,
            self.skips,
            "Year",
            "Buys",
            "Invested",
            "% of Cap",
            "Skipped",
        );
        for y in &self.years {
            out.push_str(&format!(
                "\n{:<6} {:<6} {:>14} {:>9.1}% {:>8}",
                y.year,
                y.buys,
                format!("${:.0}", y.invested),
                y.pct_of_cap,
                y.skips
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SeriesWindow;
    use crate::policy::{DipBuyConfig, DipBuySimulator};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    #[test]
    fn test_per_year_activity() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
        let series = SeriesWindow::from_rows(vec![
            (d(2021, 12, 29), 100.0, 20.0, None),
            (d(2021, 12, 30), 94.0, 20.0, None),
            (d(2021, 12, 31), 88.0, 20.0, None),
            (d(2022, 1, 3), 82.0, 20.0, None),
            (d(2022, 1, 4), 90.0, 20.0, None),
        ])
        .unwrap();
        let config = DipBuyConfig {
            base_unit: dec!(10000),
            annual_cap: dec!(10000),
            ..Default::default()
        };
        let result = DipBuySimulator::new(config).run(&series);
        let m = AccumulationMetrics::calculate(&result);

        assert_eq!(m.buys, 2);
        assert_eq!(m.skips, 1);
        assert_eq!(m.total_invested, dec!(20000));
        assert_eq!(m.years.len(), 2);
        assert_eq!(m.years[0].year, 2021);
        assert_eq!(m.years[0].skips, 1);
        assert_relative_eq!(m.years[0].pct_of_cap, 100.0, epsilon = 1e-9);
        assert_eq!(m.years[1].invested, dec!(10000));

        let expected_value = (10000.0 / 94.0 + 10000.0 / 82.0) * 90.0;
        assert_relative_eq!(m.value_per_dollar, expected_value / 20000.0, epsilon = 1e-6);
        assert!(m.summary().contains("2022"));
    }

    #[test]
    fn test_nothing_invested() {
        let series = SeriesWindow::from_rows(vec![
            (NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), 100.0, 20.0, None),
            (NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(), 101.0, 20.0, None),
        ])
        .unwrap();
        let m = AccumulationMetrics::calculate(&DipBuySimulator::default().run(&series));
        assert_eq!(m.buys, 0);
        assert_eq!(m.total_return_pct, 0.0);
        assert!(m.years.is_empty());
    }
}
