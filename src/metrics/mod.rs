//! Performance metrics module.
//!
//! - Trade simulation: win rate, per-trade return distribution, CAGR,
//!   trades per year, exit breakdown, maximum drawdown
//! - Dip-buy accumulation: capital deployed, annualized return, per-year
//!   activity against the cap

pub mod accumulation;
pub mod calculator;

pub use accumulation::{AccumulationMetrics, YearActivity};
pub use calculator::{DrawdownAnalysis, ExitCount, MetricsCalculator, PerformanceMetrics};

/// Calendar days per year for annualizing.
pub const DAYS_PER_YEAR: f64 = 365.25;
