//! Trade simulation over a scanned signal history.
//!
//! - `trade`: trade records and ordered exit rules
//! - `simulator`: sleeve-based portfolio simulation with leveraged pricing
//! - `crash_scan`: forward drawdown following each signal

pub mod crash_scan;
pub mod simulator;
pub mod trade;

pub use crash_scan::{CrashScan, CrashScanSummary, CrashSignal, SubsequentLow};
pub use simulator::{
    BacktestResult, EntryMode, EquityPoint, PortfolioState, SignalEvent, TradeSimulator,
    TradingConfig,
};
pub use trade::{ExitReason, ExitRule, InstrumentPricing, Trade, TradeDirection};
