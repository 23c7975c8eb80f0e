//! Market regime indicators and trade simulation for daily index series.
//!
//! - `data`: validated daily series and CSV/Parquet loading
//! - `indicators`: fractal dimension, sentiment proxy, rolling statistics
//! - `regime`: Gaussian HMM and regime labelling
//! - `signal`: per-day market state, threshold rules, historical scans
//! - `backtest`: trade simulation and post-signal drawdown scans
//! - `policy`: fixed-percent sizing and dip-buy accumulation
//! - `metrics`: performance statistics
//! - `sweep`: parallel parameter grids
//! - `config`: TOML strategy configuration

pub mod backtest;
pub mod config;
pub mod data;
pub mod indicators;
pub mod metrics;
pub mod policy;
pub mod regime;
pub mod signal;
pub mod sweep;

// Re-export commonly used types
pub use backtest::{BacktestResult, CrashScan, ExitReason, Trade, TradeSimulator, TradingConfig};
pub use config::{ConfigError, StrategyConfig};
pub use data::{SeriesLoader, SeriesWindow};
pub use metrics::{AccumulationMetrics, MetricsCalculator, PerformanceMetrics};
pub use policy::{DipBuySimulator, FixedPercentPolicy, MoneyManagement};
pub use regime::{MarketRegime, RegimeClassifier};
pub use signal::{IndicatorEngine, MarketState, Signal, SignalEvaluator, SignalScanner};
pub use sweep::{ParameterGrid, SweepRunner};
