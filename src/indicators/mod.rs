//! Deterministic market indicators.
//!
//! - Fractal dimension from rescaled-range Hurst analysis
//! - Sentiment proxy from volatility level and short-term momentum

pub mod fractal;
pub mod sentiment;
pub mod stats;

pub use fractal::{FractalConfig, FractalEstimator};
pub use sentiment::{SentimentConfig, SentimentProxy};
