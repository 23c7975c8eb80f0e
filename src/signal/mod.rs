//! Market state evaluation and signal generation.
//!
//! - `engine`: indicators combined into a per-day [`MarketState`]
//! - `evaluator`: ordered SHORT/LONG threshold rules
//! - `scanner`: rolling evaluation over a full history
//! - `recommendation`: stop/target levels for a fired signal

pub mod engine;
pub mod evaluator;
pub mod recommendation;
pub mod scanner;

pub use engine::{IndicatorConfig, IndicatorEngine, IndicatorError, MarketState};
pub use evaluator::{
    ConditionMap, Signal, SignalEvaluation, SignalEvaluator, SignalRule, ThresholdConfig,
};
pub use recommendation::{RecommendationConfig, TradeRecommendation};
pub use scanner::{DailyEvaluation, ScanConfig, SignalScanner};
