//! Strategy configuration.
//!
//! One TOML file drives the whole pipeline. Every section is optional and
//! missing fields take the documented defaults.

use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backtest::TradingConfig;
use crate::policy::{DipBuyConfig, MoneyManagement};
use crate::signal::{
    IndicatorConfig, IndicatorEngine, RecommendationConfig, ScanConfig, SignalEvaluator,
    SignalScanner, ThresholdConfig,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Complete strategy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub data: ScanConfig,
    pub indicators: IndicatorConfig,
    /// Keys set here override [`ThresholdConfig::short_default`] one by one.
    #[serde(deserialize_with = "ThresholdConfig::deserialize_short")]
    pub short_thresholds: ThresholdConfig,
    /// Keys set here override [`ThresholdConfig::long_default`] one by one.
    #[serde(deserialize_with = "ThresholdConfig::deserialize_long")]
    pub long_thresholds: ThresholdConfig,
    pub trading: TradingConfig,
    pub dip_buy: DipBuyConfig,
    pub money_management: MoneyManagement,
    pub recommendation: RecommendationConfig,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            data: ScanConfig::default(),
            indicators: IndicatorConfig::default(),
            short_thresholds: ThresholdConfig::short_default(),
            long_thresholds: ThresholdConfig::long_default(),
            trading: TradingConfig::default(),
            dip_buy: DipBuyConfig::default(),
            money_management: MoneyManagement::default(),
            recommendation: RecommendationConfig::default(),
        }
    }
}

impl StrategyConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::Invalid {
                field,
                reason: reason.into(),
            }
        }

        if self.data.min_data_points == 0 {
            return Err(invalid("data.min_data_points", "must be at least 1"));
        }
        if self.data.lookback_days + 1 < self.data.min_data_points {
            return Err(invalid(
                "data.lookback_days",
                format!(
                    "window of {} never reaches min_data_points {}",
                    self.data.lookback_days + 1,
                    self.data.min_data_points
                ),
            ));
        }

        if self.data.min_data_points < self.indicators.min_data_points {
            return Err(invalid(
                "data.min_data_points",
                format!(
                    "{} is below indicators.min_data_points {}; shorter windows always fail",
                    self.data.min_data_points, self.indicators.min_data_points
                ),
            ));
        }

        let sentiment = &self.indicators.sentiment;
        if sentiment.momentum_window == 0 {
            return Err(invalid("indicators.sentiment.momentum_window", "must be at least 1"));
        }
        if sentiment.floor > sentiment.ceiling {
            return Err(invalid("indicators.sentiment.floor", "exceeds ceiling"));
        }
        if self.indicators.regime.n_states == 0 {
            return Err(invalid("indicators.regime.n_states", "must be at least 1"));
        }

        let t = &self.trading;
        if t.initial_capital <= Decimal::ZERO {
            return Err(invalid("trading.initial_capital", "must be positive"));
        }
        if !(0.0..=100.0).contains(&t.position_size_pct) {
            return Err(invalid("trading.position_size_pct", "must be within 0..=100"));
        }
        if t.gain_target_pct.is_some_and(|p| p <= 0.0) {
            return Err(invalid("trading.gain_target_pct", "must be positive"));
        }
        if t.stop_loss_pct.is_some_and(|p| p <= 0.0) {
            return Err(invalid("trading.stop_loss_pct", "must be positive"));
        }
        if t.max_hold_days == 0 {
            return Err(invalid("trading.max_hold_days", "must be at least 1"));
        }
        if t.synthetic_entry_price <= 0.0 {
            return Err(invalid("trading.synthetic_entry_price", "must be positive"));
        }

        let d = &self.dip_buy;
        if d.base_unit <= Decimal::ZERO {
            return Err(invalid("dip_buy.base_unit", "must be positive"));
        }
        if d.annual_cap < d.base_unit {
            return Err(invalid("dip_buy.annual_cap", "smaller than base_unit"));
        }
        if d.dip_threshold_pct >= 0.0 {
            return Err(invalid("dip_buy.dip_threshold_pct", "must be negative"));
        }
        if d.reset_threshold <= 0.0 {
            return Err(invalid("dip_buy.reset_threshold", "must be positive"));
        }
        if d.initial_capital < Decimal::ZERO {
            return Err(invalid("dip_buy.initial_capital", "must not be negative"));
        }

        let r = &self.recommendation;
        if r.position_size_pct < 0.0 || r.stop_pct < 0.0 || r.target_pct < 0.0 {
            return Err(invalid("recommendation", "percentages must not be negative"));
        }

        Ok(())
    }

    pub fn evaluator(&self) -> SignalEvaluator {
        SignalEvaluator::new(self.short_thresholds.clone(), self.long_thresholds.clone())
    }

    pub fn scanner(&self) -> SignalScanner {
        SignalScanner::new(
            self.data.clone(),
            IndicatorEngine::new(self.indicators.clone()),
            self.evaluator(),
        )
    }
}
