//! Trade recommendation for a fired signal.

use serde::{Deserialize, Serialize};

use super::engine::MarketState;
use super::evaluator::Signal;

/// Instruments and risk settings used in recommendations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationConfig {
    /// Instrument bought on SHORT signals (inverse leveraged).
    pub short_symbol: String,
    /// Instrument bought on LONG signals.
    pub long_symbol: String,
    /// Percent of portfolio suggested per trade.
    pub position_size_pct: f64,
    /// Stop distance from entry, percent of index level.
    pub stop_pct: f64,
    /// Target distance from entry, percent of index level.
    pub target_pct: f64,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            short_symbol: "SPXS".to_string(),
            long_symbol: "SPY".to_string(),
            position_size_pct: 2.0,
            stop_pct: 1.5,
            target_pct: 4.0,
        }
    }
}

/// Actionable trade derived from a signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRecommendation {
    pub action: Signal,
    /// `BEARISH` or `BULLISH`.
    pub direction: &'static str,
    pub symbol: String,
    pub position_size_pct: f64,
    pub entry_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
    pub rationale: String,
}

impl TradeRecommendation {
    /// Build a recommendation; `None` for [`Signal::None`].
    pub fn from_signal(
        signal: Signal,
        state: &MarketState,
        config: &RecommendationConfig,
    ) -> Option<Self> {
        let price = state.price;
        let stop = config.stop_pct / 100.0;
        let target = config.target_pct / 100.0;

        let (direction, symbol, stop_price, target_price) = match signal {
            Signal::None => return None,
            Signal::Short => (
                "BEARISH",
                config.short_symbol.clone(),
                price * (1.0 + stop),
                price * (1.0 - target),
            ),
            Signal::Long => (
                "BULLISH",
                config.long_symbol.clone(),
                price * (1.0 - stop),
                price * (1.0 + target),
            ),
        };

        Some(Self {
            action: signal,
            direction,
            symbol,
            position_size_pct: config.position_size_pct,
            entry_price: price,
            stop_price,
            target_price,
            rationale: rationale(signal, state, config),
        })
    }

    /// Reward-to-risk ratio implied by stop and target.
    pub fn reward_risk(&self) -> f64 {
        let risk = (self.stop_price - self.entry_price).abs();
        if risk == 0.0 {
            return 0.0;
        }
        (self.target_price - self.entry_price).abs() / risk
    }
}

fn rationale(signal: Signal, state: &MarketState, config: &RecommendationConfig) -> String {
    let fractal = state
        .fractal_dimension
        .map_or_else(|| "n/a".to_string(), |f| format!("{:.3}", f));
    let setup = match signal {
        Signal::Short => "panic setup: compressed volatility structure, fearful sentiment, high VIX",
        Signal::Long => "complacency setup: smooth trend, greedy sentiment, low VIX",
        Signal::None => "no setup",
    };
    format!(
        "{} on {}: fractal {}, sentiment {:.2}, VIX {:.1}, regime {}. Risk {:.1}% / reward {:.1}%.",
        setup,
        state.date,
        fractal,
        state.sentiment_proxy,
        state.volatility_index,
        state.regime,
        config.stop_pct,
        config.target_pct
    )
}
