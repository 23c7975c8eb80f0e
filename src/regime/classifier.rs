//! Market regime classifier.
//!
//! Fits a Gaussian HMM to `{return, short rolling std, long rolling std}`
//! features and labels each discovered state by the mean and standard
//! deviation of the raw returns Viterbi assigns to it. The model is refit
//! from scratch for every window so a day's regime only ever depends on data
//! at or before that day.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::hmm::{FeatureVector, GaussianHmm, HmmConfig, N_FEATURES};
use crate::indicators::stats::{mean, rolling_sample_std, sample_std};

/// Market regime classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketRegime {
    /// High volatility with negative drift.
    Crisis,
    /// High volatility.
    Volatile,
    /// Positive drift, moderate volatility.
    Bull,
    /// Everything else.
    Normal,
    /// No model could be fit.
    Unknown,
}

impl MarketRegime {
    /// Description of the regime.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Crisis => "High volatility, falling market",
            Self::Volatile => "Elevated volatility",
            Self::Bull => "Rising market, contained volatility",
            Self::Normal => "Quiet market",
            Self::Unknown => "Unknown regime",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crisis => "Crisis",
            Self::Volatile => "Volatile",
            Self::Bull => "Bull",
            Self::Normal => "Normal",
            Self::Unknown => "Unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl std::fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Regime classifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    pub n_states: usize,
    pub n_iter: usize,
    pub seed: u64,
    pub tolerance: f64,
    pub min_covar: f64,
    /// Minimum complete feature rows required to fit.
    pub min_rows: usize,
    /// Short rolling volatility window (days).
    pub short_window: usize,
    /// Long rolling volatility window (days).
    pub long_window: usize,
    /// State std above which a falling state is `Crisis`.
    pub crisis_std: f64,
    /// State std above which a state is `Volatile`.
    pub volatile_std: f64,
    /// State mean above which a calm state is `Bull`.
    pub bull_mean: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            n_states: 4,
            n_iter: 100,
            seed: 42,
            tolerance: 1e-2,
            min_covar: 1e-3,
            min_rows: 30,
            short_window: 5,
            long_window: 20,
            crisis_std: 0.015,
            volatile_std: 0.012,
            bull_mean: 0.001,
        }
    }
}

impl RegimeConfig {
    pub fn hmm_config(&self) -> HmmConfig {
        HmmConfig {
            n_states: self.n_states,
            n_iter: self.n_iter,
            tolerance: self.tolerance,
            min_covar: self.min_covar,
            seed: self.seed,
        }
    }
}

/// Z-score scaler fitted on the training features.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureScaler {
    mean: FeatureVector,
    scale: FeatureVector,
}

impl FeatureScaler {
    pub fn fit(rows: &[FeatureVector]) -> Self {
        let mut center = [0.0; N_FEATURES];
        let mut scale = [1.0; N_FEATURES];
        for f in 0..N_FEATURES {
            let column: Vec<f64> = rows.iter().map(|r| r[f]).collect();
            center[f] = mean(&column).unwrap_or(0.0);
            // Constant columns keep unit scale.
            scale[f] = match sample_std(&column) {
                Some(s) if s > 1e-12 => s,
                _ => 1.0,
            };
        }
        Self {
            mean: center,
            scale,
        }
    }

    pub fn transform(&self, row: &FeatureVector) -> FeatureVector {
        let mut out = [0.0; N_FEATURES];
        for f in 0..N_FEATURES {
            out[f] = (row[f] - self.mean[f]) / self.scale[f];
        }
        out
    }
}

/// Per-state statistics of the raw returns assigned by decoding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSummary {
    pub state: usize,
    pub days: usize,
    pub mean_return: Option<f64>,
    /// Sample std; `None` below two assigned days.
    pub std_return: Option<f64>,
    /// `None` for states no day was assigned to.
    pub label: Option<MarketRegime>,
}

/// A fitted regime model and its state labels.
#[derive(Debug, Clone)]
pub struct RegimeModel {
    hmm: GaussianHmm,
    scaler: FeatureScaler,
    states: Vec<StateSummary>,
    training_rows: usize,
}

impl RegimeModel {
    pub fn hmm(&self) -> &GaussianHmm {
        &self.hmm
    }

    pub fn scaler(&self) -> &FeatureScaler {
        &self.scaler
    }

    pub fn states(&self) -> &[StateSummary] {
        &self.states
    }

    /// Label of `state`, if it was assigned any days.
    pub fn label(&self, state: usize) -> Option<MarketRegime> {
        self.states.get(state).and_then(|s| s.label)
    }

    /// Labelled `(state, regime)` pairs.
    pub fn label_map(&self) -> Vec<(usize, MarketRegime)> {
        self.states
            .iter()
            .filter_map(|s| s.label.map(|l| (s.state, l)))
            .collect()
    }

    pub fn training_rows(&self) -> usize {
        self.training_rows
    }
}

/// HMM-based regime classifier.
#[derive(Debug, Clone, Default)]
pub struct RegimeClassifier {
    config: RegimeConfig,
}

impl RegimeClassifier {
    pub fn new(config: RegimeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RegimeConfig {
        &self.config
    }

    /// Feature rows aligned with `returns`; `None` where any component is missing.
    pub fn features(&self, returns: &[Option<f64>]) -> Vec<Option<FeatureVector>> {
        let short = rolling_sample_std(returns, self.config.short_window);
        let long = rolling_sample_std(returns, self.config.long_window);
        returns
            .iter()
            .zip(short)
            .zip(long)
            .map(|((r, s), l)| match (r, s, l) {
                (Some(r), Some(s), Some(l)) => Some([*r, s, l]),
                _ => None,
            })
            .collect()
    }

    /// Feature vector for the last day from its trailing windows.
    pub fn latest_features(&self, returns: &[Option<f64>]) -> Option<FeatureVector> {
        self.features(returns).last().copied().flatten()
    }

    /// Fit a model to `returns` and label its states.
    ///
    /// Returns `None` when fewer than `min_rows` complete feature rows exist or
    /// the fit fails; callers treat that as an `Unknown` regime.
    pub fn fit_and_label(&self, returns: &[Option<f64>]) -> Option<RegimeModel> {
        let (raw_returns, rows): (Vec<f64>, Vec<FeatureVector>) = self
            .features(returns)
            .into_iter()
            .flatten()
            .map(|row| (row[0], row))
            .unzip();

        if rows.len() < self.config.min_rows {
            debug!(
                rows = rows.len(),
                min_rows = self.config.min_rows,
                "Regime: not enough feature rows"
            );
            return None;
        }

        let scaler = FeatureScaler::fit(&rows);
        let scaled: Vec<FeatureVector> = rows.iter().map(|r| scaler.transform(r)).collect();

        let hmm = match GaussianHmm::fit(&scaled, &self.config.hmm_config()) {
            Ok(hmm) => hmm,
            Err(e) => {
                warn!(error = %e, rows = rows.len(), "Regime: HMM fit failed");
                return None;
            }
        };

        let path = hmm.decode(&scaled);
        let states = (0..hmm.n_states())
            .map(|s| {
                let assigned: Vec<f64> = path
                    .iter()
                    .zip(&raw_returns)
                    .filter(|(p, _)| **p == s)
                    .map(|(_, r)| *r)
                    .collect();
                let mean_return = mean(&assigned);
                let std_return = sample_std(&assigned);
                StateSummary {
                    state: s,
                    days: assigned.len(),
                    mean_return,
                    std_return,
                    label: mean_return.map(|m| self.label_state(m, std_return)),
                }
            })
            .collect::<Vec<_>>();

        debug!(
            rows = rows.len(),
            labels = ?states.iter().map(|s| s.label).collect::<Vec<_>>(),
            "Regime: model fitted"
        );

        Some(RegimeModel {
            hmm,
            scaler,
            states,
            training_rows: rows.len(),
        })
    }

    /// Label rules, first match wins.
    pub fn label_state(&self, mean_return: f64, std_return: Option<f64>) -> MarketRegime {
        let c = &self.config;
        match std_return {
            Some(s) if s > c.crisis_std && mean_return < 0.0 => MarketRegime::Crisis,
            Some(s) if s > c.volatile_std => MarketRegime::Volatile,
            _ if mean_return > c.bull_mean => MarketRegime::Bull,
            _ => MarketRegime::Normal,
        }
    }

    /// Most likely labelled state for a single raw feature vector.
    ///
    /// Only labelled states compete, weighted by their share of decoded days.
    pub fn classify(&self, model: &RegimeModel, features: &FeatureVector) -> MarketRegime {
        let x = model.scaler.transform(features);
        let total = model.training_rows.max(1) as f64;

        model
            .states
            .iter()
            .filter_map(|s| s.label.map(|label| (s, label)))
            .map(|(s, label)| {
                let prior = (s.days as f64 / total).ln();
                (prior + model.hmm.log_emission(&x, s.state), label)
            })
            .filter(|(score, _)| !score.is_nan())
            .fold(None, |best: Option<(f64, MarketRegime)>, cur| match best {
                Some(b) if b.0 >= cur.0 => Some(b),
                _ => Some(cur),
            })
            .map(|(_, label)| label)
            .unwrap_or(MarketRegime::Unknown)
    }

    /// Fit on `returns` and classify its last day.
    pub fn current_regime(&self, returns: &[Option<f64>]) -> MarketRegime {
        let Some(model) = self.fit_and_label(returns) else {
            return MarketRegime::Unknown;
        };
        match self.latest_features(returns) {
            Some(features) => self.classify(&model, &features),
            None => MarketRegime::Unknown,
        }
    }
}
