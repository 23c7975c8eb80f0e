//! Market regime classification module.
//!
//! A 4-state Gaussian HMM over daily return and rolling volatility features,
//! refit per evaluation window. States are labelled:
//! - Crisis: high volatility, negative mean return
//! - Volatile: high volatility
//! - Bull: positive mean return
//! - Normal: everything else

pub mod classifier;
pub mod hmm;

pub use classifier::{
    FeatureScaler, MarketRegime, RegimeClassifier, RegimeConfig, RegimeModel, StateSummary,
};
pub use hmm::{FeatureVector, GaussianHmm, HmmConfig, HmmError};
