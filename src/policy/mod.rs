//! Money-management policies.
//!
//! - `fixed_percent`: sleeve sized as a fixed share of portfolio value, used by
//!   the trade simulator
//! - `dip_buy`: linear-progression accumulation with an annual cap

pub mod dip_buy;
pub mod fixed_percent;

use serde::{Deserialize, Serialize};

pub use dip_buy::{DipBuyConfig, DipBuyEvent, DipBuyPolicy, DipBuyResult, DipBuySimulator};
pub use fixed_percent::{FixedPercentPolicy, PositionSizing};

/// Which policy a strategy runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoneyManagement {
    /// Signal-driven trades through the trade simulator.
    #[default]
    FixedPercent,
    /// Signal-independent dip accumulation.
    DipBuy,
}

impl MoneyManagement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FixedPercent => "fixed_percent",
            Self::DipBuy => "dip_buy",
        }
    }
}

impl std::fmt::Display for MoneyManagement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
