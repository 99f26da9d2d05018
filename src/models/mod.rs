pub mod axis;
pub mod contract;
pub mod intervals;
pub mod kde;
pub mod touch;

use crate::chain::{ExpiryChain, Quote};
use crate::errors::EngineResult;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Where a strike's probability comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbabilityMode {
    Delta,
    Touch,
}

impl std::fmt::Display for ProbabilityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Delta => write!(f, "delta"),
            Self::Touch => write!(f, "touch"),
        }
    }
}

/// All probability sources implement this trait.
/// probability_pct() must be a pure function of its inputs and `now`.
pub trait ProbabilitySource: Send + Sync {
    fn mode(&self) -> ProbabilityMode;

    /// Probability (in percent) attached to the strike of `call`.
    /// `chain` is the call's own expiry, for sources that pair with the put.
    fn probability_pct(
        &self,
        chain: &ExpiryChain,
        call: &Quote,
        spot: Decimal,
        now: DateTime<Utc>,
    ) -> EngineResult<f64>;
}
