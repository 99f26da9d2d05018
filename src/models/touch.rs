use crate::config::ModelConfig;
use crate::errors::{EngineError, EngineResult};
use crate::models::contract::{OptionContract, OptionSide};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use statrs::distribution::{ContinuousCDF, Normal};

/// Floor on days-to-expiry once rounding has been applied. Keeps an
/// unexpired contract that rounds to `0.0` days away from a zero `T`.
const MIN_DAYS_TO_EXPIRY: f64 = 0.01;

const DAYS_PER_YEAR: f64 = 365.0;

/// Barrier-touch probability.
///
/// P(touch) = 2 * Phi(+d1) for calls (strike above spot)
/// P(touch) = 2 * Phi(-d1) for puts  (strike below spot)
///
/// where d1 = (ln(S/K) + (r + sigma^2/2)*T) / (sigma * sqrt(T)).
///
/// The doubling is the reflection-principle first-passage approximation.
/// It overshoots 1 deep in the money, so the result is clamped to [0, 1].
pub struct TouchModel {
    /// Standard normal distribution (created once, reused)
    normal: Normal,
    risk_free_rate: f64,
    legacy_day_rounding: bool,
}

/// Inputs to d1 after validation and unit conversion.
#[derive(Debug, Clone, Copy)]
pub struct TouchParams {
    pub spot: f64,
    pub strike: f64,
    pub sigma: f64,
    pub ttl_years: f64,
}

impl TouchModel {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            normal: Normal::standard(),
            risk_free_rate: config.risk_free_rate,
            legacy_day_rounding: config.legacy_day_rounding,
        }
    }

    /// `T` in years, measured from `now`. Expired contracts are a domain error.
    pub fn time_to_expiry_years(
        &self,
        contract: &OptionContract,
        now: DateTime<Utc>,
    ) -> EngineResult<f64> {
        let days = contract.days_to_expiry(now);
        if !days.is_finite() || days <= 0.0 {
            return Err(EngineError::Domain(format!(
                "contract expired {:.2} days ago",
                -days
            )));
        }
        let days = if self.legacy_day_rounding {
            round_to_tenth(days)
        } else {
            days
        };
        Ok(days.max(MIN_DAYS_TO_EXPIRY) / DAYS_PER_YEAR)
    }

    pub fn params(
        &self,
        contract: &OptionContract,
        implied_vol: f64,
        spot: Decimal,
        now: DateTime<Utc>,
    ) -> EngineResult<TouchParams> {
        if !implied_vol.is_finite() || implied_vol <= 0.0 {
            return Err(EngineError::Domain(format!(
                "implied vol must be > 0, got {implied_vol}"
            )));
        }
        let spot = to_positive_f64(spot)
            .ok_or_else(|| EngineError::InvalidArgument(format!("spot must be > 0, got {spot}")))?;
        let strike = to_positive_f64(contract.strike).ok_or_else(|| {
            EngineError::InvalidArgument(format!("strike must be > 0, got {}", contract.strike))
        })?;
        let ttl_years = self.time_to_expiry_years(contract, now)?;

        Ok(TouchParams {
            spot,
            strike,
            sigma: implied_vol,
            ttl_years,
        })
    }

    /// P(spot touches the contract's strike before expiry), in [0, 1].
    pub fn probability(
        &self,
        contract: &OptionContract,
        implied_vol: f64,
        spot: Decimal,
        now: DateTime<Utc>,
    ) -> EngineResult<f64> {
        let params = self.params(contract, implied_vol, spot, now)?;
        self.probability_from_params(contract.side, &params)
    }

    #[inline]
    pub fn d1(&self, params: &TouchParams) -> f64 {
        let sigma_sqrt_t = params.sigma * params.ttl_years.sqrt();
        ((params.spot / params.strike).ln()
            + (self.risk_free_rate + 0.5 * params.sigma * params.sigma) * params.ttl_years)
            / sigma_sqrt_t
    }

    pub fn probability_from_params(&self, side: OptionSide, params: &TouchParams) -> EngineResult<f64> {
        let d1 = self.d1(params);
        if !d1.is_finite() {
            return Err(EngineError::Domain(format!("d1 is not finite for {params:?}")));
        }

        let p = match side {
            OptionSide::Call => 2.0 * self.normal.cdf(d1),
            OptionSide::Put => 2.0 * self.normal.cdf(-d1),
        };

        Ok(p.clamp(0.0, 1.0))
    }
}

#[inline]
fn round_to_tenth(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

#[inline]
fn to_positive_f64(d: Decimal) -> Option<f64> {
    d.to_f64().filter(|v| v.is_finite() && *v > 0.0)
}
