use crate::errors::{EngineError, EngineResult};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Sorted, unevenly spaced strike axis. Maps a price to a fractional strike
/// index so that price-valued markers (spot, KDE mode) and the KDE curve can be
/// drawn over charts whose x axis is the strike index.
#[derive(Debug, Clone)]
pub struct StrikeAxis {
    strikes: Vec<f64>,
}

impl StrikeAxis {
    pub fn new(strikes: &[Decimal]) -> EngineResult<Self> {
        if strikes.len() < 2 {
            return Err(EngineError::Range(format!(
                "strike axis needs at least 2 strikes, got {}",
                strikes.len()
            )));
        }
        let strikes = strikes
            .iter()
            .map(|k| {
                k.to_f64()
                    .ok_or_else(|| EngineError::InvalidArgument(format!("strike {k} is not representable")))
            })
            .collect::<EngineResult<Vec<f64>>>()?;
        if strikes.windows(2).any(|w| w[1] <= w[0]) {
            return Err(EngineError::InvalidArgument(
                "strike axis must be strictly ascending".into(),
            ));
        }
        Ok(Self { strikes })
    }

    #[inline]
    pub fn min(&self) -> f64 {
        self.strikes[0]
    }

    #[inline]
    pub fn max(&self) -> f64 {
        self.strikes[self.strikes.len() - 1]
    }

    /// Fractional strike index: exactly `i` at strike `i`, `i + 0.5` at the
    /// midpoint of interval `i`, linear in between.
    pub fn position(&self, value: f64) -> EngineResult<f64> {
        if !(self.min()..=self.max()).contains(&value) {
            return Err(EngineError::Range(format!(
                "{value} outside strike axis [{}, {}]",
                self.min(),
                self.max()
            )));
        }

        // First strike >= value.
        let idx = self.strikes.partition_point(|&k| k < value);
        if idx == 0 {
            return Ok(0.0);
        }

        let (lo, hi) = (self.strikes[idx - 1], self.strikes[idx]);
        let half = (hi - lo) / 2.0;
        let mid = lo + half;
        Ok((idx - 1) as f64 + 0.5 + (value - mid) / half / 2.0)
    }

    /// Same mapping on a bar axis where bar `i` covers interval `i` and is
    /// centred at `i`: interval midpoints land on bar centres.
    #[inline]
    pub fn bar_position(&self, value: f64) -> EngineResult<f64> {
        Ok(self.position(value)? - 0.5)
    }

    #[inline]
    pub fn position_decimal(&self, value: Decimal) -> EngineResult<f64> {
        let v = value
            .to_f64()
            .ok_or_else(|| EngineError::Range(format!("{value} is not representable")))?;
        self.position(v)
    }
}
