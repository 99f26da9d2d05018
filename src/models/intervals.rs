use crate::chain::{ExpiryChain, Quote, SkippedContract};
use crate::errors::{EngineError, EngineResult};
use crate::models::contract::OptionSide;
use crate::models::touch::TouchModel;
use crate::models::{ProbabilityMode, ProbabilitySource};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// A strike and the probability (percent) attached to it.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct ProbabilityPoint {
    pub strike: Decimal,
    pub probability_pct: f64,
}

impl ProbabilityPoint {
    #[inline]
    pub fn as_f64_pair(&self) -> Option<(f64, f64)> {
        Some((self.strike.to_f64()?, self.probability_pct))
    }
}

/// Price interval between two adjacent strikes.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Interval {
    pub low: Decimal,
    pub high: Decimal,
    /// `$low-$high`, for axis annotation.
    pub label: String,
    /// Probability percent per unit of price.
    pub mass_per_unit_price: f64,
}

/// Probability = call delta.
pub struct DeltaProbability;

impl ProbabilitySource for DeltaProbability {
    fn mode(&self) -> ProbabilityMode {
        ProbabilityMode::Delta
    }

    fn probability_pct(
        &self,
        _chain: &ExpiryChain,
        call: &Quote,
        _spot: Decimal,
        _now: DateTime<Utc>,
    ) -> EngineResult<f64> {
        Ok(round_pct(call.delta * 100.0))
    }
}

/// Probability = P(touch). Strikes above spot use the call, strikes below
/// spot use the put listed at the same strike.
pub struct TouchProbability {
    model: TouchModel,
}

impl TouchProbability {
    pub fn new(model: TouchModel) -> Self {
        Self { model }
    }

    #[inline]
    pub fn model(&self) -> &TouchModel {
        &self.model
    }
}

impl ProbabilitySource for TouchProbability {
    fn mode(&self) -> ProbabilityMode {
        ProbabilityMode::Touch
    }

    fn probability_pct(
        &self,
        chain: &ExpiryChain,
        call: &Quote,
        spot: Decimal,
        now: DateTime<Utc>,
    ) -> EngineResult<f64> {
        let strike = call.contract.strike;
        let quote = if spot <= strike {
            call
        } else {
            chain.find(strike, OptionSide::Put).ok_or_else(|| {
                EngineError::Lookup(format!("no put listed at strike {strike} for {}", call.symbol))
            })?
        };
        let p = self
            .model
            .probability(&quote.contract, quote.mark_iv, spot, now)
            .map_err(|e| match e {
                EngineError::Domain(msg) => EngineError::Domain(format!("{}: {msg}", quote.symbol)),
                other => other,
            })?;
        Ok(round_pct(p * 100.0))
    }
}

/// One point per call strike, ascending. Strikes whose probability cannot be
/// computed are reported in the second vector and left out; errors that are
/// not scoped to one contract abort.
pub fn probability_points(
    source: &dyn ProbabilitySource,
    chain: &ExpiryChain,
    spot: Decimal,
    now: DateTime<Utc>,
) -> EngineResult<(Vec<ProbabilityPoint>, Vec<SkippedContract>)> {
    let mut points = Vec::new();
    let mut skipped = Vec::new();

    for call in chain.calls() {
        match source.probability_pct(chain, call, spot, now) {
            Ok(probability_pct) => points.push(ProbabilityPoint {
                strike: call.contract.strike,
                probability_pct,
            }),
            Err(e) if e.is_contract_scoped() => {
                tracing::warn!(
                    symbol = %call.symbol,
                    mode = %source.mode(),
                    error = %e,
                    "strike skipped"
                );
                skipped.push(SkippedContract {
                    symbol: call.symbol.clone(),
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }

    Ok((points, skipped))
}

/// Mass per unit price for every adjacent pair of points.
///
/// mass = |p[i+1] - p[i]| / (strike[i+1] - strike[i])
///
/// Touch mode only:
///   - the interval holding spot strictly inside is dropped, touch
///     probabilities fold over at spot and would show a false spike there
///   - a zero difference becomes 1 / width, a floor on per-interval mass
pub fn build_intervals(
    points: &[ProbabilityPoint],
    mode: ProbabilityMode,
    spot: Decimal,
) -> EngineResult<Vec<Interval>> {
    let mut intervals = Vec::with_capacity(points.len().saturating_sub(1));

    for pair in points.windows(2) {
        let (lo, hi) = (&pair[0], &pair[1]);
        if hi.strike <= lo.strike {
            return Err(EngineError::InvalidArgument(format!(
                "points must be strictly ascending by strike ({} then {})",
                lo.strike, hi.strike
            )));
        }

        if mode == ProbabilityMode::Touch && lo.strike < spot && spot < hi.strike {
            continue;
        }

        let width = (hi.strike - lo.strike)
            .to_f64()
            .ok_or_else(|| EngineError::Domain(format!("interval width {} - {}", hi.strike, lo.strike)))?;
        let diff = (hi.probability_pct - lo.probability_pct).abs();

        let mass_per_unit_price = if mode == ProbabilityMode::Touch && diff == 0.0 {
            1.0 / width
        } else {
            diff / width
        };

        intervals.push(Interval {
            low: lo.strike,
            high: hi.strike,
            label: format!("${}-${}", lo.strike, hi.strike),
            mass_per_unit_price,
        });
    }

    Ok(intervals)
}

/// Two decimals, the precision probabilities are shown at.
#[inline]
pub(crate) fn round_pct(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::tests::quote;
    use crate::chain::OptionChain;
    use crate::config::ModelConfig;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn points(pairs: &[(i64, f64)]) -> Vec<ProbabilityPoint> {
        pairs
            .iter()
            .map(|&(k, p)| ProbabilityPoint {
                strike: Decimal::from(k),
                probability_pct: p,
            })
            .collect()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_delta_mode_intervals() {
        let pts = points(&[(90_000, 80.0), (100_000, 50.0), (110_000, 20.0)]);
        let intervals = build_intervals(&pts, ProbabilityMode::Delta, dec!(100000)).unwrap();

        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[0].label, "$90000-$100000");
        assert_eq!(intervals[1].label, "$100000-$110000");
        for iv in &intervals {
            assert!((iv.mass_per_unit_price - 30.0 / 10_000.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_touch_mode_skips_straddling_interval() {
        let pts = points(&[(90_000, 40.0), (100_000, 90.0), (110_000, 70.0), (120_000, 30.0)]);
        let intervals = build_intervals(&pts, ProbabilityMode::Touch, dec!(104000)).unwrap();
        let labels: Vec<_> = intervals.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, vec!["$90000-$100000", "$110000-$120000"]);

        // Delta mode never skips.
        let all = build_intervals(&pts, ProbabilityMode::Delta, dec!(104000)).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_touch_mode_zero_difference_floor() {
        let pts = points(&[(90_000, 10.0), (95_000, 10.0)]);
        let touch = build_intervals(&pts, ProbabilityMode::Touch, dec!(80000)).unwrap();
        assert!((touch[0].mass_per_unit_price - 1.0 / 5_000.0).abs() < 1e-15);

        let delta = build_intervals(&pts, ProbabilityMode::Delta, dec!(80000)).unwrap();
        assert_eq!(delta[0].mass_per_unit_price, 0.0);
    }

    #[test]
    fn test_mass_telescopes_when_spot_outside() {
        let pts = points(&[(90_000, 95.5), (92_500, 81.25), (100_000, 60.0), (110_000, 12.0)]);
        for spot in [dec!(85000), dec!(120000)] {
            let intervals = build_intervals(&pts, ProbabilityMode::Touch, spot).unwrap();
            assert_eq!(intervals.len(), 3);
            let total: f64 = intervals
                .iter()
                .map(|i| i.mass_per_unit_price * (i.high - i.low).to_f64().unwrap())
                .sum();
            assert!((total - (95.5 - 12.0)).abs() < 1e-9, "total={total}");
        }
    }

    #[test]
    fn test_unsorted_points_rejected() {
        let pts = points(&[(100_000, 50.0), (90_000, 80.0)]);
        let res = build_intervals(&pts, ProbabilityMode::Delta, dec!(95000));
        assert!(matches!(res, Err(EngineError::InvalidArgument(_))));
    }

    #[test]
    fn test_delta_points() {
        let chain = OptionChain::from_quotes(vec![
            quote("BTC-30JAN26-90000-C", 0.5, 0.8),
            quote("BTC-30JAN26-90000-P", 0.5, -0.2),
            quote("BTC-30JAN26-100000-C", 0.5, 0.50004),
        ]);
        let exp = chain.select(None, now()).unwrap();
        let (pts, skipped) = probability_points(&DeltaProbability, exp, dec!(95000), now()).unwrap();
        assert!(skipped.is_empty());
        assert_eq!(pts.len(), 2);
        assert_eq!(pts[0].probability_pct, 80.0);
        assert_eq!(pts[1].probability_pct, 50.0);
    }

    #[test]
    fn test_touch_points_pair_with_put_below_spot() {
        let chain = OptionChain::from_quotes(vec![
            quote("BTC-30JAN26-90000-C", 0.6, 0.8),
            quote("BTC-30JAN26-90000-P", 0.6, -0.2),
            quote("BTC-30JAN26-110000-C", 0.6, 0.3),
        ]);
        let exp = chain.select(None, now()).unwrap();
        let model = TouchModel::new(&ModelConfig::default());
        let source = TouchProbability::new(TouchModel::new(&ModelConfig::default()));
        let spot = dec!(100000);

        let (pts, skipped) = probability_points(&source, exp, spot, now()).unwrap();
        assert!(skipped.is_empty());

        let put = exp.find(dec!(90000), OptionSide::Put).unwrap();
        let expected_put = model.probability(&put.contract, 0.6, spot, now()).unwrap();
        assert!((pts[0].probability_pct - round_pct(expected_put * 100.0)).abs() < 1e-9);

        let call = exp.find(dec!(110000), OptionSide::Call).unwrap();
        let expected_call = model.probability(&call.contract, 0.6, spot, now()).unwrap();
        assert!((pts[1].probability_pct - round_pct(expected_call * 100.0)).abs() < 1e-9);
    }

    #[test]
    fn test_touch_points_missing_put_is_lookup_error() {
        let chain = OptionChain::from_quotes(vec![
            quote("BTC-30JAN26-90000-C", 0.6, 0.8),
            quote("BTC-30JAN26-110000-C", 0.6, 0.3),
        ]);
        let exp = chain.select(None, now()).unwrap();
        let source = TouchProbability::new(TouchModel::new(&ModelConfig::default()));

        let call = exp.find(dec!(90000), OptionSide::Call).unwrap();
        let res = source.probability_pct(exp, call, dec!(100000), now());
        assert!(matches!(res, Err(EngineError::Lookup(_))));

        let (pts, skipped) = probability_points(&source, exp, dec!(100000), now()).unwrap();
        assert_eq!(pts.len(), 1);
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].symbol, "BTC-30JAN26-90000-C");
    }
}
