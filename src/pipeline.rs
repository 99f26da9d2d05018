use crate::chain::{ExpiryChain, Quote, SkippedContract};
use crate::config::ModelConfig;
use crate::errors::{EngineError, EngineResult};
use crate::models::axis::StrikeAxis;
use crate::models::contract::OptionSide;
use crate::models::intervals::{self, round_pct, DeltaProbability, TouchProbability};
use crate::models::kde::AdaptiveKde;
use crate::models::touch::TouchModel;
use crate::models::ProbabilitySource;
use crate::state::{ChainRow, ChartSeries, CurvePoint, IntervalBar, ModeSummary};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Everything one refresh computes from one expiry and one spot.
#[derive(Debug, Clone)]
pub struct RefreshOutput {
    pub rows: Vec<ChainRow>,
    pub charts: Vec<ChartSeries>,
    pub summary: Vec<ModeSummary>,
    pub skipped: Vec<SkippedContract>,
}

/// Pure computation stage of a refresh: rows, both charts, summary.
/// Created once, reused every cycle. No IO.
pub struct Pipeline {
    delta: DeltaProbability,
    touch: TouchProbability,
    kde: AdaptiveKde,
}

impl Pipeline {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            delta: DeltaProbability,
            touch: TouchProbability::new(TouchModel::new(config)),
            kde: AdaptiveKde::new(config),
        }
    }

    /// Contract-scoped failures land in `skipped`; anything that breaks a
    /// chart fails the whole run.
    pub fn run(
        &self,
        chain: &ExpiryChain,
        spot: Decimal,
        now: DateTime<Utc>,
    ) -> EngineResult<RefreshOutput> {
        let spot_f64 = spot
            .to_f64()
            .filter(|s| *s > 0.0)
            .ok_or_else(|| EngineError::InvalidArgument(format!("spot must be > 0, got {spot}")))?;

        if chain.is_empty() {
            return Err(EngineError::Domain(format!("expiry {} has no quotes", chain.code())));
        }

        let mut skipped: BTreeMap<String, String> = BTreeMap::new();

        let rows = self.rows(chain, spot, now, &mut skipped);

        let sources: [&dyn ProbabilitySource; 2] = [&self.delta, &self.touch];
        let mut charts = Vec::with_capacity(sources.len());
        let mut summary = Vec::with_capacity(sources.len());

        for source in sources {
            let (chart, mode_summary) = self.chart(source, chain, spot, spot_f64, now, &mut skipped)?;
            charts.push(chart);
            summary.push(mode_summary);
        }

        Ok(RefreshOutput {
            rows,
            charts,
            summary,
            skipped: skipped
                .into_iter()
                .map(|(symbol, reason)| SkippedContract { symbol, reason })
                .collect(),
        })
    }

    fn rows(
        &self,
        chain: &ExpiryChain,
        spot: Decimal,
        now: DateTime<Utc>,
        skipped: &mut BTreeMap<String, String>,
    ) -> Vec<ChainRow> {
        let touch_pct = |quote: &Quote, skipped: &mut BTreeMap<String, String>| {
            match self.touch.model().probability(&quote.contract, quote.mark_iv, spot, now) {
                Ok(p) => Some(round_pct(p * 100.0)),
                Err(e) => {
                    tracing::warn!(symbol = %quote.symbol, error = %e, "touch probability skipped");
                    skipped.entry(quote.symbol.clone()).or_insert_with(|| e.to_string());
                    None
                }
            }
        };

        chain
            .strikes()
            .into_iter()
            .map(|strike| {
                let call = chain.find(strike, OptionSide::Call);
                let put = chain.find(strike, OptionSide::Put);
                ChainRow {
                    strike,
                    call_touch_pct: call.and_then(|q| touch_pct(q, skipped)),
                    call_delta_pct: call.map(|q| round_pct(q.delta * 100.0)),
                    put_delta_pct: put.map(|q| round_pct(-q.delta * 100.0)),
                    put_touch_pct: put.and_then(|q| touch_pct(q, skipped)),
                    mark_iv_pct: call.or(put).map(|q| round_pct(q.mark_iv * 100.0)),
                }
            })
            .collect()
    }

    fn chart(
        &self,
        source: &dyn ProbabilitySource,
        chain: &ExpiryChain,
        spot: Decimal,
        spot_f64: f64,
        now: DateTime<Utc>,
        skipped: &mut BTreeMap<String, String>,
    ) -> EngineResult<(ChartSeries, ModeSummary)> {
        let mode = source.mode();
        let (points, point_skips) = intervals::probability_points(source, chain, spot, now)?;
        for s in point_skips {
            skipped.entry(s.symbol).or_insert(s.reason);
        }

        let bars_src = intervals::build_intervals(&points, mode, spot)?;

        let pairs = points
            .iter()
            .map(|p| p.as_f64_pair())
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| EngineError::Domain(format!("{mode}: strike not representable as f64")))?;
        let curve = self
            .kde
            .estimate(&pairs)
            .map_err(|e| prefix_mode(mode, e))?;

        let strikes: Vec<Decimal> = points.iter().map(|p| p.strike).collect();
        let axis = StrikeAxis::new(&strikes).map_err(|e| prefix_mode(mode, e))?;

        let bars = bars_src
            .into_iter()
            .map(|iv| {
                let mid = iv.low + (iv.high - iv.low) / Decimal::TWO;
                Ok(IntervalBar {
                    center: axis.position_decimal(mid)?,
                    label: iv.label,
                    low: iv.low,
                    high: iv.high,
                    mass_per_unit_price: iv.mass_per_unit_price,
                })
            })
            .collect::<EngineResult<Vec<_>>>()?;

        let spot_marker = match axis.position_decimal(spot) {
            Ok(pos) => Some(pos),
            Err(e) => {
                tracing::debug!(mode = %mode, error = %e, "spot marker off axis");
                None
            }
        };
        let spot_bar_marker = axis.bar_position(spot_f64).ok();

        let clamp = |x: f64| x.clamp(axis.min(), axis.max());
        let kde_mode_marker = axis.position(clamp(curve.mode_price()))?;
        let curve_points = curve
            .xs
            .iter()
            .zip(&curve.densities)
            .map(|(&x, &density)| {
                Ok(CurvePoint {
                    price: x,
                    position: axis.position(clamp(x))?,
                    density,
                })
            })
            .collect::<EngineResult<Vec<_>>>()?;

        let summary = ModeSummary {
            mode,
            kde_mode_price: curve.mode_price(),
            deviation_pct: curve.mode_deviation_pct(spot_f64),
        };

        tracing::debug!(
            mode = %mode,
            points = points.len(),
            bars = bars.len(),
            kde_mode = summary.kde_mode_price,
            deviation_pct = summary.deviation_pct,
            "chart built"
        );

        Ok((
            ChartSeries {
                mode,
                bars,
                spot_marker,
                spot_bar_marker,
                kde_mode_marker,
                curve: curve_points,
            },
            summary,
        ))
    }
}

fn prefix_mode(mode: crate::models::ProbabilityMode, e: EngineError) -> EngineError {
    match e {
        EngineError::Domain(msg) => EngineError::Domain(format!("{mode}: {msg}")),
        EngineError::Range(msg) => EngineError::Range(format!("{mode}: {msg}")),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::tests::quote;
    use crate::chain::OptionChain;
    use crate::models::kde::GRID_POINTS;
    use crate::models::ProbabilityMode;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap()
    }

    fn three_strike_chain() -> OptionChain {
        OptionChain::from_quotes(vec![
            quote("BTC-30JAN26-90000-C", 0.55, 0.80),
            quote("BTC-30JAN26-90000-P", 0.55, -0.20),
            quote("BTC-30JAN26-100000-C", 0.50, 0.50),
            quote("BTC-30JAN26-100000-P", 0.50, -0.50),
            quote("BTC-30JAN26-110000-C", 0.52, 0.20),
            quote("BTC-30JAN26-110000-P", 0.52, -0.80),
        ])
    }

    #[test]
    fn test_end_to_end_delta_scenario() {
        let chain = three_strike_chain();
        let exp = chain.select(None, now()).unwrap();
        let out = Pipeline::new(&ModelConfig::default())
            .run(exp, dec!(100000), now())
            .unwrap();

        let delta = &out.charts[0];
        assert_eq!(delta.mode, ProbabilityMode::Delta);
        let labels: Vec<_> = delta.bars.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["$90000-$100000", "$100000-$110000"]);
        for bar in &delta.bars {
            assert!((bar.mass_per_unit_price - 30.0 / 10_000.0).abs() < 1e-12);
        }
        assert!((delta.bars[0].center - 0.5).abs() < 1e-12);
        assert!((delta.bars[1].center - 1.5).abs() < 1e-12);

        let spot = delta.spot_marker.unwrap();
        assert!((spot - 1.0).abs() < 1e-12, "spot marker {spot}");
        let spot_bar = delta.spot_bar_marker.unwrap();
        assert!((spot_bar - 0.5).abs() < 1e-12, "spot bar marker {spot_bar}");

        assert_eq!(delta.curve.len(), GRID_POINTS);
        assert!(delta.curve.iter().all(|c| (0.0..=2.0).contains(&c.position)));
        assert!((0.0..=2.0).contains(&delta.kde_mode_marker));

        assert_eq!(out.summary.len(), 2);
        let s = out.summary[0];
        assert!((s.deviation_pct - (s.kde_mode_price - 100_000.0) / 1_000.0).abs() < 1e-9);
        assert!(out.skipped.is_empty());
    }

    #[test]
    fn test_rows_pair_by_strike() {
        let chain = three_strike_chain();
        let exp = chain.select(None, now()).unwrap();
        let out = Pipeline::new(&ModelConfig::default())
            .run(exp, dec!(100000), now())
            .unwrap();

        assert_eq!(out.rows.len(), 3);
        let row = &out.rows[0];
        assert_eq!(row.strike, dec!(90000));
        assert_eq!(row.call_delta_pct, Some(80.0));
        assert_eq!(row.put_delta_pct, Some(20.0));
        assert_eq!(row.mark_iv_pct, Some(55.0));
        assert!(row.call_touch_pct.is_some() && row.put_touch_pct.is_some());

        // ATM call and put touch are both near certain-ish and bounded.
        let atm = &out.rows[1];
        for p in [atm.call_touch_pct.unwrap(), atm.put_touch_pct.unwrap()] {
            assert!((0.0..=100.0).contains(&p));
        }
    }

    #[test]
    fn test_zero_vol_contract_is_skipped_not_fatal() {
        let chain = OptionChain::from_quotes(vec![
            quote("BTC-30JAN26-90000-C", 0.55, 0.80),
            quote("BTC-30JAN26-90000-P", 0.55, -0.20),
            quote("BTC-30JAN26-100000-C", 0.50, 0.55),
            quote("BTC-30JAN26-110000-C", 0.0, 0.30),
            quote("BTC-30JAN26-120000-C", 0.52, 0.15),
            quote("BTC-30JAN26-130000-C", 0.53, 0.08),
        ]);
        let exp = chain.select(None, now()).unwrap();
        let out = Pipeline::new(&ModelConfig::default())
            .run(exp, dec!(95000), now())
            .unwrap();

        let bad = "BTC-30JAN26-110000-C";
        assert_eq!(out.skipped.len(), 1);
        assert_eq!(out.skipped[0].symbol, bad);
        assert!(out.skipped[0].reason.starts_with("domain error"));

        let row = out.rows.iter().find(|r| r.strike == dec!(110000)).unwrap();
        assert_eq!(row.call_touch_pct, None);
        assert_eq!(row.call_delta_pct, Some(30.0));

        // Delta chart keeps all five strikes, touch chart drops the bad one.
        let touch = out.charts.iter().find(|c| c.mode == ProbabilityMode::Touch).unwrap();
        assert!(touch.bars.iter().all(|b| b.low != dec!(110000) && b.high != dec!(110000)));
        let delta = out.charts.iter().find(|c| c.mode == ProbabilityMode::Delta).unwrap();
        assert_eq!(delta.bars.len(), 4);
    }

    #[test]
    fn test_too_few_strikes_fails_cycle() {
        let chain = OptionChain::from_quotes(vec![quote("BTC-30JAN26-100000-C", 0.5, 0.5)]);
        let exp = chain.select(None, now()).unwrap();
        let res = Pipeline::new(&ModelConfig::default()).run(exp, dec!(100000), now());
        assert!(matches!(res, Err(EngineError::Domain(_))));
    }

    #[test]
    fn test_huge_strikes_do_not_overflow_midpoints() {
        let chain = OptionChain::from_quotes(vec![
            quote("BTC-30JAN26-90000-C", 0.55, 0.80),
            quote("BTC-30JAN26-90000-P", 0.55, -0.20),
            quote("BTC-30JAN26-50000000000000000000000000000-C", 0.50, 0.01),
            quote("BTC-30JAN26-70000000000000000000000000000-C", 0.50, 0.00),
        ]);
        let exp = chain.select(None, now()).unwrap();
        let out = Pipeline::new(&ModelConfig::default())
            .run(exp, dec!(100000), now())
            .unwrap();

        let delta = out.charts.iter().find(|c| c.mode == ProbabilityMode::Delta).unwrap();
        assert_eq!(delta.bars.len(), 2);
        assert!((delta.bars[1].center - 1.5).abs() < 1e-9, "center {}", delta.bars[1].center);
    }

    #[test]
    fn test_spot_off_axis_has_no_marker() {
        let chain = three_strike_chain();
        let exp = chain.select(None, now()).unwrap();
        let out = Pipeline::new(&ModelConfig::default())
            .run(exp, dec!(150000), now())
            .unwrap();
        assert!(out
            .charts
            .iter()
            .all(|c| c.spot_marker.is_none() && c.spot_bar_marker.is_none()));
    }
}
