use crate::config::ModelConfig;
use crate::errors::{EngineError, EngineResult};
use statrs::distribution::{Continuous, Normal};

/// Evaluation grid size. Bounds the cost of one estimate.
pub const GRID_POINTS: usize = 1000;

/// Bandwidth (price units) for an anchor with no neighbour at all.
pub const FALLBACK_BANDWIDTH: f64 = 5000.0;

/// Gaussian KDE with a per-anchor bandwidth taken from the k-th nearest
/// neighbour distance. Sparse strikes get wide kernels, dense strikes narrow
/// ones.
///
/// Input is the ordered (price, cumulative probability %) series. The mass
/// between two adjacent points, |p[i+1] - p[i]|, is anchored at price[i].
/// The curve is not renormalised: only its shape and argmax are used.
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveKde {
    neighbors: usize,
    bandwidth_scale: f64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DensityCurve {
    pub xs: Vec<f64>,
    pub densities: Vec<f64>,
    /// Grid x at the global density maximum (first one on ties).
    pub mode: f64,
}

impl DensityCurve {
    /// Mode rounded to a whole price unit, as reported.
    #[inline]
    pub fn mode_price(&self) -> f64 {
        self.mode.round()
    }

    /// (mode - spot) / spot, in percent.
    #[inline]
    pub fn mode_deviation_pct(&self, spot: f64) -> f64 {
        (self.mode_price() - spot) / spot * 100.0
    }
}

impl AdaptiveKde {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            neighbors: config.kde_neighbors.max(1),
            bandwidth_scale: config.kde_bandwidth_scale,
        }
    }

    pub fn estimate(&self, points: &[(f64, f64)]) -> EngineResult<DensityCurve> {
        if points.len() < 2 {
            return Err(EngineError::Domain(format!(
                "KDE needs at least 2 points, got {}",
                points.len()
            )));
        }
        if points.iter().any(|(x, p)| !x.is_finite() || !p.is_finite()) {
            return Err(EngineError::Domain("KDE input contains non-finite values".into()));
        }
        if points.windows(2).any(|w| w[1].0 <= w[0].0) {
            return Err(EngineError::InvalidArgument(
                "KDE input must be strictly ascending by price".into(),
            ));
        }

        let anchors: Vec<f64> = points[..points.len() - 1].iter().map(|(x, _)| *x).collect();
        let pmf: Vec<f64> = points.windows(2).map(|w| (w[1].1 - w[0].1).abs()).collect();
        let bandwidths = self.bandwidths(&anchors);

        let kernels = anchors
            .iter()
            .zip(&bandwidths)
            .map(|(&mean, &h)| {
                Normal::new(mean, h)
                    .map_err(|e| EngineError::Domain(format!("kernel at {mean} with h={h}: {e}")))
            })
            .collect::<EngineResult<Vec<_>>>()?;

        let min = points[0].0;
        let max = points[points.len() - 1].0;
        let step = (max - min) / (GRID_POINTS - 1) as f64;
        let xs: Vec<f64> = (0..GRID_POINTS).map(|i| min + i as f64 * step).collect();

        let densities: Vec<f64> = xs
            .iter()
            .map(|&x| {
                kernels
                    .iter()
                    .zip(&pmf)
                    .map(|(k, &w)| w * k.pdf(x))
                    .sum::<f64>()
            })
            .collect();

        let mut best = 0;
        for (i, d) in densities.iter().enumerate() {
            if *d > densities[best] {
                best = i;
            }
        }

        Ok(DensityCurve {
            mode: xs[best],
            xs,
            densities,
        })
    }

    /// h_i = (k-th nearest neighbour distance) * scale. With fewer than k
    /// neighbours the farthest one is used; with none, FALLBACK_BANDWIDTH.
    pub fn bandwidths(&self, anchors: &[f64]) -> Vec<f64> {
        anchors
            .iter()
            .enumerate()
            .map(|(i, &a)| {
                let mut distances: Vec<f64> = anchors
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, &b)| (a - b).abs())
                    .collect();
                distances.sort_by(|x, y| x.total_cmp(y));

                let h = match distances.get(self.neighbors - 1).or(distances.last()) {
                    Some(d) => d * self.bandwidth_scale,
                    None => FALLBACK_BANDWIDTH,
                };
                if h.is_finite() && h > 0.0 {
                    h
                } else {
                    FALLBACK_BANDWIDTH
                }
            })
            .collect()
    }
}
