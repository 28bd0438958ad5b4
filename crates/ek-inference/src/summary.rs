//! Posterior summaries: median with a 95% credible interval per parameter, and
//! percentile bands of the predictive rate constants across the grid.

use std::fmt;

use serde::Serialize;

/// Central credible levels (percent) drawn as predictive bands.
pub const PPC_BAND_LEVELS: [f64; 4] = [95.0, 75.0, 50.0, 25.0];

/// Linear-interpolation quantile of sorted data (`q` in `[0, 1]`).
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() as f64 - 1.0);
    let i0 = pos.floor() as usize;
    let i1 = pos.ceil() as usize;
    let f = pos - i0 as f64;
    sorted[i0] * (1.0 - f) + sorted[i1] * f
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(f64::total_cmp);
    v
}

/// `{median, q2.5, q97.5}` of one parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSummary {
    /// Parameter name.
    pub name: String,
    /// Posterior median.
    pub median: f64,
    /// 2.5th percentile.
    pub q2_5: f64,
    /// 97.5th percentile.
    pub q97_5: f64,
}

impl ParameterSummary {
    /// Summarize pooled draws of one parameter.
    pub fn from_draws(name: impl Into<String>, draws: &[f64]) -> Self {
        let s = sorted(draws);
        Self {
            name: name.into(),
            median: quantile_sorted(&s, 0.5),
            q2_5: quantile_sorted(&s, 0.025),
            q97_5: quantile_sorted(&s, 0.975),
        }
    }

    /// Whether `value` lies inside the 95% interval.
    pub fn covers(&self, value: f64) -> bool {
        self.q2_5 <= value && value <= self.q97_5
    }
}

impl fmt::Display for ParameterSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<14} {:>10.3}  [{:.3}, {:.3}]", self.name, self.median, self.q2_5, self.q97_5)
    }
}

/// Summaries of named columns, one per column.
pub fn summarize_columns(names: &[String], columns: &[Vec<f64>]) -> Vec<ParameterSummary> {
    names.iter().zip(columns).map(|(n, c)| ParameterSummary::from_draws(n.clone(), c)).collect()
}

/// One central band `[lower, upper]` at `level` percent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Band {
    /// Credible level in percent.
    pub level: f64,
    /// Lower edge (`50 - level/2` percentile).
    pub lower: f64,
    /// Upper edge (`50 + level/2` percentile).
    pub upper: f64,
}

/// Predictive bands at one grid concentration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PpcBand {
    /// Grid concentration (µM).
    pub conc: f64,
    /// Median predictive rate constant.
    pub median: f64,
    /// Bands, widest first.
    pub bands: Vec<Band>,
}

/// Percentile bands of `k_ppc` (one vector per draw) at each grid point.
pub fn ppc_bands(k_ppc: &[Vec<f64>], conc: &[f64], levels: &[f64]) -> Vec<PpcBand> {
    conc.iter()
        .enumerate()
        .map(|(j, &c)| {
            let column: Vec<f64> = k_ppc.iter().filter_map(|v| v.get(j).copied()).collect();
            let s = sorted(&column);
            let bands = levels
                .iter()
                .map(|&level| Band {
                    level,
                    lower: quantile_sorted(&s, (50.0 - level / 2.0) / 100.0),
                    upper: quantile_sorted(&s, (50.0 + level / 2.0) / 100.0),
                })
                .collect();
            PpcBand { conc: c, median: quantile_sorted(&s, 0.5), bands }
        })
        .collect()
}
