//! Hierarchical Michaelis-Menten model over absorbance traces.
//!
//! Parameters (constrained space), `M` traces:
//!
//! ```text
//! [V_max, K_M, sigma_k, background, rate[0..M], a0[0..M], sigma_a[0..M]]
//! ```
//!
//! Priors:
//! - `k_cat = V_max / (c_enz/1000) ~ LogNormal(ln 150, 2.5)`
//! - `K_M ~ LogNormal(ln 500, 1.5)`
//! - `background ~ Normal(0, 1)`, `a0[m] ~ Normal(0, 1)`
//! - `sigma_k ~ HalfNormal(1)`, `sigma_a[m] ~ HalfNormal(1)`
//! - `rate[m]`: flat
//!
//! Likelihood, on absorbance multiplied by the scaling factor:
//! - blanks `m < M0`: `a[m, j] ~ Normal(background * t_j + a0[m], sigma_a[m])`
//! - traces selected by [`LikelihoodMode`]:
//!   `a[m, j] ~ Normal((rate[m] + background) * t_j + a0[m], sigma_a[m])`
//! - all traces: `k[m] ~ Normal(MM(k_cat, K_M, conc[m]), sigma_k)`
//!   with `k[m] = rate[m] / scaling_factor / epsilon / (c_enz/1000)`.

use ek_core::traits::LogDensityModel;
use ek_core::{Error, Result};
use ek_prob::distributions::{
    half_normal_dlogpdf_dx, half_normal_logpdf, lognormal_dlogpdf_dx, lognormal_logpdf,
    normal_logpdf,
};
use ek_prob::normal::LN_SQRT_2PI;
use serde::{Deserialize, Serialize};

use crate::data::{Assay, KnownConstants};
use crate::kinetics::{michaelis_menten, michaelis_menten_grad};

/// Prior median of `k_cat` (1/s).
pub const K_CAT_PRIOR_MEDIAN: f64 = 150.0;
/// Prior log-scale of `k_cat`.
pub const K_CAT_PRIOR_LOG_SD: f64 = 2.5;
/// Prior median of `K_M` (µM).
pub const K_M_PRIOR_MEDIAN: f64 = 500.0;
/// Prior log-scale of `K_M`.
pub const K_M_PRIOR_LOG_SD: f64 = 1.5;

/// Which traces receive the `rate + background` absorbance likelihood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LikelihoodMode {
    /// Every trace, blanks included; blanks are therefore counted under both regimes.
    #[default]
    DuplicatedBlanks,
    /// Only non-blank traces (`m >= M0`).
    BlanksOnce,
}

/// Index arithmetic for the flat parameter vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterLayout {
    m: usize,
}

impl ParameterLayout {
    /// `V_max` index.
    pub const V_MAX: usize = 0;
    /// `K_M` index.
    pub const K_M: usize = 1;
    /// `sigma_k` index.
    pub const SIGMA_K: usize = 2;
    /// `background` index.
    pub const BACKGROUND: usize = 3;
    const N_GLOBAL: usize = 4;

    /// Layout for `m` traces.
    pub fn new(m: usize) -> Self {
        Self { m }
    }

    /// Number of traces.
    pub fn n_traces(&self) -> usize {
        self.m
    }

    /// Total parameter count `4 + 3M`.
    pub fn dim(&self) -> usize {
        Self::N_GLOBAL + 3 * self.m
    }

    /// Index of `rate[i]`.
    #[inline]
    pub fn rate(&self, i: usize) -> usize {
        Self::N_GLOBAL + i
    }

    /// Index of `a0[i]`.
    #[inline]
    pub fn a0(&self, i: usize) -> usize {
        Self::N_GLOBAL + self.m + i
    }

    /// Index of `sigma_a[i]`.
    #[inline]
    pub fn sigma_a(&self, i: usize) -> usize {
        Self::N_GLOBAL + 2 * self.m + i
    }

    /// Names in vector order; per-trace names are 1-based (`rate[1]`).
    pub fn names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.dim());
        names.extend(["V_max", "K_M", "sigma_k", "background"].map(String::from));
        for prefix in ["rate", "a0", "sigma_a"] {
            for i in 0..self.m {
                names.push(format!("{}[{}]", prefix, i + 1));
            }
        }
        names
    }

    /// `(0, inf)` for `V_max, K_M, sigma_k, sigma_a[*]`, unbounded otherwise.
    pub fn bounds(&self) -> Vec<(f64, f64)> {
        let free = (f64::NEG_INFINITY, f64::INFINITY);
        let positive = (0.0, f64::INFINITY);
        let mut b = vec![free; self.dim()];
        b[Self::V_MAX] = positive;
        b[Self::K_M] = positive;
        b[Self::SIGMA_K] = positive;
        for i in 0..self.m {
            b[self.sigma_a(i)] = positive;
        }
        b
    }

    /// Indices of strictly positive parameters.
    pub fn positive_indices(&self) -> Vec<usize> {
        let mut idx = vec![Self::V_MAX, Self::K_M, Self::SIGMA_K];
        idx.extend((0..self.m).map(|i| self.sigma_a(i)));
        idx
    }
}

/// Per-draw quantities computed from a parameter vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Derived {
    /// Turnover number (1/s).
    pub k_cat: f64,
    /// Reaction velocity per trace (µM/s).
    pub v0: Vec<f64>,
    /// Rate constant per trace (1/s).
    pub k: Vec<f64>,
}

/// Gaussian straight-line likelihood of one trace and its partial derivatives.
struct LineFit {
    lp: f64,
    d_slope: f64,
    d_intercept: f64,
    d_sigma: f64,
}

#[inline]
fn line_loglik(t: &[f64], y: &[f64], slope: f64, intercept: f64, sigma: f64) -> LineFit {
    let inv_var = 1.0 / (sigma * sigma);
    let mut ss = 0.0;
    let mut sr = 0.0;
    let mut srt = 0.0;
    for (&tj, &yj) in t.iter().zip(y) {
        let r = yj - (slope * tj + intercept);
        ss += r * r;
        sr += r;
        srt += r * tj;
    }
    let n = t.len() as f64;
    LineFit {
        lp: -0.5 * ss * inv_var - n * (sigma.ln() + LN_SQRT_2PI),
        d_slope: srt * inv_var,
        d_intercept: sr * inv_var,
        d_sigma: ss * inv_var / sigma - n / sigma,
    }
}

/// Enzyme-kinetics log-density model.
#[derive(Debug, Clone)]
pub struct EnzymeKineticsModel {
    layout: ParameterLayout,
    t: Vec<f64>,
    /// Absorbance multiplied by the scaling factor, one row per trace.
    y: Vec<Vec<f64>>,
    conc: Vec<f64>,
    n_blank: usize,
    constants: KnownConstants,
    mode: LikelihoodMode,
    rate_to_k: f64,
    v_max_to_k_cat: f64,
}

impl EnzymeKineticsModel {
    /// Build from a validated assay.
    pub fn new(assay: &Assay, mode: LikelihoodMode) -> Self {
        let sf = assay.constants.scale();
        let y = assay
            .traces
            .traces()
            .iter()
            .map(|row| row.iter().map(|&a| a * sf).collect())
            .collect();
        Self {
            layout: ParameterLayout::new(assay.traces.n_traces()),
            t: assay.traces.times().to_vec(),
            y,
            conc: assay.conc.clone(),
            n_blank: assay.traces.n_blank(),
            constants: assay.constants,
            mode,
            rate_to_k: assay.constants.rate_to_k(),
            v_max_to_k_cat: assay.constants.v_max_to_k_cat(),
        }
    }

    /// Parameter layout.
    pub fn layout(&self) -> ParameterLayout {
        self.layout
    }

    /// Likelihood mode.
    pub fn mode(&self) -> LikelihoodMode {
        self.mode
    }

    /// Known constants.
    pub fn constants(&self) -> &KnownConstants {
        &self.constants
    }

    /// Concentration per trace.
    pub fn concentrations(&self) -> &[f64] {
        &self.conc
    }

    fn first_rate_trace(&self) -> usize {
        match self.mode {
            LikelihoodMode::DuplicatedBlanks => 0,
            LikelihoodMode::BlanksOnce => self.n_blank,
        }
    }

    fn check_len(&self, params: &[f64]) -> Result<()> {
        if params.len() != self.layout.dim() {
            return Err(Error::Validation(format!(
                "expected {} parameters, got {}",
                self.layout.dim(),
                params.len()
            )));
        }
        Ok(())
    }

    fn in_support(&self, params: &[f64]) -> bool {
        params.iter().all(|x| x.is_finite())
            && self.layout.positive_indices().into_iter().all(|i| params[i] > 0.0)
    }

    /// Check that `params` lies inside the support, naming the first violation.
    pub fn check_support(&self, params: &[f64]) -> Result<()> {
        self.check_len(params)?;
        let names = self.layout.names();
        if let Some(i) = params.iter().position(|x| !x.is_finite()) {
            return Err(Error::ConstraintViolation { parameter: names[i].clone(), value: params[i] });
        }
        if let Some(i) = self.layout.positive_indices().into_iter().find(|&i| params[i] <= 0.0) {
            return Err(Error::ConstraintViolation { parameter: names[i].clone(), value: params[i] });
        }
        Ok(())
    }

    /// Log-posterior (unnormalized) in constrained space.
    pub fn logpdf(&self, params: &[f64]) -> Result<f64> {
        Ok(-self.nll(params)?)
    }

    /// `k_cat`, `v0[*]`, `k[*]` for one parameter vector.
    pub fn derived(&self, params: &[f64]) -> Result<Derived> {
        self.check_len(params)?;
        let l = self.layout;
        let rates = &params[l.rate(0)..l.rate(0) + l.n_traces()];
        let v0 = crate::units::to_velocity_vec(rates, self.constants.scale(), self.constants.epsilon);
        let k = crate::units::to_rate_constant_vec(&v0, self.constants.c_enz);
        let k_cat = self.constants.rate_constant(params[ParameterLayout::V_MAX]);
        Ok(Derived { k_cat, v0, k })
    }

    /// Least-squares starting point.
    ///
    /// Slopes and intercepts come from an ordinary line fit per trace; the blank
    /// slopes give the background, and the implied rate constants seed the kinetic
    /// parameters.
    fn least_squares_init(&self) -> Vec<f64> {
        let l = self.layout;
        let m = l.n_traces();
        let mut p = vec![0.0; l.dim()];

        let t = &self.t;
        let n = t.len() as f64;
        let t_mean = t.iter().sum::<f64>() / n;
        let stt: f64 = t.iter().map(|&tj| (tj - t_mean).powi(2)).sum();

        let fits: Vec<(f64, f64, f64)> = self
            .y
            .iter()
            .map(|y| {
                let y_mean = y.iter().sum::<f64>() / n;
                let sty: f64 = t.iter().zip(y).map(|(&tj, &yj)| (tj - t_mean) * (yj - y_mean)).sum();
                let slope = if stt > 0.0 { sty / stt } else { 0.0 };
                let intercept = y_mean - slope * t_mean;
                let ss: f64 = t
                    .iter()
                    .zip(y)
                    .map(|(&tj, &yj)| (yj - slope * tj - intercept).powi(2))
                    .sum();
                let sd = (ss / (n - 2.0).max(1.0)).sqrt();
                (slope, intercept, sd)
            })
            .collect();

        let background = if self.n_blank > 0 {
            fits[..self.n_blank].iter().map(|f| f.0).sum::<f64>() / self.n_blank as f64
        } else {
            0.0
        };
        p[ParameterLayout::BACKGROUND] = background;

        for (i, &(slope, intercept, sd)) in fits.iter().enumerate() {
            p[l.rate(i)] = if i < self.n_blank { 0.0 } else { slope - background };
            p[l.a0(i)] = intercept;
            p[l.sigma_a(i)] = sd.max(1e-3);
        }

        let k: Vec<f64> = (0..m).map(|i| p[l.rate(i)] * self.rate_to_k).collect();
        let substrate: Vec<usize> = (0..m).filter(|&i| self.conc[i] > 0.0).collect();

        let k_max = substrate.iter().map(|&i| k[i]).fold(f64::NEG_INFINITY, f64::max);
        let k_cat = if k_max.is_finite() && k_max > 0.0 { 1.1 * k_max } else { 1.0 };

        // Concentration whose rate constant sits closest to half saturation.
        let k_m = substrate
            .iter()
            .min_by(|&&a, &&b| {
                let da = (k[a] - 0.5 * k_cat).abs();
                let db = (k[b] - 0.5 * k_cat).abs();
                da.total_cmp(&db)
            })
            .map(|&i| self.conc[i])
            .unwrap_or(1.0);

        let rss: f64 =
            (0..m).map(|i| (k[i] - michaelis_menten(k_cat, k_m, self.conc[i])).powi(2)).sum();
        let sigma_k = (rss / m as f64).sqrt().max(1e-2);

        p[ParameterLayout::V_MAX] = k_cat / self.v_max_to_k_cat;
        p[ParameterLayout::K_M] = k_m;
        p[ParameterLayout::SIGMA_K] = sigma_k;
        p
    }
}

impl LogDensityModel for EnzymeKineticsModel {
    fn dim(&self) -> usize {
        self.layout.dim()
    }

    fn parameter_names(&self) -> Vec<String> {
        self.layout.names()
    }

    fn parameter_bounds(&self) -> Vec<(f64, f64)> {
        self.layout.bounds()
    }

    fn parameter_init(&self) -> Vec<f64> {
        self.least_squares_init()
    }

    fn nll(&self, params: &[f64]) -> Result<f64> {
        self.check_len(params)?;
        if !self.in_support(params) {
            return Ok(f64::INFINITY);
        }
        let l = self.layout;
        let m = l.n_traces();

        let v_max = params[ParameterLayout::V_MAX];
        let k_m = params[ParameterLayout::K_M];
        let sigma_k = params[ParameterLayout::SIGMA_K];
        let background = params[ParameterLayout::BACKGROUND];
        let k_cat = v_max * self.v_max_to_k_cat;

        // Priors
        let mut lp = lognormal_logpdf(k_cat, K_CAT_PRIOR_MEDIAN.ln(), K_CAT_PRIOR_LOG_SD)?;
        lp += lognormal_logpdf(k_m, K_M_PRIOR_MEDIAN.ln(), K_M_PRIOR_LOG_SD)?;
        lp += normal_logpdf(background, 0.0, 1.0)?;
        lp += half_normal_logpdf(sigma_k, 1.0)?;
        for i in 0..m {
            lp += normal_logpdf(params[l.a0(i)], 0.0, 1.0)?;
            lp += half_normal_logpdf(params[l.sigma_a(i)], 1.0)?;
        }

        // Blank traces: background drift only.
        for i in 0..self.n_blank {
            let fit = line_loglik(&self.t, &self.y[i], background, params[l.a0(i)], params[l.sigma_a(i)]);
            lp += fit.lp;
        }

        // Substrate-driven slope.
        for i in self.first_rate_trace()..m {
            let slope = params[l.rate(i)] + background;
            let fit = line_loglik(&self.t, &self.y[i], slope, params[l.a0(i)], params[l.sigma_a(i)]);
            lp += fit.lp;
        }

        // Rate constants against the Michaelis-Menten curve.
        let inv_var_k = 1.0 / (sigma_k * sigma_k);
        let log_norm_k = sigma_k.ln() + LN_SQRT_2PI;
        for i in 0..m {
            let k = params[l.rate(i)] * self.rate_to_k;
            let r = k - michaelis_menten(k_cat, k_m, self.conc[i]);
            lp += -0.5 * r * r * inv_var_k - log_norm_k;
        }

        Ok(-lp)
    }

    fn grad_nll(&self, params: &[f64]) -> Result<Vec<f64>> {
        self.check_len(params)?;
        let l = self.layout;
        if !self.in_support(params) {
            return Ok(vec![f64::NAN; l.dim()]);
        }
        let m = l.n_traces();

        let v_max = params[ParameterLayout::V_MAX];
        let k_m = params[ParameterLayout::K_M];
        let sigma_k = params[ParameterLayout::SIGMA_K];
        let background = params[ParameterLayout::BACKGROUND];
        let k_cat = v_max * self.v_max_to_k_cat;

        // Gradient of the log-density; negated on return.
        let mut g = vec![0.0; l.dim()];
        let mut d_k_cat =
            lognormal_dlogpdf_dx(k_cat, K_CAT_PRIOR_MEDIAN.ln(), K_CAT_PRIOR_LOG_SD);
        g[ParameterLayout::K_M] = lognormal_dlogpdf_dx(k_m, K_M_PRIOR_MEDIAN.ln(), K_M_PRIOR_LOG_SD);
        g[ParameterLayout::BACKGROUND] = -background;
        g[ParameterLayout::SIGMA_K] = half_normal_dlogpdf_dx(sigma_k, 1.0);
        for i in 0..m {
            g[l.a0(i)] = -params[l.a0(i)];
            g[l.sigma_a(i)] = half_normal_dlogpdf_dx(params[l.sigma_a(i)], 1.0);
        }

        for i in 0..self.n_blank {
            let fit = line_loglik(&self.t, &self.y[i], background, params[l.a0(i)], params[l.sigma_a(i)]);
            g[ParameterLayout::BACKGROUND] += fit.d_slope;
            g[l.a0(i)] += fit.d_intercept;
            g[l.sigma_a(i)] += fit.d_sigma;
        }

        for i in self.first_rate_trace()..m {
            let slope = params[l.rate(i)] + background;
            let fit = line_loglik(&self.t, &self.y[i], slope, params[l.a0(i)], params[l.sigma_a(i)]);
            g[l.rate(i)] += fit.d_slope;
            g[ParameterLayout::BACKGROUND] += fit.d_slope;
            g[l.a0(i)] += fit.d_intercept;
            g[l.sigma_a(i)] += fit.d_sigma;
        }

        let inv_var_k = 1.0 / (sigma_k * sigma_k);
        for i in 0..m {
            let c = self.conc[i];
            let k = params[l.rate(i)] * self.rate_to_k;
            let r = k - michaelis_menten(k_cat, k_m, c);
            let (dmu_dkcat, dmu_dkm) = michaelis_menten_grad(k_cat, k_m, c);
            let d_mu = r * inv_var_k;
            g[l.rate(i)] -= d_mu * self.rate_to_k;
            d_k_cat += d_mu * dmu_dkcat;
            g[ParameterLayout::K_M] += d_mu * dmu_dkm;
            g[ParameterLayout::SIGMA_K] += r * r * inv_var_k / sigma_k - 1.0 / sigma_k;
        }
        g[ParameterLayout::V_MAX] = d_k_cat * self.v_max_to_k_cat;

        for gi in g.iter_mut() {
            *gi = -*gi;
        }
        Ok(g)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::AssayData;
    use approx::assert_relative_eq;

    fn assay() -> Assay {
        let t: Vec<f64> = (0..6).map(|j| j as f64 * 0.5).collect();
        let conc = vec![0.0, 2.0, 10.0, 80.0];
        let slopes = [0.0004, 0.0009, 0.0020, 0.0036];
        let a = slopes
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                t.iter()
                    .enumerate()
                    .map(|(j, &tj)| s * tj + 0.001 * i as f64 + 1e-4 * ((i + j) % 3) as f64)
                    .collect()
            })
            .collect();
        AssayData {
            n: t.len(),
            m: 4,
            m0: 1,
            t,
            a,
            conc,
            epsilon: 1.89,
            c_enz: 50.0,
            scaling_factor: 100,
            max_conc: 20,
            conc_ppc: None,
        }
        .validate()
        .unwrap()
    }

    fn point(model: &EnzymeKineticsModel) -> Vec<f64> {
        let l = model.layout();
        let mut p = vec![0.0; l.dim()];
        p[ParameterLayout::V_MAX] = 0.06;
        p[ParameterLayout::K_M] = 12.0;
        p[ParameterLayout::SIGMA_K] = 0.3;
        p[ParameterLayout::BACKGROUND] = 0.03;
        for i in 0..l.n_traces() {
            p[l.rate(i)] = 0.1 + 0.05 * i as f64;
            p[l.a0(i)] = 0.05 * i as f64 - 0.02;
            p[l.sigma_a(i)] = 0.2 + 0.1 * i as f64;
        }
        p
    }

    #[test]
    fn test_layout_names_and_bounds() {
        let l = ParameterLayout::new(2);
        assert_eq!(l.dim(), 10);
        let names = l.names();
        assert_eq!(names[0], "V_max");
        assert_eq!(names[l.rate(1)], "rate[2]");
        assert_eq!(names[l.a0(0)], "a0[1]");
        assert_eq!(names[l.sigma_a(1)], "sigma_a[2]");
        let b = l.bounds();
        assert_eq!(b[l.sigma_a(0)].0, 0.0);
        assert_eq!(b[l.rate(0)].0, f64::NEG_INFINITY);
        assert_eq!(b[ParameterLayout::BACKGROUND].0, f64::NEG_INFINITY);
    }

    #[test]
    fn test_grad_vs_finite_diff_both_modes() {
        for mode in [LikelihoodMode::DuplicatedBlanks, LikelihoodMode::BlanksOnce] {
            let model = EnzymeKineticsModel::new(&assay(), mode);
            let p = point(&model);
            let g = model.grad_nll(&p).unwrap();
            for i in 0..p.len() {
                let h = 1e-6 * p[i].abs().max(1e-2);
                let mut pp = p.clone();
                pp[i] += h;
                let mut pm = p.clone();
                pm[i] -= h;
                let fd = (model.nll(&pp).unwrap() - model.nll(&pm).unwrap()) / (2.0 * h);
                let scale = g[i].abs().max(1.0);
                assert!(
                    (g[i] - fd).abs() / scale < 1e-4,
                    "{:?} grad[{}] ({}): analytical={}, fd={}",
                    mode,
                    i,
                    model.parameter_names()[i],
                    g[i],
                    fd
                );
            }
        }
    }

    #[test]
    fn test_duplicated_mode_counts_blank_twice() {
        let a = assay();
        let dup = EnzymeKineticsModel::new(&a, LikelihoodMode::DuplicatedBlanks);
        let once = EnzymeKineticsModel::new(&a, LikelihoodMode::BlanksOnce);
        let p = point(&dup);
        let l = dup.layout();
        let diff = dup.nll(&p).unwrap() - once.nll(&p).unwrap();
        let extra = line_loglik(
            &dup.t,
            &dup.y[0],
            p[l.rate(0)] + p[ParameterLayout::BACKGROUND],
            p[l.a0(0)],
            p[l.sigma_a(0)],
        );
        assert_relative_eq!(diff, -extra.lp, max_relative = 1e-10);
    }

    #[test]
    fn test_outside_support_is_infinite() {
        let model = EnzymeKineticsModel::new(&assay(), LikelihoodMode::default());
        let mut p = point(&model);
        p[ParameterLayout::K_M] = -1.0;
        assert_eq!(model.nll(&p).unwrap(), f64::INFINITY);
        assert!(model.grad_nll(&p).unwrap().iter().all(|g| g.is_nan()));
        match model.check_support(&p) {
            Err(Error::ConstraintViolation { parameter, .. }) => assert_eq!(parameter, "K_M"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_wrong_length_is_error() {
        let model = EnzymeKineticsModel::new(&assay(), LikelihoodMode::default());
        assert!(model.nll(&[1.0, 2.0]).is_err());
        assert!(model.grad_nll(&[1.0]).is_err());
    }

    #[test]
    fn test_init_is_in_support_and_finite() {
        let model = EnzymeKineticsModel::new(&assay(), LikelihoodMode::default());
        let init = model.parameter_init();
        model.check_support(&init).unwrap();
        assert!(model.nll(&init).unwrap().is_finite());
        // Blank slope ~ background after scaling: 0.0004 * 100.
        assert_relative_eq!(init[ParameterLayout::BACKGROUND], 0.04, epsilon = 1e-2);
    }

    #[test]
    fn test_derived_quantities() {
        let model = EnzymeKineticsModel::new(&assay(), LikelihoodMode::default());
        let p = point(&model);
        let d = model.derived(&p).unwrap();
        let l = model.layout();
        assert_relative_eq!(d.k_cat, 0.06 / 0.05, max_relative = 1e-12);
        for i in 0..l.n_traces() {
            let v0 = crate::units::to_velocity(p[l.rate(i)], 100.0, 1.89);
            assert_eq!(d.v0[i], v0);
            assert_eq!(d.k[i], crate::units::to_rate_constant(v0, 50.0));
        }
    }
}
