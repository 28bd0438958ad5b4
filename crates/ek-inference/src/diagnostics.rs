//! MCMC diagnostics: split R-hat, rank-normalized folded R-hat, bulk and tail
//! ESS, E-BFMI, and a gated quality summary.
//!
//! Cross-chain disagreement is reported here as a [`QualityStatus`], never as an
//! error: the draws stay available to the caller either way.

use std::fmt;

use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};

use crate::chain::SamplerResult;
use crate::summary::quantile_sorted;

/// Diagnostics for a multi-chain NUTS run.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsResult {
    /// Parameter names, aligned with the per-parameter vectors.
    pub param_names: Vec<String>,
    /// Rank-normalized folded split R-hat per parameter.
    pub r_hat: Vec<f64>,
    /// Bulk ESS per parameter.
    pub ess_bulk: Vec<f64>,
    /// Tail ESS per parameter.
    pub ess_tail: Vec<f64>,
    /// Number of divergent post-warm-up transitions.
    pub n_divergent: usize,
    /// Fraction of divergent transitions.
    pub divergence_rate: f64,
    /// Fraction of transitions hitting max treedepth.
    pub max_treedepth_rate: f64,
    /// E-BFMI per chain.
    pub ebfmi: Vec<f64>,
}

/// High-level sampling quality status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityStatus {
    /// All gates passed.
    Ok,
    /// Some gates emitted warnings.
    Warn,
    /// One or more gates failed.
    Fail,
}

impl fmt::Display for QualityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityStatus::Ok => write!(f, "ok"),
            QualityStatus::Warn => write!(f, "warn"),
            QualityStatus::Fail => write!(f, "fail"),
        }
    }
}

/// Thresholds for sampling quality gates.
#[derive(Debug, Clone)]
pub struct QualityGates {
    /// Require at least this many chains before enabling R-hat/ESS gates.
    pub min_chains: usize,
    /// Require at least this many draws per chain before enabling R-hat/ESS/E-BFMI gates.
    pub min_draws_per_chain: usize,
    /// Warn if divergence rate exceeds this threshold.
    pub max_divergence_rate_warn: f64,
    /// Fail if divergence rate exceeds this threshold.
    pub max_divergence_rate_fail: f64,
    /// Warn if max-treedepth rate exceeds this threshold.
    pub max_treedepth_rate_warn: f64,
    /// Fail if max-treedepth rate exceeds this threshold.
    pub max_treedepth_rate_fail: f64,
    /// Warn if max R-hat exceeds this threshold.
    pub max_rhat_warn: f64,
    /// Fail if max R-hat exceeds this threshold.
    pub max_rhat_fail: f64,
    /// Warn if bulk/tail ESS falls below this fraction of total draws.
    pub min_ess_frac_warn: f64,
    /// Fail if bulk/tail ESS falls below this fraction of total draws.
    pub min_ess_frac_fail: f64,
    /// Warn if any chain's E-BFMI is below this.
    pub min_ebfmi_warn: f64,
    /// Fail if any chain's E-BFMI is below this.
    pub min_ebfmi_fail: f64,
}

impl Default for QualityGates {
    fn default() -> Self {
        Self {
            min_chains: 2,
            min_draws_per_chain: 50,
            max_divergence_rate_warn: 0.01,
            max_divergence_rate_fail: 0.10,
            max_treedepth_rate_warn: 0.05,
            max_treedepth_rate_fail: 0.20,
            max_rhat_warn: 1.01,
            max_rhat_fail: 1.10,
            min_ess_frac_warn: 0.05,
            min_ess_frac_fail: 0.01,
            min_ebfmi_warn: 0.30,
            min_ebfmi_fail: 0.20,
        }
    }
}

/// Summary of sampling run quality.
#[derive(Debug, Clone, Serialize)]
pub struct QualitySummary {
    /// Aggregated status for the run.
    pub status: QualityStatus,
    /// Non-fatal findings, e.g. `r_hat_high`.
    pub warnings: Vec<String>,
    /// Hard findings.
    pub failures: Vec<String>,
    /// Whether R-hat/ESS/E-BFMI gates were enabled for this run.
    pub enabled: bool,
    /// Total post-warm-up draws used for diagnostics.
    pub total_draws: usize,
    /// Max R-hat across parameters.
    pub max_r_hat: f64,
    /// Min bulk ESS across parameters.
    pub min_ess_bulk: f64,
    /// Min tail ESS across parameters.
    pub min_ess_tail: f64,
    /// Min E-BFMI across chains.
    pub min_ebfmi: f64,
}

fn finite_max(v: &[f64]) -> f64 {
    v.iter().copied().filter(|x| x.is_finite()).fold(f64::NEG_INFINITY, f64::max)
}

fn finite_min(v: &[f64]) -> f64 {
    v.iter().copied().filter(|x| x.is_finite()).fold(f64::INFINITY, f64::min)
}

/// Grade a run against `gates`.
pub fn quality_summary(
    diag: &DiagnosticsResult,
    n_chains: usize,
    n_samples: usize,
    gates: &QualityGates,
) -> QualitySummary {
    let total_draws = n_chains.saturating_mul(n_samples);
    let enabled = n_chains >= gates.min_chains && n_samples >= gates.min_draws_per_chain;

    let max_r_hat = finite_max(&diag.r_hat);
    let min_ess_bulk = finite_min(&diag.ess_bulk);
    let min_ess_tail = finite_min(&diag.ess_tail);
    let min_ebfmi = finite_min(&diag.ebfmi);

    let mut warnings = Vec::new();
    let mut failures = Vec::new();
    let mut grade = |name: &str, fail: bool, warn: bool| {
        if fail {
            failures.push(name.to_string());
        } else if warn {
            warnings.push(name.to_string());
        }
    };

    grade(
        "divergence_rate_high",
        diag.divergence_rate > gates.max_divergence_rate_fail,
        diag.divergence_rate > gates.max_divergence_rate_warn,
    );
    grade(
        "max_treedepth_rate_high",
        diag.max_treedepth_rate > gates.max_treedepth_rate_fail,
        diag.max_treedepth_rate > gates.max_treedepth_rate_warn,
    );

    if !enabled {
        grade("gates_disabled_short_run", false, true);
    } else {
        grade("r_hat_missing", max_r_hat == f64::NEG_INFINITY, false);
        grade("r_hat_high", max_r_hat > gates.max_rhat_fail, max_r_hat > gates.max_rhat_warn);

        let warn_thr = gates.min_ess_frac_warn * total_draws as f64;
        let fail_thr = gates.min_ess_frac_fail * total_draws as f64;
        grade("ess_bulk_low", min_ess_bulk < fail_thr, min_ess_bulk < warn_thr);
        grade("ess_tail_low", min_ess_tail < fail_thr, min_ess_tail < warn_thr);

        if min_ebfmi.is_finite() {
            grade("ebfmi_low", min_ebfmi < gates.min_ebfmi_fail, min_ebfmi < gates.min_ebfmi_warn);
        } else {
            grade("ebfmi_not_finite", false, true);
        }
    }

    let status = if !failures.is_empty() {
        QualityStatus::Fail
    } else if !warnings.is_empty() {
        QualityStatus::Warn
    } else {
        QualityStatus::Ok
    };

    QualitySummary {
        status,
        warnings,
        failures,
        enabled,
        total_draws,
        max_r_hat,
        min_ess_bulk,
        min_ess_tail,
        min_ebfmi,
    }
}

/// Split R-hat for one parameter across multiple chains.
///
/// Each chain is split in half, giving 2*M half-chains.
/// R-hat = sqrt(var_hat+ / W) where var_hat+ = (N-1)/N * W + B/N.
pub fn r_hat(chains: &[&[f64]]) -> f64 {
    let split = match split_chains(chains, 2) {
        Some(v) => v,
        None => return f64::NAN,
    };
    let (w, var_hat_plus) = variance_components(&split);
    if w < 1e-30 {
        return f64::NAN;
    }
    (var_hat_plus / w).sqrt()
}

/// Halve each chain and truncate to a common length of at least `min_len`.
fn split_chains<'a>(chains: &[&'a [f64]], min_len: usize) -> Option<Vec<&'a [f64]>> {
    if chains.is_empty() {
        return None;
    }
    let mut halves: Vec<&[f64]> = Vec::with_capacity(chains.len() * 2);
    for c in chains {
        if c.len() < 4 {
            return None;
        }
        let mid = c.len() / 2;
        halves.push(&c[..mid]);
        halves.push(&c[mid..]);
    }
    let len = halves.iter().map(|c| c.len()).min().unwrap_or(0);
    if len < min_len {
        return None;
    }
    Some(halves.into_iter().map(|c| &c[..len]).collect())
}

fn mean_and_var(chain: &[f64]) -> (f64, f64) {
    let n = chain.len() as f64;
    let mean = chain.iter().sum::<f64>() / n;
    let var = chain.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / (n.max(2.0) - 1.0);
    (mean, var)
}

/// `(W, var_hat_plus)` for equal-length chains.
fn variance_components(chains: &[&[f64]]) -> (f64, f64) {
    let m = chains.len() as f64;
    let n = chains[0].len() as f64;
    let (means, vars): (Vec<f64>, Vec<f64>) = chains.iter().map(|c| mean_and_var(c)).unzip();
    let grand_mean = means.iter().sum::<f64>() / m;
    let b = if m > 1.0 {
        means.iter().map(|&mu| (mu - grand_mean).powi(2)).sum::<f64>() * n / (m - 1.0)
    } else {
        0.0
    };
    let w = vars.iter().sum::<f64>() / m;
    (w, (n - 1.0) / n * w + b / n)
}

fn sorted_all(chains: &[Vec<f64>]) -> Vec<f64> {
    let mut all: Vec<f64> = chains.iter().flat_map(|c| c.iter().copied()).collect();
    all.sort_by(f64::total_cmp);
    all
}

fn as_refs(chains: &[Vec<f64>]) -> Vec<&[f64]> {
    chains.iter().map(|c| c.as_slice()).collect()
}

/// Replace draws by normal scores of their pooled (average) ranks.
fn rank_normalize(chains: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let normal = Normal::standard();
    let mut out: Vec<Vec<f64>> = chains.iter().map(|c| vec![0.0; c.len()]).collect();

    let mut flat: Vec<(f64, usize, usize)> = chains
        .iter()
        .enumerate()
        .flat_map(|(ci, c)| c.iter().enumerate().map(move |(ti, &x)| (x, ci, ti)))
        .collect();
    flat.sort_by(|a, b| a.0.total_cmp(&b.0));

    let n = flat.len();
    let mut i = 0usize;
    while i < n {
        let mut j = i + 1;
        while j < n && flat[j].0 == flat[i].0 {
            j += 1;
        }
        // Average 1-based rank of the tie group, offset by 0.5 to stay inside (0, 1).
        let rank = 0.5 * ((i + 1) as f64 + j as f64);
        let p = ((rank - 0.5) / n as f64).clamp(1e-12, 1.0 - 1e-12);
        let z = normal.inverse_cdf(p);
        for &(_, ci, ti) in &flat[i..j] {
            out[ci][ti] = z;
        }
        i = j;
    }
    out
}

/// max(rank-normalized split R-hat, folded rank-normalized split R-hat).
pub fn r_hat_rank_normalized_folded(chains: &[Vec<f64>]) -> f64 {
    if chains.is_empty() || chains.iter().any(|c| c.len() < 4) {
        return f64::NAN;
    }
    let r_rank = r_hat(&as_refs(&rank_normalize(chains)));

    let all = sorted_all(chains);
    let med = quantile_sorted(&all, 0.5);
    let folded: Vec<Vec<f64>> =
        chains.iter().map(|c| c.iter().map(|&x| (x - med).abs()).collect()).collect();
    let r_fold = r_hat(&as_refs(&rank_normalize(&folded)));

    r_rank.max(r_fold)
}

/// Effective sample size via the Geyer initial monotone sequence on
/// variogram-based autocorrelations across split chains.
pub fn ess(chains: &[&[f64]]) -> f64 {
    let split = match split_chains(chains, 4) {
        Some(v) => v,
        None => return 0.0,
    };
    let m = split.len();
    let n = split[0].len();
    let total_draws = (m * n) as f64;

    let (_, var_hat_plus) = variance_components(&split);
    if !var_hat_plus.is_finite() || var_hat_plus < 1e-30 {
        return total_draws;
    }

    // rho_t = 1 - V_t / (2 * var_hat_plus), V_t the mean squared lag-t difference.
    let mut rho: Vec<f64> = Vec::new();
    for lag in 1..n {
        let mut sum = 0.0;
        for c in &split {
            for i in 0..(n - lag) {
                let d = c[i] - c[i + lag];
                sum += d * d;
            }
        }
        let v = sum / (m * (n - lag)) as f64;
        rho.push((1.0 - v / (2.0 * var_hat_plus)).clamp(-1.0, 1.0));
        let k = rho.len();
        if k % 2 == 0 && rho[k - 2] + rho[k - 1] < 0.0 {
            break;
        }
    }

    let mut tau = 1.0;
    let mut prev = f64::INFINITY;
    for pair in rho.chunks_exact(2) {
        let g = pair[0] + pair[1];
        if g < 0.0 {
            break;
        }
        let g = g.min(prev);
        tau += 2.0 * g;
        prev = g;
    }
    if !tau.is_finite() || tau <= 0.0 {
        return total_draws;
    }
    (total_draws / tau).clamp(1.0, total_draws)
}

/// Bulk ESS: ESS of the rank-normalized draws.
pub fn ess_bulk(chains: &[Vec<f64>]) -> f64 {
    ess(&as_refs(&rank_normalize(chains)))
}

/// Tail ESS: `min(ESS(I[x <= q05]), ESS(I[x >= q95]))`.
pub fn ess_tail(chains: &[Vec<f64>]) -> f64 {
    let all = sorted_all(chains);
    if all.is_empty() {
        return 0.0;
    }
    let q05 = quantile_sorted(&all, 0.05);
    let q95 = quantile_sorted(&all, 0.95);

    let indicator = |pred: &dyn Fn(f64) -> bool| -> Vec<Vec<f64>> {
        chains.iter().map(|c| c.iter().map(|&x| if pred(x) { 1.0 } else { 0.0 }).collect()).collect()
    };
    let lower = indicator(&|x| x <= q05);
    let upper = indicator(&|x| x >= q95);
    ess(&as_refs(&lower)).min(ess(&as_refs(&upper)))
}

/// E-BFMI for one chain: `mean((E_t - E_{t-1})^2) / var(E_t)`.
pub fn ebfmi(energies: &[f64]) -> f64 {
    let n = energies.len();
    if n < 4 {
        return f64::NAN;
    }
    let (_, var) = mean_and_var(energies);
    if var < 1e-30 {
        return f64::NAN;
    }
    let msd = energies.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum::<f64>() / (n as f64 - 1.0);
    msd / var
}

/// Full diagnostics for a [`SamplerResult`].
pub fn compute_diagnostics(result: &SamplerResult) -> DiagnosticsResult {
    let n_params = result.param_names.len();
    let mut r_hat_vals = Vec::with_capacity(n_params);
    let mut ess_bulk_vals = Vec::with_capacity(n_params);
    let mut ess_tail_vals = Vec::with_capacity(n_params);

    for p in 0..n_params {
        let draws = result.param_draws(p);
        r_hat_vals.push(r_hat_rank_normalized_folded(&draws));
        ess_bulk_vals.push(ess_bulk(&draws));
        ess_tail_vals.push(ess_tail(&draws));
    }

    let total_samples: usize = result.chains.iter().map(|c| c.divergences.len()).sum();
    let n_divergent = result.n_divergent();
    let n_max_depth: usize = result
        .chains
        .iter()
        .map(|c| c.tree_depths.iter().filter(|&&d| d >= c.max_treedepth).count())
        .sum();
    let rate = |k: usize| if total_samples > 0 { k as f64 / total_samples as f64 } else { 0.0 };

    DiagnosticsResult {
        param_names: result.param_names.clone(),
        r_hat: r_hat_vals,
        ess_bulk: ess_bulk_vals,
        ess_tail: ess_tail_vals,
        n_divergent,
        divergence_rate: rate(n_divergent),
        max_treedepth_rate: rate(n_max_depth),
        ebfmi: result.chains.iter().map(|c| ebfmi(&c.energies)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Chain;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal as RandNormal};

    fn iid(seed: u64, n: usize) -> Vec<f64> {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let normal = RandNormal::new(0.0, 1.0).unwrap();
        (0..n).map(|_| normal.sample(&mut rng)).collect()
    }

    fn random_walk(seed: u64, n: usize) -> Vec<f64> {
        let steps = iid(seed, n);
        steps
            .iter()
            .scan(0.0, |x, s| {
                *x += 0.01 * s;
                Some(*x)
            })
            .collect()
    }

    fn mk_chain(values: Vec<f64>, depths: Vec<usize>, divergent: Vec<bool>) -> Chain {
        let n = values.len();
        Chain {
            chain_id: 0,
            draws_unconstrained: values.iter().map(|&v| vec![v]).collect(),
            draws_constrained: values.iter().map(|&v| vec![v]).collect(),
            divergences: divergent,
            tree_depths: depths,
            accept_probs: vec![0.8; n],
            energies: values.clone(),
            n_leapfrog: vec![1; n],
            max_treedepth: 3,
            step_size: 0.1,
            inv_mass_diag: vec![1.0],
        }
    }

    #[test]
    fn test_max_treedepth_and_divergence_rates() {
        let chain = mk_chain(
            vec![0.1, 0.2, 0.3, 0.4, 0.5],
            vec![1, 2, 3, 3, 2],
            vec![false, true, false, false, false],
        );
        let r = SamplerResult {
            chains: vec![chain],
            param_names: vec!["x".to_string()],
            n_warmup: 0,
            n_samples: 5,
            failed_chains: Vec::new(),
        };
        let d = compute_diagnostics(&r);
        assert!((d.max_treedepth_rate - 0.4).abs() < 1e-12);
        assert!((d.divergence_rate - 0.2).abs() < 1e-12);
        assert_eq!(d.n_divergent, 1);
    }

    #[test]
    fn test_ebfmi_iid_energy_is_large() {
        let v = ebfmi(&iid(123, 1000));
        assert!(v.is_finite() && v > 1.5, "E-BFMI for IID should be ~2: {}", v);
    }

    #[test]
    fn test_ebfmi_random_walk_is_small() {
        let v = ebfmi(&random_walk(5, 1000));
        assert!(v < 0.1, "E-BFMI for random walk should be small: {}", v);
    }

    #[test]
    fn test_rank_normalized_rhat_well_mixed() {
        let rhat = r_hat_rank_normalized_folded(&[iid(1, 500), iid(2, 500)]);
        assert!(rhat < 1.05, "R-hat for IID chains should be ~1: {}", rhat);
    }

    #[test]
    fn test_rank_normalized_rhat_diverged_chains() {
        let chain1: Vec<f64> = (0..200).map(|i| i as f64 * 0.01).collect();
        let chain2: Vec<f64> = (0..200).map(|i| 10.0 + i as f64 * 0.01).collect();
        let rhat = r_hat_rank_normalized_folded(&[chain1, chain2]);
        assert!(rhat > 1.5, "R-hat for diverged chains should be >> 1: {}", rhat);
    }

    #[test]
    fn test_r_hat_too_short_is_nan() {
        assert!(r_hat(&[&[1.0, 2.0, 3.0]]).is_nan());
    }

    #[test]
    fn test_ess_constant_chain() {
        let chain = vec![1.0; 100];
        assert!(ess(&[&chain]) >= 99.0);
    }

    #[test]
    fn test_ess_bulk_iid_vs_correlated() {
        let iid_ess = ess_bulk(&[iid(42, 1000)]);
        let rw_ess = ess_bulk(&[random_walk(42, 1000)]);
        assert!(iid_ess > 500.0, "ESS of IID chain should be close to N: {}", iid_ess);
        assert!(rw_ess < 100.0, "ESS of random walk should be << N: {}", rw_ess);
    }

    #[test]
    fn test_ess_tail_iid_vs_correlated() {
        assert!(ess_tail(&[iid(7, 1000)]) > 500.0);
        assert!(ess_tail(&[random_walk(11, 1000)]) < 500.0);
    }

    #[test]
    fn test_quality_summary_grades() {
        let good = DiagnosticsResult {
            param_names: vec!["x".into()],
            r_hat: vec![1.001],
            ess_bulk: vec![800.0],
            ess_tail: vec![700.0],
            n_divergent: 0,
            divergence_rate: 0.0,
            max_treedepth_rate: 0.0,
            ebfmi: vec![0.9, 1.1],
        };
        let gates = QualityGates::default();
        let s = quality_summary(&good, 2, 1000, &gates);
        assert_eq!(s.status, QualityStatus::Ok, "{:?}", s);

        let bad = DiagnosticsResult { r_hat: vec![1.3], divergence_rate: 0.02, ..good.clone() };
        let s = quality_summary(&bad, 2, 1000, &gates);
        assert_eq!(s.status, QualityStatus::Fail);
        assert!(s.failures.contains(&"r_hat_high".to_string()));
        assert!(s.warnings.contains(&"divergence_rate_high".to_string()));

        let s = quality_summary(&good, 1, 1000, &gates);
        assert_eq!(s.status, QualityStatus::Warn);
        assert!(!s.enabled);
    }
}
