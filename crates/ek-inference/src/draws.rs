//! Per-iteration posterior draws keyed by `(chain, iteration)`.

use ek_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::chain::SamplerResult;
use crate::model::{EnzymeKineticsModel, ParameterLayout};
use crate::ppc::{KineticDraw, posterior_predictive};

/// One retained posterior draw with its derived and predictive quantities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosteriorDraw {
    /// Chain index.
    pub chain: usize,
    /// Post-warm-up iteration within the chain (0-based).
    pub iteration: usize,
    /// Maximum velocity (µM/s).
    pub v_max: f64,
    /// Affinity constant (µM).
    pub k_m: f64,
    /// Spread of rate constants around the curve.
    pub sigma_k: f64,
    /// Shared absorbance drift (scaled units per second).
    pub background: f64,
    /// Per-trace absorbance noise.
    pub sigma_a: Vec<f64>,
    /// Per-trace background-subtracted slope.
    pub rate: Vec<f64>,
    /// Per-trace intercept.
    pub a0: Vec<f64>,
    /// Turnover number (1/s).
    pub k_cat: f64,
    /// Per-trace rate constant (1/s).
    pub k: Vec<f64>,
    /// Per-trace velocity (µM/s).
    pub v0: Vec<f64>,
    /// Predictive rate constants over the grid; empty until attached.
    #[serde(default)]
    pub k_ppc: Vec<f64>,
}

impl PosteriorDraw {
    /// The parameters the predictive map needs.
    pub fn kinetic(&self) -> KineticDraw {
        KineticDraw { k_cat: self.k_cat, k_m: self.k_m, sigma_k: self.sigma_k }
    }

    /// Flat column names: per-trace columns 1-based, `k_ppc` 0-based.
    pub fn column_names(n_traces: usize, n_ppc: usize) -> Vec<String> {
        let per_trace = |prefix: &str| -> Vec<String> {
            (1..=n_traces).map(|i| format!("{}[{}]", prefix, i)).collect()
        };
        let mut names: Vec<String> =
            ["chain", "iteration", "V_max", "K_M", "sigma_k", "background"].map(String::from).to_vec();
        names.extend(per_trace("sigma_a"));
        names.extend(per_trace("rate"));
        names.extend(per_trace("a0"));
        names.push("k_cat".to_string());
        names.extend(per_trace("k"));
        names.extend(per_trace("v0"));
        names.extend((0..n_ppc).map(|j| format!("k_ppc[{}]", j)));
        names
    }

    /// Values in [`Self::column_names`] order.
    pub fn to_row(&self) -> Vec<f64> {
        let mut row = vec![
            self.chain as f64,
            self.iteration as f64,
            self.v_max,
            self.k_m,
            self.sigma_k,
            self.background,
        ];
        row.extend_from_slice(&self.sigma_a);
        row.extend_from_slice(&self.rate);
        row.extend_from_slice(&self.a0);
        row.push(self.k_cat);
        row.extend_from_slice(&self.k);
        row.extend_from_slice(&self.v0);
        row.extend_from_slice(&self.k_ppc);
        row
    }
}

/// Draw table for a sampler run, ordered by chain then iteration.
pub fn collect_draws(model: &EnzymeKineticsModel, result: &SamplerResult) -> Result<Vec<PosteriorDraw>> {
    let l = model.layout();
    let m = l.n_traces();
    let mut out = Vec::with_capacity(result.total_draws());
    for chain in &result.chains {
        for (iteration, theta) in chain.draws_constrained.iter().enumerate() {
            let d = model.derived(theta)?;
            out.push(PosteriorDraw {
                chain: chain.chain_id,
                iteration,
                v_max: theta[ParameterLayout::V_MAX],
                k_m: theta[ParameterLayout::K_M],
                sigma_k: theta[ParameterLayout::SIGMA_K],
                background: theta[ParameterLayout::BACKGROUND],
                sigma_a: theta[l.sigma_a(0)..l.sigma_a(0) + m].to_vec(),
                rate: theta[l.rate(0)..l.rate(0) + m].to_vec(),
                a0: theta[l.a0(0)..l.a0(0) + m].to_vec(),
                k_cat: d.k_cat,
                k: d.k,
                v0: d.v0,
                k_ppc: Vec::new(),
            });
        }
    }
    Ok(out)
}

/// Fill `k_ppc` of every draw; draw `i` uses seed `seed + i`.
pub fn attach_ppc(draws: &mut [PosteriorDraw], conc: &[f64], seed: u64) -> Result<()> {
    let kinetic: Vec<KineticDraw> = draws.iter().map(|d| d.kinetic()).collect();
    let predictive = posterior_predictive(&kinetic, conc, seed)?;
    for (d, k_ppc) in draws.iter_mut().zip(predictive) {
        d.k_ppc = k_ppc;
    }
    Ok(())
}

/// Columns of the flat table, named per [`PosteriorDraw::column_names`].
pub fn columns(draws: &[PosteriorDraw]) -> Result<(Vec<String>, Vec<Vec<f64>>)> {
    let first = draws
        .first()
        .ok_or_else(|| Error::Validation("no posterior draws to tabulate".to_string()))?;
    let names = PosteriorDraw::column_names(first.rate.len(), first.k_ppc.len());
    let mut cols = vec![Vec::with_capacity(draws.len()); names.len()];
    for d in draws {
        let row = d.to_row();
        if row.len() != names.len() {
            return Err(Error::InvalidDataShape(format!(
                "draw (chain {}, iteration {}) has {} columns, expected {}",
                d.chain,
                d.iteration,
                row.len(),
                names.len()
            )));
        }
        for (c, v) in cols.iter_mut().zip(row) {
            c.push(v);
        }
    }
    Ok((names, cols))
}
