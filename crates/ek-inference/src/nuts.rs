//! No-U-Turn Sampler (NUTS).
//!
//! Multinomial NUTS with tree doubling: states inside a subtree are weighted by
//! `exp(-(H - H0))`, subtrees are merged with the progressive (uniform) rule,
//! and the top-level trajectory uses biased progressive sampling towards the
//! newest subtree. A leaf whose energy error exceeds [`DIVERGENCE_THRESHOLD`]
//! or whose density is non-finite ends the trajectory and flags the transition
//! as divergent.

use crate::adapt::{WindowedAdaptation, find_reasonable_step_size};
use crate::chain::Chain;
use crate::hmc::{Leapfrog, Metric, PhasePoint};
use crate::posterior::Posterior;
use ek_core::traits::LogDensityModel;
use ek_core::{Error, Result};
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Metric family estimated during warm-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Diagonal inverse mass matrix.
    #[default]
    Diag,
    /// Dense inverse mass matrix (falls back to diagonal above `dense_max_dim`).
    Dense,
}

/// NUTS sampler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NutsConfig {
    /// Maximum tree depth (default 10).
    pub max_treedepth: usize,
    /// Target acceptance statistic (default 0.8).
    pub target_accept: f64,
    /// Stddev of Gaussian jitter added to the initial unconstrained position.
    pub init_jitter: f64,
    /// Metric family.
    pub metric: MetricKind,
    /// Largest dimension for which a dense metric is estimated.
    pub dense_max_dim: usize,
}

impl Default for NutsConfig {
    fn default() -> Self {
        Self {
            max_treedepth: 10,
            target_accept: 0.8,
            init_jitter: 0.0,
            metric: MetricKind::Diag,
            dense_max_dim: 32,
        }
    }
}

impl NutsConfig {
    /// Reject out-of-range settings.
    pub fn validate(&self) -> Result<()> {
        if self.max_treedepth == 0 {
            return Err(Error::Validation("max_treedepth must be >= 1".to_string()));
        }
        if !(self.target_accept > 0.0 && self.target_accept < 1.0) {
            return Err(Error::Validation(format!(
                "target_accept must be in (0, 1), got {}",
                self.target_accept
            )));
        }
        if !(self.init_jitter.is_finite() && self.init_jitter >= 0.0) {
            return Err(Error::Validation(format!(
                "init_jitter must be finite and >= 0, got {}",
                self.init_jitter
            )));
        }
        Ok(())
    }
}

/// Result of one NUTS transition.
#[derive(Debug, Clone)]
pub(crate) struct NutsTransition {
    /// Selected state; its momentum is discarded by the next transition.
    pub proposal: PhasePoint,
    pub depth: usize,
    pub divergent: bool,
    pub accept_prob: f64,
    pub energy: f64,
    pub n_leapfrog: usize,
}

/// Trajectory segment built by repeated doubling.
struct NutsTree {
    left: PhasePoint,
    right: PhasePoint,
    proposal: PhasePoint,
    log_sum_weight: f64,
    n_leapfrog: usize,
    divergent: bool,
    turning: bool,
    sum_accept_prob: f64,
}

impl NutsTree {
    fn edge(&self, direction: i32) -> &PhasePoint {
        if direction > 0 { &self.right } else { &self.left }
    }

    fn set_edge(&mut self, direction: i32, state: PhasePoint) {
        if direction > 0 {
            self.right = state;
        } else {
            self.left = state;
        }
    }

    fn take_proposal(&mut self, other: &mut NutsTree) {
        std::mem::swap(&mut self.proposal, &mut other.proposal);
    }

    /// Absorb `other` (already built in `direction`) without its proposal.
    fn absorb(&mut self, other: NutsTree, direction: i32, log_sum_weight: f64) {
        self.log_sum_weight = log_sum_weight;
        self.n_leapfrog += other.n_leapfrog;
        self.sum_accept_prob += other.sum_accept_prob;
        self.divergent |= other.divergent;
        self.turning |= other.turning;
        let edge = if direction > 0 { other.right } else { other.left };
        self.set_edge(direction, edge);
    }
}

/// Maximum energy error before declaring divergence.
pub const DIVERGENCE_THRESHOLD: f64 = 1000.0;

/// No-U-turn criterion across the span `left..right` under `metric`.
fn is_turning(left: &PhasePoint, right: &PhasePoint, metric: &Metric) -> bool {
    let dq: Vec<f64> = right.position.iter().zip(&left.position).map(|(&r, &l)| r - l).collect();
    let v_left = metric.velocity(&left.momentum);
    let v_right = metric.velocity(&right.momentum);
    let dot_left: f64 = dq.iter().zip(&v_left).map(|(&d, &v)| d * v).sum();
    let dot_right: f64 = dq.iter().zip(&v_right).map(|(&d, &v)| d * v).sum();
    dot_left < 0.0 || dot_right < 0.0
}

fn log_sum_exp(a: f64, b: f64) -> f64 {
    let max = a.max(b);
    if max == f64::NEG_INFINITY {
        f64::NEG_INFINITY
    } else {
        max + ((a - max).exp() + (b - max).exp()).ln()
    }
}

/// Single leapfrog step from `state`.
fn build_leaf<M: LogDensityModel + ?Sized>(
    integrator: &Leapfrog<'_, '_, M>,
    state: &PhasePoint,
    direction: i32,
    h0: f64,
) -> Result<NutsTree> {
    let next = integrator.step(state, direction)?;

    let energy_error = next.energy(integrator.metric()) - h0;
    let finite = energy_error.is_finite() && next.is_finite();
    let divergent = !finite || energy_error > DIVERGENCE_THRESHOLD;
    let (log_weight, accept_prob) =
        if finite { (-energy_error, (-energy_error).exp().min(1.0)) } else { (f64::NEG_INFINITY, 0.0) };

    Ok(NutsTree {
        left: next.clone(),
        right: next.clone(),
        proposal: next,
        log_sum_weight: log_weight,
        n_leapfrog: 1,
        divergent,
        turning: false,
        sum_accept_prob: accept_prob,
    })
}

/// Recursively build a balanced subtree of `2^depth` leapfrog steps.
fn build_tree<M: LogDensityModel + ?Sized>(
    integrator: &Leapfrog<'_, '_, M>,
    state: &PhasePoint,
    depth: usize,
    direction: i32,
    h0: f64,
    rng: &mut impl Rng,
) -> Result<NutsTree> {
    if depth == 0 {
        return build_leaf(integrator, state, direction, h0);
    }

    let mut inner = build_tree(integrator, state, depth - 1, direction, h0, rng)?;
    if inner.divergent || inner.turning {
        return Ok(inner);
    }

    let edge = inner.edge(direction).clone();
    let mut outer = build_tree(integrator, &edge, depth - 1, direction, h0, rng)?;

    let log_sum_weight = log_sum_exp(inner.log_sum_weight, outer.log_sum_weight);
    if !(outer.divergent || outer.turning) {
        let accept_outer = (outer.log_sum_weight - log_sum_weight).exp();
        if rng.random::<f64>() < accept_outer {
            inner.take_proposal(&mut outer);
        }
    }
    inner.absorb(outer, direction, log_sum_weight);

    if !inner.divergent && !inner.turning {
        inner.turning = is_turning(&inner.left, &inner.right, integrator.metric());
    }
    Ok(inner)
}

/// Run one NUTS transition from `current`.
pub(crate) fn nuts_transition<M: LogDensityModel + ?Sized>(
    integrator: &Leapfrog<'_, '_, M>,
    current: &PhasePoint,
    max_treedepth: usize,
    rng: &mut impl Rng,
) -> Result<NutsTransition> {
    let metric = integrator.metric();

    let mut state = current.clone();
    state.momentum = metric.draw_momentum(rng);
    let h0 = state.energy(metric);

    let mut tree = NutsTree {
        left: state.clone(),
        right: state.clone(),
        proposal: state.clone(),
        log_sum_weight: 0.0,
        n_leapfrog: 0,
        divergent: false,
        turning: false,
        sum_accept_prob: 0.0,
    };

    let mut depth = 0usize;
    while depth < max_treedepth {
        let direction: i32 = if rng.random::<bool>() { 1 } else { -1 };
        let edge = tree.edge(direction).clone();
        let mut subtree = build_tree(integrator, &edge, depth, direction, h0, rng)?;
        depth += 1;

        let log_sum_weight = log_sum_exp(tree.log_sum_weight, subtree.log_sum_weight);
        if !(subtree.divergent || subtree.turning) {
            // Biased progressive sampling towards the new subtree.
            let accept_subtree = (subtree.log_sum_weight - tree.log_sum_weight).exp().min(1.0);
            if rng.random::<f64>() < accept_subtree {
                tree.take_proposal(&mut subtree);
            }
        }
        tree.absorb(subtree, direction, log_sum_weight);

        if tree.divergent || tree.turning {
            break;
        }
        if is_turning(&tree.left, &tree.right, metric) {
            tree.turning = true;
            break;
        }
    }

    let accept_prob = tree.sum_accept_prob / tree.n_leapfrog.max(1) as f64;

    Ok(NutsTransition {
        proposal: tree.proposal,
        depth,
        divergent: tree.divergent,
        accept_prob,
        energy: h0,
        n_leapfrog: tree.n_leapfrog,
    })
}

/// Run one NUTS chain on any [`LogDensityModel`].
///
/// Starts from `init` (constrained space) or `model.parameter_init()`, adds the
/// configured jitter, adapts step size and metric over `n_warmup` iterations and
/// records `n_samples` post-warm-up draws. A starting point outside the support
/// fails with [`Error::ConstraintViolation`]; a non-finite density or gradient
/// there fails with [`Error::NonFiniteDensity`].
pub fn sample_nuts<M: LogDensityModel + ?Sized>(
    model: &M,
    chain_id: usize,
    n_warmup: usize,
    n_samples: usize,
    seed: u64,
    config: &NutsConfig,
    init: Option<&[f64]>,
) -> Result<Chain> {
    config.validate()?;

    let posterior = Posterior::new(model)?;
    let dim = posterior.dim();
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);

    let theta_init = match init {
        Some(theta) => theta.to_vec(),
        None => model.parameter_init(),
    };
    let mut z_init = posterior.to_unconstrained(&theta_init)?;
    if config.init_jitter > 0.0 {
        let normal = Normal::new(0.0, config.init_jitter)
            .map_err(|e| Error::Validation(format!("init_jitter: {}", e)))?;
        for z in z_init.iter_mut() {
            *z += normal.sample(&mut rng);
        }
    }

    let mut integrator = Leapfrog::new(&posterior, 1.0, Metric::unit(dim));
    let mut state = integrator.point_at(z_init)?;
    if !state.is_finite() {
        return Err(Error::NonFiniteDensity { chain: chain_id, value: state.log_density });
    }

    let init_eps = find_reasonable_step_size(&posterior, &state.position, integrator.metric());
    let mut adaptation = WindowedAdaptation::new(
        dim,
        n_warmup,
        config.target_accept,
        init_eps,
        config.metric,
        config.dense_max_dim,
    );
    log::debug!("chain {}: start, dim={}, initial step size {:.4e}", chain_id, dim, init_eps);

    integrator.set_step_size(init_eps);
    let mut warmup_divergences = 0usize;
    for i in 0..n_warmup {
        integrator.set_step_size(adaptation.step_size());
        let transition = nuts_transition(&integrator, &state, config.max_treedepth, &mut rng)?;
        warmup_divergences += transition.divergent as usize;

        state = transition.proposal;

        if adaptation.update(i, &state.position, transition.accept_prob) {
            integrator.set_metric(adaptation.metric().clone());
        }
    }

    let step_size = if n_warmup > 0 { adaptation.adapted_step_size() } else { init_eps };
    integrator.set_step_size(step_size);
    integrator.set_metric(adaptation.metric().clone());
    log::debug!(
        "chain {}: warm-up done, step size {:.4e}, {} warm-up divergences",
        chain_id,
        step_size,
        warmup_divergences
    );

    let mut draws_unconstrained = Vec::with_capacity(n_samples);
    let mut draws_constrained = Vec::with_capacity(n_samples);
    let mut divergences = Vec::with_capacity(n_samples);
    let mut tree_depths = Vec::with_capacity(n_samples);
    let mut accept_probs = Vec::with_capacity(n_samples);
    let mut energies = Vec::with_capacity(n_samples);
    let mut n_leapfrog = Vec::with_capacity(n_samples);

    for _ in 0..n_samples {
        let transition = nuts_transition(&integrator, &state, config.max_treedepth, &mut rng)?;

        state = transition.proposal;

        draws_constrained.push(posterior.to_constrained(&state.position));
        draws_unconstrained.push(state.position.clone());
        divergences.push(transition.divergent);
        tree_depths.push(transition.depth);
        accept_probs.push(transition.accept_prob);
        energies.push(transition.energy);
        n_leapfrog.push(transition.n_leapfrog);
    }

    let n_div = divergences.iter().filter(|&&d| d).count();
    if n_div > 0 {
        log::warn!("chain {}: {} divergent transitions after warm-up", chain_id, n_div);
    }
    log::debug!("chain {}: finished {} draws", chain_id, n_samples);

    Ok(Chain {
        chain_id,
        draws_unconstrained,
        draws_constrained,
        divergences,
        tree_depths,
        accept_probs,
        energies,
        n_leapfrog,
        max_treedepth: config.max_treedepth,
        step_size,
        inv_mass_diag: integrator.metric().variances(),
    })
}
