//! Chain storage and multi-chain runner.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::nuts::{NutsConfig, sample_nuts};
use ek_core::traits::LogDensityModel;
use ek_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Raw MCMC chain from one NUTS run.
#[derive(Debug, Clone)]
pub struct Chain {
    /// Chain index (seed offset).
    pub chain_id: usize,
    /// Draws in unconstrained space.
    pub draws_unconstrained: Vec<Vec<f64>>,
    /// Draws in constrained (model) space.
    pub draws_constrained: Vec<Vec<f64>>,
    /// Divergence flag per draw.
    pub divergences: Vec<bool>,
    /// Tree depth per draw.
    pub tree_depths: Vec<usize>,
    /// Acceptance statistic per draw.
    pub accept_probs: Vec<f64>,
    /// Hamiltonian at the start of each transition (after momentum resampling).
    pub energies: Vec<f64>,
    /// Leapfrog steps per draw.
    pub n_leapfrog: Vec<usize>,
    /// Configured maximum tree depth for this chain.
    pub max_treedepth: usize,
    /// Final adapted step size.
    pub step_size: f64,
    /// Diagonal of the final inverse mass matrix.
    pub inv_mass_diag: Vec<f64>,
}

impl Chain {
    /// Number of post-warm-up draws.
    pub fn len(&self) -> usize {
        self.draws_constrained.len()
    }

    /// Whether the chain holds no draws.
    pub fn is_empty(&self) -> bool {
        self.draws_constrained.is_empty()
    }

    /// Number of divergent post-warm-up transitions.
    pub fn n_divergent(&self) -> usize {
        self.divergences.iter().filter(|&&d| d).count()
    }
}

/// Multi-chain run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Number of independent chains.
    pub n_chains: usize,
    /// Warm-up iterations per chain (discarded).
    pub n_warmup: usize,
    /// Post-warm-up draws per chain.
    pub n_samples: usize,
    /// Base seed; chain `c` uses `seed + c`.
    pub seed: u64,
    /// Per-chain NUTS settings.
    pub nuts: NutsConfig,
    /// Explicit constrained starting point shared by all chains.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init: Option<Vec<f64>>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            n_chains: 4,
            n_warmup: 1000,
            n_samples: 1000,
            seed: 42,
            nuts: NutsConfig::default(),
            init: None,
        }
    }
}

impl SamplerConfig {
    /// Reject out-of-range settings.
    pub fn validate(&self) -> Result<()> {
        if self.n_chains == 0 {
            return Err(Error::Validation("n_chains must be >= 1".to_string()));
        }
        if self.n_samples == 0 {
            return Err(Error::Validation("n_samples must be >= 1".to_string()));
        }
        self.nuts.validate()
    }
}

/// Coarse cancellation shared between a caller and a running sampler.
///
/// Chains check the flag before they start; a chain already running completes.
#[derive(Debug, Clone, Default)]
pub struct SamplerControl {
    stop: Arc<AtomicBool>,
}

impl SamplerControl {
    /// Fresh control with the flag cleared.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask chains that have not started yet to be skipped.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Result of a multi-chain NUTS sampling run.
#[derive(Debug, Clone)]
pub struct SamplerResult {
    /// Completed chains, ordered by `chain_id`.
    pub chains: Vec<Chain>,
    /// Parameter names.
    pub param_names: Vec<String>,
    /// Number of warm-up iterations per chain.
    pub n_warmup: usize,
    /// Number of post-warm-up samples per chain.
    pub n_samples: usize,
    /// Chains that could not start, ordered by `chain_id`.
    pub failed_chains: Vec<ChainFailure>,
}

/// A chain that failed before producing draws.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainFailure {
    /// Chain index.
    pub chain_id: usize,
    /// Rendered error.
    pub error: String,
}

impl SamplerResult {
    /// Total number of post-warm-up draws across all chains.
    pub fn total_draws(&self) -> usize {
        self.chains.iter().map(|c| c.len()).sum()
    }

    /// Draws for a single parameter (index), one vector per chain.
    pub fn param_draws(&self, param_idx: usize) -> Vec<Vec<f64>> {
        self.chains
            .iter()
            .map(|c| c.draws_constrained.iter().map(|d| d[param_idx]).collect())
            .collect()
    }

    /// Index of a parameter by name.
    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.param_names.iter().position(|n| n == name)
    }

    /// Total divergent transitions across chains.
    pub fn n_divergent(&self) -> usize {
        self.chains.iter().map(|c| c.n_divergent()).sum()
    }
}

/// Run NUTS sampling on multiple chains in parallel via Rayon.
///
/// Each chain gets seed `seed + chain_id`. A chain that fails (e.g. a non-finite
/// density at its jittered start) is recorded in
/// [`SamplerResult::failed_chains`] and the remaining chains are kept. If no
/// chain produced draws, the lowest-indexed chain error is returned; chains
/// skipped because of `control` are absent from the result.
pub fn sample_nuts_multichain<M: LogDensityModel + ?Sized>(
    model: &M,
    config: &SamplerConfig,
    control: &SamplerControl,
) -> Result<SamplerResult> {
    use rayon::prelude::*;

    config.validate()?;

    let outcomes: Vec<Option<Result<Chain>>> = (0..config.n_chains)
        .into_par_iter()
        .map(|chain_id| {
            if control.is_stop_requested() {
                log::warn!("chain {}: skipped, stop requested", chain_id);
                return None;
            }
            let chain_seed = config.seed.wrapping_add(chain_id as u64);
            Some(sample_nuts(
                model,
                chain_id,
                config.n_warmup,
                config.n_samples,
                chain_seed,
                &config.nuts,
                config.init.as_deref(),
            ))
        })
        .collect();

    let mut chains = Vec::new();
    let mut errors = Vec::new();
    for (chain_id, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Some(Ok(chain)) => chains.push(chain),
            Some(Err(e)) => {
                log::warn!("chain {}: failed: {}", chain_id, e);
                errors.push((chain_id, e));
            }
            None => {}
        }
    }

    if chains.is_empty() {
        return Err(match errors.into_iter().next() {
            Some((_, e)) => e,
            None => Error::Computation("no chain ran: stop requested before start".to_string()),
        });
    }

    Ok(SamplerResult {
        chains,
        param_names: model.parameter_names(),
        n_warmup: config.n_warmup,
        n_samples: config.n_samples,
        failed_chains: errors
            .into_iter()
            .map(|(chain_id, e)| ChainFailure { chain_id, error: e.to_string() })
            .collect(),
    })
}
