//! End-to-end run: validated assay in, draw table with diagnostics out.

use ek_core::Result;

use crate::chain::{SamplerConfig, SamplerControl, SamplerResult, sample_nuts_multichain};
use crate::data::Assay;
use crate::diagnostics::{
    DiagnosticsResult, QualityGates, QualitySummary, compute_diagnostics, quality_summary,
};
use crate::draws::{PosteriorDraw, attach_ppc, collect_draws};
use crate::model::{EnzymeKineticsModel, LikelihoodMode};
use crate::summary::{ParameterSummary, PpcBand, ppc_bands};

/// Global quantities reported by [`FitOutput::key_summaries`].
pub const KEY_PARAMETERS: [&str; 5] = ["k_cat", "K_M", "V_max", "sigma_k", "background"];

/// Everything a sampling run produces.
#[derive(Debug, Clone)]
pub struct FitOutput {
    /// One entry per `(chain, iteration)`, predictive vectors attached.
    pub draws: Vec<PosteriorDraw>,
    /// Convergence diagnostics over every sampled parameter.
    pub diagnostics: DiagnosticsResult,
    /// Graded diagnostics.
    pub quality: QualitySummary,
    /// Raw sampler output, including per-transition statistics.
    pub result: SamplerResult,
    /// Grid the predictive vectors were drawn on.
    pub ppc_conc: Vec<f64>,
}

impl FitOutput {
    /// Pooled draws of a global quantity, `None` for unknown names.
    pub fn scalar(&self, name: &str) -> Option<Vec<f64>> {
        let get: fn(&PosteriorDraw) -> f64 = match name {
            "k_cat" => |d: &PosteriorDraw| d.k_cat,
            "K_M" => |d: &PosteriorDraw| d.k_m,
            "V_max" => |d: &PosteriorDraw| d.v_max,
            "sigma_k" => |d: &PosteriorDraw| d.sigma_k,
            "background" => |d: &PosteriorDraw| d.background,
            _ => return None,
        };
        Some(self.draws.iter().map(get).collect())
    }

    /// Median and 95% interval of each of [`KEY_PARAMETERS`].
    pub fn key_summaries(&self) -> Vec<ParameterSummary> {
        KEY_PARAMETERS
            .iter()
            .filter_map(|&name| self.scalar(name).map(|d| ParameterSummary::from_draws(name, &d)))
            .collect()
    }

    /// Predictive bands at `levels` over the grid.
    pub fn ppc_bands(&self, levels: &[f64]) -> Vec<PpcBand> {
        let k_ppc: Vec<Vec<f64>> = self.draws.iter().map(|d| d.k_ppc.clone()).collect();
        ppc_bands(&k_ppc, &self.ppc_conc, levels)
    }
}

/// First predictive seed for a run: chain seeds occupy `seed..seed + n_chains`.
pub fn ppc_seed(config: &SamplerConfig) -> u64 {
    config.seed.wrapping_add(config.n_chains as u64)
}

/// Sample the posterior of `assay`, derive per-draw quantities and predictive
/// vectors, and grade convergence with the default gates.
///
/// The predictive stream starts at [`ppc_seed`], past the chain seeds, so the whole
/// output is a function of the inputs.
pub fn fit(
    assay: &Assay,
    mode: LikelihoodMode,
    config: &SamplerConfig,
    control: &SamplerControl,
) -> Result<FitOutput> {
    let model = EnzymeKineticsModel::new(assay, mode);
    let result = sample_nuts_multichain(&model, config, control)?;

    if !result.failed_chains.is_empty() {
        log::warn!(
            "{} of {} chain(s) failed to start",
            result.failed_chains.len(),
            config.n_chains
        );
    }
    let n_div = result.n_divergent();
    if n_div > 0 {
        log::warn!(
            "{} divergent transition(s) across {} draws",
            n_div,
            result.total_draws()
        );
    }

    let mut draws = collect_draws(&model, &result)?;
    let ppc_conc = assay.ppc_grid.concentrations().to_vec();
    attach_ppc(&mut draws, &ppc_conc, ppc_seed(config))?;

    let diagnostics = compute_diagnostics(&result);
    let quality = quality_summary(
        &diagnostics,
        result.chains.len(),
        config.n_samples,
        &QualityGates::default(),
    );
    log::info!("sampling finished: quality {}", quality.status);

    Ok(FitOutput { draws, diagnostics, quality, result, ppc_conc })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulate::ToySettings;

    fn small_assay() -> Assay {
        let toy = ToySettings {
            conc: vec![0.0, 5.0, 20.0, 100.0],
            n_times: 10,
            max_conc: 20,
            seed: 3,
            ..ToySettings::default()
        }
        .simulate()
        .unwrap();
        toy.data.validate().unwrap()
    }

    #[test]
    fn test_fit_shapes() {
        let assay = small_assay();
        let config = SamplerConfig {
            n_chains: 2,
            n_warmup: 60,
            n_samples: 30,
            seed: 7,
            ..SamplerConfig::default()
        };
        let out = fit(&assay, LikelihoodMode::default(), &config, &SamplerControl::new()).unwrap();
        assert_eq!(out.draws.len(), 60);
        assert_eq!(out.ppc_conc.len(), 21);
        assert!(out.draws.iter().all(|d| d.k_ppc.len() == 21 && d.rate.len() == 8));
        assert_eq!(out.diagnostics.r_hat.len(), 4 + 3 * 8);
        assert_eq!(out.key_summaries().len(), KEY_PARAMETERS.len());
        assert!(out.scalar("nope").is_none());
        let bands = out.ppc_bands(&crate::summary::PPC_BAND_LEVELS);
        assert_eq!(bands.len(), 21);
        assert_eq!(bands[0].bands.len(), 4);
    }

    #[test]
    fn test_ppc_stream_disjoint_from_chain_seeds() {
        let assay = small_assay();
        let config = SamplerConfig {
            n_chains: 2,
            n_warmup: 40,
            n_samples: 10,
            seed: 7,
            ..SamplerConfig::default()
        };
        assert_eq!(ppc_seed(&config), 9);
        let out = fit(&assay, LikelihoodMode::default(), &config, &SamplerControl::new()).unwrap();

        let mut expected = out.draws.clone();
        attach_ppc(&mut expected, &out.ppc_conc, 9).unwrap();
        assert_eq!(expected, out.draws);

        let mut reused = out.draws.clone();
        attach_ppc(&mut reused, &out.ppc_conc, config.seed).unwrap();
        assert_ne!(reused[0].k_ppc, out.draws[0].k_ppc);
    }

    #[test]
    fn test_fit_stopped_before_start_is_error() {
        let assay = small_assay();
        let control = SamplerControl::new();
        control.request_stop();
        let config = SamplerConfig { n_chains: 2, n_warmup: 10, n_samples: 10, ..SamplerConfig::default() };
        assert!(fit(&assay, LikelihoodMode::BlanksOnce, &config, &control).is_err());
    }
}
