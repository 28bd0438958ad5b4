//! Toy assay generation from known kinetic parameters.
//!
//! Traces are generated on the scaled absorbance axis the model works on and
//! divided by the scaling factor on output, so a simulated payload goes through
//! exactly the same path as measured data. Generation is deterministic in `seed`.

use ek_core::{Error, Result};
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::data::{AssayData, KnownConstants};
use crate::kinetics::michaelis_menten;

/// Dilution series used by the recovery scenario (µM).
pub const RECOVERY_CONCENTRATIONS: [f64; 10] =
    [0.0, 1.5625, 3.125, 6.25, 12.5, 25.0, 50.0, 100.0, 200.0, 500.0];

/// Ground truth and experimental design of a toy assay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToySettings {
    /// Turnover number (1/s).
    pub k_cat: f64,
    /// Affinity constant (µM).
    pub k_m: f64,
    /// Spread of per-trace rate constants around the curve.
    pub sigma_k: f64,
    /// Shared drift (scaled absorbance per s).
    pub background: f64,
    /// Per-trace absorbance noise (scaled).
    pub sigma_a: f64,
    /// Std-dev of per-trace intercepts (scaled).
    pub a0_sd: f64,
    /// Distinct substrate concentrations (µM); zeros become blanks.
    pub conc: Vec<f64>,
    /// Replicate traces per concentration.
    pub replicates: usize,
    /// Time points per trace.
    pub n_times: usize,
    /// Spacing of time points (s).
    pub dt: f64,
    /// Extinction-coefficient difference.
    pub epsilon: f64,
    /// Enzyme concentration (nM).
    pub c_enz: f64,
    /// Absorbance scaling factor.
    pub scaling_factor: u32,
    /// Largest concentration of the predictive grid.
    pub max_conc: usize,
    /// RNG seed.
    pub seed: u64,
}

impl Default for ToySettings {
    fn default() -> Self {
        Self {
            k_cat: 1.0,
            k_m: 10.0,
            sigma_k: 0.1,
            background: 0.05,
            sigma_a: 0.1,
            a0_sd: 0.1,
            conc: RECOVERY_CONCENTRATIONS.to_vec(),
            replicates: 2,
            n_times: 20,
            dt: 0.5,
            epsilon: 1.89,
            c_enz: 50.0,
            scaling_factor: 100,
            max_conc: 500,
            seed: 0,
        }
    }
}

/// Latent values used to generate a toy payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToyTruth {
    /// `V_max` implied by `k_cat`.
    pub v_max: f64,
    /// Per-trace rate constant (1/s).
    pub k: Vec<f64>,
    /// Per-trace scaled slope above background.
    pub rate: Vec<f64>,
    /// Per-trace intercept (scaled).
    pub a0: Vec<f64>,
}

/// A simulated payload together with its generating values.
#[derive(Debug, Clone)]
pub struct ToyAssay {
    /// Payload in the measured-data format.
    pub data: AssayData,
    /// Generating values.
    pub truth: ToyTruth,
}

impl ToySettings {
    fn validate(&self) -> Result<()> {
        let positive = [("k_cat", self.k_cat), ("k_m", self.k_m), ("sigma_a", self.sigma_a), ("dt", self.dt)];
        for (name, v) in positive {
            if !(v.is_finite() && v > 0.0) {
                return Err(Error::Validation(format!("{} must be finite and > 0, got {}", name, v)));
            }
        }
        for (name, v) in [("sigma_k", self.sigma_k), ("a0_sd", self.a0_sd)] {
            if !(v.is_finite() && v >= 0.0) {
                return Err(Error::Validation(format!("{} must be finite and >= 0, got {}", name, v)));
            }
        }
        if !self.background.is_finite() {
            return Err(Error::Validation("background must be finite".to_string()));
        }
        if self.n_times < 2 {
            return Err(Error::Validation(format!("n_times must be >= 2, got {}", self.n_times)));
        }
        if self.replicates == 0 || self.conc.is_empty() {
            return Err(Error::Validation("need at least one concentration and replicate".to_string()));
        }
        if let Some(c) = self.conc.iter().find(|c| !(c.is_finite() && **c >= 0.0)) {
            return Err(Error::Validation(format!("concentration {} is not >= 0", c)));
        }
        Ok(())
    }

    /// Generate the toy assay.
    pub fn simulate(&self) -> Result<ToyAssay> {
        self.validate()?;
        let constants = KnownConstants::new(self.epsilon, self.c_enz, self.scaling_factor)?;
        let mut rng = rand::rngs::StdRng::seed_from_u64(self.seed);
        let mut normal = move || -> f64 { StandardNormal.sample(&mut rng) };

        let mut conc: Vec<f64> =
            self.conc.iter().flat_map(|&c| std::iter::repeat_n(c, self.replicates)).collect();
        conc.sort_by(f64::total_cmp);
        let m = conc.len();
        let m0 = conc.iter().take_while(|&&c| c == 0.0).count();
        let t: Vec<f64> = (0..self.n_times).map(|j| j as f64 * self.dt).collect();

        let mut truth = ToyTruth {
            v_max: self.k_cat / constants.v_max_to_k_cat(),
            k: Vec::with_capacity(m),
            rate: Vec::with_capacity(m),
            a0: Vec::with_capacity(m),
        };
        let mut a = Vec::with_capacity(m);
        let scale = constants.scale();

        for (i, &c) in conc.iter().enumerate() {
            let (k, rate) = if i < m0 {
                (0.0, 0.0)
            } else {
                let k = michaelis_menten(self.k_cat, self.k_m, c) + self.sigma_k * normal();
                (k, k / constants.rate_to_k())
            };
            let a0 = self.a0_sd * normal();
            let slope = rate + self.background;
            let row: Vec<f64> =
                t.iter().map(|&tj| (slope * tj + a0 + self.sigma_a * normal()) / scale).collect();
            truth.k.push(k);
            truth.rate.push(rate);
            truth.a0.push(a0);
            a.push(row);
        }

        let data = AssayData {
            n: self.n_times,
            m,
            m0,
            t,
            a,
            conc,
            epsilon: self.epsilon,
            c_enz: self.c_enz,
            scaling_factor: self.scaling_factor,
            max_conc: self.max_conc,
            conc_ppc: None,
        };
        Ok(ToyAssay { data, truth })
    }
}
