//! Assay payload: absorbance traces, concentrations and known constants.
//!
//! [`AssayData`] is the wire-level input (plain vectors and counts, JSON friendly).
//! [`AssayData::validate`] checks every declared dimension before any computation
//! and produces an [`Assay`], whose fields are immutable for the lifetime of a
//! sampling run.

use ek_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::units;

/// Input payload as supplied by ingestion code or read from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssayData {
    /// Number of time points per trace.
    pub n: usize,
    /// Number of traces.
    pub m: usize,
    /// Number of leading blank (zero-substrate) traces.
    pub m0: usize,
    /// Shared sampling times (s), length `n`.
    pub t: Vec<f64>,
    /// Raw (unscaled) absorbance, `m` rows of length `n`.
    pub a: Vec<Vec<f64>>,
    /// Substrate concentration per trace (µM), length `m`.
    pub conc: Vec<f64>,
    /// Extinction-coefficient difference.
    pub epsilon: f64,
    /// Enzyme concentration (nM).
    pub c_enz: f64,
    /// Absorbance scaling factor applied before sampling.
    pub scaling_factor: u32,
    /// Largest concentration of the posterior-predictive grid.
    pub max_conc: usize,
    /// Optional explicit predictive grid; defaults to `0..=max_conc`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conc_ppc: Option<Vec<f64>>,
}

/// Constants fixed for a sampling run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KnownConstants {
    /// Extinction-coefficient difference.
    pub epsilon: f64,
    /// Enzyme concentration (nM).
    pub c_enz: f64,
    /// Absorbance scaling factor.
    pub scaling_factor: u32,
}

impl KnownConstants {
    /// Validate and construct.
    pub fn new(epsilon: f64, c_enz: f64, scaling_factor: u32) -> Result<Self> {
        if !epsilon.is_finite() || epsilon <= 0.0 {
            return Err(Error::Validation(format!("epsilon must be finite and > 0, got {}", epsilon)));
        }
        if !c_enz.is_finite() || c_enz <= 0.0 {
            return Err(Error::Validation(format!("c_enz must be finite and > 0, got {}", c_enz)));
        }
        if scaling_factor == 0 {
            return Err(Error::Validation("scaling_factor must be a positive integer".into()));
        }
        Ok(Self { epsilon, c_enz, scaling_factor })
    }

    /// Scaling factor as a float.
    #[inline]
    pub fn scale(&self) -> f64 {
        self.scaling_factor as f64
    }

    /// Scaled absorbance slope -> reaction velocity (µM/s).
    #[inline]
    pub fn velocity(&self, rate: f64) -> f64 {
        units::to_velocity(rate, self.scale(), self.epsilon)
    }

    /// Velocity (µM/s) -> enzyme-normalized rate constant (1/s).
    #[inline]
    pub fn rate_constant(&self, v0: f64) -> f64 {
        units::to_rate_constant(v0, self.c_enz)
    }

    /// `dk/drate`.
    #[inline]
    pub fn rate_to_k(&self) -> f64 {
        units::rate_to_k_factor(self.scale(), self.epsilon, self.c_enz)
    }

    /// `dk_cat/dV_max`.
    #[inline]
    pub fn v_max_to_k_cat(&self) -> f64 {
        units::to_rate_constant(1.0, self.c_enz)
    }
}

/// Absorbance traces sharing one time axis; the first `n_blank` are controls.
#[derive(Debug, Clone)]
pub struct TraceSet {
    t: Vec<f64>,
    a: Vec<Vec<f64>>,
    n_blank: usize,
}

impl TraceSet {
    /// Time points.
    pub fn times(&self) -> &[f64] {
        &self.t
    }

    /// Raw absorbance of trace `m`.
    pub fn trace(&self, m: usize) -> &[f64] {
        &self.a[m]
    }

    /// All traces.
    pub fn traces(&self) -> &[Vec<f64>] {
        &self.a
    }

    /// Number of traces (`M`).
    pub fn n_traces(&self) -> usize {
        self.a.len()
    }

    /// Number of time points (`N`).
    pub fn n_times(&self) -> usize {
        self.t.len()
    }

    /// Number of blank traces (`M0`).
    pub fn n_blank(&self) -> usize {
        self.n_blank
    }
}

/// Dense integer concentration grid for predictive checks.
#[derive(Debug, Clone, PartialEq)]
pub struct PpcGrid {
    conc: Vec<f64>,
}

impl PpcGrid {
    /// `0, 1, ..., max_conc`.
    pub fn new(max_conc: usize) -> Self {
        Self { conc: (0..=max_conc).map(|c| c as f64).collect() }
    }

    /// Grid values.
    pub fn concentrations(&self) -> &[f64] {
        &self.conc
    }

    /// Number of grid points.
    pub fn len(&self) -> usize {
        self.conc.len()
    }

    /// Whether the grid is empty (never, for a validated grid).
    pub fn is_empty(&self) -> bool {
        self.conc.is_empty()
    }
}

/// A validated assay.
#[derive(Debug, Clone)]
pub struct Assay {
    /// Observed traces.
    pub traces: TraceSet,
    /// Concentration per trace (µM).
    pub conc: Vec<f64>,
    /// Known constants.
    pub constants: KnownConstants,
    /// Predictive grid.
    pub ppc_grid: PpcGrid,
}

impl AssayData {
    /// Load from a JSON string.
    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Check every declared dimension and invariant, then build an [`Assay`].
    pub fn validate(self) -> Result<Assay> {
        let shape = |msg: String| Error::InvalidDataShape(msg);

        if self.n < 2 {
            return Err(shape(format!("n must be >= 2 to define a slope, got {}", self.n)));
        }
        if self.m == 0 {
            return Err(shape("m must be >= 1".into()));
        }
        if self.m0 > self.m {
            return Err(shape(format!("m0 ({}) must not exceed m ({})", self.m0, self.m)));
        }
        if self.t.len() != self.n {
            return Err(shape(format!("t has length {}, expected n = {}", self.t.len(), self.n)));
        }
        if self.a.len() != self.m {
            return Err(shape(format!("a has {} rows, expected m = {}", self.a.len(), self.m)));
        }
        for (i, row) in self.a.iter().enumerate() {
            if row.len() != self.n {
                return Err(shape(format!(
                    "a[{}] has length {}, expected n = {}",
                    i,
                    row.len(),
                    self.n
                )));
            }
            if let Some(j) = row.iter().position(|x| !x.is_finite()) {
                return Err(shape(format!("a[{}][{}] is not finite", i, j)));
            }
        }
        if let Some(j) = self.t.iter().position(|x| !x.is_finite()) {
            return Err(shape(format!("t[{}] is not finite", j)));
        }
        if self.conc.len() != self.m {
            return Err(shape(format!(
                "conc has length {}, expected m = {}",
                self.conc.len(),
                self.m
            )));
        }
        if let Some(i) = self.conc.iter().position(|c| !c.is_finite() || *c < 0.0) {
            return Err(shape(format!("conc[{}] = {} must be finite and >= 0", i, self.conc[i])));
        }
        if let Some(i) = self.conc[..self.m0].iter().position(|&c| c != 0.0) {
            return Err(shape(format!(
                "conc[{}] = {} but the first m0 = {} entries must be blanks (0)",
                i, self.conc[i], self.m0
            )));
        }
        if let Some(i) = self.conc.windows(2).position(|w| w[1] < w[0]) {
            return Err(shape(format!(
                "conc must be ascending: conc[{}] = {} > conc[{}] = {}",
                i,
                self.conc[i],
                i + 1,
                self.conc[i + 1]
            )));
        }
        let trailing_zeros = self.conc[self.m0..].iter().filter(|&&c| c == 0.0).count();
        if trailing_zeros > 0 {
            log::warn!(
                "{} non-blank trace(s) have zero substrate; they are modelled with the full rate likelihood",
                trailing_zeros
            );
        }

        let constants = KnownConstants::new(self.epsilon, self.c_enz, self.scaling_factor)?;

        let ppc_grid = match self.conc_ppc {
            Some(grid) => {
                if grid.len() != self.max_conc + 1 {
                    return Err(shape(format!(
                        "conc_ppc has length {}, expected max_conc + 1 = {}",
                        grid.len(),
                        self.max_conc + 1
                    )));
                }
                if let Some(i) = grid.iter().position(|c| !c.is_finite() || *c < 0.0) {
                    return Err(shape(format!("conc_ppc[{}] must be finite and >= 0", i)));
                }
                PpcGrid { conc: grid }
            }
            None => PpcGrid::new(self.max_conc),
        };

        Ok(Assay {
            traces: TraceSet { t: self.t, a: self.a, n_blank: self.m0 },
            conc: self.conc,
            constants,
            ppc_grid,
        })
    }
}

impl Assay {
    /// Back to the wire payload (e.g. to write simulated data).
    pub fn to_data(&self) -> AssayData {
        AssayData {
            n: self.traces.n_times(),
            m: self.traces.n_traces(),
            m0: self.traces.n_blank(),
            t: self.traces.t.clone(),
            a: self.traces.a.clone(),
            conc: self.conc.clone(),
            epsilon: self.constants.epsilon,
            c_enz: self.constants.c_enz,
            scaling_factor: self.constants.scaling_factor,
            max_conc: self.ppc_grid.len().saturating_sub(1),
            conc_ppc: None,
        }
    }
}
