//! # ek-inference
//!
//! Hierarchical Bayesian Michaelis-Menten inference from absorbance traces.
//!
//! This crate provides:
//! - the closed-form log-posterior of the enzyme-kinetics model
//! - NUTS sampling with windowed step-size and metric adaptation
//! - convergence diagnostics (rank-normalized R-hat, bulk/tail ESS, E-BFMI)
//! - posterior-predictive rate constants and summary bands
//!
//! ## Architecture
//!
//! The sampler sees the model only through `ek_core::LogDensityModel`; positive
//! parameters are mapped to the real line by `ek_prob::transforms` in
//! [`posterior::Posterior`].

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Adaptation: dual averaging, Welford variance/covariance, Stan warm-up windows.
pub mod adapt;
/// Chain storage and multi-chain parallel runner.
pub mod chain;
/// Assay payload, known constants and its validation.
pub mod data;
/// MCMC diagnostics: split R-hat, bulk/tail ESS, E-BFMI, quality gates.
pub mod diagnostics;
/// Per-iteration draw table with derived quantities.
pub mod draws;
/// HMC leapfrog integrator and metrics.
pub mod hmc;
/// Michaelis-Menten rate law.
pub mod kinetics;
/// Enzyme-kinetics log-density model.
pub mod model;
/// NUTS tree-building and sampling.
pub mod nuts;
/// End-to-end fit.
pub mod pipeline;
/// Posterior API: log-pdf, gradient, transforms.
pub mod posterior;
/// Posterior-predictive generator.
pub mod ppc;
/// Toy assay generation.
pub mod simulate;
/// Medians, credible intervals and predictive bands.
pub mod summary;
/// Rate unit conversions.
pub mod units;

pub use chain::{ChainFailure, SamplerConfig, SamplerControl, SamplerResult, sample_nuts_multichain};
pub use data::{Assay, AssayData, KnownConstants};
pub use diagnostics::{DiagnosticsResult, QualityStatus, QualitySummary};
pub use draws::PosteriorDraw;
pub use model::{EnzymeKineticsModel, LikelihoodMode};
pub use nuts::{MetricKind, NutsConfig, sample_nuts};
pub use pipeline::{FitOutput, fit, ppc_seed};
pub use posterior::Posterior;
pub use simulate::{ToyAssay, ToySettings};
pub use summary::{ParameterSummary, PpcBand};
