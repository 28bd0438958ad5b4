//! Probability building blocks for enzyme-kinetics inference.
//!
//! - base log-densities used by the generative model (Normal, LogNormal, HalfNormal)
//! - transforms/bijectors for sampling positive parameters in unconstrained space

pub mod distributions;
pub mod normal;
pub mod transforms;
