//! Core traits.
//!
//! Samplers in `ek-inference` are written against [`LogDensityModel`] so that the
//! NUTS machinery, adaptation and diagnostics can be exercised on small reference
//! models in tests while production runs use the enzyme-kinetics model.

use crate::Result;

/// A model exposing a negative log-density over a fixed-length parameter vector
/// in *constrained* space, plus its analytic gradient.
pub trait LogDensityModel: Send + Sync {
    /// Number of parameters.
    fn dim(&self) -> usize;

    /// Parameter names, in vector order.
    fn parameter_names(&self) -> Vec<String>;

    /// Parameter bounds `(lo, hi)`. `(0, inf)` selects a log transform,
    /// `(-inf, inf)` the identity.
    fn parameter_bounds(&self) -> Vec<(f64, f64)>;

    /// A starting point inside the support.
    fn parameter_init(&self) -> Vec<f64>;

    /// Negative log-density (up to a constant) at `params`.
    ///
    /// May return a non-finite value for parameters where the density vanishes;
    /// `Err` is reserved for malformed input (e.g. wrong length).
    fn nll(&self, params: &[f64]) -> Result<f64>;

    /// Gradient of [`Self::nll`] with respect to `params`.
    fn grad_nll(&self, params: &[f64]) -> Result<Vec<f64>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quadratic;

    impl LogDensityModel for Quadratic {
        fn dim(&self) -> usize {
            1
        }
        fn parameter_names(&self) -> Vec<String> {
            vec!["x".into()]
        }
        fn parameter_bounds(&self) -> Vec<(f64, f64)> {
            vec![(f64::NEG_INFINITY, f64::INFINITY)]
        }
        fn parameter_init(&self) -> Vec<f64> {
            vec![0.0]
        }
        fn nll(&self, params: &[f64]) -> Result<f64> {
            Ok(0.5 * params[0] * params[0])
        }
        fn grad_nll(&self, params: &[f64]) -> Result<Vec<f64>> {
            Ok(vec![params[0]])
        }
    }

    #[test]
    fn test_trait_object_usable() {
        let m: &dyn LogDensityModel = &Quadratic;
        assert_eq!(m.dim(), 1);
        assert_eq!(m.nll(&[2.0]).unwrap(), 2.0);
        assert_eq!(m.grad_nll(&[2.0]).unwrap(), vec![2.0]);
    }
}
