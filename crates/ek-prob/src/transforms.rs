//! Bijective transforms (bijectors) for unconstrained parameterization.
//!
//! NUTS operates in unconstrained space `z ∈ R^n`. Strictly positive parameters
//! are sampled as `z = ln(theta)`; the log-Jacobian `z` is added to the target
//! density so that the sampled distribution in `theta` is the intended one.

use ek_core::{Error, Result};

/// A bijective transform from unconstrained `z` to constrained `theta`.
pub trait Bijector: Send + Sync {
    /// Map unconstrained -> constrained: `theta = forward(z)`
    fn forward(&self, z: f64) -> f64;
    /// Map constrained -> unconstrained: `z = inverse(theta)`
    fn inverse(&self, theta: f64) -> f64;
    /// Log absolute determinant of Jacobian: `log|dtheta/dz|`
    fn log_abs_det_jacobian(&self, z: f64) -> f64;
    /// Derivative of log|J| w.r.t. z: `d/dz log|dtheta/dz|`
    fn grad_log_abs_det_jacobian(&self, z: f64) -> f64;
    /// Jacobian element: `dtheta/dz`
    fn jacobian(&self, z: f64) -> f64;
    /// Whether `theta` lies in the image of [`Self::forward`].
    fn in_domain(&self, theta: f64) -> bool;
}

/// Identity: `(-inf, inf) -> (-inf, inf)`.
pub struct IdentityBijector;

impl Bijector for IdentityBijector {
    #[inline]
    fn forward(&self, z: f64) -> f64 {
        z
    }
    #[inline]
    fn inverse(&self, theta: f64) -> f64 {
        theta
    }
    #[inline]
    fn log_abs_det_jacobian(&self, _z: f64) -> f64 {
        0.0
    }
    #[inline]
    fn grad_log_abs_det_jacobian(&self, _z: f64) -> f64 {
        0.0
    }
    #[inline]
    fn jacobian(&self, _z: f64) -> f64 {
        1.0
    }
    fn in_domain(&self, theta: f64) -> bool {
        theta.is_finite()
    }
}

/// Exp: `(-inf, inf) -> (0, inf)`, `theta = exp(z)`, `log|J| = z`.
pub struct ExpBijector;

impl Bijector for ExpBijector {
    #[inline]
    fn forward(&self, z: f64) -> f64 {
        z.exp()
    }
    #[inline]
    fn inverse(&self, theta: f64) -> f64 {
        theta.ln()
    }
    #[inline]
    fn log_abs_det_jacobian(&self, z: f64) -> f64 {
        z
    }
    #[inline]
    fn grad_log_abs_det_jacobian(&self, _z: f64) -> f64 {
        1.0
    }
    #[inline]
    fn jacobian(&self, z: f64) -> f64 {
        z.exp()
    }
    fn in_domain(&self, theta: f64) -> bool {
        theta.is_finite() && theta > 0.0
    }
}

/// Composite transform for a vector of parameters.
///
/// Each parameter gets its own bijector, selected from bounds.
pub struct ParameterTransform {
    bijectors: Vec<Box<dyn Bijector>>,
}

impl ParameterTransform {
    /// Create transforms from parameter bounds.
    ///
    /// Selection logic:
    /// - `(-inf, inf)` -> Identity
    /// - `(0, inf)` -> Exp
    ///
    /// Any other bound is rejected.
    pub fn from_bounds(bounds: &[(f64, f64)]) -> Result<Self> {
        let bijectors = bounds
            .iter()
            .enumerate()
            .map(|(i, &(lo, hi))| -> Result<Box<dyn Bijector>> {
                if hi < f64::INFINITY {
                    return Err(Error::Validation(format!(
                        "parameter {} has finite upper bound {}; only (-inf, inf) and (0, inf) are supported",
                        i, hi
                    )));
                }
                if lo == f64::NEG_INFINITY {
                    Ok(Box::new(IdentityBijector))
                } else if lo == 0.0 {
                    Ok(Box::new(ExpBijector))
                } else {
                    Err(Error::Validation(format!(
                        "parameter {} has lower bound {}; only -inf and 0 are supported",
                        i, lo
                    )))
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { bijectors })
    }

    /// Number of parameters.
    pub fn dim(&self) -> usize {
        self.bijectors.len()
    }

    /// Map unconstrained -> constrained.
    pub fn forward(&self, z: &[f64]) -> Vec<f64> {
        z.iter().zip(&self.bijectors).map(|(&zi, b)| b.forward(zi)).collect()
    }

    /// Map constrained -> unconstrained.
    ///
    /// Returns the index of the first component outside its domain as `Err(i)`.
    pub fn inverse(&self, theta: &[f64]) -> std::result::Result<Vec<f64>, usize> {
        theta
            .iter()
            .zip(&self.bijectors)
            .enumerate()
            .map(|(i, (&ti, b))| if b.in_domain(ti) { Ok(b.inverse(ti)) } else { Err(i) })
            .collect()
    }

    /// Sum of log|J| over all parameters.
    pub fn log_abs_det_jacobian(&self, z: &[f64]) -> f64 {
        z.iter().zip(&self.bijectors).map(|(&zi, b)| b.log_abs_det_jacobian(zi)).sum()
    }

    /// Gradient of sum(log|J|) w.r.t. z.
    pub fn grad_log_abs_det_jacobian(&self, z: &[f64]) -> Vec<f64> {
        z.iter().zip(&self.bijectors).map(|(&zi, b)| b.grad_log_abs_det_jacobian(zi)).collect()
    }

    /// Diagonal Jacobian: `dtheta_i/dz_i` for each parameter.
    pub fn jacobian_diag(&self, z: &[f64]) -> Vec<f64> {
        z.iter().zip(&self.bijectors).map(|(&zi, b)| b.jacobian(zi)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_roundtrip(b: &dyn Bijector, z_values: &[f64], rtol: f64) {
        for &z in z_values {
            let theta = b.forward(z);
            let z_back = b.inverse(theta);
            let diff = (z - z_back).abs();
            let scale = z.abs().max(1.0);
            assert!(diff / scale < rtol, "Roundtrip failed: z={}, theta={}, z_back={}", z, theta, z_back);
        }
    }

    fn check_grad_log_jac(b: &dyn Bijector, z_values: &[f64], rtol: f64) {
        let eps = 1e-7;
        for &z in z_values {
            let grad = b.grad_log_abs_det_jacobian(z);
            let fd = (b.log_abs_det_jacobian(z + eps) - b.log_abs_det_jacobian(z - eps)) / (2.0 * eps);
            let diff = (grad - fd).abs();
            assert!(diff / grad.abs().max(1.0) < rtol, "z={}: analytical={}, fd={}", z, grad, fd);
        }
    }

    #[test]
    fn test_identity() {
        let b = IdentityBijector;
        check_roundtrip(&b, &[-3.0, 0.0, 10.0], 1e-15);
        assert_eq!(b.log_abs_det_jacobian(1.0), 0.0);
        assert_eq!(b.jacobian(1.0), 1.0);
    }

    #[test]
    fn test_exp_roundtrip_and_jacobian() {
        let b = ExpBijector;
        check_roundtrip(&b, &[-5.0, -1.0, 0.0, 1.0, 3.0], 1e-10);
        check_grad_log_jac(&b, &[-3.0, 0.0, 3.0], 1e-7);
        // log|dtheta/dz| = log(exp(z)) = z
        assert!((b.jacobian(0.7).ln() - b.log_abs_det_jacobian(0.7)).abs() < 1e-12);
    }

    #[test]
    fn test_exp_forward_strictly_positive() {
        let b = ExpBijector;
        for z in [-700.0, -50.0, 0.0, 50.0] {
            assert!(b.forward(z) > 0.0);
        }
        assert!(!b.in_domain(0.0));
        assert!(!b.in_domain(-1.0));
    }

    #[test]
    fn test_from_bounds_selection() {
        let t = ParameterTransform::from_bounds(&[
            (f64::NEG_INFINITY, f64::INFINITY),
            (0.0, f64::INFINITY),
            (0.0, f64::INFINITY),
        ])
        .unwrap();
        assert_eq!(t.dim(), 3);
        let theta = t.forward(&[0.5, 0.0, 0.0]);
        assert_eq!(theta, vec![0.5, 1.0, 1.0]);
        assert_eq!(t.log_abs_det_jacobian(&[0.5, 0.3, -0.2]), 0.3 - 0.2);
        assert_eq!(t.inverse(&[0.5, 2.0, -1.0]), Err(2));
    }

    #[test]
    fn test_from_bounds_rejects_shifted_lower_bound() {
        let err = ParameterTransform::from_bounds(&[(0.0, f64::INFINITY), (1.0, f64::INFINITY)])
            .err()
            .unwrap();
        assert!(err.to_string().contains("parameter 1"), "{}", err);
        assert!(ParameterTransform::from_bounds(&[(f64::NAN, f64::INFINITY)]).is_err());
    }

    #[test]
    fn test_from_bounds_rejects_upper_bound() {
        assert!(ParameterTransform::from_bounds(&[(0.0, 1.0)]).is_err());
    }
}
