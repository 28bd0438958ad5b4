//! Posterior density in constrained and unconstrained parameterizations.
//!
//! Wraps any [`LogDensityModel`]; priors live in the model itself, so the
//! posterior only adds the change-of-variables term.
//!
//! - `logpdf(theta) = -model.nll(theta)`
//! - `logpdf_unconstrained(z) = logpdf(transform(z)) + log|J(z)|`

use ek_core::traits::LogDensityModel;
use ek_core::{Error, Result};
use ek_prob::transforms::ParameterTransform;

/// Posterior over a log-density model with bound-derived transforms.
pub struct Posterior<'a, M: LogDensityModel + ?Sized> {
    model: &'a M,
    transform: ParameterTransform,
    names: Vec<String>,
}

impl<'a, M: LogDensityModel + ?Sized> Posterior<'a, M> {
    /// Build a posterior; fails when a bound cannot be mapped to a bijector.
    pub fn new(model: &'a M) -> Result<Self> {
        let transform = ParameterTransform::from_bounds(&model.parameter_bounds())?;
        Ok(Self { model, transform, names: model.parameter_names() })
    }

    /// Number of parameters.
    pub fn dim(&self) -> usize {
        self.model.dim()
    }

    /// Reference to the underlying model.
    pub fn model(&self) -> &M {
        self.model
    }

    /// Reference to the parameter transform.
    pub fn transform(&self) -> &ParameterTransform {
        &self.transform
    }

    /// Log-posterior in constrained space.
    pub fn logpdf(&self, theta: &[f64]) -> Result<f64> {
        Ok(-self.model.nll(theta)?)
    }

    /// Gradient of log-posterior in constrained space.
    pub fn grad(&self, theta: &[f64]) -> Result<Vec<f64>> {
        let mut g = self.model.grad_nll(theta)?;
        for gi in g.iter_mut() {
            *gi = -*gi;
        }
        Ok(g)
    }

    /// Log-posterior in unconstrained space: `logpdf(transform(z)) + log|J(z)|`.
    pub fn logpdf_unconstrained(&self, z: &[f64]) -> Result<f64> {
        let theta = self.transform.forward(z);
        let lp = self.logpdf(&theta)?;
        Ok(lp + self.transform.log_abs_det_jacobian(z))
    }

    /// Gradient of log-posterior in unconstrained space.
    ///
    /// Chain rule (diagonal Jacobian):
    /// `grad_z[i] = (dtheta_i/dz_i) * grad_theta[i] + d/dz_i log|J_i|`
    pub fn grad_unconstrained(&self, z: &[f64]) -> Result<Vec<f64>> {
        let theta = self.transform.forward(z);
        let grad_theta = self.grad(&theta)?;
        let jac_diag = self.transform.jacobian_diag(z);
        let grad_log_jac = self.transform.grad_log_abs_det_jacobian(z);

        Ok(grad_theta
            .iter()
            .zip(jac_diag.iter())
            .zip(grad_log_jac.iter())
            .map(|((&gt, &jd), &glj)| gt * jd + glj)
            .collect())
    }

    /// Map constrained -> unconstrained, naming the first out-of-domain parameter.
    pub fn to_unconstrained(&self, theta: &[f64]) -> Result<Vec<f64>> {
        if theta.len() != self.dim() {
            return Err(Error::Validation(format!(
                "expected {} parameters, got {}",
                self.dim(),
                theta.len()
            )));
        }
        self.transform.inverse(theta).map_err(|i| Error::ConstraintViolation {
            parameter: self.names[i].clone(),
            value: theta[i],
        })
    }

    /// Map unconstrained -> constrained.
    pub fn to_constrained(&self, z: &[f64]) -> Vec<f64> {
        self.transform.forward(z)
    }
}
