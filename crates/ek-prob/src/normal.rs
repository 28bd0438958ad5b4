//! Normal distribution utilities.

use ek_core::{Error, Result};

/// Natural log of `sqrt(2π)`.
pub const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_7;

/// Log-PDF of a Normal distribution `N(mu, sigma)` at `x`.
///
/// `sigma` is the standard deviation.
///
/// `log p(x) = -0.5 * ((x-mu)/sigma)^2 - ln(sigma) - ln(sqrt(2π))`
pub fn logpdf(x: f64, mu: f64, sigma: f64) -> Result<f64> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(Error::Validation(format!("sigma must be finite and > 0, got {}", sigma)));
    }
    let z = (x - mu) / sigma;
    Ok(-0.5 * z * z - sigma.ln() - LN_SQRT_2PI)
}

/// Negative log-likelihood for a Normal distribution `N(mu, sigma)` at `x`.
pub fn nll(x: f64, mu: f64, sigma: f64) -> Result<f64> {
    Ok(-logpdf(x, mu, sigma)?)
}

/// Partial derivatives of [`logpdf`]: `(d/dx, d/dmu, d/dsigma)`.
///
/// `d/dmu = -d/dx = (x-mu)/sigma^2`, `d/dsigma = ((x-mu)^2/sigma^2 - 1)/sigma`.
pub fn grad_logpdf(x: f64, mu: f64, sigma: f64) -> Result<(f64, f64, f64)> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(Error::Validation(format!("sigma must be finite and > 0, got {}", sigma)));
    }
    let r = x - mu;
    let inv_var = 1.0 / (sigma * sigma);
    let d_mu = r * inv_var;
    let d_sigma = (r * r * inv_var - 1.0) / sigma;
    Ok((-d_mu, d_mu, d_sigma))
}
