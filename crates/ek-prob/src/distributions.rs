//! Scalar log-density helpers for the priors of the kinetics model.
//!
//! Each density comes with the derivative of its log-density with respect to the
//! variate, which is all the model gradient needs (prior hyper-parameters are fixed).

use ek_core::Result;

/// Log-PDF of Normal `N(mu, sigma)` at `x`.
pub fn normal_logpdf(x: f64, mu: f64, sigma: f64) -> Result<f64> {
    crate::normal::logpdf(x, mu, sigma)
}

/// Log-PDF of LogNormal(mu, sigma) at `x`.
///
/// Defined as: `ln X ~ Normal(mu, sigma)`.
pub fn lognormal_logpdf(x: f64, mu: f64, sigma: f64) -> Result<f64> {
    if !x.is_finite() || x <= 0.0 {
        return Ok(f64::NEG_INFINITY);
    }
    let lx = x.ln();
    let lp = crate::normal::logpdf(lx, mu, sigma)?;
    Ok(lp - lx)
}

/// `d/dx` of [`lognormal_logpdf`]: `-((ln x - mu)/sigma^2 + 1) / x`.
pub fn lognormal_dlogpdf_dx(x: f64, mu: f64, sigma: f64) -> f64 {
    if !x.is_finite() || x <= 0.0 {
        return 0.0;
    }
    -((x.ln() - mu) / (sigma * sigma) + 1.0) / x
}

/// Log-PDF of HalfNormal(sigma) at `x`: Normal(0, sigma) truncated to `x >= 0`.
pub fn half_normal_logpdf(x: f64, sigma: f64) -> Result<f64> {
    if x.is_nan() || x < 0.0 {
        return Ok(f64::NEG_INFINITY);
    }
    Ok(crate::normal::logpdf(x, 0.0, sigma)? + std::f64::consts::LN_2)
}

/// `d/dx` of [`half_normal_logpdf`] on the support: `-x / sigma^2`.
pub fn half_normal_dlogpdf_dx(x: f64, sigma: f64) -> f64 {
    -x / (sigma * sigma)
}
