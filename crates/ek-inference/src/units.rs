//! Unit conversions between the sampled rate parameters and physical quantities.
//!
//! ```text
//! rate (scaled absorbance / s) --to_velocity--> v0 (µM/s) --to_rate_constant--> k (1/s)
//! ```
//!
//! The scalar and slice forms share one code path, so a length-1 slice yields the
//! bit-identical value of the scalar call.

/// `v0 = (rate / scaling_factor) / epsilon`.
#[inline]
pub fn to_velocity(rate: f64, scaling_factor: f64, epsilon: f64) -> f64 {
    (rate / scaling_factor) / epsilon
}

/// `k = v0 / (enzyme_conc / 1000)`; `enzyme_conc` in nM, so the divisor is µM.
#[inline]
pub fn to_rate_constant(v0: f64, enzyme_conc: f64) -> f64 {
    v0 / (enzyme_conc / 1000.0)
}

/// Inverse of [`to_velocity`]: `rate = v0 * epsilon * scaling_factor`.
#[inline]
pub fn from_velocity(v0: f64, scaling_factor: f64, epsilon: f64) -> f64 {
    (v0 * epsilon) * scaling_factor
}

/// Inverse of [`to_rate_constant`]: `v0 = k * (enzyme_conc / 1000)`.
#[inline]
pub fn from_rate_constant(k: f64, enzyme_conc: f64) -> f64 {
    k * (enzyme_conc / 1000.0)
}

/// Elementwise [`to_velocity`].
pub fn to_velocity_vec(rate: &[f64], scaling_factor: f64, epsilon: f64) -> Vec<f64> {
    rate.iter().map(|&r| to_velocity(r, scaling_factor, epsilon)).collect()
}

/// Elementwise [`to_rate_constant`].
pub fn to_rate_constant_vec(v0: &[f64], enzyme_conc: f64) -> Vec<f64> {
    v0.iter().map(|&v| to_rate_constant(v, enzyme_conc)).collect()
}

/// `d k / d rate`, the constant factor linking the sampled slope to the rate constant.
#[inline]
pub fn rate_to_k_factor(scaling_factor: f64, epsilon: f64, enzyme_conc: f64) -> f64 {
    to_rate_constant(to_velocity(1.0, scaling_factor, epsilon), enzyme_conc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_known_values() {
        // 50 nM enzyme, eps 1.89, sf 100: a turnover of 1/s is a scaled slope of 9.45.
        let v0 = to_velocity(9.45, 100.0, 1.89);
        assert_relative_eq!(v0, 0.05, epsilon = 1e-14);
        assert_relative_eq!(to_rate_constant(v0, 50.0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_roundtrip_recovers_rate() {
        for &(rate, sf, eps, enz) in &[
            (9.45, 100.0, 1.89, 50.0),
            (-0.3, 1.0, 0.5, 1.0),
            (1234.5, 1000.0, 6.22, 12.5),
            (1e-6, 10.0, 1e-3, 1e4),
        ] {
            let k = to_rate_constant(to_velocity(rate, sf, eps), enz);
            let back = from_velocity(from_rate_constant(k, enz), sf, eps);
            assert_relative_eq!(back, rate, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_vector_matches_scalar_bitwise() {
        let rate = 3.7;
        let v = to_velocity_vec(&[rate], 100.0, 1.89);
        let k = to_rate_constant_vec(&v, 50.0);
        let vs = to_velocity(rate, 100.0, 1.89);
        assert_eq!(v[0].to_bits(), vs.to_bits());
        assert_eq!(k[0].to_bits(), to_rate_constant(vs, 50.0).to_bits());
    }

    #[test]
    fn test_rate_to_k_factor_is_linear_slope() {
        let f = rate_to_k_factor(100.0, 1.89, 50.0);
        let k = to_rate_constant(to_velocity(2.5, 100.0, 1.89), 50.0);
        assert_relative_eq!(k, 2.5 * f, max_relative = 1e-14);
    }
}
