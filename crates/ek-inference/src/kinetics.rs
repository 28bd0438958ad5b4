//! Michaelis-Menten rate law.

/// `MM(k_cat, K_M, c) = k_cat * c / (K_M + c)`.
///
/// Callers guarantee `k_m > 0` and `c >= 0`, so the denominator is positive.
/// The saturation fraction is formed first so the result never exceeds `k_cat`.
#[inline]
pub fn michaelis_menten(k_cat: f64, k_m: f64, c: f64) -> f64 {
    debug_assert!(k_m > 0.0 && c >= 0.0);
    k_cat * (c / (k_m + c))
}

/// Partial derivatives `(dMM/dk_cat, dMM/dK_M)` at concentration `c`.
#[inline]
pub fn michaelis_menten_grad(k_cat: f64, k_m: f64, c: f64) -> (f64, f64) {
    let denom = k_m + c;
    let d_kcat = c / denom;
    let d_km = -k_cat * c / (denom * denom);
    (d_kcat, d_km)
}

/// Evaluate the rate law over a concentration grid.
pub fn michaelis_menten_curve(k_cat: f64, k_m: f64, conc: &[f64]) -> Vec<f64> {
    conc.iter().map(|&c| michaelis_menten(k_cat, k_m, c)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_zero_substrate_gives_zero_rate() {
        for (kcat, km) in [(1.0, 10.0), (150.0, 500.0), (1e-3, 1e-3)] {
            assert_eq!(michaelis_menten(kcat, km, 0.0), 0.0);
        }
    }

    #[test]
    fn test_half_saturation_at_km() {
        assert_relative_eq!(michaelis_menten(2.0, 10.0, 10.0), 1.0, epsilon = 1e-15);
    }

    #[test]
    fn test_monotone_and_bounded() {
        for (kcat, km) in [(1.0, 10.0), (150.0, 500.0), (0.2, 0.01)] {
            let mut prev = 0.0;
            for i in 0..2000 {
                let c = (i as f64) * 0.37;
                let v = michaelis_menten(kcat, km, c);
                assert!(v >= prev - 1e-15 * kcat, "not monotone at c={c}");
                assert!(v <= kcat, "exceeds k_cat at c={c}");
                prev = v;
            }
        }
    }

    #[test]
    fn test_saturates_to_kcat() {
        for (kcat, km) in [(1.0, 10.0), (150.0, 500.0), (7.5, 0.2)] {
            let v = michaelis_menten(kcat, km, 1e6 * km);
            assert_relative_eq!(v, kcat, max_relative = 1e-5);
        }
    }

    #[test]
    fn test_grad_vs_finite_diff() {
        let (kcat, km, c) = (1.3, 8.0, 5.0);
        let (gk, gm) = michaelis_menten_grad(kcat, km, c);
        let h = 1e-6;
        let fk = (michaelis_menten(kcat + h, km, c) - michaelis_menten(kcat - h, km, c)) / (2.0 * h);
        let fm = (michaelis_menten(kcat, km + h, c) - michaelis_menten(kcat, km - h, c)) / (2.0 * h);
        assert_relative_eq!(gk, fk, epsilon = 1e-8);
        assert_relative_eq!(gm, fm, epsilon = 1e-8);
    }

    #[test]
    fn test_curve_length() {
        let grid: Vec<f64> = (0..=500).map(|c| c as f64).collect();
        let curve = michaelis_menten_curve(1.0, 10.0, &grid);
        assert_eq!(curve.len(), 501);
        assert_eq!(curve[0], 0.0);
    }
}
