//! Hamiltonian dynamics on the unconstrained posterior.
//!
//! A [`PhasePoint`] carries the log density and its gradient at its position,
//! so a trajectory only evaluates the model once per leapfrog step.

use crate::posterior::Posterior;
use ek_core::Result;
use ek_core::traits::LogDensityModel;
use nalgebra::{DMatrix, DVector};
use rand_distr::{Distribution, StandardNormal};

/// Euclidean metric, stored as the inverse mass matrix `M^{-1}`.
///
/// `Dense` holds the lower-triangular `L` with `M^{-1} = L L^T`; momentum is
/// drawn by solving `L^T p = z`.
#[derive(Debug, Clone, PartialEq)]
pub enum Metric {
    /// Diagonal of `M^{-1}`.
    Diag(Vec<f64>),
    /// Cholesky factor of `M^{-1}`.
    Dense(DMatrix<f64>),
}

impl Metric {
    pub fn unit(dim: usize) -> Self {
        Self::Diag(vec![1.0; dim])
    }

    pub fn dim(&self) -> usize {
        match self {
            Metric::Diag(d) => d.len(),
            Metric::Dense(l) => l.nrows(),
        }
    }

    /// Position velocity `M^{-1} p`.
    pub fn velocity(&self, momentum: &[f64]) -> Vec<f64> {
        match self {
            Metric::Diag(d) => d.iter().zip(momentum).map(|(&w, &p)| w * p).collect(),
            Metric::Dense(l) => {
                let p = DVector::from_column_slice(momentum);
                (l * l.tr_mul(&p)).iter().copied().collect()
            }
        }
    }

    pub fn kinetic_energy(&self, momentum: &[f64]) -> f64 {
        let v = self.velocity(momentum);
        0.5 * momentum.iter().zip(&v).map(|(&p, &v)| p * v).sum::<f64>()
    }

    /// Momentum draw `p ~ N(0, M)`.
    pub fn draw_momentum<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        let z: Vec<f64> = (0..self.dim()).map(|_| StandardNormal.sample(rng)).collect();
        match self {
            Metric::Diag(d) => z
                .iter()
                .zip(d)
                .map(|(&z, &w)| if w > 0.0 { z / w.sqrt() } else { z })
                .collect(),
            Metric::Dense(l) => {
                let z = DVector::from_vec(z);
                match l.tr_solve_lower_triangular(&z) {
                    Some(p) => p.iter().copied().collect(),
                    None => z.iter().copied().collect(),
                }
            }
        }
    }

    /// Diagonal of `M^{-1}`, i.e. the per-coordinate posterior variance
    /// the metric was estimated from.
    pub fn variances(&self) -> Vec<f64> {
        match self {
            Metric::Diag(d) => d.clone(),
            Metric::Dense(l) => l.row_iter().map(|row| row.norm_squared()).collect(),
        }
    }
}

/// Position, momentum and the cached log density/gradient at the position.
#[derive(Debug, Clone)]
pub struct PhasePoint {
    pub position: Vec<f64>,
    pub momentum: Vec<f64>,
    /// Unconstrained log density, Jacobian included.
    pub log_density: f64,
    pub grad: Vec<f64>,
}

impl PhasePoint {
    /// `H = -log p(q) + K(p)`.
    pub fn energy(&self, metric: &Metric) -> f64 {
        metric.kinetic_energy(&self.momentum) - self.log_density
    }

    pub fn is_finite(&self) -> bool {
        self.log_density.is_finite() && self.grad.iter().all(|g| g.is_finite())
    }
}

/// Leapfrog integrator with a mutable step size and metric (both are tuned
/// during warm-up).
pub struct Leapfrog<'a, 'b, M: LogDensityModel + ?Sized> {
    posterior: &'a Posterior<'b, M>,
    step_size: f64,
    metric: Metric,
}

impl<'a, 'b, M: LogDensityModel + ?Sized> Leapfrog<'a, 'b, M> {
    pub fn new(posterior: &'a Posterior<'b, M>, step_size: f64, metric: Metric) -> Self {
        Self { posterior, step_size, metric }
    }

    pub fn step_size(&self) -> f64 {
        self.step_size
    }

    pub fn set_step_size(&mut self, step_size: f64) {
        self.step_size = step_size;
    }

    pub fn metric(&self) -> &Metric {
        &self.metric
    }

    pub fn set_metric(&mut self, metric: Metric) {
        self.metric = metric;
    }

    /// Evaluate the posterior at `position`, with zero momentum.
    ///
    /// A non-finite density is returned as-is; see [`PhasePoint::is_finite`].
    pub fn point_at(&self, position: Vec<f64>) -> Result<PhasePoint> {
        let log_density = self.posterior.logpdf_unconstrained(&position)?;
        let grad = self.posterior.grad_unconstrained(&position)?;
        Ok(PhasePoint { momentum: vec![0.0; position.len()], position, log_density, grad })
    }

    /// One kick-drift-kick step of signed length `eps`.
    pub fn advance(&self, from: &PhasePoint, eps: f64) -> Result<PhasePoint> {
        let mut momentum = from.momentum.clone();
        kick(&mut momentum, &from.grad, 0.5 * eps);

        let velocity = self.metric.velocity(&momentum);
        let position = from.position.iter().zip(&velocity).map(|(&q, &v)| q + eps * v).collect();

        let mut to = self.point_at(position)?;
        kick(&mut momentum, &to.grad, 0.5 * eps);
        to.momentum = momentum;
        Ok(to)
    }

    /// One step of the current size, forward for `direction > 0`.
    pub fn step(&self, from: &PhasePoint, direction: i32) -> Result<PhasePoint> {
        let eps = if direction > 0 { self.step_size } else { -self.step_size };
        self.advance(from, eps)
    }
}

fn kick(momentum: &mut [f64], grad: &[f64], half_eps: f64) {
    for (p, &g) in momentum.iter_mut().zip(grad) {
        *p += half_eps * g;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posterior::test_models::{HalfNormalPair, StdNormal};
    use rand::SeedableRng;

    #[test]
    fn test_energy_drift_small() {
        let model = StdNormal { dim: 3 };
        let posterior = Posterior::new(&model).unwrap();
        let leapfrog = Leapfrog::new(&posterior, 0.01, Metric::unit(3));

        let mut point = leapfrog.point_at(vec![0.3, -1.0, 0.8]).unwrap();
        point.momentum = vec![0.5, 0.2, -1.1];
        let h0 = point.energy(leapfrog.metric());
        for _ in 0..200 {
            point = leapfrog.step(&point, 1).unwrap();
        }
        let drift = (point.energy(leapfrog.metric()) - h0).abs();
        assert!(drift < 1e-3, "energy drift {}", drift);
    }

    #[test]
    fn test_backward_steps_retrace_path() {
        let model = HalfNormalPair;
        let posterior = Posterior::new(&model).unwrap();
        let leapfrog = Leapfrog::new(&posterior, 0.05, Metric::unit(2));
        let start = vec![-0.2, 0.4];
        let mut point = leapfrog.point_at(start.clone()).unwrap();
        point.momentum = vec![0.7, -0.3];
        for _ in 0..20 {
            point = leapfrog.step(&point, 1).unwrap();
        }
        for _ in 0..20 {
            point = leapfrog.step(&point, -1).unwrap();
        }
        for (a, b) in point.position.iter().zip(&start) {
            assert!((a - b).abs() < 1e-10);
        }
    }

    #[test]
    fn test_std_normal_step_is_exact_rotation_update() {
        // U = q^2/2, unit mass: one step from (q, p) = (1, 0) with eps gives
        // p = -eps/2 - eps/2 * (1 - eps^2/2), q = 1 - eps^2/2.
        let model = StdNormal { dim: 1 };
        let posterior = Posterior::new(&model).unwrap();
        let eps = 0.1;
        let leapfrog = Leapfrog::new(&posterior, eps, Metric::unit(1));
        let point = leapfrog.point_at(vec![1.0]).unwrap();
        let next = leapfrog.step(&point, 1).unwrap();
        let q = 1.0 - eps * eps / 2.0;
        assert!((next.position[0] - q).abs() < 1e-12);
        assert!((next.momentum[0] - (-eps / 2.0 - eps / 2.0 * q)).abs() < 1e-12);
    }

    #[test]
    fn test_dense_diagonal_factor_agrees_with_diag() {
        // L = diag(2, 0.5) => M^{-1} = diag(4, 0.25)
        let dense = Metric::Dense(DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 0.5]));
        let diag = Metric::Diag(vec![4.0, 0.25]);
        let p = [1.5, -2.0];
        assert_eq!(dense.velocity(&p), diag.velocity(&p));
        assert!((dense.kinetic_energy(&p) - diag.kinetic_energy(&p)).abs() < 1e-12);
        assert_eq!(dense.variances(), vec![4.0, 0.25]);
        assert_eq!(dense.dim(), 2);
    }

    #[test]
    fn test_dense_velocity_uses_full_matrix() {
        // L = [[1,0],[2,3]] => M^{-1} = [[1,2],[2,13]]
        let m = Metric::Dense(DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 2.0, 3.0]));
        let v = m.velocity(&[1.0, 1.0]);
        assert!((v[0] - 3.0).abs() < 1e-12);
        assert!((v[1] - 15.0).abs() < 1e-12);
        assert_eq!(m.variances(), vec![1.0, 13.0]);
    }

    #[test]
    fn test_momentum_covariance_is_mass() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let n = 20_000;

        let diag = Metric::Diag(vec![4.0, 0.25]);
        let mut ss = [0.0; 2];
        for _ in 0..n {
            let p = diag.draw_momentum(&mut rng);
            ss[0] += p[0] * p[0];
            ss[1] += p[1] * p[1];
        }
        assert!((ss[0] / n as f64 - 0.25).abs() < 0.02);
        assert!((ss[1] / n as f64 - 4.0).abs() < 0.3);

        // M^{-1} = [[1,2],[2,13]] => M = [[13,-2],[-2,1]] / 9
        let dense = Metric::Dense(DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 2.0, 3.0]));
        let mut s = [0.0; 3];
        for _ in 0..n {
            let p = dense.draw_momentum(&mut rng);
            s[0] += p[0] * p[0];
            s[1] += p[0] * p[1];
            s[2] += p[1] * p[1];
        }
        let m = [13.0 / 9.0, -2.0 / 9.0, 1.0 / 9.0];
        for (got, want) in s.iter().zip(m) {
            assert!((got / n as f64 - want).abs() < 0.05, "{} vs {}", got / n as f64, want);
        }
    }
}
