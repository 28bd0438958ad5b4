//! Warm-up adaptation for NUTS: step size (dual averaging) and metric
//! (Welford variance or covariance).
//!
//! Implements the Stan warm-up schedule: a fast initial buffer, doubling slow
//! windows that estimate the metric, and a terminal buffer that only tunes the
//! step size.

use crate::hmc::{Leapfrog, Metric};
use crate::nuts::MetricKind;
use crate::posterior::Posterior;
use ek_core::traits::LogDensityModel;
use nalgebra::DMatrix;

/// Dual averaging for step size adaptation (Nesterov 2009, Stan variant).
///
/// Adapts `epsilon` to achieve a target average acceptance probability.
pub struct DualAveraging {
    target_accept: f64,
    log_eps: f64,
    log_eps_bar: f64,
    h_bar: f64,
    mu: f64,
    gamma: f64,
    t0: f64,
    kappa: f64,
    step: usize,
}

impl DualAveraging {
    /// Create with target acceptance rate and initial step size.
    pub fn new(target_accept: f64, init_eps: f64) -> Self {
        // Smoothed step starts at the initial step, not at 1.0.
        let log_eps0 = init_eps.ln();
        Self {
            target_accept,
            log_eps: log_eps0,
            log_eps_bar: log_eps0,
            h_bar: 0.0,
            mu: (10.0 * init_eps).ln(),
            gamma: 0.05,
            t0: 10.0,
            kappa: 0.75,
            step: 0,
        }
    }

    /// Update with observed acceptance probability from one transition.
    pub fn update(&mut self, accept_prob: f64) {
        let accept_prob = if accept_prob.is_finite() { accept_prob.clamp(0.0, 1.0) } else { 0.0 };
        self.step += 1;
        let m = self.step as f64;
        let w = 1.0 / (m + self.t0);
        self.h_bar = (1.0 - w) * self.h_bar + w * (self.target_accept - accept_prob);

        self.log_eps = self.mu - (m.sqrt() / self.gamma) * self.h_bar;
        let m_kappa = m.powf(-self.kappa);
        self.log_eps_bar = m_kappa * self.log_eps + (1.0 - m_kappa) * self.log_eps_bar;
    }

    /// Current step size (during warm-up).
    pub fn current_step_size(&self) -> f64 {
        self.log_eps.exp()
    }

    /// Smoothed step size, used after warm-up.
    pub fn adapted_step_size(&self) -> f64 {
        self.log_eps_bar.exp()
    }

    /// Restart for a new window around `init_eps`.
    pub fn reset(&mut self, init_eps: f64) {
        self.log_eps = init_eps.ln();
        self.log_eps_bar = init_eps.ln();
        self.h_bar = 0.0;
        self.mu = (10.0 * init_eps).ln();
        self.step = 0;
    }
}

/// Online Welford variance estimator (diagonal metric).
pub struct WelfordVariance {
    mean: Vec<f64>,
    m2: Vec<f64>,
    count: usize,
}

impl WelfordVariance {
    /// Create for `dim`-dimensional parameter vector.
    pub fn new(dim: usize) -> Self {
        Self { mean: vec![0.0; dim], m2: vec![0.0; dim], count: 0 }
    }

    /// Number of samples seen.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Incorporate a new sample.
    pub fn update(&mut self, x: &[f64]) {
        self.count += 1;
        let n = self.count as f64;
        for i in 0..x.len() {
            let delta = x[i] - self.mean[i];
            self.mean[i] += delta / n;
            let delta2 = x[i] - self.mean[i];
            self.m2[i] += delta * delta2;
        }
    }

    /// Current variance estimate. Returns `1.0` for each dimension if `count < 2`.
    pub fn variance(&self) -> Vec<f64> {
        if self.count < 2 {
            return vec![1.0; self.mean.len()];
        }
        let n = self.count as f64;
        self.m2.iter().map(|&m| (m / (n - 1.0)).max(1e-10)).collect()
    }

    /// Stan-regularized variance: shrink towards `1e-3` with weight `5 / (n + 5)`.
    pub fn regularized_variance(&self) -> Vec<f64> {
        let n = self.count as f64;
        let alpha = n / (n + 5.0);
        self.variance().iter().map(|&v| alpha * v + 1e-3 * (1.0 - alpha)).collect()
    }

    /// Reset the estimator.
    pub fn reset(&mut self) {
        self.mean.fill(0.0);
        self.m2.fill(0.0);
        self.count = 0;
    }
}

/// Online Welford covariance estimator (dense metric).
///
/// Maintains a running mean and `M2` matrix such that `cov = M2 / (n-1)`.
pub struct WelfordCovariance {
    mean: Vec<f64>,
    m2: Vec<f64>, // row-major dim x dim
    dim: usize,
    count: usize,
}

impl WelfordCovariance {
    /// Create for `dim`-dimensional parameter vector.
    pub fn new(dim: usize) -> Self {
        Self { mean: vec![0.0; dim], m2: vec![0.0; dim * dim], dim, count: 0 }
    }

    /// Number of samples seen.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Incorporate a new sample.
    pub fn update(&mut self, x: &[f64]) {
        self.count += 1;
        let n = self.count as f64;
        let dim = self.dim;

        let mut delta = vec![0.0; dim];
        for i in 0..dim {
            delta[i] = x[i] - self.mean[i];
            self.mean[i] += delta[i] / n;
        }
        for i in 0..dim {
            let d2 = x[i] - self.mean[i];
            for j in 0..dim {
                self.m2[j * dim + i] += delta[j] * d2;
            }
        }
    }

    /// Sample covariance, `None` until two samples are seen.
    pub fn covariance(&self) -> Option<DMatrix<f64>> {
        if self.count < 2 {
            return None;
        }
        let denom = (self.count as f64) - 1.0;
        Some(DMatrix::from_fn(self.dim, self.dim, |i, j| self.m2[i * self.dim + j] / denom))
    }

    /// Reset the estimator.
    pub fn reset(&mut self) {
        self.mean.fill(0.0);
        self.m2.fill(0.0);
        self.count = 0;
    }
}

/// Windowed adaptation combining step size + metric tuning.
///
/// ```text
/// n_warmup = 1000:
///   Window 0: iters 0..75     fast (step size only)
///   Window 1: iters 75..100   slow (step size + metric at end)
///   Window 2: iters 100..150  slow
///   ...                        doubling
///   Window k: iters ..950     slow (absorbs the remainder)
///   Final:    iters 950..1000 (step size only, metric locked)
/// ```
pub struct WindowedAdaptation {
    dual_avg: DualAveraging,
    welford: WelfordVariance,
    welford_cov: Option<WelfordCovariance>,
    windows: Vec<(usize, usize)>,
    current_window: usize,
    metric: Metric,
}

impl WindowedAdaptation {
    /// Create windowed adaptation for given dimension and warm-up length.
    ///
    /// A dense metric is estimated only when requested and `dim <= dense_max_dim`;
    /// otherwise the diagonal metric is used.
    pub fn new(
        dim: usize,
        n_warmup: usize,
        target_accept: f64,
        init_eps: f64,
        metric_kind: MetricKind,
        dense_max_dim: usize,
    ) -> Self {
        let welford_cov = (metric_kind == MetricKind::Dense && dim <= dense_max_dim)
            .then(|| WelfordCovariance::new(dim));
        Self {
            dual_avg: DualAveraging::new(target_accept, init_eps),
            welford: WelfordVariance::new(dim),
            welford_cov,
            windows: compute_windows(n_warmup),
            current_window: 0,
            metric: Metric::unit(dim),
        }
    }

    /// Update adaptation with the post-transition position and its acceptance
    /// statistic.
    ///
    /// Returns `true` if the metric was updated (at a slow window boundary).
    pub fn update(&mut self, iter: usize, q: &[f64], accept_prob: f64) -> bool {
        self.dual_avg.update(accept_prob);

        let mut metric_updated = false;

        if self.current_window < self.windows.len() {
            let (_start, end) = self.windows[self.current_window];
            let is_slow_window =
                self.current_window > 0 && self.current_window < self.windows.len() - 1;
            if is_slow_window {
                self.welford.update(q);
                if let Some(wc) = self.welford_cov.as_mut() {
                    wc.update(q);
                }
            }

            if iter + 1 >= end {
                if is_slow_window {
                    self.metric = Metric::Diag(self.welford.regularized_variance());
                    if let Some(dense) = self.welford_cov.as_ref().and_then(dense_metric) {
                        self.metric = dense;
                    }
                    self.welford.reset();
                    if let Some(wc) = self.welford_cov.as_mut() {
                        wc.reset();
                    }
                    metric_updated = true;
                }

                let eps = self.dual_avg.adapted_step_size();
                self.dual_avg.reset(eps);
                self.current_window += 1;
            }
        }

        metric_updated
    }

    /// Current step size.
    pub fn step_size(&self) -> f64 {
        self.dual_avg.current_step_size()
    }

    /// Final adapted step size (smoothed).
    pub fn adapted_step_size(&self) -> f64 {
        self.dual_avg.adapted_step_size()
    }

    /// Current metric.
    pub fn metric(&self) -> &Metric {
        &self.metric
    }
}

/// Shrunk covariance as a Cholesky-factored inverse mass matrix.
///
/// The inverse mass matrix is the (regularized) posterior covariance itself.
fn dense_metric(wc: &WelfordCovariance) -> Option<Metric> {
    let mut cov = wc.covariance()?;
    let n = cov.nrows();
    let count = wc.count().max(1) as f64;
    let alpha = count / (count + 5.0);
    let scale = (cov.trace() / n as f64).abs().max(1e-6);

    cov *= alpha;
    for i in 0..n {
        cov[(i, i)] += (1.0 - alpha) * 1e-3 + 1e-6 * scale;
    }

    Some(Metric::Dense(cov.cholesky()?.l()))
}

/// Compute Stan-style adaptation windows.
pub(crate) fn compute_windows(n_warmup: usize) -> Vec<(usize, usize)> {
    // Too short for a stable metric estimate: adapt step size only.
    if n_warmup < 50 {
        return vec![(0, n_warmup)];
    }

    let init_buffer = 75.min(n_warmup * 15 / 100);
    let term_buffer = 50.min(n_warmup / 10);
    let slow_end = n_warmup - term_buffer;

    let mut windows = vec![(0, init_buffer)];

    let mut start = init_buffer;
    let mut size = 25usize;
    while start < slow_end {
        let mut end = (start + size).min(slow_end);
        // A following window smaller than twice this one is merged in.
        if slow_end - end < 2 * size {
            end = slow_end;
        }
        windows.push((start, end));
        start = end;
        size *= 2;
    }

    windows.push((slow_end, n_warmup));
    windows
}

/// Find a reasonable initial step size by testing energy error.
///
/// Doubles or halves `eps` until the one-step acceptance probability crosses 0.5
/// (Hoffman & Gelman 2014, Algorithm 4).
pub fn find_reasonable_step_size<M: LogDensityModel + ?Sized>(
    posterior: &Posterior<'_, M>,
    q: &[f64],
    metric: &Metric,
) -> f64 {
    let integrator = Leapfrog::new(posterior, 1.0, metric.clone());

    let mut start = match integrator.point_at(q.to_vec()) {
        Ok(s) if s.is_finite() => s,
        _ => return 0.01,
    };
    start.momentum.fill(1.0);
    let h0 = start.energy(metric);

    let test_accept = |eps_test: f64| -> Option<f64> {
        let s = integrator.advance(&start, eps_test).ok()?;
        let a = (h0 - s.energy(metric)).exp();
        if a.is_finite() { Some(a.min(1.0)) } else { None }
    };

    let mut eps = 0.1;
    let accept0 = match test_accept(eps) {
        Some(a) => a,
        None => {
            eps = 0.001;
            match test_accept(eps) {
                Some(a) => a,
                None => return 0.001,
            }
        }
    };

    let direction: f64 = if accept0 > 0.5 { 1.0 } else { -1.0 };

    for _ in 0..50 {
        let new_eps = eps * 2.0_f64.powf(direction);
        if !(1e-10..=1e3).contains(&new_eps) {
            break;
        }
        match test_accept(new_eps) {
            Some(a) => {
                if direction > 0.0 && a < 0.5 {
                    break;
                }
                if direction < 0.0 && a > 0.5 {
                    eps = new_eps;
                    break;
                }
                eps = new_eps;
            }
            None => break,
        }
    }

    eps.clamp(1e-8, 1e3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posterior::test_models::StdNormal;

    #[test]
    fn test_dual_averaging_converges() {
        let mut da = DualAveraging::new(0.8, 1.0);
        for _ in 0..100 {
            da.update(0.8);
        }
        let eps = da.adapted_step_size();
        assert!(eps > 0.0 && eps.is_finite(), "Step size should be positive finite: {}", eps);
    }

    #[test]
    fn test_dual_averaging_adapts_direction() {
        let mut da_high = DualAveraging::new(0.8, 0.01);
        for _ in 0..200 {
            da_high.update(0.99);
        }
        let mut da_low = DualAveraging::new(0.8, 1.0);
        for _ in 0..200 {
            da_low.update(0.1);
        }
        assert!(da_high.adapted_step_size() > da_low.adapted_step_size());
    }

    #[test]
    fn test_dual_averaging_ignores_nan() {
        let mut da = DualAveraging::new(0.8, 0.5);
        da.update(f64::NAN);
        assert!(da.current_step_size().is_finite());
    }

    #[test]
    fn test_welford_variance() {
        let mut w = WelfordVariance::new(2);
        let data = [[1.0, 10.0], [2.0, 20.0], [3.0, 30.0], [4.0, 40.0], [5.0, 50.0]];
        for d in &data {
            w.update(d);
        }
        let var = w.variance();
        assert!((var[0] - 2.5).abs() < 1e-10, "Variance[0] should be 2.5: {}", var[0]);
        assert!((var[1] - 250.0).abs() < 1e-10, "Variance[1] should be 250: {}", var[1]);
    }

    #[test]
    fn test_welford_reset() {
        let mut w = WelfordVariance::new(2);
        w.update(&[1.0, 2.0]);
        w.update(&[3.0, 4.0]);
        w.reset();
        assert_eq!(w.variance(), vec![1.0, 1.0]);
        assert_eq!(w.count(), 0);
    }

    #[test]
    fn test_welford_covariance_matches_variance() {
        let data = [[1.0, 2.0], [2.0, 1.0], [4.0, 5.0], [0.0, -1.0]];
        let mut wv = WelfordVariance::new(2);
        let mut wc = WelfordCovariance::new(2);
        for d in &data {
            wv.update(d);
            wc.update(d);
        }
        let cov = wc.covariance().unwrap();
        let var = wv.variance();
        assert!((cov[(0, 0)] - var[0]).abs() < 1e-12);
        assert!((cov[(1, 1)] - var[1]).abs() < 1e-12);
        assert!((cov[(0, 1)] - cov[(1, 0)]).abs() < 1e-12);
        // Cov(x, y) by hand: means 1.75, 1.75
        let expect: f64 = data.iter().map(|d| (d[0] - 1.75) * (d[1] - 1.75)).sum::<f64>() / 3.0;
        assert!((cov[(0, 1)] - expect).abs() < 1e-12);
    }

    #[test]
    fn test_compute_windows() {
        let windows = compute_windows(1000);
        assert!(windows.len() >= 3, "Should have multiple windows: {:?}", windows);
        assert_eq!(windows[0], (0, 75));
        assert_eq!(windows.last().copied(), Some((950, 1000)));
        for i in 1..windows.len() {
            assert_eq!(windows[i].0, windows[i - 1].1, "Windows not contiguous at {}", i);
        }
    }

    #[test]
    fn test_compute_windows_small() {
        assert_eq!(compute_windows(10), vec![(0, 10)]);
        let w = compute_windows(100);
        assert_eq!(w.first().map(|w| w.0), Some(0));
        assert_eq!(w.last().map(|w| w.1), Some(100));
        assert!(w.len() >= 3);
    }

    #[test]
    fn test_dense_metric_is_cholesky_of_cov() {
        let mut wc = WelfordCovariance::new(2);
        for i in 0..200 {
            let x = (i as f64 * 0.37).sin();
            let y = 0.5 * x + 0.1 * (i as f64 * 1.3).cos();
            wc.update(&[x, y]);
        }
        let metric = dense_metric(&wc).unwrap();
        let cov = wc.covariance().unwrap();
        let diag = metric.variances();
        // Shrinkage moves the diagonal by a small relative amount only.
        assert!((diag[0] - cov[(0, 0)]).abs() / cov[(0, 0)] < 0.05);
        assert!((diag[1] - cov[(1, 1)]).abs() / cov[(1, 1)] < 0.05);
    }

    #[test]
    fn test_windowed_adaptation_learns_scale() {
        let mut adapt = WindowedAdaptation::new(2, 200, 0.8, 0.5, MetricKind::Diag, 32);
        let mut updated = 0;
        for i in 0..200 {
            let q = [3.0 * ((i * 7 % 13) as f64 - 6.0) / 6.0, 0.01 * ((i % 5) as f64 - 2.0)];
            if adapt.update(i, &q, 0.8) {
                updated += 1;
            }
        }
        assert!(updated >= 1);
        let d = adapt.metric().variances();
        assert!(d[0] > d[1], "wide coordinate should get larger inverse mass: {:?}", d);
    }

    #[test]
    fn test_find_reasonable_step_size_finite() {
        let model = StdNormal { dim: 4 };
        let posterior = Posterior::new(&model).unwrap();
        let eps = find_reasonable_step_size(&posterior, &[0.1, 0.2, -0.3, 0.0], &Metric::unit(4));
        assert!(eps > 1e-3 && eps < 10.0, "eps={}", eps);
    }
}
