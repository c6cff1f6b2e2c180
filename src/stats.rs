//! Mixing diagnostics for sample sequences: expected squared jump distance,
//! autocorrelation, and a sliding-window acceptance estimator.

use ndarray::ArrayView2;
use num_traits::Float;
use rustfft::num_complex::Complex;
use rustfft::{FftNum, FftPlanner};
use std::collections::VecDeque;

/// Expected squared jump distance of a `[n, dim]` sample sequence: the mean
/// squared Euclidean distance between consecutive samples. Larger is better
/// mixing; a heavily rejecting chain scores near zero.
pub fn esjd<T: Float>(samples: ArrayView2<T>) -> T {
    let n = samples.nrows();
    if n < 2 {
        return T::zero();
    }
    let mut total = T::zero();
    for i in 1..n {
        let prev = samples.row(i - 1);
        let curr = samples.row(i);
        let jump = curr.iter().zip(prev.iter()).fold(T::zero(), |acc, (&c, &p)| {
            let diff = c - p;
            acc + diff * diff
        });
        total = total + jump;
    }
    total / T::from(n - 1).unwrap()
}

/// Autocorrelation of a scalar series for lags `0..=max_lag` (clamped to the
/// series length), computed via FFT with zero padding, normalized so that
/// lag 0 equals one.
///
/// A constant series has no correlation structure to speak of; it yields
/// `[1, 0, 0, …]`.
pub fn autocorrelation<T>(series: &[T], max_lag: usize) -> Vec<T>
where
    T: Float + FftNum,
{
    let n = series.len();
    if n == 0 {
        return Vec::new();
    }
    let max_lag = max_lag.min(n - 1);
    if n == 1 {
        return vec![T::one()];
    }

    let mean = series.iter().fold(T::zero(), |acc, &x| acc + x) / T::from(n).unwrap();

    // Pad to at least 2n so the circular convolution never wraps around.
    let size = (2 * n).next_power_of_two();
    let mut buf: Vec<Complex<T>> = Vec::with_capacity(size);
    buf.extend(series.iter().map(|&x| Complex::new(x - mean, T::zero())));
    buf.resize(size, Complex::new(T::zero(), T::zero()));

    let mut planner = FftPlanner::new();
    planner.plan_fft_forward(size).process(&mut buf);
    for c in buf.iter_mut() {
        *c = Complex::new(c.norm_sqr(), T::zero());
    }
    planner.plan_fft_inverse(size).process(&mut buf);

    let lag0 = buf[0].re;
    if lag0 <= T::zero() {
        let mut acf = vec![T::zero(); max_lag + 1];
        acf[0] = T::one();
        return acf;
    }
    (0..=max_lag).map(|k| buf[k].re / lag0).collect()
}

/// Sliding-window acceptance estimator, as displayed by the `run_progress`
/// runners.
#[derive(Debug, Clone)]
pub struct AcceptanceWindow {
    window: VecDeque<bool>,
    capacity: usize,
}

impl AcceptanceWindow {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, accepted: bool) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(accepted);
    }

    /// Acceptance fraction over the recorded window; 0 while empty.
    pub fn rate(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let accepted = self.window.iter().filter(|&&a| a).count();
        accepted as f64 / self.window.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::arr2;

    #[test]
    fn esjd_of_constant_steps() {
        let samples = arr2(&[[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]]);
        assert_abs_diff_eq!(esjd(samples.view()), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn esjd_of_single_sample_is_zero() {
        let samples = arr2(&[[1.0, 2.0]]);
        assert_eq!(esjd(samples.view()), 0.0);
    }

    #[test]
    fn esjd_of_stuck_chain_is_zero() {
        let samples = arr2(&[[1.0, 2.0], [1.0, 2.0], [1.0, 2.0]]);
        assert_abs_diff_eq!(esjd(samples.view()), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn autocorrelation_starts_at_one() {
        let series: Vec<f64> = (0..64).map(|i| (i as f64 * 0.37).sin()).collect();
        let acf = autocorrelation(&series, 10);
        assert_eq!(acf.len(), 11);
        assert_abs_diff_eq!(acf[0], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn alternating_series_is_anticorrelated_at_lag_one() {
        let series: Vec<f64> = (0..100).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let acf = autocorrelation(&series, 1);
        // Biased estimate: -(n - 1) / n.
        assert_abs_diff_eq!(acf[1], -0.99, epsilon = 1e-6);
    }

    #[test]
    fn constant_series_has_no_structure() {
        let series = vec![3.0_f64; 32];
        let acf = autocorrelation(&series, 4);
        assert_eq!(acf[0], 1.0);
        assert!(acf[1..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn acceptance_window_slides() {
        let mut window = AcceptanceWindow::new(3);
        assert_eq!(window.rate(), 0.0);
        window.record(true);
        window.record(true);
        window.record(false);
        assert_abs_diff_eq!(window.rate(), 2.0 / 3.0, epsilon = 1e-12);
        window.record(false);
        assert_abs_diff_eq!(window.rate(), 1.0 / 3.0, epsilon = 1e-12);
    }
}
