/*!
Target and proposal distributions for random-walk samplers.

The traits here are the seams between the samplers and the probability model:
[`Target`] supplies an unnormalized log-density, [`Proposal`] generates
candidate states and evaluates its own transition density, and [`Normalized`]
marks distributions that additionally expose a properly normalized
log-density (useful for diagnostics).

All densities are evaluated in log space; a state outside a distribution's
support yields `-inf`, which the samplers treat as "always reject".

# Examples

```rust
use pt_mcmc::distributions::{Gaussian2D, IsotropicGaussian, Normalized, Proposal};
use ndarray::{arr1, arr2};

let gauss = Gaussian2D {
    mean: arr1(&[0.0, 0.0]),
    cov: arr2(&[[1.0, 0.0], [0.0, 1.0]]),
};
let logp = gauss.log_prob(&arr1(&[0.5, -0.5]));
assert!(logp < 0.0);

let mut proposal: IsotropicGaussian<f64> = IsotropicGaussian::new(1.0).set_seed(42);
let candidate = proposal.sample(&arr1(&[0.0, 0.0]));
assert_eq!(candidate.len(), 2);
```
*/

use ndarray::{Array1, Array2};
use num_traits::Float;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use std::f64::consts::PI;

/// A continuous target distribution to sample from, evaluated in log space.
pub trait Target<T: Float> {
    /// Returns the log of the (possibly unnormalized) density at `theta`.
    ///
    /// States outside the support must return `T::neg_infinity()`, never panic.
    fn unnorm_log_prob(&self, theta: &Array1<T>) -> T;
}

/// A proposal kernel for Metropolis–Hastings style samplers.
pub trait Proposal<T: Float> {
    /// Samples a candidate state from q(x' | x).
    fn sample(&mut self, current: &Array1<T>) -> Array1<T>;

    /// Evaluates log q(`to` | `from`).
    fn log_prob(&self, from: &Array1<T>, to: &Array1<T>) -> T;

    /// Returns this proposal reseeded with `seed`.
    fn set_seed(self, seed: u64) -> Self;
}

/// Distributions that expose a fully normalized log-density.
pub trait Normalized<T: Float> {
    /// Returns the normalized log-density at `theta`.
    fn log_prob(&self, theta: &Array1<T>) -> T;
}

/// Log-density of an isotropic Gaussian centered at `center` with standard
/// deviation `std`, evaluated at `x`. Shared by the proposal kernel and the
/// tempered acceptance ratio.
pub(crate) fn isotropic_gauss_log_prob<T: Float>(center: &Array1<T>, x: &Array1<T>, std: T) -> T {
    let half = T::from(0.5).unwrap();
    let two = T::from(2.0).unwrap();
    let pi = T::from(PI).unwrap();
    let var = std * std;
    let d = T::from(center.len()).unwrap();
    let sq_dist = center.iter().zip(x.iter()).fold(T::zero(), |acc, (&c, &v)| {
        let diff = v - c;
        acc + diff * diff
    });
    -half * sq_dist / var - d * half * (two * pi * var).ln()
}

/// Numerically stable log(sum(exp(terms))).
pub(crate) fn log_sum_exp<T: Float>(terms: &[T]) -> T {
    let max = terms.iter().cloned().fold(T::neg_infinity(), T::max);
    if !max.is_finite() {
        return max;
    }
    let sum = terms.iter().fold(T::zero(), |acc, &t| acc + (t - max).exp());
    max + sum.ln()
}

/// A 2D Gaussian with a full 2×2 covariance matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Gaussian2D<T: Float> {
    pub mean: Array1<T>,
    pub cov: Array2<T>,
}

impl<T: Float> Gaussian2D<T> {
    /// Quadratic form (theta - mean)ᵀ Σ⁻¹ (theta - mean) and log|Σ|,
    /// via the explicit 2×2 inverse.
    fn quad_and_log_det(&self, theta: &Array1<T>) -> (T, T) {
        let (a, b, c, d) = (
            self.cov[(0, 0)],
            self.cov[(0, 1)],
            self.cov[(1, 0)],
            self.cov[(1, 1)],
        );
        let det = a * d - b * c;
        let dx = theta[0] - self.mean[0];
        let dy = theta[1] - self.mean[1];
        let quad = (d * dx * dx - (b + c) * dx * dy + a * dy * dy) / det;
        (quad, det.abs().ln())
    }
}

impl<T: Float> Target<T> for Gaussian2D<T> {
    fn unnorm_log_prob(&self, theta: &Array1<T>) -> T {
        let (quad, _) = self.quad_and_log_det(theta);
        -T::from(0.5).unwrap() * quad
    }
}

impl<T: Float> Normalized<T> for Gaussian2D<T> {
    fn log_prob(&self, theta: &Array1<T>) -> T {
        let half = T::from(0.5).unwrap();
        let (quad, log_det) = self.quad_and_log_det(theta);
        let two_pi = T::from(2.0 * PI).unwrap();
        -two_pi.ln() - half * log_det - half * quad
    }
}

/// An isotropic Gaussian, usable both as a random-walk proposal kernel and as
/// a simple zero-mean target.
#[derive(Debug, Clone)]
pub struct IsotropicGaussian<T: Float> {
    pub std: T,
    rng: SmallRng,
}

impl<T: Float> IsotropicGaussian<T> {
    /// Creates a proposal adding N(0, std²) noise to every coordinate.
    pub fn new(std: T) -> Self {
        Self {
            std,
            rng: SmallRng::from_entropy(),
        }
    }
}

impl<T: Float> Proposal<T> for IsotropicGaussian<T>
where
    StandardNormal: Distribution<T>,
{
    fn sample(&mut self, current: &Array1<T>) -> Array1<T> {
        let std = self.std;
        let rng = &mut self.rng;
        current.mapv(|x| x + std * rng.sample(StandardNormal))
    }

    fn log_prob(&self, from: &Array1<T>, to: &Array1<T>) -> T {
        isotropic_gauss_log_prob(from, to, self.std)
    }

    fn set_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }
}

impl<T: Float> Target<T> for IsotropicGaussian<T> {
    fn unnorm_log_prob(&self, theta: &Array1<T>) -> T {
        let sq = theta.iter().fold(T::zero(), |acc, &x| acc + x * x);
        -T::from(0.5).unwrap() * sq / (self.std * self.std)
    }
}

/// A mixture of isotropic Gaussian components, the canonical multi-modal
/// target for tempered samplers.
///
/// Weights are normalized to sum to one at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianMixture<T: Float> {
    weights: Vec<T>,
    means: Vec<Array1<T>>,
    stds: Vec<T>,
}

impl<T: Float> GaussianMixture<T> {
    pub fn new(weights: Vec<T>, means: Vec<Array1<T>>, stds: Vec<T>) -> Self {
        assert_eq!(weights.len(), means.len());
        assert_eq!(weights.len(), stds.len());
        assert!(!weights.is_empty());
        let total = weights.iter().cloned().fold(T::zero(), |acc, w| acc + w);
        let weights = weights.into_iter().map(|w| w / total).collect();
        Self {
            weights,
            means,
            stds,
        }
    }

    /// Equally weighted components sharing one standard deviation.
    pub fn isotropic(means: Vec<Array1<T>>, std: T) -> Self {
        let k = means.len();
        let stds = vec![std; k];
        Self::new(vec![T::one(); k], means, stds)
    }

    pub fn means(&self) -> &[Array1<T>] {
        &self.means
    }
}

impl<T: Float> Target<T> for GaussianMixture<T> {
    fn unnorm_log_prob(&self, theta: &Array1<T>) -> T {
        let terms: Vec<T> = self
            .weights
            .iter()
            .zip(self.means.iter().zip(self.stds.iter()))
            .map(|(&w, (mean, &std))| w.ln() + isotropic_gauss_log_prob(mean, theta, std))
            .collect();
        log_sum_exp(&terms)
    }
}

/// Uniform density on the axis-aligned box `[lower, upper]^dim`; zero density
/// (log-density `-inf`) outside.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hypercube<T: Float> {
    pub lower: T,
    pub upper: T,
}

impl<T: Float> Target<T> for Hypercube<T> {
    fn unnorm_log_prob(&self, theta: &Array1<T>) -> T {
        let inside = theta.iter().all(|&x| x >= self.lower && x <= self.upper);
        if inside {
            T::zero()
        } else {
            T::neg_infinity()
        }
    }
}
