/*!
# Parallel Tempering Random Walk Metropolis

Runs one random-walk Metropolis chain per rung of a [`TemperatureLadder`],
where rung `i` samples the target density raised to the power `beta_i`. Hot
rungs (small beta) see a flattened landscape and propose with inflated
variance (`variance / beta`), so they cross between modes easily; periodic
swap attempts between adjacent rungs let those excursions propagate down to
the cold rung, whose chain samples the unmodified target.

Execution is single threaded and synchronous: one [`ParallelTempering::step`]
fully completes before the next begins, and all randomness comes from one
owned, seedable generator.

## Example

```rust
use pt_mcmc::distributions::Gaussian2D;
use pt_mcmc::ladder::TemperatureLadder;
use pt_mcmc::parallel_tempering::ParallelTempering;
use ndarray::{arr1, arr2};

let target = Gaussian2D {
    mean: arr1(&[0.0, 0.0]),
    cov: arr2(&[[1.0, 0.0], [0.0, 1.0]]),
};
let ladder = TemperatureLadder::from_betas(vec![1.0, 0.5, 0.1]).unwrap();
let mut pt = ParallelTempering::new(target, &[0.0, 0.0], 1.0, true, ladder)
    .unwrap()
    .set_seed(42);

// 100 global steps, attempting swaps on every 5th.
let cold_samples = pt.run(100, 5).unwrap();
assert_eq!(cold_samples.ncols(), 2);
```
*/

use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{Array1, Array2};
use num_traits::Float;
use rand::rngs::SmallRng;
use rand::{thread_rng, Rng, SeedableRng};
use rand_distr::{Distribution, Standard, StandardNormal};

use crate::core::{Chain, SamplerError};
use crate::distributions::{isotropic_gauss_log_prob, Target};
use crate::ladder::TemperatureLadder;
use crate::stats::AcceptanceWindow;

/// Running totals for swap attempts between adjacent rungs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwapStats {
    pub attempts: u64,
    pub acceptances: u64,
}

impl SwapStats {
    /// Fraction of attempted swaps that were accepted; 0 before any attempt.
    pub fn acceptance_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.acceptances as f64 / self.attempts as f64
        }
    }
}

/// Log-probability of exchanging the current states of rungs `j` (colder,
/// larger beta) and `k` (hotter): `beta_j*lp_k + beta_k*lp_j - beta_j*lp_j -
/// beta_k*lp_k`, where `lp` is the target log-density of each rung's state.
///
/// Non-finite log-densities flow through: a state outside the support makes
/// the result `-inf` or `NaN`, both of which fail the acceptance test.
pub(crate) fn swap_log_prob<T: Float>(beta_j: T, beta_k: T, lp_j: T, lp_k: T) -> T {
    beta_j * lp_k + beta_k * lp_j - beta_j * lp_j - beta_k * lp_k
}

/// The parallel tempering sampler.
///
/// Holds one append-only [`Chain`] per ladder rung, all seeded from a deep
/// copy of the same initial state, plus the swap bookkeeping. The ladder and
/// the target are read-only once constructed; only the chains, the swap
/// counters, and the RNG mutate during stepping.
#[derive(Debug, Clone)]
pub struct ParallelTempering<T, D> {
    target: D,
    proposal_variance: T,
    symmetric: bool,
    ladder: TemperatureLadder<T>,
    initial_state: Array1<T>,
    chains: Vec<Chain<T>>,
    swap_stats: SwapStats,
    seed: u64,
    rng: SmallRng,
}

impl<T, D> ParallelTempering<T, D>
where
    T: Float,
    D: Target<T>,
    StandardNormal: Distribution<T>,
    Standard: Distribution<T>,
{
    /// Creates a sampler with one chain per rung of `ladder`, each starting
    /// from a copy of `initial_state`.
    ///
    /// `proposal_variance` is the base variance of the isotropic Gaussian
    /// random-walk kernel; rung `i` proposes with `proposal_variance /
    /// beta_i`. With `symmetric` set, the acceptance ratio uses the plain
    /// Metropolis form; otherwise the proposal-density correction of the full
    /// Metropolis–Hastings ratio is included (it cancels for this kernel).
    pub fn new(
        target: D,
        initial_state: &[T],
        proposal_variance: T,
        symmetric: bool,
        ladder: TemperatureLadder<T>,
    ) -> Result<Self, SamplerError> {
        if initial_state.is_empty() {
            return Err(SamplerError::EmptyState);
        }
        if !(proposal_variance > T::zero()) || !proposal_variance.is_finite() {
            return Err(SamplerError::InvalidVariance);
        }

        let initial = Array1::from(initial_state.to_vec());
        let chains = ladder
            .betas()
            .iter()
            .map(|_| Chain::new(initial.clone()))
            .collect();
        let seed = thread_rng().gen::<u64>();

        Ok(Self {
            target,
            proposal_variance,
            symmetric,
            ladder,
            initial_state: initial,
            chains,
            swap_stats: SwapStats::default(),
            seed,
            rng: SmallRng::seed_from_u64(seed),
        })
    }

    /// Reseeds the sampler's random source for reproducible runs.
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    /// Advances every rung by one global step.
    ///
    /// With `swap` unset, every rung performs an independent local move and
    /// appends exactly one state. With `swap` set, each rung `i` except the
    /// last attempts a state exchange with rung `i + 1` (sweeping coldest to
    /// hottest) while the last rung still moves locally.
    ///
    /// Note the growth asymmetry, a deliberate policy: a swap replaces the
    /// last states of the pair in place and appends nothing, so under a
    /// swapping regime only the last rung grows on swap steps and chain
    /// lengths across rungs diverge. Callers that need aligned lengths must
    /// interleave local-move steps accordingly.
    pub fn step(&mut self, swap: bool) {
        let num_rungs = self.chains.len();
        for i in 0..num_rungs {
            if swap && i + 1 < num_rungs {
                self.attempt_swap(i, i + 1);
            } else {
                self.local_move(i);
            }
        }
    }

    /// One tempered random-walk Metropolis update for rung `i`.
    ///
    /// Appends the proposal on acceptance and a copy of the current state on
    /// rejection, so the chain grows by exactly one either way.
    fn local_move(&mut self, i: usize) {
        let beta = self.ladder.betas()[i];
        let sigma = (self.proposal_variance / beta).sqrt();
        let current = self.chains[i].last().clone();

        let rng = &mut self.rng;
        let proposed = current.mapv(|x| x + sigma * rng.sample(StandardNormal));

        let log_ratio = self.log_accept_prob(&proposed, &current, beta);
        // A NaN or -inf ratio fails both branches: zero-density proposals are
        // rejected, never fatal.
        if log_ratio > T::zero() || self.rng.gen::<T>() < log_ratio.exp() {
            self.chains[i].push(proposed);
        } else {
            self.chains[i].push(current);
        }
    }

    /// Tempered acceptance log-ratio for a proposed move at inverse
    /// temperature `beta`.
    fn log_accept_prob(&self, proposed: &Array1<T>, current: &Array1<T>, beta: T) -> T {
        let delta =
            self.target.unnorm_log_prob(proposed) - self.target.unnorm_log_prob(current);
        if self.symmetric {
            beta * delta
        } else {
            let sigma = (self.proposal_variance / beta).sqrt();
            let log_q_backward = isotropic_gauss_log_prob(proposed, current, sigma);
            let log_q_forward = isotropic_gauss_log_prob(current, proposed, sigma);
            beta * (delta + (log_q_backward - log_q_forward))
        }
    }

    /// Attempts to exchange the current states of adjacent rungs `j` and `k`.
    ///
    /// The exchange is a true value swap of the two chains' last states; the
    /// chains own independent copies afterwards. Every call increments the
    /// attempt counter; only an accepted exchange increments the acceptance
    /// counter.
    fn attempt_swap(&mut self, j: usize, k: usize) {
        debug_assert_eq!(k, j + 1);
        let beta_j = self.ladder.betas()[j];
        let beta_k = self.ladder.betas()[k];
        let lp_j = self.target.unnorm_log_prob(self.chains[j].last());
        let lp_k = self.target.unnorm_log_prob(self.chains[k].last());
        let log_swap = swap_log_prob(beta_j, beta_k, lp_j, lp_k);

        self.swap_stats.attempts += 1;
        if log_swap >= T::zero() || self.rng.gen::<T>() < log_swap.exp() {
            let (colder, hotter) = self.chains.split_at_mut(k);
            std::mem::swap(colder[j].last_mut(), hotter[0].last_mut());
            self.swap_stats.acceptances += 1;
        }
    }

    /// Performs `n_steps` global steps, attempting swaps on every
    /// `swap_interval`-th step (1-based; 0 disables swapping), and returns the
    /// cold chain's history as a `[len, dim]` array.
    ///
    /// Fails with [`SamplerError::AlreadyRun`] if any chain has already grown;
    /// call [`ParallelTempering::reset`] first to start a fresh run.
    pub fn run(&mut self, n_steps: usize, swap_interval: usize) -> Result<Array2<T>, SamplerError> {
        if self.has_run() {
            return Err(SamplerError::AlreadyRun);
        }
        for i in 1..=n_steps {
            let swap = swap_interval > 0 && i % swap_interval == 0;
            self.step(swap);
        }
        Ok(self.cold_chain().to_array())
    }

    /// Like [`ParallelTempering::run`], with a progress bar showing the
    /// running swap acceptance rate and a windowed local acceptance estimate
    /// for the cold chain.
    pub fn run_progress(
        &mut self,
        n_steps: usize,
        swap_interval: usize,
    ) -> Result<Array2<T>, SamplerError> {
        if self.has_run() {
            return Err(SamplerError::AlreadyRun);
        }

        let pb = ProgressBar::new(n_steps as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{prefix:8} {bar:40.white} ETA {eta:3} | {msg}")
                .expect("progress bar template is valid")
                .progress_chars("=>-"),
        );
        pb.set_prefix("PT-RWM");

        let mut accept_window = AcceptanceWindow::new(100);
        for i in 1..=n_steps {
            let swap = swap_interval > 0 && i % swap_interval == 0;
            self.step(swap);
            if !swap {
                let states = self.cold_chain().states();
                let n = states.len();
                accept_window.record(states[n - 1] != states[n - 2]);
            }
            pb.set_message(format!(
                "swap rate {:.2} | local accept {:.2}",
                self.swap_stats.acceptance_rate(),
                accept_window.rate()
            ));
            pb.inc(1);
        }
        pb.finish();

        Ok(self.cold_chain().to_array())
    }

    /// Whether any chain has grown beyond its seed state.
    pub fn has_run(&self) -> bool {
        self.chains.iter().any(|chain| chain.len() > 1)
    }

    /// Restores every chain to the shared initial state, clears the swap
    /// statistics, and reseeds the random source from the stored seed, so a
    /// rerun reproduces the previous one exactly.
    pub fn reset(&mut self) {
        for chain in &mut self.chains {
            *chain = Chain::new(self.initial_state.clone());
        }
        self.swap_stats = SwapStats::default();
        self.rng = SmallRng::seed_from_u64(self.seed);
    }

    /// The chain at `beta = 1`, whose samples target the unmodified density.
    pub fn cold_chain(&self) -> &Chain<T> {
        &self.chains[0]
    }

    /// All chains, coldest first, aligned with the ladder.
    pub fn chains(&self) -> &[Chain<T>] {
        &self.chains
    }

    pub fn ladder(&self) -> &TemperatureLadder<T> {
        &self.ladder
    }

    pub fn target(&self) -> &D {
        &self.target
    }

    pub fn swap_stats(&self) -> SwapStats {
        self.swap_stats
    }

    pub fn swap_acceptance_rate(&self) -> f64 {
        self.swap_stats.acceptance_rate()
    }

    pub fn num_swap_attempts(&self) -> u64 {
        self.swap_stats.attempts
    }

    pub fn num_swap_acceptances(&self) -> u64 {
        self.swap_stats.acceptances
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::{Gaussian2D, Hypercube, IsotropicGaussian};
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, arr2};

    fn three_rung_ladder() -> TemperatureLadder<f64> {
        TemperatureLadder::from_betas(vec![1.0, 0.5, 0.1]).unwrap()
    }

    fn gaussian_sampler(seed: u64) -> ParallelTempering<f64, IsotropicGaussian<f64>> {
        ParallelTempering::new(
            IsotropicGaussian::new(1.0),
            &[0.0, 0.0],
            1.0,
            true,
            three_rung_ladder(),
        )
        .unwrap()
        .set_seed(seed)
    }

    #[test]
    fn swap_log_prob_formula() {
        // 1*(-3) + 0.5*(-1) - 1*(-1) - 0.5*(-3) = -1.
        assert_abs_diff_eq!(swap_log_prob(1.0, 0.5, -1.0, -3.0), -1.0, epsilon = 1e-12);
        // Swapping identical states is always free.
        assert_abs_diff_eq!(swap_log_prob(1.0, 0.5, -2.0, -2.0), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn local_step_appends_exactly_one_state_per_rung() {
        let mut pt = gaussian_sampler(1);
        for _ in 0..3 {
            pt.step(false);
        }
        for chain in pt.chains() {
            assert_eq!(chain.len(), 4);
        }
        assert_eq!(pt.num_swap_attempts(), 0);
    }

    #[test]
    fn swap_step_only_grows_last_rung() {
        // A swap replaces last states without appending, so on a swap step
        // only the final rung performs a local move and grows.
        let mut pt = gaussian_sampler(2);
        pt.step(true);
        assert_eq!(pt.chains()[0].len(), 1);
        assert_eq!(pt.chains()[1].len(), 1);
        assert_eq!(pt.chains()[2].len(), 2);
        assert_eq!(pt.num_swap_attempts(), 2);
    }

    #[test]
    fn constant_density_always_accepts() {
        // Flat density: every acceptance log-ratio is exactly zero, so every
        // proposal must be taken and the chain never repeats a state.
        let target = Hypercube {
            lower: -1e12,
            upper: 1e12,
        };
        let ladder = TemperatureLadder::from_betas(vec![1.0, 0.5]).unwrap();
        let mut pt = ParallelTempering::new(target, &[0.0, 0.0], 1.0, true, ladder)
            .unwrap()
            .set_seed(3);
        for _ in 0..50 {
            pt.step(false);
        }
        let states = pt.cold_chain().states();
        assert_eq!(states.len(), 51);
        for pair in states.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[test]
    fn swap_exchange_is_a_true_value_swap() {
        let target = Hypercube {
            lower: -1e12,
            upper: 1e12,
        };
        let ladder = TemperatureLadder::from_betas(vec![1.0, 0.5]).unwrap();
        let mut pt = ParallelTempering::new(target, &[0.0, 0.0], 1.0, true, ladder)
            .unwrap()
            .set_seed(4);

        *pt.chains[0].last_mut() = arr1(&[1.0, 1.0]);
        *pt.chains[1].last_mut() = arr1(&[2.0, 2.0]);

        // Flat density makes the swap log-probability exactly zero: accepted.
        pt.attempt_swap(0, 1);
        assert_eq!(pt.swap_stats(), SwapStats { attempts: 1, acceptances: 1 });
        assert_eq!(pt.chains()[0].last(), &arr1(&[2.0, 2.0]));
        assert_eq!(pt.chains()[1].last(), &arr1(&[1.0, 1.0]));

        // The exchanged states are independent copies.
        pt.chains[0].last_mut()[0] = 99.0;
        assert_eq!(pt.chains()[1].last(), &arr1(&[1.0, 1.0]));
    }

    #[test]
    fn swap_with_state_outside_support_is_rejected() {
        let target = Hypercube {
            lower: -1.0,
            upper: 1.0,
        };
        let ladder = TemperatureLadder::from_betas(vec![1.0, 0.5]).unwrap();
        let mut pt = ParallelTempering::new(target, &[0.0, 0.0], 1.0, true, ladder)
            .unwrap()
            .set_seed(5);

        *pt.chains[1].last_mut() = arr1(&[5.0, 5.0]);
        pt.attempt_swap(0, 1);

        assert_eq!(pt.swap_stats(), SwapStats { attempts: 1, acceptances: 0 });
        assert_eq!(pt.chains()[0].last(), &arr1(&[0.0, 0.0]));
        assert_eq!(pt.chains()[1].last(), &arr1(&[5.0, 5.0]));
    }

    #[test]
    fn acceptance_rate_matches_counters() {
        let target = Gaussian2D {
            mean: arr1(&[0.0, 0.0]),
            cov: arr2(&[[1.0, 0.0], [0.0, 1.0]]),
        };
        let mut pt = ParallelTempering::new(target, &[0.0, 0.0], 1.0, true, three_rung_ladder())
            .unwrap()
            .set_seed(6);
        pt.run(200, 5).unwrap();

        let stats = pt.swap_stats();
        // 40 swap steps, two adjacent pairs each.
        assert_eq!(stats.attempts, 80);
        assert!(stats.acceptances <= stats.attempts);
        assert_abs_diff_eq!(
            pt.swap_acceptance_rate(),
            stats.acceptances as f64 / stats.attempts as f64,
            epsilon = 1e-15
        );
    }

    #[test]
    fn rerun_requires_reset_and_reset_reproduces() {
        let mut pt = gaussian_sampler(7);
        let first = pt.run(50, 5).unwrap();
        assert!(matches!(pt.run(50, 5), Err(SamplerError::AlreadyRun)));

        pt.reset();
        assert!(!pt.has_run());
        assert_eq!(pt.num_swap_attempts(), 0);
        let second = pt.run(50, 5).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn symmetric_and_full_ratios_agree_for_gaussian_kernel() {
        let mut pt = gaussian_sampler(8);
        let current = arr1(&[0.3, -0.7]);
        let proposed = arr1(&[1.1, 0.2]);

        pt.symmetric = true;
        let simplified = pt.log_accept_prob(&proposed, &current, 0.5);
        pt.symmetric = false;
        let full = pt.log_accept_prob(&proposed, &current, 0.5);

        assert_abs_diff_eq!(simplified, full, epsilon = 1e-10);
    }

    #[test]
    fn construction_validates_configuration() {
        let target = IsotropicGaussian::new(1.0);
        let err = ParallelTempering::new(target.clone(), &[], 1.0, true, three_rung_ladder())
            .unwrap_err();
        assert!(matches!(err, SamplerError::EmptyState));

        let err = ParallelTempering::new(target, &[0.0], 0.0, true, three_rung_ladder())
            .unwrap_err();
        assert!(matches!(err, SamplerError::InvalidVariance));
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let mut a = gaussian_sampler(9);
        let mut b = gaussian_sampler(9);
        assert_eq!(a.run(100, 4).unwrap(), b.run(100, 4).unwrap());
    }

    #[test]
    fn chains_start_from_shared_seed_state() {
        let pt = ParallelTempering::new(
            IsotropicGaussian::new(1.0),
            &[1.5, -2.5],
            1.0,
            true,
            three_rung_ladder(),
        )
        .unwrap();
        assert_eq!(pt.chains().len(), 3);
        for chain in pt.chains() {
            assert_eq!(chain.len(), 1);
            assert_eq!(chain.last(), &arr1(&[1.5, -2.5]));
        }
    }
}
