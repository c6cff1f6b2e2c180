/*!
Inverse-temperature ladder construction for parallel tempering.

A [`TemperatureLadder`] is an immutable, validated sequence of inverse
temperatures: strictly decreasing, starting at the cold rung `beta = 1`, at
least two rungs long. Ladders come from three places:

- [`TemperatureLadder::from_betas`]: the caller supplies the full ladder.
- [`TemperatureLadder::geometric`]: deterministic geometric spacing down to a
  floor `beta_min`.
- [`TemperatureLadder::adaptive`]: a stochastic-approximation search that
  places each rung so the estimated swap acceptance probability between
  adjacent rungs lands near the 0.234 optimum.

The adaptive search estimates swap probabilities by Monte Carlo: short
tempered random-walk probe chains are run on the configured target at the two
candidate temperatures, and their tempered log-densities are fed through the
same swap formula the sampler uses.
*/

use ndarray::Array1;
use num_traits::Float;
use rand::rngs::SmallRng;
use rand::Rng;
use rand_distr::{Distribution, Standard, StandardNormal};
use thiserror::Error;

use crate::distributions::Target;
use crate::parallel_tempering::swap_log_prob;

/// Validation and configuration errors for ladder construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LadderError {
    #[error("temperature ladder needs at least two rungs")]
    TooFewRungs,
    #[error("temperature ladder must start at beta = 1")]
    ColdRungMissing,
    #[error("inverse temperatures must be strictly decreasing")]
    NotStrictlyDecreasing,
    #[error("inverse temperatures must lie in (0, 1]")]
    BetaOutOfRange,
    #[error("beta_min must lie in (0, 1)")]
    InvalidFloor,
    #[error("geometric spacing ratio must lie in (0, 1)")]
    InvalidRatio,
    #[error("probe proposal variance must be positive and finite")]
    InvalidProbeVariance,
    #[error("probe initial state must have positive dimension")]
    EmptyProbeState,
    #[error("adaptive search settings must be positive")]
    InvalidSearchSettings,
}

/// An ordered, validated sequence of inverse temperatures.
///
/// Invariants (checked by every constructor): at least two rungs,
/// `betas[0] == 1`, strictly decreasing, every beta in (0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureLadder<T> {
    betas: Vec<T>,
}

impl<T: Float> TemperatureLadder<T> {
    /// Builds a ladder from an explicit list of betas.
    pub fn from_betas(betas: Vec<T>) -> Result<Self, LadderError> {
        if betas.len() < 2 {
            return Err(LadderError::TooFewRungs);
        }
        if betas[0] != T::one() {
            return Err(LadderError::ColdRungMissing);
        }
        if betas.iter().any(|&b| b <= T::zero() || b > T::one()) {
            return Err(LadderError::BetaOutOfRange);
        }
        if betas.windows(2).any(|w| w[1] >= w[0]) {
            return Err(LadderError::NotStrictlyDecreasing);
        }
        Ok(Self { betas })
    }

    /// Geometric spacing: `1, ratio, ratio², …` while above `beta_min`, with
    /// `beta_min` itself appended as the final rung.
    ///
    /// Fully deterministic; `geometric(0.5, 0.01)` yields
    /// `[1, 0.5, 0.25, 0.125, 0.0625, 0.03125, 0.015625, 0.01]`.
    pub fn geometric(ratio: T, beta_min: T) -> Result<Self, LadderError> {
        if ratio <= T::zero() || ratio >= T::one() {
            return Err(LadderError::InvalidRatio);
        }
        if beta_min <= T::zero() || beta_min >= T::one() {
            return Err(LadderError::InvalidFloor);
        }

        let mut betas = Vec::new();
        let mut curr = T::one();
        while curr > beta_min {
            betas.push(curr);
            curr = curr * ratio;
        }
        betas.push(beta_min);
        Self::from_betas(betas)
    }

    /// The betas, cold rung first.
    pub fn betas(&self) -> &[T] {
        &self.betas
    }

    pub fn num_rungs(&self) -> usize {
        self.betas.len()
    }

    /// The configured floor, i.e. the hottest rung.
    pub fn hottest(&self) -> T {
        self.betas[self.betas.len() - 1]
    }
}

/// Knobs for [`TemperatureLadder::adaptive`].
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveConfig<T> {
    /// Floor for the ladder; the search stops here and appends it. Default 0.01.
    pub beta_min: T,
    /// Base variance of the probe random-walk kernel (scaled by 1/beta per rung).
    pub proposal_variance: T,
    /// Swap acceptance rate the search aims for. Default 0.234.
    pub target_swap_rate: T,
    /// Acceptance band around the target rate. Default 0.01.
    pub tolerance: T,
    /// Probe samples drawn per candidate evaluation. Default 100.
    pub probe_samples: usize,
    /// Iteration budget per rung before the search gives up. Default 50.
    pub max_search_iters: usize,
    /// Upper bound on the number of rungs. Default 64.
    pub max_rungs: usize,
}

impl<T: Float> Default for AdaptiveConfig<T> {
    fn default() -> Self {
        Self {
            beta_min: T::from(0.01).unwrap(),
            proposal_variance: T::one(),
            target_swap_rate: T::from(0.234).unwrap(),
            tolerance: T::from(0.01).unwrap(),
            probe_samples: 100,
            max_search_iters: 50,
            max_rungs: 64,
        }
    }
}

impl<T> AdaptiveConfig<T> {
    fn validate(&self) -> Result<(), LadderError>
    where
        T: Float,
    {
        if self.beta_min <= T::zero() || self.beta_min >= T::one() {
            return Err(LadderError::InvalidFloor);
        }
        if !(self.proposal_variance > T::zero()) || !self.proposal_variance.is_finite() {
            return Err(LadderError::InvalidProbeVariance);
        }
        if self.target_swap_rate <= T::zero()
            || self.target_swap_rate >= T::one()
            || self.tolerance <= T::zero()
            || self.probe_samples == 0
            || self.max_search_iters == 0
            || self.max_rungs < 2
        {
            return Err(LadderError::InvalidSearchSettings);
        }
        Ok(())
    }
}

/// Outcome of the adaptive search: the ladder itself, whether every rung was
/// placed inside the tolerance band, and the estimated swap rate for each
/// accepted rung transition.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveLadder<T> {
    pub ladder: TemperatureLadder<T>,
    /// False when the search hit an iteration or rung budget and fell back to
    /// terminating the ladder at `beta_min` early.
    pub converged: bool,
    pub swap_rate_estimates: Vec<T>,
}

impl<T> TemperatureLadder<T>
where
    T: Float,
    StandardNormal: Distribution<T>,
    Standard: Distribution<T>,
{
    /// Iteratively constructs a ladder targeting `config.target_swap_rate`
    /// between adjacent rungs.
    ///
    /// Starting from the cold rung, the next beta is searched with a
    /// Robbins-Monro recurrence: the candidate `curr / (1 + exp(rho))` is
    /// evaluated by Monte Carlo, and `rho` moves by
    /// `(estimate − target) / sqrt(iteration)` until the estimate falls
    /// within `config.tolerance` of the target. A candidate dropping to
    /// `beta_min` ends the search; exhausting an iteration budget ends it
    /// with `converged = false`. The floor is always appended as the final
    /// rung, so the returned ladder satisfies the usual invariants either
    /// way.
    pub fn adaptive<D>(
        target: &D,
        initial_state: &Array1<T>,
        config: &AdaptiveConfig<T>,
        rng: &mut SmallRng,
    ) -> Result<AdaptiveLadder<T>, LadderError>
    where
        D: Target<T>,
    {
        config.validate()?;
        if initial_state.is_empty() {
            return Err(LadderError::EmptyProbeState);
        }

        let mut betas = vec![T::one()];
        let mut estimates = Vec::new();
        let mut converged = true;
        let mut curr = T::one();

        loop {
            if betas.len() >= config.max_rungs {
                converged = false;
                break;
            }

            let mut control = T::zero();
            let mut candidate = curr / (T::one() + control.exp());
            let mut accepted = None;
            let mut hit_floor = false;

            for iter in 1..=config.max_search_iters {
                if candidate <= config.beta_min {
                    hit_floor = true;
                    break;
                }
                let estimate =
                    average_swap_probability(target, initial_state, curr, candidate, config, rng);
                if (estimate - config.target_swap_rate).abs() <= config.tolerance {
                    accepted = Some((candidate, estimate));
                    break;
                }
                control = control
                    + (estimate - config.target_swap_rate) / T::from(iter).unwrap().sqrt();
                candidate = curr / (T::one() + control.exp());
            }

            match accepted {
                Some((beta, estimate)) => {
                    betas.push(beta);
                    estimates.push(estimate);
                    curr = beta;
                }
                None => {
                    if !hit_floor {
                        converged = false;
                    }
                    break;
                }
            }
        }

        // Accepted rungs are always strictly above the floor, so appending it
        // keeps the ladder strictly decreasing.
        betas.push(config.beta_min);
        let ladder = Self::from_betas(betas)?;
        Ok(AdaptiveLadder {
            ladder,
            converged,
            swap_rate_estimates: estimates,
        })
    }
}

/// Estimates the average swap acceptance probability between tempered chains
/// at `beta_a` and `beta_b` from paired probe draws.
fn average_swap_probability<T, D>(
    target: &D,
    initial_state: &Array1<T>,
    beta_a: T,
    beta_b: T,
    config: &AdaptiveConfig<T>,
    rng: &mut SmallRng,
) -> T
where
    T: Float,
    D: Target<T>,
    StandardNormal: Distribution<T>,
    Standard: Distribution<T>,
{
    let lp_a = probe_log_probs(target, initial_state, beta_a, config, rng);
    let lp_b = probe_log_probs(target, initial_state, beta_b, config, rng);

    let mut acc = T::zero();
    for (&la, &lb) in lp_a.iter().zip(lp_b.iter()) {
        let log_swap = swap_log_prob(beta_a, beta_b, la, lb);
        let prob = if log_swap >= T::zero() {
            T::one()
        } else {
            log_swap.exp()
        };
        // Both probes outside the support gives NaN; count it as a rejection.
        if !prob.is_nan() {
            acc = acc + prob;
        }
    }
    acc / T::from(config.probe_samples).unwrap()
}

/// Runs a short tempered random-walk probe chain at `beta` and records the
/// target log-density of every visited state.
fn probe_log_probs<T, D>(
    target: &D,
    initial_state: &Array1<T>,
    beta: T,
    config: &AdaptiveConfig<T>,
    rng: &mut SmallRng,
) -> Vec<T>
where
    T: Float,
    D: Target<T>,
    StandardNormal: Distribution<T>,
    Standard: Distribution<T>,
{
    let sigma = (config.proposal_variance / beta).sqrt();
    let mut current = initial_state.clone();
    let mut lp_curr = target.unnorm_log_prob(&current);
    let mut out = Vec::with_capacity(config.probe_samples);

    for _ in 0..config.probe_samples {
        let proposed = current.mapv(|x| x + sigma * rng.sample(StandardNormal));
        let lp_prop = target.unnorm_log_prob(&proposed);
        let log_ratio = beta * (lp_prop - lp_curr);
        if log_ratio > T::zero() || rng.gen::<T>() < log_ratio.exp() {
            current = proposed;
            lp_curr = lp_prop;
        }
        out.push(lp_curr);
    }
    out
}
