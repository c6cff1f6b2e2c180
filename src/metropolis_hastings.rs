/*!
# Metropolis–Hastings Sampler

A generic random-walk Metropolis–Hastings sampler over any target `D:
Target` and proposal `Q: Proposal`. The sampler owns several independent
Markov chains, all initialized with the same starting state; the
[`ChainRunner`](crate::core::ChainRunner) trait runs them in parallel and
gathers their samples. A global seed makes runs reproducible: chain `i`
derives its own seed as `seed + i`, and each chain's proposal stream is
decorrelated from its acceptance stream.

This is the non-tempered baseline next to
[`ParallelTempering`](crate::parallel_tempering::ParallelTempering): on a
well-connected unimodal target it is all you need, while on multi-modal
targets its chains tend to get trapped in whichever mode they started in.

## Example

```rust
use pt_mcmc::core::ChainRunner;
use pt_mcmc::distributions::{Gaussian2D, IsotropicGaussian};
use pt_mcmc::metropolis_hastings::MetropolisHastings;
use ndarray::{arr1, arr2};

let target = Gaussian2D {
    mean: arr1(&[0.0, 0.0]),
    cov: arr2(&[[1.0, 0.0], [0.0, 1.0]]),
};
let proposal = IsotropicGaussian::new(1.0);
let mut mh = MetropolisHastings::new(target, proposal, &[0.0, 0.0], 4).set_seed(42);

// 4 chains, 1000 kept steps each, 100 burn-in steps discarded.
let samples = mh.run(1000, 100).unwrap();
assert_eq!(samples.shape(), &[4, 1000, 2]);
```
*/

use ndarray::Array1;
use num_traits::Float;
use rand::prelude::*;
use rand_distr::{Distribution, Standard};

use crate::core::{HasChains, MarkovChain};
use crate::distributions::{Proposal, Target};

/// XOR'd into a chain's seed to give its proposal kernel an independent
/// stream from the chain's own accept/reject draws.
const PROPOSAL_SEED_MASK: u64 = 0x9E37_79B9_7F4A_7C15;

/// Metropolis–Hastings sampler holding multiple independent chains.
#[derive(Debug, Clone)]
pub struct MetropolisHastings<T, D, Q> {
    /// The target distribution to sample from.
    pub target: D,
    /// The proposal kernel generating candidate states.
    pub proposal: Q,
    /// The independent Markov chains.
    pub chains: Vec<MHMarkovChain<T, D, Q>>,
    /// The global random seed.
    pub seed: u64,
}

/// A single Metropolis–Hastings chain with its own RNG and proposal stream.
#[derive(Debug, Clone)]
pub struct MHMarkovChain<T, D, Q> {
    pub target: D,
    pub proposal: Q,
    pub current_state: Array1<T>,
    pub seed: u64,
    pub rng: SmallRng,
}

impl<T, D, Q> MetropolisHastings<T, D, Q>
where
    T: Float + Send,
    D: Target<T> + Clone + Send,
    Q: Proposal<T> + Clone + Send,
    Standard: Distribution<T>,
{
    /// Creates a sampler with `n_chains` chains, all starting at
    /// `initial_state`.
    pub fn new(target: D, proposal: Q, initial_state: &[T], n_chains: usize) -> Self {
        let chains = (0..n_chains)
            .map(|_| MHMarkovChain::new(target.clone(), proposal.clone(), initial_state))
            .collect();
        let seed = thread_rng().gen::<u64>();

        Self {
            target,
            proposal,
            chains,
            seed,
        }
    }

    /// Sets the global seed; chain `i` is reseeded with `seed + i` and its
    /// proposal with a masked variant of that.
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        for (i, chain) in self.chains.iter_mut().enumerate() {
            let chain_seed = seed + i as u64;
            chain.seed = chain_seed;
            chain.rng = SmallRng::seed_from_u64(chain_seed);
            chain.proposal = chain
                .proposal
                .clone()
                .set_seed(chain_seed ^ PROPOSAL_SEED_MASK);
        }
        self
    }
}

impl<T, D, Q> HasChains<T> for MetropolisHastings<T, D, Q>
where
    T: Float + Send,
    D: Target<T> + Clone + Send,
    Q: Proposal<T> + Clone + Send,
    Standard: Distribution<T>,
{
    type Chain = MHMarkovChain<T, D, Q>;

    fn chains_mut(&mut self) -> &mut Vec<Self::Chain> {
        &mut self.chains
    }
}

impl<T, D, Q> MHMarkovChain<T, D, Q>
where
    T: Float,
    D: Target<T>,
    Q: Proposal<T>,
{
    pub fn new(target: D, proposal: Q, initial_state: &[T]) -> Self {
        let seed = thread_rng().gen::<u64>();
        Self {
            target,
            proposal,
            current_state: Array1::from(initial_state.to_vec()),
            seed,
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl<T, D, Q> MarkovChain<T> for MHMarkovChain<T, D, Q>
where
    T: Float,
    D: Target<T>,
    Q: Proposal<T>,
    Standard: Distribution<T>,
{
    /// One Metropolis–Hastings update: propose, compute the log acceptance
    /// ratio (target and proposal terms), accept if `log(u) < log_ratio`.
    fn step(&mut self) -> &Array1<T> {
        let proposed = self.proposal.sample(&self.current_state);
        let current_lp = self.target.unnorm_log_prob(&self.current_state);
        let proposed_lp = self.target.unnorm_log_prob(&proposed);
        let log_q_forward = self.proposal.log_prob(&self.current_state, &proposed);
        let log_q_backward = self.proposal.log_prob(&proposed, &self.current_state);
        let log_accept_ratio = (proposed_lp + log_q_backward) - (current_lp + log_q_forward);
        let u: T = self.rng.gen();
        if log_accept_ratio > u.ln() {
            self.current_state = proposed;
        }
        &self.current_state
    }

    fn current_state(&self) -> &Array1<T> {
        &self.current_state
    }
}
