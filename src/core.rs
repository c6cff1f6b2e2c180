use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use ndarray::{s, Array1, Array2, Array3, Axis};
use num_traits::Float;
use rayon::prelude::*;
use thiserror::Error;

/// Errors shared by the samplers in this crate.
#[derive(Debug, Error)]
pub enum SamplerError {
    /// A run was requested while the chains already hold generated samples.
    #[error("sampler already holds generated samples; call reset() before running again")]
    AlreadyRun,
    /// The initial state has dimension zero.
    #[error("state dimension must be positive")]
    EmptyState,
    /// The proposal variance is not a positive finite number.
    #[error("proposal variance must be positive and finite")]
    InvalidVariance,
    #[error("failed to assemble sample array: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error(transparent)]
    Ladder(#[from] crate::ladder::LadderError),
}

/// The full history of one Markov chain: an append-only sequence of states.
///
/// A chain is created holding its seed state and never becomes shorter, so
/// [`Chain::last`] is always defined. Growth happens through the samplers
/// only: a local move appends exactly one state per step, and a swap replaces
/// the last states of two chains without appending.
#[derive(Debug, Clone, PartialEq)]
pub struct Chain<T> {
    states: Vec<Array1<T>>,
}

impl<T: Float> Chain<T> {
    /// Creates a chain seeded with `initial`.
    pub fn new(initial: Array1<T>) -> Self {
        Self {
            states: vec![initial],
        }
    }

    /// Dimension of the states in this chain.
    pub fn dim(&self) -> usize {
        self.states[0].len()
    }

    /// Number of states recorded so far (at least 1).
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// The current state of the chain.
    pub fn last(&self) -> &Array1<T> {
        self.states.last().expect("chain holds at least its seed state")
    }

    pub(crate) fn last_mut(&mut self) -> &mut Array1<T> {
        self.states.last_mut().expect("chain holds at least its seed state")
    }

    pub(crate) fn push(&mut self, state: Array1<T>) {
        debug_assert_eq!(state.len(), self.dim());
        self.states.push(state);
    }

    /// All recorded states, oldest first.
    pub fn states(&self) -> &[Array1<T>] {
        &self.states
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Array1<T>> {
        self.states.iter()
    }

    /// Copies the history into a `[len, dim]` array.
    pub fn to_array(&self) -> Array2<T> {
        let views: Vec<_> = self.states.iter().map(|state| state.view()).collect();
        ndarray::stack(Axis(0), &views).expect("chain states share a single dimension")
    }
}

pub trait MarkovChain<T> {
    /// Does one iteration of the chain, returning the new current state.
    fn step(&mut self) -> &Array1<T>;

    /// The current state without stepping.
    fn current_state(&self) -> &Array1<T>;
}

/// Runs `chain` for `n_steps` iterations, collecting every visited state into
/// a `[n_steps, dim]` array.
pub fn run_chain<T, M>(chain: &mut M, n_steps: usize) -> Array2<T>
where
    M: MarkovChain<T>,
    T: Float,
{
    let dim = chain.current_state().len();
    let mut out = Array2::<T>::zeros((n_steps, dim));

    for i in 0..n_steps {
        let state = chain.step();
        out.row_mut(i).assign(state);
    }

    out
}

/// Same as [`run_chain`], updating `pb` once per iteration.
pub fn run_chain_with_progress<T, M>(chain: &mut M, n_steps: usize, pb: &ProgressBar) -> Array2<T>
where
    M: MarkovChain<T>,
    T: Float,
{
    let dim = chain.current_state().len();
    let mut out = Array2::<T>::zeros((n_steps, dim));

    pb.set_length(n_steps as u64);

    for i in 0..n_steps {
        let state = chain.step();
        out.row_mut(i).assign(state);
        pb.inc(1);
    }

    out
}

/// Anything that owns a vector of independent Markov chains.
pub trait HasChains<T> {
    type Chain: MarkovChain<T> + Send;

    /// Returns a mutable reference to the vector of chains.
    fn chains_mut(&mut self) -> &mut Vec<Self::Chain>;
}

/// Runs independent chains in parallel and gathers their samples into a
/// `[n_chains, n_collect, dim]` array, discarding `n_discard` burn-in steps
/// per chain.
pub trait ChainRunner<T>: HasChains<T>
where
    T: Float + Send + Sync,
{
    fn run(&mut self, n_collect: usize, n_discard: usize) -> Result<Array3<T>, SamplerError> {
        let results: Vec<Array2<T>> = self
            .chains_mut()
            .par_iter_mut()
            .map(|chain| run_chain(chain, n_collect + n_discard))
            .collect();

        let kept: Vec<_> = results
            .iter()
            .map(|samples| samples.slice(s![n_discard.., ..]))
            .collect();
        Ok(ndarray::stack(Axis(0), &kept)?)
    }

    fn run_progress(&mut self, n_collect: usize, n_discard: usize) -> Result<Array3<T>, SamplerError> {
        let multi = MultiProgress::new();
        let pb_style = ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .expect("progress bar template is valid")
            .progress_chars("##-");

        let results: Vec<Array2<T>> = self
            .chains_mut()
            .par_iter_mut()
            .enumerate()
            .map(|(i, chain)| {
                let pb = multi.add(ProgressBar::new((n_collect + n_discard) as u64));
                pb.set_prefix(format!("Chain {i}"));
                pb.set_style(pb_style.clone());

                let samples = run_chain_with_progress(chain, n_collect + n_discard, &pb);
                pb.finish_with_message("Done!");
                samples
            })
            .collect();

        let kept: Vec<_> = results
            .iter()
            .map(|samples| samples.slice(s![n_discard.., ..]))
            .collect();
        Ok(ndarray::stack(Axis(0), &kept)?)
    }
}

impl<T, U> ChainRunner<T> for U
where
    U: HasChains<T>,
    T: Float + Send + Sync,
{
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    struct CountingChain {
        state: Array1<f64>,
    }

    impl MarkovChain<f64> for CountingChain {
        fn step(&mut self) -> &Array1<f64> {
            self.state.mapv_inplace(|x| x + 1.0);
            &self.state
        }

        fn current_state(&self) -> &Array1<f64> {
            &self.state
        }
    }

    #[test]
    fn chain_starts_with_seed_state() {
        let chain = Chain::new(arr1(&[1.0, 2.0]));
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.dim(), 2);
        assert_eq!(chain.last(), &arr1(&[1.0, 2.0]));
    }

    #[test]
    fn chain_to_array_stacks_history() {
        let mut chain = Chain::new(arr1(&[0.0, 0.0]));
        chain.push(arr1(&[1.0, 2.0]));
        chain.push(arr1(&[3.0, 4.0]));
        let arr = chain.to_array();
        assert_eq!(arr.shape(), &[3, 2]);
        assert_eq!(arr[(2, 1)], 4.0);
    }

    #[test]
    fn run_chain_collects_every_state() {
        let mut chain = CountingChain {
            state: arr1(&[0.0]),
        };
        let out = run_chain(&mut chain, 5);
        assert_eq!(out.shape(), &[5, 1]);
        assert_eq!(out[(0, 0)], 1.0);
        assert_eq!(out[(4, 0)], 5.0);
    }

    struct CountingSampler {
        chains: Vec<CountingChain>,
    }

    impl HasChains<f64> for CountingSampler {
        type Chain = CountingChain;

        fn chains_mut(&mut self) -> &mut Vec<Self::Chain> {
            &mut self.chains
        }
    }

    #[test]
    fn runner_discards_burn_in() {
        let mut sampler = CountingSampler {
            chains: vec![
                CountingChain {
                    state: arr1(&[0.0]),
                },
                CountingChain {
                    state: arr1(&[10.0]),
                },
            ],
        };
        let samples = sampler.run(3, 2).unwrap();
        assert_eq!(samples.shape(), &[2, 3, 1]);
        // First kept sample comes after two discarded steps.
        assert_eq!(samples[(0, 0, 0)], 3.0);
        assert_eq!(samples[(1, 0, 0)], 13.0);
    }
}
