//! Generic implementation of transition batches.
use crate::TransitionBatch;
use anyhow::Result;

/// A sub-batch of a transition batch, such as observations or actions.
///
/// The type is used both as the storage of a replay buffer, created with
/// [`BatchBase::new`], and as a batch sampled from the storage.
pub trait BatchBase: Sized {
    /// Builds an empty storage with the given capacity.
    fn new(capacity: usize) -> Self;

    /// Pushes the samples in `data` at position `ix`.
    ///
    /// Samples exceeding the end of the storage wrap around to the beginning.
    fn push(&mut self, ix: usize, data: Self) -> Result<()>;

    /// Takes the samples at the given indices.
    fn sample(&self, ixs: &[usize]) -> Result<Self>;
}

/// A generic batch of transitions.
///
/// `O` and `A` are the types of observation and action batches.
#[derive(Debug)]
pub struct GenericTransitionBatch<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    /// Observations.
    pub obs: O,

    /// Actions.
    pub act: A,

    /// Next observations.
    pub next_obs: O,

    /// Rewards.
    pub reward: Vec<f32>,

    /// Termination flags.
    pub is_terminated: Vec<i8>,

    /// Truncation flags.
    pub is_truncated: Vec<i8>,

    /// Indices of the transitions in the replay buffer they were sampled from.
    pub ix_sample: Option<Vec<usize>>,
}

impl<O, A> TransitionBatch for GenericTransitionBatch<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    type ObsBatch = O;
    type ActBatch = A;

    fn unpack(
        self,
    ) -> (
        Self::ObsBatch,
        Self::ActBatch,
        Self::ObsBatch,
        Vec<f32>,
        Vec<i8>,
        Vec<i8>,
        Option<Vec<usize>>,
    ) {
        (
            self.obs,
            self.act,
            self.next_obs,
            self.reward,
            self.is_terminated,
            self.is_truncated,
            self.ix_sample,
        )
    }

    fn len(&self) -> usize {
        self.reward.len()
    }

    fn obs(&self) -> &Self::ObsBatch {
        &self.obs
    }

    fn act(&self) -> &Self::ActBatch {
        &self.act
    }
}

impl<O, A> GenericTransitionBatch<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    /// Creates an empty batch with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            obs: O::new(capacity),
            act: A::new(capacity),
            next_obs: O::new(capacity),
            reward: Vec::with_capacity(capacity),
            is_terminated: Vec::with_capacity(capacity),
            is_truncated: Vec::with_capacity(capacity),
            ix_sample: None,
        }
    }
}
