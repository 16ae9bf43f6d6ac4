//! Circular replay buffer with uniform sampling.
use super::{BatchBase, GenericTransitionBatch, SimpleReplayBufferConfig};
use crate::{error::OffrlError, ExperienceBufferBase, ReplayBufferBase, TransitionBatch};
use anyhow::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// A circular replay buffer.
///
/// Each field of the transitions is stored in storage preallocated with
/// [`SimpleReplayBufferConfig::capacity`]. A transition is written at
/// `num_experience % capacity`, so the oldest transition is overwritten once
/// the buffer is full. The total number of pushed transitions is tracked
/// separately from the capacity.
///
/// `O` and `A` are the types of the observation and action storage.
pub struct SimpleReplayBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    capacity: usize,

    /// Position where the next transition is written.
    i: usize,

    /// Number of valid transitions, `min(num_experience, capacity)`.
    size: usize,

    /// Total number of transitions pushed so far.
    num_experience: usize,

    obs: O,
    act: A,
    next_obs: O,
    reward: Vec<f32>,
    is_terminated: Vec<i8>,
    is_truncated: Vec<i8>,
    rng: StdRng,
}

impl<O, A> SimpleReplayBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    fn push_scalars<T: Copy>(storage: &mut [T], i: usize, values: &[T]) {
        let capacity = storage.len();
        for (j, v) in values.iter().enumerate() {
            storage[(i + j) % capacity] = *v;
        }
    }

    fn sample_scalars<T: Copy>(storage: &[T], ixs: &[usize]) -> Vec<T> {
        ixs.iter().map(|&ix| storage[ix]).collect()
    }

    fn batch_with_indices(&self, ixs: Vec<usize>) -> Result<GenericTransitionBatch<O, A>> {
        Ok(GenericTransitionBatch {
            obs: self.obs.sample(&ixs)?,
            act: self.act.sample(&ixs)?,
            next_obs: self.next_obs.sample(&ixs)?,
            reward: Self::sample_scalars(&self.reward, &ixs),
            is_terminated: Self::sample_scalars(&self.is_terminated, &ixs),
            is_truncated: Self::sample_scalars(&self.is_truncated, &ixs),
            ix_sample: Some(ixs),
        })
    }

    /// Returns all valid transitions in storage order.
    ///
    /// This method should be used with caution on large replay buffers.
    pub fn all_batch(&self) -> Result<GenericTransitionBatch<O, A>> {
        if self.size == 0 {
            return Err(OffrlError::EmptyReplayBuffer.into());
        }
        self.batch_with_indices((0..self.size).collect())
    }

    /// Returns the capacity of the buffer.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the total number of transitions pushed into the buffer,
    /// including overwritten ones.
    pub fn num_experience(&self) -> usize {
        self.num_experience
    }

    /// Returns the number of terminated flags in the buffer.
    pub fn num_terminated_flags(&self) -> usize {
        self.is_terminated[..self.size]
            .iter()
            .map(|&f| f as usize)
            .sum()
    }

    /// Returns the number of truncated flags in the buffer.
    pub fn num_truncated_flags(&self) -> usize {
        self.is_truncated[..self.size]
            .iter()
            .map(|&f| f as usize)
            .sum()
    }

    /// Returns the sum of all rewards in the buffer.
    pub fn sum_rewards(&self) -> f32 {
        self.reward[..self.size].iter().sum()
    }
}

impl<O, A> ExperienceBufferBase for SimpleReplayBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    type Item = GenericTransitionBatch<O, A>;

    fn len(&self) -> usize {
        self.size
    }

    /// Adds transitions to the buffer.
    ///
    /// Returns an error if the buffer has no capacity or the batch is longer than the capacity.
    fn push(&mut self, tr: Self::Item) -> Result<()> {
        if self.capacity == 0 {
            return Err(OffrlError::ZeroCapacity.into());
        }
        let len = tr.len();
        if len > self.capacity {
            return Err(OffrlError::BatchTooLarge {
                batch_size: len,
                capacity: self.capacity,
            }
            .into());
        }

        let (obs, act, next_obs, reward, is_terminated, is_truncated, _) = tr.unpack();
        self.obs.push(self.i, obs)?;
        self.act.push(self.i, act)?;
        self.next_obs.push(self.i, next_obs)?;
        Self::push_scalars(&mut self.reward, self.i, &reward);
        Self::push_scalars(&mut self.is_terminated, self.i, &is_terminated);
        Self::push_scalars(&mut self.is_truncated, self.i, &is_truncated);

        self.num_experience += len;
        self.i = self.num_experience % self.capacity;
        self.size = self.num_experience.min(self.capacity);

        Ok(())
    }
}

impl<O, A> ReplayBufferBase for SimpleReplayBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    type Config = SimpleReplayBufferConfig;
    type Batch = GenericTransitionBatch<O, A>;

    fn build(config: &Self::Config) -> Self {
        let capacity = config.capacity;

        Self {
            capacity,
            i: 0,
            size: 0,
            num_experience: 0,
            obs: O::new(capacity),
            act: A::new(capacity),
            next_obs: O::new(capacity),
            reward: vec![0.; capacity],
            is_terminated: vec![0; capacity],
            is_truncated: vec![0; capacity],
            rng: StdRng::seed_from_u64(config.seed),
        }
    }

    /// Samples `size` transitions uniformly with replacement.
    fn batch(&mut self, size: usize) -> Result<Self::Batch> {
        if self.size == 0 {
            return Err(OffrlError::EmptyReplayBuffer.into());
        }
        let n = self.size;
        let ixs = (0..size)
            .map(|_| self.rng.gen_range(0..n))
            .collect::<Vec<_>>();
        self.batch_with_indices(ixs)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Observations or actions as rows of scalars, for testing.
    struct ScalarBatch(Vec<f32>);

    impl BatchBase for ScalarBatch {
        fn new(capacity: usize) -> Self {
            Self(vec![0.; capacity])
        }

        fn push(&mut self, ix: usize, data: Self) -> Result<()> {
            let capacity = self.0.len();
            for (j, v) in data.0.into_iter().enumerate() {
                self.0[(ix + j) % capacity] = v;
            }
            Ok(())
        }

        fn sample(&self, ixs: &[usize]) -> Result<Self> {
            Ok(Self(ixs.iter().map(|&ix| self.0[ix]).collect()))
        }
    }

    type Buffer = SimpleReplayBuffer<ScalarBatch, ScalarBatch>;

    fn transitions(values: &[f32]) -> GenericTransitionBatch<ScalarBatch, ScalarBatch> {
        let n = values.len();
        GenericTransitionBatch {
            obs: ScalarBatch(values.to_vec()),
            act: ScalarBatch(values.iter().map(|v| -v).collect()),
            next_obs: ScalarBatch(values.iter().map(|v| v + 1.0).collect()),
            reward: values.to_vec(),
            is_terminated: vec![0; n],
            is_truncated: vec![0; n],
            ix_sample: None,
        }
    }

    #[test]
    fn test_sample_within_valid_entries() -> Result<()> {
        let config = SimpleReplayBufferConfig::default().capacity(10);
        let mut buffer = Buffer::build(&config);
        buffer.push(transitions(&[1.0, 2.0, 3.0, 4.0]))?;
        assert_eq!(buffer.len(), 4);

        for _ in 0..50 {
            let batch = buffer.batch(8)?;
            let ixs = batch.ix_sample.as_ref().unwrap();
            assert_eq!(ixs.len(), 8);
            assert!(ixs.iter().all(|&ix| ix < 4));
            assert!(batch.obs.0.iter().all(|v| (1.0..=4.0).contains(v)));
            for ((o, a), r) in batch.obs.0.iter().zip(&batch.act.0).zip(&batch.reward) {
                assert_eq!(*a, -o);
                assert_eq!(r, o);
            }
        }

        Ok(())
    }

    #[test]
    fn test_circular_overwrite() -> Result<()> {
        let config = SimpleReplayBufferConfig::default().capacity(4);
        let mut buffer = Buffer::build(&config);
        for v in 0..6 {
            buffer.push(transitions(&[v as f32]))?;
        }

        // Slots 0 and 1 were overwritten by the 5th and 6th transitions
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.num_experience(), 6);
        let batch = buffer.all_batch()?;
        assert_eq!(batch.obs.0, vec![4.0, 5.0, 2.0, 3.0]);
        assert_eq!(batch.next_obs.0, vec![5.0, 6.0, 3.0, 4.0]);
        assert_eq!(batch.reward, vec![4.0, 5.0, 2.0, 3.0]);

        // A multi-transition push wraps around the end of the storage
        buffer.push(transitions(&[10.0, 11.0, 12.0]))?;
        assert_eq!(buffer.num_experience(), 9);
        assert_eq!(buffer.all_batch()?.obs.0, vec![12.0, 5.0, 10.0, 11.0]);

        Ok(())
    }

    #[test]
    fn test_invalid_operations() {
        let config = SimpleReplayBufferConfig::default().capacity(2);
        let mut buffer = Buffer::build(&config);
        assert!(buffer.batch(1).is_err());
        assert!(buffer.all_batch().is_err());
        assert!(buffer.push(transitions(&[1.0, 2.0, 3.0])).is_err());
        assert_eq!(buffer.num_experience(), 0);
    }

    #[test]
    fn test_zero_capacity() {
        let config = SimpleReplayBufferConfig::default().capacity(0);
        let mut buffer = Buffer::build(&config);
        assert!(buffer.push(transitions(&[])).is_err());
        assert!(buffer.push(transitions(&[1.0])).is_err());
        assert_eq!(buffer.num_experience(), 0);
        assert!(buffer.batch(1).is_err());
    }
}
