//! Batch of transitions.

/// A batch of transitions `(o_t, a_t, o_t+1, r_t, is_terminated_t, is_truncated_t)`
/// used to train agents.
pub trait TransitionBatch {
    /// A set of observation in a batch.
    type ObsBatch;

    /// A set of actions in a batch.
    type ActBatch;

    /// Unpack the data `(o_t, a_t, o_t+1, r_t, is_terminated_t, is_truncated_t)`.
    ///
    /// The last element is the indices of the transitions in the replay buffer,
    /// if the batch was sampled from one.
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
    );

    /// Returns the number of transitions in the batch.
    fn len(&self) -> usize;

    /// Returns `o_t`.
    fn obs(&self) -> &Self::ObsBatch;

    /// Returns `a_t`.
    fn act(&self) -> &Self::ActBatch;
}
