//! Batch of transitions taken from a replay buffer.

/// A batch of transitions in structure-of-arrays layout.
///
/// `ix_sample` holds the buffer indices of the samples, which are needed to compute
/// returns along episodes and to update priorities. `weight` holds importance
/// sampling weights when the batch comes from a prioritized buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct TransitionBatch<O, A> {
    /// Observations.
    pub obs: Vec<O>,

    /// Actions.
    pub act: Vec<A>,

    /// Next observations.
    pub next_obs: Vec<O>,

    /// Rewards.
    pub reward: Vec<f32>,

    /// Termination flags.
    pub is_terminated: Vec<bool>,

    /// Truncation flags.
    pub is_truncated: Vec<bool>,

    /// Indices of sampled transitions.
    pub ix_sample: Vec<usize>,

    /// Importance sampling weights.
    pub weight: Option<Vec<f32>>,
}

impl<O, A> TransitionBatch<O, A> {
    /// Creates an empty batch with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            obs: Vec::with_capacity(capacity),
            act: Vec::with_capacity(capacity),
            next_obs: Vec::with_capacity(capacity),
            reward: Vec::with_capacity(capacity),
            is_terminated: Vec::with_capacity(capacity),
            is_truncated: Vec::with_capacity(capacity),
            ix_sample: Vec::with_capacity(capacity),
            weight: None,
        }
    }

    /// Returns the number of transitions in the batch.
    pub fn len(&self) -> usize {
        self.reward.len()
    }

    /// Returns `true` if the batch has no transition.
    pub fn is_empty(&self) -> bool {
        self.reward.is_empty()
    }

    /// Decomposes the batch into
    /// `(obs, act, next_obs, reward, is_terminated, is_truncated, ix_sample, weight)`.
    #[allow(clippy::type_complexity)]
    pub fn unpack(
        self,
    ) -> (
        Vec<O>,
        Vec<A>,
        Vec<O>,
        Vec<f32>,
        Vec<bool>,
        Vec<bool>,
        Vec<usize>,
        Option<Vec<f32>>,
    ) {
        (
            self.obs,
            self.act,
            self.next_obs,
            self.reward,
            self.is_terminated,
            self.is_truncated,
            self.ix_sample,
            self.weight,
        )
    }
}
