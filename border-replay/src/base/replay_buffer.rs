//! Replay buffer interface for reinforcement learning.
//!
//! This module defines the interfaces shared by the buffers of this crate:
//!
//! * [`ReplayBufferBase`] - generating batches for training,
//! * [`EpisodicBuffer`] - navigating stored transitions along their episodes,
//!   which is what return estimation needs.
use crate::error::Result;

/// Interface for replay buffers that generate batches for training.
///
/// Agents only depend on this trait, so that a uniform buffer and a prioritized
/// buffer can be swapped through configuration.
pub trait ReplayBufferBase {
    /// Configuration parameters for the replay buffer.
    type Config: Clone;

    /// The type of batch generated for training.
    type Batch;

    /// Builds a new replay buffer from the given configuration.
    fn build(config: &Self::Config) -> Self;

    /// Constructs a batch of `size` experiences.
    ///
    /// `size == 0` takes every stored experience.
    fn batch(&mut self, size: usize) -> Result<Self::Batch>;

    /// Updates the priorities of experiences in the buffer.
    ///
    /// Buffers without priorities ignore this call.
    fn update_priority(
        &mut self,
        ixs: &Option<Vec<usize>>,
        td_err: &Option<Vec<f32>>,
    ) -> Result<()>;
}

/// Read access to stored transitions along their episodes.
///
/// Methods taking an index expect it to address a written slot
/// (see [`EpisodicBuffer::contains`]) and panic otherwise.
pub trait EpisodicBuffer {
    /// Number of stored transitions.
    fn len(&self) -> usize;

    /// Returns `true` if `index` addresses a written slot.
    fn contains(&self, index: usize) -> bool;

    /// Reward of the transition at `index`.
    fn reward(&self, index: usize) -> f32;

    /// Termination flag of the transition at `index`.
    fn is_terminated(&self, index: usize) -> bool;

    /// Truncation flag of the transition at `index`.
    fn is_truncated(&self, index: usize) -> bool;

    /// The previous step of the same episode, if it is stored.
    fn previous_in_episode(&self, index: usize) -> Option<usize>;

    /// The next step of the same episode, if it is stored.
    ///
    /// Returns `None` at the end of an episode and at the latest step of an
    /// unfinished episode.
    fn next_in_episode(&self, index: usize) -> Option<usize>;

    /// The oldest stored step of the episode of `index`.
    fn episode_start(&self, index: usize) -> usize;

    /// Latest steps of episodes that are neither terminated nor truncated.
    fn unfinished_indices(&self) -> Vec<usize>;

    /// Returns `true` if no transition is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Terminated or truncated.
    fn is_done(&self, index: usize) -> bool {
        self.is_terminated(index) || self.is_truncated(index)
    }

    /// `stack_num` indices ending at `index`, in temporal order.
    ///
    /// The steps are taken from the episode of `index`. If fewer steps precede
    /// `index` in the buffer, the oldest available one is repeated, as frame
    /// stacking does at the beginning of an episode.
    fn stack_indices(&self, index: usize, stack_num: usize) -> Vec<usize> {
        let mut ixs = Vec::with_capacity(stack_num);
        let mut ix = index;
        for _ in 0..stack_num {
            ixs.push(ix);
            if let Some(prev) = self.previous_in_episode(ix) {
                ix = prev;
            }
        }
        ixs.reverse();
        ixs
    }

    /// Up to `n` indices starting at `index` and following the episode.
    fn following_indices(&self, index: usize, n: usize) -> Vec<usize> {
        let mut ixs = Vec::with_capacity(n);
        let mut ix = Some(index);
        while let Some(i) = ix {
            if ixs.len() == n {
                break;
            }
            ixs.push(i);
            ix = self.next_in_episode(i);
        }
        ixs
    }
}
