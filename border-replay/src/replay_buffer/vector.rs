//! Replay buffer shared by a number of environments.
use super::{BufferSnapshot, ReplayBufferConfig, TransitionBatch, TransitionStore};
use crate::{
    error::{ReplayBufferError, Result},
    EpisodicBuffer, ReplayBufferBase, Transition,
};
use log::{debug, info};
use rand::{rngs::StdRng, seq::index, SeedableRng};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;

/// A replay buffer made of one [`TransitionStore`] per environment.
///
/// All stores have the same capacity and are addressed through global indices
/// `env_id * capacity_per_env + local_index`. Each store wraps around on its own,
/// so that episodes of different environments never interleave in the links of the
/// [`EpisodeIndex`](super::EpisodeIndex).
///
/// # Examples
///
/// ```rust
/// use border_replay::{replay_buffer::VectorReplayBuffer, EpisodicBuffer, Transition};
///
/// let mut buffer = VectorReplayBuffer::<f32, i64>::new(2, 100, 42);
/// let ix = buffer.add(1, Transition::new(0.0, 1, 1.0, 0.5))?;
/// assert_eq!(ix, 100);
/// assert_eq!(buffer.unfinished_indices(), vec![100]);
/// # Ok::<(), border_replay::ReplayBufferError>(())
/// ```
#[derive(Clone, Debug)]
pub struct VectorReplayBuffer<O, A> {
    capacity_per_env: usize,
    stores: Vec<TransitionStore<O, A>>,
    rng: StdRng,
}

impl<O, A> VectorReplayBuffer<O, A> {
    /// Creates a buffer for `n_envs` environments.
    ///
    /// # Panics
    ///
    /// Panics if `n_envs` or `capacity_per_env` is zero.
    pub fn new(n_envs: usize, capacity_per_env: usize, seed: u64) -> Self {
        assert!(n_envs > 0, "n_envs must be positive");
        Self {
            capacity_per_env,
            stores: (0..n_envs)
                .map(|_| TransitionStore::new(capacity_per_env))
                .collect(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Adds a transition of environment `env_id` and returns its global index.
    pub fn add(&mut self, env_id: usize, tr: Transition<O, A>) -> Result<usize> {
        let n_envs = self.stores.len();
        let store = self
            .stores
            .get_mut(env_id)
            .ok_or(ReplayBufferError::UnknownEnv { env_id, n_envs })?;
        let local = store.add(tr)?;
        Ok(env_id * self.capacity_per_env + local)
    }

    /// Removes all transitions.
    pub fn reset(&mut self) {
        self.stores.iter_mut().for_each(|s| s.reset());
        debug!("Reset replay buffer");
    }

    /// Total number of stored transitions.
    pub fn len(&self) -> usize {
        self.stores.iter().map(|s| s.len()).sum()
    }

    /// Returns `true` if no transition is stored.
    pub fn is_empty(&self) -> bool {
        self.stores.iter().all(|s| s.is_empty())
    }

    /// Number of environments.
    pub fn n_envs(&self) -> usize {
        self.stores.len()
    }

    /// Capacity of each per-environment store.
    pub fn capacity_per_env(&self) -> usize {
        self.capacity_per_env
    }

    /// Per-environment store.
    pub fn store(&self, env_id: usize) -> Option<&TransitionStore<O, A>> {
        self.stores.get(env_id)
    }

    /// Splits a global index into `(env_id, local_index)`.
    pub fn decode(&self, index: usize) -> Result<(usize, usize)> {
        let env_id = index / self.capacity_per_env;
        if env_id < self.stores.len() {
            Ok((env_id, index % self.capacity_per_env))
        } else {
            Err(ReplayBufferError::OutOfRange {
                index,
                len: self.stores.len() * self.capacity_per_env,
            })
        }
    }

    /// Global indices of all stored transitions in storage order.
    ///
    /// Environments come in order of their ids, and the transitions of each one
    /// from the oldest to the latest.
    pub fn indices(&self) -> Vec<usize> {
        self.stores
            .iter()
            .enumerate()
            .flat_map(|(env_id, s)| {
                let offset = env_id * self.capacity_per_env;
                s.indices().into_iter().map(move |ix| ix + offset)
            })
            .collect()
    }

    /// Samples global indices uniformly without replacement.
    ///
    /// `batch_size == 0` returns all indices in storage order. A batch size larger
    /// than the number of stored transitions is clamped.
    pub fn sample_indices(&mut self, batch_size: usize) -> Result<Vec<usize>> {
        if batch_size == 0 {
            return Ok(self.indices());
        }
        let len = self.len();
        if len == 0 {
            return Err(ReplayBufferError::EmptyBuffer);
        }
        if batch_size > len {
            debug!(
                "Batch size {} is larger than the buffer, clamped to {}",
                batch_size, len
            );
        }
        let positions = index::sample(&mut self.rng, len, batch_size.min(len));
        Ok(positions.iter().map(|p| self.position_to_index(p)).collect())
    }

    /// Maps a position in `0..len()` to a global index.
    ///
    /// The written slots of each store are `0..store.len()`.
    fn position_to_index(&self, mut position: usize) -> usize {
        for (env_id, store) in self.stores.iter().enumerate() {
            if position < store.len() {
                return env_id * self.capacity_per_env + position;
            }
            position -= store.len();
        }
        unreachable!("position is smaller than the number of stored transitions");
    }
}

impl<O: Clone, A: Clone> VectorReplayBuffer<O, A> {
    /// Returns the transition at global index `index`.
    pub fn get(&self, index: usize) -> Result<Transition<O, A>> {
        let (env_id, local) = self.decode(index)?;
        self.stores[env_id].get(local)
    }

    /// Samples a batch uniformly without replacement.
    ///
    /// The global indices of the samples are in `ix_sample` of the batch.
    /// `batch_size == 0` takes all transitions in storage order, which is what
    /// on-policy algorithms consume at every update.
    pub fn sample(&mut self, batch_size: usize) -> Result<TransitionBatch<O, A>> {
        let ixs = self.sample_indices(batch_size)?;
        self.batch_from_indices(&ixs)
    }

    /// Gathers a batch of transitions at the given global indices.
    pub fn batch_from_indices(&self, ixs: &[usize]) -> Result<TransitionBatch<O, A>> {
        let mut batch = TransitionBatch::with_capacity(ixs.len());
        for &ix in ixs {
            let (env_id, local) = self.decode(ix)?;
            self.stores[env_id].gather(local, env_id * self.capacity_per_env, &mut batch)?;
        }
        Ok(batch)
    }

    /// Takes a snapshot of the buffer.
    pub fn snapshot(&self) -> BufferSnapshot<O, A> {
        BufferSnapshot {
            capacity_per_env: self.capacity_per_env,
            stores: self.stores.iter().map(|s| s.snapshot()).collect(),
            priorities: None,
        }
    }
}

impl<O, A> VectorReplayBuffer<O, A> {
    /// Restores a buffer from a snapshot. Global indices are preserved.
    pub fn from_snapshot(snapshot: BufferSnapshot<O, A>, seed: u64) -> Result<Self> {
        if snapshot.stores.is_empty() {
            return Err(ReplayBufferError::InvalidSnapshot(
                "no environment".to_string(),
            ));
        }
        let capacity_per_env = snapshot.capacity_per_env;
        let stores = snapshot
            .stores
            .into_iter()
            .map(|s| {
                if s.capacity == capacity_per_env {
                    TransitionStore::from_snapshot(s)
                } else {
                    Err(ReplayBufferError::InvalidSnapshot(format!(
                        "store capacity {} differs from {}",
                        s.capacity, capacity_per_env
                    )))
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            capacity_per_env,
            stores,
            rng: StdRng::seed_from_u64(seed),
        })
    }
}

impl<O, A> VectorReplayBuffer<O, A>
where
    O: Clone + Serialize + DeserializeOwned,
    A: Clone + Serialize + DeserializeOwned,
{
    /// Saves the contents of the buffer to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        self.snapshot().save(&path)?;
        info!("Saved replay buffer to {:?}", path.as_ref());
        Ok(())
    }

    /// Loads a buffer saved with [`VectorReplayBuffer::save`].
    pub fn load(path: impl AsRef<Path>, seed: u64) -> anyhow::Result<Self> {
        let snapshot = BufferSnapshot::load(&path)?;
        let buffer = Self::from_snapshot(snapshot, seed)?;
        info!("Loaded replay buffer from {:?}", path.as_ref());
        Ok(buffer)
    }
}

impl<O, A> EpisodicBuffer for VectorReplayBuffer<O, A> {
    fn len(&self) -> usize {
        VectorReplayBuffer::len(self)
    }

    fn contains(&self, index: usize) -> bool {
        match self.decode(index) {
            Ok((env_id, local)) => self.stores[env_id].contains(local),
            Err(_) => false,
        }
    }

    fn reward(&self, index: usize) -> f32 {
        let (env_id, local) = self.locate(index);
        self.stores[env_id].reward(local)
    }

    fn is_terminated(&self, index: usize) -> bool {
        let (env_id, local) = self.locate(index);
        self.stores[env_id].is_terminated(local)
    }

    fn is_truncated(&self, index: usize) -> bool {
        let (env_id, local) = self.locate(index);
        self.stores[env_id].is_truncated(local)
    }

    fn previous_in_episode(&self, index: usize) -> Option<usize> {
        let (env_id, local) = self.locate(index);
        self.stores[env_id]
            .previous_in_episode(local)
            .map(|ix| ix + env_id * self.capacity_per_env)
    }

    fn next_in_episode(&self, index: usize) -> Option<usize> {
        let (env_id, local) = self.locate(index);
        self.stores[env_id]
            .next_in_episode(local)
            .map(|ix| ix + env_id * self.capacity_per_env)
    }

    fn episode_start(&self, index: usize) -> usize {
        let (env_id, local) = self.locate(index);
        self.stores[env_id].episode_start(local) + env_id * self.capacity_per_env
    }

    fn unfinished_indices(&self) -> Vec<usize> {
        self.stores
            .iter()
            .enumerate()
            .flat_map(|(env_id, s)| {
                let offset = env_id * self.capacity_per_env;
                s.unfinished_indices().into_iter().map(move |ix| ix + offset)
            })
            .collect()
    }
}

impl<O, A> VectorReplayBuffer<O, A> {
    #[inline]
    fn locate(&self, index: usize) -> (usize, usize) {
        match self.decode(index) {
            Ok(ix) => ix,
            Err(e) => panic!("{}", e),
        }
    }
}

impl<O: Clone, A: Clone> ReplayBufferBase for VectorReplayBuffer<O, A> {
    type Config = ReplayBufferConfig;
    type Batch = TransitionBatch<O, A>;

    fn build(config: &Self::Config) -> Self {
        Self::new(config.n_envs, config.capacity, config.seed)
    }

    fn batch(&mut self, size: usize) -> Result<Self::Batch> {
        self.sample(size)
    }

    fn update_priority(
        &mut self,
        _ixs: &Option<Vec<usize>>,
        _td_err: &Option<Vec<f32>>,
    ) -> Result<()> {
        Ok(())
    }
}
