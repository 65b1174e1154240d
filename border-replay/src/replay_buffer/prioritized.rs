//! Prioritized experience replay over a [`VectorReplayBuffer`].
mod sum_tree;
use super::{
    BufferSnapshot, PerConfig, PrioritySnapshot, ReplayBufferConfig, TransitionBatch,
    VectorReplayBuffer,
};
use crate::{
    error::{ReplayBufferError, Result},
    EpisodicBuffer, ReplayBufferBase, Transition,
};
use log::info;
use rand::{rngs::StdRng, SeedableRng};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use sum_tree::SumTree;
pub use sum_tree::WeightNormalizer;

/// Added to the absolute value of priorities, so that no transition gets zero probability.
const EPS: f32 = f32::EPSILON;

/// Linear schedule of the exponent `beta` of importance sampling weights.
///
/// `beta` moves from `beta_0` to `beta_final` over `n_opts_final` priority updates,
/// so that the bias of prioritized sampling is fully compensated at the end of training.
#[derive(Clone, Debug)]
struct IwScheduler {
    beta_0: f32,
    beta_final: f32,
    n_opts_final: usize,
    n_opts: usize,
}

impl IwScheduler {
    fn from_config(per_config: &PerConfig) -> Self {
        Self {
            beta_0: per_config.beta_0,
            beta_final: per_config.beta_final,
            n_opts_final: per_config.n_opts_final,
            n_opts: 0,
        }
    }

    fn beta(&self) -> f32 {
        if self.n_opts >= self.n_opts_final {
            return self.beta_final;
        }
        let progress = self.n_opts as f32 / self.n_opts_final as f32;
        self.beta_0 + (self.beta_final - self.beta_0) * progress
    }
}

/// A replay buffer sampling transitions proportionally to their priorities.
///
/// Transitions are stored in a [`VectorReplayBuffer`] and share its global indices.
/// A transition `i` is drawn with probability $P(i) = p_i^\alpha / \sum_k p_k^\alpha$
/// and comes with the importance sampling weight $w_i = (N P(i))^{-\beta}$, where `N`
/// is the number of stored transitions. Weights are normalized according to
/// [`WeightNormalizer`].
///
/// New transitions get the largest priority seen so far, so that they are likely
/// to be sampled soon after insertion.
pub struct PrioritizedReplayBuffer<O, A> {
    buffer: VectorReplayBuffer<O, A>,
    sum_tree: SumTree,
    iw_scheduler: IwScheduler,
    normalize: WeightNormalizer,
    max_priority: f32,
    rng: StdRng,
}

impl<O, A> PrioritizedReplayBuffer<O, A> {
    /// Creates a buffer for `n_envs` environments.
    pub fn new(n_envs: usize, capacity_per_env: usize, seed: u64, per_config: &PerConfig) -> Self {
        let buffer = VectorReplayBuffer::new(n_envs, capacity_per_env, seed);
        Self::with_buffer(buffer, seed, per_config)
    }

    fn with_buffer(buffer: VectorReplayBuffer<O, A>, seed: u64, per_config: &PerConfig) -> Self {
        let capacity = buffer.n_envs() * buffer.capacity_per_env();
        Self {
            buffer,
            sum_tree: SumTree::new(capacity, per_config.alpha),
            iw_scheduler: IwScheduler::from_config(per_config),
            normalize: per_config.normalize,
            max_priority: 1.0,
            rng: StdRng::seed_from_u64(seed.wrapping_add(1)),
        }
    }

    /// Adds a transition of environment `env_id` with the current maximum priority.
    pub fn add(&mut self, env_id: usize, tr: Transition<O, A>) -> Result<usize> {
        let ix = self.buffer.add(env_id, tr)?;
        self.sum_tree.set(ix, self.max_priority);
        Ok(ix)
    }

    /// Sets the priority of the transition at `index` to `|priority| + eps`.
    pub fn update_priority(&mut self, index: usize, priority: f32) -> Result<()> {
        self.check_priority(index, priority)?;
        self.set_priority(index, priority);
        Ok(())
    }

    /// Sets priorities of a batch, typically from TD errors, and counts one
    /// optimization step for the schedule of `beta`.
    ///
    /// Nothing is updated if any of the indices or priorities is invalid.
    pub fn update_priorities(&mut self, ixs: &[usize], priorities: &[f32]) -> Result<()> {
        if ixs.len() != priorities.len() {
            return Err(ReplayBufferError::ShapeMismatch {
                expected: ixs.len(),
                got: priorities.len(),
            });
        }
        for (&ix, &p) in ixs.iter().zip(priorities.iter()) {
            self.check_priority(ix, p)?;
        }
        for (&ix, &p) in ixs.iter().zip(priorities.iter()) {
            self.set_priority(ix, p);
        }
        self.iw_scheduler.n_opts += 1;
        Ok(())
    }

    fn check_priority(&self, index: usize, priority: f32) -> Result<()> {
        if !self.buffer.contains(index) {
            return Err(ReplayBufferError::OutOfRange {
                index,
                len: self.sum_tree.capacity(),
            });
        }
        if !priority.is_finite() {
            return Err(ReplayBufferError::InvalidPriority(priority));
        }
        Ok(())
    }

    fn set_priority(&mut self, index: usize, priority: f32) {
        let p = priority.abs() + EPS;
        self.max_priority = self.max_priority.max(p);
        self.sum_tree.set(index, p);
    }

    /// Priority of the transition at `index`.
    pub fn priority(&self, index: usize) -> Option<f32> {
        if self.buffer.contains(index) {
            Some(self.sum_tree.priorities()[index])
        } else {
            None
        }
    }

    /// Current exponent of importance sampling weights.
    pub fn beta(&self) -> f32 {
        self.iw_scheduler.beta()
    }

    /// Priority given to new transitions.
    pub fn max_priority(&self) -> f32 {
        self.max_priority
    }

    /// The underlying buffer.
    pub fn buffer(&self) -> &VectorReplayBuffer<O, A> {
        &self.buffer
    }

    /// Number of stored transitions.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if no transition is stored.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Removes all transitions and priorities.
    ///
    /// The schedule of `beta` is kept.
    pub fn reset(&mut self) {
        self.buffer.reset();
        self.sum_tree.clear();
        self.max_priority = 1.0;
    }

    /// Draws global indices with probability proportional to `priority^alpha`.
    ///
    /// `batch_size == 0` returns all indices in storage order.
    pub fn sample_indices(&mut self, batch_size: usize) -> Result<Vec<usize>> {
        if batch_size == 0 {
            return Ok(self.buffer.indices());
        }
        if self.buffer.is_empty() {
            return Err(ReplayBufferError::EmptyBuffer);
        }
        Ok(self.sum_tree.sample(&mut self.rng, batch_size))
    }

    /// Importance sampling weights of the given indices.
    ///
    /// Fails with [`ReplayBufferError::OutOfRange`] if an index does not address a
    /// stored transition.
    pub fn importance_weights(&self, ixs: &[usize]) -> Result<Vec<f32>> {
        if let Some(&index) = ixs.iter().find(|&&ix| !self.buffer.contains(ix)) {
            return Err(ReplayBufferError::OutOfRange {
                index,
                len: self.sum_tree.capacity(),
            });
        }
        let n = self.buffer.len() as f32;
        let total = self.sum_tree.total();
        let beta = self.beta();
        let ws = ixs
            .iter()
            .map(|&ix| (n * self.sum_tree.weight(ix) / total).powf(-beta))
            .collect::<Vec<_>>();
        let w_max = match self.normalize {
            WeightNormalizer::Batch => ws.iter().fold(f32::MIN, |m, &w| m.max(w)),
            WeightNormalizer::All => (n * self.sum_tree.min_weight() / total).powf(-beta),
        };
        Ok(ws.into_iter().map(|w| w / w_max).collect())
    }
}

impl<O: Clone, A: Clone> PrioritizedReplayBuffer<O, A> {
    /// Samples a batch with importance sampling weights in `weight`.
    pub fn sample(&mut self, batch_size: usize) -> Result<TransitionBatch<O, A>> {
        let ixs = self.sample_indices(batch_size)?;
        let mut batch = self.buffer.batch_from_indices(&ixs)?;
        batch.weight = Some(self.importance_weights(&ixs)?);
        Ok(batch)
    }

    /// Returns the transition at `index`.
    pub fn get(&self, index: usize) -> Result<Transition<O, A>> {
        self.buffer.get(index)
    }

    /// Takes a snapshot of the buffer, including priorities.
    pub fn snapshot(&self) -> BufferSnapshot<O, A> {
        BufferSnapshot {
            priorities: Some(PrioritySnapshot {
                priorities: self.sum_tree.priorities().to_vec(),
                max_priority: self.max_priority,
                n_opts: self.iw_scheduler.n_opts,
            }),
            ..self.buffer.snapshot()
        }
    }
}

impl<O, A> PrioritizedReplayBuffer<O, A> {
    /// Restores a buffer from a snapshot.
    ///
    /// Transitions of a snapshot without priorities get the default maximum priority.
    pub fn from_snapshot(
        snapshot: BufferSnapshot<O, A>,
        seed: u64,
        per_config: &PerConfig,
    ) -> Result<Self> {
        let BufferSnapshot {
            capacity_per_env,
            stores,
            priorities,
        } = snapshot;
        let buffer = VectorReplayBuffer::from_snapshot(
            BufferSnapshot {
                capacity_per_env,
                stores,
                priorities: None,
            },
            seed,
        )?;
        let mut per = Self::with_buffer(buffer, seed, per_config);
        let ixs = per.buffer.indices();

        match priorities {
            Some(p) => {
                if p.priorities.len() != per.sum_tree.capacity() {
                    return Err(ReplayBufferError::InvalidSnapshot(format!(
                        "{} priorities for capacity {}",
                        p.priorities.len(),
                        per.sum_tree.capacity()
                    )));
                }
                if !(p.max_priority.is_finite() && p.max_priority > 0.0) {
                    return Err(ReplayBufferError::InvalidSnapshot(format!(
                        "max priority {}",
                        p.max_priority
                    )));
                }
                for ix in ixs {
                    let priority = p.priorities[ix];
                    if !(priority.is_finite() && priority > 0.0 && priority <= p.max_priority) {
                        return Err(ReplayBufferError::InvalidSnapshot(format!(
                            "priority {} at index {}",
                            priority, ix
                        )));
                    }
                    per.sum_tree.set(ix, priority);
                }
                per.max_priority = p.max_priority;
                per.iw_scheduler.n_opts = p.n_opts;
            }
            None => {
                for ix in ixs {
                    per.sum_tree.set(ix, per.max_priority);
                }
            }
        }
        Ok(per)
    }
}

impl<O, A> PrioritizedReplayBuffer<O, A>
where
    O: Clone + Serialize + DeserializeOwned,
    A: Clone + Serialize + DeserializeOwned,
{
    /// Saves transitions and priorities to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        self.snapshot().save(&path)?;
        info!("Saved prioritized replay buffer to {:?}", path.as_ref());
        Ok(())
    }

    /// Loads a buffer saved with [`PrioritizedReplayBuffer::save`].
    pub fn load(path: impl AsRef<Path>, seed: u64, per_config: &PerConfig) -> anyhow::Result<Self> {
        let snapshot = BufferSnapshot::load(&path)?;
        let buffer = Self::from_snapshot(snapshot, seed, per_config)?;
        info!("Loaded prioritized replay buffer from {:?}", path.as_ref());
        Ok(buffer)
    }
}

impl<O, A> EpisodicBuffer for PrioritizedReplayBuffer<O, A> {
    fn len(&self) -> usize {
        self.buffer.len()
    }

    fn contains(&self, index: usize) -> bool {
        self.buffer.contains(index)
    }

    fn reward(&self, index: usize) -> f32 {
        self.buffer.reward(index)
    }

    fn is_terminated(&self, index: usize) -> bool {
        self.buffer.is_terminated(index)
    }

    fn is_truncated(&self, index: usize) -> bool {
        self.buffer.is_truncated(index)
    }

    fn previous_in_episode(&self, index: usize) -> Option<usize> {
        self.buffer.previous_in_episode(index)
    }

    fn next_in_episode(&self, index: usize) -> Option<usize> {
        self.buffer.next_in_episode(index)
    }

    fn episode_start(&self, index: usize) -> usize {
        self.buffer.episode_start(index)
    }

    fn unfinished_indices(&self) -> Vec<usize> {
        self.buffer.unfinished_indices()
    }
}

impl<O: Clone, A: Clone> ReplayBufferBase for PrioritizedReplayBuffer<O, A> {
    type Config = ReplayBufferConfig;
    type Batch = TransitionBatch<O, A>;

    /// Builds the buffer; the default [`PerConfig`] is used if `per_config` is `None`.
    fn build(config: &Self::Config) -> Self {
        let per_config = config.per_config.clone().unwrap_or_default();
        Self::new(config.n_envs, config.capacity, config.seed, &per_config)
    }

    fn batch(&mut self, size: usize) -> Result<Self::Batch> {
        self.sample(size)
    }

    fn update_priority(
        &mut self,
        ixs: &Option<Vec<usize>>,
        td_errs: &Option<Vec<f32>>,
    ) -> Result<()> {
        match (ixs, td_errs) {
            (Some(ixs), Some(td_errs)) => self.update_priorities(ixs, td_errs),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tr(o: i32) -> Transition<i32, i32> {
        Transition::new(o, 0, 0.0, o + 1)
    }

    fn buffer(capacity: usize, per_config: &PerConfig) -> PrioritizedReplayBuffer<i32, i32> {
        let mut buffer = PrioritizedReplayBuffer::new(1, capacity, 42, per_config);
        for o in 0..capacity as i32 {
            buffer.add(0, tr(o)).unwrap();
        }
        buffer
    }

    #[test]
    fn test_new_transitions_get_max_priority() {
        let mut buffer = buffer(4, &PerConfig::default());
        assert_eq!(buffer.priority(0), Some(1.0));
        buffer.update_priority(1, -5.0).unwrap();
        assert!((buffer.max_priority() - 5.0).abs() < 1e-5);

        // Overwrites slot 0 with the new maximum
        buffer.add(0, tr(10)).unwrap();
        assert!((buffer.priority(0).unwrap() - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_invalid_updates() {
        let mut buffer = PrioritizedReplayBuffer::<i32, i32>::new(1, 4, 42, &PerConfig::default());
        buffer.add(0, tr(0)).unwrap();
        assert_eq!(
            buffer.update_priority(1, 1.0),
            Err(ReplayBufferError::OutOfRange { index: 1, len: 4 })
        );
        assert!(matches!(
            buffer.update_priority(0, f32::NAN),
            Err(ReplayBufferError::InvalidPriority(p)) if p.is_nan()
        ));
        assert_eq!(
            buffer.update_priority(0, f32::INFINITY),
            Err(ReplayBufferError::InvalidPriority(f32::INFINITY))
        );
        assert!(buffer.update_priorities(&[0, 1], &[2.0, 3.0]).is_err());
        // Nothing applied
        assert_eq!(buffer.priority(0), Some(1.0));
        assert_eq!(
            buffer.update_priorities(&[0], &[2.0, 3.0]),
            Err(ReplayBufferError::ShapeMismatch {
                expected: 1,
                got: 2
            })
        );
    }

    #[test]
    fn test_weights_of_uniform_priorities() {
        let mut buffer = buffer(5, &PerConfig::default());
        let batch = buffer.sample(16).unwrap();
        assert_eq!(batch.len(), 16);
        let ws = batch.weight.unwrap();
        assert!(ws.iter().all(|w| (w - 1.0).abs() < 1e-5));
    }

    #[test]
    fn test_weights_normalized_by_batch_max() {
        let per_config = PerConfig::default().alpha(1.0).beta_0(1.0).beta_final(1.0);
        let mut buffer = buffer(4, &per_config);
        buffer
            .update_priorities(&[0, 1, 2, 3], &[1.0, 1.0, 1.0, 5.0])
            .unwrap();
        let ws = buffer.importance_weights(&[0, 3]).unwrap();
        // w_i is proportional to 1 / p_i with beta = 1
        assert!((ws[0] - 1.0).abs() < 1e-5);
        assert!((ws[1] - 0.2).abs() < 1e-5);

        let ws = buffer.importance_weights(&[3]).unwrap();
        assert!((ws[0] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_weights_normalized_over_all() {
        let per_config = PerConfig::default()
            .alpha(1.0)
            .beta_0(1.0)
            .beta_final(1.0)
            .normalize(WeightNormalizer::All);
        let mut buffer = buffer(4, &per_config);
        buffer
            .update_priorities(&[0, 1, 2, 3], &[2.0, 2.0, 2.0, 4.0])
            .unwrap();
        // The largest weight belongs to the smallest priority, not sampled here.
        let ws = buffer.importance_weights(&[3]).unwrap();
        assert!((ws[0] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_sample_all() {
        let mut buffer = buffer(3, &PerConfig::default());
        let batch = buffer.sample(0).unwrap();
        assert_eq!(batch.ix_sample, vec![0, 1, 2]);
        assert_eq!(batch.weight.map(|w| w.len()), Some(3));

        buffer.reset();
        assert_eq!(buffer.sample(2).unwrap_err(), ReplayBufferError::EmptyBuffer);
        assert!(buffer.sample(0).unwrap().is_empty());
    }

    #[test]
    fn test_beta_schedule_follows_updates() {
        let per_config = PerConfig::default().beta_0(0.4).beta_final(1.0).n_opts_final(2);
        let mut buffer = buffer(2, &per_config);
        assert!((buffer.beta() - 0.4).abs() < 1e-6);
        buffer.update_priorities(&[0], &[1.0]).unwrap();
        buffer.update_priorities(&[1], &[1.0]).unwrap();
        assert_eq!(buffer.beta(), 1.0);
        buffer.update_priorities(&[1], &[1.0]).unwrap();
        assert_eq!(buffer.beta(), 1.0);
    }

    #[test]
    fn test_beta_without_annealing() {
        let per_config = PerConfig::default().beta_0(0.5).n_opts_final(0);
        let buffer = buffer(2, &per_config);
        assert_eq!(buffer.beta(), 1.0);
    }

    #[test]
    fn test_weights_of_unstored_indices() {
        let mut buffer = PrioritizedReplayBuffer::<i32, i32>::new(2, 4, 42, &PerConfig::default());
        buffer.add(0, tr(0)).unwrap();
        assert_eq!(
            buffer.importance_weights(&[2]),
            Err(ReplayBufferError::OutOfRange { index: 2, len: 8 })
        );
        assert_eq!(
            buffer.importance_weights(&[0, 99]),
            Err(ReplayBufferError::OutOfRange { index: 99, len: 8 })
        );
        assert_eq!(buffer.importance_weights(&[0]).unwrap(), vec![1.0]);
    }

    #[test]
    fn test_snapshot_with_corrupt_priorities_rejected() {
        let mut buffer = buffer(4, &PerConfig::default());
        buffer.update_priorities(&[0, 1, 2, 3], &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let snapshot = buffer.snapshot();

        let corrupt = |f: &dyn Fn(&mut PrioritySnapshot)| {
            let mut snapshot = snapshot.clone();
            if let Some(p) = snapshot.priorities.as_mut() {
                f(p);
            }
            PrioritizedReplayBuffer::from_snapshot(snapshot, 0, &PerConfig::default())
        };
        let is_invalid = |r: Result<PrioritizedReplayBuffer<i32, i32>>| {
            matches!(r, Err(ReplayBufferError::InvalidSnapshot(_)))
        };

        assert!(is_invalid(corrupt(&|p| p.priorities[1] = f32::NAN)));
        assert!(is_invalid(corrupt(&|p| p.priorities[2] = -3.0)));
        assert!(is_invalid(corrupt(&|p| p.priorities[3] = 0.0)));
        assert!(is_invalid(corrupt(&|p| p.max_priority = f32::INFINITY)));
        assert!(is_invalid(corrupt(&|p| p.max_priority = 0.5)));
        assert!(is_invalid(corrupt(&|p| p.priorities.truncate(2))));

        let restored = corrupt(&|_| ()).unwrap();
        assert_eq!(restored.priority(3), buffer.priority(3));
        assert_eq!(restored.max_priority(), buffer.max_priority());
    }
}
