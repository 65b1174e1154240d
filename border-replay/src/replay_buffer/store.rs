//! Fixed-capacity ring storage of transitions for a single environment.
use super::{EpisodeIndex, StoreSnapshot, TransitionBatch};
use crate::{
    error::{ReplayBufferError, Result},
    EpisodicBuffer, Transition,
};
use log::{debug, trace};

/// Summary of a finished episode.
#[derive(Clone, Debug, PartialEq)]
pub struct EpisodeStats {
    /// Slot of the first step of the episode when it was written.
    pub start: usize,

    /// Number of steps.
    pub len: usize,

    /// Sum of rewards.
    pub reward: f32,
}

/// Running statistics of the episode being written.
#[derive(Clone, Debug, Default)]
struct RunningEpisode {
    start: usize,
    len: usize,
    reward: f32,
}

/// Ring buffer of transitions collected from a single environment.
///
/// Transitions are written at a cursor that wraps around, so that the oldest one
/// is overwritten when the store is full. Every written slot is registered in an
/// [`EpisodeIndex`], which keeps track of the episode it belongs to.
///
/// Slots `0..len()` are the written ones: the cursor starts at slot 0 and only
/// wraps around once all slots are filled.
#[derive(Clone, Debug)]
pub struct TransitionStore<O, A> {
    /// Maximum number of transitions that can be stored.
    capacity: usize,

    /// Current insertion index.
    i: usize,

    /// Current number of stored transitions.
    size: usize,

    obs: Vec<O>,
    act: Vec<A>,
    next_obs: Vec<O>,
    reward: Vec<f32>,
    is_terminated: Vec<bool>,
    is_truncated: Vec<bool>,

    episode_index: EpisodeIndex,
    running: RunningEpisode,
    last_episode: Option<EpisodeStats>,
}

impl<O, A> TransitionStore<O, A> {
    /// Creates an empty store.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            i: 0,
            size: 0,
            obs: Vec::with_capacity(capacity),
            act: Vec::with_capacity(capacity),
            next_obs: Vec::with_capacity(capacity),
            reward: Vec::with_capacity(capacity),
            is_terminated: Vec::with_capacity(capacity),
            is_truncated: Vec::with_capacity(capacity),
            episode_index: EpisodeIndex::new(capacity),
            running: RunningEpisode::default(),
            last_episode: None,
        }
    }

    /// Builds a store from an existing dataset, e.g., for offline RL.
    ///
    /// Equivalent to [`TransitionStore::add`] of each transition in order.
    pub fn from_transitions<I>(capacity: usize, transitions: I) -> Result<Self>
    where
        I: IntoIterator<Item = Transition<O, A>>,
    {
        let mut store = Self::new(capacity);
        for tr in transitions {
            store.add(tr)?;
        }
        Ok(store)
    }

    /// Inserts a transition at the write cursor and returns the slot written.
    ///
    /// When the store is full the oldest transition is overwritten. If it was the
    /// first stored step of an episode, the following step becomes the start of
    /// that episode.
    pub fn add(&mut self, tr: Transition<O, A>) -> Result<usize> {
        let (is_terminated, is_truncated) = tr.end_flags()?;
        let Transition {
            obs,
            act,
            reward,
            next_obs,
            ..
        } = tr;
        let i = self.i;

        if self.size < self.capacity {
            debug_assert_eq!(i, self.obs.len());
            self.obs.push(obs);
            self.act.push(act);
            self.next_obs.push(next_obs);
            self.reward.push(reward);
            self.is_terminated.push(is_terminated);
            self.is_truncated.push(is_truncated);
        } else {
            self.obs[i] = obs;
            self.act[i] = act;
            self.next_obs[i] = next_obs;
            self.reward[i] = reward;
            self.is_terminated[i] = is_terminated;
            self.is_truncated[i] = is_truncated;
        }

        self.register(i);
        trace!(
            "Added transition at slot {} (terminated = {}, truncated = {})",
            i,
            is_terminated,
            is_truncated
        );

        self.i = (i + 1) % self.capacity;
        self.size = (self.size + 1).min(self.capacity);
        Ok(i)
    }

    /// Links slot `i` into its episode and updates episode statistics.
    fn register(&mut self, i: usize) {
        let is_done = self.is_terminated[i] || self.is_truncated[i];
        if self.running.len == 0 {
            self.running.start = i;
        }
        self.episode_index.insert(i, is_done);
        self.running.len += 1;
        self.running.reward += self.reward[i];

        if is_done {
            let stats = EpisodeStats {
                start: self.running.start,
                len: self.running.len,
                reward: self.running.reward,
            };
            debug!(
                "Episode finished: {} steps, reward = {}",
                stats.len, stats.reward
            );
            self.last_episode = Some(stats);
            self.running = RunningEpisode::default();
        }
    }

    /// Removes all transitions. The capacity is unchanged.
    pub fn reset(&mut self) {
        self.i = 0;
        self.size = 0;
        self.obs.clear();
        self.act.clear();
        self.next_obs.clear();
        self.reward.clear();
        self.is_terminated.clear();
        self.is_truncated.clear();
        self.episode_index.reset();
        self.running = RunningEpisode::default();
        self.last_episode = None;
    }

    /// Number of stored transitions.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Returns `true` if no transition is stored.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Maximum number of transitions.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slot of the latest write.
    pub fn last_index(&self) -> Option<usize> {
        self.episode_index.last_index()
    }

    /// Written slots from the oldest to the latest.
    pub fn indices(&self) -> Vec<usize> {
        if self.size < self.capacity {
            (0..self.size).collect()
        } else {
            (self.i..self.capacity).chain(0..self.i).collect()
        }
    }

    /// The most recently finished episode.
    pub fn last_episode(&self) -> Option<&EpisodeStats> {
        self.last_episode.as_ref()
    }

    /// The episode index of the store.
    pub fn episode_index(&self) -> &EpisodeIndex {
        &self.episode_index
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.size {
            Ok(())
        } else {
            Err(ReplayBufferError::OutOfRange {
                index,
                len: self.size,
            })
        }
    }
}

impl<O: Clone, A: Clone> TransitionStore<O, A> {
    /// Returns the transition stored at `index`.
    pub fn get(&self, index: usize) -> Result<Transition<O, A>> {
        self.check_index(index)?;
        Ok(Transition {
            obs: self.obs[index].clone(),
            act: self.act[index].clone(),
            reward: self.reward[index],
            next_obs: self.next_obs[index].clone(),
            is_terminated: self.is_terminated[index],
            is_truncated: self.is_truncated[index],
            truncated_override: None,
        })
    }

    /// Appends the transition at `ix` to `batch`, recording `ix + offset` in `ix_sample`.
    pub(crate) fn gather(
        &self,
        ix: usize,
        offset: usize,
        batch: &mut TransitionBatch<O, A>,
    ) -> Result<()> {
        self.check_index(ix)?;
        batch.obs.push(self.obs[ix].clone());
        batch.act.push(self.act[ix].clone());
        batch.next_obs.push(self.next_obs[ix].clone());
        batch.reward.push(self.reward[ix]);
        batch.is_terminated.push(self.is_terminated[ix]);
        batch.is_truncated.push(self.is_truncated[ix]);
        batch.ix_sample.push(ix + offset);
        Ok(())
    }

    /// Takes a snapshot of the store.
    pub fn snapshot(&self) -> StoreSnapshot<O, A> {
        let transitions = (0..self.size)
            .map(|ix| Transition {
                obs: self.obs[ix].clone(),
                act: self.act[ix].clone(),
                reward: self.reward[ix],
                next_obs: self.next_obs[ix].clone(),
                is_terminated: self.is_terminated[ix],
                is_truncated: self.is_truncated[ix],
                truncated_override: None,
            })
            .collect();
        StoreSnapshot {
            capacity: self.capacity,
            cursor: self.i,
            transitions,
        }
    }
}

impl<O, A> TransitionStore<O, A> {
    /// Restores a store from a snapshot, preserving slot indices.
    ///
    /// Episode links are rebuilt from the stored flags in insertion order.
    pub fn from_snapshot(snapshot: StoreSnapshot<O, A>) -> Result<Self> {
        let StoreSnapshot {
            capacity,
            cursor,
            transitions,
        } = snapshot;
        let size = transitions.len();
        if capacity == 0 || size > capacity {
            return Err(ReplayBufferError::InvalidSnapshot(format!(
                "{} transitions for capacity {}",
                size, capacity
            )));
        }
        if (size < capacity && cursor != size) || cursor >= capacity {
            return Err(ReplayBufferError::InvalidSnapshot(format!(
                "cursor {} with {} transitions for capacity {}",
                cursor, size, capacity
            )));
        }

        let mut store = Self::new(capacity);
        for tr in transitions {
            let (is_terminated, is_truncated) = tr.end_flags()?;
            store.obs.push(tr.obs);
            store.act.push(tr.act);
            store.next_obs.push(tr.next_obs);
            store.reward.push(tr.reward);
            store.is_terminated.push(is_terminated);
            store.is_truncated.push(is_truncated);
        }
        store.size = size;
        store.i = cursor;

        for i in store.indices() {
            store.register(i);
        }
        Ok(store)
    }
}

impl<O, A> EpisodicBuffer for TransitionStore<O, A> {
    fn len(&self) -> usize {
        self.size
    }

    fn contains(&self, index: usize) -> bool {
        index < self.size
    }

    fn reward(&self, index: usize) -> f32 {
        self.reward[index]
    }

    fn is_terminated(&self, index: usize) -> bool {
        self.is_terminated[index]
    }

    fn is_truncated(&self, index: usize) -> bool {
        self.is_truncated[index]
    }

    fn previous_in_episode(&self, index: usize) -> Option<usize> {
        self.episode_index.previous_in_episode(index)
    }

    fn next_in_episode(&self, index: usize) -> Option<usize> {
        self.episode_index.next_in_episode(index)
    }

    fn episode_start(&self, index: usize) -> usize {
        self.episode_index.episode_start(index)
    }

    fn unfinished_indices(&self) -> Vec<usize> {
        self.episode_index.unfinished_indices()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tr(o: i32, done: bool) -> Transition<i32, i32> {
        Transition::new(o, o * 10, 1.0, o + 1).terminated(done)
    }

    #[test]
    fn test_get_within_capacity() {
        let mut store = TransitionStore::new(5);
        for o in 0..5 {
            assert_eq!(store.add(tr(o, false)).unwrap(), o as usize);
        }
        for o in 0..5 {
            assert_eq!(store.get(o as usize).unwrap(), tr(o, false));
        }
        assert_eq!(
            store.get(5),
            Err(ReplayBufferError::OutOfRange { index: 5, len: 5 })
        );
    }

    #[test]
    fn test_unwritten_slot() {
        let mut store = TransitionStore::new(5);
        store.add(tr(0, false)).unwrap();
        assert!(store.get(1).is_err());
        assert!(!store.contains(1));
    }

    #[test]
    fn test_ring_overwrite() {
        let capacity = 6;
        let k = 4;
        let mut store = TransitionStore::new(capacity);
        for o in 0..(capacity + k) as i32 {
            store.add(tr(o, false)).unwrap();
        }
        assert_eq!(store.len(), capacity);
        // The oldest k entries have been replaced by the latest ones.
        for ix in 0..k {
            assert_eq!(store.get(ix).unwrap().obs, (capacity + ix) as i32);
        }
        for ix in k..capacity {
            assert_eq!(store.get(ix).unwrap().obs, ix as i32);
        }
        assert_eq!(store.indices(), vec![4, 5, 0, 1, 2, 3]);
        assert_eq!(store.episode_start(3), 4);
        assert_eq!(store.previous_in_episode(4), None);
        assert_eq!(store.next_in_episode(5), Some(0));
    }

    #[test]
    fn test_adjacency_round_trip() {
        let mut store = TransitionStore::new(7);
        for (o, done) in [false, false, true, false, false, false, true]
            .iter()
            .enumerate()
        {
            store.add(tr(o as i32, *done)).unwrap();
        }
        for ix in 0..7 {
            if let Some(prev) = store.previous_in_episode(ix) {
                assert_eq!(store.next_in_episode(prev), Some(ix));
            }
            if let Some(next) = store.next_in_episode(ix) {
                assert_eq!(store.previous_in_episode(next), Some(ix));
            }
        }
        assert_eq!(store.next_in_episode(2), None);
        assert_eq!(store.previous_in_episode(3), None);
    }

    #[test]
    fn test_episode_stats_and_reset() {
        let mut store = TransitionStore::new(4);
        store.add(tr(0, false)).unwrap();
        store.add(tr(1, false)).unwrap();
        assert_eq!(store.last_episode(), None);
        store.add(tr(2, true)).unwrap();
        assert_eq!(
            store.last_episode(),
            Some(&EpisodeStats {
                start: 0,
                len: 3,
                reward: 3.0
            })
        );
        assert!(store.unfinished_indices().is_empty());
        store.add(tr(3, false)).unwrap();
        assert_eq!(store.unfinished_indices(), vec![3]);

        store.reset();
        assert!(store.is_empty());
        assert_eq!(store.capacity(), 4);
        assert_eq!(store.last_index(), None);
        assert_eq!(store.add(tr(9, false)).unwrap(), 0);
    }

    #[test]
    fn test_gather_with_offset() {
        let store = TransitionStore::from_transitions(4, (0..3).map(|o| tr(o, o == 1))).unwrap();
        let mut batch = TransitionBatch::with_capacity(2);
        store.gather(2, 8, &mut batch).unwrap();
        store.gather(1, 8, &mut batch).unwrap();
        assert_eq!(batch.ix_sample, vec![10, 9]);
        assert_eq!(batch.obs, vec![2, 1]);
        assert_eq!(batch.act, vec![20, 10]);
        assert_eq!(batch.is_terminated, vec![false, true]);
        assert_eq!(
            store.gather(3, 8, &mut batch),
            Err(ReplayBufferError::OutOfRange { index: 3, len: 3 })
        );
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_conflicting_flags_rejected() {
        let mut store = TransitionStore::new(2);
        let bad = tr(0, true).truncated(true);
        assert_eq!(store.add(bad), Err(ReplayBufferError::ConflictingEndFlags));
        assert!(store.is_empty());
    }

    #[test]
    fn test_from_transitions() {
        let store =
            TransitionStore::from_transitions(3, (0..5).map(|o| tr(o, o == 1))).unwrap();
        assert_eq!(store.indices(), vec![2, 0, 1]);
        assert_eq!(store.get(1).unwrap().obs, 4);
        // Step 1 terminated its episode and has been evicted; 2, 3 and 4 form one episode.
        assert_eq!(store.episode_start(1), 2);
    }
}
