//! Episode links over the slots of a ring buffer.
//!
//! Links are kept in flat arrays indexed by slot, so that an insertion or an
//! overwrite updates them in constant time.

/// Navigable links between the stored steps of the same episode.
///
/// Slots are written cyclically by the owning store. The write with insertion
/// number `seq` always lands in slot `seq % capacity`, which lets the index tell
/// the oldest stored step without scanning.
#[derive(Clone, Debug)]
pub struct EpisodeIndex {
    capacity: usize,

    /// Previous step in the same episode.
    prev: Vec<Option<usize>>,

    /// Next step in the same episode.
    next: Vec<Option<usize>>,

    /// Insertion number of the step in each slot, `None` if never written.
    seq: Vec<Option<u64>>,

    /// Insertion number of the first step of the episode of each slot.
    start_seq: Vec<u64>,

    /// Number of written slots.
    len: usize,

    /// Slot of the latest insertion.
    last: Option<usize>,

    /// Whether the latest insertion closed its episode.
    last_done: bool,
}

impl EpisodeIndex {
    /// Creates an empty index for `capacity` slots.
    pub(crate) fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be positive");
        Self {
            capacity,
            prev: vec![None; capacity],
            next: vec![None; capacity],
            seq: vec![None; capacity],
            start_seq: vec![0; capacity],
            len: 0,
            last: None,
            last_done: false,
        }
    }

    /// Registers a step written at `slot`.
    ///
    /// The step continues the episode of the previous insertion unless that one
    /// was terminated or truncated. If `slot` held an older step, the step is
    /// evicted first.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is not the slot following the previous insertion.
    pub(crate) fn insert(&mut self, slot: usize, is_done: bool) {
        assert!(slot < self.capacity, "slot {} is out of capacity", slot);
        let seq = match self.last {
            Some(last) => self.seq[last].expect("latest slot must be written") + 1,
            None => slot as u64,
        };
        assert_eq!(
            seq % self.capacity as u64,
            slot as u64,
            "slot {} does not follow the latest insertion",
            slot
        );

        if self.seq[slot].is_some() {
            self.evict(slot);
        } else {
            self.len += 1;
        }

        let prev = if self.last_done { None } else { self.last };
        match prev {
            // With a single slot the predecessor has just been evicted.
            Some(p) if p != slot => {
                self.next[p] = Some(slot);
                self.prev[slot] = Some(p);
                self.start_seq[slot] = self.start_seq[p];
            }
            Some(_) => {
                self.prev[slot] = None;
            }
            None => {
                self.prev[slot] = None;
                self.start_seq[slot] = seq;
            }
        }
        self.next[slot] = None;
        self.seq[slot] = Some(seq);
        self.last = Some(slot);
        self.last_done = is_done;
    }

    /// Unlinks the oldest step, which is about to be overwritten.
    ///
    /// The following step of its episode, if any, becomes the start of the remnant.
    fn evict(&mut self, slot: usize) {
        debug_assert!(
            self.prev[slot].is_none(),
            "the oldest slot cannot have a predecessor"
        );
        if let Some(n) = self.next[slot].take() {
            assert!(n < self.capacity, "episode link {} is out of capacity", n);
            self.prev[n] = None;
        }
    }

    /// Clears all links.
    pub(crate) fn reset(&mut self) {
        self.prev.iter_mut().for_each(|p| *p = None);
        self.next.iter_mut().for_each(|n| *n = None);
        self.seq.iter_mut().for_each(|s| *s = None);
        self.len = 0;
        self.last = None;
        self.last_done = false;
    }

    /// Returns `true` if `slot` has been written.
    pub fn contains(&self, slot: usize) -> bool {
        slot < self.capacity && self.seq[slot].is_some()
    }

    /// Number of written slots.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no slot has been written.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Slot of the latest insertion.
    pub fn last_index(&self) -> Option<usize> {
        self.last
    }

    /// Slot of the oldest stored step.
    pub fn first_index(&self) -> Option<usize> {
        self.last.map(|_| (self.oldest_seq() % self.capacity as u64) as usize)
    }

    /// Previous step in the same episode.
    pub fn previous_in_episode(&self, slot: usize) -> Option<usize> {
        self.check(slot);
        self.prev[slot]
    }

    /// Next step in the same episode.
    pub fn next_in_episode(&self, slot: usize) -> Option<usize> {
        self.check(slot);
        self.next[slot]
    }

    /// Oldest stored step of the episode of `slot`.
    ///
    /// When the first steps of an episode have been overwritten, the oldest
    /// remaining step is the start of the episode.
    pub fn episode_start(&self, slot: usize) -> usize {
        self.check(slot);
        let start = self.start_seq[slot].max(self.oldest_seq());
        (start % self.capacity as u64) as usize
    }

    /// Latest step, if its episode is neither terminated nor truncated.
    pub fn unfinished_indices(&self) -> Vec<usize> {
        match self.last {
            Some(last) if !self.last_done => vec![last],
            _ => vec![],
        }
    }

    fn oldest_seq(&self) -> u64 {
        match self.last {
            Some(last) => {
                let newest = self.seq[last].expect("latest slot must be written");
                newest + 1 - self.len as u64
            }
            None => 0,
        }
    }

    #[inline]
    fn check(&self, slot: usize) {
        assert!(
            self.contains(slot),
            "slot {} has not been written (capacity = {})",
            slot,
            self.capacity
        );
    }
}
