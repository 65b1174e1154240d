//! Sum tree for prioritized sampling.
//!
//! The layout follows https://github.com/jaromiru/AI-blog/blob/master/SumTree.py:
//! a complete binary tree in a flat array with the leaves at the end.
use rand::Rng;
use segment_tree::{ops::MinIgnoreNaN, SegmentPoint};
use serde::{Deserialize, Serialize};

/// Normalization of importance sampling weights.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
pub enum WeightNormalizer {
    /// Normalize by the largest possible weight among all stored transitions,
    /// i.e., the one of the smallest priority.
    All,

    /// Normalize by the largest weight in the sampled batch.
    Batch,
}

/// Sampling weights `p_i^alpha` arranged for proportional sampling.
#[derive(Debug)]
pub struct SumTree {
    alpha: f32,
    capacity: usize,

    /// Internal nodes hold the sum of their children.
    tree: Vec<f32>,

    /// Priorities before taking the power of alpha, zero for unwritten slots.
    priorities: Vec<f32>,

    min_tree: SegmentPoint<f32, MinIgnoreNaN>,
}

impl SumTree {
    pub fn new(capacity: usize, alpha: f32) -> Self {
        Self {
            alpha,
            capacity,
            tree: vec![0f32; 2 * capacity - 1],
            priorities: vec![0f32; capacity],
            min_tree: SegmentPoint::build(vec![f32::MAX; capacity], MinIgnoreNaN),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sets the priority of `ix`. Its sampling weight is `p^alpha`.
    pub fn set(&mut self, ix: usize, p: f32) {
        assert!(ix < self.capacity, "index {} is out of capacity", ix);
        let w = p.powf(self.alpha);
        self.priorities[ix] = p;
        self.min_tree.modify(ix, w);

        let mut node = ix + self.capacity - 1;
        self.tree[node] = w;
        while node > 0 {
            node = (node - 1) / 2;
            self.tree[node] = self.tree[2 * node + 1] + self.tree[2 * node + 2];
        }
    }

    /// Removes all priorities.
    pub fn clear(&mut self) {
        self.tree.iter_mut().for_each(|w| *w = 0.0);
        self.priorities.iter_mut().for_each(|p| *p = 0.0);
        self.min_tree = SegmentPoint::build(vec![f32::MAX; self.capacity], MinIgnoreNaN);
    }

    pub fn total(&self) -> f32 {
        self.tree[0]
    }

    /// Sampling weight of `ix`.
    pub fn weight(&self, ix: usize) -> f32 {
        self.tree[ix + self.capacity - 1]
    }

    pub fn priorities(&self) -> &[f32] {
        &self.priorities
    }

    /// The smallest sampling weight of the written slots.
    pub fn min_weight(&self) -> f32 {
        self.min_tree.query(0, self.capacity)
    }

    /// Index of the leaf where the cumulative weight exceeds `s`.
    ///
    /// Zero-weight leaves are never returned as long as the total is positive.
    pub fn get(&self, s: f32) -> usize {
        let mut node = 0;
        let mut s = s;
        loop {
            let left = 2 * node + 1;
            if left >= self.tree.len() {
                break;
            }
            let right = left + 1;
            if s < self.tree[left] || self.tree[right] <= 0.0 {
                node = left;
            } else {
                s -= self.tree[left];
                node = right;
            }
        }
        debug_assert!(node >= self.capacity - 1);
        node + 1 - self.capacity
    }

    /// Draws `batch_size` indices with replacement, proportionally to their weights.
    pub fn sample<R: Rng>(&self, rng: &mut R, batch_size: usize) -> Vec<usize> {
        let total = self.total();
        (0..batch_size)
            .map(|_| self.get(total * rng.gen::<f32>()))
            .collect()
    }
}
