//! Persisted state of replay buffers.
//!
//! A snapshot is a plain record of the buffer contents; episode links are not part
//! of it and are rebuilt from the stored flags when a buffer is restored.
use crate::Transition;
use anyhow::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

/// Contents of a [`TransitionStore`](super::TransitionStore).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot<O, A> {
    /// Capacity of the store.
    pub capacity: usize,

    /// Write cursor.
    pub cursor: usize,

    /// Transitions in slot order.
    pub transitions: Vec<Transition<O, A>>,
}

/// Priorities of a [`PrioritizedReplayBuffer`](super::PrioritizedReplayBuffer).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrioritySnapshot {
    /// Priority of each global index, zero for unwritten slots.
    pub priorities: Vec<f32>,

    /// Priority given to new transitions.
    pub max_priority: f32,

    /// Number of priority updates, used for scheduling the importance weight exponent.
    pub n_opts: usize,
}

/// Contents of a [`VectorReplayBuffer`](super::VectorReplayBuffer), and priorities
/// when taken from a prioritized buffer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BufferSnapshot<O, A> {
    /// Capacity of each per-environment store.
    pub capacity_per_env: usize,

    /// One store per environment.
    pub stores: Vec<StoreSnapshot<O, A>>,

    /// Priorities, if any.
    pub priorities: Option<PrioritySnapshot>,
}

impl<O, A> BufferSnapshot<O, A>
where
    O: Serialize + DeserializeOwned,
    A: Serialize + DeserializeOwned,
{
    /// Writes the snapshot to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Reads a snapshot from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let snapshot = bincode::deserialize_from(BufReader::new(file))?;
        Ok(snapshot)
    }
}
