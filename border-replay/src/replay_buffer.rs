//! Replay buffers that keep track of episodes.
//!
//! Transitions of each environment are written to a [`TransitionStore`], a ring
//! buffer whose slots are linked into episodes by an [`EpisodeIndex`].
//! [`VectorReplayBuffer`] puts one store per environment behind global indices, and
//! [`PrioritizedReplayBuffer`] samples from it proportionally to priorities.
//!
//! # Examples
//!
//! ```rust
//! use border_replay::{
//!     replay_buffer::{PerConfig, PrioritizedReplayBuffer, ReplayBufferConfig},
//!     ReplayBufferBase, Transition,
//! };
//!
//! let config = ReplayBufferConfig::default()
//!     .capacity(100)
//!     .n_envs(2)
//!     .per_config(Some(PerConfig::default()));
//! let mut buffer = PrioritizedReplayBuffer::<f32, i64>::build(&config);
//!
//! for t in 0..10 {
//!     let tr = Transition::new(t as f32, 0, 1.0, t as f32 + 1.0).terminated(t == 9);
//!     buffer.add(t % 2, tr)?;
//! }
//!
//! let batch = buffer.batch(4)?;
//! let td_errs = vec![0.5; batch.len()];
//! buffer.update_priorities(&batch.ix_sample, &td_errs)?;
//! # Ok::<(), border_replay::ReplayBufferError>(())
//! ```
mod batch;
mod config;
mod episode_index;
mod prioritized;
mod snapshot;
mod step_proc;
mod store;
mod vector;
pub use batch::TransitionBatch;
pub use config::{PerConfig, ReplayBufferConfig};
pub use episode_index::EpisodeIndex;
pub use prioritized::{PrioritizedReplayBuffer, WeightNormalizer};
pub use snapshot::{BufferSnapshot, PrioritySnapshot, StoreSnapshot};
pub use step_proc::{SimpleStepProcessor, SimpleStepProcessorConfig};
pub use store::{EpisodeStats, TransitionStore};
pub use vector::VectorReplayBuffer;
