#![warn(missing_docs)]
//! Trajectory-aware replay buffers for reinforcement learning.
//!
//! Transitions collected from one or more environments are stored in fixed-capacity
//! ring buffers, which keep track of the episode each transition belongs to. This
//! makes it possible to compute training targets that respect episode boundaries:
//!
//! * [`returns::compute_nstep_return`] for n-step targets of off-policy agents,
//! * [`returns::compute_episodic_return`] for generalized advantage estimation.
//!
//! Termination and truncation are distinct: a terminated step has no successor value,
//! while the value of `next_obs` is bootstrapped for a truncated one.
//!
//! # Collecting transitions
//!
//! An environment implementing [`Env`] emits a [`Step`] for every interaction.
//! A [`StepProcessor`] such as
//! [`SimpleStepProcessor`](replay_buffer::SimpleStepProcessor) turns it into a
//! [`Transition`], which is added to a buffer with the id of the environment:
//!
//! ```rust
//! use border_replay::{
//!     replay_buffer::VectorReplayBuffer, returns::compute_episodic_return, Transition,
//! };
//!
//! let mut buffer = VectorReplayBuffer::<f32, i64>::new(1, 10, 42);
//! for t in 0..10 {
//!     let tr = Transition::new(t as f32, 0, 1.0, (t + 1) as f32).terminated(t == 9);
//!     buffer.add(0, tr)?;
//! }
//!
//! let batch = buffer.sample(0)?;
//! let zeros = vec![0.0; batch.len()];
//! let (returns, _) =
//!     compute_episodic_return(&buffer, &batch.ix_sample, &zeros, &zeros, 1.0, 1.0)?;
//! assert_eq!(returns[0], 10.0);
//! # Ok::<(), border_replay::ReplayBufferError>(())
//! ```
pub mod error;
pub mod replay_buffer;
pub mod returns;

mod base;
pub use base::{Env, EpisodicBuffer, Info, ReplayBufferBase, Step, StepProcessor};
pub use error::ReplayBufferError;

mod transition;
pub use transition::Transition;
