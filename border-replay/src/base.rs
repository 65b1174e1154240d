//! Core interfaces.
mod env;
mod replay_buffer;
mod step;
pub use env::Env;
pub use replay_buffer::{EpisodicBuffer, ReplayBufferBase};
pub use step::{Info, Step, StepProcessor};
