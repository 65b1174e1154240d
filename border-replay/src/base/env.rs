//! Environment.
use super::{Info, Step};
use anyhow::Result;
use std::fmt::Debug;

/// Represents an environment, typically an MDP.
///
/// Replay buffers never call environments. This trait fixes the contract of the
/// collector side: each call of [`Env::step`] emits a [`Step`] that carries explicit
/// termination and truncation flags, which a [`StepProcessor`](super::StepProcessor)
/// turns into transitions.
pub trait Env {
    /// Configurations.
    type Config: Clone;

    /// Observation of the environment.
    type Obs: Clone + Debug;

    /// Action of the environment.
    type Act: Clone + Debug;

    /// Information in the [`Step`] object.
    type Info: Info;

    /// Builds an environment with a given random seed.
    fn build(config: &Self::Config, seed: i64) -> Result<Self>
    where
        Self: Sized;

    /// Performes an environment step.
    fn step(&mut self, a: &Self::Act) -> Step<Self>
    where
        Self: Sized;

    /// Resets the environment and returns the initial observation.
    fn reset(&mut self) -> Result<Self::Obs>;

    /// Performes an environment step and resets the environment if the episode ends.
    ///
    /// The initial observation of the next episode is set to [`Step::init_obs`].
    fn step_with_reset(&mut self, a: &Self::Act) -> Result<Step<Self>>
    where
        Self: Sized,
    {
        let mut step = self.step(a);
        if step.is_done() {
            step.init_obs = Some(self.reset()?);
        }
        Ok(step)
    }
}
