//! Environment step.
use super::Env;
use crate::transition::resolve_end_flags;

/// Additional information to `Obs` and `Act`.
pub trait Info {
    /// Truncation flag reported by the environment out of band.
    ///
    /// Some environments signal a time limit only through their side information
    /// while marking the step as terminal. Returning `Some(true)` here makes the
    /// step truncated and not terminated.
    fn truncated_override(&self) -> Option<bool> {
        None
    }
}

impl Info for () {}

/// Represents an action, observation and reward tuple `(a_t, o_t+1, r_t)`
/// with some additional information.
///
/// An environment emits [`Step`] object at every interaction steps.
/// This object is used to create transitions `(o_t, a_t, o_t+1, r_t)`.
pub struct Step<E: Env> {
    /// Action.
    pub act: E::Act,

    /// Observation.
    pub obs: E::Obs,

    /// Reward.
    pub reward: f32,

    /// Flag denoting if episode is terminated.
    pub is_terminated: bool,

    /// Flag denoting if episode is truncated.
    pub is_truncated: bool,

    /// Information defined by user.
    pub info: E::Info,

    /// Initial observation of the next episode, set when the episode ends.
    pub init_obs: Option<E::Obs>,
}

impl<E: Env> Step<E> {
    /// Constructs a [`Step`] object.
    pub fn new(
        obs: E::Obs,
        act: E::Act,
        reward: f32,
        is_terminated: bool,
        is_truncated: bool,
        info: E::Info,
        init_obs: Option<E::Obs>,
    ) -> Self {
        Step {
            act,
            obs,
            reward,
            is_terminated,
            is_truncated,
            info,
            init_obs,
        }
    }

    #[inline]
    /// Terminated or truncated, taking [`Info::truncated_override`] into account.
    pub fn is_done(&self) -> bool {
        let (terminated, truncated) = resolve_end_flags(
            self.is_terminated,
            self.is_truncated,
            self.info.truncated_override(),
        );
        terminated || truncated
    }
}

/// Process [`Step`] and output an item [`Self::Output`].
///
/// [`Step`] object is transformed to [`Self::Output`], which will be pushed into a
/// replay buffer.
///
/// [`Self::Output`]: StepProcessor::Output
pub trait StepProcessor<E: Env> {
    /// Configuration.
    type Config: Clone;

    /// The type of transitions produced by this trait.
    type Output;

    /// Build a producer.
    fn build(config: &Self::Config) -> Self;

    /// Resets the object.
    fn reset(&mut self, init_obs: E::Obs);

    /// Processes a [`Step`] object.
    fn process(&mut self, step: Step<E>) -> Self::Output;
}
