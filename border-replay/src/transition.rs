//! A single environment transition.
use crate::error::{ReplayBufferError, Result};
use serde::{Deserialize, Serialize};

/// A transition `(o_t, a_t, r_t, o_t+1)` with end-of-episode flags.
///
/// `is_terminated` means that the environment reached a terminal state, so the value
/// of `next_obs` is zero by definition. `is_truncated` means that the episode was cut
/// for an external reason, e.g., a time limit, and `next_obs` still has a value.
///
/// `truncated_override` carries a truncation flag reported by the environment through
/// its side channel ([`Info`](crate::Info)). It is resolved once when the transition is
/// pushed into a buffer; stored transitions always have it set to `None`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transition<O, A> {
    /// Observation `o_t`.
    pub obs: O,

    /// Action `a_t`.
    pub act: A,

    /// Reward `r_t`.
    pub reward: f32,

    /// Observation `o_t+1`.
    pub next_obs: O,

    /// Flag denoting if the episode is terminated.
    pub is_terminated: bool,

    /// Flag denoting if the episode is truncated.
    pub is_truncated: bool,

    /// Truncation flag overriding `is_truncated`.
    pub truncated_override: Option<bool>,
}

impl<O, A> Transition<O, A> {
    /// Creates a transition of an ongoing episode.
    pub fn new(obs: O, act: A, reward: f32, next_obs: O) -> Self {
        Self {
            obs,
            act,
            reward,
            next_obs,
            is_terminated: false,
            is_truncated: false,
            truncated_override: None,
        }
    }

    /// Sets the termination flag.
    pub fn terminated(mut self, v: bool) -> Self {
        self.is_terminated = v;
        self
    }

    /// Sets the truncation flag.
    pub fn truncated(mut self, v: bool) -> Self {
        self.is_truncated = v;
        self
    }

    /// Sets the truncation flag reported through the side channel.
    pub fn truncated_override(mut self, v: Option<bool>) -> Self {
        self.truncated_override = v;
        self
    }

    /// Returns `(is_terminated, is_truncated)` after applying the override.
    ///
    /// Fails if both flags are still asserted.
    pub fn end_flags(&self) -> Result<(bool, bool)> {
        match resolve_end_flags(self.is_terminated, self.is_truncated, self.truncated_override) {
            (true, true) => Err(ReplayBufferError::ConflictingEndFlags),
            flags => Ok(flags),
        }
    }

    /// Terminated or truncated, after applying the override.
    pub fn is_done(&self) -> bool {
        let (terminated, truncated) =
            resolve_end_flags(self.is_terminated, self.is_truncated, self.truncated_override);
        terminated || truncated
    }
}

/// A truncation reported through the side channel wins over the terminal flag.
pub(crate) fn resolve_end_flags(
    is_terminated: bool,
    is_truncated: bool,
    truncated_override: Option<bool>,
) -> (bool, bool) {
    match truncated_override {
        Some(true) => (false, true),
        Some(false) => (is_terminated, false),
        None => (is_terminated, is_truncated),
    }
}
