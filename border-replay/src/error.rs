//! Errors in the library.
use thiserror::Error;

/// Errors raised by replay buffers and return estimation.
///
/// All variants are local conditions reported to the call site. Broken episode links
/// are not represented here; they are bugs and trigger a panic.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReplayBufferError {
    /// Index is outside the buffer or points to a slot that has never been written.
    #[error("Index {index} is out of range (len = {len})")]
    OutOfRange {
        /// The requested index.
        index: usize,
        /// The number of addressable slots.
        len: usize,
    },

    /// Caller-supplied values do not match the number of sampled indices.
    #[error("Shape mismatch: expected {expected} values, got {got}")]
    ShapeMismatch {
        /// Number of sampled indices.
        expected: usize,
        /// Number of supplied values.
        got: usize,
    },

    /// Discount or GAE lambda outside `[0, 1]`.
    #[error("Discount factor must be in [0, 1], got {0}")]
    InvalidDiscount(f32),

    /// Sampling a non-empty batch from a buffer with no stored transition.
    #[error("Cannot sample from an empty buffer")]
    EmptyBuffer,

    /// A transition is both terminated and truncated.
    #[error("A transition cannot be both terminated and truncated")]
    ConflictingEndFlags,

    /// The number of steps of an n-step return must be positive.
    #[error("Number of steps must be positive, got {0}")]
    InvalidHorizon(usize),

    /// Priority value that is NaN or infinite.
    #[error("Priority must be finite, got {0}")]
    InvalidPriority(f32),

    /// Environment index not handled by a vector buffer.
    #[error("Unknown environment {env_id} (n_envs = {n_envs})")]
    UnknownEnv {
        /// The requested environment.
        env_id: usize,
        /// Number of environments of the buffer.
        n_envs: usize,
    },

    /// A snapshot is inconsistent with the buffer it is restored into.
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Result type of the library.
pub type Result<T> = std::result::Result<T, ReplayBufferError>;
