//! Configuration for the replay buffer implementation.
//!
//! This module provides configuration structures for the replay buffer, including:
//! - Basic buffer configuration (capacity, number of environments, seed)
//! - Prioritized Experience Replay (PER) configuration
//! - Serialization and deserialization support
use super::{WeightNormalizer, WeightNormalizer::Batch};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    default::Default,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration for Prioritized Experience Replay (PER).
///
/// # Examples
///
/// ```rust
/// use border_replay::replay_buffer::{PerConfig, WeightNormalizer};
///
/// let config = PerConfig::default()
///     .alpha(0.6)
///     .beta_0(0.4)
///     .beta_final(1.0)
///     .n_opts_final(500_000)
///     .normalize(WeightNormalizer::Batch);
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PerConfig {
    /// Exponent for prioritization. A value of 0 results in uniform sampling.
    pub alpha: f32,

    /// Initial value of the importance sampling exponent.
    pub beta_0: f32,

    /// Final value of the importance sampling exponent. Typically set to 1.0
    /// to fully compensate for the non-uniform sampling.
    pub beta_final: f32,

    /// Number of priority updates after which `beta` reaches its final value.
    pub n_opts_final: usize,

    /// Method for normalizing importance sampling weights.
    pub normalize: WeightNormalizer,
}

impl Default for PerConfig {
    /// Creates a default PER configuration with commonly used values:
    /// - `alpha = 0.6`
    /// - `beta_0 = 0.4`
    /// - `beta_final = 1.0`
    /// - `n_opts_final = 500_000`
    /// - `normalize = Batch`
    fn default() -> Self {
        Self {
            alpha: 0.6,
            beta_0: 0.4,
            beta_final: 1.0,
            n_opts_final: 500_000,
            normalize: Batch,
        }
    }
}

impl PerConfig {
    /// Sets the prioritization exponent `alpha`.
    pub fn alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    /// Sets the initial importance sampling exponent `beta_0`.
    pub fn beta_0(mut self, beta_0: f32) -> Self {
        self.beta_0 = beta_0;
        self
    }

    /// Sets the final importance sampling exponent `beta_final`.
    pub fn beta_final(mut self, beta_final: f32) -> Self {
        self.beta_final = beta_final;
        self
    }

    /// Sets the number of priority updates to reach the final beta value.
    pub fn n_opts_final(mut self, n_opts_final: usize) -> Self {
        self.n_opts_final = n_opts_final;
        self
    }

    /// Sets the method for normalizing importance weights.
    pub fn normalize(mut self, normalize: WeightNormalizer) -> Self {
        self.normalize = normalize;
        self
    }
}

/// Configuration for the replay buffer.
///
/// # Examples
///
/// ```rust
/// use border_replay::replay_buffer::{PerConfig, ReplayBufferConfig};
///
/// // Four environments, 2500 transitions each
/// let config = ReplayBufferConfig::default()
///     .capacity(2500)
///     .n_envs(4)
///     .seed(42);
///
/// // Configuration with PER
/// let config_with_per = config.clone().per_config(Some(PerConfig::default()));
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ReplayBufferConfig {
    /// Maximum number of transitions stored for each environment.
    pub capacity: usize,

    /// Number of environments writing into the buffer.
    pub n_envs: usize,

    /// Random seed used for sampling transitions.
    pub seed: u64,

    /// Optional configuration for prioritized experience replay. If `None`,
    /// transitions are sampled uniformly at random.
    pub per_config: Option<PerConfig>,
}

impl Default for ReplayBufferConfig {
    /// Creates a default replay buffer configuration with commonly used values:
    /// - `capacity = 10000`
    /// - `n_envs = 1`
    /// - `seed = 42`
    /// - `per_config = None`
    fn default() -> Self {
        Self {
            capacity: 10000,
            n_envs: 1,
            seed: 42,
            per_config: None,
        }
    }
}

impl ReplayBufferConfig {
    /// Sets the capacity of each per-environment store.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the number of environments.
    pub fn n_envs(mut self, n_envs: usize) -> Self {
        self.n_envs = n_envs;
        self
    }

    /// Sets the random seed for sampling.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the configuration for prioritized experience replay.
    pub fn per_config(mut self, per_config: Option<PerConfig>) -> Self {
        self.per_config = per_config;
        self
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves the configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
