//! Configuration for the affinity subsystem.
//!
//! Configuration is loaded with precedence: Env vars > Config file > Defaults,
//! and is immutable once a builder or finder has been constructed from it.
//!
//! # Example config file (affinity.toml)
//! ```toml
//! snapshot_period_ms = 60000
//! snapshot_count = 5
//! stop_iteration = 20
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Default length of one snapshot bucket, in milliseconds (5 minutes).
///
/// A longer period retains more history per bucket but makes each finder run
/// process more data.
pub const DEFAULT_SNAPSHOT_PERIOD_MS: u64 = 1000 * 60 * 5;

/// Default number of snapshot buckets to retain.
///
/// A smaller period with a larger count keeps the same total history while
/// discarding it more smoothly at each rotation.
pub const DEFAULT_SNAPSHOT_COUNT: usize = 1;

/// Default iteration bound for one group finder run.
///
/// Hitting the bound stops the run and returns the current labeling; it is
/// not a failure.
pub const DEFAULT_STOP_ITERATION: u32 = 10;

/// Environment variable prefix for configuration overrides,
/// e.g. `AFFINITY_SNAPSHOT_COUNT=5`.
pub const ENV_PREFIX: &str = "AFFINITY_";

/// Static configuration for graph builders and the group finder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AffinityConfig {
    /// Length of each snapshot bucket, in milliseconds. Pruning is expected
    /// to be scheduled at this interval.
    pub snapshot_period_ms: u64,
    /// Number of snapshot buckets retained; contributions older than
    /// `snapshot_count * snapshot_period_ms` have aged out.
    pub snapshot_count: usize,
    /// Maximum label-propagation passes per finder run before the run is
    /// stopped and the current labeling returned.
    pub stop_iteration: u32,
}

impl Default for AffinityConfig {
    fn default() -> Self {
        Self {
            snapshot_period_ms: DEFAULT_SNAPSHOT_PERIOD_MS,
            snapshot_count: DEFAULT_SNAPSHOT_COUNT,
            stop_iteration: DEFAULT_STOP_ITERATION,
        }
    }
}

impl AffinityConfig {
    /// Create a validated configuration.
    pub fn new(
        snapshot_period_ms: u64,
        snapshot_count: usize,
        stop_iteration: u32,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            snapshot_period_ms,
            snapshot_count,
            stop_iteration,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with precedence: Env > File > Defaults.
    ///
    /// # Arguments
    /// * `config_path` - Optional path to a TOML config file
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(AffinityConfig::default()));

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX));

        let config: Self = figment.extract().map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.snapshot_period_ms == 0 {
            return Err(ConfigError::new("snapshot_period_ms must be at least 1"));
        }
        if self.snapshot_count == 0 {
            return Err(ConfigError::new("snapshot_count must be at least 1"));
        }
        if self.stop_iteration == 0 {
            return Err(ConfigError::new("stop_iteration must be at least 1"));
        }
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
}

impl ConfigError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self {
            message: e.to_string(),
        }
    }
}
