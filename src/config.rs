use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Config {
    /// Execution resource limits (hot-reloadable after startup)
    #[validate(nested)]
    pub resources: ResourceConfig,

    /// Bounded backlog of evaluation jobs waiting for a worker
    #[validate(range(min = 1))]
    pub queue_capacity: usize,

    /// Log level used by hosts that wire up a subscriber from this config
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resources: ResourceConfig::default(),
            queue_capacity: default_queue_capacity(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// Sources, in override order: built-in defaults, the optional TOML file
    /// named by `PERCOLATOR_CONFIG`, then environment variables with the
    /// `PERCOLATOR_` prefix (e.g. `PERCOLATOR_RESOURCES__POOL_SIZE=8`).
    pub fn load() -> crate::error::Result<Self> {
        let config_path =
            std::env::var("PERCOLATOR_CONFIG").unwrap_or_else(|_| "config/percolator".to_string());

        let config: Config = config::Config::builder()
            .add_source(config::File::with_name(&config_path).required(false))
            .add_source(
                config::Environment::with_prefix("PERCOLATOR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }
}

/// Execution resource limits for the evaluation pool
///
/// Swapped as a whole record on reconfiguration; in-flight percolation calls
/// keep the record that was current when they were submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ResourceConfig {
    /// Number of workers in the evaluation pool
    #[validate(range(min = 1))]
    pub pool_size: usize,

    /// Ceiling on aggregate transient document memory in bytes
    #[validate(range(min = 1))]
    pub max_memory_bytes: usize,

    /// Maximum duration a single percolation call may run (milliseconds)
    #[validate(range(min = 1))]
    pub timeout_ms: u64,
}

impl ResourceConfig {
    /// Per-call timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            max_memory_bytes: default_max_memory_bytes(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

// Default value functions
fn default_pool_size() -> usize {
    4
}

fn default_max_memory_bytes() -> usize {
    64 * 1024 * 1024 // 64MB
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}
