//! Configuration for double-spend detection and notification

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Which double-spends we validate and notify about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    /// Feature disabled
    Off,
    /// Only double-spends of standard inputs
    Standard,
    /// Standard and non-standard inputs
    All,
}

/// Double-spend notification configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoubleSpendConfig {
    pub notification_level: NotificationLevel,
    /// Threads processing newly detected double-spends (0 disables)
    pub fast_pool_threads: usize,
    /// Threads talking to slow endpoints (0 disables)
    pub slow_pool_threads: usize,
    /// Memory ceiling for queued double-spend events
    pub queue_max_memory_bytes: usize,
    /// Number of notified transactions remembered
    pub notified_txn_capacity: usize,
    /// Maximum blacklisted endpoints
    pub blacklist_capacity: usize,
    pub blacklist_duration_secs: u64,
    /// Script validation budget per double-spend input
    pub max_validation_duration_ms: u64,
    /// Submission attempts per endpoint (fast and slow path each)
    pub max_submit_attempts: u32,
    pub endpoint_fast_timeout_ms: u64,
    pub endpoint_slow_timeout_ms: u64,
    /// Maximum callback addresses contacted per transaction
    pub max_endpoints_per_txn: usize,
    pub endpoint_port: u16,
    /// Addresses never contacted
    pub endpoint_skip_list: Vec<IpAddr>,
    /// Timeouts per hour after which an endpoint counts as slow
    pub slow_timeouts_per_hour: u32,
    /// Pending tasks per worker pool
    pub task_queue_capacity: usize,
}

impl Default for DoubleSpendConfig {
    fn default() -> Self {
        Self {
            notification_level: NotificationLevel::Standard,
            fast_pool_threads: 2,
            slow_pool_threads: 2,
            queue_max_memory_bytes: 10 * 1024 * 1024,
            notified_txn_capacity: 1000,
            blacklist_capacity: 1000,
            blacklist_duration_secs: 24 * 60 * 60,
            max_validation_duration_ms: 100,
            max_submit_attempts: 3,
            endpoint_fast_timeout_ms: 5_000,
            endpoint_slow_timeout_ms: 60_000,
            max_endpoints_per_txn: 3,
            endpoint_port: 80,
            endpoint_skip_list: Vec::new(),
            slow_timeouts_per_hour: 3,
            task_queue_capacity: 10_000,
        }
    }
}

impl DoubleSpendConfig {
    /// Read and validate a TOML configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the subsystem misbehave
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slow_timeouts_per_hour == 0 {
            return Err(ConfigError::Invalid(
                "slow_timeouts_per_hour must be at least 1".to_string(),
            ));
        }
        if self.max_submit_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_submit_attempts must be at least 1".to_string(),
            ));
        }
        if self.max_endpoints_per_txn == 0 {
            return Err(ConfigError::Invalid(
                "max_endpoints_per_txn must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.notification_level != NotificationLevel::Off
    }

    pub fn blacklist_duration(&self) -> Duration {
        Duration::from_secs(self.blacklist_duration_secs)
    }

    pub fn max_validation_duration(&self) -> Duration {
        Duration::from_millis(self.max_validation_duration_ms)
    }

    pub fn endpoint_fast_timeout(&self) -> Duration {
        Duration::from_millis(self.endpoint_fast_timeout_ms)
    }

    pub fn endpoint_slow_timeout(&self) -> Duration {
        Duration::from_millis(self.endpoint_slow_timeout_ms)
    }
}
