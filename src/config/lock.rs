use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Manipulation lock diagnostics
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LockConfig {
    /// Holding the manipulation lock longer than this (milliseconds) is
    /// reported with a warning on release.
    ///
    /// **Default**: 5000
    #[serde(default = "default_slow_hold_warning_ms")]
    pub slow_hold_warning_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            slow_hold_warning_ms: default_slow_hold_warning_ms(),
        }
    }
}

impl LockConfig {
    pub fn validate(&self) -> Result<()> {
        if self.slow_hold_warning_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "slow_hold_warning_ms must be at least 1ms".into(),
            )));
        }
        Ok(())
    }

    pub fn slow_hold_warning(&self) -> Duration {
        Duration::from_millis(self.slow_hold_warning_ms)
    }
}

// in ms
fn default_slow_hold_warning_ms() -> u64 {
    5_000
}
