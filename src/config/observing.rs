use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Worker queue settings shared by every observing precondition
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ObservingConfig {
    /// Queue depth above which the worker logs a diagnostic before
    /// processing the next change.
    ///
    /// **Default**: 200
    #[serde(default = "default_queue_warning_threshold")]
    pub queue_warning_threshold: usize,

    /// Maximum number of buffered changes per precondition.
    ///
    /// `0` keeps the queue unbounded, which favors never losing a change
    /// over bounded memory. With a positive capacity, changes arriving at a
    /// full queue are dropped and counted, the notification thread is never
    /// blocked.
    ///
    /// **Default**: 0 (unbounded)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for ObservingConfig {
    fn default() -> Self {
        Self {
            queue_warning_threshold: default_queue_warning_threshold(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl ObservingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.queue_warning_threshold == 0 {
            return Err(Error::Config(ConfigError::Message(
                "queue_warning_threshold must be greater than 0".into(),
            )));
        }

        if self.queue_capacity != 0 && self.queue_capacity < self.queue_warning_threshold {
            return Err(Error::Config(ConfigError::Message(format!(
                "queue_capacity ({}) must be 0 (unbounded) or at least queue_warning_threshold ({})",
                self.queue_capacity, self.queue_warning_threshold
            ))));
        }

        Ok(())
    }

    pub fn is_bounded(&self) -> bool {
        self.queue_capacity > 0
    }
}

fn default_queue_warning_threshold() -> usize {
    200
}
fn default_queue_capacity() -> usize {
    0
}
