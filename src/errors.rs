//! Precondition Engine Error Hierarchy
//!
//! Errors are grouped by how the surrounding test run has to react to them:
//! fatal startup failures, propagated precondition failures and lock or
//! locator failures raised while manipulating the device.

use std::time::Duration;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Settings could not be loaded or failed validation
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Precondition construction failures, abort the whole run
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    /// Manipulation gate could not be acquired
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Manipulation target could not be resolved
    #[error(transparent)]
    Locator(#[from] LocatorError),

    /// A precondition failed during `run_preconditions`
    #[error("Precondition {precondition} failed")]
    Precondition {
        precondition: String,
        #[source]
        source: PreconditionError,
    },

    /// Message storage refused to flush between preconditions
    #[error("Failed to flush message storage")]
    Flush {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// `run_preconditions` was called while another run was executing
    #[error("Preconditions are already running")]
    RunInProgress,

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

/// Failure raised by a precondition while verifying or manipulating.
#[derive(Debug, thiserror::Error)]
pub enum PreconditionError {
    #[error("Precondition failed: {0}")]
    Failed(String),

    #[error("Manipulation {manipulation} failed")]
    Manipulation {
        manipulation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Locator(#[from] LocatorError),

    #[error(transparent)]
    Lock(#[from] LockError),

    /// Processing code panicked, carries the panic payload if it was a string
    #[error("Processing panicked: {0}")]
    Panicked(String),

    #[error("Failed to spawn change processing worker")]
    WorkerSpawn(#[source] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("Error while registering precondition {precondition}")]
    Construction {
        precondition: String,
        #[source]
        source: PreconditionError,
    },

    #[error("Cannot register precondition {precondition} while preconditions are running")]
    RunInProgress { precondition: String },
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The wait for the manipulation gate was abandoned
    #[error("{caller} gave up waiting for the manipulation lock after {waited:?}")]
    Timeout { caller: String, waited: Duration },
}

#[derive(Debug, thiserror::Error)]
pub enum LocatorError {
    #[error("No factory registered for {type_name}")]
    NotRegistered { type_name: &'static str },

    #[error("Factory for {type_name} produced a value of another type")]
    TypeMismatch { type_name: &'static str },
}
