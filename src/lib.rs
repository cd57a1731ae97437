//! Coordination core for device conformance test runs.
//!
//! Keeps test-triggered device manipulations, asynchronously arriving device
//! changes and precondition verification from interleaving:
//!
//! - [`ManipulationLocker`] serializes every manipulation in FIFO order,
//! - [`ChangeDispatcher`] fans device reports out as typed [`ChangeEvent`]s,
//! - [`PreconditionRegistry`] owns and runs the preconditions of a test run,
//!   observing ones process changes on their own worker threads.

mod change;
mod config;
mod context;
mod errors;
mod manipulation;
mod metrics;
mod precondition;

pub use change::*;
pub use config::*;
pub use context::*;
pub use errors::*;
pub use manipulation::*;
pub use metrics::*;
pub use precondition::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
mod test_utils;
