//! Device change model and its fan-out to observers.

mod dispatcher;
mod event;
mod report;

pub use dispatcher::*;
pub use event::*;
pub use report::*;
