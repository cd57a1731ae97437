//! Preconditions and their concurrency strategies.
//!
//! A precondition ensures a required device state has been exercised before
//! the test run disconnects from the device. Three flavours exist:
//!
//! - simple and manipulation preconditions run once when the registry runs,
//! - [`BufferedObservingPrecondition`] watches device changes on its own
//!   worker and never blocks the notification thread,
//! - [`SynchronizedObservingPrecondition`] additionally runs a manipulation,
//!   and never lets that manipulation overlap with change processing.

mod buffered;
mod observer;
mod registry;
mod simple;
mod synchronized;
mod worker;

pub use buffered::*;
pub use observer::*;
pub use registry::*;
pub use simple::*;
pub use synchronized::*;


use std::any::TypeId;
use std::sync::Arc;

use crate::ChangeEvent;
use crate::PreconditionError;
use crate::TestContext;

/// Identity used to deduplicate registrations.
///
/// Derived from a concrete type rather than from field contents, so each
/// precondition kind runs at most once per test run. Values of a type shared
/// by many preconditions, such as function pointers, add their address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PreconditionId {
    type_id: TypeId,
    instance: Option<usize>,
}

impl PreconditionId {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            instance: None,
        }
    }

    /// Identity of one value of `T`, told apart from other values by `address`
    pub fn of_instance<T: ?Sized + 'static>(address: usize) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            instance: Some(address),
        }
    }
}

pub trait Precondition: Send + Sync {
    /// Checks whether the precondition is fulfilled and executes the
    /// manipulations necessary to fulfill it.
    fn verify_precondition(
        &self,
        ctx: &TestContext,
    ) -> Result<(), PreconditionError>;

    fn id(&self) -> PreconditionId;

    /// Short name used in logs and lock holder diagnostics
    fn name(&self) -> &str;

    /// Whether the precondition takes over locking the manipulations itself.
    ///
    /// The registry runs all other preconditions inside
    /// [`ManipulationLocker::run_exclusive`](crate::ManipulationLocker::run_exclusive).
    fn locks_manipulations(&self) -> bool {
        false
    }
}

/// Precondition that additionally reacts to device changes.
pub trait Observing: Precondition {
    /// Receives a device change. Called on the notification thread, must not
    /// block.
    fn observe_change(
        &self,
        change: Arc<ChangeEvent>,
    );
}

/// Change processing hook of the observing strategies.
pub trait ChangeProcessor: Send + 'static {
    fn process_change(
        &mut self,
        ctx: &TestContext,
        change: &ChangeEvent,
    ) -> Result<(), PreconditionError>;
}

/// Last path segment of a type name, `a::b::Foo<c::Bar>` becomes `Foo<c::Bar>`
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let generics = full.find('<').unwrap_or(full.len());
    match full[..generics].rfind("::") {
        Some(pos) => &full[pos + 2..],
        None => full,
    }
}
