use std::marker::PhantomData;
use std::sync::Arc;

use super::short_type_name;
use super::worker::ObservationWorker;
use super::ChangeProcessor;
use super::Observing;
use super::Precondition;
use super::PreconditionId;
use crate::ChangeEvent;
use crate::PreconditionError;
use crate::TestContext;

/// Observes device changes on a dedicated worker without ever blocking the
/// notification thread.
///
/// Changes are processed eventually, in arrival order, by the processor `P`.
/// If processing fails the test run is invalidated and later changes are
/// dropped. Verifying is a no-op, the precondition is purely reactive.
///
/// Two instances are the same precondition iff their processors have the
/// same type.
pub struct BufferedObservingPrecondition<P> {
    name: &'static str,
    worker: ObservationWorker,
    _processor: PhantomData<fn() -> P>,
}

impl<P> std::fmt::Debug for BufferedObservingPrecondition<P> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("BufferedObservingPrecondition")
            .field("name", &self.name)
            .field("worker", &self.worker)
            .finish()
    }
}

impl<P: ChangeProcessor> BufferedObservingPrecondition<P> {
    /// Moves `processor` onto a newly started worker thread.
    pub fn new(
        ctx: &TestContext,
        mut processor: P,
    ) -> Result<Self, PreconditionError> {
        let name = short_type_name::<P>();
        let worker = ObservationWorker::spawn(name, ctx, move |ctx, change| processor.process_change(ctx, change))?;
        Ok(Self {
            name,
            worker,
            _processor: PhantomData,
        })
    }

    /// Changes waiting for the worker
    pub fn queue_depth(&self) -> usize {
        self.worker.depth()
    }

    pub fn is_worker_alive(&self) -> bool {
        self.worker.is_alive()
    }
}

impl<P: ChangeProcessor> Precondition for BufferedObservingPrecondition<P> {
    fn verify_precondition(
        &self,
        _ctx: &TestContext,
    ) -> Result<(), PreconditionError> {
        Ok(())
    }

    fn id(&self) -> PreconditionId {
        PreconditionId::of::<P>()
    }

    fn name(&self) -> &str {
        self.name
    }

    fn locks_manipulations(&self) -> bool {
        true
    }
}

impl<P: ChangeProcessor> Observing for BufferedObservingPrecondition<P> {
    fn observe_change(
        &self,
        change: Arc<ChangeEvent>,
    ) {
        self.worker.enqueue(change);
    }
}

impl<P: ChangeProcessor> PartialEq for BufferedObservingPrecondition<P> {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.id() == other.id()
    }
}
