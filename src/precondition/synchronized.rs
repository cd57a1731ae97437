use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::short_type_name;
use super::simple::report_manipulation;
use super::worker::ObservationWorker;
use super::ChangeProcessor;
use super::Observing;
use super::Precondition;
use super::PreconditionId;
use crate::ChangeEvent;
use crate::PreconditionError;
use crate::TestContext;

/// Observing precondition whose manipulation and change processing never
/// run concurrently.
///
/// Both paths share one lock around the processor state `P`. The worker takes
/// it for every change, [`verify_precondition`](Precondition::verify_precondition)
/// takes it for the whole manipulation `F`, which itself runs inside the
/// manipulation lock.
///
/// # Stale changes
///
/// While a manipulation runs, arriving changes only queue up in memory, so a
/// long manipulation grows the queue without bound. Once it finishes the
/// backlog is processed as is: nothing reconciles device state missed or
/// superseded in the meantime, and processing code must tolerate working
/// with stale state.
///
/// Identity is the type of the manipulation `F`. For a plain function
/// pointer ([`ManipulationFn`]) it is the function itself, so preconditions
/// sharing a processor but running different functions stay distinct.
pub struct SynchronizedObservingPrecondition<P, F> {
    name: &'static str,
    id: PreconditionId,
    state: Arc<Mutex<P>>,
    manipulation: F,
    worker: ObservationWorker,
}

/// Manipulation as a nameable function pointer, e.g. for factory outputs
pub type ManipulationFn<P> = fn(&mut P, &TestContext) -> Result<bool, PreconditionError>;

impl<P, F> std::fmt::Debug for SynchronizedObservingPrecondition<P, F> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SynchronizedObservingPrecondition")
            .field("name", &self.name)
            .field("worker", &self.worker)
            .finish_non_exhaustive()
    }
}

impl<P, F> SynchronizedObservingPrecondition<P, F>
where
    P: ChangeProcessor,
    F: Fn(&mut P, &TestContext) -> Result<bool, PreconditionError> + Send + Sync + 'static,
{
    pub fn new(
        ctx: &TestContext,
        processor: P,
        manipulation: F,
    ) -> Result<Self, PreconditionError> {
        let name = short_type_name::<P>();
        let id = match (&manipulation as &dyn Any).downcast_ref::<ManipulationFn<P>>() {
            Some(function) => PreconditionId::of_instance::<ManipulationFn<P>>(*function as usize),
            None => PreconditionId::of::<F>(),
        };
        let state = Arc::new(Mutex::new(processor));

        let shared = state.clone();
        let worker = ObservationWorker::spawn(name, ctx, move |ctx, change| {
            let mut processor = shared.lock();
            processor.process_change(ctx, change)
        })?;

        Ok(Self {
            name,
            id,
            state,
            manipulation,
            worker,
        })
    }

    pub fn queue_depth(&self) -> usize {
        self.worker.depth()
    }

    pub fn is_worker_alive(&self) -> bool {
        self.worker.is_alive()
    }
}

impl<P, F> Precondition for SynchronizedObservingPrecondition<P, F>
where
    P: ChangeProcessor,
    F: Fn(&mut P, &TestContext) -> Result<bool, PreconditionError> + Send + Sync + 'static,
{
    fn verify_precondition(
        &self,
        ctx: &TestContext,
    ) -> Result<(), PreconditionError> {
        let mut processor = self.state.lock();
        debug!("Running manipulation of {} with change processing paused", self.name);
        let succeeded = ctx
            .locker()
            .run_exclusive(self.name, || (self.manipulation)(&mut *processor, ctx))?;
        report_manipulation(self.name, succeeded);
        Ok(())
    }

    fn id(&self) -> PreconditionId {
        self.id
    }

    fn name(&self) -> &str {
        self.name
    }

    fn locks_manipulations(&self) -> bool {
        true
    }
}

impl<P, F> Observing for SynchronizedObservingPrecondition<P, F>
where
    P: ChangeProcessor,
    F: Fn(&mut P, &TestContext) -> Result<bool, PreconditionError> + Send + Sync + 'static,
{
    fn observe_change(
        &self,
        change: Arc<ChangeEvent>,
    ) {
        self.worker.enqueue(change);
    }
}
