//! Precondition Registry
//!
//! Owns every precondition of a test run. Registrations are deduplicated by
//! [`PreconditionId`] and kept in registration order; `run_preconditions`
//! verifies them strictly in that order before the run disconnects from the
//! device.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;
use tracing::error;
use tracing::info;

use super::short_type_name;
use super::ManipulationAdapter;
use super::ManipulationPrecondition;
use super::Observing;
use super::ObservingPreconditionObserver;
use super::Precondition;
use super::SimpleAdapter;
use super::SimplePrecondition;
use crate::ChangeDispatcher;
use crate::Error;
use crate::PreconditionError;
use crate::RegistrationError;
use crate::Result;
use crate::TestContext;

/// Creates an observing precondition for a test run.
///
/// Factories are resolved from the [`ServiceLocator`](crate::ServiceLocator)
/// by [`PreconditionRegistry::register_observing`].
pub trait ObservingPreconditionFactory {
    type Output: Observing + 'static;

    fn create(
        &self,
        ctx: &TestContext,
    ) -> std::result::Result<Self::Output, PreconditionError>;
}

struct Entry {
    precondition: Arc<dyn Precondition>,
    observing: Option<Arc<dyn Observing>>,
}

/// Resets the running flag on every exit path
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct PreconditionRegistry {
    ctx: TestContext,
    entries: RwLock<Vec<Entry>>,
    running: AtomicBool,
}

impl std::fmt::Debug for PreconditionRegistry {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("PreconditionRegistry")
            .field("preconditions", &self.names())
            .field("running", &self.running.load(Ordering::SeqCst))
            .finish()
    }
}

impl PreconditionRegistry {
    pub fn new(ctx: TestContext) -> Self {
        Self {
            ctx,
            entries: RwLock::new(Vec::new()),
            running: AtomicBool::new(false),
        }
    }

    /// Registers the simple precondition `P`, skipping it if already present.
    ///
    /// Returns whether `P` was newly added.
    pub fn register_simple<P>(&self) -> std::result::Result<bool, RegistrationError>
    where
        P: SimplePrecondition + Default,
    {
        self.register_simple_with(|_| Ok(P::default()))
    }

    pub fn register_simple_with<P, C>(
        &self,
        constructor: C,
    ) -> std::result::Result<bool, RegistrationError>
    where
        P: SimplePrecondition,
        C: FnOnce(&TestContext) -> std::result::Result<P, PreconditionError>,
    {
        let precondition = self.construct::<P, _>(constructor)?;
        self.insert(Arc::new(SimpleAdapter::new(precondition)), None)
    }

    /// Registers the manipulation precondition `P`, skipping it if already
    /// present.
    pub fn register_manipulation<P>(&self) -> std::result::Result<bool, RegistrationError>
    where
        P: ManipulationPrecondition + Default,
    {
        self.register_manipulation_with(|_| Ok(P::default()))
    }

    pub fn register_manipulation_with<P, C>(
        &self,
        constructor: C,
    ) -> std::result::Result<bool, RegistrationError>
    where
        P: ManipulationPrecondition,
        C: FnOnce(&TestContext) -> std::result::Result<P, PreconditionError>,
    {
        let precondition = self.construct::<P, _>(constructor)?;
        self.insert(Arc::new(ManipulationAdapter::new(precondition)), None)
    }

    /// Resolves the factory `F` from the service locator and registers the
    /// precondition it creates, unless an equal one is already present.
    ///
    /// The locator creates a new factory on every call, so expensive or
    /// stateful factories belong in the locator as a cheap cloneable handle
    /// via [`ServiceLocator::register_instance`](crate::ServiceLocator::register_instance).
    pub fn register_observing<F>(&self) -> std::result::Result<bool, RegistrationError>
    where
        F: ObservingPreconditionFactory + Send + 'static,
    {
        let factory = self
            .ctx
            .locator()
            .resolve::<F>()
            .map_err(|e| self.construction_failed(short_type_name::<F>(), e.into()))?;
        self.register_observing_from(&factory)
    }

    pub fn register_observing_from<F>(
        &self,
        factory: &F,
    ) -> std::result::Result<bool, RegistrationError>
    where
        F: ObservingPreconditionFactory,
    {
        let name = short_type_name::<F::Output>();
        self.ensure_idle(name)?;
        let precondition = Arc::new(
            factory
                .create(&self.ctx)
                .map_err(|e| self.construction_failed(name, e))?,
        );
        let observing: Arc<dyn Observing> = precondition.clone();
        self.insert(precondition, Some(observing))
    }

    pub fn context(&self) -> &TestContext {
        &self.ctx
    }

    /// Observing preconditions in registration order
    pub fn observing_preconditions(&self) -> Vec<Arc<dyn Observing>> {
        self.entries
            .read()
            .iter()
            .filter_map(|entry| entry.observing.clone())
            .collect()
    }

    /// Registers one observer per observing precondition with `dispatcher`.
    pub fn attach_observers(
        &self,
        dispatcher: &ChangeDispatcher,
    ) {
        for precondition in self.observing_preconditions() {
            debug!("Attaching observing precondition {}", precondition.name());
            dispatcher.register_observer(Arc::new(ObservingPreconditionObserver::new(precondition)));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Names of all registered preconditions, in registration order
    pub fn names(&self) -> Vec<String> {
        self.entries
            .read()
            .iter()
            .map(|entry| entry.precondition.name().to_string())
            .collect()
    }

    /// Verifies every registered precondition in registration order and
    /// flushes the message storage after each one.
    ///
    /// Preconditions not locking manipulations themselves run inside the
    /// manipulation lock. Stops at the first failing precondition.
    pub fn run_preconditions(&self) -> Result<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::RunInProgress);
        }
        let _guard = RunGuard(&self.running);

        let preconditions: Vec<Arc<dyn Precondition>> = self
            .entries
            .read()
            .iter()
            .map(|entry| entry.precondition.clone())
            .collect();

        for precondition in preconditions {
            let name = precondition.name().to_string();
            info!("Running precondition {}", name);

            let outcome = if precondition.locks_manipulations() {
                precondition.verify_precondition(&self.ctx)
            } else {
                self.ctx
                    .locker()
                    .run_exclusive(&name, || precondition.verify_precondition(&self.ctx))
            };
            outcome.map_err(|source| Error::Precondition {
                precondition: name.clone(),
                source,
            })?;

            self.ctx
                .message_storage()
                .flush()
                .map_err(|source| Error::Flush { source })?;
        }
        Ok(())
    }

    fn construct<P, C>(
        &self,
        constructor: C,
    ) -> std::result::Result<P, RegistrationError>
    where
        P: 'static,
        C: FnOnce(&TestContext) -> std::result::Result<P, PreconditionError>,
    {
        let name = short_type_name::<P>();
        self.ensure_idle(name)?;
        constructor(&self.ctx).map_err(|e| self.construction_failed(name, e))
    }

    fn ensure_idle(
        &self,
        name: &str,
    ) -> std::result::Result<(), RegistrationError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(RegistrationError::RunInProgress {
                precondition: name.to_string(),
            });
        }
        Ok(())
    }

    fn construction_failed(
        &self,
        name: &str,
        source: PreconditionError,
    ) -> RegistrationError {
        error!(error = %source, "Error while registering precondition {}", name);
        RegistrationError::Construction {
            precondition: name.to_string(),
            source,
        }
    }

    fn insert(
        &self,
        precondition: Arc<dyn Precondition>,
        observing: Option<Arc<dyn Observing>>,
    ) -> std::result::Result<bool, RegistrationError> {
        let mut entries = self.entries.write();
        self.ensure_idle(precondition.name())?;

        let id = precondition.id();
        if entries.iter().any(|entry| entry.precondition.id() == id) {
            debug!("Precondition {} is already registered", precondition.name());
            return Ok(false);
        }

        debug!("Registered precondition {}", precondition.name());
        entries.push(Entry {
            precondition,
            observing,
        });
        Ok(true)
    }
}
