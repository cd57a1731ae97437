//! Test run environment handed to preconditions.
//!
//! Bundles the collaborators a precondition may need while verifying or
//! processing changes: settings, the manipulation lock, the service locator,
//! the run observer and the message storage.

mod run_observer;
pub use run_observer::*;


use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

use crate::ManipulationLocker;
use crate::ServiceLocator;
use crate::Settings;

/// Storage of the messages exchanged with the device under test.
#[cfg_attr(test, automock)]
pub trait MessageStorage: Send + Sync {
    /// Persists buffered messages so subsequent readers see current data.
    fn flush(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

struct ContextInner {
    settings: Settings,
    locator: Arc<ServiceLocator>,
    locker: ManipulationLocker,
    run_observer: TestRunObserver,
    message_storage: Arc<dyn MessageStorage>,
}

/// Cheap to clone, every clone refers to the same test run.
#[derive(Clone)]
pub struct TestContext {
    inner: Arc<ContextInner>,
}

impl std::fmt::Debug for TestContext {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("TestContext")
            .field("settings", &self.inner.settings)
            .field("locker", &self.inner.locker)
            .field("run_observer", &self.inner.run_observer)
            .finish_non_exhaustive()
    }
}

impl TestContext {
    /// Creates the context of a new test run with an empty service locator.
    pub fn new(
        settings: Settings,
        message_storage: Arc<dyn MessageStorage>,
    ) -> Self {
        Self::with_locator(settings, Arc::new(ServiceLocator::new()), message_storage)
    }

    pub fn with_locator(
        settings: Settings,
        locator: Arc<ServiceLocator>,
        message_storage: Arc<dyn MessageStorage>,
    ) -> Self {
        let locker = ManipulationLocker::new(locator.clone(), settings.lock.clone());
        Self {
            inner: Arc::new(ContextInner {
                settings,
                locator,
                locker,
                run_observer: TestRunObserver::new(),
                message_storage,
            }),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn locator(&self) -> &ServiceLocator {
        &self.inner.locator
    }

    pub fn locker(&self) -> &ManipulationLocker {
        &self.inner.locker
    }

    pub fn run_observer(&self) -> &TestRunObserver {
        &self.inner.run_observer
    }

    pub fn message_storage(&self) -> &dyn MessageStorage {
        self.inner.message_storage.as_ref()
    }
}
