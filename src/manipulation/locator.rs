use std::any::Any;
use std::any::TypeId;
use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::LocatorError;

type Factory = Box<dyn Fn() -> Box<dyn Any + Send> + Send + Sync>;

struct Registration {
    type_name: &'static str,
    factory: Factory,
}

/// Resolves manipulation targets and other collaborators by type.
///
/// Every registration is a factory closure keyed by the produced type, a
/// fresh value is created on each [`ServiceLocator::resolve`].
#[derive(Default)]
pub struct ServiceLocator {
    factories: RwLock<HashMap<TypeId, Registration>>,
}

impl std::fmt::Debug for ServiceLocator {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let factories = self.factories.read();
        let names: Vec<_> = factories.values().map(|r| r.type_name).collect();
        f.debug_struct("ServiceLocator").field("registered", &names).finish()
    }
}

impl ServiceLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory for `M`, replacing any previous one.
    pub fn register<M, F>(
        &self,
        factory: F,
    ) where
        M: Send + 'static,
        F: Fn() -> M + Send + Sync + 'static,
    {
        let type_name = std::any::type_name::<M>();
        let registration = Registration {
            type_name,
            factory: Box::new(move || Box::new(factory()) as Box<dyn Any + Send>),
        };
        if self.factories.write().insert(TypeId::of::<M>(), registration).is_some() {
            debug!(type_name, "Replaced service factory");
        }
    }

    /// Registers a value which is cloned on every resolution.
    pub fn register_instance<M>(
        &self,
        instance: M,
    ) where
        M: Clone + Send + Sync + 'static,
    {
        self.register(move || instance.clone());
    }

    pub fn resolve<M>(&self) -> Result<M, LocatorError>
    where
        M: Send + 'static,
    {
        let type_name = std::any::type_name::<M>();
        // factories may resolve their own dependencies
        let factories = self.factories.read_recursive();
        let registration = factories
            .get(&TypeId::of::<M>())
            .ok_or(LocatorError::NotRegistered { type_name })?;

        (registration.factory)()
            .downcast::<M>()
            .map(|boxed| *boxed)
            .map_err(|_| LocatorError::TypeMismatch { type_name })
    }

    pub fn contains<M: 'static>(&self) -> bool {
        self.factories.read().contains_key(&TypeId::of::<M>())
    }
}
