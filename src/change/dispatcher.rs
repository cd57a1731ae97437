//! Change Dispatcher
//!
//! Adapts the device access notifications into [`ChangeEvent`]s and fans each
//! one out to every registered [`ChangeObserver`].
//!
//! ```text
//! device access layer (notification thread)
//!        │ on_*_modification(report)
//!        ▼
//! ┌─────────────────┐
//! │ ChangeDispatcher│ builds one Arc<ChangeEvent>
//! └──────┬──────────┘
//!        │ observers snapshot, registration order
//!        ▼
//! ┌─────────────────┐
//! │ ChangeObserver  │ on_<kind>_change(&event), must not block
//! └─────────────────┘
//! ```
//!
//! Delivery is synchronous on the calling thread, so every observer sees the
//! events in exactly the order the dispatcher received them. No lock is held
//! while observers run.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;
use tracing::trace;

use super::ChangeEvent;
use super::DescriptionModificationReport;
use super::DeviceAccessObserver;
use super::StateModificationReport;
use crate::metrics::DISPATCHED_CHANGES;

/// Listener for device changes.
///
/// All handlers default to [`ChangeObserver::on_change`], override the ones
/// necessary to retrieve the desired data.
pub trait ChangeObserver: Send + Sync {
    fn on_change(
        &self,
        _change: &Arc<ChangeEvent>,
    ) {
    }

    fn on_description_change(
        &self,
        change: &Arc<ChangeEvent>,
    ) {
        self.on_change(change)
    }

    fn on_alert_change(
        &self,
        change: &Arc<ChangeEvent>,
    ) {
        self.on_change(change)
    }

    fn on_component_change(
        &self,
        change: &Arc<ChangeEvent>,
    ) {
        self.on_change(change)
    }

    fn on_context_change(
        &self,
        change: &Arc<ChangeEvent>,
    ) {
        self.on_change(change)
    }

    fn on_metric_change(
        &self,
        change: &Arc<ChangeEvent>,
    ) {
        self.on_change(change)
    }

    fn on_operation_change(
        &self,
        change: &Arc<ChangeEvent>,
    ) {
        self.on_change(change)
    }

    fn on_waveform_change(
        &self,
        change: &Arc<ChangeEvent>,
    ) {
        self.on_change(change)
    }
}

#[derive(Default)]
pub struct ChangeDispatcher {
    observers: RwLock<Vec<Arc<dyn ChangeObserver>>>,
}

impl std::fmt::Debug for ChangeDispatcher {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ChangeDispatcher")
            .field("observers", &self.observers.read().len())
            .finish()
    }
}

fn same_observer(
    a: &Arc<dyn ChangeObserver>,
    b: &Arc<dyn ChangeObserver>,
) -> bool {
    // compare data pointers only, vtables may differ between codegen units
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

impl ChangeDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer to be notified about device changes.
    ///
    /// Returns false if the same observer instance was already registered.
    pub fn register_observer(
        &self,
        observer: Arc<dyn ChangeObserver>,
    ) -> bool {
        let mut observers = self.observers.write();
        if observers.iter().any(|o| same_observer(o, &observer)) {
            return false;
        }
        observers.push(observer);
        debug!(observers = observers.len(), "Change observer registered");
        true
    }

    /// Unregisters an observer to stop receiving notifications.
    pub fn unregister_observer(
        &self,
        observer: &Arc<dyn ChangeObserver>,
    ) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|o| !same_observer(o, observer));
        before != observers.len()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    /// Delivers an already constructed change to every observer in
    /// registration order.
    pub fn dispatch(
        &self,
        change: ChangeEvent,
    ) {
        let change = Arc::new(change);
        let kind = change.kind();
        DISPATCHED_CHANGES.with_label_values(&[kind.as_str()]).inc();

        let observers: Vec<Arc<dyn ChangeObserver>> = self.observers.read().clone();
        trace!(
            %kind,
            version = %change.version(),
            observers = observers.len(),
            "Dispatching change"
        );

        for observer in observers {
            match change.as_ref() {
                ChangeEvent::Description { .. } => observer.on_description_change(&change),
                ChangeEvent::Alert { .. } => observer.on_alert_change(&change),
                ChangeEvent::Component { .. } => observer.on_component_change(&change),
                ChangeEvent::Context { .. } => observer.on_context_change(&change),
                ChangeEvent::Metric { .. } => observer.on_metric_change(&change),
                ChangeEvent::Operation { .. } => observer.on_operation_change(&change),
                ChangeEvent::Waveform { .. } => observer.on_waveform_change(&change),
            }
        }
    }
}

impl DeviceAccessObserver for ChangeDispatcher {
    fn on_description_modification(
        &self,
        report: DescriptionModificationReport,
    ) {
        self.dispatch(ChangeEvent::Description {
            version: report.mdib_version,
            inserted: report.inserted_entities,
            updated: report.updated_entities,
            deleted: report.deleted_entities,
        });
    }

    fn on_alert_state_modification(
        &self,
        report: StateModificationReport,
    ) {
        self.dispatch(ChangeEvent::Alert {
            version: report.mdib_version,
            states: report.states,
        });
    }

    fn on_component_state_modification(
        &self,
        report: StateModificationReport,
    ) {
        self.dispatch(ChangeEvent::Component {
            version: report.mdib_version,
            states: report.states,
        });
    }

    fn on_context_state_modification(
        &self,
        report: StateModificationReport,
    ) {
        self.dispatch(ChangeEvent::Context {
            version: report.mdib_version,
            states: report.states,
        });
    }

    fn on_metric_state_modification(
        &self,
        report: StateModificationReport,
    ) {
        self.dispatch(ChangeEvent::Metric {
            version: report.mdib_version,
            states: report.states,
        });
    }

    fn on_operation_state_modification(
        &self,
        report: StateModificationReport,
    ) {
        self.dispatch(ChangeEvent::Operation {
            version: report.mdib_version,
            states: report.states,
        });
    }

    fn on_waveform_state_modification(
        &self,
        report: StateModificationReport,
    ) {
        self.dispatch(ChangeEvent::Waveform {
            version: report.mdib_version,
            states: report.states,
        });
    }
}
