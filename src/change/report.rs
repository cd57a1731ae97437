//! Raw modification reports delivered by the device access layer.

use super::Entity;
use super::MdibVersion;
use super::StateMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptionModificationReport {
    /// Version of the access snapshot the modification was applied in
    pub mdib_version: MdibVersion,
    pub inserted_entities: Vec<Entity>,
    pub updated_entities: Vec<Entity>,
    pub deleted_entities: Vec<Entity>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateModificationReport {
    /// Version of the access snapshot the modification was applied in
    pub mdib_version: MdibVersion,
    pub states: StateMap,
}

/// Subscription interface of the device access layer.
///
/// The access layer calls these on its notification thread, implementations
/// must return quickly.
pub trait DeviceAccessObserver: Send + Sync {
    fn on_description_modification(
        &self,
        report: DescriptionModificationReport,
    );

    fn on_alert_state_modification(
        &self,
        report: StateModificationReport,
    );

    fn on_component_state_modification(
        &self,
        report: StateModificationReport,
    );

    fn on_context_state_modification(
        &self,
        report: StateModificationReport,
    );

    fn on_metric_state_modification(
        &self,
        report: StateModificationReport,
    );

    fn on_operation_state_modification(
        &self,
        report: StateModificationReport,
    );

    fn on_waveform_state_modification(
        &self,
        report: StateModificationReport,
    );
}
