use std::collections::HashMap;
use std::fmt;

/// Version marker of the device state snapshot a change originated from.
///
/// Versions increase monotonically within one `sequence_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MdibVersion {
    pub sequence_id: String,
    pub instance_id: u64,
    pub version: u64,
}

impl MdibVersion {
    pub fn new(
        sequence_id: impl Into<String>,
        instance_id: u64,
        version: u64,
    ) -> Self {
        Self {
            sequence_id: sequence_id.into(),
            instance_id,
            version,
        }
    }
}

impl fmt::Display for MdibVersion {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}/{}/{}", self.sequence_id, self.instance_id, self.version)
    }
}

/// A changed sub-state as reported by the device access layer.
///
/// The state model itself belongs to the device communication stack, this
/// core only needs enough to identify what changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    pub handle: String,
    pub descriptor_handle: String,
    pub state_version: u64,
}

/// An inserted, updated or deleted description entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub handle: String,
    pub descriptor_version: u64,
    pub states: Vec<StateSnapshot>,
}

/// Changed states keyed by the identifier of the component (MDS) they belong to
pub type StateMap = HashMap<String, Vec<StateSnapshot>>;

/// Closed set of device state changes an observing precondition can see.
///
/// Immutable once constructed. The dispatcher produces exactly one event per
/// raw notification and shares it between observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Description {
        version: MdibVersion,
        inserted: Vec<Entity>,
        updated: Vec<Entity>,
        deleted: Vec<Entity>,
    },
    Alert {
        version: MdibVersion,
        states: StateMap,
    },
    Component {
        version: MdibVersion,
        states: StateMap,
    },
    Context {
        version: MdibVersion,
        states: StateMap,
    },
    Metric {
        version: MdibVersion,
        states: StateMap,
    },
    Operation {
        version: MdibVersion,
        states: StateMap,
    },
    Waveform {
        version: MdibVersion,
        states: StateMap,
    },
}

/// Discriminant of [`ChangeEvent`], used for metric labels and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Description,
    Alert,
    Component,
    Context,
    Metric,
    Operation,
    Waveform,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Description => "description",
            ChangeKind::Alert => "alert",
            ChangeKind::Component => "component",
            ChangeKind::Context => "context",
            ChangeKind::Metric => "metric",
            ChangeKind::Operation => "operation",
            ChangeKind::Waveform => "waveform",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ChangeEvent {
    pub fn version(&self) -> &MdibVersion {
        match self {
            ChangeEvent::Description { version, .. }
            | ChangeEvent::Alert { version, .. }
            | ChangeEvent::Component { version, .. }
            | ChangeEvent::Context { version, .. }
            | ChangeEvent::Metric { version, .. }
            | ChangeEvent::Operation { version, .. }
            | ChangeEvent::Waveform { version, .. } => version,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeEvent::Description { .. } => ChangeKind::Description,
            ChangeEvent::Alert { .. } => ChangeKind::Alert,
            ChangeEvent::Component { .. } => ChangeKind::Component,
            ChangeEvent::Context { .. } => ChangeKind::Context,
            ChangeEvent::Metric { .. } => ChangeKind::Metric,
            ChangeEvent::Operation { .. } => ChangeKind::Operation,
            ChangeEvent::Waveform { .. } => ChangeKind::Waveform,
        }
    }

    /// State map of a state change, `None` for description changes
    pub fn states(&self) -> Option<&StateMap> {
        match self {
            ChangeEvent::Description { .. } => None,
            ChangeEvent::Alert { states, .. }
            | ChangeEvent::Component { states, .. }
            | ChangeEvent::Context { states, .. }
            | ChangeEvent::Metric { states, .. }
            | ChangeEvent::Operation { states, .. }
            | ChangeEvent::Waveform { states, .. } => Some(states),
        }
    }

    /// Number of changed states, or of touched entities for description changes
    pub fn len(&self) -> usize {
        match self {
            ChangeEvent::Description {
                inserted,
                updated,
                deleted,
                ..
            } => inserted.len() + updated.len() + deleted.len(),
            other => other
                .states()
                .map(|states| states.values().map(Vec::len).sum())
                .unwrap_or_default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
