//! Shared fixtures of the unit tests.

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use parking_lot::Mutex;

use crate::context::MockMessageStorage;
use crate::ChangeEvent;
use crate::ChangeObserver;
use crate::Entity;
use crate::MdibVersion;
use crate::Settings;
use crate::StateMap;
use crate::StateSnapshot;
use crate::TestContext;

pub(crate) fn version(v: u64) -> MdibVersion {
    MdibVersion::new("urn:uuid:test", 0, v)
}

/// One changed state per handle, all belonging to component `mds`
pub(crate) fn state_map(
    mds: &str,
    handles: &[&str],
) -> StateMap {
    let states = handles
        .iter()
        .map(|handle| StateSnapshot {
            handle: format!("{handle}State"),
            descriptor_handle: handle.to_string(),
            state_version: 0,
        })
        .collect();
    StateMap::from([(mds.to_string(), states)])
}

pub(crate) fn entity(handle: &str) -> Entity {
    Entity {
        handle: handle.to_string(),
        descriptor_version: 0,
        states: vec![],
    }
}

pub(crate) fn metric_change(v: u64) -> ChangeEvent {
    ChangeEvent::Metric {
        version: version(v),
        states: state_map("mds0", &["metric"]),
    }
}

pub(crate) fn alert_change(v: u64) -> ChangeEvent {
    ChangeEvent::Alert {
        version: version(v),
        states: state_map("mds0", &["alert"]),
    }
}

/// Records every change it is handed, in delivery order
#[derive(Default)]
pub(crate) struct RecordingObserver {
    received: Mutex<Vec<Arc<ChangeEvent>>>,
}

impl RecordingObserver {
    pub(crate) fn received(&self) -> Vec<Arc<ChangeEvent>> {
        self.received.lock().clone()
    }
}

impl ChangeObserver for RecordingObserver {
    fn on_change(
        &self,
        change: &Arc<ChangeEvent>,
    ) {
        self.received.lock().push(change.clone());
    }
}

/// Polls `condition` until it holds or `timeout` elapsed.
pub(crate) fn wait_until(
    timeout: Duration,
    condition: impl Fn() -> bool,
) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Context with default settings and a message storage accepting any flush
pub(crate) fn test_context() -> TestContext {
    test_context_with(Settings::default())
}

pub(crate) fn test_context_with(settings: Settings) -> TestContext {
    let mut storage = MockMessageStorage::new();
    storage.expect_flush().returning(|| Ok(()));
    TestContext::new(settings, Arc::new(storage))
}
