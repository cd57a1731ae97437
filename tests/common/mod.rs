use std::collections::HashMap;
use std::error::Error;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use precondition_engine::MdibVersion;
use precondition_engine::MessageStorage;
use precondition_engine::ServiceLocator;
use precondition_engine::Settings;
use precondition_engine::StateModificationReport;
use precondition_engine::StateSnapshot;
use precondition_engine::TestContext;

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Message storage counting its flushes
#[derive(Debug, Default)]
pub struct CountingStorage {
    flushes: AtomicUsize,
}

impl CountingStorage {
    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl MessageStorage for CountingStorage {
    fn flush(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn test_run(locator: ServiceLocator) -> (TestContext, Arc<CountingStorage>) {
    let storage = Arc::new(CountingStorage::default());
    let settings = Settings::default().validate().expect("default settings are valid");
    let ctx = TestContext::with_locator(settings, Arc::new(locator), storage.clone());
    (ctx, storage)
}

pub fn metric_report(version: u64) -> StateModificationReport {
    StateModificationReport {
        mdib_version: MdibVersion::new("urn:uuid:it", 0, version),
        states: HashMap::from([(
            "mds0".to_string(),
            vec![StateSnapshot {
                handle: "numericState".to_string(),
                descriptor_handle: "numeric".to_string(),
                state_version: version,
            }],
        )]),
    }
}

pub fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
