use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use precondition_engine::gather_metrics;
use precondition_engine::BufferedObservingPrecondition;
use precondition_engine::ChangeDispatcher;
use precondition_engine::ChangeEvent;
use precondition_engine::ChangeKind;
use precondition_engine::ChangeProcessor;
use precondition_engine::DeviceAccessObserver;
use precondition_engine::ObservingPreconditionFactory;
use precondition_engine::PreconditionError;
use precondition_engine::PreconditionRegistry;
use precondition_engine::ServiceLocator;
use precondition_engine::SynchronizedObservingPrecondition;
use precondition_engine::TestContext;

use crate::common::metric_report;
use crate::common::test_run;
use crate::common::wait_until;

/// Collects the versions of observed metric changes
struct MetricCollector {
    versions: Arc<Mutex<Vec<u64>>>,
}

impl ChangeProcessor for MetricCollector {
    fn process_change(
        &mut self,
        _ctx: &TestContext,
        change: &ChangeEvent,
    ) -> Result<(), PreconditionError> {
        if change.kind() == ChangeKind::Metric {
            self.versions.lock().push(change.version().version);
        }
        Ok(())
    }
}

#[derive(Clone)]
struct MetricCollectorFactory {
    versions: Arc<Mutex<Vec<u64>>>,
}

impl ObservingPreconditionFactory for MetricCollectorFactory {
    type Output = BufferedObservingPrecondition<MetricCollector>;

    fn create(
        &self,
        ctx: &TestContext,
    ) -> Result<Self::Output, PreconditionError> {
        BufferedObservingPrecondition::new(
            ctx,
            MetricCollector {
                versions: self.versions.clone(),
            },
        )
    }
}

struct RejectAll;

impl ChangeProcessor for RejectAll {
    fn process_change(
        &mut self,
        _ctx: &TestContext,
        change: &ChangeEvent,
    ) -> Result<(), PreconditionError> {
        Err(PreconditionError::Failed(format!("unexpected {} change", change.kind())))
    }
}

struct RejectAllFactory;

impl ObservingPreconditionFactory for RejectAllFactory {
    type Output = BufferedObservingPrecondition<RejectAll>;

    fn create(
        &self,
        ctx: &TestContext,
    ) -> Result<Self::Output, PreconditionError> {
        BufferedObservingPrecondition::new(ctx, RejectAll)
    }
}

/// Manipulation target handed out by the service locator
#[derive(Clone)]
struct DeviceControl {
    inside: Arc<AtomicUsize>,
    overlaps: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl DeviceControl {
    fn set_alarm_signal(&self) {
        if self.inside.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        thread::sleep(Duration::from_millis(2));
        self.inside.fetch_sub(1, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_device_changes_reach_observing_precondition_in_order() {
    let versions = Arc::new(Mutex::new(Vec::new()));
    let locator = ServiceLocator::new();
    locator.register_instance(MetricCollectorFactory {
        versions: versions.clone(),
    });
    let (ctx, storage) = test_run(locator);

    let registry = PreconditionRegistry::new(ctx.clone());
    assert!(registry.register_observing::<MetricCollectorFactory>().unwrap());
    let dispatcher = Arc::new(ChangeDispatcher::new());
    registry.attach_observers(&dispatcher);

    let notifications = {
        let dispatcher = dispatcher.clone();
        thread::spawn(move || {
            for v in 1..=100 {
                dispatcher.on_metric_state_modification(metric_report(v));
            }
        })
    };
    notifications.join().unwrap();

    assert!(wait_until(|| versions.lock().len() == 100));
    assert_eq!(*versions.lock(), (1..=100).collect::<Vec<_>>());

    registry.run_preconditions().unwrap();
    assert_eq!(storage.flushes(), 1);
    assert!(!ctx.run_observer().is_invalid());
    assert!(gather_metrics().contains("dispatched_changes"));
}

#[test]
fn test_failing_observation_invalidates_run_but_not_the_dispatcher() {
    let versions = Arc::new(Mutex::new(Vec::new()));
    let (ctx, _storage) = test_run(ServiceLocator::new());
    let registry = PreconditionRegistry::new(ctx.clone());
    registry.register_observing_from(&RejectAllFactory).unwrap();
    registry
        .register_observing_from(&MetricCollectorFactory {
            versions: versions.clone(),
        })
        .unwrap();
    let dispatcher = ChangeDispatcher::new();
    registry.attach_observers(&dispatcher);

    for v in 1..=5 {
        dispatcher.on_metric_state_modification(metric_report(v));
    }

    assert!(wait_until(|| versions.lock().len() == 5));
    assert!(ctx.run_observer().is_invalid());
    assert_eq!(ctx.run_observer().reasons().len(), 1);
    registry.run_preconditions().unwrap();
}

#[test]
fn test_synchronized_manipulation_is_serialized_with_test_manipulations() {
    let control = DeviceControl {
        inside: Arc::new(AtomicUsize::new(0)),
        overlaps: Arc::new(AtomicUsize::new(0)),
        calls: Arc::new(AtomicUsize::new(0)),
    };
    let locator = ServiceLocator::new();
    locator.register_instance(control.clone());
    let (ctx, storage) = test_run(locator);

    let versions = Arc::new(Mutex::new(Vec::new()));
    let precondition = SynchronizedObservingPrecondition::new(
        &ctx,
        MetricCollector {
            versions: versions.clone(),
        },
        |_collector: &mut MetricCollector, ctx: &TestContext| {
            ctx.locker()
                .run_exclusive_for("AlarmSignalPrecondition", |control: DeviceControl| {
                    control.set_alarm_signal()
                })?;
            Ok(true)
        },
    )
    .unwrap();
    let registry = PreconditionRegistry::new(ctx.clone());
    registry
        .register_observing_from(&SingleUse::new(precondition))
        .unwrap();

    let test_case = {
        let ctx = ctx.clone();
        thread::spawn(move || {
            for _ in 0..50 {
                ctx.locker()
                    .run_exclusive_for("test case", |control: DeviceControl| control.set_alarm_signal())
                    .unwrap();
            }
        })
    };
    for _ in 0..10 {
        registry.run_preconditions().unwrap();
    }
    test_case.join().unwrap();

    assert_eq!(control.calls.load(Ordering::SeqCst), 60);
    assert_eq!(control.overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(storage.flushes(), 10);
    assert!(!ctx.locker().is_locked());
}

/// Hands out one prebuilt precondition
struct SingleUse<P> {
    precondition: Mutex<Option<P>>,
}

impl<P> SingleUse<P> {
    fn new(precondition: P) -> Self {
        Self {
            precondition: Mutex::new(Some(precondition)),
        }
    }
}

impl<P: precondition_engine::Observing + 'static> ObservingPreconditionFactory for SingleUse<P> {
    type Output = P;

    fn create(
        &self,
        _ctx: &TestContext,
    ) -> Result<Self::Output, PreconditionError> {
        self.precondition
            .lock()
            .take()
            .ok_or_else(|| PreconditionError::Failed("precondition already handed out".to_string()))
    }
}
