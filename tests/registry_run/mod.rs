use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use precondition_engine::Error;
use precondition_engine::LockError;
use precondition_engine::ManipulationPrecondition;
use precondition_engine::PreconditionError;
use precondition_engine::PreconditionRegistry;
use precondition_engine::ServiceLocator;
use precondition_engine::SimplePrecondition;
use precondition_engine::TestContext;

use crate::common::test_run;
use crate::common::wait_until;

/// Patient context the simple precondition checks for
#[derive(Clone, Default)]
struct PatientContext {
    associated: Arc<Mutex<bool>>,
}

#[derive(Default)]
struct AssociatePatient;

impl SimplePrecondition for AssociatePatient {
    fn is_precondition_met(
        &self,
        ctx: &TestContext,
    ) -> Result<bool, PreconditionError> {
        let patient = ctx.locator().resolve::<PatientContext>()?;
        let associated = *patient.associated.lock();
        Ok(associated)
    }

    fn manipulate(
        &self,
        ctx: &TestContext,
    ) -> Result<bool, PreconditionError> {
        let patient = ctx.locator().resolve::<PatientContext>()?;
        *patient.associated.lock() = true;
        Ok(true)
    }
}

#[derive(Default)]
struct RejectedManipulation;

impl ManipulationPrecondition for RejectedManipulation {
    fn manipulate(
        &self,
        _ctx: &TestContext,
    ) -> Result<bool, PreconditionError> {
        Err(PreconditionError::Manipulation {
            manipulation: "setComponentActivation".to_string(),
            source: "device answered with fault".into(),
        })
    }
}

#[test]
fn test_simple_precondition_manipulates_once() {
    let patient = PatientContext::default();
    let locator = ServiceLocator::new();
    locator.register_instance(patient.clone());
    let (ctx, storage) = test_run(locator);
    let registry = PreconditionRegistry::new(ctx);

    registry.register_simple::<AssociatePatient>().unwrap();
    registry.run_preconditions().unwrap();

    assert!(*patient.associated.lock());
    assert_eq!(storage.flushes(), 1);
}

#[test]
fn test_failed_manipulation_surfaces_precondition_name() {
    let locator = ServiceLocator::new();
    locator.register_instance(PatientContext::default());
    let (ctx, storage) = test_run(locator);
    let registry = PreconditionRegistry::new(ctx);

    registry.register_manipulation::<RejectedManipulation>().unwrap();
    registry.register_simple::<AssociatePatient>().unwrap();

    let err = registry.run_preconditions().unwrap_err();

    assert!(matches!(
        err,
        Error::Precondition { ref precondition, .. } if precondition == "RejectedManipulation"
    ));
    assert_eq!(storage.flushes(), 0);
}

#[test]
fn test_waiting_test_case_can_give_up_on_the_lock() {
    let (ctx, _storage) = test_run(ServiceLocator::new());
    let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);

    let holder = {
        let ctx = ctx.clone();
        thread::spawn(move || {
            ctx.locker().run_exclusive("long manipulation", || {
                let _ = release_rx.recv();
            })
        })
    };
    assert!(wait_until(|| ctx.locker().is_locked()));

    let err = ctx
        .locker()
        .try_run_exclusive("impatient", Duration::from_millis(50), || ())
        .unwrap_err();
    assert!(matches!(err, LockError::Timeout { ref caller, .. } if caller == "impatient"));

    release_tx.send(()).unwrap();
    holder.join().unwrap();
    assert_eq!(ctx.locker().run_exclusive("after", || 42), 42);
}
