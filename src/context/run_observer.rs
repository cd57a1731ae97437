use parking_lot::Mutex;
use tracing::error;

#[derive(Debug, Default)]
struct RunState {
    invalid: bool,
    reasons: Vec<String>,
}

/// Registers unexpected failures during a test run to mark the run as invalid.
///
/// Reasons are deduplicated, invalidating twice for the same reason is logged
/// once.
#[derive(Debug, Default)]
pub struct TestRunObserver {
    state: Mutex<RunState>,
}

impl TestRunObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `reason` was not known before.
    pub fn invalidate_test_run(
        &self,
        reason: impl Into<String>,
    ) -> bool {
        let reason = reason.into();
        let mut state = self.state.lock();
        if state.reasons.contains(&reason) {
            return false;
        }
        error!("Test run has been marked as invalid. Reason: {}", reason);
        state.reasons.push(reason);
        state.invalid = true;
        true
    }

    /// Like [`invalidate_test_run`](Self::invalidate_test_run), logging the
    /// causing error alongside.
    pub fn invalidate_test_run_with(
        &self,
        reason: impl Into<String>,
        cause: &(dyn std::error::Error + 'static),
    ) -> bool {
        let reason = reason.into();
        let mut state = self.state.lock();
        if state.reasons.contains(&reason) {
            return false;
        }
        error!(
            error = cause,
            "Test run has been marked as invalid. Reason: {}", reason
        );
        state.reasons.push(reason);
        state.invalid = true;
        true
    }

    pub fn is_invalid(&self) -> bool {
        self.state.lock().invalid
    }

    /// All reasons for invalidation collected over the test run, oldest first
    pub fn reasons(&self) -> Vec<String> {
        self.state.lock().reasons.clone()
    }
}
