use std::sync::Arc;

use super::Observing;
use crate::ChangeEvent;
use crate::ChangeObserver;

/// Forwards every dispatched change to one observing precondition.
pub struct ObservingPreconditionObserver {
    precondition: Arc<dyn Observing>,
}

impl ObservingPreconditionObserver {
    pub fn new(precondition: Arc<dyn Observing>) -> Self {
        Self { precondition }
    }
}

impl ChangeObserver for ObservingPreconditionObserver {
    fn on_change(
        &self,
        change: &Arc<ChangeEvent>,
    ) {
        self.precondition.observe_change(change.clone());
    }
}
