//! Dedicated change processing thread shared by the observing strategies.
//!
//! ```text
//! notification thread:
//!   observe_change() -> enqueue() -> send / try_send   [never blocks]
//!                                        ↓
//! worker thread:
//!   recv() -> process(ctx, change) -> recv() ...
//!                 ↓ error or panic
//!   invalidate test run, mark dead, exit
//! ```
//!
//! Once the worker is dead, queued and newly arriving changes are discarded
//! instead of piling up against a consumer that will never return.

use std::panic;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::bounded;
use crossbeam_channel::unbounded;
use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use crossbeam_channel::TrySendError;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::metrics::DROPPED_CHANGES;
use crate::metrics::OBSERVING_QUEUE_DEPTH;
use crate::ChangeEvent;
use crate::PreconditionError;
use crate::TestContext;

pub(crate) struct ObservationWorker {
    name: String,
    sender: Sender<Arc<ChangeEvent>>,
    /// Kept to discard the backlog once the worker is gone
    receiver: Receiver<Arc<ChangeEvent>>,
    alive: Arc<AtomicBool>,
    bounded: bool,
}

impl std::fmt::Debug for ObservationWorker {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ObservationWorker")
            .field("name", &self.name)
            .field("depth", &self.depth())
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl ObservationWorker {
    /// Starts the worker thread. The thread ends when the worker is dropped
    /// or when `process` fails.
    pub(crate) fn spawn<F>(
        name: &str,
        ctx: &TestContext,
        mut process: F,
    ) -> Result<Self, PreconditionError>
    where
        F: FnMut(&TestContext, &ChangeEvent) -> Result<(), PreconditionError> + Send + 'static,
    {
        let observing = &ctx.settings().observing;
        let (sender, receiver) = if observing.is_bounded() {
            bounded::<Arc<ChangeEvent>>(observing.queue_capacity)
        } else {
            unbounded::<Arc<ChangeEvent>>()
        };
        let alive = Arc::new(AtomicBool::new(true));

        let thread_ctx = ctx.clone();
        let thread_receiver = receiver.clone();
        let thread_alive = alive.clone();
        let thread_name = name.to_string();
        let threshold = observing.queue_warning_threshold;

        thread::Builder::new()
            .name(format!("observe-{name}"))
            .spawn(move || {
                let gauge = OBSERVING_QUEUE_DEPTH.with_label_values(&[&thread_name]);

                while let Ok(change) = thread_receiver.recv() {
                    let depth = thread_receiver.len();
                    gauge.set(depth as i64);
                    if depth > threshold {
                        debug!(
                            "Queue of {} holds {} changes, processing is falling behind",
                            thread_name, depth
                        );
                    }

                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| process(&thread_ctx, change.as_ref())))
                        .unwrap_or_else(|payload| Err(PreconditionError::Panicked(panic_message(payload))));

                    if let Err(e) = outcome {
                        thread_ctx.run_observer().invalidate_test_run_with(
                            format!("Change processing of {thread_name} failed, worker stopped"),
                            &e,
                        );
                        break;
                    }
                }

                thread_alive.store(false, Ordering::SeqCst);
                discard_backlog(&thread_name, &thread_receiver);
                gauge.set(0);
                trace!("Change processing worker of {} exited", thread_name);
            })
            .map_err(PreconditionError::WorkerSpawn)?;

        Ok(Self {
            name: name.to_string(),
            sender,
            receiver,
            alive,
            bounded: observing.is_bounded(),
        })
    }

    /// Hands `change` to the worker without blocking.
    pub(crate) fn enqueue(
        &self,
        change: Arc<ChangeEvent>,
    ) {
        if !self.is_alive() {
            DROPPED_CHANGES.with_label_values(&[&self.name]).inc();
            discard_backlog(&self.name, &self.receiver);
            debug!("Worker of {} is dead, dropping {} change", self.name, change.kind());
            return;
        }

        let sent = if self.bounded {
            match self.sender.try_send(change) {
                Ok(()) => true,
                Err(TrySendError::Full(change)) => {
                    DROPPED_CHANGES.with_label_values(&[&self.name]).inc();
                    warn!(
                        "Queue of {} is full, dropping {} change {}",
                        self.name,
                        change.kind(),
                        change.version()
                    );
                    false
                }
                Err(TrySendError::Disconnected(_)) => {
                    DROPPED_CHANGES.with_label_values(&[&self.name]).inc();
                    false
                }
            }
        } else if self.sender.send(change).is_err() {
            DROPPED_CHANGES.with_label_values(&[&self.name]).inc();
            false
        } else {
            true
        };
        if !sent {
            return;
        }

        // the worker may have died and cleared its backlog after the liveness check
        if !self.is_alive() {
            discard_backlog(&self.name, &self.receiver);
            return;
        }
        OBSERVING_QUEUE_DEPTH
            .with_label_values(&[&self.name])
            .set(self.depth() as i64);
    }

    pub(crate) fn depth(&self) -> usize {
        self.receiver.len()
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

fn discard_backlog(
    name: &str,
    receiver: &Receiver<Arc<ChangeEvent>>,
) {
    let discarded = receiver.try_iter().count();
    if discarded > 0 {
        DROPPED_CHANGES.with_label_values(&[name]).inc_by(discarded as u64);
        debug!("Discarded {} queued changes of {}", discarded, name);
    }
    OBSERVING_QUEUE_DEPTH.with_label_values(&[name]).set(0);
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
