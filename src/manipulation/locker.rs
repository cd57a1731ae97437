//! Manipulation Lock
//!
//! A single process-wide gate serializing every manipulation of the device
//! under test. Observing preconditions can trigger manipulations at arbitrary
//! times, concurrent manipulations would leave the device in an undefined
//! state.
//!
//! The gate is a ticket lock: every waiter draws a ticket on arrival and the
//! gate is handed over strictly in ticket order, so long queues of competing
//! callers cannot starve anyone. The holding thread may re-enter.

use std::collections::BTreeSet;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::thread::ThreadId;
use std::time::Duration;
use std::time::Instant;

use parking_lot::Condvar;
use parking_lot::Mutex;
use parking_lot::MutexGuard;
use tracing::debug;
use tracing::warn;

use super::ServiceLocator;
use crate::metrics::LOCK_WAIT_SECONDS;
use crate::LockConfig;
use crate::LockError;
use crate::LocatorError;

/// Handle returned by [`ManipulationLocker::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type HolderCallback = Arc<dyn Fn(Option<&str>) + Send + Sync>;

#[derive(Debug, Default)]
struct GateState {
    next_ticket: u64,
    now_serving: u64,
    /// Tickets whose owners gave up waiting, skipped on release
    abandoned: BTreeSet<u64>,
    owner: Option<ThreadId>,
    depth: usize,
    /// Labels of the active calls, innermost last
    holders: Vec<String>,
}

impl GateState {
    fn advance(&mut self) {
        self.now_serving += 1;
        while self.abandoned.remove(&self.now_serving) {
            self.now_serving += 1;
        }
    }
}

pub struct ManipulationLocker {
    gate: Mutex<GateState>,
    turn: Condvar,
    subscribers: Mutex<Vec<(SubscriptionId, HolderCallback)>>,
    next_subscription: AtomicU64,
    locator: Arc<ServiceLocator>,
    config: LockConfig,
}

impl std::fmt::Debug for ManipulationLocker {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ManipulationLocker")
            .field("gate", &*self.gate.lock())
            .field("subscribers", &self.subscribers.lock().len())
            .finish_non_exhaustive()
    }
}

/// Releases the gate on every exit path, including unwinding.
struct GateGuard<'a> {
    locker: &'a ManipulationLocker,
    caller: String,
    acquired_at: Instant,
    nested: bool,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.locker.release(self);
    }
}

impl ManipulationLocker {
    pub fn new(
        locator: Arc<ServiceLocator>,
        config: LockConfig,
    ) -> Self {
        Self {
            gate: Mutex::new(GateState::default()),
            turn: Condvar::new(),
            subscribers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            locator,
            config,
        }
    }

    /// Locks the manipulations and executes `f`, returning its result.
    ///
    /// Blocks until every caller that arrived earlier has finished. Calls
    /// from the thread currently holding the lock run immediately.
    pub fn run_exclusive<T>(
        &self,
        caller: &str,
        f: impl FnOnce() -> T,
    ) -> T {
        let _guard = self.lock(caller);
        f()
    }

    /// Like [`run_exclusive`](Self::run_exclusive), but resolves a fresh
    /// manipulation target of type `M` once the lock is granted and hands it
    /// to `f`.
    pub fn run_exclusive_for<M, T>(
        &self,
        caller: &str,
        f: impl FnOnce(M) -> T,
    ) -> Result<T, LocatorError>
    where
        M: Send + 'static,
    {
        let _guard = self.lock(caller);
        let target = self.locator.resolve::<M>()?;
        Ok(f(target))
    }

    /// Like [`run_exclusive`](Self::run_exclusive), but abandons the wait
    /// after `timeout`. An abandoned wait does not disturb later waiters.
    pub fn try_run_exclusive<T>(
        &self,
        caller: &str,
        timeout: Duration,
        f: impl FnOnce() -> T,
    ) -> Result<T, LockError> {
        let _guard = self.try_lock_for(caller, timeout)?;
        Ok(f())
    }

    /// Returns whether the manipulations are currently locked.
    ///
    /// This is mostly useful for unit testing.
    pub fn is_locked(&self) -> bool {
        self.gate.lock().owner.is_some()
    }

    /// Name of the caller currently inside the lock, for diagnostics only
    pub fn current_holder(&self) -> Option<String> {
        self.gate.lock().holders.last().cloned()
    }

    /// Number of callers currently waiting for the lock
    pub fn queued_waiters(&self) -> usize {
        let state = self.gate.lock();
        let outstanding = state.next_ticket - state.now_serving;
        let held = u64::from(state.owner.is_some());
        outstanding
            .saturating_sub(held)
            .saturating_sub(state.abandoned.len() as u64) as usize
    }

    /// Registers a callback receiving the holder name on every acquisition
    /// and `None` on every release.
    ///
    /// Callbacks run synchronously on the transitioning thread, in
    /// subscription order. A panicking callback is logged and skipped.
    pub fn subscribe(
        &self,
        callback: impl Fn(Option<&str>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push((id, Arc::new(callback)));
        id
    }

    pub fn unsubscribe(
        &self,
        id: SubscriptionId,
    ) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        before != subscribers.len()
    }

    fn lock(
        &self,
        caller: &str,
    ) -> GateGuard<'_> {
        let started = Instant::now();
        let mut state = self.gate.lock();
        if state.owner == Some(thread::current().id()) {
            return self.reenter(state, caller);
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        while state.now_serving != ticket {
            self.turn.wait(&mut state);
        }
        self.grant(state, caller, started)
    }

    fn try_lock_for(
        &self,
        caller: &str,
        timeout: Duration,
    ) -> Result<GateGuard<'_>, LockError> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut state = self.gate.lock();
        if state.owner == Some(thread::current().id()) {
            return Ok(self.reenter(state, caller));
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        while state.now_serving != ticket {
            if self.turn.wait_until(&mut state, deadline).timed_out() && state.now_serving != ticket {
                state.abandoned.insert(ticket);
                drop(state);
                let waited = started.elapsed();
                debug!("{} abandoned waiting for the lock after {:?}", caller, waited);
                return Err(LockError::Timeout {
                    caller: caller.to_string(),
                    waited,
                });
            }
        }
        Ok(self.grant(state, caller, started))
    }

    fn grant(
        &self,
        mut state: MutexGuard<'_, GateState>,
        caller: &str,
        started: Instant,
    ) -> GateGuard<'_> {
        state.owner = Some(thread::current().id());
        state.depth = 1;
        state.holders = vec![caller.to_string()];
        drop(state);

        LOCK_WAIT_SECONDS.observe(started.elapsed().as_secs_f64());
        debug!("Lock was granted for {}, executing lambda", caller);
        self.publish(Some(caller));

        GateGuard {
            locker: self,
            caller: caller.to_string(),
            acquired_at: Instant::now(),
            nested: false,
        }
    }

    fn reenter(
        &self,
        mut state: MutexGuard<'_, GateState>,
        caller: &str,
    ) -> GateGuard<'_> {
        state.depth += 1;
        state.holders.push(caller.to_string());
        let depth = state.depth;
        drop(state);

        debug!(depth, "Lock was re-entered by {}", caller);
        self.publish(Some(caller));

        GateGuard {
            locker: self,
            caller: caller.to_string(),
            acquired_at: Instant::now(),
            nested: true,
        }
    }

    fn release(
        &self,
        guard: &GateGuard<'_>,
    ) {
        let held = guard.acquired_at.elapsed();
        if held > self.config.slow_hold_warning() {
            warn!("{} held the manipulation lock for {:?}", guard.caller, held);
        }

        {
            let mut state = self.gate.lock();
            state.holders.pop();
            if guard.nested {
                state.depth -= 1;
            }
        }
        // still owning the gate, transitions cannot interleave
        self.publish(None);

        if guard.nested {
            debug!("Lock was left by nested caller {} after {:?}", guard.caller, held);
            return;
        }

        debug!("Releasing lock for {} after {:?}", guard.caller, held);
        let mut state = self.gate.lock();
        state.owner = None;
        state.depth = 0;
        state.advance();
        drop(state);
        self.turn.notify_all();
    }

    fn publish(
        &self,
        holder: Option<&str>,
    ) {
        let callbacks: Vec<HolderCallback> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();

        for callback in callbacks {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(holder))).is_err() {
                warn!(?holder, "Lock holder subscriber panicked");
            }
        }
    }
}
