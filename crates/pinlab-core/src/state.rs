//! Observable request lifecycle
//!
//! Every transition replaces the current [`RequestSnapshot`] and is broadcast while
//! the lock is held, so subscribers receive transitions in the order they happened.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use pinlab_types::{RequestError, RequestPhase, RequestSnapshot};

/// Snapshots buffered per subscriber before it starts lagging
const UPDATE_CAPACITY: usize = 16;

/// Lifecycle state of one request definition
///
/// Only the executor mutates it. Running two executions against the same state
/// at once is a caller error; it is logged but not prevented.
#[derive(Debug)]
pub struct RequestState {
    current: Mutex<RequestSnapshot>,
    updates: broadcast::Sender<RequestSnapshot>,
}

impl RequestState {
    /// Fresh state in `Idle`
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        Self {
            current: Mutex::new(RequestSnapshot::idle()),
            updates,
        }
    }

    /// Copy of the current snapshot
    pub fn snapshot(&self) -> RequestSnapshot {
        self.lock().clone()
    }

    /// Current phase
    pub fn phase(&self) -> RequestPhase {
        self.lock().phase
    }

    /// Receive every subsequent transition
    pub fn subscribe(&self) -> broadcast::Receiver<RequestSnapshot> {
        self.updates.subscribe()
    }

    /// Enter `Loading`, clearing the previous result
    ///
    /// The returned guard records `Aborted` if it is dropped before completion.
    pub(crate) fn begin_loading(&self) -> LoadingGuard<'_> {
        self.transition(|previous| {
            if previous == RequestPhase::Loading {
                warn!("execution started while another is in flight on the same state");
            }
            RequestSnapshot::loading()
        });
        LoadingGuard {
            state: self,
            armed: true,
        }
    }

    /// Record a failure detected before any I/O, without passing through `Loading`
    pub(crate) fn fail_before_loading(&self, error: RequestError) {
        self.transition(|_| RequestSnapshot::failed(error));
    }

    fn finish(&self, next: RequestSnapshot) {
        self.transition(|previous| {
            if previous != RequestPhase::Loading {
                warn!(from = %previous, to = %next.phase, "terminal transition outside loading");
            }
            next
        });
    }

    fn transition(&self, next: impl FnOnce(RequestPhase) -> RequestSnapshot) {
        let mut current = self.lock();
        let snapshot = next(current.phase);
        debug!(from = %current.phase, to = %snapshot.phase, "request state transition");
        *current = snapshot.clone();
        // No subscribers is fine.
        let _ = self.updates.send(snapshot);
    }

    fn lock(&self) -> MutexGuard<'_, RequestSnapshot> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RequestState {
    fn default() -> Self {
        Self::new()
    }
}

/// Scope of one `Loading` phase
///
/// Exactly one terminal snapshot is recorded per guard: through
/// [`LoadingGuard::succeed`], [`LoadingGuard::fail`], or `Aborted` on drop.
#[derive(Debug)]
pub(crate) struct LoadingGuard<'a> {
    state: &'a RequestState,
    armed: bool,
}

impl LoadingGuard<'_> {
    pub(crate) fn succeed(mut self, status_code: u16) {
        self.armed = false;
        self.state.finish(RequestSnapshot::succeeded(status_code));
    }

    pub(crate) fn fail(mut self, error: RequestError) {
        self.armed = false;
        self.state.finish(RequestSnapshot::failed(error));
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.finish(RequestSnapshot::failed(RequestError::Aborted));
        }
    }
}
