// crates/client/src/registry.rs
//! Registry of outstanding operations

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Identifier of one outstanding operation, unique per connection
pub type OperationId = u64;

/// What an operation does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Simple,
    Multipart,
    Download,
    ConditionalDownload,
}

/// Lifecycle state of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Pending,
    Running,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

impl OperationState {
    /// Returns true if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationState::Completed | OperationState::Cancelled | OperationState::Failed
        )
    }
}

struct OperationEntry {
    kind: OperationKind,
    state: OperationState,
    retryable: bool,
    cancel_tx: watch::Sender<bool>,
}

/// Tracks every operation issued through a connection
///
/// The registry is the single owner of operation bookkeeping. All mutation
/// goes through its lock, so a cancellation and a connectivity-driven pause
/// racing on the same operation cannot lose updates. Terminal states are
/// final: `finish` and the bulk transitions never overwrite them, which is
/// what makes cancellation win over retry.
pub(crate) struct OperationRegistry {
    ops: Mutex<HashMap<OperationId, OperationEntry>>,
    next_id: AtomicU64,
}

impl OperationRegistry {
    pub(crate) fn new() -> Self {
        Self {
            ops: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<OperationId, OperationEntry>> {
        self.ops.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new operation in the `Pending` state
    ///
    /// Returns the operation id and the receiver its future must watch for
    /// cancellation.
    pub(crate) fn register(&self, kind: OperationKind) -> (OperationId, watch::Receiver<bool>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (cancel_tx, cancel_rx) = watch::channel(false);

        self.lock().insert(
            id,
            OperationEntry {
                kind,
                state: OperationState::Pending,
                retryable: false,
                cancel_tx,
            },
        );

        (id, cancel_rx)
    }

    /// Marks an operation as running, unless it already finished
    pub(crate) fn set_running(&self, id: OperationId) {
        if let Some(entry) = self.lock().get_mut(&id) {
            if !entry.state.is_terminal() {
                entry.state = OperationState::Running;
            }
        }
    }

    /// Marks an operation as paused awaiting connectivity
    pub(crate) fn set_paused(&self, id: OperationId, retryable: bool) {
        if let Some(entry) = self.lock().get_mut(&id) {
            if !entry.state.is_terminal() {
                entry.state = OperationState::Paused;
                entry.retryable = retryable;
            }
        }
    }

    /// Moves an operation into a terminal state
    ///
    /// A no-op when the operation is already terminal, so a cancelled
    /// operation can never be re-marked completed or failed.
    pub(crate) fn finish(&self, id: OperationId, state: OperationState) {
        debug_assert!(state.is_terminal());
        if let Some(entry) = self.lock().get_mut(&id) {
            if !entry.state.is_terminal() {
                entry.state = state;
            }
        }
    }

    /// Pauses every running operation, marking retry eligibility
    ///
    /// Invoked by the connectivity controller on a loss transition. Returns
    /// the number of operations paused.
    pub(crate) fn pause_running(&self, retryable: bool) -> usize {
        let mut paused = 0;
        for entry in self.lock().values_mut() {
            if entry.state == OperationState::Running {
                entry.state = OperationState::Paused;
                entry.retryable = retryable;
                paused += 1;
            }
        }
        paused
    }

    /// Marks every retry-eligible paused operation as running again
    ///
    /// Invoked by the connectivity controller on a restore transition.
    /// Returns the number of operations resumed.
    pub(crate) fn resume_paused(&self) -> usize {
        let mut resumed = 0;
        for entry in self.lock().values_mut() {
            if entry.state == OperationState::Paused && entry.retryable {
                entry.state = OperationState::Running;
                resumed += 1;
            }
        }
        resumed
    }

    /// Cancels every operation that has not already finished
    ///
    /// Fires each operation's cancel signal and marks it `Cancelled`.
    /// Returns the number of operations cancelled.
    pub(crate) fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        for entry in self.lock().values_mut() {
            if !entry.state.is_terminal() {
                let _ = entry.cancel_tx.send(true);
                entry.state = OperationState::Cancelled;
                entry.retryable = false;
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Returns the state of an operation, if it is known
    pub(crate) fn state_of(&self, id: OperationId) -> Option<OperationState> {
        self.lock().get(&id).map(|e| e.state)
    }

    /// Snapshot of every operation issued so far
    pub(crate) fn snapshot(&self) -> Vec<(OperationId, OperationKind, OperationState)> {
        let mut ops: Vec<_> = self
            .lock()
            .iter()
            .map(|(id, e)| (*id, e.kind, e.state))
            .collect();
        ops.sort_by_key(|(id, _, _)| *id);
        ops
    }

    /// Number of operations not yet in a terminal state
    pub(crate) fn active_count(&self) -> usize {
        self.lock().values().filter(|e| !e.state.is_terminal()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_starts_pending() {
        let registry = OperationRegistry::new();
        let (id, cancel) = registry.register(OperationKind::Simple);

        assert_eq!(registry.state_of(id), Some(OperationState::Pending));
        assert_eq!(
            registry.snapshot(),
            vec![(id, OperationKind::Simple, OperationState::Pending)]
        );
        assert!(!*cancel.borrow());
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = OperationRegistry::new();
        let (a, _rx_a) = registry.register(OperationKind::Simple);
        let (b, _rx_b) = registry.register(OperationKind::Download);
        assert_ne!(a, b);
    }

    #[test]
    fn test_pause_running_only_touches_running() {
        let registry = OperationRegistry::new();
        let (running, _rx1) = registry.register(OperationKind::Download);
        let (pending, _rx2) = registry.register(OperationKind::Simple);
        let (done, _rx3) = registry.register(OperationKind::Simple);

        registry.set_running(running);
        registry.set_running(done);
        registry.finish(done, OperationState::Completed);

        assert_eq!(registry.pause_running(true), 1);
        assert_eq!(registry.state_of(running), Some(OperationState::Paused));
        assert_eq!(registry.state_of(pending), Some(OperationState::Pending));
        assert_eq!(registry.state_of(done), Some(OperationState::Completed));
    }

    #[test]
    fn test_resume_skips_non_retryable() {
        let registry = OperationRegistry::new();
        let (retryable, _rx1) = registry.register(OperationKind::Download);
        let (stuck, _rx2) = registry.register(OperationKind::Simple);

        registry.set_paused(retryable, true);
        registry.set_paused(stuck, false);

        assert_eq!(registry.resume_paused(), 1);
        assert_eq!(registry.state_of(retryable), Some(OperationState::Running));
        assert_eq!(registry.state_of(stuck), Some(OperationState::Paused));
    }

    #[test]
    fn test_cancel_all_counts_and_signals() {
        let registry = OperationRegistry::new();
        let (a, rx_a) = registry.register(OperationKind::Simple);
        let (b, rx_b) = registry.register(OperationKind::Download);
        let (done, rx_done) = registry.register(OperationKind::Simple);

        registry.set_running(a);
        registry.set_paused(b, true);
        registry.finish(done, OperationState::Completed);

        assert_eq!(registry.cancel_all(), 2);
        assert!(*rx_a.borrow());
        assert!(*rx_b.borrow());
        assert!(!*rx_done.borrow());

        assert_eq!(registry.state_of(a), Some(OperationState::Cancelled));
        assert_eq!(registry.state_of(b), Some(OperationState::Cancelled));
        assert_eq!(registry.state_of(done), Some(OperationState::Completed));
    }

    #[test]
    fn test_cancellation_wins_over_later_transitions() {
        let registry = OperationRegistry::new();
        let (id, _rx) = registry.register(OperationKind::Download);

        registry.set_running(id);
        registry.cancel_all();

        // A racing pause, resume or completion must not revive the operation
        registry.set_running(id);
        registry.set_paused(id, true);
        registry.resume_paused();
        registry.finish(id, OperationState::Completed);

        assert_eq!(registry.state_of(id), Some(OperationState::Cancelled));
    }

    #[test]
    fn test_active_count() {
        let registry = OperationRegistry::new();
        assert_eq!(registry.active_count(), 0);

        let (a, _rx_a) = registry.register(OperationKind::Simple);
        let (_b, _rx_b) = registry.register(OperationKind::Multipart);
        assert_eq!(registry.active_count(), 2);

        registry.finish(a, OperationState::Failed);
        assert_eq!(registry.active_count(), 1);
    }
}
