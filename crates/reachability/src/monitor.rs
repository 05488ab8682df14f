// crates/reachability/src/monitor.rs
//! Reachability monitor: publish/subscribe hub for connectivity state

use crate::error::{ReachabilityError, ReachabilityResult};
use crate::state::ConnectivityState;
use tokio::sync::watch;

/// Owns the current connectivity state and distributes changes
///
/// The monitor itself does not watch the network. State is pushed into it
/// through a [`ReachabilityHandle`] by whatever source the embedder wires
/// up: an OS notifier, an HTTP probe, or a test. Invalid transitions
/// (same-state reports, re-entering `Unknown`) are rejected at the publish
/// point, so subscribers only ever observe genuine transitions.
pub struct ReachabilityMonitor {
    tx: watch::Sender<ConnectivityState>,
}

impl ReachabilityMonitor {
    /// Creates a monitor starting in the `Unknown` state
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectivityState::Unknown);
        Self { tx }
    }

    /// Returns the publish side of the monitor
    pub fn handle(&self) -> ReachabilityHandle {
        ReachabilityHandle {
            tx: self.tx.clone(),
        }
    }

    /// Returns a new subscription observing state changes
    pub fn subscribe(&self) -> ReachabilitySubscription {
        ReachabilitySubscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Returns the current state
    pub fn current(&self) -> ConnectivityState {
        *self.tx.borrow()
    }
}

impl Default for ReachabilityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Publish side of a [`ReachabilityMonitor`]
///
/// Cheap to clone; every clone reports into the same monitor.
#[derive(Clone)]
pub struct ReachabilityHandle {
    tx: watch::Sender<ConnectivityState>,
}

impl ReachabilityHandle {
    /// Reports a new state observed by the underlying source
    ///
    /// Returns true if this was a genuine transition that subscribers will
    /// see, false if the report was rejected as redundant or invalid.
    pub fn report(&self, state: ConnectivityState) -> bool {
        let accepted = self.tx.send_if_modified(|current| {
            if current.can_transition_to(state) {
                *current = state;
                true
            } else {
                false
            }
        });

        if accepted {
            log::debug!("reachability transition to {}", state);
        }

        accepted
    }

    /// Returns the current state
    pub fn current(&self) -> ConnectivityState {
        *self.tx.borrow()
    }
}

/// Consume side of a [`ReachabilityMonitor`]
///
/// Cheap to clone; each clone tracks its own "last seen" position in the
/// change stream.
#[derive(Clone)]
pub struct ReachabilitySubscription {
    rx: watch::Receiver<ConnectivityState>,
}

impl ReachabilitySubscription {
    /// Returns the current state without waiting
    pub fn current(&self) -> ConnectivityState {
        *self.rx.borrow()
    }

    /// Waits for the next state change and returns the new state
    pub async fn changed(&mut self) -> ReachabilityResult<ConnectivityState> {
        self.rx
            .changed()
            .await
            .map_err(|_| ReachabilityError::MonitorClosed)?;
        Ok(*self.rx.borrow_and_update())
    }

    /// Resolves once the network is reachable
    ///
    /// Resolves immediately if it already is.
    pub async fn wait_until_reachable(&mut self) -> ReachabilityResult<()> {
        self.rx
            .wait_for(|s| s.is_reachable())
            .await
            .map_err(|_| ReachabilityError::MonitorClosed)?;
        Ok(())
    }

    /// Resolves once the network is unreachable
    ///
    /// Resolves immediately if it already is.
    pub async fn wait_until_unreachable(&mut self) -> ReachabilityResult<()> {
        self.rx
            .wait_for(|s| s.is_unreachable())
            .await
            .map_err(|_| ReachabilityError::MonitorClosed)?;
        Ok(())
    }
}
