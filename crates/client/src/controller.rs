// crates/client/src/controller.rs
//! Connectivity controller: turns monitor transitions into operation
//! disposition and caller callbacks
//!
//! One task per connection processes transitions strictly in order, so a
//! loss and a restore can never interleave their handling, and each
//! genuine transition fires its callback exactly once. The task holds only
//! a weak reference to the connection's shared state and exits when the
//! connection is dropped.

use crate::connection::ConnectionInner;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;

pub(crate) fn spawn(inner: &Arc<ConnectionInner>) -> JoinHandle<()> {
    let weak: Weak<ConnectionInner> = Arc::downgrade(inner);
    let mut sub = inner.monitor.subscribe();
    // Captured before the task first polls, so a transition arriving in
    // that window is still seen as a transition
    let mut prev = sub.current();

    tokio::spawn(async move {
        loop {
            let next = match sub.changed().await {
                Ok(state) => state,
                Err(_) => break,
            };
            let Some(inner) = weak.upgrade() else { break };

            if prev.is_loss_to(next) {
                let paused = inner.registry.pause_running(inner.config.repeat_after_loss);
                log::info!("connectivity lost, paused {} running operation(s)", paused);
                if let Some(on_lost) = &inner.on_lost {
                    on_lost();
                }
            } else if prev.is_restore_to(next) {
                if let Some(on_restored) = &inner.on_restored {
                    on_restored();
                }
                let resumed = inner.registry.resume_paused();
                log::info!("connectivity restored, resuming {} paused operation(s)", resumed);
            }

            prev = next;
        }
    })
}
