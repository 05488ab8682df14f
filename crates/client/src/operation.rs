// crates/client/src/operation.rs
//! Shared lifecycle scaffolding for retryable operations
//!
//! Every request, upload, and download runs as one future that races its
//! transport attempt against two signals: the operation's cancel flag and
//! the reachability monitor going unreachable. The select is biased so
//! cancellation always wins over a connectivity pause, and a pause always
//! wins over letting a doomed attempt keep running.

use crate::connection::ConnectionInner;
use crate::error::{ConnectionError, ConnectionResult};
use crate::registry::{OperationId, OperationKind, OperationState};
use std::future::Future;
use tether_reachability::ReachabilitySubscription;
use tokio::sync::watch;

/// How a single transport attempt ended, short of a terminal error
pub(crate) enum AttemptOutcome<T> {
    /// The attempt ran to completion
    Done(T),
    /// Connectivity went away; the operation should pause and retry
    Interrupted,
}

/// Resolves when the operation's cancel flag is raised
///
/// Pends forever if the registry entry somehow disappears; the owning
/// connection outlives every operation it issued, so that cannot happen
/// while the operation is live.
pub(crate) async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Resolves when the network becomes unreachable
pub(crate) async fn until_unreachable(mut sub: ReachabilitySubscription) {
    if sub.wait_until_unreachable().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Races one transport attempt against cancellation and connectivity loss
///
/// A transport error only counts as an interruption when the monitor
/// confirms the network is unreachable; otherwise it propagates as-is.
pub(crate) async fn race_attempt<T>(
    cancel: &mut watch::Receiver<bool>,
    sub: &ReachabilitySubscription,
    attempt: impl Future<Output = ConnectionResult<T>>,
) -> ConnectionResult<AttemptOutcome<T>> {
    tokio::select! {
        biased;
        _ = cancelled(cancel) => Err(ConnectionError::Cancelled),
        _ = until_unreachable(sub.clone()) => Ok(AttemptOutcome::Interrupted),
        res = attempt => match res {
            Ok(value) => Ok(AttemptOutcome::Done(value)),
            Err(err) if err.is_connectivity_candidate() && sub.current().is_unreachable() => {
                Ok(AttemptOutcome::Interrupted)
            }
            Err(err) => Err(err),
        },
    }
}

enum PauseEnd {
    Cancelled,
    Restored(ConnectionResult<()>),
}

/// Per-operation retry state threaded through attempts
pub(crate) struct RetryContext<'a> {
    pub(crate) inner: &'a ConnectionInner,
    pub(crate) id: OperationId,
    pub(crate) cancel: watch::Receiver<bool>,
    pub(crate) sub: ReachabilitySubscription,
    interruptions: usize,
}

impl<'a> RetryContext<'a> {
    /// Registers a new operation and captures its signals
    pub(crate) fn begin(inner: &'a ConnectionInner, kind: OperationKind) -> Self {
        let (id, cancel) = inner.registry.register(kind);
        let sub = inner.monitor.subscribe();
        log::debug!("operation {} registered ({:?})", id, kind);
        Self {
            inner,
            id,
            cancel,
            sub,
            interruptions: 0,
        }
    }

    pub(crate) fn set_running(&self) {
        self.inner.registry.set_running(self.id);
    }

    /// Records the terminal state matching `result` in the registry
    pub(crate) fn conclude<T>(&self, result: &ConnectionResult<T>) {
        let state = match result {
            Ok(_) => OperationState::Completed,
            Err(ConnectionError::Cancelled) => OperationState::Cancelled,
            Err(_) => OperationState::Failed,
        };
        self.inner.registry.finish(self.id, state);
        log::debug!("operation {} finished as {:?}", self.id, state);
    }

    /// Parks the operation until connectivity is restored
    ///
    /// Honors the connection's retry budget and offline-wait cap, and
    /// resolves with `Cancelled` if the operation is cancelled while
    /// parked.
    pub(crate) async fn pause(&mut self) -> ConnectionResult<()> {
        self.interruptions += 1;
        if let Some(max) = self.inner.config.max_retries_after_loss {
            if self.interruptions > max {
                log::warn!(
                    "operation {}: giving up after {} connectivity interruptions",
                    self.id,
                    max
                );
                return Err(ConnectionError::ConnectionLost);
            }
        }

        self.inner.registry.set_paused(self.id, true);
        log::info!("operation {} paused awaiting connectivity", self.id);

        let inner = self.inner;
        let id = self.id;
        let max_wait = inner.config.max_offline_wait;
        let sub = &mut self.sub;
        let cancel = &mut self.cancel;

        let restored = async move {
            match max_wait {
                Some(limit) => tokio::time::timeout(limit, sub.wait_until_reachable())
                    .await
                    .map_err(|_| ConnectionError::ConnectionLost)?
                    .map_err(ConnectionError::from),
                None => sub.wait_until_reachable().await.map_err(ConnectionError::from),
            }
        };

        let end = tokio::select! {
            biased;
            _ = cancelled(cancel) => PauseEnd::Cancelled,
            res = restored => PauseEnd::Restored(res),
        };

        match end {
            PauseEnd::Cancelled => Err(ConnectionError::Cancelled),
            PauseEnd::Restored(res) => {
                res?;
                inner.registry.set_running(id);
                log::info!("operation {} resuming after restore", id);
                Ok(())
            }
        }
    }
}

/// Runs `attempt` to completion, pausing and re-issuing it across
/// connectivity interruptions
///
/// Used by operations whose attempts are re-issued from scratch (simple
/// requests and multipart uploads). Downloads carry resume state between
/// attempts and drive their own loop.
pub(crate) async fn drive<T, Fut, F>(
    ctx: &mut RetryContext<'_>,
    mut attempt: F,
) -> ConnectionResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ConnectionResult<T>>,
{
    loop {
        ctx.set_running();
        let fut = attempt();
        match race_attempt(&mut ctx.cancel, &ctx.sub, fut).await? {
            AttemptOutcome::Done(value) => return Ok(value),
            AttemptOutcome::Interrupted => {
                if !ctx.inner.config.repeat_after_loss {
                    return Err(ConnectionError::ConnectionLost);
                }
                ctx.pause().await?;
            }
        }
    }
}
