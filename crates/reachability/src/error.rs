// crates/reachability/src/error.rs
//! Error types for reachability tracking

use thiserror::Error;

/// Result type for reachability operations
pub type ReachabilityResult<T> = Result<T, ReachabilityError>;

/// Errors that can occur while tracking reachability
#[derive(Debug, Error)]
pub enum ReachabilityError {
    /// The monitor that backed this subscription was dropped
    #[error("Reachability monitor closed")]
    MonitorClosed,
}
