// crates/reachability/src/lib.rs
//! Network reachability state tracking
//!
//! This crate models the reachability of the underlying network as a small
//! state machine and distributes state changes to interested parties:
//!
//! - [`ConnectivityState`]: the current view of the network
//! - [`ReachabilityMonitor`]: owns the state, hands out handles and
//!   subscriptions
//! - [`ReachabilityHandle`]: the publish side, driven by an OS notifier or
//!   an HTTP probe
//! - [`ReachabilitySubscription`]: the consume side, awaited by operations
//!   that need to pause and resume with the network
//!
//! # Example
//!
//! ```rust
//! use tether_reachability::{ConnectivityState, ReachabilityMonitor};
//!
//! let monitor = ReachabilityMonitor::new();
//! let handle = monitor.handle();
//!
//! assert_eq!(monitor.current(), ConnectivityState::Unknown);
//! assert!(handle.report(ConnectivityState::Reachable));
//! // Same state again is a no-op
//! assert!(!handle.report(ConnectivityState::Reachable));
//! ```

mod error;
mod monitor;
mod state;

pub use error::{ReachabilityError, ReachabilityResult};
pub use monitor::{ReachabilityHandle, ReachabilityMonitor, ReachabilitySubscription};
pub use state::ConnectivityState;
