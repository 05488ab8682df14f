// crates/client/src/lib.rs
//! Connectivity-aware HTTP client
//!
//! A thin layer over an HTTP transport that knows whether the network is
//! reachable and keeps in-flight work correct across an unreliable
//! connection:
//!
//! - [`Connection`]: simple requests, multipart uploads, and plain or
//!   conditional ("download only if changed") file downloads
//! - Operations interrupted by connectivity loss pause instead of failing
//!   and re-issue themselves when connectivity returns; downloads resume
//!   from their last written byte when the server supports ranges
//! - Loss/restore callbacks fire exactly once per genuine transition
//! - [`Connection::cancel_all_operations`] terminates every outstanding
//!   unit of work with a single cancellation error each
//!
//! # Example
//!
//! ```rust,no_run
//! use tether_client::{Connection, Method, ResponseType};
//!
//! # async fn example() -> Result<(), tether_client::ConnectionError> {
//! let connection = Connection::new()?;
//! let body = connection
//!     .send_request(
//!         "https://api.example.com/status",
//!         Method::Get,
//!         None,
//!         ResponseType::Json,
//!         None,
//!     )
//!     .await?;
//! println!("{:?}", body.as_json());
//! # Ok(())
//! # }
//! ```

mod connection;
mod controller;
mod download;
mod error;
mod multipart;
mod operation;
mod probe;
mod progress;
mod registry;
mod request;

pub use connection::{Connection, ConnectionConfig, ConnectivityCallback};
pub use download::Validator;
pub use error::{ConnectionError, ConnectionResult};
pub use multipart::PartsBuilder;
pub use probe::{HttpProbe, ProbeConfig};
pub use progress::{ProgressHandler, ProgressTracker, TransferProgress};
pub use registry::{OperationId, OperationKind, OperationState};
pub use request::{Method, ResponseBody, ResponseType, SetupHook};

pub use tether_reachability::{
    ConnectivityState, ReachabilityHandle, ReachabilityMonitor, ReachabilitySubscription,
};
