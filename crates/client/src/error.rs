// crates/client/src/error.rs
//! Error types for connection operations

use thiserror::Error;

/// Result type for connection operations
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Errors that can occur during connection operations
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Server answered with a non-success status
    #[error("HTTP status {0}")]
    HttpStatus(u16),

    /// Response body did not match the requested response type
    #[error("Response decode failed: {0}")]
    Decode(String),

    /// Connectivity was lost and the operation will not be retried
    #[error("Connection lost")]
    ConnectionLost,

    /// Operation was explicitly cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Reachability monitor error
    #[error("Reachability error: {0}")]
    Reachability(#[from] tether_reachability::ReachabilityError),
}

impl ConnectionError {
    /// Returns true if this error may have been caused by the network
    /// going away
    ///
    /// A candidate only becomes a connectivity interruption when the
    /// reachability monitor confirms the network is unreachable; otherwise
    /// it surfaces as a plain transport error.
    pub fn is_connectivity_candidate(&self) -> bool {
        match self {
            ConnectionError::Http(e) => {
                e.is_connect() || e.is_timeout() || e.is_body() || e.is_request()
            }
            ConnectionError::ConnectionLost => true,
            _ => false,
        }
    }

    /// Returns true if the operation was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ConnectionError::Cancelled)
    }

    /// Returns true if the error is a configuration error that never
    /// reached the network
    pub fn is_configuration(&self) -> bool {
        matches!(self, ConnectionError::InvalidUrl(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConnectionError::InvalidUrl("".to_string());
        assert!(err.to_string().contains("Invalid URL"));

        let err = ConnectionError::HttpStatus(503);
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_connectivity_candidates() {
        assert!(ConnectionError::ConnectionLost.is_connectivity_candidate());
        assert!(!ConnectionError::Cancelled.is_connectivity_candidate());
        assert!(!ConnectionError::Decode("bad".to_string()).is_connectivity_candidate());
        assert!(!ConnectionError::HttpStatus(500).is_connectivity_candidate());
    }

    #[test]
    fn test_classification_helpers() {
        assert!(ConnectionError::Cancelled.is_cancelled());
        assert!(ConnectionError::InvalidUrl("x".to_string()).is_configuration());
        assert!(!ConnectionError::ConnectionLost.is_configuration());
    }
}
