// crates/client/src/connection.rs
//! The connection: root object owning the reachability monitor, the
//! operation registry, and the HTTP client

use crate::controller;
use crate::download::{self, DownloadOptions, Validator, ValidatorCache};
use crate::error::{ConnectionError, ConnectionResult};
use crate::multipart::{self, data_part, file_part, MultipartOptions, PartsBuilder};
use crate::probe::{HttpProbe, ProbeConfig};
use crate::progress::ProgressHandler;
use crate::registry::{OperationId, OperationKind, OperationRegistry, OperationState};
use crate::request::{self, Method, RequestOptions, ResponseBody, ResponseType, SetupHook};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tether_reachability::{ConnectivityState, ReachabilityHandle, ReachabilityMonitor};
use tokio::task::JoinHandle;

/// Connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Whether the underlying client keeps and sends cookies
    pub cookies_enabled: bool,
    /// Per-attempt request timeout
    pub timeout: Duration,
    /// User agent string
    pub user_agent: String,
    /// Maximum redirects to follow
    pub max_redirects: usize,
    /// Whether operations interrupted by connectivity loss are re-issued
    /// automatically once connectivity is restored
    pub repeat_after_loss: bool,
    /// Cap on how many connectivity interruptions one operation survives
    /// before failing with a connectivity error; `None` retries
    /// indefinitely
    pub max_retries_after_loss: Option<usize>,
    /// Cap on how long one operation stays paused waiting for restore;
    /// `None` waits indefinitely
    pub max_offline_wait: Option<Duration>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            cookies_enabled: true,
            timeout: Duration::from_secs(30),
            user_agent: format!("tether/{}", env!("CARGO_PKG_VERSION")),
            max_redirects: 10,
            repeat_after_loss: true,
            max_retries_after_loss: None,
            max_offline_wait: None,
        }
    }
}

/// Callback fired on a connectivity transition
///
/// Handed over before the connection exists, so it cannot capture the
/// connection and create an ownership cycle.
pub type ConnectivityCallback = Arc<dyn Fn() + Send + Sync>;

pub(crate) struct ConnectionInner {
    pub(crate) http: reqwest::Client,
    pub(crate) config: ConnectionConfig,
    pub(crate) registry: OperationRegistry,
    pub(crate) monitor: ReachabilityMonitor,
    pub(crate) validators: ValidatorCache,
    pub(crate) on_lost: Option<ConnectivityCallback>,
    pub(crate) on_restored: Option<ConnectivityCallback>,
    controller: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        // No operations can be live here: every operation future borrows a
        // connection handle. Tear down the controller task.
        if let Some(task) = self
            .controller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

/// A connectivity-aware HTTP client
///
/// Issues simple requests, multipart uploads, and plain or conditional
/// file downloads. Operations interrupted by connectivity loss pause and,
/// when `repeat_after_loss` is set, re-issue themselves automatically once
/// connectivity returns; downloads resume from their last written byte
/// when the server supports ranges.
///
/// Cloning is cheap and every clone drives the same state. Dropping the
/// last handle cancels the controller; outstanding operation futures
/// cannot outlive it because they borrow a handle.
///
/// Construction spawns the controller task and must happen within a tokio
/// runtime.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Creates a connection with default configuration
    pub fn new() -> ConnectionResult<Self> {
        Self::with_config(ConnectionConfig::default())
    }

    /// Creates a connection with custom configuration
    pub fn with_config(config: ConnectionConfig) -> ConnectionResult<Self> {
        Self::with_callbacks(config, None, None)
    }

    /// Creates a connection with loss/restore callbacks
    ///
    /// `on_lost` fires exactly once per genuine transition to unreachable,
    /// `on_restored` exactly once per genuine transition from unreachable
    /// back to reachable.
    pub fn with_callbacks(
        config: ConnectionConfig,
        on_lost: Option<ConnectivityCallback>,
        on_restored: Option<ConnectivityCallback>,
    ) -> ConnectionResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .cookie_store(config.cookies_enabled)
            .build()
            .map_err(ConnectionError::Http)?;

        let inner = Arc::new(ConnectionInner {
            http,
            config,
            registry: OperationRegistry::new(),
            monitor: ReachabilityMonitor::new(),
            validators: ValidatorCache::new(),
            on_lost,
            on_restored,
            controller: Mutex::new(None),
        });

        let task = controller::spawn(&inner);
        *inner
            .controller
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(task);

        Ok(Self { inner })
    }

    /// Current configuration
    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Current connectivity state
    pub fn connectivity(&self) -> ConnectivityState {
        self.inner.monitor.current()
    }

    /// Publish side of this connection's reachability monitor
    ///
    /// Platform glue (or a test) reports network state changes through
    /// this handle.
    pub fn reachability(&self) -> ReachabilityHandle {
        self.inner.monitor.handle()
    }

    /// Spawns an HTTP probe feeding this connection's monitor
    ///
    /// The probe stops when the returned value is dropped.
    pub fn spawn_probe(&self, config: ProbeConfig) -> HttpProbe {
        HttpProbe::spawn(self.inner.http.clone(), config, self.reachability())
    }

    /// Sends a simple request and decodes the response
    ///
    /// `Method::Json` serializes `parameters` as a JSON document body;
    /// `Method::Get` encodes them into the query string; `Method::Post`
    /// sends them form-encoded. The optional `setup` hook sees the raw
    /// request builder right before dispatch.
    pub async fn send_request(
        &self,
        url: &str,
        method: Method,
        parameters: Option<serde_json::Value>,
        response_type: ResponseType,
        setup: Option<SetupHook>,
    ) -> ConnectionResult<ResponseBody> {
        request::send(
            &self.inner,
            RequestOptions {
                url: url.to_string(),
                method,
                parameters,
                response_type,
                setup,
            },
        )
        .await
    }

    /// Uploads a single blob as a multipart request
    pub async fn send_multipart_data(
        &self,
        url: &str,
        parameters: Option<serde_json::Value>,
        name: &str,
        data: impl Into<Bytes>,
        file_extension: Option<&str>,
        response_type: ResponseType,
        progress: Option<ProgressHandler>,
    ) -> ConnectionResult<ResponseBody> {
        let parts = vec![data_part(name, data.into(), file_extension, None)];
        self.send_multipart(url, parameters, parts, response_type, progress)
            .await
    }

    /// Uploads an array of blobs under one field name
    pub async fn send_multipart_data_array(
        &self,
        url: &str,
        parameters: Option<serde_json::Value>,
        name: &str,
        data: Vec<Bytes>,
        file_extension: Option<&str>,
        response_type: ResponseType,
        progress: Option<ProgressHandler>,
    ) -> ConnectionResult<ResponseBody> {
        let parts = data
            .into_iter()
            .enumerate()
            .map(|(i, blob)| data_part(name, blob, file_extension, Some(i)))
            .collect();
        self.send_multipart(url, parameters, parts, response_type, progress)
            .await
    }

    /// Uploads files from disk under one field name
    ///
    /// Filenames are inferred from the paths and each file is streamed,
    /// not read into memory.
    pub async fn send_multipart_files(
        &self,
        url: &str,
        parameters: Option<serde_json::Value>,
        name: &str,
        paths: &[PathBuf],
        response_type: ResponseType,
        progress: Option<ProgressHandler>,
    ) -> ConnectionResult<ResponseBody> {
        let parts = paths
            .iter()
            .map(|path| file_part(name, path.clone()))
            .collect();
        self.send_multipart(url, parameters, parts, response_type, progress)
            .await
    }

    /// Uploads a caller-constructed multipart body
    pub async fn send_multipart_with(
        &self,
        url: &str,
        parameters: Option<serde_json::Value>,
        build: impl FnOnce(&mut PartsBuilder),
        response_type: ResponseType,
        progress: Option<ProgressHandler>,
    ) -> ConnectionResult<ResponseBody> {
        let mut builder = PartsBuilder::new();
        build(&mut builder);
        self.send_multipart(url, parameters, builder.into_parts(), response_type, progress)
            .await
    }

    async fn send_multipart(
        &self,
        url: &str,
        parameters: Option<serde_json::Value>,
        parts: Vec<crate::multipart::UploadPart>,
        response_type: ResponseType,
        progress: Option<ProgressHandler>,
    ) -> ConnectionResult<ResponseBody> {
        multipart::send(
            &self.inner,
            MultipartOptions {
                url: url.to_string(),
                parameters,
                parts,
                response_type,
                progress,
            },
        )
        .await
    }

    /// Downloads a file, streaming it to `destination`
    ///
    /// Returns the number of bytes written.
    pub async fn download_file(
        &self,
        url: &str,
        destination: impl AsRef<Path>,
        progress: Option<ProgressHandler>,
    ) -> ConnectionResult<u64> {
        let outcome = download::download(
            &self.inner,
            DownloadOptions {
                url: url.to_string(),
                destination: destination.as_ref().to_path_buf(),
                conditional: false,
                progress,
            },
        )
        .await?;
        Ok(outcome.bytes_written)
    }

    /// Downloads a file only if it changed since the last fetch
    ///
    /// Returns true if the destination was rewritten with new content,
    /// false if the server reported the resource unchanged (the
    /// destination is left untouched).
    pub async fn download_file_with_conditional_control(
        &self,
        url: &str,
        destination: impl AsRef<Path>,
        progress: Option<ProgressHandler>,
    ) -> ConnectionResult<bool> {
        let outcome = download::download(
            &self.inner,
            DownloadOptions {
                url: url.to_string(),
                destination: destination.as_ref().to_path_buf(),
                conditional: true,
                progress,
            },
        )
        .await?;
        Ok(outcome.modified)
    }

    /// Cancels every outstanding operation
    ///
    /// Each affected operation resolves exactly once with a cancellation
    /// error, with no further progress ticks. Cancellation wins over any
    /// in-flight connectivity retry. Returns the number of operations
    /// cancelled.
    pub fn cancel_all_operations(&self) -> usize {
        let cancelled = self.inner.registry.cancel_all();
        if cancelled > 0 {
            log::info!("cancelled {} outstanding operation(s)", cancelled);
        }
        cancelled
    }

    /// Number of operations not yet finished
    pub fn active_operations(&self) -> usize {
        self.inner.registry.active_count()
    }

    /// States of every operation issued through this connection, in
    /// issue order
    pub fn operations(&self) -> Vec<(OperationId, OperationKind, OperationState)> {
        self.inner.registry.snapshot()
    }

    /// Returns the cached validator for a `(url, destination)` pair
    ///
    /// Callers wanting conditional downloads to survive a process restart
    /// persist this and hand it back via [`Connection::prime_validator`].
    pub fn cached_validator(&self, url: &str, destination: impl AsRef<Path>) -> Option<Validator> {
        self.inner.validators.get(url, destination.as_ref())
    }

    /// Seeds the validator cache for a `(url, destination)` pair
    pub fn prime_validator(
        &self,
        url: &str,
        destination: impl AsRef<Path>,
        validator: Validator,
    ) {
        self.inner.validators.put(
            url.to_string(),
            destination.as_ref().to_path_buf(),
            validator,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ConnectionConfig::default();
        assert!(config.cookies_enabled);
        assert!(config.repeat_after_loss);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_redirects, 10);
        assert!(config.max_retries_after_loss.is_none());
        assert!(config.max_offline_wait.is_none());
    }

    #[tokio::test]
    async fn test_connection_creation() {
        let connection = Connection::new();
        assert!(connection.is_ok());
    }

    #[tokio::test]
    async fn test_connection_clone_shares_state() {
        let connection = Connection::new().expect("default connection");
        let cloned = connection.clone();

        connection
            .reachability()
            .report(ConnectivityState::Reachable);
        assert_eq!(cloned.connectivity(), ConnectivityState::Reachable);
    }

    #[tokio::test]
    async fn test_connection_starts_unknown() {
        let connection = Connection::new().expect("default connection");
        assert_eq!(connection.connectivity(), ConnectivityState::Unknown);
        assert_eq!(connection.active_operations(), 0);
    }

    #[tokio::test]
    async fn test_cancel_all_with_nothing_outstanding() {
        let connection = Connection::new().expect("default connection");
        assert_eq!(connection.cancel_all_operations(), 0);
    }

    #[tokio::test]
    async fn test_empty_url_is_configuration_error() {
        let connection = Connection::new().expect("default connection");
        let result = connection
            .send_request("", Method::Get, None, ResponseType::Data, None)
            .await;

        assert!(matches!(result, Err(ConnectionError::InvalidUrl(_))));
        // Nothing was registered or attempted
        assert_eq!(connection.active_operations(), 0);
    }

    #[tokio::test]
    async fn test_validator_prime_and_read_back() {
        let connection = Connection::new().expect("default connection");
        let validator = Validator {
            etag: Some("\"v1\"".to_string()),
            last_modified: None,
            fetched_at: chrono::Utc::now(),
        };

        connection.prime_validator("https://example.com/f", "/tmp/f", validator.clone());
        let cached = connection
            .cached_validator("https://example.com/f", "/tmp/f")
            .expect("primed");
        assert_eq!(cached.etag, validator.etag);

        assert!(connection
            .cached_validator("https://example.com/f", "/tmp/other")
            .is_none());
    }
}
