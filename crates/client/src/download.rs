// crates/client/src/download.rs
//! Plain and conditional file downloads
//!
//! Both flavors stream the response body straight to the destination,
//! racing every chunk against cancellation and connectivity loss. A
//! download interrupted by a loss keeps its byte count and, when the
//! server supports ranges, resumes from that offset after restore instead
//! of starting over.

use crate::connection::ConnectionInner;
use crate::error::{ConnectionError, ConnectionResult};
use crate::operation::{cancelled, until_unreachable, RetryContext};
use crate::progress::{ProgressHandler, ProgressTracker};
use crate::registry::OperationKind;
use crate::request::parse_url;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::header::{
    ACCEPT_RANGES, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, IF_RANGE, LAST_MODIFIED, RANGE,
};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tether_reachability::ReachabilitySubscription;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;

/// Cached freshness information for one downloaded resource
///
/// Kept in memory per `(url, destination)` pair for the life of the
/// connection. Callers wanting resumability across process restarts
/// persist this themselves and prime the connection with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validator {
    /// Entity tag reported by the server
    pub etag: Option<String>,
    /// Last-Modified value reported by the server
    pub last_modified: Option<String>,
    /// When this validator was recorded
    pub fetched_at: DateTime<Utc>,
}

impl Validator {
    fn from_headers(headers: &reqwest::header::HeaderMap) -> Option<Self> {
        let etag = headers
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let last_modified = headers
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if etag.is_none() && last_modified.is_none() {
            return None;
        }

        Some(Self {
            etag,
            last_modified,
            fetched_at: Utc::now(),
        })
    }
}

/// In-memory validator store, keyed per `(url, destination)` pair
///
/// Keying by destination keeps concurrent downloads of one URL to
/// different files from corrupting each other's cached validator.
pub(crate) struct ValidatorCache {
    entries: Mutex<HashMap<(String, PathBuf), Validator>>,
}

impl ValidatorCache {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn get(&self, url: &str, destination: &Path) -> Option<Validator> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(url.to_string(), destination.to_path_buf()))
            .cloned()
    }

    pub(crate) fn put(&self, url: String, destination: PathBuf, validator: Validator) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((url, destination), validator);
    }
}

pub(crate) struct DownloadOptions {
    pub url: String,
    pub destination: PathBuf,
    pub conditional: bool,
    pub progress: Option<ProgressHandler>,
}

pub(crate) struct DownloadOutcome {
    pub bytes_written: u64,
    pub modified: bool,
}

/// Per-download resume state carried across attempts
struct DownloadTicket {
    bytes_written: u64,
    supports_range: bool,
    validator: Option<Validator>,
}

enum AttemptEnd {
    Completed(DownloadOutcome),
    Interrupted,
}

/// Runs a download to completion, pausing and resuming across
/// connectivity interruptions
pub(crate) async fn download(
    inner: &ConnectionInner,
    opts: DownloadOptions,
) -> ConnectionResult<DownloadOutcome> {
    let url = parse_url(&opts.url)?;
    let kind = if opts.conditional {
        OperationKind::ConditionalDownload
    } else {
        OperationKind::Download
    };

    let mut ctx = RetryContext::begin(inner, kind);
    let mut ticket = DownloadTicket {
        bytes_written: 0,
        supports_range: false,
        validator: if opts.conditional {
            inner.validators.get(&opts.url, &opts.destination)
        } else {
            None
        },
    };
    let tracker = ProgressTracker::new(None);

    let result = run(&mut ctx, inner, &opts, &url, &mut ticket, &tracker).await;
    ctx.conclude(&result);
    result
}

async fn run(
    ctx: &mut RetryContext<'_>,
    inner: &ConnectionInner,
    opts: &DownloadOptions,
    url: &reqwest::Url,
    ticket: &mut DownloadTicket,
    tracker: &ProgressTracker,
) -> ConnectionResult<DownloadOutcome> {
    loop {
        ctx.set_running();
        let end = attempt(inner, opts, url, ticket, tracker, &mut ctx.cancel, &ctx.sub).await;

        match end {
            Ok(AttemptEnd::Completed(outcome)) => return Ok(outcome),
            Ok(AttemptEnd::Interrupted) => {}
            Err(err) if err.is_connectivity_candidate() && ctx.sub.current().is_unreachable() => {}
            Err(err) => return Err(err),
        }

        if !inner.config.repeat_after_loss {
            return Err(ConnectionError::ConnectionLost);
        }
        ctx.pause().await?;
    }
}

async fn attempt(
    inner: &ConnectionInner,
    opts: &DownloadOptions,
    url: &reqwest::Url,
    ticket: &mut DownloadTicket,
    tracker: &ProgressTracker,
    cancel: &mut watch::Receiver<bool>,
    sub: &ReachabilitySubscription,
) -> ConnectionResult<AttemptEnd> {
    let resuming = ticket.bytes_written > 0 && ticket.supports_range;

    let mut builder = inner.http.get(url.clone());
    if resuming {
        builder = builder.header(RANGE, format!("bytes={}-", ticket.bytes_written));
        if let Some(etag) = ticket.validator.as_ref().and_then(|v| v.etag.clone()) {
            builder = builder.header(IF_RANGE, etag);
        }
    } else if opts.conditional {
        if let Some(validator) = &ticket.validator {
            if let Some(etag) = &validator.etag {
                builder = builder.header(IF_NONE_MATCH, etag.clone());
            } else if let Some(last_modified) = &validator.last_modified {
                builder = builder.header(IF_MODIFIED_SINCE, last_modified.clone());
            }
        }
    }

    let send = builder.send();
    let response = tokio::select! {
        biased;
        _ = cancelled(cancel) => return Err(ConnectionError::Cancelled),
        _ = until_unreachable(sub.clone()) => return Ok(AttemptEnd::Interrupted),
        res = send => res.map_err(ConnectionError::Http)?,
    };

    let status = response.status();
    if opts.conditional && status == StatusCode::NOT_MODIFIED {
        log::debug!("{} not modified, destination left untouched", opts.url);
        return Ok(AttemptEnd::Completed(DownloadOutcome {
            bytes_written: 0,
            modified: false,
        }));
    }
    if !status.is_success() {
        return Err(ConnectionError::HttpStatus(status.as_u16()));
    }

    let append = resuming && status == StatusCode::PARTIAL_CONTENT;
    if resuming && !append {
        log::debug!("server ignored range request for {}, restarting from zero", opts.url);
    }

    ticket.supports_range = status == StatusCode::PARTIAL_CONTENT
        || response
            .headers()
            .get(ACCEPT_RANGES)
            .is_some_and(|v| v.as_bytes() == b"bytes");

    // Fresh validator: used for If-Range on a later resume, and cached on
    // completion for conditional downloads
    if let Some(validator) = Validator::from_headers(response.headers()) {
        ticket.validator = Some(validator);
    }

    let content_length = response.content_length();
    let mut file = if append {
        tracker.resume_at(
            ticket.bytes_written,
            content_length.map(|remaining| remaining + ticket.bytes_written),
        );
        tokio::fs::OpenOptions::new()
            .append(true)
            .open(&opts.destination)
            .await?
    } else {
        ticket.bytes_written = 0;
        tracker.restart(content_length);
        tokio::fs::File::create(&opts.destination).await?
    };

    let mut stream = response.bytes_stream();
    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancelled(cancel) => {
                let _ = file.flush().await;
                return Err(ConnectionError::Cancelled);
            }
            _ = until_unreachable(sub.clone()) => {
                file.flush().await?;
                return Ok(AttemptEnd::Interrupted);
            }
            chunk = stream.next() => chunk,
        };

        match chunk {
            Some(Ok(chunk)) => {
                file.write_all(&chunk).await?;
                ticket.bytes_written += chunk.len() as u64;
                let snapshot = tracker.advance(chunk.len() as u64);
                if let Some(handler) = &opts.progress {
                    handler(snapshot);
                }
            }
            Some(Err(e)) => {
                file.flush().await?;
                return Err(ConnectionError::Http(e));
            }
            None => {
                file.flush().await?;
                if opts.conditional {
                    if let Some(validator) = &ticket.validator {
                        inner.validators.put(
                            opts.url.clone(),
                            opts.destination.clone(),
                            validator.clone(),
                        );
                    }
                }
                return Ok(AttemptEnd::Completed(DownloadOutcome {
                    bytes_written: ticket.bytes_written,
                    modified: true,
                }));
            }
        }
    }
}
