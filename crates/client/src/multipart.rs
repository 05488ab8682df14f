// crates/client/src/multipart.rs
//! Multipart upload: normalization of the convenience variants into one
//! upload primitive with streamed progress

use crate::connection::ConnectionInner;
use crate::error::{ConnectionError, ConnectionResult};
use crate::operation::{drive, RetryContext};
use crate::progress::{ProgressHandler, ProgressTracker};
use crate::registry::OperationKind;
use crate::request::{decode, parse_url, ResponseBody, ResponseType};
use bytes::Bytes;
use futures::StreamExt;
use std::path::PathBuf;

const CHUNK_SIZE: usize = 64 * 1024;

/// Payload of one part of a multipart body
pub(crate) enum PartPayload {
    Bytes(Bytes),
    File(PathBuf),
    Text(String),
}

/// One normalized part of a multipart body
///
/// Every public upload variant reduces its input to a list of these, so
/// retry and cancellation behave identically no matter which variant was
/// called. The list is kept for the whole operation: the multipart form is
/// rebuilt from it on every retry attempt.
pub(crate) struct UploadPart {
    pub(crate) name: String,
    pub(crate) payload: PartPayload,
    pub(crate) file_name: Option<String>,
}

/// Collects parts for a caller-driven multipart body
pub struct PartsBuilder {
    parts: Vec<UploadPart>,
}

impl PartsBuilder {
    pub(crate) fn new() -> Self {
        Self { parts: Vec::new() }
    }

    /// Adds an in-memory blob part
    pub fn add_bytes(
        &mut self,
        name: impl Into<String>,
        data: impl Into<Bytes>,
        file_name: Option<String>,
    ) -> &mut Self {
        self.parts.push(UploadPart {
            name: name.into(),
            payload: PartPayload::Bytes(data.into()),
            file_name,
        });
        self
    }

    /// Adds a part streamed from a file on disk
    ///
    /// The part's filename defaults to the file's name.
    pub fn add_file(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> &mut Self {
        self.parts.push(file_part(&name.into(), path.into()));
        self
    }

    /// Adds a plain text field
    pub fn add_text(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.parts.push(UploadPart {
            name: name.into(),
            payload: PartPayload::Text(value.into()),
            file_name: None,
        });
        self
    }

    /// Number of parts collected so far
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Returns true if no parts were added
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub(crate) fn into_parts(self) -> Vec<UploadPart> {
        self.parts
    }
}

/// Builds a blob part named after the field, with an optional extension
/// and array index
pub(crate) fn data_part(
    name: &str,
    data: Bytes,
    file_extension: Option<&str>,
    index: Option<usize>,
) -> UploadPart {
    let file_name = match (file_extension, index) {
        (Some(ext), Some(i)) => format!("{}-{}.{}", name, i, ext),
        (Some(ext), None) => format!("{}.{}", name, ext),
        (None, Some(i)) => format!("{}-{}", name, i),
        (None, None) => name.to_string(),
    };

    UploadPart {
        name: name.to_string(),
        payload: PartPayload::Bytes(data),
        file_name: Some(file_name),
    }
}

/// Builds a part streamed from a file, filename inferred from the path
pub(crate) fn file_part(name: &str, path: PathBuf) -> UploadPart {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string());

    UploadPart {
        name: name.to_string(),
        payload: PartPayload::File(path),
        file_name,
    }
}

pub(crate) struct MultipartOptions {
    pub url: String,
    pub parameters: Option<serde_json::Value>,
    pub parts: Vec<UploadPart>,
    pub response_type: ResponseType,
    pub progress: Option<ProgressHandler>,
}

/// Issues a multipart upload, retrying across connectivity interruptions
pub(crate) async fn send(
    inner: &ConnectionInner,
    opts: MultipartOptions,
) -> ConnectionResult<ResponseBody> {
    let url = parse_url(&opts.url)?;
    let expected = expected_bytes(&opts.parts).await?;
    let tracker = ProgressTracker::new(Some(expected));

    let mut ctx = RetryContext::begin(inner, OperationKind::Multipart);
    let result = drive(&mut ctx, || {
        attempt_once(inner, &opts, &url, &tracker, expected)
    })
    .await;
    ctx.conclude(&result);
    result
}

/// Total payload bytes across all blob and file parts
///
/// Text fields are excluded: they are not streamed through the progress
/// counter, so counting them would leave the transfer stuck short of 100%.
async fn expected_bytes(parts: &[UploadPart]) -> ConnectionResult<u64> {
    let mut total = 0u64;
    for part in parts {
        total += match &part.payload {
            PartPayload::Bytes(data) => data.len() as u64,
            PartPayload::File(path) => tokio::fs::metadata(path).await?.len(),
            PartPayload::Text(_) => 0,
        };
    }
    Ok(total)
}

async fn attempt_once(
    inner: &ConnectionInner,
    opts: &MultipartOptions,
    url: &reqwest::Url,
    tracker: &ProgressTracker,
    expected: u64,
) -> ConnectionResult<ResponseBody> {
    // A retried attempt re-sends the body from the beginning
    tracker.restart(Some(expected));

    let mut form = reqwest::multipart::Form::new();

    if let Some(serde_json::Value::Object(map)) = &opts.parameters {
        for (key, value) in map {
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            form = form.text(key.clone(), text);
        }
    }

    for part in &opts.parts {
        let built = build_part(part, tracker, opts.progress.as_ref()).await?;
        form = form.part(part.name.clone(), built);
    }

    let response = inner
        .http
        .post(url.clone())
        .multipart(form)
        .send()
        .await
        .map_err(ConnectionError::Http)?;

    let status = response.status();
    if !status.is_success() {
        return Err(ConnectionError::HttpStatus(status.as_u16()));
    }

    let bytes = response.bytes().await.map_err(ConnectionError::Http)?;
    decode(bytes, opts.response_type)
}

async fn build_part(
    part: &UploadPart,
    tracker: &ProgressTracker,
    handler: Option<&ProgressHandler>,
) -> ConnectionResult<reqwest::multipart::Part> {
    let mut built = match &part.payload {
        PartPayload::Text(value) => reqwest::multipart::Part::text(value.clone()),
        PartPayload::Bytes(data) => {
            let length = data.len() as u64;
            let chunks = futures::stream::iter(
                chunk_bytes(data.clone()).into_iter().map(Ok::<_, std::io::Error>),
            );
            let stream = observed(chunks, tracker.clone(), handler.cloned());
            reqwest::multipart::Part::stream_with_length(
                reqwest::Body::wrap_stream(stream),
                length,
            )
        }
        PartPayload::File(path) => {
            let length = tokio::fs::metadata(path).await?.len();
            let file = tokio::fs::File::open(path).await?;
            let stream = observed(
                tokio_util::io::ReaderStream::new(file),
                tracker.clone(),
                handler.cloned(),
            );
            reqwest::multipart::Part::stream_with_length(
                reqwest::Body::wrap_stream(stream),
                length,
            )
        }
    };

    if let Some(file_name) = &part.file_name {
        built = built.file_name(file_name.clone());
    }

    Ok(built)
}

/// Wraps a byte stream so every chunk ticks the shared tracker and the
/// caller's progress handler
fn observed<S>(
    stream: S,
    tracker: ProgressTracker,
    handler: Option<ProgressHandler>,
) -> impl futures::Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static
where
    S: futures::Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static,
{
    stream.map(move |item| {
        if let Ok(chunk) = &item {
            let snapshot = tracker.advance(chunk.len() as u64);
            if let Some(handler) = &handler {
                handler(snapshot);
            }
        }
        item
    })
}

fn chunk_bytes(data: Bytes) -> Vec<Bytes> {
    let mut chunks = Vec::with_capacity(data.len() / CHUNK_SIZE + 1);
    let mut offset = 0;
    while offset < data.len() {
        let end = (offset + CHUNK_SIZE).min(data.len());
        chunks.push(data.slice(offset..end));
        offset = end;
    }
    chunks
}
