// crates/client/src/request.rs
//! Simple request dispatch and response decoding

use crate::connection::ConnectionInner;
use crate::error::{ConnectionError, ConnectionResult};
use crate::operation::{drive, RetryContext};
use crate::registry::OperationKind;
use bytes::Bytes;
use std::io::Cursor;
use std::sync::Arc;

/// How a request body and verb are formed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// POST with form-encoded parameters
    Post,
    /// GET with parameters in the query string
    Get,
    /// POST with parameters serialized as a JSON document
    Json,
}

/// How the response body is decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    /// Raw bytes, untouched
    Data,
    /// JSON document
    Json,
    /// XML document (validated for well-formedness)
    Xml,
    /// Property list, XML or binary
    PropertyList,
}

/// A decoded response body
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Data(Bytes),
    Json(serde_json::Value),
    Xml(String),
    PropertyList(plist::Value),
}

impl ResponseBody {
    /// Returns the JSON value, if this body was decoded as JSON
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the raw bytes, if this body was requested as data
    pub fn as_data(&self) -> Option<&Bytes> {
        match self {
            ResponseBody::Data(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// Low-level hook applied to the request builder before dispatch
pub type SetupHook =
    Arc<dyn Fn(reqwest::RequestBuilder) -> reqwest::RequestBuilder + Send + Sync>;

pub(crate) struct RequestOptions {
    pub url: String,
    pub method: Method,
    pub parameters: Option<serde_json::Value>,
    pub response_type: ResponseType,
    pub setup: Option<SetupHook>,
}

/// Validates and parses a caller-supplied URL
pub(crate) fn parse_url(url: &str) -> ConnectionResult<reqwest::Url> {
    if url.trim().is_empty() {
        return Err(ConnectionError::InvalidUrl("empty URL".to_string()));
    }
    reqwest::Url::parse(url).map_err(|e| ConnectionError::InvalidUrl(format!("{}: {}", url, e)))
}

/// Issues a simple request, retrying across connectivity interruptions
pub(crate) async fn send(
    inner: &ConnectionInner,
    opts: RequestOptions,
) -> ConnectionResult<ResponseBody> {
    let url = parse_url(&opts.url)?;

    let mut ctx = RetryContext::begin(inner, OperationKind::Simple);
    let result = drive(&mut ctx, || attempt_once(inner, &opts, &url)).await;
    ctx.conclude(&result);
    result
}

async fn attempt_once(
    inner: &ConnectionInner,
    opts: &RequestOptions,
    url: &reqwest::Url,
) -> ConnectionResult<ResponseBody> {
    let mut builder = match opts.method {
        Method::Get => {
            let mut b = inner.http.get(url.clone());
            if let Some(params) = &opts.parameters {
                b = b.query(params);
            }
            b
        }
        Method::Post => {
            let mut b = inner.http.post(url.clone());
            if let Some(params) = &opts.parameters {
                b = b.form(params);
            }
            b
        }
        Method::Json => {
            let mut b = inner.http.post(url.clone());
            if let Some(params) = &opts.parameters {
                b = b.json(params);
            }
            b
        }
    };

    if let Some(setup) = &opts.setup {
        builder = setup(builder);
    }

    let response = builder.send().await.map_err(ConnectionError::Http)?;
    let status = response.status();
    if !status.is_success() {
        return Err(ConnectionError::HttpStatus(status.as_u16()));
    }

    let bytes = response.bytes().await.map_err(ConnectionError::Http)?;
    decode(bytes, opts.response_type)
}

/// Decodes a raw body according to the requested response type
pub(crate) fn decode(bytes: Bytes, response_type: ResponseType) -> ConnectionResult<ResponseBody> {
    match response_type {
        ResponseType::Data => Ok(ResponseBody::Data(bytes)),
        ResponseType::Json => serde_json::from_slice(&bytes)
            .map(ResponseBody::Json)
            .map_err(|e| ConnectionError::Decode(format!("invalid JSON: {}", e))),
        ResponseType::Xml => {
            let text = std::str::from_utf8(&bytes)
                .map_err(|e| ConnectionError::Decode(format!("invalid UTF-8: {}", e)))?;
            validate_xml(text)?;
            Ok(ResponseBody::Xml(text.to_string()))
        }
        ResponseType::PropertyList => plist::Value::from_reader(Cursor::new(bytes.as_ref()))
            .map(ResponseBody::PropertyList)
            .map_err(|e| ConnectionError::Decode(format!("invalid property list: {}", e))),
    }
}

/// Checks a document for XML well-formedness
fn validate_xml(text: &str) -> ConnectionResult<()> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut saw_element = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Ok(Event::Start(_)) | Ok(Event::Empty(_)) => saw_element = true,
            Ok(_) => {}
            Err(e) => {
                return Err(ConnectionError::Decode(format!("invalid XML: {}", e)));
            }
        }
        buf.clear();
    }

    if saw_element {
        Ok(())
    } else {
        Err(ConnectionError::Decode("invalid XML: no root element".to_string()))
    }
}
