//! Error types for the API client.
//!
//! # Design
//! Callers mostly need to tell two failures apart: the transport never got a
//! response (`Transport`), or the server answered with an error status
//! (`Http`). The latter keeps the decoded response body so the caller can
//! inspect whatever error document the API returned. It is also reachable
//! through `context()` under `RESPONSE_OBJECT_KEY`, which is the shape the C
//! surface hands out.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::response::ResponseBody;

/// Key under which `ApiError::context` exposes the response body of an HTTP
/// error.
pub const RESPONSE_OBJECT_KEY: &str = "response_object";

/// Errors produced while building, sending or decoding a request.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The base URL handed to the client pool could not be parsed.
    #[error("invalid base url {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// No response was received (connection, DNS, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The server returned a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: ResponseBody },

    /// The request could not be assembled or serialized.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A success response could not be decoded.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// Configuration could not be loaded or was invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A context was created outside of a tokio runtime, or its runtime
    /// has shut down.
    #[error("no tokio runtime available to drive requests")]
    NoRuntime,

    /// The task driving a submitted request ended without an outcome.
    #[error("request aborted: {0}")]
    Aborted(String),
}

impl ApiError {
    /// Status code of an HTTP error, `None` for every other kind.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The decoded body of an HTTP error response.
    pub fn response_object(&self) -> Option<&ResponseBody> {
        match self {
            ApiError::Http { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Key/value view of the error. HTTP errors carry the response body under
    /// `RESPONSE_OBJECT_KEY`; transport errors carry no body.
    pub fn context(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("message".to_string(), Value::String(self.to_string()));
        if let ApiError::Http { status, body } = self {
            map.insert("status".to_string(), Value::from(*status));
            map.insert(RESPONSE_OBJECT_KEY.to_string(), body.to_value());
        }
        map
    }
}
