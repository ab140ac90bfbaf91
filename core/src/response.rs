//! Decoded response bodies.

use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::encoding::is_json_mime;
use crate::error::ApiError;
use crate::http::HttpResponse;

/// A response body after content-type driven decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Empty,
    Json(Value),
    Text(String),
}

impl ResponseBody {
    /// Deserialize a JSON body into `T`. An empty body decodes as JSON `null`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        let value = match self {
            ResponseBody::Json(v) => v.clone(),
            ResponseBody::Empty => Value::Null,
            ResponseBody::Text(_) => {
                return Err(ApiError::Deserialization("response body is not JSON".to_string()))
            }
        };
        serde_json::from_value(value).map_err(|e| ApiError::Deserialization(e.to_string()))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            ResponseBody::Empty => Value::Null,
            ResponseBody::Json(v) => v.clone(),
            ResponseBody::Text(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Empty => Ok(()),
            ResponseBody::Json(v) => write!(f, "{v}"),
            ResponseBody::Text(s) => f.write_str(s),
        }
    }
}

/// Turn a raw response into the caller-facing result.
///
/// `expected` is the response content type the caller asked for; the
/// response's own `Content-Type` takes precedence when present.
pub(crate) fn decode(response: &HttpResponse, expected: Option<&str>) -> Result<ResponseBody, ApiError> {
    let json = response
        .content_type()
        .or(expected)
        .is_some_and(is_json_mime);

    if !response.is_success() {
        let body = decode_lenient(&response.body, json);
        return Err(ApiError::Http {
            status: response.status,
            body,
        });
    }

    if response.body.trim().is_empty() {
        return Ok(ResponseBody::Empty);
    }
    if json {
        return serde_json::from_str(&response.body)
            .map(ResponseBody::Json)
            .map_err(|e| ApiError::Deserialization(e.to_string()));
    }
    Ok(ResponseBody::Text(response.body.clone()))
}

/// Error bodies are best-effort: keep the raw text when it is not valid JSON.
fn decode_lenient(body: &str, json: bool) -> ResponseBody {
    if body.trim().is_empty() {
        return ResponseBody::Empty;
    }
    if json {
        if let Ok(value) = serde_json::from_str(body) {
            return ResponseBody::Json(value);
        }
    }
    ResponseBody::Text(body.to_string())
}
