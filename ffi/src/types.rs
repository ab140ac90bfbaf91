//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Requests come in as C strings; structured parameters (query, headers,
//! body) travel as JSON text so the C side needs no container types.
//! Outcomes go out as a heap-allocated `FfiApiResult` the caller frees with
//! `api_free_result`. Conversion code lives here to keep `lib.rs` focused on
//! the `extern "C"` surface.

use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use std::time::Duration;

use api_client_core::{
    ApiClient, ApiContext, ApiError, ApiRequest, CollectionFormat, HttpMethod, QueryValue, RequestBody,
    ResponseBody, UreqTransport,
};
use serde_json::Value;

/// Opaque handle owning the tokio runtime that drives every request.
pub struct FfiContext {
    pub(crate) runtime: tokio::runtime::Runtime,
    pub(crate) inner: ApiContext<UreqTransport>,
}

/// Opaque handle to a pooled client. Two handles for the same base URL refer
/// to the same underlying client.
pub struct FfiClient {
    pub(crate) inner: ApiClient<UreqTransport>,
}

/// Called once when a request finishes. Never called for cancelled requests.
/// The callee owns `result` and must release it with `api_free_result`.
pub type FfiCompletion = extern "C" fn(result: *mut FfiApiResult, user_data: *mut c_void);

/// One request as C strings. Only `method` and `path` are required; every
/// other field may be null.
///
/// - `query_json`: object of string, number or array values; arrays are sent
///   as repeated keys.
/// - `headers_json`: object of string values.
/// - `body_json`: any JSON document, sent as the request body.
/// - `auth_names`: comma-separated auth setting names.
/// - `timeout_ms`: limit for this request only; 0 keeps the context default.
#[repr(C)]
pub struct FfiApiRequest {
    pub method: *const c_char,
    pub path: *const c_char,
    pub query_json: *const c_char,
    pub headers_json: *const c_char,
    pub body_json: *const c_char,
    pub auth_names: *const c_char,
    pub request_content_type: *const c_char,
    pub response_content_type: *const c_char,
    pub timeout_ms: u64,
}

impl FfiApiRequest {
    /// Convert to a core `ApiRequest`. Invalid UTF-8 or JSON is an error.
    ///
    /// # Safety
    /// Every non-null field must point to a valid NUL-terminated string.
    pub(crate) unsafe fn to_core(&self) -> Result<ApiRequest, ApiError> {
        let method: HttpMethod = unsafe { required(self.method, "method")? }.parse()?;
        let path = unsafe { required(self.path, "path")? };
        let mut request = ApiRequest::new(method, path);

        if let Some(raw) = unsafe { optional(self.query_json)? } {
            for (name, value) in parse_object(&raw, "query_json")? {
                request.query_params.push((name, query_value(value)));
            }
        }
        if let Some(raw) = unsafe { optional(self.headers_json)? } {
            for (name, value) in parse_object(&raw, "headers_json")? {
                request.header_params.push((name, scalar_to_string(value)));
            }
        }
        if let Some(raw) = unsafe { optional(self.body_json)? } {
            let value: Value =
                serde_json::from_str(&raw).map_err(|e| ApiError::Serialization(format!("body_json: {e}")))?;
            request.body = Some(RequestBody::Json(value));
        }
        if let Some(raw) = unsafe { optional(self.auth_names)? } {
            request.auth_names = split_list(&raw);
        }
        request.request_content_type = unsafe { optional(self.request_content_type)? };
        request.response_content_type = unsafe { optional(self.response_content_type)? };
        if self.timeout_ms > 0 {
            request.timeout = Some(Duration::from_millis(self.timeout_ms));
        }
        Ok(request)
    }
}

/// Error codes returned in `FfiApiResult`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub enum FfiErrorCode {
    Ok = 0,
    Http = 1,
    Transport = 2,
    Deserialization = 3,
    Serialization = 4,
    InvalidBaseUrl = 5,
    Config = 6,
    Panic = 7,
    NullArg = 8,
    Aborted = 9,
}

/// Outcome of one request.
///
/// On success `error_code` is `Ok` and `body` holds the response body (JSON
/// text for JSON responses, raw text otherwise, null when empty). On an HTTP
/// error `http_status` is set and `body` holds the server's error document.
/// Transport errors carry no body.
#[repr(C)]
pub struct FfiApiResult {
    pub error_code: FfiErrorCode,
    pub error_message: *mut c_char,
    pub http_status: u16,
    pub body: *mut c_char,
}

impl FfiApiResult {
    pub(crate) fn from_outcome(outcome: Result<ResponseBody, ApiError>) -> *mut Self {
        let result = match outcome {
            Ok(body) => FfiApiResult {
                error_code: FfiErrorCode::Ok,
                error_message: std::ptr::null_mut(),
                http_status: 0,
                body: body_to_c(&body),
            },
            Err(err) => FfiApiResult {
                error_code: error_code(&err),
                error_message: to_c_string(err.to_string()),
                http_status: err.status().unwrap_or(0),
                body: err.response_object().map(body_to_c).unwrap_or(std::ptr::null_mut()),
            },
        };
        Box::into_raw(Box::new(result))
    }
}

pub(crate) fn error_code(err: &ApiError) -> FfiErrorCode {
    match err {
        ApiError::Http { .. } => FfiErrorCode::Http,
        ApiError::Transport(_) | ApiError::NoRuntime => FfiErrorCode::Transport,
        ApiError::Deserialization(_) => FfiErrorCode::Deserialization,
        ApiError::Serialization(_) => FfiErrorCode::Serialization,
        ApiError::InvalidBaseUrl { .. } => FfiErrorCode::InvalidBaseUrl,
        ApiError::Config(_) => FfiErrorCode::Config,
        ApiError::Aborted(_) => FfiErrorCode::Aborted,
    }
}

fn body_to_c(body: &ResponseBody) -> *mut c_char {
    match body {
        ResponseBody::Empty => std::ptr::null_mut(),
        ResponseBody::Json(value) => to_c_string(value.to_string()),
        ResponseBody::Text(text) => to_c_string(text.clone()),
    }
}

/// Allocate a C string, dropping interior NULs rather than failing.
pub(crate) fn to_c_string(s: String) -> *mut c_char {
    let s = if s.contains('\0') { s.replace('\0', "") } else { s };
    CString::new(s).unwrap_or_default().into_raw()
}

/// Read a nullable C string.
///
/// # Safety
/// `ptr` must be null or point to a valid NUL-terminated string.
pub(crate) unsafe fn optional(ptr: *const c_char) -> Result<Option<String>, ApiError> {
    if ptr.is_null() {
        return Ok(None);
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map(|s| Some(s.to_string()))
        .map_err(|e| ApiError::Serialization(format!("invalid UTF-8: {e}")))
}

unsafe fn required(ptr: *const c_char, name: &str) -> Result<String, ApiError> {
    unsafe { optional(ptr)? }.ok_or_else(|| ApiError::Serialization(format!("missing {name}")))
}

pub(crate) fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_object(raw: &str, field: &str) -> Result<serde_json::Map<String, Value>, ApiError> {
    match serde_json::from_str(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ApiError::Serialization(format!("{field}: expected a JSON object"))),
        Err(e) => Err(ApiError::Serialization(format!("{field}: {e}"))),
    }
}

fn query_value(value: Value) -> QueryValue {
    match value {
        Value::Array(items) => QueryValue::Collection {
            values: items.into_iter().map(scalar_to_string).collect(),
            format: CollectionFormat::Multi,
        },
        other => QueryValue::Single(scalar_to_string(other)),
    }
}

fn scalar_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(s: &str) -> CString {
        CString::new(s).unwrap()
    }

    fn empty_request() -> FfiApiRequest {
        FfiApiRequest {
            method: std::ptr::null(),
            path: std::ptr::null(),
            query_json: std::ptr::null(),
            headers_json: std::ptr::null(),
            body_json: std::ptr::null(),
            auth_names: std::ptr::null(),
            request_content_type: std::ptr::null(),
            response_content_type: std::ptr::null(),
            timeout_ms: 0,
        }
    }

    #[test]
    fn request_converts_all_fields() {
        let method = c("post");
        let path = c("/pet/{petId}");
        let query = c(r#"{"status":["available","sold"],"limit":10}"#);
        let headers = c(r#"{"X-Trace":"abc"}"#);
        let body = c(r#"{"name":"rex"}"#);
        let auth = c("api_key, petstore_auth");
        let mut raw = empty_request();
        raw.method = method.as_ptr();
        raw.path = path.as_ptr();
        raw.query_json = query.as_ptr();
        raw.headers_json = headers.as_ptr();
        raw.body_json = body.as_ptr();
        raw.auth_names = auth.as_ptr();
        raw.timeout_ms = 1500;

        let request = unsafe { raw.to_core() }.unwrap();
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.path, "/pet/{petId}");
        assert_eq!(request.query_params.len(), 2);
        assert!(request.query_params.contains(&("limit".to_string(), QueryValue::from("10"))));
        assert_eq!(request.header_params, vec![("X-Trace".to_string(), "abc".to_string())]);
        assert_eq!(request.body, Some(RequestBody::Json(serde_json::json!({"name": "rex"}))));
        assert_eq!(request.auth_names, vec!["api_key".to_string(), "petstore_auth".to_string()]);
        assert_eq!(request.timeout, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn missing_method_is_an_error() {
        let path = c("/pet");
        let mut raw = empty_request();
        raw.path = path.as_ptr();
        assert!(matches!(unsafe { raw.to_core() }, Err(ApiError::Serialization(_))));
    }

    #[test]
    fn non_object_query_is_an_error() {
        let method = c("GET");
        let path = c("/pet");
        let query = c("[1,2]");
        let mut raw = empty_request();
        raw.method = method.as_ptr();
        raw.path = path.as_ptr();
        raw.query_json = query.as_ptr();
        assert!(unsafe { raw.to_core() }.is_err());
    }

    #[test]
    fn interior_nul_is_dropped() {
        let ptr = to_c_string("a\0b".to_string());
        let s = unsafe { CString::from_raw(ptr) };
        assert_eq!(s.to_str().unwrap(), "ab");
    }
}
