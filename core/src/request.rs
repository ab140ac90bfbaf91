//! Caller-facing description of one API operation call.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::encoding::{encode_form, select_header_accept, select_header_content_type, CollectionFormat, QueryValue};
use crate::error::ApiError;
use crate::http::HttpMethod;

/// Request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    /// `application/x-www-form-urlencoded` fields.
    Form(Vec<(String, String)>),
    Text(String),
}

impl RequestBody {
    pub fn default_content_type(&self) -> &'static str {
        match self {
            RequestBody::Json(_) => "application/json",
            RequestBody::Form(_) => "application/x-www-form-urlencoded",
            RequestBody::Text(_) => "text/plain",
        }
    }

    pub(crate) fn encode(&self) -> Result<String, ApiError> {
        match self {
            RequestBody::Json(value) => {
                serde_json::to_string(value).map_err(|e| ApiError::Serialization(e.to_string()))
            }
            RequestBody::Form(fields) => Ok(encode_form(fields)),
            RequestBody::Text(text) => Ok(text.clone()),
        }
    }
}

/// Everything needed to execute one operation against a client's base URL.
///
/// `path` may contain `{name}` placeholders filled from `path_params`.
/// Header and query parameters set here always take precedence over default
/// headers and auth-derived values.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    pub path_params: Vec<(String, String)>,
    pub query_params: Vec<(String, QueryValue)>,
    pub header_params: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    pub auth_names: Vec<String>,
    pub request_content_type: Option<String>,
    pub response_content_type: Option<String>,
    pub timeout: Option<Duration>,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            path_params: Vec::new(),
            query_params: Vec::new(),
            header_params: Vec::new(),
            body: None,
            auth_names: Vec::new(),
            request_content_type: None,
            response_content_type: None,
            timeout: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn path_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.path_params.push((name.into(), value.to_string()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.query_params.push((name.into(), value.into()));
        self
    }

    pub fn query_collection<I, V>(mut self, name: impl Into<String>, values: I, format: CollectionFormat) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.query_params.push((
            name.into(),
            QueryValue::Collection {
                values: values.into_iter().map(Into::into).collect(),
                format,
            },
        ));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.header_params.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn json_body<B: Serialize>(self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body).map_err(|e| ApiError::Serialization(e.to_string()))?;
        Ok(self.body(RequestBody::Json(value)))
    }

    /// Append a form field, turning the body into a form if it is not one.
    pub fn form_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let field = (name.into(), value.into());
        match &mut self.body {
            Some(RequestBody::Form(fields)) => fields.push(field),
            _ => self.body = Some(RequestBody::Form(vec![field])),
        }
        self
    }

    pub fn auth(mut self, name: impl Into<String>) -> Self {
        self.auth_names.push(name.into());
        self
    }

    /// Negotiate the `Accept` header from the types the operation produces.
    pub fn accepts<S: AsRef<str>>(mut self, accepts: &[S]) -> Self {
        self.response_content_type = select_header_accept(accepts);
        self
    }

    /// Negotiate the request `Content-Type` from the types the operation consumes.
    pub fn content_types<S: AsRef<str>>(mut self, content_types: &[S]) -> Self {
        self.request_content_type = Some(select_header_content_type(content_types));
        self
    }

    pub fn request_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.request_content_type = Some(content_type.into());
        self
    }

    pub fn response_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.response_content_type = Some(content_type.into());
        self
    }

    /// Time limit for this request alone, replacing the context-wide
    /// `timeout_ms`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
