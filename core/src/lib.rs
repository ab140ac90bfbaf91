//! Pooled, cancellable API client core.
//!
//! # Overview
//! An `ApiContext` hands out one `ApiClient` per base URL, tracks every
//! in-flight request under a monotonic `RequestId`, and injects named auth
//! settings into outgoing requests. The HTTP exchange itself is delegated to a
//! `Transport`, so the crate owns request assembly and lifecycle but never
//! sockets or TLS.
//!
//! # Design
//! - The pool and tracker live in an explicitly owned context rather than in
//!   globals; cloning the context or any client shares them.
//! - `ApiClient::build_request` is pure: it turns an `ApiRequest` into an
//!   `HttpRequest` and can be tested without a network.
//! - `ApiClient::execute` returns the id at once and reports through a
//!   callback; `ApiClient::send` wraps the same path in a future.
//! - Whoever removes a tracker entry first, completion or cancellation,
//!   decides the request's terminal state. A cancelled request never reports.

pub mod auth;
pub mod client;
pub mod config;
pub mod context;
pub mod encoding;
pub mod error;
pub mod http;
pub mod pool;
pub mod request;
pub mod response;
pub mod tracker;
pub mod transport;

pub use auth::{AuthRegistry, AuthScheme, AuthSetting, Credentials, KeyLocation};
pub use client::{ApiClient, PendingResponse};
pub use config::ClientConfig;
pub use context::{ApiContext, LogFilter};
pub use encoding::{escape, select_header_accept, select_header_content_type, CollectionFormat, QueryValue};
pub use error::{ApiError, RESPONSE_OBJECT_KEY};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use request::{ApiRequest, RequestBody};
pub use response::ResponseBody;
pub use tracker::{RequestId, RequestTracker};
pub use transport::Transport;
#[cfg(feature = "ureq-transport")]
pub use transport::UreqTransport;
