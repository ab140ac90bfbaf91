//! Pooled API client: request assembly, submission and completion.
//!
//! # Design
//! `ApiClient` is a cheap handle (one `Arc`) bound to a base URL. Executing a
//! request happens in two steps:
//! - `build_request` merges default headers, caller parameters and auth
//!   credentials into a plain `HttpRequest` without touching the network;
//! - `execute` spawns a task that sends it through the context's transport,
//!   registers the task under a fresh `RequestId` and returns that id
//!   immediately.
//!
//! The task removes its tracker entry before reporting the outcome. If the
//! entry is already gone the request was cancelled, and the outcome is
//! dropped without invoking the callback. A drop guard owned by the task
//! removes the entry even if the task panics or never runs.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::oneshot;
use tracing::{debug, info, info_span, warn, Instrument};
use url::Url;

use crate::context::Shared;
use crate::encoding::{build_query_string, substitute_path};
use crate::error::ApiError;
use crate::http::{find_header, HttpRequest, HttpResponse};
use crate::request::ApiRequest;
use crate::response::{decode, ResponseBody};
use crate::tracker::RequestId;
use crate::transport::Transport;

struct ClientInner<T: Transport> {
    base_url: String,
    default_headers: RwLock<Vec<(String, String)>>,
    shared: Arc<Shared<T>>,
}

/// Client bound to one base URL. Obtain it from `ApiContext::client`.
pub struct ApiClient<T: Transport> {
    inner: Arc<ClientInner<T>>,
}

impl<T: Transport> Clone for ApiClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Transport> ApiClient<T> {
    pub(crate) fn new(base_url: Url, shared: Arc<Shared<T>>) -> Self {
        let default_headers = shared
            .config
            .default_headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self {
            inner: Arc::new(ClientInner {
                base_url: base_url.as_str().trim_end_matches('/').to_string(),
                default_headers: RwLock::new(default_headers),
                shared,
            }),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// True if both handles refer to the same pooled client.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn default_headers(&self) -> Vec<(String, String)> {
        self.inner
            .default_headers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Set a header sent with every request of this client, replacing any
    /// default of the same name.
    pub fn set_default_header(&self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let mut headers = self
            .inner
            .default_headers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        headers.push((name, value.into()));
    }

    /// Assemble the HTTP request for `request` without sending it.
    ///
    /// Precedence for headers is caller, then auth, then client defaults;
    /// for query parameters caller, then auth. Nothing already present is
    /// overwritten, so a default `Authorization` never masks an auth setting.
    pub fn build_request(&self, request: &ApiRequest) -> Result<HttpRequest, ApiError> {
        let mut headers = request.header_params.clone();
        let mut query = request.query_params.clone();
        self.inner
            .shared
            .auth
            .apply(&request.auth_names, &mut headers, &mut query);

        for (name, value) in self.default_headers() {
            if find_header(&headers, &name).is_none() {
                headers.push((name, value));
            }
        }

        if let Some(accept) = request.response_content_type.as_deref().filter(|a| !a.is_empty()) {
            if find_header(&headers, "Accept").is_none() {
                headers.push(("Accept".to_string(), accept.to_string()));
            }
        }

        let body = match &request.body {
            Some(body) => {
                let content_type = request
                    .request_content_type
                    .clone()
                    .unwrap_or_else(|| body.default_content_type().to_string());
                if find_header(&headers, "Content-Type").is_none() {
                    headers.push(("Content-Type".to_string(), content_type));
                }
                Some(body.encode()?)
            }
            None => None,
        };

        let path = substitute_path(&request.path, &request.path_params);
        let mut url = self.inner.base_url.clone();
        if !path.is_empty() && !path.starts_with('/') {
            url.push('/');
        }
        url.push_str(&path);
        let query_string = build_query_string(&query);
        if !query_string.is_empty() {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&query_string);
        }

        Ok(HttpRequest {
            method: request.method,
            url,
            headers,
            body,
            timeout: request.timeout,
        })
    }

    /// Submit `request` and return its id without waiting for the network.
    ///
    /// `on_complete` runs exactly once with the decoded body or the error,
    /// unless the request is cancelled first, in which case it never runs.
    /// Errors returned here mean nothing was submitted; a runtime that has
    /// shut down is reported as `ApiError::NoRuntime`.
    pub fn execute<F>(&self, request: ApiRequest, on_complete: F) -> Result<RequestId, ApiError>
    where
        F: FnOnce(Result<ResponseBody, ApiError>) + Send + 'static,
    {
        let http_request = self.build_request(&request)?;
        let expected = request.response_content_type;
        self.log_exchange(&http_request, None, None);

        let shared = &self.inner.shared;
        let submission = Arc::new(Submission::default());
        let id = shared.tracker.register(|id| {
            let span = info_span!("api_request", request_id = %id, method = %http_request.method);
            let settle = Settle {
                shared: shared.clone(),
                id,
                on_complete: Some(on_complete),
                started: false,
                submission: submission.clone(),
            };
            let client = self.clone();
            let task = async move {
                let mut settle = settle;
                settle.started = true;
                let result = client.inner.shared.transport.send(http_request.clone()).await;
                let Some(on_complete) = settle.claim() else {
                    debug!("request finished after cancellation, dropping outcome");
                    return;
                };
                let outcome = match result {
                    Ok(response) => {
                        let decoded = decode(&response, expected.as_deref());
                        client.log_exchange(&http_request, Some(&response), decoded.as_ref().err());
                        decoded
                    }
                    Err(err) => {
                        client.log_exchange(&http_request, None, Some(&err));
                        Err(err)
                    }
                };
                debug!(ok = outcome.is_ok(), "request completed");
                on_complete(outcome);
            };
            shared.runtime.spawn(task.instrument(span)).abort_handle()
        });
        submission.submitted.store(true, Ordering::Release);

        if submission.rejected.load(Ordering::Acquire) {
            warn!(request_id = %id, "runtime refused the request task");
            return Err(ApiError::NoRuntime);
        }
        debug!(request_id = %id, base_url = %self.inner.base_url, "request submitted");
        Ok(id)
    }

    /// Future-based variant of `execute`.
    pub fn send(&self, request: ApiRequest) -> Result<PendingResponse, ApiError> {
        let (tx, rx) = oneshot::channel();
        let id = self.execute(request, move |outcome| {
            let _ = tx.send(outcome);
        })?;
        Ok(PendingResponse { id, rx })
    }

    /// Cancel a request submitted through any client of the same context.
    pub fn cancel(&self, id: RequestId) -> bool {
        self.inner.shared.tracker.cancel(id)
    }

    pub fn request_queue_size(&self) -> usize {
        self.inner.shared.tracker.size()
    }

    fn log_exchange(&self, request: &HttpRequest, response: Option<&HttpResponse>, error: Option<&ApiError>) {
        let shared = &self.inner.shared;
        if !shared.log_requests() {
            return;
        }
        if let Some(filter) = shared.log_filter() {
            if !filter(self, request, response, error) {
                return;
            }
        }
        match (response, error) {
            (None, None) => info!(
                method = %request.method,
                url = %request.url,
                headers = ?request.headers.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>(),
                body = request.body.as_deref().unwrap_or(""),
                "sending request"
            ),
            (Some(response), _) => info!(
                method = %request.method,
                url = %request.url,
                status = response.status,
                body = %response.body,
                "received response"
            ),
            (None, Some(error)) => info!(
                method = %request.method,
                url = %request.url,
                %error,
                "request failed"
            ),
        }
    }
}

impl<T: Transport> fmt::Debug for ApiClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.base_url)
            .finish()
    }
}

/// Flags shared between `execute` and the task it spawns.
#[derive(Default)]
struct Submission {
    /// Set once `spawn` has returned.
    submitted: AtomicBool,
    /// Set when the task was dropped inside `spawn` without running.
    rejected: AtomicBool,
}

/// Settles one request's tracker entry however its task ends.
///
/// The normal path calls `claim`. Dropping the guard unclaimed means the
/// task panicked or was torn down: the entry is removed and, unless the
/// request was cancelled, the callback gets `ApiError::Aborted`. A task
/// dropped inside `spawn` instead flags the submission as rejected.
struct Settle<T: Transport, F: FnOnce(Result<ResponseBody, ApiError>)> {
    shared: Arc<Shared<T>>,
    id: RequestId,
    on_complete: Option<F>,
    started: bool,
    submission: Arc<Submission>,
}

impl<T: Transport, F: FnOnce(Result<ResponseBody, ApiError>)> Settle<T, F> {
    /// Take the callback if this task, not a cancellation, ended the request.
    fn claim(&mut self) -> Option<F> {
        let on_complete = self.on_complete.take()?;
        self.shared.tracker.complete(self.id).then_some(on_complete)
    }
}

impl<T: Transport, F: FnOnce(Result<ResponseBody, ApiError>)> Drop for Settle<T, F> {
    fn drop(&mut self) {
        let Some(on_complete) = self.claim() else {
            return;
        };
        if !self.started && !self.submission.submitted.load(Ordering::Acquire) {
            self.submission.rejected.store(true, Ordering::Release);
            return;
        }
        let reason = if std::thread::panicking() {
            "request task panicked"
        } else if self.started {
            "request task dropped before completing"
        } else {
            "runtime shut down before the request ran"
        };
        warn!(request_id = %self.id, reason, "request aborted");
        let outcome = Err(ApiError::Aborted(reason.to_string()));
        if panic::catch_unwind(AssertUnwindSafe(|| on_complete(outcome))).is_err() {
            warn!(request_id = %self.id, "completion callback panicked");
        }
    }
}

/// Handle to a submitted request.
#[derive(Debug)]
pub struct PendingResponse {
    id: RequestId,
    rx: oneshot::Receiver<Result<ResponseBody, ApiError>>,
}

impl PendingResponse {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Wait for the outcome. `None` means the request was cancelled.
    pub async fn outcome(self) -> Option<Result<ResponseBody, ApiError>> {
        self.rx.await.ok()
    }
}
