//! The HTTP transport seam.
//!
//! # Design
//! The client never opens sockets itself. It assembles an `HttpRequest` and
//! hands it to a `Transport`, which owns connections, TLS and timeouts. The
//! returned future is driven inside a task the client spawns, so aborting
//! that task is how a request gets cancelled.

use std::future::Future;

use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};

/// Sends one request and yields its response.
///
/// Error statuses are responses, not errors: only failures that produced no
/// response at all (connection refused, DNS, timeout) map to
/// `ApiError::Transport`.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, request: HttpRequest) -> impl Future<Output = Result<HttpResponse, ApiError>> + Send;
}

#[cfg(feature = "ureq-transport")]
pub use self::blocking::UreqTransport;

#[cfg(feature = "ureq-transport")]
mod blocking {
    use std::time::Duration;

    use ureq::http;

    use super::Transport;
    use crate::error::ApiError;
    use crate::http::{HttpRequest, HttpResponse};

    /// Blocking ureq agent run on tokio's blocking pool.
    ///
    /// Cancelling a request drops the waiting task; the blocking call itself
    /// runs to completion (or timeout) and its result is discarded.
    #[derive(Debug, Clone)]
    pub struct UreqTransport {
        agent: ureq::Agent,
    }

    impl UreqTransport {
        pub fn new(timeout: Option<Duration>) -> Self {
            let agent = ureq::Agent::config_builder()
                .http_status_as_error(false)
                .timeout_global(timeout)
                .build()
                .new_agent();
            Self { agent }
        }
    }

    impl Default for UreqTransport {
        fn default() -> Self {
            Self::new(None)
        }
    }

    impl Transport for UreqTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
            let agent = self.agent.clone();
            tokio::task::spawn_blocking(move || execute(&agent, request))
                .await
                .map_err(|e| ApiError::Transport(format!("transport task failed: {e}")))?
        }
    }

    fn execute(agent: &ureq::Agent, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let mut builder = http::Request::builder()
            .method(request.method.as_str())
            .uri(request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let timeout = request.timeout;
        let result = match request.body {
            Some(body) => {
                let req = builder.body(body).map_err(|e| ApiError::Serialization(e.to_string()))?;
                run(agent, req, timeout)
            }
            None => {
                let req = builder.body(()).map_err(|e| ApiError::Serialization(e.to_string()))?;
                run(agent, req, timeout)
            }
        };
        let mut response = result.map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        Ok(HttpResponse { status, headers, body })
    }

    fn run<S: ureq::AsSendBody>(
        agent: &ureq::Agent,
        request: http::Request<S>,
        timeout: Option<Duration>,
    ) -> Result<http::Response<ureq::Body>, ureq::Error> {
        let request = match timeout {
            Some(timeout) => agent
                .configure_request(request)
                .timeout_global(Some(timeout))
                .build(),
            None => request,
        };
        agent.run(request)
    }
}
