//! The shared state behind every pooled client.
//!
//! # Design
//! Instead of process globals, one `ApiContext` owns the client pool, the
//! request tracker, the auth registry and the logging switches. Clients keep
//! an `Arc` to the shared half, so a request id issued by any client can be
//! cancelled through the context or through any other client of the same
//! context. The pool holds clients, and clients never point back at the pool.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::runtime::Handle;
use tracing::info;

use crate::auth::AuthRegistry;
use crate::client::ApiClient;
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};
use crate::pool::ClientPool;
use crate::tracker::{RequestId, RequestTracker};
use crate::transport::Transport;

/// Decides whether one request/response event gets logged.
///
/// Called with `(client, request, None, None)` before dispatch and with the
/// response and/or error afterwards. It only gates logging; the request runs
/// either way.
pub type LogFilter<T> =
    Arc<dyn Fn(&ApiClient<T>, &HttpRequest, Option<&HttpResponse>, Option<&ApiError>) -> bool + Send + Sync>;

pub(crate) struct Shared<T: Transport> {
    pub(crate) config: ClientConfig,
    pub(crate) auth: AuthRegistry,
    pub(crate) transport: Arc<T>,
    pub(crate) runtime: Handle,
    pub(crate) tracker: RequestTracker,
    log_requests: AtomicBool,
    log_filter: RwLock<Option<LogFilter<T>>>,
}

impl<T: Transport> Shared<T> {
    pub(crate) fn log_requests(&self) -> bool {
        self.log_requests.load(Ordering::Relaxed)
    }

    pub(crate) fn log_filter(&self) -> Option<LogFilter<T>> {
        self.log_filter
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_log_filter(&self, filter: Option<LogFilter<T>>) {
        *self
            .log_filter
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = filter;
    }
}

/// Owner of the client pool and request tracker.
///
/// Cloning is cheap and every clone sees the same pool and tracker.
pub struct ApiContext<T: Transport> {
    shared: Arc<Shared<T>>,
    pool: Arc<ClientPool<ApiClient<T>>>,
}

impl<T: Transport> Clone for ApiContext<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            pool: self.pool.clone(),
        }
    }
}

impl<T: Transport> ApiContext<T> {
    /// Create a context driven by the tokio runtime of the calling thread.
    pub fn new(config: ClientConfig, transport: T) -> Result<Self, ApiError> {
        let runtime = Handle::try_current().map_err(|_| ApiError::NoRuntime)?;
        Ok(Self::with_runtime(config, transport, runtime))
    }

    /// Create a context whose requests are spawned on `runtime`. Submission
    /// then works from any thread, inside a runtime or not.
    pub fn with_runtime(config: ClientConfig, transport: T, runtime: Handle) -> Self {
        let shared = Shared {
            auth: config.auth_registry(),
            log_requests: AtomicBool::new(config.log_requests),
            log_filter: RwLock::new(None),
            transport: Arc::new(transport),
            runtime,
            tracker: RequestTracker::new(),
            config,
        };
        Self {
            shared: Arc::new(shared),
            pool: Arc::new(ClientPool::new()),
        }
    }

    /// The client for `base_url`, created on first use.
    pub fn client(&self, base_url: &str) -> Result<ApiClient<T>, ApiError> {
        self.pool.get_or_create(base_url, |url| {
            info!(base_url, "creating api client");
            ApiClient::new(url, self.shared.clone())
        })
    }

    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    /// Cancel an in-flight request. Returns `false` if it already finished,
    /// was already cancelled, or never existed.
    pub fn cancel(&self, id: RequestId) -> bool {
        self.shared.tracker.cancel(id)
    }

    /// Number of requests submitted but not yet completed or cancelled.
    pub fn request_queue_size(&self) -> usize {
        self.shared.tracker.size()
    }

    pub fn is_pending(&self, id: RequestId) -> bool {
        self.shared.tracker.contains(id)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    pub fn log_requests(&self) -> bool {
        self.shared.log_requests()
    }

    pub fn set_log_requests(&self, enabled: bool) {
        self.shared.log_requests.store(enabled, Ordering::Relaxed);
    }

    pub fn set_log_filter<F>(&self, filter: F)
    where
        F: Fn(&ApiClient<T>, &HttpRequest, Option<&HttpResponse>, Option<&ApiError>) -> bool + Send + Sync + 'static,
    {
        self.shared.set_log_filter(Some(Arc::new(filter)));
    }

    pub fn clear_log_filter(&self) {
        self.shared.set_log_filter(None);
    }
}

#[cfg(feature = "ureq-transport")]
impl ApiContext<crate::transport::UreqTransport> {
    /// Context backed by a ureq transport honouring `config.timeout_ms`.
    pub fn from_config(config: ClientConfig) -> Result<Self, ApiError> {
        let transport = crate::transport::UreqTransport::new(config.timeout());
        Self::new(config, transport)
    }
}

impl<T: Transport> fmt::Debug for ApiContext<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiContext")
            .field("clients", &self.pool.len())
            .field("in_flight", &self.shared.tracker.size())
            .field("log_requests", &self.log_requests())
            .finish()
    }
}
