//! C-ABI wrapper around `api-client-core`.
//!
//! # Overview
//! Lets any language with a C FFI use the pooled, cancellable client: create
//! a context, fetch pooled clients by base URL, submit requests with a C
//! completion callback, cancel them by id, and use the escaping and header
//! negotiation helpers.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - The context owns a multi-threaded tokio runtime; completion callbacks run
//!   on its worker threads, never on the submitting thread.
//! - Request ids are non-zero; `0` signals that nothing was submitted.
//! - The C caller owns all returned pointers and must call the matching
//!   `api_*_free` function to release them. Clients must be freed before the
//!   context they came from.

pub mod types;

use std::ffi::{c_void, CStr};
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};

use api_client_core::{
    escape, select_header_accept, select_header_content_type, ApiContext, ClientConfig, RequestId, UreqTransport,
};
use tracing::warn;

use types::*;

/// Raw `user_data` pointer carried to the completion callback.
struct UserData(*mut c_void);

// The C caller guarantees `user_data` may be used from the runtime's threads.
unsafe impl Send for UserData {}

impl UserData {
    fn get(&self) -> *mut c_void {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Context lifecycle
// ---------------------------------------------------------------------------

/// Create a context from a JSON configuration (null for defaults).
/// Environment overrides (`API_CLIENT_*`) are applied on top.
///
/// Returns null if the configuration is invalid or the runtime cannot start.
/// The caller must free the returned pointer with `api_context_free`.
#[unsafe(no_mangle)]
pub extern "C" fn api_context_new(config_json: *const c_char) -> *mut FfiContext {
    catch_unwind(AssertUnwindSafe(|| {
        let config = match unsafe { optional(config_json) } {
            Ok(Some(raw)) => ClientConfig::from_json_str(&raw),
            Ok(None) => Ok(ClientConfig::default()),
            Err(e) => Err(e),
        };
        let config = match config.and_then(ClientConfig::apply_env) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "rejecting client configuration");
                return std::ptr::null_mut();
            }
        };
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .thread_name("api-client")
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(error = %e, "failed to start runtime");
                return std::ptr::null_mut();
            }
        };
        let transport = UreqTransport::new(config.timeout());
        let inner = ApiContext::with_runtime(config, transport, runtime.handle().clone());
        Box::into_raw(Box::new(FfiContext { runtime, inner }))
    }))
    .unwrap_or(std::ptr::null_mut())
}

/// Free a context created by `api_context_new`. In-flight requests are
/// abandoned without invoking their callbacks. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn api_context_free(ctx: *mut FfiContext) {
    if !ctx.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            let FfiContext { runtime, inner } = *unsafe { Box::from_raw(ctx) };
            drop(inner);
            runtime.shutdown_background();
        }));
    }
}

// ---------------------------------------------------------------------------
// Client pool
// ---------------------------------------------------------------------------

/// Get the pooled client for `base_url`, creating it on first use.
///
/// Returns null if an argument is null or `base_url` is not an absolute
/// http(s) URL. The caller must free the handle with `api_client_free`;
/// freeing a handle does not evict the client from the pool.
#[unsafe(no_mangle)]
pub extern "C" fn api_client_from_pool(ctx: *const FfiContext, base_url: *const c_char) -> *mut FfiClient {
    catch_unwind(AssertUnwindSafe(|| {
        if ctx.is_null() || base_url.is_null() {
            return std::ptr::null_mut();
        }
        let ctx = unsafe { &*ctx };
        let url = unsafe { CStr::from_ptr(base_url) }.to_str().unwrap_or("");
        match ctx.inner.client(url) {
            Ok(client) => Box::into_raw(Box::new(FfiClient { inner: client })),
            Err(e) => {
                warn!(error = %e, "cannot create client");
                std::ptr::null_mut()
            }
        }
    }))
    .unwrap_or(std::ptr::null_mut())
}

/// Free a client handle. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn api_client_free(client: *mut FfiClient) {
    if !client.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(client) });
        }));
    }
}

/// True if both handles refer to the same pooled client.
#[unsafe(no_mangle)]
pub extern "C" fn api_client_same(a: *const FfiClient, b: *const FfiClient) -> bool {
    if a.is_null() || b.is_null() {
        return false;
    }
    catch_unwind(AssertUnwindSafe(|| unsafe { (*a).inner.ptr_eq(&(*b).inner) })).unwrap_or(false)
}

/// Set a header sent with every request of this client.
/// Returns false if an argument is null or not UTF-8.
#[unsafe(no_mangle)]
pub extern "C" fn api_client_set_default_header(
    client: *const FfiClient,
    name: *const c_char,
    value: *const c_char,
) -> bool {
    catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() || name.is_null() || value.is_null() {
            return false;
        }
        let client = unsafe { &*client };
        let (Ok(name), Ok(value)) = (
            unsafe { CStr::from_ptr(name) }.to_str(),
            unsafe { CStr::from_ptr(value) }.to_str(),
        ) else {
            return false;
        };
        client.inner.set_default_header(name, value);
        true
    }))
    .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Submit a request. Returns its id, or 0 if nothing was submitted (null
/// argument, invalid request).
///
/// `callback` runs exactly once on a runtime thread with the outcome, unless
/// the request is cancelled first. `user_data` is passed through untouched.
#[unsafe(no_mangle)]
pub extern "C" fn api_execute(
    client: *const FfiClient,
    request: *const FfiApiRequest,
    callback: Option<FfiCompletion>,
    user_data: *mut c_void,
) -> u64 {
    catch_unwind(AssertUnwindSafe(|| {
        let Some(callback) = callback else {
            return 0;
        };
        if client.is_null() || request.is_null() {
            return 0;
        }
        let client = unsafe { &*client };
        let request = match unsafe { (*request).to_core() } {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "rejecting request");
                return 0;
            }
        };
        let user_data = UserData(user_data);
        let submitted = client.inner.execute(request, move |outcome| {
            let result = FfiApiResult::from_outcome(outcome);
            callback(result, user_data.get());
        });
        match submitted {
            Ok(id) => id.0,
            Err(e) => {
                warn!(error = %e, "request not submitted");
                0
            }
        }
    }))
    .unwrap_or(0)
}

/// Cancel an in-flight request. Returns false if it already finished, was
/// already cancelled, or never existed.
#[unsafe(no_mangle)]
pub extern "C" fn api_cancel_request(ctx: *const FfiContext, request_id: u64) -> bool {
    if ctx.is_null() {
        return false;
    }
    catch_unwind(AssertUnwindSafe(|| unsafe { &*ctx }.inner.cancel(RequestId(request_id)))).unwrap_or(false)
}

/// Number of requests submitted but not yet completed or cancelled.
#[unsafe(no_mangle)]
pub extern "C" fn api_request_queue_size(ctx: *const FfiContext) -> u64 {
    if ctx.is_null() {
        return 0;
    }
    catch_unwind(AssertUnwindSafe(|| unsafe { &*ctx }.inner.request_queue_size() as u64)).unwrap_or(0)
}

#[unsafe(no_mangle)]
pub extern "C" fn api_set_log_requests(ctx: *const FfiContext, enabled: bool) {
    if !ctx.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| unsafe { &*ctx }.inner.set_log_requests(enabled)));
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn api_log_requests(ctx: *const FfiContext) -> bool {
    if ctx.is_null() {
        return false;
    }
    catch_unwind(AssertUnwindSafe(|| unsafe { &*ctx }.inner.log_requests())).unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Percent-encode `value`. Returns null if `value` is null or not UTF-8.
/// Free with `api_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn api_escape(value: *const c_char) -> *mut c_char {
    catch_unwind(AssertUnwindSafe(|| match unsafe { optional(value) } {
        Ok(Some(s)) => to_c_string(escape(&s)),
        _ => std::ptr::null_mut(),
    }))
    .unwrap_or(std::ptr::null_mut())
}

/// Pick the `Accept` header for a comma-separated list of types. Returns null
/// for an empty or null list. Free with `api_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn api_select_header_accept(accepts: *const c_char) -> *mut c_char {
    catch_unwind(AssertUnwindSafe(|| {
        let list = match unsafe { optional(accepts) } {
            Ok(Some(raw)) => split_list(&raw),
            _ => Vec::new(),
        };
        select_header_accept(&list)
            .map(to_c_string)
            .unwrap_or(std::ptr::null_mut())
    }))
    .unwrap_or(std::ptr::null_mut())
}

/// Pick the `Content-Type` header for a comma-separated list of types.
/// Never returns null except on panic. Free with `api_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn api_select_header_content_type(content_types: *const c_char) -> *mut c_char {
    catch_unwind(AssertUnwindSafe(|| {
        let list = match unsafe { optional(content_types) } {
            Ok(Some(raw)) => split_list(&raw),
            _ => Vec::new(),
        };
        to_c_string(select_header_content_type(&list))
    }))
    .unwrap_or(std::ptr::null_mut())
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Free an `FfiApiResult` handed to a completion callback. Safe to call with
/// null.
#[unsafe(no_mangle)]
pub extern "C" fn api_free_result(result: *mut FfiApiResult) {
    if result.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| {
        let result = unsafe { Box::from_raw(result) };
        if !result.error_message.is_null() {
            drop(unsafe { std::ffi::CString::from_raw(result.error_message) });
        }
        if !result.body.is_null() {
            drop(unsafe { std::ffi::CString::from_raw(result.body) });
        }
    }));
}

/// Free a C string allocated by this library. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn api_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { std::ffi::CString::from_raw(s) });
        }));
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::sync::mpsc;
    use std::time::Duration;

    /// What the test callback forwards back to the test thread.
    #[derive(Debug)]
    struct Observed {
        code: FfiErrorCode,
        status: u16,
        body: Option<String>,
    }

    extern "C" fn forward(result: *mut FfiApiResult, user_data: *mut c_void) {
        let tx = unsafe { &*(user_data as *const mpsc::Sender<Observed>) };
        let r = unsafe { &*result };
        let body = if r.body.is_null() {
            None
        } else {
            Some(unsafe { CStr::from_ptr(r.body) }.to_str().unwrap().to_string())
        };
        let _ = tx.send(Observed {
            code: r.error_code,
            status: r.http_status,
            body,
        });
        api_free_result(result);
    }

    fn read_string(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        let s = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string();
        api_free_string(ptr);
        s
    }

    /// Start the mock server on its own thread and return its base URL.
    fn start_server() -> String {
        let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = std_listener.local_addr().unwrap();
        std_listener.set_nonblocking(true).unwrap();

        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
                mock_server::run(listener).await
            })
            .unwrap();
        });
        format!("http://{addr}")
    }

    fn request(method: &CString, path: &CString) -> FfiApiRequest {
        FfiApiRequest {
            method: method.as_ptr(),
            path: path.as_ptr(),
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
    fn context_new_and_free() {
        let ctx = api_context_new(std::ptr::null());
        assert!(!ctx.is_null());
        assert_eq!(api_request_queue_size(ctx), 0);
        api_context_free(ctx);
    }

    #[test]
    fn context_new_with_bad_config_returns_null() {
        let config = CString::new(r#"{"timeout_ms":"soon"}"#).unwrap();
        assert!(api_context_new(config.as_ptr()).is_null());
    }

    #[test]
    fn context_free_null_is_safe() {
        api_context_free(std::ptr::null_mut());
        api_client_free(std::ptr::null_mut());
        api_free_result(std::ptr::null_mut());
        api_free_string(std::ptr::null_mut());
    }

    #[test]
    fn pool_hands_out_shared_clients() {
        let ctx = api_context_new(std::ptr::null());
        let url = CString::new("http://petstore.test/v2").unwrap();
        let a = api_client_from_pool(ctx, url.as_ptr());
        let b = api_client_from_pool(ctx, url.as_ptr());
        assert!(!a.is_null() && !b.is_null());
        assert!(api_client_same(a, b));

        let bad = CString::new("not a url").unwrap();
        assert!(api_client_from_pool(ctx, bad.as_ptr()).is_null());
        assert!(api_client_from_pool(ctx, std::ptr::null()).is_null());

        api_client_free(a);
        api_client_free(b);
        api_context_free(ctx);
    }

    #[test]
    fn null_arguments_are_rejected() {
        assert_eq!(api_execute(std::ptr::null(), std::ptr::null(), Some(forward), std::ptr::null_mut()), 0);
        assert!(!api_cancel_request(std::ptr::null(), 1));
        assert_eq!(api_request_queue_size(std::ptr::null()), 0);
        assert!(!api_client_same(std::ptr::null(), std::ptr::null()));
        assert!(api_escape(std::ptr::null()).is_null());
    }

    #[test]
    fn cancel_unknown_id_is_noop() {
        let ctx = api_context_new(std::ptr::null());
        assert!(!api_cancel_request(ctx, 42));
        assert_eq!(api_request_queue_size(ctx), 0);
        api_context_free(ctx);
    }

    #[test]
    fn log_toggle_roundtrips() {
        let ctx = api_context_new(std::ptr::null());
        assert!(!api_log_requests(ctx));
        api_set_log_requests(ctx, true);
        assert!(api_log_requests(ctx));
        api_context_free(ctx);
    }

    #[test]
    fn helpers_match_core() {
        let raw = CString::new("a b/c").unwrap();
        assert_eq!(read_string(api_escape(raw.as_ptr())), "a%20b%2Fc");

        let accepts = CString::new("application/json, text/plain").unwrap();
        assert_eq!(read_string(api_select_header_accept(accepts.as_ptr())), "application/json");
        let single = CString::new("text/plain").unwrap();
        assert_eq!(read_string(api_select_header_accept(single.as_ptr())), "text/plain");
        assert!(api_select_header_accept(std::ptr::null()).is_null());

        assert_eq!(
            read_string(api_select_header_content_type(std::ptr::null())),
            "application/json"
        );
        let form = CString::new("application/x-www-form-urlencoded").unwrap();
        assert_eq!(
            read_string(api_select_header_content_type(form.as_ptr())),
            "application/x-www-form-urlencoded"
        );
    }

    #[test]
    fn execute_invalid_request_returns_zero() {
        let ctx = api_context_new(std::ptr::null());
        let url = CString::new("http://petstore.test").unwrap();
        let client = api_client_from_pool(ctx, url.as_ptr());
        let method = CString::new("BREW").unwrap();
        let path = CString::new("/pot").unwrap();
        let req = request(&method, &path);
        assert_eq!(api_execute(client, &req, Some(forward), std::ptr::null_mut()), 0);
        assert_eq!(api_execute(client, &req, None, std::ptr::null_mut()), 0);
        assert_eq!(api_request_queue_size(ctx), 0);
        api_client_free(client);
        api_context_free(ctx);
    }

    #[test]
    fn execute_against_live_server() {
        let base = start_server();
        let config = CString::new(
            r#"{"auth_settings":[{"name":"api_key","type":"api_key","location":"header","key":"api_key"}],
                "credentials":{"api_key":{"api_key":"special-key"}}}"#,
        )
        .unwrap();
        let ctx = api_context_new(config.as_ptr());
        let url = CString::new(base).unwrap();
        let client = api_client_from_pool(ctx, url.as_ptr());

        let (tx, rx) = mpsc::channel::<Observed>();
        let tx_ptr = &tx as *const mpsc::Sender<Observed> as *mut c_void;

        // Success with auth header merged in.
        let method = CString::new("GET").unwrap();
        let path = CString::new("/echo").unwrap();
        let auth = CString::new("api_key").unwrap();
        let query = CString::new(r#"{"q":"a b"}"#).unwrap();
        let mut req = request(&method, &path);
        req.auth_names = auth.as_ptr();
        req.query_json = query.as_ptr();
        let id = api_execute(client, &req, Some(forward), tx_ptr);
        assert_eq!(id, 1);

        let observed = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(matches!(observed.code, FfiErrorCode::Ok), "{observed:?}");
        let echo: serde_json::Value = serde_json::from_str(observed.body.as_deref().unwrap()).unwrap();
        assert_eq!(echo["headers"]["api_key"], "special-key");
        assert_eq!(echo["query"][0][1], "a b");

        // HTTP error carries the server's error document.
        let path = CString::new("/status/500").unwrap();
        let req = request(&method, &path);
        assert_eq!(api_execute(client, &req, Some(forward), tx_ptr), 2);
        let observed = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(matches!(observed.code, FfiErrorCode::Http));
        assert_eq!(observed.status, 500);
        let body: serde_json::Value = serde_json::from_str(observed.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["code"], 500);

        // Cancelled requests never call back.
        let path = CString::new("/delay/300").unwrap();
        let req = request(&method, &path);
        let id = api_execute(client, &req, Some(forward), tx_ptr);
        assert_eq!(id, 3);
        assert!(api_cancel_request(ctx, id));
        assert_eq!(api_request_queue_size(ctx), 0);
        assert!(rx.recv_timeout(Duration::from_millis(600)).is_err());

        api_client_free(client);
        api_context_free(ctx);
    }
}
