//! One shared value per base URL.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use url::Url;

use crate::error::ApiError;

/// Lazily populated map from base URL to a shared value.
///
/// Construction happens under the pool lock, so concurrent first lookups of
/// the same URL build exactly one value. Entries live as long as the pool.
#[derive(Debug)]
pub struct ClientPool<C> {
    clients: Mutex<HashMap<String, C>>,
}

impl<C> Default for ClientPool<C> {
    fn default() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }
}

impl<C: Clone> ClientPool<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the value for `base_url`, building it with `make` on first use.
    ///
    /// The URL is validated before anything is stored; a malformed URL is an
    /// error and leaves the pool untouched.
    pub fn get_or_create<F>(&self, base_url: &str, make: F) -> Result<C, ApiError>
    where
        F: FnOnce(Url) -> C,
    {
        let mut clients = self.lock();
        if let Some(client) = clients.get(base_url) {
            return Ok(client.clone());
        }
        let url = parse_base_url(base_url)?;
        let client = make(url);
        clients.insert(base_url.to_string(), client.clone());
        Ok(client)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, C>> {
        self.clients.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Accept absolute `http`/`https` URLs that can carry a path.
pub fn parse_base_url(base_url: &str) -> Result<Url, ApiError> {
    let invalid = |reason: String| ApiError::InvalidBaseUrl {
        url: base_url.to_string(),
        reason,
    };
    let url = Url::parse(base_url.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
    }
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};

    use super::*;

    #[test]
    fn same_url_returns_same_value() {
        let pool: ClientPool<Arc<String>> = ClientPool::new();
        let a = pool.get_or_create("http://api.test", |u| Arc::new(u.to_string())).unwrap();
        let b = pool.get_or_create("http://api.test", |_| unreachable!()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn distinct_urls_get_distinct_values() {
        let pool: ClientPool<Arc<String>> = ClientPool::new();
        let a = pool.get_or_create("http://a.test", |u| Arc::new(u.to_string())).unwrap();
        let b = pool.get_or_create("http://b.test", |u| Arc::new(u.to_string())).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn malformed_urls_are_rejected() {
        let pool: ClientPool<Arc<String>> = ClientPool::new();
        for bad in ["", "not a url", "ftp://files.test", "mailto:me@test"] {
            let err = pool.get_or_create(bad, |u| Arc::new(u.to_string())).unwrap_err();
            assert!(matches!(err, ApiError::InvalidBaseUrl { .. }), "{bad}");
        }
        assert!(pool.is_empty());
    }

    #[test]
    fn concurrent_first_lookups_construct_once() {
        let pool: Arc<ClientPool<Arc<String>>> = Arc::new(ClientPool::new());
        let constructed = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(16));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let pool = pool.clone();
                let constructed = constructed.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    pool.get_or_create("https://api.test/v2", |u| {
                        constructed.fetch_add(1, Ordering::SeqCst);
                        Arc::new(u.to_string())
                    })
                    .unwrap()
                })
            })
            .collect();

        let clients: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(constructed.load(Ordering::SeqCst), 1);
        assert!(clients.iter().all(|c| Arc::ptr_eq(c, &clients[0])));
    }
}
