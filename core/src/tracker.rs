//! Registry of in-flight requests.
//!
//! # Design
//! Every submitted request gets a fresh id and an abort handle for the task
//! driving it. Removing the entry is the single point where a request reaches
//! its terminal state: whichever of `complete` or `cancel` removes the entry
//! first wins, and the loser sees `false` and does nothing. That makes
//! cancellation racing with natural completion harmless in both directions.
//!
//! An id is reserved before its task is spawned and the abort handle is
//! attached afterwards, so the lock is never held across `spawn`. A task
//! dropped during `spawn` can therefore still settle its own entry.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::task::AbortHandle;
use tracing::debug;

/// Identifier handed back at submission time. Monotonic, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Default)]
struct Inner {
    last_id: u64,
    /// `None` until the task's handle is attached.
    pending: HashMap<RequestId, Option<AbortHandle>>,
}

#[derive(Default)]
pub struct RequestTracker {
    inner: Mutex<Inner>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id and record the handle returned by `spawn`.
    pub fn register<F>(&self, spawn: F) -> RequestId
    where
        F: FnOnce(RequestId) -> AbortHandle,
    {
        let id = self.reserve();
        let handle = spawn(id);
        self.attach(id, handle);
        id
    }

    /// Allocate a fresh id whose entry is pending until `attach`.
    pub fn reserve(&self) -> RequestId {
        let mut inner = self.lock();
        inner.last_id += 1;
        let id = RequestId(inner.last_id);
        inner.pending.insert(id, None);
        id
    }

    /// Store the abort handle for a reserved id.
    ///
    /// Returns `false` if the entry is already gone. A cancelled entry has
    /// its task aborted here; a completed one is unaffected.
    pub fn attach(&self, id: RequestId, handle: AbortHandle) -> bool {
        let mut inner = self.lock();
        if let Some(slot) = inner.pending.get_mut(&id) {
            *slot = Some(handle);
            return true;
        }
        drop(inner);
        handle.abort();
        false
    }

    /// Mark `id` as finished. Returns `false` if it was already cancelled.
    pub fn complete(&self, id: RequestId) -> bool {
        self.lock().pending.remove(&id).is_some()
    }

    /// Abort and forget `id`. Unknown or finished ids are a no-op.
    pub fn cancel(&self, id: RequestId) -> bool {
        let entry = self.lock().pending.remove(&id);
        match entry {
            Some(handle) => {
                if let Some(handle) = handle {
                    handle.abort();
                }
                debug!(request_id = %id, "request cancelled");
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.lock().pending.contains_key(&id)
    }

    /// Number of requests currently in flight.
    pub fn size(&self) -> usize {
        self.lock().pending.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Entries stay consistent even if a holder panicked mid-call.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for RequestTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestTracker").field("size", &self.size()).finish()
    }
}
