use std::sync::{Arc, Mutex};

use crate::handles::registry::{HandleRegistry, ResourceHandle};

/// Handles produced by one slicing or capture call, released together.
///
/// [`HandleBatch::revoke`] is the one sanctioned way to release everything at once. It can be
/// called any number of times, and release failures are deliberately unobservable: they are
/// logged at debug level and dropped.
pub struct HandleBatch {
    registry: Arc<dyn HandleRegistry>,
    handles: Mutex<Vec<ResourceHandle>>,
}

impl HandleBatch {
    /// Start an empty batch against `registry`.
    pub fn new(registry: Arc<dyn HandleRegistry>) -> Self {
        Self {
            registry,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Track a handle for later release.
    pub fn push(&self, handle: ResourceHandle) {
        self.lock().push(handle);
    }

    /// Number of handles still tracked.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of the tracked handles.
    pub fn handles(&self) -> Vec<ResourceHandle> {
        self.lock().clone()
    }

    /// Release every tracked handle. Returns how many were attempted.
    pub fn revoke(&self) -> usize {
        let drained = std::mem::take(&mut *self.lock());
        let n = drained.len();
        for handle in drained {
            if let Err(err) = self.registry.revoke(&handle) {
                tracing::debug!(%handle, error = %err, "ignoring handle release failure");
            }
        }
        n
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ResourceHandle>> {
        self.handles.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for HandleBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleBatch")
            .field("handles", &self.lock().len())
            .finish()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/handles/batch.rs"]
mod tests;
