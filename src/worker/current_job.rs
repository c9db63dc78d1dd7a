//! Process-wide marker of the scan currently being processed

use std::sync::{Arc, Mutex};

/// Shared handle to the in-flight scan id
///
/// Written by the worker loop, read by the termination handler.
#[derive(Debug, Clone, Default)]
pub struct CurrentJob {
    inner: Arc<Mutex<Option<String>>>,
}

impl CurrentJob {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<String> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Mark `id` as current until the returned guard is dropped
    pub fn enter(&self, id: &str) -> CurrentJobGuard {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = Some(id.to_string());
        CurrentJobGuard {
            current: self.clone(),
        }
    }

    pub fn clear(&self) {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

/// Clears the current-job marker on drop
#[must_use = "the marker is cleared as soon as the guard is dropped"]
pub struct CurrentJobGuard {
    current: CurrentJob,
}

impl Drop for CurrentJobGuard {
    fn drop(&mut self) {
        self.current.clear();
    }
}
