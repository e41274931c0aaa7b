//! In-memory backend for dry runs and tests.
//!
//! This provides a [`Backend`] that simply counts records per label in a `HashMap`. The backend is
//! [`Clone`] so tests can hold a handle for direct inspection while the harness owns another copy.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::{Backend, BackendError, BackendResult};
use crate::record::Record;

#[derive(Debug, Default)]
struct Inner {
    counts: Mutex<HashMap<Arc<str>, u64>>,
    closed: AtomicBool,
}

/// A [`Backend`] that accepts every record and keeps per-label counts in memory.
#[derive(Clone, Debug, Default)]
pub struct InMemoryBackend {
    inner: Arc<Inner>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records stored under `label`, bypassing the `Backend` trait.
    pub fn stored(&self, label: &str) -> u64 {
        let counts = self.inner.counts.lock().unwrap();
        counts.get(label).copied().unwrap_or_default()
    }

    /// Returns `true` once [`Backend::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

#[async_trait::async_trait]
impl Backend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn submit(&self, record: Record) -> BackendResult<()> {
        if self.is_closed() {
            return Err(BackendError::Closed);
        }

        let mut counts = self.inner.counts.lock().unwrap();
        *counts.entry(record.label).or_default() += 1;
        Ok(())
    }

    async fn count(&self, label: &str) -> BackendResult<u64> {
        if self.is_closed() {
            return Err(BackendError::Closed);
        }
        Ok(self.stored(label))
    }

    async fn close(&self) -> BackendResult<()> {
        self.inner.closed.store(true, Ordering::Release);
        Ok(())
    }
}
