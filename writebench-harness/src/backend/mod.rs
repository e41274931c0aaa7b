//! The capability contract between the harness and a storage backend.

use std::fmt::Debug;
use std::sync::Arc;

use thiserror::Error;

use crate::record::Record;

mod in_memory;

pub use in_memory::InMemoryBackend;

/// A type-erased [`Backend`] instance, shared between the harness and all workers.
pub type SharedBackend = Arc<dyn Backend>;

/// A storage backend that records can be written to and counted in.
///
/// Implementations must tolerate concurrent [`submit`](Backend::submit) calls from many workers.
/// [`count`](Backend::count) and [`close`](Backend::close) are only called by the harness after
/// every worker has exited, so they never overlap with submissions or each other.
#[async_trait::async_trait]
pub trait Backend: Debug + Send + Sync + 'static {
    /// The backend name, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Hands a record to the backend.
    ///
    /// Delivery is best-effort. Adapters may buffer records and write them later.
    async fn submit(&self, record: Record) -> BackendResult<()>;

    /// Returns the number of accepted records carrying the given label.
    async fn count(&self, label: &str) -> BackendResult<u64>;

    /// Releases all resources held by the backend.
    ///
    /// This is called exactly once, at the end of a run.
    async fn close(&self) -> BackendResult<()>;
}

/// Errors reported by a [`Backend`].
#[derive(Debug, Error)]
pub enum BackendError {
    /// The request could not be sent or its response could not be read.
    #[error("request error: {context}")]
    Request {
        /// What the backend was trying to do.
        context: String,
        /// The underlying transport error.
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The backend answered, but refused the request.
    #[error("rejected with status {status}: {message}")]
    Rejected {
        /// The status code returned by the backend.
        status: u16,
        /// The error message returned by the backend.
        message: String,
    },

    /// The backend answered with something that could not be interpreted.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The backend was used after it had been closed.
    #[error("backend is closed")]
    Closed,
}

impl BackendError {
    /// Creates a [`BackendError::Request`] from a transport error.
    pub fn request(
        context: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Request {
            context: context.into(),
            cause: Box::new(cause),
        }
    }
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
