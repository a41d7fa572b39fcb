//! Limiter error types

use std::any::Any;
use std::sync::Arc;
use thiserror::Error;

/// Errors delivered through a job's completion handle
///
/// `E` is the job's own error type. It is passed through untouched in
/// [`LimitError::Job`]; every other variant describes something the limiter
/// observed about the job.
#[derive(Debug, Error)]
pub enum LimitError<E> {
    /// The job's future resolved to an error
    #[error("{0}")]
    Job(E),

    /// The job panicked while building its future or while being polled
    #[error("Job panicked: {message}")]
    Panicked { message: String },

    /// The job was still queued when an earlier job failed with abort-on-error enabled
    #[error("Job aborted before it started: {cause}")]
    Aborted { cause: Arc<str> },

    /// `submit` was called outside a Tokio runtime
    #[error("No Tokio runtime available to run the job")]
    NoRuntime,

    /// The job's task was dropped before it reported a result
    #[error("Job was cancelled before it completed")]
    Cancelled,
}

impl<E> LimitError<E> {
    /// Check if this is the job's own error
    pub fn is_job(&self) -> bool {
        matches!(self, LimitError::Job(_))
    }

    /// Check if the job was purged from the queue by the abort policy
    pub fn is_aborted(&self) -> bool {
        matches!(self, LimitError::Aborted { .. })
    }

    /// Borrow the job's own error, if that is what this is
    pub fn job_error(&self) -> Option<&E> {
        match self {
            LimitError::Job(e) => Some(e),
            _ => None,
        }
    }

    /// Take the job's own error, if that is what this is
    pub fn into_job(self) -> Option<E> {
        match self {
            LimitError::Job(e) => Some(e),
            _ => None,
        }
    }
}

/// Render a caught panic payload as a message
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
