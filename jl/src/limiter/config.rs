//! Limiter configuration

use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

/// Limiter configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    /// Max jobs in flight at once (0 = unlimited)
    pub concurrency: usize,

    /// Reject every queued job when a running job fails
    #[serde(rename = "abort-on-error")]
    pub abort_on_error: bool,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            concurrency: 0,
            abort_on_error: false,
        }
    }
}

impl From<usize> for LimiterConfig {
    fn from(concurrency: usize) -> Self {
        Self {
            concurrency,
            ..Default::default()
        }
    }
}

impl LimiterConfig {
    /// Builder-style toggle for the purge-on-error policy
    pub fn abort_on_error(mut self, enabled: bool) -> Self {
        self.abort_on_error = enabled;
        self
    }

    /// The effective capacity, `None` meaning no limit
    pub fn capacity(&self) -> Option<NonZeroUsize> {
        NonZeroUsize::new(self.concurrency)
    }
}
