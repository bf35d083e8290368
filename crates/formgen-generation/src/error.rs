//! Error types for generation

use crate::job::JobStatus;
use formgen_session::JobId;

/// Generation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// The AI provider is not configured or not reachable
    #[error("AI generation service unavailable: {0}")]
    Unavailable(String),

    /// The provider returned an error
    #[error("AI provider error: {0}")]
    Provider(String),

    /// The provider answered with something that is not a definition
    #[error("AI output is not a form definition: {0}")]
    InvalidOutput(String),

    /// Job was not found in the registry
    #[error("unknown generation job: {0}")]
    UnknownJob(JobId),

    /// Job status change not allowed
    #[error("illegal job transition for {job_id}: {from:?} -> {to:?}")]
    IllegalTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    /// Worker queue no longer accepts jobs
    #[error("generation queue is closed")]
    QueueClosed,

    /// Worker queue is at capacity
    #[error("generation queue is full (depth: {0})")]
    QueueFull(usize),
}

impl GenerationError {
    /// Check if a new request might succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider(_) | Self::InvalidOutput(_) | Self::QueueFull(_))
    }
}
