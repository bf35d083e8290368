//! Error types for the review workflow
//!
//! Every variant maps to exactly one HTTP status. Nothing here is allowed
//! to escape the request boundary; [`crate::ReviewWorkflow`] turns each one
//! into a [`crate::ReviewResponse`].

use crate::state::ReviewState;
use formgen_definition::IntegrityReport;
use formgen_generation::GenerationError;
use formgen_session::SessionError;

/// Review workflow errors
#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    /// AI service unavailable or invalid configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Creation metadata missing, incomplete or unreadable
    #[error("session state error: {0}")]
    SessionState(String),

    /// Malformed action or feedback
    #[error(transparent)]
    PayloadValidation(#[from] PayloadValidationError),

    /// Definition rejected by the integrity validator
    #[error("form definition failed integrity checks: {}", .0.summary())]
    FormIntegrity(IntegrityReport),

    /// Repository call failed after the shell was created
    #[error("persistence failed: {0}")]
    Persistence(#[from] RepositoryError),

    /// Action string not recognised
    #[error("unknown review action: {0}")]
    UnknownAction(String),

    /// Another attempt with the same idempotency key is running
    #[error("a commit for this form is already in progress")]
    CommitInProgress,

    /// Action not allowed in the session's current review state
    #[error(transparent)]
    InvalidState(#[from] StateTransitionError),

    /// Generation request failed
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),
}

impl ReviewError {
    /// HTTP status the boundary responds with
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::Configuration(_) | Self::UnknownAction(_) | Self::Generation(_) => 500,
            Self::SessionState(_) => 303,
            Self::PayloadValidation(_) | Self::FormIntegrity(_) | Self::Persistence(_) => 400,
            Self::CommitInProgress | Self::InvalidState(_) => 409,
        }
    }

    /// Whether the user keeps their temp form and can try again
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Configuration(_) | Self::UnknownAction(_))
    }
}

impl From<SessionError> for ReviewError {
    fn from(err: SessionError) -> Self {
        Self::SessionState(err.to_string())
    }
}

/// Boundary parse failures, one per offending field
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadValidationError {
    /// Body is not a JSON object
    #[error("request body must be an object")]
    NotAnObject,

    /// `action` absent
    #[error("select an action")]
    MissingAction,

    /// `action` present but not a string
    #[error("action must be a string")]
    ActionNotString,

    /// `feedback` absent or not a string on regenerate
    #[error("enter feedback describing what to change")]
    MissingFeedback,

    /// `feedback` shorter than allowed
    #[error("feedback must be at least {min} characters")]
    FeedbackTooShort { min: usize, actual: usize },

    /// `feedback` longer than allowed
    #[error("feedback must be {max} characters or fewer")]
    FeedbackTooLong { max: usize, actual: usize },

    /// `idempotencyKey` present but unusable
    #[error("idempotency key must be a non-empty string")]
    InvalidIdempotencyKey,
}

impl PayloadValidationError {
    /// Payload field the error is reported against
    #[must_use]
    pub fn field(&self) -> &'static str {
        match self {
            Self::NotAnObject | Self::MissingAction | Self::ActionNotString => "action",
            Self::MissingFeedback | Self::FeedbackTooShort { .. } | Self::FeedbackTooLong { .. } => {
                "feedback"
            }
            Self::InvalidIdempotencyKey => "idempotencyKey",
        }
    }
}

/// Forms repository errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    /// Form does not exist
    #[error("form not found: {0}")]
    NotFound(String),

    /// Caller not allowed
    #[error("not authorised")]
    Unauthorized,

    /// Repository refused the request
    #[error("repository rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Repository could not be reached
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

impl RepositoryError {
    /// Check if retrying might succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Rejected { status, .. } => *status >= 500,
            Self::NotFound(_) | Self::Unauthorized => false,
        }
    }
}

/// Review state change not allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot move from {from:?} to {to:?}")]
pub struct StateTransitionError {
    pub from: ReviewState,
    pub to: ReviewState,
}
