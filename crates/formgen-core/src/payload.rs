//! Review POST body parsing
//!
//! The body is parsed once, at the boundary, into a [`ReviewSubmission`].
//! Orchestration code only ever sees the typed result.

use crate::config::FeedbackBounds;
use crate::error::{PayloadValidationError, ReviewError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// The three review actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReviewAction {
    Approve,
    Regenerate,
    EditManually,
}

impl ReviewAction {
    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Regenerate => "regenerate",
            Self::EditManually => "edit-manually",
        }
    }
}

impl fmt::Display for ReviewAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewAction {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(Self::Approve),
            "regenerate" => Ok(Self::Regenerate),
            "edit-manually" => Ok(Self::EditManually),
            other => Err(ReviewError::UnknownAction(other.to_string())),
        }
    }
}

/// Parsed action with its data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewActionPayload {
    Approve,
    Regenerate { feedback: String },
    EditManually,
}

impl ReviewActionPayload {
    /// Action without its data
    #[must_use]
    pub fn action(&self) -> ReviewAction {
        match self {
            Self::Approve => ReviewAction::Approve,
            Self::Regenerate { .. } => ReviewAction::Regenerate,
            Self::EditManually => ReviewAction::EditManually,
        }
    }
}

/// A parsed review POST
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewSubmission {
    pub payload: ReviewActionPayload,
    /// Client-chosen key identifying this commit attempt
    pub idempotency_key: Option<String>,
}

/// Parse a review POST body
///
/// `feedback` is trimmed and its length counted in characters; it is only
/// read for `regenerate`.
///
/// # Errors
/// - `ReviewError::PayloadValidation` for a malformed body, action or feedback
/// - `ReviewError::UnknownAction` for an action string that names no action
pub fn parse_review_payload(
    body: &Value,
    bounds: FeedbackBounds,
) -> Result<ReviewSubmission, ReviewError> {
    let fields = body.as_object().ok_or(PayloadValidationError::NotAnObject)?;

    let action = match fields.get("action") {
        None | Some(Value::Null) => return Err(PayloadValidationError::MissingAction.into()),
        Some(Value::String(s)) if s.trim().is_empty() => {
            return Err(PayloadValidationError::MissingAction.into())
        }
        Some(Value::String(s)) => s.trim().parse::<ReviewAction>()?,
        Some(_) => return Err(PayloadValidationError::ActionNotString.into()),
    };

    let payload = match action {
        ReviewAction::Approve => ReviewActionPayload::Approve,
        ReviewAction::EditManually => ReviewActionPayload::EditManually,
        ReviewAction::Regenerate => ReviewActionPayload::Regenerate {
            feedback: parse_feedback(fields.get("feedback"), bounds)?,
        },
    };

    let idempotency_key = match fields.get("idempotencyKey") {
        None | Some(Value::Null) => None,
        Some(Value::String(key)) if !key.trim().is_empty() => Some(key.trim().to_string()),
        Some(_) => return Err(PayloadValidationError::InvalidIdempotencyKey.into()),
    };

    Ok(ReviewSubmission {
        payload,
        idempotency_key,
    })
}

fn parse_feedback(
    value: Option<&Value>,
    bounds: FeedbackBounds,
) -> Result<String, PayloadValidationError> {
    let Some(Value::String(raw)) = value else {
        return Err(PayloadValidationError::MissingFeedback);
    };
    let feedback = raw.trim();
    let len = feedback.chars().count();
    if len < bounds.min_chars {
        return Err(PayloadValidationError::FeedbackTooShort {
            min: bounds.min_chars,
            actual: len,
        });
    }
    if len > bounds.max_chars {
        return Err(PayloadValidationError::FeedbackTooLong {
            max: bounds.max_chars,
            actual: len,
        });
    }
    Ok(feedback.to_string())
}
