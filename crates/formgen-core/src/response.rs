//! What the workflow hands back to the HTTP layer
//!
//! Rendering templates is someone else's job; these are the view models
//! and the status codes they go out with.

use formgen_definition::{FormDefinition, FormStats};
use formgen_generation::JobStatus;
use formgen_session::JobId;
use serde::Serialize;
use std::collections::BTreeMap;

/// Status for redirects answering a POST
pub const SEE_OTHER: u16 = 303;
/// Status for redirects answering a GET
pub const FOUND: u16 = 302;

/// Review page model
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewView {
    pub title: String,
    pub definition: FormDefinition,
    pub stats: FormStats,
    /// Definition came from a regeneration
    pub regenerated: bool,
    pub show_retry_options: bool,
    pub error: Option<String>,
    pub field_errors: BTreeMap<String, String>,
    /// Feedback as submitted, echoed back on validation failure
    pub feedback: Option<String>,
}

impl ReviewView {
    /// View of a definition with its counts
    #[must_use]
    pub fn of(title: impl Into<String>, definition: FormDefinition) -> Self {
        let stats = FormStats::of(&definition);
        Self {
            title: title.into(),
            definition,
            stats,
            ..Self::default()
        }
    }
}

/// Regeneration progress page model
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub error: Option<String>,
    /// Where the page links back to
    pub review_url: String,
}

/// Generic error page model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorView {
    pub message: String,
}

/// Page to render
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "view", rename_all = "camelCase")]
pub enum View {
    Review(ReviewView),
    Progress(ProgressView),
    Error(ErrorView),
}

/// Workflow response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ReviewResponse {
    Redirect { status: u16, location: String },
    Render { status: u16, view: View },
}

impl ReviewResponse {
    /// 303 redirect
    #[must_use]
    pub fn see_other(location: impl Into<String>) -> Self {
        Self::Redirect {
            status: SEE_OTHER,
            location: location.into(),
        }
    }

    /// 302 redirect
    #[must_use]
    pub fn found(location: impl Into<String>) -> Self {
        Self::Redirect {
            status: FOUND,
            location: location.into(),
        }
    }

    /// Render a view
    #[must_use]
    pub fn render(status: u16, view: View) -> Self {
        Self::Render { status, view }
    }

    /// HTTP status
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::Redirect { status, .. } | Self::Render { status, .. } => *status,
        }
    }

    /// Redirect target, if this is a redirect
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        match self {
            Self::Redirect { location, .. } => Some(location),
            Self::Render { .. } => None,
        }
    }

    /// Review model, if this renders the review page
    #[must_use]
    pub fn review(&self) -> Option<&ReviewView> {
        match self {
            Self::Render {
                view: View::Review(review),
                ..
            } => Some(review),
            _ => None,
        }
    }

    /// Progress model, if this renders the progress page
    #[must_use]
    pub fn progress(&self) -> Option<&ProgressView> {
        match self {
            Self::Render {
                view: View::Progress(progress),
                ..
            } => Some(progress),
            _ => None,
        }
    }

    /// Whether this is a redirect
    #[must_use]
    pub fn is_redirect(&self) -> bool {
        matches!(self, Self::Redirect { .. })
    }
}
