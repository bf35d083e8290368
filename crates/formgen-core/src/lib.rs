//! Formgen Core - Review workflow orchestration
//!
//! Takes an AI-generated form definition from review to commit:
//!
//! - **Review**: render the session's temp form, rebuilding it from a
//!   finished regeneration job when needed
//! - **Regenerate**: record a new job against the session and hand it to
//!   the worker pool without waiting
//! - **Approve / edit manually**: repair, validate, create a form shell,
//!   populate it, and delete the shell again if populating fails
//!
//! # Architecture
//!
//! ```text
//! POST body ──> parse_review_payload ──> ReviewWorkflow
//!                                          │
//!        ┌───────────────┬─────────────────┼──────────────────┐
//!        ▼               ▼                 ▼                  ▼
//!  SessionContext  TempFormManager  GenerationService   FormsRepository
//!                                   (worker pool)       (create/update/delete)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use formgen_core::{InMemoryFormsRepository, RequestContext, ReviewWorkflow, WorkflowConfig};
//!
//! let workflow = ReviewWorkflow::start(WorkflowConfig::new(), generator, Arc::new(InMemoryFormsRepository::new()))?;
//! let ctx = RequestContext::new(session, "user-1", auth_token);
//!
//! let response = workflow.post_review(&ctx, &serde_json::json!({"action": "approve"})).await;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
mod context;
mod error;
mod ledger;
mod payload;
mod repository;
mod response;
pub mod state;
mod workflow;

pub use config::{FeedbackBounds, Routes, WorkflowConfig};
pub use context::RequestContext;
pub use error::{PayloadValidationError, RepositoryError, ReviewError, StateTransitionError};
pub use ledger::{Claim, CommitLedger, CommittedForm, IdempotencyKey};
pub use payload::{parse_review_payload, ReviewAction, ReviewActionPayload, ReviewSubmission};
#[cfg(test)]
pub use repository::MockFormsRepository;
pub use repository::{
    slug_of, CreatedForm, FormMetadataInput, FormsRepository, InMemoryFormsRepository, StoredForm,
};
pub use response::{ErrorView, ProgressView, ReviewResponse, ReviewView, View, FOUND, SEE_OTHER};
pub use state::{ReviewState, ReviewStateTracker};
pub use workflow::ReviewWorkflow;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
