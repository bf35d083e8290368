//! Formgen Generation
//!
//! Runs AI generation for the creation flow:
//! - synchronous initial generation, awaited by the caller
//! - background regeneration on a fixed worker pool, fire-and-forget
//! - pull-based job status for progress polling
//!
//! # Example
//!
//! ```rust,ignore
//! use formgen_generation::{GenerationConfig, GenerationService, RegenerationRequest};
//!
//! let service = GenerationService::start(generator, temp_forms, GenerationConfig::default());
//! let handle = service.regenerate_form_in_background(request);
//!
//! // Later, from a progress poll
//! let snapshot = service.get_job_status(handle.job_id());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod error;
mod generator;
mod job;
mod service;

pub use error::GenerationError;
#[cfg(test)]
pub use generator::MockFormGenerator;
pub use generator::{FormGenerator, GenerationRequest, RegenerationPrompt, StaticFormGenerator};
pub use job::{JobHandle, JobRegistry, JobSnapshot, JobStatus};
pub use service::{GenerationConfig, GenerationService, RegenerationRequest};

// Identifiers live with the session layer so both crates share them
pub use formgen_session::JobId;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
