//! Formgen Definition
//!
//! The form definition artifact that flows through the review workflow,
//! plus the two pure gates every definition passes before it is committed.
//!
//! # Core Concepts
//!
//! - [`FormDefinition`]: lenient model of an AI-produced form definition
//! - [`ResponseProcessor`]: deterministic, idempotent repair of raw output
//! - [`FormIntegrityValidator`]: structural validation that never panics
//! - [`DefinitionHash`]: Blake3 content address of a definition
//! - [`FormStats`]: page/component/condition/list counts for review screens
//!
//! # Example
//!
//! ```rust,ignore
//! use formgen_definition::{FormDefinition, FormIntegrityValidator, ResponseProcessor};
//!
//! let mut def = FormDefinition::from_json_str(raw_ai_output)?;
//! ResponseProcessor::new().process(&mut def);
//!
//! let report = FormIntegrityValidator::new().validate_form_integrity(&def);
//! assert!(report.is_valid, "{:?}", report.errors);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
mod error;
mod hash;
mod integrity;
mod model;
mod processor;
mod stats;

// Re-exports
pub use error::DefinitionError;
pub use hash::DefinitionHash;
pub use integrity::{validate_form_integrity, FormIntegrityValidator, IntegrityError, IntegrityReport};
pub use model::{
    Component, Condition, ConditionItem, ConditionValueKind, Coordinator, Engine, FormDefinition,
    List, ListItem, Next, Page, Section,
};
pub use processor::{Repair, RepairKind, RepairSummary, ResponseProcessor, DEFAULT_FORM_NAME};
pub use stats::FormStats;

/// Schema version written into repaired definitions
pub const DEFAULT_SCHEMA: u32 = 2;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
