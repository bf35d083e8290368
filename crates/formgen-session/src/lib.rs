//! Formgen Session
//!
//! Per-browser-session state for the form creation flow:
//! - [`SessionContext`]: explicit key/value session handle
//! - [`CreationMetadata`]: the in-progress creation record
//! - [`TempFormManager`]: at most one uncommitted definition per session
//!
//! Nothing here is ambient. Every workflow function receives the session
//! it operates on.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod error;
mod ids;
mod metadata;
mod session;
mod temp_form;

pub use error::SessionError;
pub use ids::{JobId, SessionId};
pub use metadata::{CreationMetadata, FormPreferences, RegenerationContext, CREATION_METADATA_KEY};
pub use session::{InMemorySession, SessionContext, SessionStore};
pub use temp_form::{TempForm, TempFormManager, TempFormMetadata, TempFormSource};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
