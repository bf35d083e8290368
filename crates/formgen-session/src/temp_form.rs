//! Uncommitted form storage using moka
//!
//! Holds at most one generated definition per session. A write for a session
//! replaces whatever was there; there is no versioning and no
//! compare-and-swap.

use crate::error::SessionError;
use crate::ids::{JobId, SessionId};
use crate::metadata::FormPreferences;
use chrono::{DateTime, Utc};
use formgen_definition::{DefinitionHash, FormDefinition};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Where a temp form came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TempFormSource {
    /// First synchronous generation
    Initial,
    /// Background regeneration job
    Regeneration { job_id: JobId },
}

/// Bookkeeping carried with a temp form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TempFormMetadata {
    pub title: String,
    pub generated_at: DateTime<Utc>,
    pub source: TempFormSource,
    pub content_hash: DefinitionHash,
}

/// An AI-generated, not-yet-committed form definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TempForm {
    pub form_definition: FormDefinition,
    pub description: String,
    pub preferences: FormPreferences,
    pub metadata: TempFormMetadata,
}

impl TempForm {
    /// Wrap a definition, computing its content hash
    ///
    /// # Errors
    /// Returns error if the definition cannot be encoded for hashing
    pub fn new(
        form_definition: FormDefinition,
        description: impl Into<String>,
        preferences: FormPreferences,
        title: impl Into<String>,
        source: TempFormSource,
    ) -> Result<Self, SessionError> {
        let content_hash = DefinitionHash::of(&form_definition)?;
        Ok(Self {
            form_definition,
            description: description.into(),
            preferences,
            metadata: TempFormMetadata {
                title: title.into(),
                generated_at: Utc::now(),
                source,
                content_hash,
            },
        })
    }

    /// Content address of the held definition
    #[inline]
    #[must_use]
    pub fn content_hash(&self) -> DefinitionHash {
        self.metadata.content_hash
    }
}

/// Per-session temp form store
///
/// Entries expire after the configured time-to-live so abandoned flows do
/// not accumulate.
#[derive(Debug, Clone)]
pub struct TempFormManager {
    inner: Cache<SessionId, Arc<TempForm>>,
}

impl TempFormManager {
    /// Create store with max capacity and no expiry
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::new(max_capacity),
        }
    }

    /// Create store with time-based expiration
    #[inline]
    #[must_use]
    pub fn with_ttl(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Current temp form for a session
    pub async fn get_temp_form(&self, session: SessionId) -> Option<Arc<TempForm>> {
        self.inner.get(&session).await
    }

    /// Store a temp form, replacing any existing one
    pub async fn store_temp_form(&self, session: SessionId, form: TempForm) {
        tracing::debug!(
            session_id = %session,
            content_hash = %form.content_hash().short(),
            "storing temp form"
        );
        self.inner.insert(session, Arc::new(form)).await;
    }

    /// Drop a session's temp form
    pub async fn delete_temp_form(&self, session: SessionId) {
        self.inner.invalidate(&session).await;
    }

    /// Number of held temp forms
    pub async fn len(&self) -> u64 {
        self.inner.run_pending_tasks().await;
        self.inner.entry_count()
    }

    /// Whether no temp forms are held
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for TempFormManager {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(name: &str) -> TempForm {
        let def = FormDefinition {
            name: Some(name.to_string()),
            ..FormDefinition::default()
        };
        TempForm::new(def, "desc", FormPreferences::default(), name, TempFormSource::Initial)
            .unwrap()
    }

    #[tokio::test]
    async fn store_get_delete() {
        let manager = TempFormManager::default();
        let session = SessionId::new();

        assert!(manager.get_temp_form(session).await.is_none());

        manager.store_temp_form(session, form("a")).await;
        let held = manager.get_temp_form(session).await.unwrap();
        assert_eq!(held.form_definition.name.as_deref(), Some("a"));

        manager.delete_temp_form(session).await;
        assert!(manager.get_temp_form(session).await.is_none());
    }

    #[tokio::test]
    async fn second_write_overwrites() {
        let manager = TempFormManager::default();
        let session = SessionId::new();

        manager.store_temp_form(session, form("first")).await;
        manager.store_temp_form(session, form("second")).await;

        let held = manager.get_temp_form(session).await.unwrap();
        assert_eq!(held.metadata.title, "second");
        assert_eq!(manager.len().await, 1);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let manager = TempFormManager::default();
        let a = SessionId::new();
        let b = SessionId::new();

        manager.store_temp_form(a, form("a")).await;
        assert!(manager.get_temp_form(b).await.is_none());
    }

    #[tokio::test]
    async fn entries_expire() {
        let manager = TempFormManager::with_ttl(10, Duration::from_millis(50));
        let session = SessionId::new();
        manager.store_temp_form(session, form("a")).await;

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(manager.get_temp_form(session).await.is_none());
    }

    #[test]
    fn content_hash_tracks_definition() {
        assert_eq!(form("a").content_hash(), form("a").content_hash());
        assert_ne!(form("a").content_hash(), form("b").content_hash());
    }
}
