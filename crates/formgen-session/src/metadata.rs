//! Creation metadata
//!
//! The session-scoped record of an in-progress creation flow. It is written
//! when the flow starts, updated at each step, and cleared on commit or when
//! found incomplete.

use crate::error::SessionError;
use crate::ids::JobId;
use crate::session::SessionContext;
use formgen_definition::FormDefinition;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Session key holding [`CreationMetadata`]
pub const CREATION_METADATA_KEY: &str = "formCreation";

static EMAIL_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid"));

/// Generation preferences chosen by the user
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormPreferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_conditionals: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Inputs of the most recent regeneration request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegenerationContext {
    pub description: String,
    pub current_definition: FormDefinition,
    pub feedback: String,
}

/// In-progress creation flow
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationMetadata {
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organisation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_email: Option<String>,
    #[serde(default)]
    pub form_description: String,
    #[serde(default)]
    pub preferences: FormPreferences,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regeneration_feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regeneration: Option<RegenerationContext>,
}

impl CreationMetadata {
    /// Start a creation record
    #[must_use]
    pub fn new(title: impl Into<String>, form_description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            form_description: form_description.into(),
            ..Self::default()
        }
    }

    /// With owning team
    #[must_use]
    pub fn with_team(
        mut self,
        organisation: impl Into<String>,
        team_name: impl Into<String>,
        team_email: impl Into<String>,
    ) -> Self {
        self.organisation = Some(organisation.into());
        self.team_name = Some(team_name.into());
        self.team_email = Some(team_email.into());
        self
    }

    /// With generation preferences
    #[must_use]
    pub fn with_preferences(mut self, preferences: FormPreferences) -> Self {
        self.preferences = preferences;
        self
    }

    /// Read from a session
    ///
    /// # Errors
    /// Returns `SessionError::MalformedValue` if the stored value does not
    /// decode as creation metadata
    pub fn load(session: &dyn SessionContext) -> Result<Option<Self>, SessionError> {
        session
            .get(CREATION_METADATA_KEY)
            .map(|value| {
                serde_json::from_value(value)
                    .map_err(|e| SessionError::malformed(CREATION_METADATA_KEY, e))
            })
            .transpose()
    }

    /// Write to a session
    ///
    /// # Errors
    /// Returns error if a preserved preference field cannot be encoded
    pub fn save(&self, session: &dyn SessionContext) -> Result<(), SessionError> {
        let value = serde_json::to_value(self)
            .map_err(|e| SessionError::malformed(CREATION_METADATA_KEY, e))?;
        session.set(CREATION_METADATA_KEY, value);
        Ok(())
    }

    /// Remove from a session
    pub fn clear(session: &dyn SessionContext) {
        session.clear(CREATION_METADATA_KEY);
    }

    /// Ownership fields that are absent or unusable
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if blank(self.organisation.as_deref()) {
            missing.push("organisation");
        }
        if blank(self.team_name.as_deref()) {
            missing.push("teamName");
        }
        match self.team_email.as_deref().map(str::trim) {
            Some(email) if EMAIL_SHAPE.is_match(email) => {}
            _ => missing.push("teamEmail"),
        }
        missing
    }

    /// Organisation, team name and a plausible team email are all present
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Record a regeneration request against a new job
    pub fn begin_regeneration(&mut self, job_id: JobId, context: RegenerationContext) {
        self.ai_job_id = Some(job_id);
        self.regeneration_feedback = Some(context.feedback.clone());
        self.regeneration = Some(context);
    }

    /// Whether `job_id` is the job this flow is waiting on
    #[must_use]
    pub fn is_current_job(&self, job_id: JobId) -> bool {
        self.ai_job_id == Some(job_id)
    }
}

fn blank(value: Option<&str>) -> bool {
    value.map_or(true, |s| s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SessionId;
    use crate::session::InMemorySession;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn complete() -> CreationMetadata {
        CreationMetadata::new("Apply for a permit", "A permit application")
            .with_team("Defra", "Forms team", "forms@example.gov.uk")
    }

    #[test]
    fn email_pattern_compiles_and_matches() {
        let pattern = Lazy::force(&EMAIL_SHAPE);
        assert!(pattern.is_match("forms@example.gov.uk"));
        assert!(!pattern.is_match("forms@example"));
        assert!(!pattern.is_match("forms example@gov.uk"));
        assert!(!pattern.is_match("a@b@c.uk"));
    }

    #[test]
    fn save_then_load() {
        let session = InMemorySession::new(SessionId::new());
        let metadata = complete();
        metadata.save(&session).unwrap();

        let loaded = CreationMetadata::load(&session).unwrap();
        assert_eq!(loaded, Some(metadata));
    }

    #[test]
    fn load_missing_is_none() {
        let session = InMemorySession::new(SessionId::new());
        assert_eq!(CreationMetadata::load(&session).unwrap(), None);
    }

    #[test]
    fn load_malformed_is_error() {
        let session = InMemorySession::new(SessionId::new());
        session.set(CREATION_METADATA_KEY, json!("not an object"));
        assert!(matches!(
            CreationMetadata::load(&session),
            Err(SessionError::MalformedValue { .. })
        ));
    }

    #[test]
    fn clear_removes() {
        let session = InMemorySession::new(SessionId::new());
        complete().save(&session).unwrap();
        CreationMetadata::clear(&session);
        assert!(session.is_empty());
    }

    #[test]
    fn completeness() {
        assert!(complete().is_complete());

        let partial = CreationMetadata::new("t", "d");
        assert_eq!(
            partial.missing_fields(),
            vec!["organisation", "teamName", "teamEmail"]
        );

        let bad_email = complete().with_team("Defra", "Forms", "not-an-email");
        assert_eq!(bad_email.missing_fields(), vec!["teamEmail"]);
    }

    #[test]
    fn wire_names_are_camel_case() {
        let mut metadata = complete();
        metadata.ai_job_id = Some(JobId::new());
        let value = serde_json::to_value(&metadata).unwrap();
        assert!(value.get("teamEmail").is_some());
        assert!(value.get("aiJobId").is_some());
        assert!(value.get("formDescription").is_some());
    }

    #[test]
    fn begin_regeneration_tracks_job() {
        let mut metadata = complete();
        let job = JobId::new();
        metadata.begin_regeneration(
            job,
            RegenerationContext {
                description: "d".into(),
                current_definition: FormDefinition::default(),
                feedback: "Please add a date field".into(),
            },
        );
        assert!(metadata.is_current_job(job));
        assert!(!metadata.is_current_job(JobId::new()));
        assert_eq!(
            metadata.regeneration_feedback.as_deref(),
            Some("Please add a date field")
        );
    }
}
