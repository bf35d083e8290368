//! Workflow configuration
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration.

use crate::error::ReviewError;
use formgen_generation::GenerationConfig;
use formgen_session::TempFormManager;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Placeholder replaced by a committed form's slug
pub const SLUG_PLACEHOLDER: &str = "{slug}";

/// Page routes the workflow redirects between
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Routes {
    pub create: String,
    pub describe: String,
    pub progress: String,
    pub review: String,
    /// Form overview, with `{slug}` placeholder
    pub overview: String,
    /// Form editor, with `{slug}` placeholder
    pub editor: String,
}

impl Routes {
    /// Overview page of a committed form
    #[must_use]
    pub fn overview_for(&self, slug: &str) -> String {
        self.overview.replace(SLUG_PLACEHOLDER, slug)
    }

    /// Editor page of a committed form
    #[must_use]
    pub fn editor_for(&self, slug: &str) -> String {
        self.editor.replace(SLUG_PLACEHOLDER, slug)
    }

    /// Review page, flagged when showing a regenerated definition
    #[must_use]
    pub fn review_for(&self, regenerated: bool) -> String {
        if regenerated {
            format!("{}?regenerated=true", self.review)
        } else {
            self.review.clone()
        }
    }
}

impl Default for Routes {
    fn default() -> Self {
        Self {
            create: "/create".into(),
            describe: "/create/ai-describe".into(),
            progress: "/create/ai-progress".into(),
            review: "/create/ai-review".into(),
            overview: "/library/{slug}".into(),
            editor: "/library/{slug}/editor-v2/pages".into(),
        }
    }
}

/// Accepted regeneration feedback length, in characters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackBounds {
    pub min_chars: usize,
    pub max_chars: usize,
}

impl FeedbackBounds {
    /// Whether `len` characters is acceptable
    #[inline]
    #[must_use]
    pub fn contains(&self, len: usize) -> bool {
        (self.min_chars..=self.max_chars).contains(&len)
    }
}

impl Default for FeedbackBounds {
    fn default() -> Self {
        Self {
            min_chars: 10,
            max_chars: 1000,
        }
    }
}

/// Temp form store sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempFormSettings {
    pub capacity: u64,
    pub ttl_secs: u64,
}

impl Default for TempFormSettings {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            ttl_secs: 24 * 60 * 60,
        }
    }
}

/// Regeneration worker pool sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub workers: usize,
    pub queue_depth: usize,
    pub job_retention_secs: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        let defaults = GenerationConfig::default();
        Self {
            workers: defaults.workers,
            queue_depth: defaults.queue_depth,
            job_retention_secs: defaults.job_retention.as_secs(),
        }
    }
}

/// Review workflow configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub routes: Routes,
    pub feedback: FeedbackBounds,
    pub temp_forms: TempFormSettings,
    pub generation: GenerationSettings,
    /// How long a committed idempotency key keeps redirecting resubmits
    pub commit_retention_secs: u64,
    /// How long an untouched session keeps its review state
    pub state_retention_secs: u64,
}

impl WorkflowConfig {
    /// Create config with defaults
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML document
    ///
    /// # Errors
    /// Returns `ReviewError::Configuration` if the document is not valid
    pub fn from_toml_str(source: &str) -> Result<Self, ReviewError> {
        let config: Self =
            toml::from_str(source).map_err(|e| ReviewError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// Returns `ReviewError::Configuration` if the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ReviewError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            ReviewError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }

    /// With feedback bounds
    #[inline]
    #[must_use]
    pub fn with_feedback_bounds(mut self, min_chars: usize, max_chars: usize) -> Self {
        self.feedback = FeedbackBounds {
            min_chars,
            max_chars,
        };
        self
    }

    /// With worker count
    #[inline]
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.generation.workers = workers;
        self
    }

    /// With temp form time-to-live
    #[inline]
    #[must_use]
    pub fn with_temp_form_ttl(mut self, ttl: Duration) -> Self {
        self.temp_forms.ttl_secs = ttl.as_secs();
        self
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    /// Returns `ReviewError::Configuration` describing the first violation
    pub fn validate(&self) -> Result<(), ReviewError> {
        if self.feedback.min_chars > self.feedback.max_chars {
            return Err(ReviewError::Configuration(format!(
                "feedback.min_chars ({}) exceeds feedback.max_chars ({})",
                self.feedback.min_chars, self.feedback.max_chars
            )));
        }
        if self.generation.workers == 0 {
            return Err(ReviewError::Configuration(
                "generation.workers must be at least 1".into(),
            ));
        }
        if !self.routes.overview.contains(SLUG_PLACEHOLDER) {
            return Err(ReviewError::Configuration(format!(
                "routes.overview must contain {SLUG_PLACEHOLDER}"
            )));
        }
        Ok(())
    }

    /// Worker pool settings
    #[must_use]
    pub fn generation_config(&self) -> GenerationConfig {
        GenerationConfig::default()
            .with_workers(self.generation.workers)
            .with_queue_depth(self.generation.queue_depth)
            .with_job_retention(Duration::from_secs(self.generation.job_retention_secs))
    }

    /// Temp form store built from these settings
    #[must_use]
    pub fn temp_form_manager(&self) -> TempFormManager {
        if self.temp_forms.ttl_secs == 0 {
            TempFormManager::new(self.temp_forms.capacity)
        } else {
            TempFormManager::with_ttl(
                self.temp_forms.capacity,
                Duration::from_secs(self.temp_forms.ttl_secs),
            )
        }
    }

    /// Committed idempotency key retention
    #[must_use]
    pub fn commit_retention(&self) -> Duration {
        Duration::from_secs(self.commit_retention_secs)
    }

    /// Idle review state retention
    #[must_use]
    pub fn state_retention(&self) -> Duration {
        Duration::from_secs(self.state_retention_secs)
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            routes: Routes::default(),
            feedback: FeedbackBounds::default(),
            temp_forms: TempFormSettings::default(),
            generation: GenerationSettings::default(),
            commit_retention_secs: 3600,
            state_retention_secs: 24 * 60 * 60,
        }
    }
}
