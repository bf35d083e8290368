//! Review workflow orchestration
//!
//! Every public method is a request boundary: it takes the caller's
//! [`RequestContext`] and always returns a [`ReviewResponse`]. Errors are
//! mapped to views here and never propagate further.
//!
//! Commits run as validate, create shell, populate. If populating fails the
//! shell is deleted again and the user's temp form and session are left as
//! they were.

use crate::config::WorkflowConfig;
use crate::context::RequestContext;
use crate::error::ReviewError;
use crate::ledger::{Claim, CommitLedger, CommittedForm, IdempotencyKey};
use crate::payload::{parse_review_payload, ReviewActionPayload};
use crate::repository::{CreatedForm, FormMetadataInput, FormsRepository};
use crate::response::{ErrorView, ProgressView, ReviewResponse, ReviewView, View};
use crate::state::{ReviewState, ReviewStateTracker};
use formgen_definition::{FormIntegrityValidator, ResponseProcessor};
use formgen_generation::{
    FormGenerator, GenerationError, GenerationRequest, GenerationService, JobStatus,
    RegenerationRequest,
};
use formgen_session::{
    CreationMetadata, JobId, RegenerationContext, TempForm, TempFormManager, TempFormSource,
};
use serde_json::Value;
use std::sync::Arc;

const REGENERATION_FAILED: &str =
    "The form could not be regenerated. Return to the review page to try again.";

/// Which commit a POST asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommitKind {
    Approve,
    EditManually,
}

impl CommitKind {
    fn state(self) -> ReviewState {
        match self {
            Self::Approve => ReviewState::Committing,
            Self::EditManually => ReviewState::Editing,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::EditManually => "edit-manually",
        }
    }
}

/// The review, regenerate and commit flow
pub struct ReviewWorkflow {
    config: WorkflowConfig,
    generation: Arc<GenerationService>,
    temp_forms: TempFormManager,
    repository: Arc<dyn FormsRepository>,
    processor: ResponseProcessor,
    validator: FormIntegrityValidator,
    ledger: CommitLedger,
    states: ReviewStateTracker,
}

impl std::fmt::Debug for ReviewWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewWorkflow")
            .field("config", &self.config)
            .field("generation", &self.generation)
            .field("ledger", &self.ledger.len())
            .finish_non_exhaustive()
    }
}

impl ReviewWorkflow {
    /// Create workflow over a running generation service
    ///
    /// Shares the service's temp form store.
    ///
    /// # Errors
    /// Returns `ReviewError::Configuration` if `config` fails validation
    pub fn new(
        config: WorkflowConfig,
        generation: Arc<GenerationService>,
        repository: Arc<dyn FormsRepository>,
    ) -> Result<Self, ReviewError> {
        config.validate()?;
        let temp_forms = generation.temp_forms().clone();
        let ledger = CommitLedger::new(config.commit_retention());
        Ok(Self {
            config,
            generation,
            temp_forms,
            repository,
            processor: ResponseProcessor::new(),
            validator: FormIntegrityValidator::new(),
            ledger,
            states: ReviewStateTracker::new(),
        })
    }

    /// Start a generation service from `config` and wrap it
    ///
    /// Must be called from within a tokio runtime. Nothing is spawned for
    /// a rejected config.
    ///
    /// # Errors
    /// Returns `ReviewError::Configuration` if `config` fails validation
    pub fn start(
        config: WorkflowConfig,
        generator: Arc<dyn FormGenerator>,
        repository: Arc<dyn FormsRepository>,
    ) -> Result<Self, ReviewError> {
        config.validate()?;
        let generation = GenerationService::start(
            generator,
            config.temp_form_manager(),
            config.generation_config(),
        );
        Self::new(config, Arc::new(generation), repository)
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Generation service
    #[must_use]
    pub fn generation(&self) -> &GenerationService {
        &self.generation
    }

    /// Temp form store
    #[must_use]
    pub fn temp_forms(&self) -> &TempFormManager {
        &self.temp_forms
    }

    /// Per-session review states
    #[must_use]
    pub fn states(&self) -> &ReviewStateTracker {
        &self.states
    }

    /// Commit idempotency ledger
    #[must_use]
    pub fn ledger(&self) -> &CommitLedger {
        &self.ledger
    }

    /// `GET review`
    ///
    /// Without creation metadata this always redirects to the create page.
    /// A missing temp form is rebuilt from the session's completed
    /// regeneration job when there is one.
    pub async fn get_review(&self, ctx: &RequestContext, regenerated: bool) -> ReviewResponse {
        let session_id = ctx.session_id();
        let Some(metadata) = self.load_metadata(ctx) else {
            tracing::debug!(session_id = %session_id, "no creation in progress");
            return ReviewResponse::found(&self.config.routes.create);
        };

        let Some(temp_form) = self.current_temp_form(ctx, &metadata).await else {
            tracing::debug!(session_id = %session_id, "nothing to review");
            return ReviewResponse::found(&self.config.routes.describe);
        };

        self.states.settle(session_id);

        let mut view = ReviewView::of(
            display_title(&metadata, &temp_form),
            temp_form.form_definition.clone(),
        );
        view.regenerated = regenerated;
        ReviewResponse::render(200, View::Review(view))
    }

    /// `POST review`
    ///
    /// The body is parsed before anything else runs.
    pub async fn post_review(&self, ctx: &RequestContext, body: &Value) -> ReviewResponse {
        let submission = match parse_review_payload(body, self.config.feedback) {
            Ok(submission) => submission,
            Err(err) => {
                let feedback = body
                    .get("feedback")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                return self.error_response(ctx, err, feedback).await;
            }
        };

        tracing::info!(
            session_id = %ctx.session_id(),
            action = %submission.payload.action(),
            "review action"
        );

        let key = submission.idempotency_key.as_deref();
        let result = match submission.payload {
            ReviewActionPayload::Approve => self.commit(ctx, CommitKind::Approve, key).await,
            ReviewActionPayload::EditManually => {
                self.commit(ctx, CommitKind::EditManually, key).await
            }
            ReviewActionPayload::Regenerate { feedback } => self.regenerate(ctx, feedback).await,
        };

        match result {
            Ok(response) => response,
            Err(err) => self.error_response(ctx, err, None).await,
        }
    }

    /// Generate the first definition from the creation description
    pub async fn generate_initial(&self, ctx: &RequestContext) -> ReviewResponse {
        match self.try_generate_initial(ctx).await {
            Ok(response) => response,
            Err(err) => self.error_response(ctx, err, None).await,
        }
    }

    /// Progress page poll
    ///
    /// Completed jobs redirect to the review page flagged as regenerated.
    pub async fn get_progress(&self, ctx: &RequestContext) -> ReviewResponse {
        let session_id = ctx.session_id();
        let Some(metadata) = self.load_metadata(ctx) else {
            return ReviewResponse::found(&self.config.routes.create);
        };
        let Some(job_id) = metadata.ai_job_id else {
            return ReviewResponse::found(&self.config.routes.review);
        };
        let Some(snapshot) = self.generation.get_job_status(job_id) else {
            tracing::debug!(session_id = %session_id, job_id = %job_id, "job no longer tracked");
            self.states.settle(session_id);
            return ReviewResponse::found(&self.config.routes.review);
        };

        let progress = |error: Option<String>| ProgressView {
            job_id,
            status: snapshot.status,
            error,
            review_url: self.config.routes.review.clone(),
        };

        match snapshot.status {
            JobStatus::Completed => {
                self.states.settle(session_id);
                ReviewResponse::found(self.config.routes.review_for(true))
            }
            JobStatus::Failed => {
                self.states.settle(session_id);
                ReviewResponse::render(
                    200,
                    View::Progress(progress(Some(REGENERATION_FAILED.to_string()))),
                )
            }
            JobStatus::Pending | JobStatus::Running => {
                ReviewResponse::render(200, View::Progress(progress(None)))
            }
        }
    }

    /// Drop the in-progress creation
    pub async fn abandon(&self, ctx: &RequestContext) -> ReviewResponse {
        let session_id = ctx.session_id();
        self.temp_forms.delete_temp_form(session_id).await;
        CreationMetadata::clear(ctx.session.as_ref());

        if let Err(err) = self.states.transition(session_id, ReviewState::Abandoned) {
            tracing::debug!(session_id = %session_id, error = %err, "abandoning outside review");
            self.states.reset(session_id);
        }
        tracing::info!(session_id = %session_id, "creation abandoned");
        ReviewResponse::see_other(&self.config.routes.create)
    }

    async fn try_generate_initial(
        &self,
        ctx: &RequestContext,
    ) -> Result<ReviewResponse, ReviewError> {
        let session_id = ctx.session_id();
        let Some(mut metadata) = self.load_metadata(ctx) else {
            return Ok(ReviewResponse::see_other(&self.config.routes.create));
        };
        if metadata.form_description.trim().is_empty() {
            return Ok(ReviewResponse::see_other(&self.config.routes.describe));
        }
        self.ensure_generation_available()?;

        let definition = self
            .generation
            .generate_form(GenerationRequest {
                description: metadata.form_description.clone(),
                title: metadata.title.clone(),
                preferences: metadata.preferences.clone(),
                user_id: ctx.user_id.clone(),
            })
            .await?;

        let temp_form = TempForm::new(
            definition,
            metadata.form_description.clone(),
            metadata.preferences.clone(),
            metadata.title.clone(),
            TempFormSource::Initial,
        )
        .map_err(|e| GenerationError::InvalidOutput(e.to_string()))?;
        self.temp_forms.store_temp_form(session_id, temp_form).await;

        metadata.ai_job_id = None;
        metadata.regeneration = None;
        metadata.regeneration_feedback = None;
        metadata.save(ctx.session.as_ref())?;
        self.states.reset(session_id);

        tracing::info!(session_id = %session_id, "initial form generated");
        Ok(ReviewResponse::see_other(&self.config.routes.review))
    }

    async fn regenerate(
        &self,
        ctx: &RequestContext,
        feedback: String,
    ) -> Result<ReviewResponse, ReviewError> {
        let session_id = ctx.session_id();
        self.prune_idle_states();
        let mut metadata = self.require_complete_metadata(ctx)?;
        let Some(temp_form) = self.temp_forms.get_temp_form(session_id).await else {
            return Ok(ReviewResponse::see_other(&self.config.routes.describe));
        };
        self.ensure_generation_available()?;

        let previous = self.states.transition(session_id, ReviewState::Regenerating)?;
        if previous == ReviewState::Regenerating {
            tracing::info!(session_id = %session_id, "superseding running regeneration");
        }

        let job_id = JobId::new();
        let description = if temp_form.description.trim().is_empty() {
            metadata.form_description.clone()
        } else {
            temp_form.description.clone()
        };
        metadata.begin_regeneration(
            job_id,
            RegenerationContext {
                description: description.clone(),
                current_definition: temp_form.form_definition.clone(),
                feedback: feedback.clone(),
            },
        );
        // The job must be findable by the time the progress page polls
        if let Err(err) = metadata.save(ctx.session.as_ref()) {
            self.states.settle(session_id);
            return Err(err.into());
        }

        self.generation.regenerate_form_in_background(RegenerationRequest {
            job_id,
            description,
            feedback,
            current_definition: temp_form.form_definition.clone(),
            title: metadata.title.clone(),
            session: Arc::clone(&ctx.session),
            user_id: ctx.user_id.clone(),
        });

        tracing::info!(session_id = %session_id, job_id = %job_id, "regeneration requested");
        Ok(ReviewResponse::see_other(&self.config.routes.progress))
    }

    async fn commit(
        &self,
        ctx: &RequestContext,
        kind: CommitKind,
        explicit_key: Option<&str>,
    ) -> Result<ReviewResponse, ReviewError> {
        let session_id = ctx.session_id();
        self.prune_idle_states();

        // A retry of a finished commit arrives after the session was cleared
        if let Some(key) = explicit_key {
            if let Some(done) = self.ledger.committed(&IdempotencyKey::explicit(session_id, key)) {
                tracing::info!(session_id = %session_id, form_id = %done.form_id, "commit already done");
                return Ok(ReviewResponse::see_other(done.location));
            }
        }

        let metadata = self.require_complete_metadata(ctx)?;
        let Some(temp_form) = self.temp_forms.get_temp_form(session_id).await else {
            return Ok(ReviewResponse::see_other(&self.config.routes.describe));
        };

        let key = explicit_key.map_or_else(
            || IdempotencyKey::derived(session_id, temp_form.content_hash()),
            |key| IdempotencyKey::explicit(session_id, key),
        );
        match self.ledger.claim(&key) {
            Claim::Acquired => {}
            Claim::InFlight => return Err(ReviewError::CommitInProgress),
            Claim::Committed(done) => return Ok(ReviewResponse::see_other(done.location)),
        }

        if let Err(err) = self.states.transition(session_id, kind.state()) {
            self.ledger.release(&key);
            return Err(err.into());
        }

        match self.persist(ctx, &metadata, &temp_form).await {
            Ok(created) => {
                let location = match kind {
                    CommitKind::Approve => self.config.routes.overview_for(&created.slug),
                    CommitKind::EditManually => self.config.routes.editor_for(&created.slug),
                };

                self.temp_forms.delete_temp_form(session_id).await;
                CreationMetadata::clear(ctx.session.as_ref());
                self.ledger.complete(
                    &key,
                    CommittedForm {
                        form_id: created.id.clone(),
                        slug: created.slug.clone(),
                        location: location.clone(),
                    },
                );
                if let Err(err) = self.states.transition(session_id, ReviewState::Committed) {
                    tracing::warn!(session_id = %session_id, error = %err, "unexpected review state");
                    self.states.reset(session_id);
                }

                metrics::counter!("formgen_commits_total", "action" => kind.label()).increment(1);
                tracing::info!(
                    session_id = %session_id,
                    form_id = %created.id,
                    slug = %created.slug,
                    action = kind.label(),
                    "form committed"
                );
                Ok(ReviewResponse::see_other(location))
            }
            Err(err) => {
                self.ledger.release(&key);
                self.states.settle(session_id);
                Err(err)
            }
        }
    }

    /// Repair, validate, create the shell, populate it
    async fn persist(
        &self,
        ctx: &RequestContext,
        metadata: &CreationMetadata,
        temp_form: &TempForm,
    ) -> Result<CreatedForm, ReviewError> {
        let session_id = ctx.session_id();

        let mut definition = temp_form.form_definition.clone();
        let repairs = self.processor.process(&mut definition);
        if !repairs.is_clean() {
            tracing::debug!(session_id = %session_id, repairs = repairs.len(), "repaired before commit");
        }

        let report = self.validator.validate_form_integrity(&definition);
        if !report.is_valid {
            metrics::counter!("formgen_integrity_rejections_total").increment(1);
            tracing::warn!(
                session_id = %session_id,
                errors = report.errors.len(),
                "definition failed integrity checks; nothing persisted"
            );
            return Err(ReviewError::FormIntegrity(report));
        }

        let input = FormMetadataInput::from_creation(metadata)
            .ok_or_else(|| ReviewError::SessionState("form ownership details missing".into()))?;

        let created = self.repository.create(input, &ctx.auth_token).await?;
        tracing::debug!(session_id = %session_id, form_id = %created.id, "form shell created");

        if let Err(err) = self
            .repository
            .update_draft_form_definition(&created.id, &definition, &ctx.auth_token)
            .await
        {
            metrics::counter!("formgen_rollbacks_total").increment(1);
            tracing::warn!(
                session_id = %session_id,
                form_id = %created.id,
                error = %err,
                "populating form failed; deleting shell"
            );
            if let Err(delete_err) = self
                .repository
                .delete_form(&created.id, &ctx.auth_token)
                .await
            {
                tracing::error!(
                    session_id = %session_id,
                    form_id = %created.id,
                    error = %delete_err,
                    "rollback failed; form shell orphaned"
                );
            }
            return Err(ReviewError::Persistence(err));
        }

        Ok(created)
    }

    /// Session's temp form, rebuilt from a completed job if absent
    async fn current_temp_form(
        &self,
        ctx: &RequestContext,
        metadata: &CreationMetadata,
    ) -> Option<Arc<TempForm>> {
        let session_id = ctx.session_id();
        if let Some(temp_form) = self.temp_forms.get_temp_form(session_id).await {
            return Some(temp_form);
        }

        let job_id = metadata.ai_job_id?;
        let snapshot = self.generation.get_job_status(job_id)?;
        if snapshot.status != JobStatus::Completed || snapshot.session_id != session_id {
            return None;
        }
        let definition = snapshot.result?;

        let description = metadata
            .regeneration
            .as_ref()
            .map_or_else(|| metadata.form_description.clone(), |r| r.description.clone());
        let temp_form = match TempForm::new(
            definition,
            description,
            metadata.preferences.clone(),
            metadata.title.clone(),
            TempFormSource::Regeneration { job_id },
        ) {
            Ok(temp_form) => temp_form,
            Err(err) => {
                tracing::error!(session_id = %session_id, job_id = %job_id, error = %err, "cannot rebuild temp form");
                return None;
            }
        };

        self.temp_forms
            .store_temp_form(session_id, temp_form.clone())
            .await;
        // The flag only records that the result reached a temp form
        self.generation.mark_merged(job_id);
        tracing::info!(session_id = %session_id, job_id = %job_id, "rebuilt temp form from job result");
        Some(Arc::new(temp_form))
    }

    /// Creation metadata, cleared if unreadable
    fn load_metadata(&self, ctx: &RequestContext) -> Option<CreationMetadata> {
        match CreationMetadata::load(ctx.session.as_ref()) {
            Ok(metadata) => metadata,
            Err(err) => {
                tracing::warn!(session_id = %ctx.session_id(), error = %err, "discarding unreadable creation metadata");
                CreationMetadata::clear(ctx.session.as_ref());
                None
            }
        }
    }

    fn require_complete_metadata(
        &self,
        ctx: &RequestContext,
    ) -> Result<CreationMetadata, ReviewError> {
        let metadata = self
            .load_metadata(ctx)
            .ok_or_else(|| ReviewError::SessionState("no creation in progress".into()))?;
        let missing = metadata.missing_fields();
        if missing.is_empty() {
            Ok(metadata)
        } else {
            Err(ReviewError::SessionState(format!(
                "creation metadata incomplete: missing {}",
                missing.join(", ")
            )))
        }
    }

    /// Forget review states of sessions that went quiet
    fn prune_idle_states(&self) {
        self.states.prune(self.config.state_retention());
    }

    fn ensure_generation_available(&self) -> Result<(), ReviewError> {
        if self.generation.is_available() {
            Ok(())
        } else {
            Err(ReviewError::Configuration(
                "AI generation service unavailable".into(),
            ))
        }
    }

    async fn error_response(
        &self,
        ctx: &RequestContext,
        err: ReviewError,
        feedback: Option<String>,
    ) -> ReviewResponse {
        let session_id = ctx.session_id();

        if let ReviewError::SessionState(reason) = &err {
            tracing::info!(session_id = %session_id, reason = %reason, "restarting creation");
            CreationMetadata::clear(ctx.session.as_ref());
            self.states.reset(session_id);
            return ReviewResponse::see_other(&self.config.routes.create);
        }

        let status = err.status();
        if status >= 500 {
            tracing::error!(session_id = %session_id, status, error = %err, "review request failed");
        } else {
            tracing::warn!(session_id = %session_id, status, error = %err, "review request rejected");
        }

        if err.is_recoverable() {
            if let Some(temp_form) = self.temp_forms.get_temp_form(session_id).await {
                let title = self
                    .load_metadata(ctx)
                    .map_or_else(|| temp_form.metadata.title.clone(), |m| m.title);
                let mut view = ReviewView::of(title, temp_form.form_definition.clone());
                view.regenerated =
                    matches!(temp_form.metadata.source, TempFormSource::Regeneration { .. });
                match &err {
                    ReviewError::PayloadValidation(payload) => {
                        view.field_errors
                            .insert(payload.field().to_string(), payload.to_string());
                        view.feedback = feedback;
                    }
                    _ => {
                        view.show_retry_options = true;
                        view.error = Some(err.to_string());
                    }
                }
                return ReviewResponse::render(status, View::Review(view));
            }
        }

        ReviewResponse::render(
            status,
            View::Error(ErrorView {
                message: err.to_string(),
            }),
        )
    }
}

fn display_title(metadata: &CreationMetadata, temp_form: &TempForm) -> String {
    if metadata.title.trim().is_empty() {
        temp_form.metadata.title.clone()
    } else {
        metadata.title.clone()
    }
}
