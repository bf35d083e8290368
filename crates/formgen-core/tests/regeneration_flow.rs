//! Regeneration jobs, progress polling and duplicate commits

use formgen_core::{IdempotencyKey, RequestContext, ReviewState, ReviewWorkflow, WorkflowConfig};
use formgen_generation::{GenerationError, JobStatus};
use formgen_session::{CreationMetadata, JobId, TempFormSource};
use formgen_test_utils::{
    complete_metadata, context_with, seed_temp_form, valid_definition, workflow_with,
    workflow_with_config, RecordingFormsRepository, ScriptedGenerator,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn renamed(name: &str) -> formgen_definition::FormDefinition {
    let mut def = valid_definition();
    def.name = Some(name.to_string());
    def
}

async fn request_regeneration(workflow: &ReviewWorkflow, ctx: &RequestContext) -> JobId {
    let response = workflow
        .post_review(ctx, &json!({"action": "regenerate", "feedback": "Ask for the breed as well"}))
        .await;
    assert_eq!(response.location(), Some("/create/ai-progress"));
    CreationMetadata::load(ctx.session.as_ref())
        .unwrap()
        .and_then(|m| m.ai_job_id)
        .expect("job recorded")
}

async fn wait_for(workflow: &ReviewWorkflow, job_id: JobId) -> JobStatus {
    workflow
        .generation()
        .registry()
        .subscribe(job_id)
        .expect("job tracked")
        .wait()
        .await
}

#[tokio::test]
async fn completed_job_flows_back_to_review() {
    let generator = Arc::new(ScriptedGenerator::new(valid_definition()));
    generator.push(Ok(renamed("Register a dog and its breed")));
    let workflow = workflow_with(Arc::clone(&generator), Arc::new(RecordingFormsRepository::new()));
    let ctx = context_with(Some(&complete_metadata()));
    seed_temp_form(&workflow, &ctx, valid_definition()).await;

    let job_id = request_regeneration(&workflow, &ctx).await;
    assert_eq!(workflow.states().current(ctx.session_id()), ReviewState::Regenerating);
    assert_eq!(wait_for(&workflow, job_id).await, JobStatus::Completed);

    let progress = workflow.get_progress(&ctx).await;
    assert_eq!(progress.status(), 302);
    assert_eq!(progress.location(), Some("/create/ai-review?regenerated=true"));
    assert_eq!(workflow.states().current(ctx.session_id()), ReviewState::AwaitingReview);

    let review = workflow.get_review(&ctx, true).await;
    let view = review.review().expect("review view");
    assert!(view.regenerated);
    assert_eq!(view.definition.name.as_deref(), Some("Register a dog and its breed"));

    let temp_form = workflow.temp_forms().get_temp_form(ctx.session_id()).await.unwrap();
    assert_eq!(temp_form.metadata.source, TempFormSource::Regeneration { job_id });
    assert!(workflow.generation().get_job_status(job_id).unwrap().merged);
}

#[tokio::test]
async fn pending_job_renders_progress() {
    let generator = Arc::new(ScriptedGenerator::new(valid_definition()).paused());
    let workflow = workflow_with(Arc::clone(&generator), Arc::new(RecordingFormsRepository::new()));
    let ctx = context_with(Some(&complete_metadata()));
    seed_temp_form(&workflow, &ctx, valid_definition()).await;

    let job_id = request_regeneration(&workflow, &ctx).await;
    let progress = workflow.get_progress(&ctx).await;

    assert_eq!(progress.status(), 200);
    let view = progress.progress().expect("progress view");
    assert_eq!(view.job_id, job_id);
    assert!(!view.status.is_terminal());
    assert!(view.error.is_none());

    generator.release(1);
    wait_for(&workflow, job_id).await;
}

#[tokio::test]
async fn failed_job_keeps_previous_form() {
    let generator = Arc::new(ScriptedGenerator::new(valid_definition()));
    generator.push(Err(GenerationError::Provider("model timed out".into())));
    let workflow = workflow_with(Arc::clone(&generator), Arc::new(RecordingFormsRepository::new()));
    let ctx = context_with(Some(&complete_metadata()));
    seed_temp_form(&workflow, &ctx, valid_definition()).await;

    let job_id = request_regeneration(&workflow, &ctx).await;
    assert_eq!(wait_for(&workflow, job_id).await, JobStatus::Failed);

    let progress = workflow.get_progress(&ctx).await;
    assert_eq!(progress.status(), 200);
    let view = progress.progress().unwrap();
    assert_eq!(view.status, JobStatus::Failed);
    assert!(view.error.is_some());

    let temp_form = workflow.temp_forms().get_temp_form(ctx.session_id()).await.unwrap();
    assert_eq!(temp_form.metadata.source, TempFormSource::Initial);
    assert_eq!(workflow.states().current(ctx.session_id()), ReviewState::AwaitingReview);
}

#[tokio::test]
async fn latest_regeneration_wins() {
    let generator = Arc::new(ScriptedGenerator::new(valid_definition()).paused());
    let workflow = workflow_with(Arc::clone(&generator), Arc::new(RecordingFormsRepository::new()));
    let ctx = context_with(Some(&complete_metadata()));
    seed_temp_form(&workflow, &ctx, valid_definition()).await;

    let first = request_regeneration(&workflow, &ctx).await;
    let second = request_regeneration(&workflow, &ctx).await;
    assert_ne!(first, second);

    generator.release(2);
    assert_eq!(wait_for(&workflow, first).await, JobStatus::Completed);
    assert_eq!(wait_for(&workflow, second).await, JobStatus::Completed);

    let registry = workflow.generation().registry();
    assert!(!registry.snapshot(first).unwrap().merged);
    assert!(registry.snapshot(second).unwrap().merged);

    let temp_form = workflow.temp_forms().get_temp_form(ctx.session_id()).await.unwrap();
    assert_eq!(temp_form.metadata.source, TempFormSource::Regeneration { job_id: second });
}

#[tokio::test]
async fn evicted_temp_form_is_rebuilt_from_completed_job() {
    let generator = Arc::new(ScriptedGenerator::new(valid_definition()));
    generator.push(Ok(renamed("Register a dog and its breed")));
    let workflow = workflow_with(Arc::clone(&generator), Arc::new(RecordingFormsRepository::new()));
    let ctx = context_with(Some(&complete_metadata()));
    seed_temp_form(&workflow, &ctx, valid_definition()).await;

    let job_id = request_regeneration(&workflow, &ctx).await;
    assert_eq!(wait_for(&workflow, job_id).await, JobStatus::Completed);
    assert!(workflow.generation().get_job_status(job_id).unwrap().merged);
    workflow.temp_forms().delete_temp_form(ctx.session_id()).await;

    let review = workflow.get_review(&ctx, true).await;
    assert_eq!(review.status(), 200);
    let view = review.review().expect("review view");
    assert_eq!(view.definition.name.as_deref(), Some("Register a dog and its breed"));

    let rebuilt = workflow.temp_forms().get_temp_form(ctx.session_id()).await.unwrap();
    assert_eq!(rebuilt.metadata.source, TempFormSource::Regeneration { job_id });
    assert_eq!(rebuilt.description, "A form for registering a dog with the council");
}

#[tokio::test]
async fn expired_temp_form_is_rebuilt_from_completed_job() {
    let generator = Arc::new(ScriptedGenerator::new(valid_definition()));
    generator.push(Ok(renamed("Register a dog and its breed")));
    let config = WorkflowConfig::new().with_temp_form_ttl(Duration::from_secs(1));
    let workflow = workflow_with_config(
        config,
        Arc::clone(&generator),
        Arc::new(RecordingFormsRepository::new()),
    );
    let ctx = context_with(Some(&complete_metadata()));
    seed_temp_form(&workflow, &ctx, valid_definition()).await;

    let job_id = request_regeneration(&workflow, &ctx).await;
    assert_eq!(wait_for(&workflow, job_id).await, JobStatus::Completed);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(workflow.temp_forms().get_temp_form(ctx.session_id()).await.is_none());

    let review = workflow.get_review(&ctx, true).await;
    assert_eq!(review.status(), 200);
    assert_eq!(
        review.review().unwrap().definition.name.as_deref(),
        Some("Register a dog and its breed")
    );

    // The rebuilt form commits like any other
    let approve = workflow.post_review(&ctx, &json!({"action": "approve"})).await;
    assert_eq!(approve.status(), 303);
}

#[tokio::test]
async fn rebuild_uses_only_the_current_job() {
    let generator = Arc::new(ScriptedGenerator::new(valid_definition()).paused());
    let workflow = workflow_with(Arc::clone(&generator), Arc::new(RecordingFormsRepository::new()));
    let ctx = context_with(Some(&complete_metadata()));
    seed_temp_form(&workflow, &ctx, valid_definition()).await;

    let first = request_regeneration(&workflow, &ctx).await;
    let second = request_regeneration(&workflow, &ctx).await;
    generator.release(2);
    assert_eq!(wait_for(&workflow, first).await, JobStatus::Completed);
    assert_eq!(wait_for(&workflow, second).await, JobStatus::Completed);
    workflow.temp_forms().delete_temp_form(ctx.session_id()).await;

    let review = workflow.get_review(&ctx, false).await;
    assert_eq!(review.status(), 200);

    let rebuilt = workflow.temp_forms().get_temp_form(ctx.session_id()).await.unwrap();
    assert_eq!(rebuilt.metadata.source, TempFormSource::Regeneration { job_id: second });
    assert!(!workflow.generation().get_job_status(first).unwrap().merged);
}

#[tokio::test]
async fn idle_review_states_are_pruned() {
    let generator = Arc::new(ScriptedGenerator::new(valid_definition()).paused());
    let mut config = WorkflowConfig::new();
    config.state_retention_secs = 0;
    let workflow = workflow_with_config(
        config,
        Arc::clone(&generator),
        Arc::new(RecordingFormsRepository::new()),
    );
    let gone = context_with(Some(&complete_metadata()));
    let active = context_with(Some(&complete_metadata()));
    seed_temp_form(&workflow, &gone, valid_definition()).await;
    seed_temp_form(&workflow, &active, valid_definition()).await;

    let first = request_regeneration(&workflow, &gone).await;
    assert_eq!(workflow.states().current(gone.session_id()), ReviewState::Regenerating);

    let second = request_regeneration(&workflow, &active).await;
    assert_eq!(workflow.states().len(), 1);
    assert_eq!(workflow.states().current(gone.session_id()), ReviewState::AwaitingReview);
    assert_eq!(workflow.states().current(active.session_id()), ReviewState::Regenerating);

    generator.release(2);
    wait_for(&workflow, first).await;
    wait_for(&workflow, second).await;
}

#[tokio::test]
async fn resubmitted_approve_redirects_to_committed_form() {
    let repo = Arc::new(RecordingFormsRepository::new());
    let workflow = workflow_with(Arc::new(ScriptedGenerator::new(valid_definition())), Arc::clone(&repo));
    let ctx = context_with(Some(&complete_metadata()));
    seed_temp_form(&workflow, &ctx, valid_definition()).await;

    let body = json!({"action": "approve", "idempotencyKey": "submit-1"});
    let first = workflow.post_review(&ctx, &body).await;
    let again = workflow.post_review(&ctx, &body).await;

    assert_eq!(first.status(), 303);
    assert_eq!(again.status(), 303);
    assert_eq!(again.location(), first.location());
    assert_eq!(repo.create_calls(), 1);
}

#[tokio::test]
async fn approve_while_commit_in_flight_conflicts() {
    let repo = Arc::new(RecordingFormsRepository::new());
    let workflow = workflow_with(Arc::new(ScriptedGenerator::new(valid_definition())), Arc::clone(&repo));
    let ctx = context_with(Some(&complete_metadata()));
    seed_temp_form(&workflow, &ctx, valid_definition()).await;

    let temp_form = workflow.temp_forms().get_temp_form(ctx.session_id()).await.unwrap();
    let key = IdempotencyKey::derived(ctx.session_id(), temp_form.content_hash());
    workflow.ledger().claim(&key);

    let response = workflow.post_review(&ctx, &json!({"action": "approve"})).await;

    assert_eq!(response.status(), 409);
    assert!(response.review().unwrap().show_retry_options);
    assert!(repo.calls().is_empty());

    workflow.ledger().release(&key);
    let retry = workflow.post_review(&ctx, &json!({"action": "approve"})).await;
    assert_eq!(retry.status(), 303);
}

#[tokio::test]
async fn commit_is_refused_while_regenerating() {
    let generator = Arc::new(ScriptedGenerator::new(valid_definition()).paused());
    let repo = Arc::new(RecordingFormsRepository::new());
    let workflow = workflow_with(Arc::clone(&generator), Arc::clone(&repo));
    let ctx = context_with(Some(&complete_metadata()));
    seed_temp_form(&workflow, &ctx, valid_definition()).await;

    let job_id = request_regeneration(&workflow, &ctx).await;
    let response = workflow.post_review(&ctx, &json!({"action": "approve"})).await;

    assert_eq!(response.status(), 409);
    assert!(repo.calls().is_empty());

    generator.release(1);
    wait_for(&workflow, job_id).await;
}
