//! `formgen simulate`
//!
//! Drives one creation through generate, review, optional regenerate and
//! approve, printing every response the workflow produces.

use crate::load_definition;
use async_trait::async_trait;
use clap::Args;
use formgen_core::{
    CreatedForm, FormMetadataInput, FormsRepository, InMemoryFormsRepository, RepositoryError,
    RequestContext, ReviewResponse, ReviewWorkflow, View, WorkflowConfig,
};
use formgen_definition::FormDefinition;
use formgen_generation::StaticFormGenerator;
use formgen_session::{CreationMetadata, SessionContext, SessionStore};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const JOB_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Args)]
pub(crate) struct SimulateArgs {
    /// Definition the stand-in generator answers with
    #[arg(long, value_name = "FILE")]
    definition: PathBuf,

    /// Workflow configuration (TOML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Make populating the new form fail, forcing a rollback
    #[arg(long)]
    fail_update: bool,

    /// Regenerate once with this feedback before approving
    #[arg(long)]
    feedback: Option<String>,

    /// Print full responses as JSON
    #[arg(long)]
    json: bool,
}

/// Repository whose draft update always fails
#[derive(Debug, Default)]
struct FailingUpdateRepository {
    inner: InMemoryFormsRepository,
}

#[async_trait]
impl FormsRepository for FailingUpdateRepository {
    async fn create(
        &self,
        metadata: FormMetadataInput,
        auth_token: &str,
    ) -> Result<CreatedForm, RepositoryError> {
        self.inner.create(metadata, auth_token).await
    }

    async fn update_draft_form_definition(
        &self,
        _form_id: &str,
        _definition: &FormDefinition,
        _auth_token: &str,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("simulated outage".into()))
    }

    async fn delete_form(&self, form_id: &str, auth_token: &str) -> Result<(), RepositoryError> {
        self.inner.delete_form(form_id, auth_token).await
    }
}

/// What a simulation ended with
#[derive(Debug)]
pub(crate) struct Outcome {
    pub(crate) last: ReviewResponse,
    pub(crate) forms_stored: usize,
    pub(crate) passed: bool,
}

pub(crate) async fn run(args: &SimulateArgs) -> anyhow::Result<bool> {
    let definition = load_definition(&args.definition)?;
    let config = match &args.config {
        Some(path) => WorkflowConfig::load(path)?,
        None => WorkflowConfig::new(),
    };
    let outcome = simulate(
        definition,
        config,
        args.fail_update,
        args.feedback.as_deref(),
        args.json,
    )
    .await?;

    println!(
        "outcome: {} (final status {}, {} form(s) stored)",
        if outcome.passed { "ok" } else { "unexpected" },
        outcome.last.status(),
        outcome.forms_stored
    );
    Ok(outcome.passed)
}

pub(crate) async fn simulate(
    definition: FormDefinition,
    config: WorkflowConfig,
    fail_update: bool,
    feedback: Option<&str>,
    json: bool,
) -> anyhow::Result<Outcome> {
    let in_memory = Arc::new(InMemoryFormsRepository::new());
    let failing = Arc::new(FailingUpdateRepository::default());
    let repository: Arc<dyn FormsRepository> = if fail_update {
        Arc::clone(&failing) as Arc<dyn FormsRepository>
    } else {
        Arc::clone(&in_memory) as Arc<dyn FormsRepository>
    };

    let title = definition
        .name
        .clone()
        .unwrap_or_else(|| "Simulated form".to_string());
    let generator = Arc::new(StaticFormGenerator::new(definition));
    let workflow = ReviewWorkflow::start(config, generator, repository)?;

    let sessions = SessionStore::new();
    let session = sessions.create();
    CreationMetadata::new(title, "Simulated creation from the command line")
        .with_team("Simulation", "Local team", "local@example.gov.uk")
        .save(session.as_ref())?;
    let session: Arc<dyn SessionContext> = session;
    let ctx = RequestContext::new(session, "cli", "local-token");
    tracing::info!(session_id = %ctx.session_id(), "simulation started");

    report("generate", &workflow.generate_initial(&ctx).await, json)?;
    report("review", &workflow.get_review(&ctx, false).await, json)?;

    if let Some(feedback) = feedback {
        let response = workflow
            .post_review(&ctx, &json!({"action": "regenerate", "feedback": feedback}))
            .await;
        report("regenerate", &response, json)?;

        if let Some(job_id) = CreationMetadata::load(ctx.session.as_ref())?.and_then(|m| m.ai_job_id) {
            if let Some(handle) = workflow.generation().registry().subscribe(job_id) {
                let status = tokio::time::timeout(JOB_TIMEOUT, handle.wait()).await?;
                tracing::info!(job_id = %job_id, status = ?status, "regeneration finished");
            }
            report("progress", &workflow.get_progress(&ctx).await, json)?;
            report("review", &workflow.get_review(&ctx, true).await, json)?;
        }
    }

    let last = workflow.post_review(&ctx, &json!({"action": "approve"})).await;
    report("approve", &last, json)?;
    workflow.generation().shutdown().await;

    let forms_stored = if fail_update {
        failing.inner.len()
    } else {
        in_memory.len()
    };
    let passed = if fail_update {
        last.status() == 400 && forms_stored == 0
    } else {
        last.is_redirect() && forms_stored == 1
    };

    Ok(Outcome {
        last,
        forms_stored,
        passed,
    })
}

fn report(step: &str, response: &ReviewResponse, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{step}: {}", serde_json::to_string_pretty(response)?);
        return Ok(());
    }

    match response {
        ReviewResponse::Redirect { status, location } => {
            println!("{step}: {status} -> {location}");
        }
        ReviewResponse::Render { status, view } => match view {
            View::Review(review) => {
                println!(
                    "{step}: {status} review '{}' ({} pages, {} components{})",
                    review.title,
                    review.stats.page_count,
                    review.stats.component_count,
                    if review.regenerated { ", regenerated" } else { "" }
                );
                if let Some(error) = &review.error {
                    println!("    error: {error}");
                }
                for (field, message) in &review.field_errors {
                    println!("    {field}: {message}");
                }
            }
            View::Progress(progress) => {
                println!("{step}: {status} job {} {:?}", progress.job_id, progress.status);
            }
            View::Error(error) => println!("{step}: {status} error: {}", error.message),
        },
    }
    Ok(())
}
