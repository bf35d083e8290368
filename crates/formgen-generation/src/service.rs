//! Generation service and regeneration worker pool
//!
//! Initial generation runs on the caller's task. Regeneration is submitted
//! to a bounded queue and executed by a fixed set of workers; the caller
//! gets a [`JobHandle`] back immediately.

use crate::error::GenerationError;
use crate::generator::{FormGenerator, GenerationRequest, RegenerationPrompt};
use crate::job::{JobHandle, JobRegistry, JobSnapshot};
use formgen_definition::{FormDefinition, ResponseProcessor};
use formgen_session::{
    CreationMetadata, FormPreferences, JobId, SessionContext, TempForm, TempFormManager,
    TempFormSource,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Worker pool configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationConfig {
    /// Number of regeneration workers
    pub workers: usize,
    /// Jobs that may wait in the queue before submissions fail
    pub queue_depth: usize,
    /// How long finished jobs stay queryable
    pub job_retention: Duration,
}

impl GenerationConfig {
    /// With worker count
    #[inline]
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// With queue depth
    #[inline]
    #[must_use]
    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth.max(1);
        self
    }

    /// With finished-job retention
    #[inline]
    #[must_use]
    pub fn with_job_retention(mut self, retention: Duration) -> Self {
        self.job_retention = retention;
        self
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_depth: 64,
            job_retention: Duration::from_secs(3600),
        }
    }
}

/// A regeneration job as submitted by the review workflow
#[derive(Debug, Clone)]
pub struct RegenerationRequest {
    pub job_id: JobId,
    pub description: String,
    pub feedback: String,
    pub current_definition: FormDefinition,
    pub title: String,
    pub session: Arc<dyn SessionContext>,
    pub user_id: String,
}

struct Shared {
    generator: Arc<dyn FormGenerator>,
    temp_forms: TempFormManager,
    registry: Arc<JobRegistry>,
    processor: ResponseProcessor,
}

/// Runs AI generation and tracks regeneration jobs
pub struct GenerationService {
    shared: Arc<Shared>,
    sender: parking_lot::Mutex<Option<mpsc::Sender<RegenerationRequest>>>,
    workers: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    config: GenerationConfig,
}

impl std::fmt::Debug for GenerationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationService")
            .field("config", &self.config)
            .field("jobs", &self.shared.registry.len())
            .finish_non_exhaustive()
    }
}

impl GenerationService {
    /// Start the service and spawn its workers
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(
        generator: Arc<dyn FormGenerator>,
        temp_forms: TempFormManager,
        config: GenerationConfig,
    ) -> Self {
        let shared = Arc::new(Shared {
            generator,
            temp_forms,
            registry: Arc::new(JobRegistry::new()),
            processor: ResponseProcessor::new(),
        });

        let (tx, rx) = mpsc::channel(config.queue_depth.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..config.workers.max(1))
            .map(|worker| tokio::spawn(worker_loop(worker, Arc::clone(&shared), Arc::clone(&rx))))
            .collect();

        tracing::info!(
            workers = config.workers,
            queue_depth = config.queue_depth,
            "generation service started"
        );

        Self {
            shared,
            sender: parking_lot::Mutex::new(Some(tx)),
            workers: parking_lot::Mutex::new(workers),
            config,
        }
    }

    /// Whether the AI provider can be used
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.shared.generator.is_available()
    }

    /// Generate and repair an initial definition
    ///
    /// # Errors
    /// Returns `GenerationError::Unavailable` if no provider is configured,
    /// or the provider's error
    pub async fn generate_form(
        &self,
        request: GenerationRequest,
    ) -> Result<FormDefinition, GenerationError> {
        if !self.is_available() {
            return Err(GenerationError::Unavailable(
                "no AI provider configured".into(),
            ));
        }
        let mut definition = self.shared.generator.generate(request).await?;
        self.shared.processor.process(&mut definition);
        Ok(definition)
    }

    /// Queue a regeneration without waiting for it
    ///
    /// The job is registered as pending before this returns, so a poll
    /// immediately afterwards always finds it. If the queue refuses the
    /// job it is marked failed; the handle still resolves.
    pub fn regenerate_form_in_background(&self, request: RegenerationRequest) -> JobHandle {
        let job_id = request.job_id;
        let session_id = request.session.id();

        let pruned = self.shared.registry.prune(self.config.job_retention);
        if pruned > 0 {
            tracing::debug!(pruned, "pruned finished generation jobs");
        }

        let handle = self.shared.registry.register(job_id, session_id);
        metrics::counter!("formgen_regenerations_submitted_total").increment(1);

        let refused = match self.sender.lock().as_ref() {
            Some(tx) => match tx.try_send(request) {
                Ok(()) => None,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    Some(GenerationError::QueueFull(self.config.queue_depth))
                }
                Err(mpsc::error::TrySendError::Closed(_)) => Some(GenerationError::QueueClosed),
            },
            None => Some(GenerationError::QueueClosed),
        };

        if let Some(err) = refused {
            tracing::error!(
                job_id = %job_id,
                session_id = %session_id,
                error = %err,
                "regeneration job not queued"
            );
            metrics::counter!("formgen_jobs_failed_total").increment(1);
            if let Err(e) = self.shared.registry.fail(job_id, err.to_string()) {
                tracing::warn!(job_id = %job_id, error = %e, "could not record queue failure");
            }
        } else {
            tracing::info!(job_id = %job_id, session_id = %session_id, "regeneration job queued");
        }

        handle
    }

    /// Snapshot of a job's status
    #[must_use]
    pub fn get_job_status(&self, job_id: JobId) -> Option<JobSnapshot> {
        self.shared.registry.snapshot(job_id)
    }

    /// Record that a completed job's result was written into a temp form
    ///
    /// Returns `true` only the first time for a job.
    pub fn mark_merged(&self, job_id: JobId) -> bool {
        self.shared.registry.mark_merged(job_id)
    }

    /// Job registry
    #[must_use]
    pub fn registry(&self) -> &JobRegistry {
        &self.shared.registry
    }

    /// Temp form store the workers write into
    #[must_use]
    pub fn temp_forms(&self) -> &TempFormManager {
        &self.shared.temp_forms
    }

    /// Stop accepting jobs and wait for queued ones to finish
    pub async fn shutdown(&self) {
        drop(self.sender.lock().take());
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::warn!(error = %e, "generation worker ended abnormally");
            }
        }
        tracing::info!("generation service stopped");
    }
}

async fn worker_loop(
    worker: usize,
    shared: Arc<Shared>,
    queue: Arc<Mutex<mpsc::Receiver<RegenerationRequest>>>,
) {
    loop {
        let next = queue.lock().await.recv().await;
        let Some(request) = next else {
            break;
        };
        tracing::debug!(worker, job_id = %request.job_id, "worker picked up job");
        shared.run_regeneration(request).await;
    }
    tracing::debug!(worker, "generation worker exiting");
}

impl Shared {
    async fn run_regeneration(&self, request: RegenerationRequest) {
        let job_id = request.job_id;
        let session_id = request.session.id();

        if let Err(e) = self.registry.mark_running(job_id) {
            tracing::warn!(job_id = %job_id, error = %e, "skipping job");
            return;
        }

        let prompt = RegenerationPrompt {
            description: request.description.clone(),
            feedback: request.feedback.clone(),
            current_definition: request.current_definition.clone(),
            title: request.title.clone(),
            user_id: request.user_id.clone(),
        };

        match self.generator.regenerate(prompt).await {
            Ok(mut definition) => {
                self.processor.process(&mut definition);
                if let Err(e) = self.finish(&request, definition).await {
                    self.record_failure(job_id, session_id, &e);
                }
            }
            Err(e) => self.record_failure(job_id, session_id, &e),
        }
    }

    async fn finish(
        &self,
        request: &RegenerationRequest,
        definition: FormDefinition,
    ) -> Result<(), GenerationError> {
        let job_id = request.job_id;
        let session_id = request.session.id();

        let preferences = match current_preferences(request.session.as_ref(), job_id) {
            Some(preferences) => preferences,
            None => {
                tracing::info!(
                    job_id = %job_id,
                    session_id = %session_id,
                    "regeneration superseded; result not stored"
                );
                self.registry.complete(job_id, definition, false)?;
                metrics::counter!("formgen_jobs_completed_total").increment(1);
                return Ok(());
            }
        };

        let temp_form = TempForm::new(
            definition.clone(),
            request.description.clone(),
            preferences,
            request.title.clone(),
            TempFormSource::Regeneration { job_id },
        )
        .map_err(|e| GenerationError::InvalidOutput(e.to_string()))?;

        self.temp_forms.store_temp_form(session_id, temp_form).await;
        self.registry.complete(job_id, definition, true)?;
        metrics::counter!("formgen_jobs_completed_total").increment(1);

        tracing::info!(job_id = %job_id, session_id = %session_id, "regeneration completed");
        Ok(())
    }

    fn record_failure(&self, job_id: JobId, session_id: formgen_session::SessionId, err: &GenerationError) {
        tracing::error!(
            job_id = %job_id,
            session_id = %session_id,
            error = %err,
            retryable = err.is_retryable(),
            "regeneration failed"
        );
        metrics::counter!("formgen_jobs_failed_total").increment(1);
        if let Err(e) = self.registry.fail(job_id, err.to_string()) {
            tracing::warn!(job_id = %job_id, error = %e, "could not record job failure");
        }
    }
}

/// Preferences of the flow still waiting on `job_id`, if any
fn current_preferences(session: &dyn SessionContext, job_id: JobId) -> Option<FormPreferences> {
    match CreationMetadata::load(session) {
        Ok(Some(metadata)) if metadata.is_current_job(job_id) => Some(metadata.preferences),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(job_id = %job_id, error = %e, "unreadable creation metadata");
            None
        }
    }
}
