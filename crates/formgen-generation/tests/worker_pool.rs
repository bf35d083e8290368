//! Worker pool behaviour under load and back-pressure

use async_trait::async_trait;
use formgen_definition::FormDefinition;
use formgen_generation::{
    FormGenerator, GenerationConfig, GenerationError, GenerationRequest, GenerationService,
    JobStatus, RegenerationPrompt, RegenerationRequest,
};
use formgen_session::{
    CreationMetadata, InMemorySession, JobId, RegenerationContext, SessionContext, SessionId,
    TempFormManager, TempFormSource,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Echoes the feedback back as the form name
#[derive(Debug, Default)]
struct EchoGenerator {
    gate: Option<Semaphore>,
}

impl EchoGenerator {
    fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
        }
    }
}

#[async_trait]
impl FormGenerator for EchoGenerator {
    fn is_available(&self) -> bool {
        true
    }

    async fn generate(&self, request: GenerationRequest) -> Result<FormDefinition, GenerationError> {
        Ok(FormDefinition {
            name: Some(request.title),
            ..FormDefinition::default()
        })
    }

    async fn regenerate(&self, prompt: RegenerationPrompt) -> Result<FormDefinition, GenerationError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        let mut definition = prompt.current_definition;
        definition.name = Some(prompt.feedback);
        Ok(definition)
    }
}

fn request_for(session: &Arc<InMemorySession>, feedback: &str) -> RegenerationRequest {
    let job_id = JobId::new();
    let mut metadata = CreationMetadata::new("Report a pothole", "Collect pothole reports");
    metadata.begin_regeneration(
        job_id,
        RegenerationContext {
            description: "Collect pothole reports".into(),
            current_definition: FormDefinition::default(),
            feedback: feedback.into(),
        },
    );
    metadata.save(session.as_ref()).unwrap();

    let session: Arc<dyn SessionContext> = Arc::clone(session) as Arc<dyn SessionContext>;
    RegenerationRequest {
        job_id,
        description: "Collect pothole reports".into(),
        feedback: feedback.into(),
        current_definition: FormDefinition::default(),
        title: "Report a pothole".into(),
        session,
        user_id: "user-7".into(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_sessions_each_get_their_own_result() {
    let temp_forms = TempFormManager::new(1_000);
    let service = GenerationService::start(
        Arc::new(EchoGenerator::default()),
        temp_forms.clone(),
        GenerationConfig::default().with_workers(4).with_queue_depth(128),
    );

    let sessions: Vec<_> = (0..32)
        .map(|_| Arc::new(InMemorySession::new(SessionId::new())))
        .collect();
    let handles: Vec<_> = sessions
        .iter()
        .enumerate()
        .map(|(i, session)| {
            service.regenerate_form_in_background(request_for(session, &format!("feedback {i}")))
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.wait().await, JobStatus::Completed);
    }

    for (i, session) in sessions.iter().enumerate() {
        let temp_form = temp_forms.get_temp_form(session.id()).await.expect("stored");
        assert_eq!(temp_form.form_definition.name.as_deref(), Some(format!("feedback {i}").as_str()));
        assert!(matches!(temp_form.metadata.source, TempFormSource::Regeneration { .. }));
    }
    service.shutdown().await;
}

#[tokio::test]
async fn full_queue_fails_the_job_immediately() {
    let generator = Arc::new(EchoGenerator::gated());
    let service = GenerationService::start(
        Arc::clone(&generator) as Arc<dyn FormGenerator>,
        TempFormManager::new(10),
        GenerationConfig::default().with_workers(1).with_queue_depth(1),
    );
    let session = Arc::new(InMemorySession::new(SessionId::new()));

    // Nothing has been polled yet, so the first job still occupies the queue
    let queued = service.regenerate_form_in_background(request_for(&session, "first"));
    let refused = service.regenerate_form_in_background(request_for(&session, "second"));

    let snapshot = service.get_job_status(refused.job_id()).unwrap();
    assert_eq!(snapshot.status, JobStatus::Failed);
    assert_eq!(snapshot.error.as_deref(), Some("generation queue is full (depth: 1)"));

    if let Some(gate) = &generator.gate {
        gate.add_permits(1);
    }
    assert_eq!(queued.wait().await, JobStatus::Completed);
    service.shutdown().await;
}

#[tokio::test]
async fn shutdown_drains_queued_jobs() {
    let temp_forms = TempFormManager::new(10);
    let service = GenerationService::start(
        Arc::new(EchoGenerator::default()),
        temp_forms.clone(),
        GenerationConfig::default().with_workers(2),
    );
    let session = Arc::new(InMemorySession::new(SessionId::new()));
    let handle = service.regenerate_form_in_background(request_for(&session, "drained"));
    let job_id = handle.job_id();

    service.shutdown().await;

    assert_eq!(service.get_job_status(job_id).unwrap().status, JobStatus::Completed);
    assert!(temp_forms.get_temp_form(session.id()).await.is_some());
}
