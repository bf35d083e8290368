//! Testing utilities for the Formgen workspace
//!
//! Shared fixtures, a recording forms repository with failure injection,
//! and a scripted AI generator.

#![allow(missing_docs)]

use async_trait::async_trait;
use formgen_core::{
    CreatedForm, FormMetadataInput, FormsRepository, InMemoryFormsRepository, RepositoryError,
    RequestContext, ReviewWorkflow, StoredForm, WorkflowConfig,
};
use formgen_definition::FormDefinition;
use formgen_generation::{FormGenerator, GenerationError, GenerationRequest, RegenerationPrompt};
use formgen_session::{
    CreationMetadata, FormPreferences, InMemorySession, SessionContext, SessionId, TempForm,
    TempFormSource,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Semaphore;

// Fixtures

/// A definition that passes the integrity validator as is
pub fn valid_definition() -> FormDefinition {
    FormDefinition::from_json_str(
        r#"{
            "name": "Register a dog",
            "engine": "V2",
            "schema": 2,
            "startPage": "/dog-name",
            "pages": [
                {"id": "p1", "path": "/dog-name", "title": "Dog name",
                 "components": [{"id": "c1", "type": "TextField", "name": "dogName", "title": "What is your dog called?"}],
                 "next": [{"path": "/dog-age"}]},
                {"id": "p2", "path": "/dog-age", "title": "Dog age",
                 "components": [{"id": "c2", "type": "NumberField", "name": "dogAge", "title": "How old is your dog?"}],
                 "next": [{"path": "/puppy-details", "condition": "isPuppy"}, {"path": "/summary"}]},
                {"id": "p3", "path": "/puppy-details", "title": "Puppy details",
                 "components": [{"id": "c3", "type": "DatePartsField", "name": "birthDate", "title": "Date of birth"}],
                 "next": [{"path": "/summary"}]},
                {"id": "p4", "path": "/summary", "title": "Summary", "components": []}
            ],
            "conditions": [
                {"id": "isPuppy", "displayName": "Is a puppy",
                 "items": [{"id": "i1", "componentId": "c2", "operator": "is less than",
                            "value": {"type": "NumberValue", "value": 1}}]}
            ],
            "lists": [],
            "sections": []
        }"#,
    )
    .expect("fixture is valid JSON")
}

/// Raw AI output the processor has to repair before it validates
pub fn messy_ai_output() -> FormDefinition {
    FormDefinition::from_json_str(
        r#"{
            "pages": [
                {"title": "Dog name",
                 "components": [{"type": "TextField", "name": "dogName"}],
                 "next": [{"path": "Dog Age"}]},
                {"path": "dog-age", "title": "Dog age",
                 "components": [{"type": "NumberField", "name": "dogAge"}],
                 "next": [{"path": "/dog-name", "condition": "Is a puppy"}]}
            ],
            "conditions": [
                {"name": "Is a puppy",
                 "items": [{"componentId": "dogAge", "operator": "<", "value": 1}]}
            ]
        }"#,
    )
    .expect("fixture is valid JSON")
}

/// A definition no repair can make valid
pub fn broken_definition() -> FormDefinition {
    let mut def = valid_definition();
    def.pages[0].next[0].path = "/does-not-exist".into();
    def
}

/// Creation metadata with every ownership field set
pub fn complete_metadata() -> CreationMetadata {
    CreationMetadata::new("Register a dog", "A form for registering a dog with the council")
        .with_team("Defra", "Forms team", "forms@example.gov.uk")
}

/// A fresh in-memory session
pub fn new_session() -> Arc<InMemorySession> {
    Arc::new(InMemorySession::new(SessionId::new()))
}

/// Request context over a new session holding `metadata`
pub fn context_with(metadata: Option<&CreationMetadata>) -> RequestContext {
    let session = new_session();
    if let Some(metadata) = metadata {
        metadata.save(session.as_ref()).expect("metadata encodes");
    }
    let session: Arc<dyn SessionContext> = session;
    RequestContext::new(session, "user-1", "auth-token")
}

/// Store `definition` as the context's temp form
pub async fn seed_temp_form(workflow: &ReviewWorkflow, ctx: &RequestContext, definition: FormDefinition) {
    let temp_form = TempForm::new(
        definition,
        "A form for registering a dog with the council",
        FormPreferences::default(),
        "Register a dog",
        TempFormSource::Initial,
    )
    .expect("fixture hashes");
    workflow
        .temp_forms()
        .store_temp_form(ctx.session_id(), temp_form)
        .await;
}

/// Workflow wired to a recording repository and scripted generator
pub fn workflow_with(
    generator: Arc<ScriptedGenerator>,
    repository: Arc<RecordingFormsRepository>,
) -> ReviewWorkflow {
    workflow_with_config(WorkflowConfig::new(), generator, repository)
}

/// As [`workflow_with`], under `config`
pub fn workflow_with_config(
    config: WorkflowConfig,
    generator: Arc<ScriptedGenerator>,
    repository: Arc<RecordingFormsRepository>,
) -> ReviewWorkflow {
    ReviewWorkflow::start(config, generator, repository).expect("fixture config is valid")
}

// Recording repository

/// A repository call, as observed
#[derive(Debug, Clone, PartialEq)]
pub enum RepoCall {
    Create { title: String },
    Update { form_id: String, definition: FormDefinition },
    Delete { form_id: String },
}

/// Which repository calls fail
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailurePlan {
    pub create: bool,
    pub update: bool,
    pub delete: bool,
}

/// In-memory repository that records every call and can be told to fail
#[derive(Debug, Default)]
pub struct RecordingFormsRepository {
    inner: InMemoryFormsRepository,
    calls: Mutex<Vec<RepoCall>>,
    failures: Mutex<FailurePlan>,
}

impl RecordingFormsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_update() -> Self {
        let repo = Self::new();
        repo.set_failures(FailurePlan {
            update: true,
            ..FailurePlan::default()
        });
        repo
    }

    pub fn set_failures(&self, plan: FailurePlan) {
        *self.failures.lock() = plan;
    }

    pub fn calls(&self) -> Vec<RepoCall> {
        self.calls.lock().clone()
    }

    pub fn create_calls(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, RepoCall::Create { .. })).count()
    }

    pub fn update_calls(&self) -> Vec<(String, FormDefinition)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RepoCall::Update { form_id, definition } => Some((form_id, definition)),
                _ => None,
            })
            .collect()
    }

    pub fn deleted_ids(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RepoCall::Delete { form_id } => Some(form_id),
                _ => None,
            })
            .collect()
    }

    /// Forms left in the repository
    pub fn stored(&self, form_id: &str) -> Option<StoredForm> {
        self.inner.get(form_id)
    }

    pub fn form_count(&self) -> usize {
        self.inner.len()
    }

    fn record(&self, call: RepoCall) {
        self.calls.lock().push(call);
    }

    fn injected(&self) -> RepositoryError {
        RepositoryError::Rejected {
            status: 503,
            message: "injected failure".into(),
        }
    }
}

#[async_trait]
impl FormsRepository for RecordingFormsRepository {
    async fn create(
        &self,
        metadata: FormMetadataInput,
        auth_token: &str,
    ) -> Result<CreatedForm, RepositoryError> {
        self.record(RepoCall::Create {
            title: metadata.title.clone(),
        });
        if self.failures.lock().create {
            return Err(self.injected());
        }
        self.inner.create(metadata, auth_token).await
    }

    async fn update_draft_form_definition(
        &self,
        form_id: &str,
        definition: &FormDefinition,
        auth_token: &str,
    ) -> Result<(), RepositoryError> {
        self.record(RepoCall::Update {
            form_id: form_id.to_string(),
            definition: definition.clone(),
        });
        if self.failures.lock().update {
            return Err(self.injected());
        }
        self.inner
            .update_draft_form_definition(form_id, definition, auth_token)
            .await
    }

    async fn delete_form(&self, form_id: &str, auth_token: &str) -> Result<(), RepositoryError> {
        self.record(RepoCall::Delete {
            form_id: form_id.to_string(),
        });
        if self.failures.lock().delete {
            return Err(self.injected());
        }
        self.inner.delete_form(form_id, auth_token).await
    }
}

// Scripted generator

/// Generator answering from a script, recording every prompt
///
/// When paused, calls wait until [`ScriptedGenerator::release`] lets them
/// through.
#[derive(Debug)]
pub struct ScriptedGenerator {
    fallback: FormDefinition,
    script: Mutex<VecDeque<Result<FormDefinition, GenerationError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
    prompts: Mutex<Vec<RegenerationPrompt>>,
    gate: Option<Semaphore>,
    available: bool,
}

impl ScriptedGenerator {
    /// Always answer with `fallback` once the script runs out
    pub fn new(fallback: FormDefinition) -> Self {
        Self {
            fallback,
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
            gate: None,
            available: true,
        }
    }

    /// Hold every call until released
    #[must_use]
    pub fn paused(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    /// Report the provider as not configured
    #[must_use]
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Queue the next answer
    pub fn push(&self, answer: Result<FormDefinition, GenerationError>) {
        self.script.lock().push_back(answer);
    }

    /// Let `n` held calls proceed
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }

    pub fn prompts(&self) -> Vec<RegenerationPrompt> {
        self.prompts.lock().clone()
    }

    async fn answer(&self) -> Result<FormDefinition, GenerationError> {
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| GenerationError::Provider(e.to_string()))?
                .forget();
        }
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

#[async_trait]
impl FormGenerator for ScriptedGenerator {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn generate(&self, request: GenerationRequest) -> Result<FormDefinition, GenerationError> {
        self.requests.lock().push(request);
        self.answer().await
    }

    async fn regenerate(
        &self,
        prompt: RegenerationPrompt,
    ) -> Result<FormDefinition, GenerationError> {
        self.prompts.lock().push(prompt);
        self.answer().await
    }
}
