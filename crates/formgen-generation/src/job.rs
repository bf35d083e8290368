//! Generation job tracking
//!
//! Jobs move `pending -> running -> {completed, failed}`. Status is
//! pull-based: callers take snapshots. A watch channel per job lets
//! in-process callers await completion without polling.

use crate::error::GenerationError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use formgen_definition::FormDefinition;
use formgen_session::{JobId, SessionId};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Completed or failed
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// States reachable from this one
    #[must_use]
    pub fn allowed_transitions(self) -> &'static [JobStatus] {
        match self {
            Self::Pending => &[Self::Running, Self::Failed],
            Self::Running => &[Self::Completed, Self::Failed],
            Self::Completed | Self::Failed => &[],
        }
    }

    /// Whether `to` is reachable in one step
    #[inline]
    #[must_use]
    pub fn can_transition_to(self, to: JobStatus) -> bool {
        self.allowed_transitions().contains(&to)
    }
}

/// Point-in-time view of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub session_id: SessionId,
    pub status: JobStatus,
    pub result: Option<FormDefinition>,
    pub error: Option<String>,
    /// Result has been written into the session's temp form
    pub merged: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
struct JobRecord {
    snapshot: JobSnapshot,
    notify: watch::Sender<JobStatus>,
}

/// Awaitable reference to a submitted job
#[derive(Debug, Clone)]
pub struct JobHandle {
    job_id: JobId,
    status: watch::Receiver<JobStatus>,
}

impl JobHandle {
    /// Job ID
    #[inline]
    #[must_use]
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Latest status seen by this handle
    #[must_use]
    pub fn status(&self) -> JobStatus {
        *self.status.borrow()
    }

    /// Wait until the job reaches a terminal status
    ///
    /// Returns the last known status if the job record is dropped first.
    pub async fn wait(mut self) -> JobStatus {
        let waited = self
            .status
            .wait_for(JobStatus::is_terminal)
            .await
            .map(|status| *status);
        match waited {
            Ok(status) => status,
            Err(_) => *self.status.borrow(),
        }
    }
}

/// Registry of generation jobs
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: DashMap<JobId, JobRecord>,
}

impl JobRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new pending job
    pub fn register(&self, job_id: JobId, session_id: SessionId) -> JobHandle {
        let now = Utc::now();
        let (notify, status) = watch::channel(JobStatus::Pending);
        self.jobs.insert(
            job_id,
            JobRecord {
                snapshot: JobSnapshot {
                    job_id,
                    session_id,
                    status: JobStatus::Pending,
                    result: None,
                    error: None,
                    merged: false,
                    created_at: now,
                    updated_at: now,
                },
                notify,
            },
        );
        tracing::debug!(job_id = %job_id, session_id = %session_id, "job registered");
        JobHandle { job_id, status }
    }

    /// Snapshot of a job
    #[must_use]
    pub fn snapshot(&self, job_id: JobId) -> Option<JobSnapshot> {
        self.jobs.get(&job_id).map(|r| r.snapshot.clone())
    }

    /// Handle for awaiting a job
    #[must_use]
    pub fn subscribe(&self, job_id: JobId) -> Option<JobHandle> {
        self.jobs.get(&job_id).map(|r| JobHandle {
            job_id,
            status: r.notify.subscribe(),
        })
    }

    /// `pending -> running`
    ///
    /// # Errors
    /// Unknown job or job not pending
    pub fn mark_running(&self, job_id: JobId) -> Result<(), GenerationError> {
        self.transition(job_id, JobStatus::Running, |_| {})
    }

    /// `running -> completed` with the produced definition
    ///
    /// # Errors
    /// Unknown job or job not running
    pub fn complete(
        &self,
        job_id: JobId,
        result: FormDefinition,
        merged: bool,
    ) -> Result<(), GenerationError> {
        self.transition(job_id, JobStatus::Completed, |snapshot| {
            snapshot.result = Some(result);
            snapshot.merged = merged;
        })
    }

    /// `{pending, running} -> failed`
    ///
    /// # Errors
    /// Unknown job or job already terminal
    pub fn fail(&self, job_id: JobId, error: impl Into<String>) -> Result<(), GenerationError> {
        let error = error.into();
        self.transition(job_id, JobStatus::Failed, |snapshot| {
            snapshot.error = Some(error);
        })
    }

    /// Record that a completed job's result was written into a temp form
    ///
    /// Returns `true` only for the caller that flips the flag; unknown,
    /// unfinished and already merged jobs return `false`.
    pub fn mark_merged(&self, job_id: JobId) -> bool {
        let Some(mut record) = self.jobs.get_mut(&job_id) else {
            return false;
        };
        if record.snapshot.status != JobStatus::Completed || record.snapshot.merged {
            return false;
        }
        record.snapshot.merged = true;
        record.snapshot.updated_at = Utc::now();
        true
    }

    /// Drop terminal jobs last updated more than `retention` ago
    pub fn prune(&self, retention: Duration) -> usize {
        let Ok(retention) = chrono::Duration::from_std(retention) else {
            return 0;
        };
        let cutoff = Utc::now() - retention;
        let before = self.jobs.len();
        self.jobs
            .retain(|_, r| !(r.snapshot.status.is_terminal() && r.snapshot.updated_at < cutoff));
        before.saturating_sub(self.jobs.len())
    }

    /// Number of tracked jobs
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether no jobs are tracked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn transition(
        &self,
        job_id: JobId,
        to: JobStatus,
        apply: impl FnOnce(&mut JobSnapshot),
    ) -> Result<(), GenerationError> {
        let mut record = self
            .jobs
            .get_mut(&job_id)
            .ok_or(GenerationError::UnknownJob(job_id))?;

        let from = record.snapshot.status;
        if !from.can_transition_to(to) {
            return Err(GenerationError::IllegalTransition { job_id, from, to });
        }

        record.snapshot.status = to;
        record.snapshot.updated_at = Utc::now();
        apply(&mut record.snapshot);
        record.notify.send_replace(to);

        tracing::debug!(job_id = %job_id, ?from, ?to, "job transition");
        Ok(())
    }
}
