//! Job registry and per-job transition functions
//!
//! Jobs are only mutated through the methods here, always while the caller
//! holds the registry lock. Every transition names the attempt it belongs to;
//! a result from an attempt that is no longer current is rejected, which is
//! how late results from cancelled or superseded attempts get dropped.

use crate::key::JobKey;
use crate::store::ArtifactHandle;
use crate::types::{AttemptRecord, JobFailure, JobState, JobStatus};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

/// Process-unique identity of one attempt
///
/// The user-visible `attempt` counter restarts at 1 when a job is removed and
/// requested again, so it cannot tell two attempts apart on its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct AttemptId(pub(crate) u64);

/// Everything a spawned attempt needs to report back
#[derive(Clone, Debug)]
pub(crate) struct AttemptTicket {
    pub(crate) key: JobKey,
    pub(crate) attempt: u32,
    pub(crate) id: AttemptId,
    pub(crate) cancel: CancellationToken,
}

/// A job entity; owned by the registry, never handed out by reference
#[derive(Debug)]
pub(crate) struct Job {
    pub(crate) key: JobKey,
    pub(crate) state: JobState,
    pub(crate) attempt: u32,
    attempt_id: AttemptId,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) artifact: Option<ArtifactHandle>,
    pub(crate) error: Option<JobFailure>,
    pub(crate) history: Vec<AttemptRecord>,
    pub(crate) waiters: Arc<AtomicUsize>,
    pub(crate) cancel: CancellationToken,
}

impl Job {
    /// A fresh job with its first attempt in `Pending`
    pub(crate) fn pending(key: JobKey, id: AttemptId, cancel: CancellationToken) -> Self {
        let now = Utc::now();
        Self {
            key,
            state: JobState::Pending,
            attempt: 1,
            attempt_id: id,
            created_at: now,
            updated_at: now,
            artifact: None,
            error: None,
            history: vec![AttemptRecord {
                attempt: 1,
                started_at: now,
                finished_at: None,
                outcome: None,
                extractor_calls: 0,
                error: None,
                expired_at: None,
            }],
            waiters: Arc::new(AtomicUsize::new(0)),
            cancel,
        }
    }

    /// A job for an artifact the store already holds; no extraction is run
    pub(crate) fn adopted(key: JobKey, id: AttemptId, handle: ArtifactHandle) -> Self {
        let now = Utc::now();
        Self {
            key,
            state: JobState::Completed,
            attempt: 1,
            attempt_id: id,
            created_at: now,
            updated_at: now,
            history: vec![AttemptRecord {
                attempt: 1,
                started_at: handle.created_at,
                finished_at: Some(handle.created_at),
                outcome: Some(JobState::Completed),
                extractor_calls: 0,
                error: None,
                expired_at: None,
            }],
            artifact: Some(handle),
            error: None,
            waiters: Arc::new(AtomicUsize::new(0)),
            cancel: CancellationToken::new(),
        }
    }

    /// Start a new attempt from `Failed` or `Expired`
    ///
    /// Returns the new attempt number, or `None` if the job is in any other state.
    pub(crate) fn begin_attempt(&mut self, id: AttemptId, cancel: CancellationToken) -> Option<u32> {
        if !self.state.accepts_new_attempt() {
            return None;
        }
        let now = Utc::now();
        self.attempt += 1;
        self.attempt_id = id;
        self.state = JobState::Pending;
        self.artifact = None;
        self.error = None;
        self.cancel = cancel;
        self.updated_at = now;
        self.history.push(AttemptRecord {
            attempt: self.attempt,
            started_at: now,
            finished_at: None,
            outcome: None,
            extractor_calls: 0,
            error: None,
            expired_at: None,
        });
        Some(self.attempt)
    }

    /// Whether `id` is the attempt currently driving this job
    pub(crate) fn is_current(&self, id: AttemptId) -> bool {
        self.attempt_id == id
    }

    /// Ticket for the current attempt
    pub(crate) fn ticket(&self) -> AttemptTicket {
        AttemptTicket {
            key: self.key.clone(),
            attempt: self.attempt,
            id: self.attempt_id,
            cancel: self.cancel.clone(),
        }
    }

    /// `Pending -> Running`
    pub(crate) fn mark_running(&mut self, id: AttemptId) -> bool {
        self.advance(id, JobState::Running)
    }

    /// `Running -> Completed`
    pub(crate) fn complete(&mut self, id: AttemptId, handle: ArtifactHandle, calls: u32) -> bool {
        if !self.advance(id, JobState::Completed) {
            return false;
        }
        self.artifact = Some(handle);
        self.finish_record(JobState::Completed, calls, None);
        true
    }

    /// `Running -> Failed`
    pub(crate) fn fail(&mut self, id: AttemptId, failure: JobFailure, calls: u32) -> bool {
        if !self.advance(id, JobState::Failed) {
            return false;
        }
        self.error = Some(failure.clone());
        self.finish_record(JobState::Failed, calls, Some(failure));
        true
    }

    /// `Completed -> Expired`
    pub(crate) fn expire(&mut self) -> bool {
        if !self.state.can_transition_to(JobState::Expired) {
            return false;
        }
        self.state = JobState::Expired;
        self.artifact = None;
        self.updated_at = Utc::now();
        if let Some(record) = self.history.last_mut() {
            record.expired_at = Some(self.updated_at);
        }
        true
    }

    fn advance(&mut self, id: AttemptId, next: JobState) -> bool {
        if !self.is_current(id) || !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        self.updated_at = Utc::now();
        true
    }

    fn finish_record(&mut self, outcome: JobState, calls: u32, error: Option<JobFailure>) {
        if let Some(record) = self.history.last_mut() {
            record.finished_at = Some(self.updated_at);
            record.outcome = Some(outcome);
            record.extractor_calls = calls;
            record.error = error;
        }
    }

    /// Read-only snapshot
    pub(crate) fn snapshot(&self) -> JobStatus {
        JobStatus {
            video_id: self.key.video_id().to_string(),
            kind: self.key.kind(),
            state: self.state,
            attempt: self.attempt,
            error: self.error.clone(),
            size_bytes: self.artifact.as_ref().map(|a| a.size_bytes),
            file_name: self.artifact.as_ref().map(|a| a.file_name.clone()),
            created_at: self.created_at,
            updated_at: self.updated_at,
            waiters: self.waiters.load(Ordering::SeqCst),
            attempts: self.history.clone(),
        }
    }
}

/// All known jobs, at most one per key
#[derive(Debug, Default)]
pub(crate) struct Registry {
    jobs: HashMap<JobKey, Job>,
}

impl Registry {
    pub(crate) fn get(&self, key: &JobKey) -> Option<&Job> {
        self.jobs.get(key)
    }

    pub(crate) fn get_mut(&mut self, key: &JobKey) -> Option<&mut Job> {
        self.jobs.get_mut(key)
    }

    pub(crate) fn insert(&mut self, job: Job) {
        self.jobs.insert(job.key.clone(), job);
    }

    pub(crate) fn remove(&mut self, key: &JobKey) -> Option<Job> {
        self.jobs.remove(key)
    }

    pub(crate) fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub(crate) fn jobs_mut(&mut self) -> impl Iterator<Item = &mut Job> {
        self.jobs.values_mut()
    }

    pub(crate) fn len(&self) -> usize {
        self.jobs.len()
    }
}
