//! Job orchestrator
//!
//! Turns `(video_id, kind)` requests into idempotent, asynchronously
//! progressing jobs. The orchestrator is split by concern:
//! - [`registry`] - Job entity and its transition functions
//! - [`attempt`] - Running one attempt (permit, extractor, retries, commit)
//! - [`artifact`] - Serving completed artifacts
//! - [`retention`] - Eviction, sweeps and registry garbage collection
//! - [`lifecycle`] - Shutdown coordination
//!
//! All job state lives in one registry behind a `tokio::sync::Mutex`.
//! Transitions run synchronously under that lock; the lock is never held
//! while the extractor runs.

mod artifact;
mod attempt;
mod lifecycle;
pub(crate) mod registry;
mod retention;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use artifact::ArtifactDownload;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::extractor::Extractor;
use crate::key::{JobKey, MediaKind, is_valid_video_id};
use crate::store::ArtifactStore;
use crate::types::{Event, JobState, JobStatus};
use registry::{AttemptId, Job, Registry};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

/// The job orchestrator (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct JobOrchestrator {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Artifact store
    pub(crate) store: ArtifactStore,
    /// Injected extraction backend
    pub(crate) extractor: Arc<dyn Extractor>,
    /// The single job registry
    pub(crate) registry: Arc<tokio::sync::Mutex<Registry>>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Bounds concurrently running attempts (max_concurrent_jobs)
    pub(crate) concurrent_limit: Arc<tokio::sync::Semaphore>,
    /// Set to false once shutdown begins
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Parent of every attempt's cancellation token
    pub(crate) shutdown_token: CancellationToken,
    /// Spawned attempt tasks that have not finished yet
    pub(crate) active_attempts: Arc<AtomicUsize>,
    next_attempt_id: Arc<AtomicU64>,
}

impl std::fmt::Debug for JobOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobOrchestrator")
            .field("store", &self.store)
            .field("extractor", &self.extractor.name())
            .field("active_attempts", &self.active_attempts.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl JobOrchestrator {
    /// Create an orchestrator
    ///
    /// Validates `config`, then opens the artifact store at
    /// `config.download.download_dir` (re-indexing artifacts already there).
    pub async fn new(config: Config, extractor: Arc<dyn Extractor>) -> Result<Self> {
        config.validate()?;
        let store = ArtifactStore::open(config.download_dir()).await?;
        Ok(Self::with_store(config, store, extractor))
    }

    /// Create an orchestrator over an already opened store
    pub fn with_store(config: Config, store: ArtifactStore, extractor: Arc<dyn Extractor>) -> Self {
        // Create broadcast channel with buffer size of 1000 events
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);
        let concurrent_limit = Arc::new(tokio::sync::Semaphore::new(
            config.download.max_concurrent_jobs.max(1),
        ));

        tracing::info!(
            download_dir = %store.root().display(),
            extractor = extractor.name(),
            max_concurrent_jobs = config.download.max_concurrent_jobs,
            "Job orchestrator ready"
        );

        Self {
            config: Arc::new(config),
            store,
            extractor,
            registry: Arc::new(tokio::sync::Mutex::new(Registry::default())),
            event_tx,
            concurrent_limit,
            accepting_new: Arc::new(AtomicBool::new(true)),
            shutdown_token: CancellationToken::new(),
            active_attempts: Arc::new(AtomicUsize::new(0)),
            next_attempt_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Request extraction of `kind` for `video_id`
    ///
    /// Idempotent: an existing `Pending`, `Running` or `Completed` job is
    /// reused as-is. A `Failed` or `Expired` job gets a fresh attempt under
    /// the same key. Returns immediately; the extraction runs in its own task.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidVideoId`] for malformed ids (no job is created)
    /// - [`Error::ShuttingDown`] once [`shutdown`](Self::shutdown) has begun
    pub async fn request_download(&self, video_id: &str, kind: MediaKind) -> Result<JobKey> {
        let key = JobKey::resolve(video_id, kind)?;

        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let scheduled = {
            let mut registry = self.registry.lock().await;
            match registry.get_mut(&key) {
                Some(job) => {
                    // A Completed job whose file vanished is as good as Expired
                    if job.state == JobState::Completed && !self.store.exists(&key) && job.expire()
                    {
                        tracing::warn!(
                            video_id = key.video_id(),
                            kind = %kind,
                            "Completed job lost its artifact, marking expired"
                        );
                        self.emit_event(Event::Expired { key: key.clone() });
                    }

                    if job.state.accepts_new_attempt() {
                        let id = self.next_attempt_id();
                        let cancel = self.shutdown_token.child_token();
                        job.begin_attempt(id, cancel);
                        tracing::info!(
                            video_id = key.video_id(),
                            kind = %kind,
                            attempt = job.attempt,
                            "Starting new attempt"
                        );
                        Some(job.ticket())
                    } else {
                        tracing::debug!(
                            video_id = key.video_id(),
                            kind = %kind,
                            state = %job.state,
                            "Reusing existing job"
                        );
                        None
                    }
                }
                None => {
                    let id = self.next_attempt_id();
                    if let Some(handle) = self.store.handle(&key) {
                        tracing::info!(
                            video_id = key.video_id(),
                            kind = %kind,
                            file_name = %handle.file_name,
                            "Adopting stored artifact"
                        );
                        registry.insert(Job::adopted(key.clone(), id, handle));
                        None
                    } else {
                        let job = Job::pending(key.clone(), id, self.shutdown_token.child_token());
                        let ticket = job.ticket();
                        registry.insert(job);
                        tracing::info!(video_id = key.video_id(), kind = %kind, "Job queued");
                        Some(ticket)
                    }
                }
            }
        };

        if let Some(ticket) = scheduled {
            self.emit_event(Event::Queued {
                key: ticket.key.clone(),
                attempt: ticket.attempt,
            });
            self.spawn_attempt(ticket);
        }

        Ok(key)
    }

    /// Snapshot of the job for `key`
    ///
    /// A `Completed` job whose artifact left the store (evicted directly
    /// through [`store`](Self::store) or deleted from disk) is reported as
    /// `Expired`.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownJob`] if the key was never requested or has been
    /// garbage-collected.
    pub async fn get_status(&self, key: &JobKey) -> Result<JobStatus> {
        let mut registry = self.registry.lock().await;
        registry
            .get_mut(key)
            .map(|job| self.reconciled_snapshot(job))
            .ok_or_else(|| Error::UnknownJob(key.clone()))
    }

    /// Status lookup by raw video id
    ///
    /// With `kind`, this is [`get_status`](Self::get_status). Without it, the
    /// most recently updated job for the video across both kinds is returned.
    pub async fn status_for_video(
        &self,
        video_id: &str,
        kind: Option<MediaKind>,
    ) -> Result<JobStatus> {
        if let Some(kind) = kind {
            return self.get_status(&JobKey::resolve(video_id, kind)?).await;
        }
        if !is_valid_video_id(video_id) {
            return Err(Error::InvalidVideoId(video_id.to_string()));
        }

        let mut registry = self.registry.lock().await;
        let latest = MediaKind::ALL
            .iter()
            .filter_map(|kind| JobKey::resolve(video_id, *kind).ok())
            .filter_map(|key| registry.get(&key))
            .max_by_key(|job| job.updated_at)
            .map(|job| job.key.clone());
        latest
            .and_then(|key| registry.get_mut(&key))
            .map(|job| self.reconciled_snapshot(job))
            .ok_or_else(|| match JobKey::resolve(video_id, MediaKind::Audio) {
                Ok(key) => Error::UnknownJob(key),
                Err(e) => e,
            })
    }

    /// Snapshots of every job, oldest first
    pub async fn list_jobs(&self) -> Vec<JobStatus> {
        let mut registry = self.registry.lock().await;
        let mut jobs: Vec<JobStatus> = registry
            .jobs_mut()
            .map(|job| self.reconciled_snapshot(job))
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        jobs
    }

    /// Subscribe to lifecycle events
    ///
    /// Slow subscribers may miss events (`RecvError::Lagged`); polling
    /// [`get_status`](Self::get_status) is always authoritative.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The artifact store backing this orchestrator
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Configuration this orchestrator was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether new requests are accepted
    pub fn is_accepting(&self) -> bool {
        self.accepting_new.load(Ordering::SeqCst)
    }

    /// Spawn the REST API server in a background task
    pub fn spawn_api_server(&self) -> tokio::task::JoinHandle<Result<()>> {
        let orchestrator = Arc::new(self.clone());
        let config = self.config.clone();
        tokio::spawn(async move { crate::api::start_api_server(orchestrator, config).await })
    }

    fn reconciled_snapshot(&self, job: &mut Job) -> JobStatus {
        if job.state == JobState::Completed && !self.store.exists(&job.key) {
            self.expire_lost(job);
        }
        job.snapshot()
    }

    pub(crate) fn emit_event(&self, event: Event) {
        // No receivers is not an error
        let _ = self.event_tx.send(event);
    }

    pub(crate) fn next_attempt_id(&self) -> AttemptId {
        AttemptId(self.next_attempt_id.fetch_add(1, Ordering::Relaxed))
    }
}
