//! Serving completed artifacts.

use super::JobOrchestrator;
use super::registry::Job;
use crate::error::{Error, Result};
use crate::key::JobKey;
use crate::store::{ArtifactHandle, ArtifactStream};
use crate::types::{Event, FailureKind, JobFailure, JobState};
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

/// Counts an open stream against its job's `waiters`
struct WaiterGuard(Arc<AtomicUsize>);

impl WaiterGuard {
    fn new(waiters: Arc<AtomicUsize>) -> Self {
        waiters.fetch_add(1, Ordering::SeqCst);
        Self(waiters)
    }
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Byte stream of a completed job's artifact
///
/// While it is alive the job is not garbage-collected and the file is not
/// deleted, even if retention evicts the artifact.
pub struct ArtifactDownload {
    stream: ArtifactStream,
    _waiter: WaiterGuard,
}

impl ArtifactDownload {
    /// Handle of the artifact being streamed
    pub fn handle(&self) -> &ArtifactHandle {
        self.stream.handle()
    }

    /// Stream length in bytes
    pub fn size_bytes(&self) -> u64 {
        self.stream.size_bytes()
    }

    /// Published file name
    pub fn file_name(&self) -> &str {
        self.stream.file_name()
    }
}

impl Stream for ArtifactDownload {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.stream).poll_next(cx)
    }
}

impl std::fmt::Debug for ArtifactDownload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactDownload")
            .field("stream", &self.stream)
            .finish()
    }
}

impl JobOrchestrator {
    /// Open the artifact of a `Completed` job
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownJob`] if there is no job for `key`
    /// - [`Error::JobNotReady`] while `Pending` or `Running`
    /// - [`Error::JobFailed`] with the recorded reason if `Failed`
    /// - [`Error::JobExpired`] if the artifact was evicted, including when the
    ///   store lost the file underneath a `Completed` job
    pub async fn get_artifact(&self, key: &JobKey) -> Result<ArtifactDownload> {
        let waiter = {
            let mut registry = self.registry.lock().await;
            let job = registry
                .get_mut(key)
                .ok_or_else(|| Error::UnknownJob(key.clone()))?;
            self.check_servable(job)?;
            WaiterGuard::new(job.waiters.clone())
        };

        match self.store.open_for_read(key).await {
            Ok(stream) => Ok(ArtifactDownload {
                stream,
                _waiter: waiter,
            }),
            Err(Error::ArtifactNotFound(_)) => {
                drop(waiter);
                let mut registry = self.registry.lock().await;
                if let Some(job) = registry.get_mut(key) {
                    self.expire_lost(job);
                }
                Err(Error::JobExpired(key.clone()))
            }
            Err(e) => Err(e),
        }
    }

    /// Open an artifact by its published file name (`{video_id}.{kind}.{ext}`)
    ///
    /// A file that is in the store but was never requested through this
    /// process (left over from a previous run) is adopted as a `Completed` job.
    ///
    /// # Errors
    ///
    /// [`Error::FileNotFound`] for names that do not map to a job key or whose
    /// extension differs from the stored artifact, otherwise as
    /// [`get_artifact`](Self::get_artifact).
    pub async fn get_artifact_by_file_name(&self, file_name: &str) -> Result<ArtifactDownload> {
        let key = JobKey::from_file_name(file_name)?;

        {
            let mut registry = self.registry.lock().await;
            if registry.get(&key).is_none() {
                match self.store.handle(&key) {
                    Some(handle) if handle.file_name == file_name => {
                        tracing::info!(file_name, "Adopting stored artifact for download");
                        let id = self.next_attempt_id();
                        registry.insert(Job::adopted(key.clone(), id, handle));
                    }
                    _ => return Err(Error::FileNotFound(file_name.to_string())),
                }
            }
        }

        let download = self.get_artifact(&key).await?;
        if download.file_name() != file_name {
            return Err(Error::FileNotFound(file_name.to_string()));
        }
        Ok(download)
    }

    fn check_servable(&self, job: &mut Job) -> Result<()> {
        match job.state {
            JobState::Pending | JobState::Running => Err(Error::JobNotReady {
                key: job.key.clone(),
                state: job.state,
            }),
            JobState::Failed => Err(Error::JobFailed {
                key: job.key.clone(),
                reason: job.error.clone().unwrap_or_else(|| {
                    JobFailure::new(
                        FailureKind::UpstreamUnavailable,
                        "unknown failure",
                    )
                }),
            }),
            JobState::Expired => Err(Error::JobExpired(job.key.clone())),
            JobState::Completed if !self.store.exists(&job.key) => {
                self.expire_lost(job);
                Err(Error::JobExpired(job.key.clone()))
            }
            JobState::Completed => Ok(()),
        }
    }

    /// Expire a `Completed` job whose artifact is no longer in the store
    pub(super) fn expire_lost(&self, job: &mut Job) {
        if job.expire() {
            tracing::info!(
                video_id = job.key.video_id(),
                kind = %job.key.kind(),
                "Artifact gone from store, job expired"
            );
            self.emit_event(Event::Expired {
                key: job.key.clone(),
            });
        }
    }
}
