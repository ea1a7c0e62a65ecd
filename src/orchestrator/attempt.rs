//! Attempt execution: slot acquisition, extraction with retries, commit.

use super::JobOrchestrator;
use super::registry::{AttemptId, AttemptTicket, Registry};
use crate::extractor::ExtractError;
use crate::key::JobKey;
use crate::retry::with_retry;
use crate::store::{ArtifactHandle, ArtifactWriter};
use crate::types::{Event, FailureKind, JobFailure, JobState};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// How an attempt's Running phase ended
enum Outcome {
    /// The extractor succeeded; the writer holds the uncommitted output
    Fetched(ArtifactWriter),
    /// Terminal failure (retries exhausted, non-retryable, timeout, storage)
    Failed(JobFailure),
    /// Eviction or shutdown cancelled the attempt
    Cancelled,
}

/// Decrements the active-attempt counter when the task ends, however it ends
struct ActiveAttempt(Arc<AtomicUsize>);

impl Drop for ActiveAttempt {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl JobOrchestrator {
    /// Spawn the task that drives one attempt
    pub(crate) fn spawn_attempt(&self, ticket: AttemptTicket) {
        self.active_attempts.fetch_add(1, Ordering::SeqCst);
        let guard = ActiveAttempt(self.active_attempts.clone());
        let orchestrator = self.clone();

        tokio::spawn(async move {
            let _guard = guard;
            orchestrator.run_attempt(ticket).await;
        });
    }

    async fn run_attempt(&self, ticket: AttemptTicket) {
        let AttemptTicket {
            key,
            attempt,
            id,
            cancel,
        } = ticket;

        // Wait for a slot; the job stays Pending meanwhile
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(video_id = key.video_id(), kind = %key.kind(), attempt, "Attempt cancelled before start");
                self.abandon(&key, id, attempt).await;
                return;
            }
            permit = self.concurrent_limit.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };

        {
            let mut registry = self.registry.lock().await;
            if !registry
                .get_mut(&key)
                .is_some_and(|job| job.mark_running(id))
            {
                tracing::debug!(video_id = key.video_id(), kind = %key.kind(), attempt, "Attempt superseded before start");
                return;
            }
        }
        self.emit_event(Event::Running {
            key: key.clone(),
            attempt,
        });
        tracing::info!(
            video_id = key.video_id(),
            kind = %key.kind(),
            attempt,
            extractor = self.extractor.name(),
            "Extraction started"
        );

        // The extraction runs in its own task so a panicking extractor still
        // leaves this task alive to record the failure
        let calls = Arc::new(AtomicU32::new(0));
        let mut extraction = {
            let orchestrator = self.clone();
            let key = key.clone();
            let calls = calls.clone();
            tokio::spawn(async move { orchestrator.extract_with_retry(&key, &calls).await })
        };

        let running_timeout = self.config.extractor.running_timeout;
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Outcome::Cancelled,
            result = tokio::time::timeout(running_timeout, &mut extraction) => match result {
                Ok(Ok(Ok(writer))) => Outcome::Fetched(writer),
                Ok(Ok(Err(failure))) => Outcome::Failed(failure),
                Ok(Err(e)) => {
                    tracing::error!(video_id = key.video_id(), kind = %key.kind(), attempt, error = %e, "Extraction task died");
                    Outcome::Failed(JobFailure::new(
                        FailureKind::UpstreamUnavailable,
                        format!("extractor panicked: {e}"),
                    ))
                }
                Err(_) => Outcome::Failed(JobFailure::new(
                    FailureKind::Timeout,
                    format!("extraction exceeded {}s", running_timeout.as_secs_f64()),
                )),
            },
        };
        // Dropping the extraction kills the yt-dlp child and its staging dir
        extraction.abort();
        drop(permit);
        let calls = calls.load(Ordering::SeqCst);

        match outcome {
            Outcome::Fetched(writer) => self.commit(&key, id, attempt, writer, calls).await,
            Outcome::Failed(failure) => self.record_failure(&key, id, attempt, failure, calls).await,
            Outcome::Cancelled => {
                tracing::debug!(video_id = key.video_id(), kind = %key.kind(), attempt, "Attempt cancelled while running");
                self.abandon(&key, id, attempt).await;
            }
        }
    }

    /// Run the extractor with retries into a fresh staging directory
    async fn extract_with_retry(
        &self,
        key: &JobKey,
        calls: &AtomicU32,
    ) -> Result<ArtifactWriter, JobFailure> {
        let writer = self
            .store
            .open_for_write(key)
            .await
            .map_err(|e| JobFailure::new(FailureKind::StorageError, e.to_string()))?;

        let result: Result<(), ExtractError> = with_retry(&self.config.retry, || {
            let writer = &writer;
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) > 0
                    && let Err(e) = writer.clear().await
                {
                    tracing::warn!(error = %e, "Failed to clear staging before retry");
                }
                self.extractor
                    .fetch(key.video_id(), key.kind(), writer)
                    .await
            }
        })
        .await;

        result.map(|()| writer).map_err(JobFailure::from)
    }

    /// Publish the fetched output and complete the job, unless the attempt went stale
    async fn commit(
        &self,
        key: &JobKey,
        id: AttemptId,
        attempt: u32,
        writer: ArtifactWriter,
        calls: u32,
    ) {
        let still_current = {
            let registry = self.registry.lock().await;
            registry.get(key).is_some_and(|job| job.is_current(id))
        };
        if !still_current {
            tracing::debug!(video_id = key.video_id(), kind = %key.kind(), attempt, "Discarding output of stale attempt");
            return;
        }

        let handle = match writer.commit().await {
            Ok(handle) => handle,
            Err(e) => {
                let failure = JobFailure::new(FailureKind::StorageError, e.to_string());
                self.record_failure(key, id, attempt, failure, calls).await;
                return;
            }
        };

        let mut registry = self.registry.lock().await;
        self.complete_locked(&mut registry, key, id, attempt, handle, calls);
    }

    /// Move the job to `Completed` with a freshly published `handle`
    ///
    /// Runs under the registry lock. If retention evicted the file after it
    /// was published, the attempt fails with `StorageError` instead.
    pub(super) fn complete_locked(
        &self,
        registry: &mut Registry,
        key: &JobKey,
        id: AttemptId,
        attempt: u32,
        handle: ArtifactHandle,
        calls: u32,
    ) {
        let current = registry.get(key).is_some_and(|job| job.is_current(id));
        if current && self.store.handle(key).as_ref() != Some(&handle) {
            let failure = JobFailure::new(
                FailureKind::StorageError,
                "artifact was evicted before the job completed",
            );
            self.fail_locked(registry, key, id, attempt, failure, calls);
            return;
        }

        let completed = registry
            .get_mut(key)
            .is_some_and(|job| job.complete(id, handle.clone(), calls));

        if completed {
            tracing::info!(
                video_id = key.video_id(),
                kind = %key.kind(),
                attempt,
                extractor_calls = calls,
                file_name = %handle.file_name,
                size_bytes = handle.size_bytes,
                "Job completed"
            );
            self.emit_event(Event::Completed {
                key: key.clone(),
                attempt,
                file_name: handle.file_name,
                size_bytes: handle.size_bytes,
            });
        } else {
            // Evicted or superseded while committing; the file has no owner
            if self.store.handle(key).as_ref() == Some(&handle) {
                self.store.evict(key);
            }
            tracing::debug!(video_id = key.video_id(), kind = %key.kind(), attempt, "Dropped artifact of stale attempt");
        }
    }

    async fn record_failure(
        &self,
        key: &JobKey,
        id: AttemptId,
        attempt: u32,
        failure: JobFailure,
        calls: u32,
    ) {
        let mut registry = self.registry.lock().await;
        self.fail_locked(&mut registry, key, id, attempt, failure, calls);
    }

    fn fail_locked(
        &self,
        registry: &mut Registry,
        key: &JobKey,
        id: AttemptId,
        attempt: u32,
        failure: JobFailure,
        calls: u32,
    ) {
        let failed = registry
            .get_mut(key)
            .is_some_and(|job| job.fail(id, failure.clone(), calls));

        if failed {
            tracing::warn!(
                video_id = key.video_id(),
                kind = %key.kind(),
                attempt,
                extractor_calls = calls,
                error = %failure,
                "Job failed"
            );
            self.emit_event(Event::Failed {
                key: key.clone(),
                attempt,
                error: failure,
            });
        } else {
            tracing::debug!(video_id = key.video_id(), kind = %key.kind(), attempt, error = %failure, "Dropped failure of stale attempt");
        }
    }

    /// Fail a cancelled attempt that still owns its job (shutdown)
    ///
    /// Evicted jobs are already gone from the registry, so this is a no-op for them.
    async fn abandon(&self, key: &JobKey, id: AttemptId, attempt: u32) {
        let mut registry = self.registry.lock().await;
        let Some(job) = registry.get_mut(key) else {
            return;
        };
        if !job.is_current(id) {
            return;
        }
        if job.state == JobState::Pending {
            // Failed is only reachable from Running
            job.mark_running(id);
        }
        let failure = JobFailure::new(
            FailureKind::UpstreamUnavailable,
            "attempt cancelled by shutdown",
        );
        if job.fail(id, failure.clone(), 0) {
            self.emit_event(Event::Failed {
                key: key.clone(),
                attempt,
                error: failure,
            });
        }
    }
}
