//! Eviction, periodic sweeps and registry garbage collection

use super::JobOrchestrator;
use crate::error::{Error, Result};
use crate::key::JobKey;
use crate::types::{Event, JobState, SweepReport};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::Ordering;

impl JobOrchestrator {
    /// Evict one job explicitly
    ///
    /// - `Completed`: the artifact is evicted and the job becomes `Expired`
    /// - `Pending`/`Running`: the attempt is cancelled and the job removed; its
    ///   late result is discarded
    /// - `Failed`/`Expired`: nothing to do
    ///
    /// A key with no job but a stored artifact (left from a previous run) has
    /// the artifact evicted.
    pub async fn evict(&self, key: &JobKey) -> Result<()> {
        let mut registry = self.registry.lock().await;

        let Some(job) = registry.get_mut(key) else {
            return match self.store.evict(key) {
                Some(_) => Ok(()),
                None => Err(Error::UnknownJob(key.clone())),
            };
        };

        match job.state {
            JobState::Pending | JobState::Running => {
                job.cancel.cancel();
                registry.remove(key);
                tracing::info!(video_id = key.video_id(), kind = %key.kind(), "Cancelled and removed active job");
                self.emit_event(Event::Removed { key: key.clone() });
            }
            JobState::Completed => {
                job.expire();
                self.store.evict(key);
                tracing::info!(video_id = key.video_id(), kind = %key.kind(), "Evicted artifact");
                self.emit_event(Event::Expired { key: key.clone() });
            }
            JobState::Failed | JobState::Expired => {
                self.store.evict(key);
            }
        }
        Ok(())
    }

    /// Run retention once
    ///
    /// Evicts artifacts older than `artifact_ttl`, then the oldest artifacts
    /// until the store fits `storage_quota_bytes`. Jobs that owned them become
    /// `Expired`. Finally `Failed`/`Expired` jobs idle for longer than
    /// `registry_ttl` with no open streams are dropped from the registry.
    ///
    /// `Failed` jobs are never re-attempted here.
    pub async fn sweep(&self) -> SweepReport {
        let retention = &self.config.retention;
        let mut report = SweepReport::default();
        let mut registry = self.registry.lock().await;

        let sizes: HashMap<JobKey, u64> = self
            .store
            .list()
            .into_iter()
            .map(|(key, handle)| (key, handle.size_bytes))
            .collect();
        let mut evicted = self.store.evict_older_than(retention.artifact_ttl);
        if let Some(quota) = retention.storage_quota_bytes {
            evicted.extend(self.store.evict_if_over_quota(quota));
        }

        for key in evicted {
            report.reclaimed_bytes += sizes.get(&key).copied().unwrap_or(0);
            if let Some(job) = registry.get_mut(&key) {
                self.expire_lost(job);
            }
            report.expired.push(key);
        }

        let cutoff = chrono::Duration::from_std(retention.registry_ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_sub_signed(ttl));
        if let Some(cutoff) = cutoff {
            let stale: Vec<JobKey> = registry
                .jobs()
                .filter(|job| matches!(job.state, JobState::Failed | JobState::Expired))
                .filter(|job| job.updated_at <= cutoff)
                .filter(|job| job.waiters.load(Ordering::SeqCst) == 0)
                .map(|job| job.key.clone())
                .collect();
            for key in stale {
                registry.remove(&key);
                self.emit_event(Event::Removed { key: key.clone() });
                report.removed.push(key);
            }
        }

        if !report.expired.is_empty() || !report.removed.is_empty() {
            tracing::info!(
                expired = report.expired.len(),
                removed = report.removed.len(),
                reclaimed_bytes = report.reclaimed_bytes,
                jobs = registry.len(),
                "Retention sweep finished"
            );
        }
        report
    }

    /// Spawn the periodic retention sweep, stopped by [`shutdown`](Self::shutdown)
    pub fn spawn_retention_task(&self) -> tokio::task::JoinHandle<()> {
        let orchestrator = self.clone();
        let period = self.config.retention.sweep_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick fires immediately; skip it
            interval.tick().await;

            tracing::info!(interval_secs = period.as_secs(), "Retention task started");
            loop {
                tokio::select! {
                    _ = orchestrator.shutdown_token.cancelled() => {
                        tracing::debug!("Retention task stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        orchestrator.sweep().await;
                    }
                }
            }
        })
    }
}
