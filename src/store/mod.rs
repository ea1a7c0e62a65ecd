//! On-disk artifact store
//!
//! Committed artifacts live directly under the store root as
//! `{video_id}.{kind}.{ext}`. Extraction happens in a private staging
//! directory (`.staging/` under the root) and is published with a rename, so
//! a partially written file is never visible to readers.
//!
//! Every committed artifact is held in the index as an `Arc`. Read streams
//! clone that `Arc`; eviction removes the index entry and moves the file into
//! the staging area, and the file is deleted once the last `Arc` drops. A
//! reader that is mid-stream keeps reading the old inode until it finishes.

mod stream;
mod writer;


pub use stream::ArtifactStream;
pub use writer::ArtifactWriter;

use crate::error::{Error, Result};
use crate::key::JobKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use utoipa::ToSchema;

/// Name of the staging directory inside the store root
pub(crate) const STAGING_DIR: &str = ".staging";

/// Description of a committed artifact
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ArtifactHandle {
    /// Absolute path of the published file
    #[schema(value_type = String)]
    pub path: PathBuf,
    /// File name under the store root (`{video_id}.{kind}.{ext}`)
    pub file_name: String,
    /// Size in bytes at commit time
    pub size_bytes: u64,
    /// When the artifact was committed (or its mtime, for re-indexed files)
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTime<Utc>,
}

/// Index entry; deletes its file on drop once evicted
#[derive(Debug)]
pub(crate) struct StoredArtifact {
    handle: ArtifactHandle,
    doomed: Mutex<Option<PathBuf>>,
}

impl StoredArtifact {
    fn new(handle: ArtifactHandle) -> Self {
        Self {
            handle,
            doomed: Mutex::new(None),
        }
    }

    fn doom(&self, path: PathBuf) {
        *self.doomed.lock().unwrap_or_else(|p| p.into_inner()) = Some(path);
    }
}

impl Drop for StoredArtifact {
    fn drop(&mut self) {
        let doomed = self
            .doomed
            .get_mut()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(path) = doomed
            && let Err(e) = std::fs::remove_file(&path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %path.display(), error = %e, "Failed to delete evicted artifact");
        }
    }
}

struct StoreInner {
    root: PathBuf,
    staging: PathBuf,
    index: Mutex<HashMap<JobKey, Arc<StoredArtifact>>>,
    seq: AtomicU64,
}

/// Artifact store keyed by [`JobKey`]
///
/// Cheap to clone; all clones share one index.
#[derive(Clone)]
pub struct ArtifactStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for ArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactStore")
            .field("root", &self.inner.root)
            .finish_non_exhaustive()
    }
}

impl ArtifactStore {
    /// Open (or create) a store rooted at `root`
    ///
    /// Leftover staging data from a previous run is removed, and committed
    /// artifacts already in the root are re-indexed so they can be served.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            Error::Storage(format!("failed to create store root {}: {}", root.display(), e))
        })?;

        let staging = root.join(STAGING_DIR);
        match tokio::fs::remove_dir_all(&staging).await {
            Ok(()) => tracing::debug!(path = %staging.display(), "Removed stale staging directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::Storage(format!(
                    "failed to clear staging directory {}: {}",
                    staging.display(),
                    e
                )));
            }
        }
        tokio::fs::create_dir_all(&staging).await.map_err(|e| {
            Error::Storage(format!(
                "failed to create staging directory {}: {}",
                staging.display(),
                e
            ))
        })?;

        let index = scan_root(&root).await?;
        if !index.is_empty() {
            tracing::info!(
                root = %root.display(),
                artifacts = index.len(),
                "Re-indexed artifacts already on disk"
            );
        }

        Ok(Self {
            inner: Arc::new(StoreInner {
                root,
                staging,
                index: Mutex::new(index),
                seq: AtomicU64::new(0),
            }),
        })
    }

    /// Store root directory
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Whether a committed artifact exists for `key`
    pub fn exists(&self, key: &JobKey) -> bool {
        self.index().contains_key(key)
    }

    /// Handle of the committed artifact for `key`, if any
    pub fn handle(&self, key: &JobKey) -> Option<ArtifactHandle> {
        self.index().get(key).map(|entry| entry.handle.clone())
    }

    /// Size of the committed artifact for `key`
    pub fn size_bytes(&self, key: &JobKey) -> Result<u64> {
        self.index()
            .get(key)
            .map(|entry| entry.handle.size_bytes)
            .ok_or_else(|| Error::ArtifactNotFound(key.clone()))
    }

    /// Map a published file name back to its key
    ///
    /// Returns `None` for names that are malformed or not currently published.
    pub fn lookup_file_name(&self, file_name: &str) -> Option<JobKey> {
        let key = JobKey::from_file_name(file_name).ok()?;
        let index = self.index();
        let entry = index.get(&key)?;
        (entry.handle.file_name == file_name).then_some(key)
    }

    /// Sum of all committed artifact sizes
    pub fn total_bytes(&self) -> u64 {
        self.index().values().map(|e| e.handle.size_bytes).sum()
    }

    /// Handles of every committed artifact
    pub fn list(&self) -> Vec<(JobKey, ArtifactHandle)> {
        self.index()
            .iter()
            .map(|(k, e)| (k.clone(), e.handle.clone()))
            .collect()
    }

    /// Create a private staging directory for one extraction of `key`
    pub async fn open_for_write(&self, key: &JobKey) -> Result<ArtifactWriter> {
        let seq = self.inner.seq.fetch_add(1, Ordering::Relaxed);
        let dir = self
            .inner
            .staging
            .join(format!("{}.{}", key.file_stem(), seq));
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            Error::Storage(format!(
                "failed to create staging directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(ArtifactWriter::new(self.clone(), key.clone(), dir))
    }

    /// Open the committed artifact for `key` as a byte stream
    ///
    /// The stream keeps the artifact alive: eviction while it is open only
    /// unpublishes the file, deletion happens when the stream is dropped.
    pub async fn open_for_read(&self, key: &JobKey) -> Result<ArtifactStream> {
        let entry = self
            .index()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::ArtifactNotFound(key.clone()))?;

        let file = match tokio::fs::File::open(&entry.handle.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Evicted between the index lookup and the open, or deleted
                // out from under us. Drop the stale entry if it is still ours.
                let mut index = self.index();
                if index.get(key).is_some_and(|cur| Arc::ptr_eq(cur, &entry)) {
                    index.remove(key);
                    tracing::warn!(
                        video_id = key.video_id(),
                        kind = %key.kind(),
                        path = %entry.handle.path.display(),
                        "Artifact file disappeared from store"
                    );
                }
                return Err(Error::ArtifactNotFound(key.clone()));
            }
            Err(e) => return Err(Error::Io(e)),
        };

        Ok(ArtifactStream::new(file, entry))
    }

    /// Remove the artifact for `key`
    ///
    /// Idempotent. Returns the evicted handle, or `None` if nothing was stored.
    pub fn evict(&self, key: &JobKey) -> Option<ArtifactHandle> {
        let entry = self.index().remove(key)?;
        let handle = entry.handle.clone();

        let seq = self.inner.seq.fetch_add(1, Ordering::Relaxed);
        let graveyard = self
            .inner
            .staging
            .join(format!("evicted-{}-{}", seq, handle.file_name));

        match std::fs::rename(&handle.path, &graveyard) {
            Ok(()) => entry.doom(graveyard),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    path = %handle.path.display(),
                    error = %e,
                    "Failed to unpublish artifact, deleting in place"
                );
                entry.doom(handle.path.clone());
            }
        }

        tracing::debug!(
            video_id = key.video_id(),
            kind = %key.kind(),
            size_bytes = handle.size_bytes,
            readers = Arc::strong_count(&entry) - 1,
            "Evicted artifact"
        );
        Some(handle)
    }

    /// Keys whose artifacts were committed more than `max_age` ago, oldest first
    fn candidates_older_than(&self, max_age: Duration) -> Vec<JobKey> {
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return Vec::new();
        };
        let Some(cutoff) = Utc::now().checked_sub_signed(max_age) else {
            return Vec::new();
        };
        let mut keys: Vec<(DateTime<Utc>, JobKey)> = self
            .index()
            .iter()
            .filter(|(_, e)| e.handle.created_at <= cutoff)
            .map(|(k, e)| (e.handle.created_at, k.clone()))
            .collect();
        keys.sort();
        keys.into_iter().map(|(_, k)| k).collect()
    }

    /// Oldest-first keys that must go for the store to fit in `budget` bytes
    fn candidates_over_quota(&self, budget: u64) -> Vec<JobKey> {
        let index = self.index();
        let mut entries: Vec<(DateTime<Utc>, &JobKey, u64)> = index
            .iter()
            .map(|(k, e)| (e.handle.created_at, k, e.handle.size_bytes))
            .collect();
        let mut total: u64 = entries.iter().map(|(_, _, size)| size).sum();
        entries.sort();

        let mut evict = Vec::new();
        for (_, key, size) in entries {
            if total <= budget {
                break;
            }
            total = total.saturating_sub(size);
            evict.push(key.clone());
        }
        evict
    }

    /// Evict every artifact older than `max_age`; returns the evicted keys
    pub fn evict_older_than(&self, max_age: Duration) -> Vec<JobKey> {
        self.candidates_older_than(max_age)
            .into_iter()
            .filter(|key| self.evict(key).is_some())
            .collect()
    }

    /// Evict oldest artifacts until the store fits in `budget`; returns the evicted keys
    pub fn evict_if_over_quota(&self, budget: u64) -> Vec<JobKey> {
        self.candidates_over_quota(budget)
            .into_iter()
            .filter(|key| self.evict(key).is_some())
            .collect()
    }

    pub(crate) fn staging_dir(&self) -> &Path {
        &self.inner.staging
    }

    /// Publish a staged file under the key's name
    pub(crate) async fn publish(
        &self,
        key: &JobKey,
        staged: &Path,
        extension: &str,
    ) -> Result<ArtifactHandle> {
        let file_name = key.file_name(extension);
        let path = self.inner.root.join(&file_name);

        // A previous artifact under another extension would otherwise linger
        if let Some(previous) = self.handle(key)
            && previous.file_name != file_name
        {
            self.evict(key);
        }

        tokio::fs::rename(staged, &path).await.map_err(|e| {
            Error::Storage(format!(
                "failed to publish {} to {}: {}",
                staged.display(),
                path.display(),
                e
            ))
        })?;
        let size_bytes = tokio::fs::metadata(&path)
            .await
            .map_err(|e| Error::Storage(format!("failed to stat {}: {}", path.display(), e)))?
            .len();

        let handle = ArtifactHandle {
            path,
            file_name,
            size_bytes,
            created_at: Utc::now(),
        };
        self.index()
            .insert(key.clone(), Arc::new(StoredArtifact::new(handle.clone())));
        Ok(handle)
    }

    fn index(&self) -> MutexGuard<'_, HashMap<JobKey, Arc<StoredArtifact>>> {
        self.inner.index.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Build the index from files already under `root`
async fn scan_root(root: &Path) -> Result<HashMap<JobKey, Arc<StoredArtifact>>> {
    let mut index: HashMap<JobKey, Arc<StoredArtifact>> = HashMap::new();
    let mut entries = tokio::fs::read_dir(root).await?;

    while let Some(entry) = entries.next_entry().await? {
        let metadata = match entry.metadata().await {
            Ok(m) if m.is_file() => m,
            _ => continue,
        };
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let Ok(key) = JobKey::from_file_name(&file_name) else {
            continue;
        };
        let created_at: DateTime<Utc> = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        let handle = ArtifactHandle {
            path: entry.path(),
            file_name,
            size_bytes: metadata.len(),
            created_at,
        };

        // Two files for one key: keep the newest
        if let Some(existing) = index.get(&key)
            && existing.handle.created_at >= handle.created_at
        {
            tracing::warn!(
                kept = %existing.handle.file_name,
                ignored = %handle.file_name,
                "Duplicate artifact for one job key"
            );
            continue;
        }
        index.insert(key, Arc::new(StoredArtifact::new(handle)));
    }

    Ok(index)
}
