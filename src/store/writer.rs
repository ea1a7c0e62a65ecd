//! Scoped write handle for one extraction

use super::{ArtifactHandle, ArtifactStore};
use crate::error::{Error, Result};
use crate::key::JobKey;
use std::path::{Path, PathBuf};

/// Suffixes of intermediate files yt-dlp leaves behind; never published
const INTERMEDIATE_SUFFIXES: &[&str] = &[".part", ".ytdl", ".temp", ".tmp"];

/// Private staging directory an extractor writes into
///
/// Nothing written here is visible through the store until
/// [`commit`](Self::commit) renames the produced file into the store root.
/// Dropping an uncommitted writer deletes the staging directory.
pub struct ArtifactWriter {
    store: ArtifactStore,
    key: JobKey,
    dir: PathBuf,
    committed: bool,
}

impl ArtifactWriter {
    pub(crate) fn new(store: ArtifactStore, key: JobKey, dir: PathBuf) -> Self {
        Self {
            store,
            key,
            dir,
            committed: false,
        }
    }

    /// Key this writer publishes under
    pub fn key(&self) -> &JobKey {
        &self.key
    }

    /// Staging directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Conventional output path for a file with `extension`
    pub fn file_path(&self, extension: &str) -> PathBuf {
        self.dir.join(format!("media.{extension}"))
    }

    /// Discard everything written so far (used between retries)
    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::Storage(format!("failed to clear staging: {e}"))),
        }
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::Storage(format!("failed to recreate staging: {e}")))
    }

    /// Publish the produced file atomically
    ///
    /// The largest non-intermediate file in the staging directory is the
    /// artifact. Fails with [`Error::Storage`] when the extractor left nothing
    /// usable behind.
    pub async fn commit(mut self) -> Result<ArtifactHandle> {
        let (staged, extension) = self.select_output().await?;
        let handle = self.store.publish(&self.key, &staged, &extension).await?;
        self.committed = true;

        if let Err(e) = tokio::fs::remove_dir_all(&self.dir).await {
            tracing::debug!(dir = %self.dir.display(), error = %e, "Failed to remove staging directory");
        }

        tracing::debug!(
            video_id = self.key.video_id(),
            kind = %self.key.kind(),
            file_name = %handle.file_name,
            size_bytes = handle.size_bytes,
            "Artifact committed"
        );
        Ok(handle)
    }

    async fn select_output(&self) -> Result<(PathBuf, String)> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| Error::Storage(format!("failed to read staging: {e}")))?;

        let mut best: Option<(u64, PathBuf)> = None;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::Storage(format!("failed to read staging: {e}")))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if INTERMEDIATE_SUFFIXES.iter().any(|s| name.ends_with(s)) {
                continue;
            }
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            if best.as_ref().is_none_or(|(size, _)| metadata.len() > *size) {
                best = Some((metadata.len(), entry.path()));
            }
        }

        match best {
            Some((0, path)) => Err(Error::Storage(format!(
                "extractor produced an empty file: {}",
                path.display()
            ))),
            Some((_, path)) => {
                let extension = output_extension(&path);
                Ok((path, extension))
            }
            None => Err(Error::Storage(
                "extractor finished without producing a file".to_string(),
            )),
        }
    }
}

impl Drop for ArtifactWriter {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), error = %e, "Failed to discard staging directory");
            }
        }
    }
}

impl std::fmt::Debug for ArtifactWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactWriter")
            .field("key", &self.key)
            .field("dir", &self.dir)
            .field("committed", &self.committed)
            .finish()
    }
}

/// Lowercase extension of the produced file, or `bin` when it has none usable
fn output_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| "bin".to_string())
}
