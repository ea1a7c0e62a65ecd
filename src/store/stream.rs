//! Byte stream over a committed artifact

use super::{ArtifactHandle, StoredArtifact};
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

/// Read stream over a committed artifact
///
/// Holds a reference on the stored artifact, so an eviction that happens
/// while the stream is open defers deleting the file until it is dropped.
pub struct ArtifactStream {
    reader: ReaderStream<File>,
    handle: ArtifactHandle,
    _artifact: Arc<StoredArtifact>,
}

impl ArtifactStream {
    pub(crate) fn new(file: File, artifact: Arc<StoredArtifact>) -> Self {
        Self {
            reader: ReaderStream::new(file),
            handle: artifact.handle.clone(),
            _artifact: artifact,
        }
    }

    /// Handle of the artifact being read
    pub fn handle(&self) -> &ArtifactHandle {
        &self.handle
    }

    /// Total length of the stream in bytes
    pub fn size_bytes(&self) -> u64 {
        self.handle.size_bytes
    }

    /// Published file name
    pub fn file_name(&self) -> &str {
        &self.handle.file_name
    }
}

impl Stream for ArtifactStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.reader).poll_next(cx)
    }
}

impl std::fmt::Debug for ArtifactStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactStream")
            .field("file_name", &self.handle.file_name)
            .field("size_bytes", &self.handle.size_bytes)
            .finish()
    }
}
