use super::test_helpers::{
    PAYLOAD, ScriptedExtractor, create_test_orchestrator, wait_for_settled, wait_for_state,
};
use super::*;
use crate::extractor::ExtractError;
use crate::types::FailureKind;
use futures::StreamExt;
use std::time::Duration;

mod lifecycle;

const VIDEO_ID: &str = "dQw4w9WgXcQ";

/// Drain a download into memory
async fn read_all(mut download: ArtifactDownload) -> Vec<u8> {
    let mut bytes = Vec::new();
    while let Some(chunk) = download.next().await {
        bytes.extend_from_slice(&chunk.unwrap());
    }
    bytes
}
