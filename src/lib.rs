//! # tube-dl
//!
//! Fetch-once, store, serve: audio and video extraction jobs for YouTube
//! videos behind a small HTTP API.
//!
//! ## Design
//!
//! - **Idempotent jobs** - `(video_id, kind)` is the job identity; repeated
//!   requests reuse the running or finished job
//! - **Pluggable extraction** - the [`Extractor`] trait hides the fetch
//!   mechanism; [`YtDlpExtractor`] drives the `yt-dlp` binary
//! - **Atomic artifacts** - output is staged privately and published by rename
//! - **Event-driven** - consumers can subscribe to lifecycle events, polling
//!   status is always authoritative
//!
//! ## Quick Start
//!
//! ```no_run
//! use tube_dl::{Config, JobOrchestrator, MediaKind, YtDlpExtractor};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let extractor = Arc::new(YtDlpExtractor::from_config(&config.extractor)?);
//!     let orchestrator = JobOrchestrator::new(config, extractor).await?;
//!
//!     // Subscribe to events
//!     let mut events = orchestrator.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let key = orchestrator.request_download("dQw4w9WgXcQ", MediaKind::Audio).await?;
//!     println!("{:?}", orchestrator.get_status(&key).await?.state);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Media extraction backends
pub mod extractor;
/// Job key resolution
pub mod key;
/// Job orchestration (registry, attempts, retention, shutdown)
pub mod orchestrator;
/// Retry logic with exponential backoff
pub mod retry;
/// On-disk artifact storage
pub mod store;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{ApiError, Error, ErrorDetail, Result, ToHttpStatus};
pub use extractor::{ExtractError, Extractor, YtDlpExtractor};
pub use key::{JobKey, MediaKind};
pub use orchestrator::{ArtifactDownload, JobOrchestrator};
pub use store::{ArtifactHandle, ArtifactStore};
pub use types::{Event, FailureKind, JobFailure, JobState, JobStatus, SweepReport};

/// Run the orchestrator until a termination signal, then shut it down.
///
/// Waits for a termination signal and then calls [`JobOrchestrator::shutdown`].
///
/// - **Unix:** listens for SIGTERM and SIGINT.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use tube_dl::{Config, JobOrchestrator, YtDlpExtractor, run_with_shutdown};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let extractor = Arc::new(YtDlpExtractor::from_config(&config.extractor)?);
///     let orchestrator = JobOrchestrator::new(config, extractor).await?;
///
///     // Serve until SIGTERM/SIGINT
///     let _server = orchestrator.spawn_api_server();
///     run_with_shutdown(orchestrator).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(orchestrator: JobOrchestrator) -> Result<()> {
    let signal = wait_for_signal().await;
    tracing::info!(signal, "Termination signal received");
    orchestrator.shutdown().await
}

/// Resolves with the name of the first termination signal received
///
/// A signal whose handler cannot be registered (restricted containers) is
/// never reported; the other one still is.
#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    async fn recv(kind: SignalKind, name: &'static str) -> &'static str {
        match signal(kind) {
            Ok(mut stream) => {
                stream.recv().await;
                name
            }
            Err(e) => {
                tracing::warn!(signal = name, error = %e, "Could not register signal handler");
                std::future::pending().await
            }
        }
    }

    tokio::select! {
        name = recv(SignalKind::terminate(), "SIGTERM") => name,
        name = recv(SignalKind::interrupt(), "SIGINT") => name,
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Could not listen for Ctrl+C, running until killed");
        std::future::pending::<()>().await;
    }
    "Ctrl+C"
}
