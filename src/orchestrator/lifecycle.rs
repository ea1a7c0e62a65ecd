//! Shutdown coordination

use super::JobOrchestrator;
use crate::error::Result;
use crate::types::Event;
use std::sync::atomic::Ordering;
use std::time::Duration;

/// How long shutdown waits for in-flight attempts
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl JobOrchestrator {
    /// Gracefully shut down
    ///
    /// Stops accepting requests, cancels every pending and running attempt
    /// (terminating extractor subprocesses), waits up to 30 seconds for the
    /// attempt tasks to wind down, then emits [`Event::Shutdown`].
    ///
    /// Calling it twice is harmless.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.accepting_new.store(false, Ordering::SeqCst);
        self.shutdown_token.cancel();

        let wait = async {
            while self.active_attempts.load(Ordering::SeqCst) > 0 {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        };
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, wait).await {
            Ok(()) => tracing::info!("All attempts finished"),
            Err(_) => tracing::warn!(
                remaining = self.active_attempts.load(Ordering::SeqCst),
                "Timed out waiting for attempts to finish"
            ),
        }

        self.emit_event(Event::Shutdown);
        tracing::info!("Shutdown complete");
        Ok(())
    }
}
