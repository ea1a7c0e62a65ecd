//! Waiting helpers for integration tests

use std::time::Duration;
use tube_dl::{JobKey, JobOrchestrator, JobState, JobStatus};

/// Poll until `key` leaves Pending/Running, panicking after `timeout`
pub async fn wait_for_terminal(
    orchestrator: &JobOrchestrator,
    key: &JobKey,
    timeout: Duration,
) -> JobStatus {
    let result = tokio::time::timeout(timeout, async {
        loop {
            let status = orchestrator.get_status(key).await.unwrap();
            if !status.state.is_active() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    match result {
        Ok(status) => status,
        Err(_) => panic!("job {key} did not settle within {timeout:?}"),
    }
}

/// Assert the job settled as `Completed` and return its snapshot
pub async fn assert_completes(orchestrator: &JobOrchestrator, key: &JobKey) -> JobStatus {
    let status = wait_for_terminal(orchestrator, key, Duration::from_secs(10)).await;
    assert_eq!(
        status.state,
        JobState::Completed,
        "expected completion, got {:?}",
        status.error
    );
    status
}
