//! Core types for tube-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::key::{JobKey, MediaKind};

/// Lifecycle state of a job attempt
///
/// `Pending -> Running -> {Completed | Failed}` and `Completed -> Expired`.
/// A `Failed` or `Expired` job only leaves its state by starting a new attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Accepted, waiting for a worker slot
    Pending,
    /// Extractor is running (including internal retries)
    Running,
    /// Artifact committed to the store
    Completed,
    /// Attempt ended with a terminal failure
    Failed,
    /// Artifact was evicted by retention
    Expired,
}

impl JobState {
    /// Whether a new `request_download` should start a fresh attempt
    pub fn accepts_new_attempt(&self) -> bool {
        matches!(self, JobState::Failed | JobState::Expired)
    }

    /// Whether an attempt is still in flight
    pub fn is_active(&self) -> bool {
        matches!(self, JobState::Pending | JobState::Running)
    }

    /// Whether `next` is a legal forward transition within one attempt
    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Pending, JobState::Running)
                | (JobState::Running, JobState::Completed)
                | (JobState::Running, JobState::Failed)
                | (JobState::Completed, JobState::Expired)
        )
    }

    /// Lowercase name, as serialized
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Expired => "expired",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified cause of a failed attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The video does not exist or is not accessible
    NotFound,
    /// The platform throttled the request
    RateLimited,
    /// The platform or network was unavailable
    UpstreamUnavailable,
    /// The requested format cannot be produced for this video
    UnsupportedFormat,
    /// Extraction exceeded its time budget
    Timeout,
    /// The artifact could not be written to the store
    StorageError,
}

impl FailureKind {
    /// Machine-readable code, as serialized
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NotFound => "not_found",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::UpstreamUnavailable => "upstream_unavailable",
            FailureKind::UnsupportedFormat => "unsupported_format",
            FailureKind::Timeout => "timeout",
            FailureKind::StorageError => "storage_error",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error recorded on a `Failed` job
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct JobFailure {
    /// Failure class
    pub kind: FailureKind,
    /// Human-readable detail (usually the extractor's last error line)
    pub message: String,
}

impl JobFailure {
    /// Create a new failure record
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Audit record of one attempt at a job
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct AttemptRecord {
    /// Attempt number (1-based)
    pub attempt: u32,
    /// When the attempt was accepted
    #[schema(value_type = String, format = DateTime)]
    pub started_at: DateTime<Utc>,
    /// When the attempt reached a terminal state
    #[schema(value_type = Option<String>, format = DateTime)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Terminal state of the attempt, if it has one
    pub outcome: Option<JobState>,
    /// Number of extractor invocations (1 + internal retries)
    pub extractor_calls: u32,
    /// Failure recorded for this attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    /// When retention evicted the artifact this attempt produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub expired_at: Option<DateTime<Utc>>,
}

/// Read-only snapshot of a job, as returned by `get_status`
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct JobStatus {
    /// Video id
    pub video_id: String,
    /// Media kind
    pub kind: MediaKind,
    /// Current state
    pub state: JobState,
    /// Current attempt number
    pub attempt: u32,
    /// Failure detail (set iff `state == Failed`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    /// Artifact size (set iff `state == Completed`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    /// Artifact file name (set iff `state == Completed`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// When the job was first requested
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTime<Utc>,
    /// When the job last changed state
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: DateTime<Utc>,
    /// Artifact streams currently open through this job
    pub waiters: usize,
    /// Per-attempt history, oldest first
    pub attempts: Vec<AttemptRecord>,
}

impl JobStatus {
    /// The key this snapshot describes
    pub fn key(&self) -> Option<JobKey> {
        JobKey::resolve(&self.video_id, self.kind).ok()
    }
}

/// Result of a retention sweep
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct SweepReport {
    /// Jobs whose artifacts were evicted (now `Expired`)
    pub expired: Vec<JobKey>,
    /// Registry entries garbage-collected
    pub removed: Vec<JobKey>,
    /// Bytes of artifact storage reclaimed
    pub reclaimed_bytes: u64,
}

/// Event emitted during the job lifecycle
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A new attempt was accepted
    Queued {
        /// Job key
        key: JobKey,
        /// Attempt number
        attempt: u32,
    },

    /// The extractor was started for an attempt
    Running {
        /// Job key
        key: JobKey,
        /// Attempt number
        attempt: u32,
    },

    /// The artifact was committed
    Completed {
        /// Job key
        key: JobKey,
        /// Attempt number
        attempt: u32,
        /// Artifact file name
        file_name: String,
        /// Artifact size
        size_bytes: u64,
    },

    /// The attempt failed terminally
    Failed {
        /// Job key
        key: JobKey,
        /// Attempt number
        attempt: u32,
        /// Failure detail
        error: JobFailure,
    },

    /// The artifact was evicted
    Expired {
        /// Job key
        key: JobKey,
    },

    /// The job was dropped from the registry
    Removed {
        /// Job key
        key: JobKey,
    },

    /// Orchestrator is shutting down
    Shutdown,
}

impl Event {
    /// Event name used for SSE framing
    pub fn name(&self) -> &'static str {
        match self {
            Event::Queued { .. } => "queued",
            Event::Running { .. } => "running",
            Event::Completed { .. } => "completed",
            Event::Failed { .. } => "failed",
            Event::Expired { .. } => "expired",
            Event::Removed { .. } => "removed",
            Event::Shutdown => "shutdown",
        }
    }
}
