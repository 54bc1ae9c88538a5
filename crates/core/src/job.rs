//! Job data model: identifiers, the status machine, snapshots, and patches.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Opaque job identifier, generated at submission and immutable thereafter.
///
/// V4 UUIDs give process-lifetime uniqueness without coordination, so no
/// two concurrent jobs can share an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Allocate a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Status machine
// ---------------------------------------------------------------------------

/// Lifecycle status of a job.
///
/// Statuses progress forward along `queued -> starting -> downloading ->
/// converting -> done`; `error` is reachable from any non-terminal status.
/// `done` and `error` are terminal: a record that reaches either never
/// changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Starting,
    Downloading,
    Converting,
    Done,
    Error,
}

impl JobStatus {
    /// Whether this status ends the job's lifecycle.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// Position in the forward progression. `Error` sits outside the order.
    fn rank(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Starting => 1,
            Self::Downloading => 2,
            Self::Converting => 3,
            Self::Done => 4,
            Self::Error => u8::MAX,
        }
    }

    /// Whether moving from `self` to `to` respects the status order.
    ///
    /// Terminal statuses admit no transition; `error` is admitted from
    /// any non-terminal status; otherwise only strictly forward moves.
    pub fn can_transition(self, to: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == Self::Error || to.rank() > self.rank()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Starting => "starting",
            Self::Downloading => "downloading",
            Self::Converting => "converting",
            Self::Done => "done",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// The complete current state of a job.
///
/// Every event delivered to subscribers carries one of these, never a
/// diff, so a late or lossy observer is always consistent from the
/// latest message alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Stage-relative progress, 0–100.
    pub progress: u8,
    /// Public location of the produced artifact; set only on success.
    pub url: Option<String>,
    /// Human-readable failure description; set only on failure.
    pub error: Option<String>,
}

impl JobSnapshot {
    /// The state of a freshly created job.
    pub fn queued() -> Self {
        Self {
            status: JobStatus::Queued,
            progress: 0,
            url: None,
            error: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Patch
// ---------------------------------------------------------------------------

/// A partial update to a job record.
///
/// Only fields that are `Some` are written; absent fields are left
/// untouched, so a patch can never null out state it did not intend to
/// change.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub url: Option<String>,
    pub error: Option<String>,
}

impl JobPatch {
    /// An empty patch; combine with the `with_*` builders.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Progress values are clamped to 100.
    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Merge this patch into `snapshot`, field by field.
    pub fn apply(&self, snapshot: &mut JobSnapshot) {
        if let Some(status) = self.status {
            snapshot.status = status;
        }
        if let Some(progress) = self.progress {
            snapshot.progress = progress;
        }
        if let Some(url) = &self.url {
            snapshot.url = Some(url.clone());
        }
        if let Some(error) = &self.error {
            snapshot.error = Some(error.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// Request body for job submission.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitJob {
    /// Source media URL to fetch and transcode.
    #[serde(default)]
    #[validate(length(min = 1, message = "url is required"))]
    pub url: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_are_unique() {
        assert_ne!(JobId::new(), JobId::new());
    }

    #[test]
    fn job_id_round_trips_through_display() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().expect("valid id string");
        assert_eq!(id, parsed);
    }

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Done.is_terminal());
        assert!(JobStatus::Error.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Converting.is_terminal());
    }

    #[test]
    fn forward_transitions_are_allowed() {
        assert!(JobStatus::Queued.can_transition(JobStatus::Starting));
        assert!(JobStatus::Starting.can_transition(JobStatus::Downloading));
        assert!(JobStatus::Downloading.can_transition(JobStatus::Converting));
        assert!(JobStatus::Converting.can_transition(JobStatus::Done));
    }

    #[test]
    fn backward_transitions_are_rejected() {
        assert!(!JobStatus::Converting.can_transition(JobStatus::Downloading));
        assert!(!JobStatus::Downloading.can_transition(JobStatus::Queued));
    }

    #[test]
    fn error_is_reachable_from_any_non_terminal_status() {
        for status in [
            JobStatus::Queued,
            JobStatus::Starting,
            JobStatus::Downloading,
            JobStatus::Converting,
        ] {
            assert!(status.can_transition(JobStatus::Error), "{status}");
        }
    }

    #[test]
    fn terminal_statuses_admit_no_transition() {
        assert!(!JobStatus::Done.can_transition(JobStatus::Error));
        assert!(!JobStatus::Error.can_transition(JobStatus::Done));
        assert!(!JobStatus::Done.can_transition(JobStatus::Queued));
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&JobStatus::Downloading).unwrap();
        assert_eq!(json, "\"downloading\"");
    }

    #[test]
    fn patch_merges_only_provided_fields() {
        let mut snapshot = JobSnapshot {
            status: JobStatus::Converting,
            progress: 40,
            url: None,
            error: None,
        };

        JobPatch::new().with_progress(55).apply(&mut snapshot);

        assert_eq!(snapshot.status, JobStatus::Converting);
        assert_eq!(snapshot.progress, 55);
        assert!(snapshot.url.is_none());
    }

    #[test]
    fn patch_never_nulls_out_existing_fields() {
        let mut snapshot = JobSnapshot {
            status: JobStatus::Done,
            progress: 100,
            url: Some("/media/out.mp4".to_string()),
            error: None,
        };

        JobPatch::new().with_progress(100).apply(&mut snapshot);

        assert_eq!(snapshot.url.as_deref(), Some("/media/out.mp4"));
    }

    #[test]
    fn patch_clamps_progress() {
        let mut snapshot = JobSnapshot::queued();
        JobPatch::new().with_progress(250).apply(&mut snapshot);
        assert_eq!(snapshot.progress, 100);
    }

    #[test]
    fn submit_job_rejects_empty_url() {
        let submit = SubmitJob { url: String::new() };
        assert!(validator::Validate::validate(&submit).is_err());
    }

    #[test]
    fn submit_job_accepts_non_empty_url() {
        let submit = SubmitJob {
            url: "https://example.com/watch?v=abc".to_string(),
        };
        assert!(validator::Validate::validate(&submit).is_ok());
    }
}
