use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use reelpress_core::job::{JobId, JobPatch, JobSnapshot};

/// A registry entry: the job's observable state plus bookkeeping that is
/// never exposed in snapshots.
#[derive(Debug)]
struct JobEntry {
    snapshot: JobSnapshot,
    /// When the job was submitted.
    created_at: DateTime<Utc>,
}

/// The authoritative in-memory map from job identifier to job record.
///
/// Thread-safe via interior locking; designed to be wrapped in `Arc` and
/// shared across the application. The outer map lock is held only for
/// insert and lookup; each record carries its own lock, so concurrent
/// work on distinct jobs never contends.
///
/// Records are never evicted: the registry grows for the lifetime of the
/// process.
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Arc<RwLock<JobEntry>>>>,
}

impl JobRegistry {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Allocate a fresh identifier and insert a `queued` record for it.
    pub async fn create(&self) -> JobId {
        let id = JobId::new();
        let entry = JobEntry {
            snapshot: JobSnapshot::queued(),
            created_at: Utc::now(),
        };
        self.jobs
            .write()
            .await
            .insert(id, Arc::new(RwLock::new(entry)));

        tracing::debug!(job_id = %id, "Job record created");
        id
    }

    /// Point-in-time snapshot of a job, or `None` for unknown identifiers.
    pub async fn get(&self, id: JobId) -> Option<JobSnapshot> {
        let entry = self.entry(id).await?;
        let guard = entry.read().await;
        Some(guard.snapshot.clone())
    }

    /// Merge `patch` into the job's record and return the resulting snapshot.
    ///
    /// Only fields present in the patch are written. Patches against a
    /// record that already reached `done` or `error` are ignored (the
    /// unchanged snapshot is returned), so terminal state is immutable no
    /// matter what a late caller attempts. A patch whose status change
    /// violates the forward status order is dropped whole.
    pub async fn update(&self, id: JobId, patch: JobPatch) -> Option<JobSnapshot> {
        let entry = self.entry(id).await?;
        let mut guard = entry.write().await;

        let current = guard.snapshot.status;
        if current.is_terminal() {
            tracing::debug!(job_id = %id, status = %current, "Ignoring update to terminal job");
        } else if patch
            .status
            .is_some_and(|next| !current.can_transition(next))
        {
            tracing::warn!(
                job_id = %id,
                from = %current,
                to = %patch.status.unwrap(),
                "Ignoring out-of-order status transition",
            );
        } else {
            patch.apply(&mut guard.snapshot);
        }

        Some(guard.snapshot.clone())
    }

    /// Snapshots of all known jobs, newest first.
    pub async fn list(&self) -> Vec<(JobId, JobSnapshot)> {
        let jobs = self.jobs.read().await;

        let mut entries = Vec::with_capacity(jobs.len());
        for (id, entry) in jobs.iter() {
            let guard = entry.read().await;
            entries.push((*id, guard.created_at, guard.snapshot.clone()));
        }

        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries.into_iter().map(|(id, _, s)| (id, s)).collect()
    }

    /// Number of records currently held.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Clone out a record handle, releasing the map lock immediately.
    async fn entry(&self, id: JobId) -> Option<Arc<RwLock<JobEntry>>> {
        self.jobs.read().await.get(&id).cloned()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
