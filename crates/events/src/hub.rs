use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use reelpress_core::error::CoreError;
use reelpress_core::job::{JobId, JobSnapshot};
use reelpress_registry::JobRegistry;

/// Identifier for one attached subscriber channel.
pub type SubscriberId = Uuid;

/// Channel sender half for pushing events to one subscriber.
type Sender = mpsc::UnboundedSender<PushEvent>;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Tag carried by every delivered event.
///
/// The wire names double as SSE event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Generic state change (status transition, initial snapshot replay).
    Update,
    /// New download percentage during the fetch stage.
    DownloadProgress,
    /// New conversion percentage during the transcode stage.
    ConvertProgress,
    /// Liveness signal without a progress change.
    Message,
    /// Job finished successfully.
    Done,
    /// Job failed.
    Error,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::DownloadProgress => "download-progress",
            Self::ConvertProgress => "convert-progress",
            Self::Message => "message",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One delivery to a subscriber: an event tag plus the job's complete
/// current snapshot, never a diff.
#[derive(Debug, Clone)]
pub struct PushEvent {
    pub kind: EventKind,
    pub snapshot: JobSnapshot,
}

// ---------------------------------------------------------------------------
// NotificationHub
// ---------------------------------------------------------------------------

/// Per-job subscriber sets and snapshot fan-out.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared between the HTTP layer (attach/detach) and the job tasks
/// (broadcast). The registry reference makes attach atomic with the
/// snapshot read: a subscriber either sees an event in its initial
/// snapshot or receives it on its channel, never neither.
pub struct NotificationHub {
    registry: Arc<JobRegistry>,
    subscribers: RwLock<HashMap<JobId, HashMap<SubscriberId, Sender>>>,
}

impl NotificationHub {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self {
            registry,
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Attach a new subscriber to `id`.
    ///
    /// Fails with `NotFound` for unknown identifiers. On success the
    /// job's current full-state snapshot is already queued on the
    /// returned channel (as an `update` event) ahead of any live event,
    /// so a subscriber joining mid-job is never without initial state.
    pub async fn attach(
        &self,
        id: JobId,
    ) -> Result<(SubscriberId, mpsc::UnboundedReceiver<PushEvent>), CoreError> {
        // Hold the subscriber lock across the snapshot read so a
        // concurrent broadcast cannot fall between replay and registration.
        let mut subscribers = self.subscribers.write().await;

        let snapshot = self
            .registry
            .get(id)
            .await
            .ok_or(CoreError::NotFound { entity: "Job", id })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(PushEvent {
            kind: EventKind::Update,
            snapshot,
        });

        let subscriber_id = Uuid::new_v4();
        subscribers.entry(id).or_default().insert(subscriber_id, tx);

        tracing::debug!(job_id = %id, subscriber_id = %subscriber_id, "Subscriber attached");
        Ok((subscriber_id, rx))
    }

    /// Remove a subscriber from `id`.
    ///
    /// Safe to call repeatedly, after the job reached a terminal state,
    /// or for identifiers that were already pruned.
    pub async fn detach(&self, id: JobId, subscriber_id: SubscriberId) {
        let mut subscribers = self.subscribers.write().await;
        if let Some(channels) = subscribers.get_mut(&id) {
            if channels.remove(&subscriber_id).is_some() {
                tracing::debug!(job_id = %id, subscriber_id = %subscriber_id, "Subscriber detached");
            }
            if channels.is_empty() {
                subscribers.remove(&id);
            }
        }
    }

    /// Deliver a tagged snapshot to every subscriber attached to `id`.
    ///
    /// Subscribers whose channels have closed are silently skipped and
    /// pruned in the same pass; a dead channel never aborts delivery to
    /// the remaining subscribers.
    pub async fn broadcast(&self, id: JobId, kind: EventKind, snapshot: JobSnapshot) {
        let mut subscribers = self.subscribers.write().await;
        let Some(channels) = subscribers.get_mut(&id) else {
            return;
        };

        channels.retain(|_, tx| {
            tx.send(PushEvent {
                kind,
                snapshot: snapshot.clone(),
            })
            .is_ok()
        });

        if channels.is_empty() {
            subscribers.remove(&id);
        }
    }

    /// Number of subscribers currently attached to `id`.
    pub async fn subscriber_count(&self, id: JobId) -> usize {
        self.subscribers
            .read()
            .await
            .get(&id)
            .map_or(0, HashMap::len)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use reelpress_core::job::{JobPatch, JobStatus};

    async fn hub_with_job() -> (Arc<JobRegistry>, NotificationHub, JobId) {
        let registry = Arc::new(JobRegistry::new());
        let hub = NotificationHub::new(Arc::clone(&registry));
        let id = registry.create().await;
        (registry, hub, id)
    }

    #[tokio::test]
    async fn attach_unknown_job_fails_with_not_found() {
        let registry = Arc::new(JobRegistry::new());
        let hub = NotificationHub::new(Arc::clone(&registry));

        let result = hub.attach(JobId::new()).await;

        assert_matches!(result, Err(CoreError::NotFound { entity: "Job", .. }));
    }

    #[tokio::test]
    async fn attach_replays_current_snapshot_first() {
        let (registry, hub, id) = hub_with_job().await;
        registry
            .update(
                id,
                JobPatch::new()
                    .with_status(JobStatus::Downloading)
                    .with_progress(37),
            )
            .await;

        let (_sub, mut rx) = hub.attach(id).await.expect("attach should succeed");

        let first = rx.recv().await.expect("initial snapshot should arrive");
        assert_eq!(first.kind, EventKind::Update);
        assert_eq!(first.snapshot.status, JobStatus::Downloading);
        assert_eq!(first.snapshot.progress, 37);
    }

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let (registry, hub, id) = hub_with_job().await;

        let (_s1, mut rx1) = hub.attach(id).await.unwrap();
        let (_s2, mut rx2) = hub.attach(id).await.unwrap();

        // Drain the initial replays.
        rx1.recv().await.unwrap();
        rx2.recv().await.unwrap();

        let snapshot = registry
            .update(id, JobPatch::new().with_progress(50))
            .await
            .unwrap();
        hub.broadcast(id, EventKind::DownloadProgress, snapshot).await;

        let e1 = rx1.recv().await.expect("subscriber 1 should receive");
        let e2 = rx2.recv().await.expect("subscriber 2 should receive");

        assert_eq!(e1.kind, EventKind::DownloadProgress);
        assert_eq!(e1.snapshot.progress, 50);
        assert_eq!(e1.snapshot, e2.snapshot);
    }

    #[tokio::test]
    async fn broadcast_skips_and_prunes_closed_channels() {
        let (_registry, hub, id) = hub_with_job().await;

        let (_s1, rx1) = hub.attach(id).await.unwrap();
        let (_s2, mut rx2) = hub.attach(id).await.unwrap();
        rx2.recv().await.unwrap();
        assert_eq!(hub.subscriber_count(id).await, 2);

        // Simulate a disconnected subscriber.
        drop(rx1);

        hub.broadcast(id, EventKind::Message, JobSnapshot::queued())
            .await;

        // The live subscriber still got the event; the dead one was pruned.
        let event = rx2.recv().await.expect("live subscriber should receive");
        assert_eq!(event.kind, EventKind::Message);
        assert_eq!(hub.subscriber_count(id).await, 1);
    }

    #[tokio::test]
    async fn broadcast_without_subscribers_is_a_noop() {
        let (_registry, hub, id) = hub_with_job().await;
        // Must not panic or error.
        hub.broadcast(id, EventKind::Update, JobSnapshot::queued())
            .await;
    }

    #[tokio::test]
    async fn detach_is_idempotent() {
        let (_registry, hub, id) = hub_with_job().await;

        let (sub, _rx) = hub.attach(id).await.unwrap();
        assert_eq!(hub.subscriber_count(id).await, 1);

        hub.detach(id, sub).await;
        hub.detach(id, sub).await;
        hub.detach(id, sub).await;

        assert_eq!(hub.subscriber_count(id).await, 0);
    }

    #[tokio::test]
    async fn detached_subscriber_receives_no_further_events() {
        let (_registry, hub, id) = hub_with_job().await;

        let (sub, mut rx) = hub.attach(id).await.unwrap();
        rx.recv().await.unwrap();
        hub.detach(id, sub).await;

        hub.broadcast(id, EventKind::Done, JobSnapshot::queued())
            .await;

        // Sender side is gone, so the channel yields None.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn events_are_delivered_in_broadcast_order() {
        let (registry, hub, id) = hub_with_job().await;

        let (_sub, mut rx) = hub.attach(id).await.unwrap();
        rx.recv().await.unwrap();

        for pct in [10u8, 20, 30, 40] {
            let snapshot = registry
                .update(id, JobPatch::new().with_progress(pct))
                .await
                .unwrap();
            hub.broadcast(id, EventKind::DownloadProgress, snapshot).await;
        }

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(rx.recv().await.unwrap().snapshot.progress);
        }
        assert_eq!(seen, vec![10, 20, 30, 40]);
    }
}
