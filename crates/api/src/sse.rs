//! Server-Sent Events subscription endpoint.
//!
//! Opens the long-lived push channel for one job: the current full-state
//! snapshot is delivered first, then the live sequence of tagged events,
//! until either side closes the connection. Disconnect is detected
//! reactively: dropping the stream detaches the subscriber exactly once.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;

use reelpress_core::job::JobId;
use reelpress_events::{NotificationHub, SubscriberId};

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/v1/jobs/{id}/events
///
/// Fails with 404 for unknown identifiers before the stream opens.
pub async fn subscribe(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> Result<impl IntoResponse, AppError> {
    let (subscriber_id, rx) = state.hub.attach(id).await?;

    tracing::debug!(job_id = %id, subscriber_id = %subscriber_id, "SSE subscriber connected");

    let guard = DetachGuard {
        hub: Arc::clone(&state.hub),
        id,
        subscriber_id,
    };

    let stream = UnboundedReceiverStream::new(rx).map(move |push| {
        // The guard lives inside the stream; dropping the stream (client
        // disconnect or server shutdown) detaches the subscriber.
        let _keep_alive = &guard;
        Event::default()
            .event(push.kind.as_str())
            .json_data(&push.snapshot)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Removes the subscriber from the hub when the SSE stream is dropped.
struct DetachGuard {
    hub: Arc<NotificationHub>,
    id: JobId,
    subscriber_id: SubscriberId,
}

impl Drop for DetachGuard {
    fn drop(&mut self) {
        let hub = Arc::clone(&self.hub);
        let id = self.id;
        let subscriber_id = self.subscriber_id;
        tokio::spawn(async move {
            hub.detach(id, subscriber_id).await;
            tracing::debug!(job_id = %id, subscriber_id = %subscriber_id, "SSE subscriber disconnected");
        });
    }
}
