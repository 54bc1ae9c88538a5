use std::sync::Arc;

use reelpress_events::NotificationHub;
use reelpress_pipeline::Pipeline;
use reelpress_registry::JobRegistry;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Authoritative in-memory job store.
    pub registry: Arc<JobRegistry>,
    /// Per-job subscriber fan-out.
    pub hub: Arc<NotificationHub>,
    /// Job orchestrator (spawns the per-job pipeline tasks).
    pub pipeline: Arc<Pipeline>,
}
