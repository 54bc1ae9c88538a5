use std::path::Path;
use std::sync::Arc;

use axum::Router;

use reelpress_api::config::ServerConfig;
use reelpress_api::router::build_app_router;
use reelpress_api::state::AppState;
use reelpress_events::NotificationHub;
use reelpress_pipeline::Pipeline;
use reelpress_registry::JobRegistry;

/// Build a test `ServerConfig` with safe defaults.
///
/// The fetcher and transcoder point at non-existent binaries so a
/// launched pipeline fails fast instead of touching the network; tests
/// that need real stage behaviour override them with stand-in scripts.
pub fn test_config(media_dir: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        media_dir: media_dir.to_path_buf(),
        fetcher_bin: "/nonexistent/fetcher".to_string(),
        transcoder_bin: "/nonexistent/transcoder".to_string(),
        public_base_path: "/media".to_string(),
    }
}

/// Build the full application router with all middleware layers, plus
/// the state behind it for direct assertions.
///
/// Uses [`build_app_router`] so integration tests exercise the same
/// middleware stack (CORS, request ID, timeout, tracing, panic
/// recovery) that production uses.
pub fn build_test_app(config: ServerConfig) -> (Router, AppState) {
    let registry = Arc::new(JobRegistry::new());
    let hub = Arc::new(NotificationHub::new(Arc::clone(&registry)));
    let pipeline = Arc::new(Pipeline::new(
        Arc::clone(&registry),
        Arc::clone(&hub),
        config.pipeline_config(),
    ));

    let state = AppState {
        config: Arc::new(config.clone()),
        registry,
        hub,
        pipeline,
    };

    (build_app_router(state.clone(), &config), state)
}
