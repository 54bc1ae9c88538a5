use std::path::PathBuf;

use reelpress_pipeline::PipelineConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Directory holding fetched intermediates and final artifacts.
    pub media_dir: PathBuf,
    /// Fetcher binary invoked for the download stage.
    pub fetcher_bin: String,
    /// Transcoder binary invoked for the conversion stage.
    pub transcoder_bin: String,
    /// URL path prefix under which `media_dir` is served read-only.
    pub public_base_path: String,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default     |
    /// |------------------------|-------------|
    /// | `HOST`                 | `0.0.0.0`   |
    /// | `PORT`                 | `3000`      |
    /// | `CORS_ORIGINS`         | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS` | `30`        |
    /// | `MEDIA_DIR`            | `media`     |
    /// | `FETCHER_BIN`          | `yt-dlp`    |
    /// | `TRANSCODER_BIN`       | `ffmpeg`    |
    /// | `PUBLIC_BASE_PATH`     | `/media`    |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let media_dir = PathBuf::from(std::env::var("MEDIA_DIR").unwrap_or_else(|_| "media".into()));

        let fetcher_bin = std::env::var("FETCHER_BIN").unwrap_or_else(|_| "yt-dlp".into());
        let transcoder_bin = std::env::var("TRANSCODER_BIN").unwrap_or_else(|_| "ffmpeg".into());

        let public_base_path =
            std::env::var("PUBLIC_BASE_PATH").unwrap_or_else(|_| "/media".into());

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            media_dir,
            fetcher_bin,
            transcoder_bin,
            public_base_path,
        }
    }

    /// The slice of this configuration the pipeline operates with.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            media_dir: self.media_dir.clone(),
            fetcher_bin: self.fetcher_bin.clone(),
            transcoder_bin: self.transcoder_bin.clone(),
            public_base_path: self.public_base_path.clone(),
        }
    }
}
