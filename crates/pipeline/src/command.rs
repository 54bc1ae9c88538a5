//! External process invocation.
//!
//! Both stages run opaque external binaries configured by path, with
//! stdout/stderr piped and `kill_on_drop` so an abandoned child does not
//! outlive its job task.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use reelpress_core::job::JobId;

/// Paths and binaries the pipeline operates with.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Shared directory for fetched intermediates and final outputs.
    pub media_dir: PathBuf,
    /// Fetcher binary (yt-dlp compatible invocation and output).
    pub fetcher_bin: String,
    /// Transcoder binary (ffmpeg compatible invocation and output).
    pub transcoder_bin: String,
    /// URL path prefix under which `media_dir` is served read-only.
    pub public_base_path: String,
}

impl PipelineConfig {
    /// Path of the final artifact for a job.
    pub fn output_path(&self, id: JobId) -> PathBuf {
        self.media_dir.join(format!("{id}.mp4"))
    }

    /// Externally reachable location of the final artifact.
    pub fn public_url(&self, id: JobId) -> String {
        format!("{}/{id}.mp4", self.public_base_path.trim_end_matches('/'))
    }
}

/// Build the fetch-stage command: retrieve `url` into the media
/// directory under an identifier-prefixed output template.
///
/// `--newline` forces one progress line per update instead of a
/// carriage-return redrawn status bar.
pub(crate) fn fetch_command(config: &PipelineConfig, id: JobId, url: &str) -> Command {
    let template = config.media_dir.join(format!("{id}.%(ext)s"));

    let mut cmd = Command::new(&config.fetcher_bin);
    cmd.arg("--newline")
        .arg("--no-playlist")
        .arg("-o")
        .arg(template)
        .arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Build the transcode-stage command: convert `input` to `output`,
/// reporting machine-parsable progress blocks on stdout and diagnostics
/// (including the one-time `Duration:` line) on stderr.
pub(crate) fn transcode_command(config: &PipelineConfig, input: &Path, output: &Path) -> Command {
    let mut cmd = Command::new(&config.transcoder_bin);
    cmd.arg("-y")
        .arg("-i")
        .arg(input)
        .arg("-progress")
        .arg("pipe:1")
        .arg("-nostats")
        .arg(output)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}
