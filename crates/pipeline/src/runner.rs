//! The per-job orchestrator task.
//!
//! `Pipeline::launch` spawns one owning task per job; the task drives
//! `queued -> starting -> downloading -> converting -> done`, with
//! `error` reachable from any non-terminal state. Within the task the stages are
//! strictly sequential, but each spawned process is serviced by three
//! concurrent pieces: a stdout reader, a stderr reader, and the exit
//! wait, joined before the stage is considered complete.
//!
//! No timeout governs the spawned processes: a hung fetcher or
//! transcoder stalls its own job indefinitely (and only that job).

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

use reelpress_core::fetch_progress::parse_fetch_progress;
use reelpress_core::job::{JobId, JobPatch, JobStatus};
use reelpress_core::transcode_progress::{
    parse_duration_line, transcode_percent, TranscodeProgressParser,
};
use reelpress_events::{EventKind, NotificationHub};
use reelpress_registry::JobRegistry;

use crate::command::{fetch_command, transcode_command, PipelineConfig};
use crate::error::{PipelineError, Stage};

/// Maximum diagnostic text retained per process (the tail survives).
const MAX_STDERR_TAIL: usize = 8 * 1024;

/// Read buffer size for the transcoder's progress pipe.
const PROGRESS_CHUNK: usize = 4096;

/// Drives submitted jobs through the fetch/transcode state machine.
///
/// Cheaply cloneable (the registry and hub are behind `Arc`); each
/// launched job task carries its own clone.
#[derive(Clone)]
pub struct Pipeline {
    registry: Arc<JobRegistry>,
    hub: Arc<NotificationHub>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        registry: Arc<JobRegistry>,
        hub: Arc<NotificationHub>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            registry,
            hub,
            config,
        }
    }

    /// Spawn the owning task for `id` and return immediately.
    ///
    /// The job record must already exist in the registry. Any error the
    /// task encounters terminates that job cleanly; nothing escapes the
    /// task.
    pub fn launch(&self, id: JobId, url: String) {
        let pipeline = self.clone();
        tokio::spawn(async move {
            if let Err(e) = pipeline.run(id, &url).await {
                tracing::error!(job_id = %id, error = %e, "Job failed");
                pipeline
                    .transition(
                        id,
                        JobPatch::new()
                            .with_status(JobStatus::Error)
                            .with_error(e.to_string()),
                        EventKind::Error,
                    )
                    .await;
            }
        });
    }

    /// Execute the full pipeline for one job.
    async fn run(&self, id: JobId, url: &str) -> Result<(), PipelineError> {
        tracing::info!(job_id = %id, url, "Job accepted");
        self.transition(
            id,
            JobPatch::new().with_status(JobStatus::Starting),
            EventKind::Update,
        )
        .await;

        // Fetch stage. Progress restarts from zero.
        self.transition(
            id,
            JobPatch::new()
                .with_status(JobStatus::Downloading)
                .with_progress(0),
            EventKind::Update,
        )
        .await;
        self.run_fetch(id, url).await?;
        let fetched = self.find_fetched_file(id).await?;

        // Transcode stage. Progress restarts from zero.
        self.transition(
            id,
            JobPatch::new()
                .with_status(JobStatus::Converting)
                .with_progress(0),
            EventKind::Update,
        )
        .await;
        let output = self.config.output_path(id);
        self.run_transcode(id, &fetched, &output).await?;

        // Publish: drop the intermediate (best-effort) and expose the artifact.
        if let Err(e) = tokio::fs::remove_file(&fetched).await {
            tracing::warn!(
                job_id = %id,
                path = %fetched.display(),
                error = %e,
                "Failed to delete fetched intermediate",
            );
        }

        self.transition(
            id,
            JobPatch::new()
                .with_status(JobStatus::Done)
                .with_progress(100)
                .with_url(self.config.public_url(id)),
            EventKind::Done,
        )
        .await;
        tracing::info!(job_id = %id, "Job completed");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Fetch stage
    // -----------------------------------------------------------------------

    /// Run the fetcher to completion, surfacing parsed progress as it
    /// arrives.
    async fn run_fetch(&self, id: JobId, url: &str) -> Result<(), PipelineError> {
        let mut child = fetch_command(&self.config, id, url)
            .spawn()
            .map_err(|source| PipelineError::Spawn {
                stage: Stage::Fetch,
                source,
            })?;

        let stdout = child.stdout.take();
        let registry = Arc::clone(&self.registry);
        let hub = Arc::clone(&self.hub);
        let stdout_task = tokio::spawn(async move {
            let Some(stdout) = stdout else { return };
            let mut lines = BufReader::new(stdout).lines();
            let mut last_percent: Option<u8> = None;

            while let Ok(Some(line)) = lines.next_line().await {
                match parse_fetch_progress(&line) {
                    Some(percent) => {
                        // Fragmented downloads can restart their counter;
                        // progress within the stage stays non-decreasing.
                        if last_percent.is_some_and(|last| percent < last) {
                            continue;
                        }
                        last_percent = Some(percent);
                        if let Some(snapshot) = registry
                            .update(id, JobPatch::new().with_progress(percent))
                            .await
                        {
                            hub.broadcast(id, EventKind::DownloadProgress, snapshot).await;
                        }
                    }
                    None => {
                        // No percentage, but the fetcher is alive: echo the
                        // current snapshot as a liveness signal.
                        if let Some(snapshot) = registry.get(id).await {
                            hub.broadcast(id, EventKind::Message, snapshot).await;
                        }
                    }
                }
            }
        });

        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(read_stderr_tail(stderr));

        let status = child.wait().await?;
        let _ = stdout_task.await;
        let stderr_tail = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(PipelineError::Execution {
                stage: Stage::Fetch,
                exit_code: status.code(),
                stderr: stderr_tail,
            });
        }
        Ok(())
    }

    /// Locate the file the fetcher produced, by identifier-prefixed
    /// filename match in the media directory.
    async fn find_fetched_file(&self, id: JobId) -> Result<PathBuf, PipelineError> {
        let prefix = format!("{id}.");
        let mut entries = tokio::fs::read_dir(&self.config.media_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with(&prefix) {
                return Ok(entry.path());
            }
        }
        Err(PipelineError::ArtifactMissing { id })
    }

    // -----------------------------------------------------------------------
    // Transcode stage
    // -----------------------------------------------------------------------

    /// Run the transcoder to completion, converting its progress blocks
    /// into percentages once the stream duration is known.
    async fn run_transcode(
        &self,
        id: JobId,
        input: &Path,
        output: &Path,
    ) -> Result<(), PipelineError> {
        let mut child = transcode_command(&self.config, input, output)
            .spawn()
            .map_err(|source| PipelineError::Spawn {
                stage: Stage::Transcode,
                source,
            })?;

        // Total duration is discovered on the diagnostic channel while
        // progress blocks arrive on stdout; a write-once cell lets the
        // progress task pick it up the moment it resolves.
        let duration: Arc<OnceLock<f64>> = Arc::new(OnceLock::new());

        let stderr = child.stderr.take();
        let duration_writer = Arc::clone(&duration);
        let stderr_task = tokio::spawn(async move {
            let mut tail = String::new();
            let Some(stderr) = stderr else { return tail };
            let mut lines = BufReader::new(stderr).lines();

            while let Ok(Some(line)) = lines.next_line().await {
                if duration_writer.get().is_none() {
                    if let Some(secs) = parse_duration_line(&line) {
                        let _ = duration_writer.set(secs);
                        tracing::debug!(duration_secs = secs, "Stream duration discovered");
                    }
                }
                push_tail_line(&mut tail, &line);
            }
            tail
        });

        let stdout = child.stdout.take();
        let registry = Arc::clone(&self.registry);
        let hub = Arc::clone(&self.hub);
        let stdout_task = tokio::spawn(async move {
            let Some(mut stdout) = stdout else { return };
            let mut parser = TranscodeProgressParser::new();
            // Duplicate percentages are suppressed against the last value
            // actually surfaced, keeping notification volume bounded.
            let mut last_surfaced: Option<u8> = None;
            let mut buf = [0u8; PROGRESS_CHUNK];

            loop {
                let n = match stdout.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                let chunk = String::from_utf8_lossy(&buf[..n]);

                for block in parser.feed(&chunk) {
                    let percent = block.out_time_us.and_then(|us| {
                        duration.get().and_then(|&secs| transcode_percent(us, secs))
                    });

                    match percent {
                        Some(percent) if last_surfaced != Some(percent) => {
                            last_surfaced = Some(percent);
                            if let Some(snapshot) = registry
                                .update(id, JobPatch::new().with_progress(percent))
                                .await
                            {
                                hub.broadcast(id, EventKind::ConvertProgress, snapshot).await;
                            }
                        }
                        Some(_) => {}
                        None => {
                            // Duration not yet known (or block carried no
                            // offset): echo the last known progress.
                            if let Some(snapshot) = registry.get(id).await {
                                hub.broadcast(id, EventKind::Message, snapshot).await;
                            }
                        }
                    }
                }
            }
        });

        let status = child.wait().await?;
        let _ = stdout_task.await;
        let stderr_tail = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(PipelineError::Execution {
                stage: Stage::Transcode,
                exit_code: status.code(),
                stderr: stderr_tail,
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Registry/hub plumbing
    // -----------------------------------------------------------------------

    /// Apply a patch and broadcast the resulting snapshot.
    async fn transition(&self, id: JobId, patch: JobPatch, kind: EventKind) {
        if let Some(snapshot) = self.registry.update(id, patch).await {
            self.hub.broadcast(id, kind, snapshot).await;
        } else {
            tracing::warn!(job_id = %id, "Transition for unknown job ignored");
        }
    }
}

// ---------------------------------------------------------------------------
// Stream helpers
// ---------------------------------------------------------------------------

/// Collect a bounded diagnostic tail from a process error stream.
async fn read_stderr_tail<R>(reader: Option<R>) -> String
where
    R: AsyncRead + Unpin,
{
    let mut tail = String::new();
    let Some(reader) = reader else { return tail };
    let mut lines = BufReader::new(reader).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        push_tail_line(&mut tail, &line);
    }
    tail
}

/// Append a line, discarding from the front once the cap is exceeded.
fn push_tail_line(tail: &mut String, line: &str) {
    if !tail.is_empty() {
        tail.push('\n');
    }
    tail.push_str(line);

    if tail.len() > MAX_STDERR_TAIL {
        let excess = tail.len() - MAX_STDERR_TAIL;
        let cut = tail
            .char_indices()
            .map(|(i, _)| i)
            .find(|&i| i >= excess)
            .unwrap_or(0);
        tail.drain(..cut);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
