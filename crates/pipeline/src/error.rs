use reelpress_core::job::JobId;

/// The externally executed phase a failure occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Transcode,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Fetch => "fetcher",
            Self::Transcode => "transcoder",
        };
        f.write_str(s)
    }
}

/// Errors that terminate a job.
///
/// All variants are fatal to their job only: no retries, no partial
/// recovery, and no effect on other jobs or the service process.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The external process could not be started at all.
    #[error("{stage} process could not be started: {source}")]
    Spawn {
        stage: Stage,
        #[source]
        source: std::io::Error,
    },

    /// The external process ran but exited with a non-zero code.
    #[error("{stage} process failed (exit code {exit_code:?}): {stderr}")]
    Execution {
        stage: Stage,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The fetch stage reported success but produced no file.
    #[error("no fetched media file found for job {id}")]
    ArtifactMissing { id: JobId },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
