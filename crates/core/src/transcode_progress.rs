//! Transcoder output parsing.
//!
//! The transcoder reports progress as `key=value` pairs, one per line,
//! batched into periodic blocks terminated by a `progress=` sentinel
//! pair (`continue` mid-stream, `end` on the final block):
//!
//! ```text
//! frame=150
//! out_time_ms=5000000
//! progress=continue
//! ```
//!
//! Blocks arrive over a pipe and may be split across read chunks, so
//! [`TranscodeProgressParser`] buffers the partial trailing line and
//! flushes only complete lines. The total stream duration needed to turn
//! an `out_time_ms` offset into a percentage comes from a one-time
//! `Duration: HH:MM:SS.ff` line on the transcoder's diagnostic channel,
//! parsed by [`parse_duration_line`].

use std::sync::LazyLock;

use regex::Regex;

static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Duration:\s*(\d+):(\d{2}):(\d{2})(?:\.(\d+))?").expect("valid regex"));

/// One complete progress block from the transcoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressBlock {
    /// Elapsed output position in microseconds, if the block carried one.
    ///
    /// Despite its `_ms` spelling, the transcoder reports this key in
    /// microseconds.
    pub out_time_us: Option<u64>,
    /// Whether this block ended the stream (`progress=end`).
    pub end: bool,
}

/// Stateful line assembler for `key=value` progress blocks.
///
/// Feed raw chunks as they arrive; complete blocks are returned as soon
/// as their sentinel line is seen, and a partial trailing line is kept
/// across calls.
#[derive(Debug, Default)]
pub struct TranscodeProgressParser {
    buf: String,
    out_time_us: Option<u64>,
}

impl TranscodeProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk of transcoder output, returning every block whose
    /// sentinel line completed within it.
    pub fn feed(&mut self, chunk: &str) -> Vec<ProgressBlock> {
        self.buf.push_str(chunk);

        let mut blocks = Vec::new();
        while let Some(newline) = self.buf.find('\n') {
            let line: String = self.buf.drain(..=newline).collect();
            if let Some(block) = self.accept_line(line.trim_end()) {
                blocks.push(block);
            }
        }
        blocks
    }

    /// Process one complete line; returns a block when the sentinel pair
    /// closes it.
    fn accept_line(&mut self, line: &str) -> Option<ProgressBlock> {
        let (key, value) = line.split_once('=')?;
        match key.trim() {
            "out_time_ms" => {
                self.out_time_us = value.trim().parse().ok();
                None
            }
            "progress" => Some(ProgressBlock {
                out_time_us: self.out_time_us.take(),
                end: value.trim() == "end",
            }),
            // Other keys (frame, fps, bitrate, speed, ...) are irrelevant here.
            _ => None,
        }
    }
}

/// Compute a stage percentage from an elapsed offset and total duration.
///
/// Returns `None` when the duration is unknown or non-positive; the
/// caller then degrades to a status-only signal.
pub fn transcode_percent(out_time_us: u64, duration_secs: f64) -> Option<u8> {
    if duration_secs <= 0.0 {
        return None;
    }
    let elapsed_secs = out_time_us as f64 / 1_000_000.0;
    let percent = (elapsed_secs / duration_secs * 100.0).round();
    Some(percent.min(100.0) as u8)
}

/// Extract the total stream duration from a diagnostic line.
///
/// Recognizes `Duration: HH:MM:SS.ff` anywhere in the line and converts
/// it to seconds, fraction included.
pub fn parse_duration_line(line: &str) -> Option<f64> {
    let caps = DURATION_RE.captures(line)?;
    let hours: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    let fraction = caps
        .get(4)
        .map(|m| {
            let digits = m.as_str();
            digits.parse::<f64>().unwrap_or(0.0) / 10f64.powi(digits.len() as i32)
        })
        .unwrap_or(0.0);

    Some(hours * 3600.0 + minutes * 60.0 + seconds + fraction)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
