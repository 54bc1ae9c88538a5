//! Fetcher output parsing.
//!
//! The fetcher emits one human-readable progress line per update, e.g.
//!
//! ```text
//! [download]  42.0% of 10MiB at 1MiB/s ETA 00:10
//! ```
//!
//! Lines that carry a percentage yield a normalized value; any other
//! line is still a liveness signal (the fetcher is running) but carries
//! no new progress.

use std::sync::LazyLock;

use regex::Regex;

static DOWNLOAD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[download\]\s+(\d+(?:\.\d+)?)%").expect("valid regex"));

/// Extract a download percentage from a fetcher output line.
///
/// Returns `None` for lines without a percentage token (destination
/// announcements, merge messages, warnings). The fractional value is
/// rounded to the nearest integer and clamped to 100.
pub fn parse_fetch_progress(line: &str) -> Option<u8> {
    let caps = DOWNLOAD_RE.captures(line)?;
    let percent: f64 = caps[1].parse().ok()?;
    Some(percent.round().min(100.0) as u8)
}
