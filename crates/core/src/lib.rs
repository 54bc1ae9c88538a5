//! Domain types and progress parsing for the reelpress pipeline.
//!
//! This crate has no I/O: it defines the job data model (identifiers,
//! status machine, snapshots, partial-update patches) and the pure
//! parsers that turn fetcher/transcoder output lines into normalized
//! progress signals. The `registry`, `events`, and `pipeline` crates
//! build on these types.

pub mod error;
pub mod fetch_progress;
pub mod job;
pub mod transcode_progress;

pub use error::CoreError;
