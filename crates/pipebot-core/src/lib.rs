//! Foundational low-level utilities shared across pipebot crates.
//!
//! Provides chain-scoped temporary files, the exactly-once cleanup tracker that
//! releases them, and a wall-clock helper used for chain ids.

pub mod cleanup;
pub mod temp_files;
pub mod time_utils;

pub use cleanup::{CleanupReport, CleanupTracker};
pub use temp_files::{sanitize_file_name, FileHandle, TempFileStore};
pub use time_utils::current_unix_timestamp_ms;
