//! Foundational low-level utilities shared across Jib crates.
//!
//! Provides byte-safe text truncation, secret redaction, and time helpers
//! used by command execution, log reading, and gateway state reporting.

pub mod text_utils;
pub mod time_utils;

pub use text_utils::{redact_secrets, truncate_bytes, truncate_chars};
pub use time_utils::current_unix_timestamp_ms;
