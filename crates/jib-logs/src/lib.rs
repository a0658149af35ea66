//! Ownership-scoped log index, access policy, and bounded read/search for
//! the Jib gateway.
//!
//! The index is written by an external registrar and only ever read here;
//! every read and search path is bounded by explicit line, byte, result, and
//! wall-clock limits so one request cannot monopolize the sidecar.

pub mod index;
pub mod policy;
pub mod reader;
pub mod search;

pub use index::{LogEntry, LogIndex, LogIndexData};
pub use policy::{check_container_access, check_search_access, check_task_access};
pub use reader::{LogContent, LogReader, LogReaderConfig};
pub use search::{validate_search_pattern, LogSearchError, SearchMatch, SearchReport};
