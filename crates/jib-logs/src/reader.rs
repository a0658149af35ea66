use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::index::LogIndex;

/// Hard cap on lines returned from a single log read.
pub const MAX_READ_LINES: usize = 10_000;
/// Files larger than this are read partially (reads) or skipped (search).
pub const MAX_LOG_FILE_BYTES: u64 = 50 * 1024 * 1024;
/// Hard cap on matches returned from one search call.
pub const MAX_SEARCH_RESULTS: usize = 1_000;
/// Wall-clock budget for one search call.
pub const SEARCH_TIMEOUT: Duration = Duration::from_millis(5_000);
/// Longest accepted search pattern, in characters.
pub const MAX_PATTERN_CHARS: usize = 500;
/// Most explicit capture groups accepted in a search pattern.
pub const MAX_CAPTURE_GROUPS: usize = 10;
/// Longest matched-line excerpt included in a search result.
pub const MAX_MATCH_CHARS: usize = 500;

/// Limits and roots applied to every log read and search operation.
#[derive(Debug, Clone)]
pub struct LogReaderConfig {
    pub logs_dir: PathBuf,
    pub output_dir: PathBuf,
    pub max_lines: usize,
    pub max_file_bytes: u64,
    pub max_search_results: usize,
    pub search_timeout: Duration,
    pub max_pattern_chars: usize,
    pub max_capture_groups: usize,
}

impl LogReaderConfig {
    /// Builds a config over the given roots with the standard limits.
    pub fn new(logs_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            logs_dir: logs_dir.into(),
            output_dir: output_dir.into(),
            max_lines: MAX_READ_LINES,
            max_file_bytes: MAX_LOG_FILE_BYTES,
            max_search_results: MAX_SEARCH_RESULTS,
            search_timeout: SEARCH_TIMEOUT,
            max_pattern_chars: MAX_PATTERN_CHARS,
            max_capture_groups: MAX_CAPTURE_GROUPS,
        }
    }
}

/// Public struct `LogContent` returned by every log read operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
    pub content: String,
    pub lines: usize,
    pub truncated: bool,
    pub size_bytes: u64,
}

/// Bounded reader over container and task log files.
///
/// Reads never propagate filesystem errors: unreadable sources degrade to a
/// [`LogContent`] carrying an explanatory message with `size_bytes` zeroed.
#[derive(Debug)]
pub struct LogReader {
    pub(crate) config: LogReaderConfig,
    pub(crate) index: Arc<LogIndex>,
}

impl LogReader {
    /// Creates a reader over the configured roots backed by `index`.
    pub fn new(config: LogReaderConfig, index: Arc<LogIndex>) -> Self {
        Self { config, index }
    }

    /// Reads logs for `task_id`, trying the task symlink, then the owning
    /// container's aggregate log via the index, then the per-task output log.
    /// Returns `None` when no source exists.
    pub fn read_task_logs(&self, task_id: &str, max_lines: usize) -> Option<LogContent> {
        let max_lines = max_lines.clamp(1, self.config.max_lines);

        let symlink = self
            .config
            .logs_dir
            .join("tasks")
            .join(format!("{task_id}.log"));
        if symlink.exists() {
            let mut content = self.read_log_file(&symlink, max_lines);
            content.task_id = Some(task_id.to_string());
            return Some(content);
        }

        if let Some(container_id) = self.index.container_for_task(task_id) {
            let container_log = self.config.logs_dir.join(format!("{container_id}.log"));
            if container_log.exists() {
                let mut content = self.read_log_file(&container_log, max_lines);
                content.task_id = Some(task_id.to_string());
                content.container_id = Some(container_id);
                return Some(content);
            }
        }

        let fallback = self.config.output_dir.join(format!("{task_id}.log"));
        if fallback.exists() {
            let mut content = self.read_log_file(&fallback, max_lines);
            content.task_id = Some(task_id.to_string());
            return Some(content);
        }

        None
    }

    /// Reads the aggregate log for `container_id`. A missing file degrades to
    /// an explanatory [`LogContent`] rather than an error.
    pub fn read_container_logs(&self, container_id: &str, max_lines: usize) -> LogContent {
        let path = self.config.logs_dir.join(format!("{container_id}.log"));
        let mut content = self.read_log_file(&path, max_lines.clamp(1, self.config.max_lines));
        content.container_id = Some(container_id.to_string());
        content
    }

    /// Reads the model output artifact for `task_id`, preferring the JSON
    /// artifact over the plain log. Returns `None` when neither exists.
    pub fn read_model_output(&self, task_id: &str) -> Option<LogContent> {
        for extension in ["json", "log"] {
            let path = self.config.output_dir.join(format!("{task_id}.{extension}"));
            if path.exists() {
                let mut content = self.read_log_file(&path, self.config.max_lines);
                content.task_id = Some(task_id.to_string());
                return Some(content);
            }
        }
        None
    }

    /// Reads at most `max_lines` lines from `path`, stopping at the byte cap.
    /// Symlinks are resolved first so the reported `log_file` names the real
    /// source.
    pub(crate) fn read_log_file(&self, path: &Path, max_lines: usize) -> LogContent {
        let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let display_path = resolved.display().to_string();
        let mut content = LogContent {
            task_id: None,
            container_id: None,
            log_file: Some(display_path.clone()),
            content: String::new(),
            lines: 0,
            truncated: false,
            size_bytes: 0,
        };

        let metadata = match std::fs::metadata(&resolved) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(path = %display_path, error = %error, "log file stat failed");
                content.content = format!("Log file unavailable: {error}");
                return content;
            }
        };
        content.size_bytes = metadata.len();
        if metadata.len() > self.config.max_file_bytes {
            content.truncated = true;
        }

        let file = match std::fs::File::open(&resolved) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(path = %display_path, error = %error, "log file open failed");
                content.content = format!("Log file unavailable: {error}");
                content.size_bytes = 0;
                return content;
            }
        };

        let mut reader = BufReader::new(file.take(self.config.max_file_bytes));
        let mut collected: Vec<String> = Vec::new();
        let mut buffer: Vec<u8> = Vec::new();
        loop {
            if collected.len() >= max_lines {
                content.truncated = true;
                break;
            }
            buffer.clear();
            match reader.read_until(b'\n', &mut buffer) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buffer);
                    collected.push(line.trim_end_matches(['\r', '\n']).to_string());
                }
                Err(error) => {
                    tracing::warn!(path = %display_path, error = %error, "log file read failed");
                    content.truncated = true;
                    break;
                }
            }
        }

        content.lines = collected.len();
        content.content = collected.join("\n");
        content
    }
}
