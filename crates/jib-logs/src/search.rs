use std::collections::BTreeSet;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::time::Instant;

use jib_core::truncate_chars;
use regex::RegexBuilder;
use serde::Serialize;
use thiserror::Error;

use crate::reader::{LogReader, LogReaderConfig, MAX_MATCH_CHARS};

/// Pattern shapes rejected outright, before compilation or any file access.
const DANGEROUS_PATTERN_SHAPES: [&str; 8] = [
    "(.*)+",
    "(.+)+",
    "(.*)*",
    "(.+)*",
    "(a+)+",
    "(a*)+",
    "(a+)*",
    "(a*)*",
];

/// Enumerates failure modes surfaced by log search.
#[derive(Debug, Error)]
pub enum LogSearchError {
    #[error("invalid search pattern: {0}")]
    PatternValidation(String),
    #[error("search timed out after {budget_ms} ms")]
    Timeout { budget_ms: u64 },
}

/// Public struct `SearchMatch` describing one matched log line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchMatch {
    pub log_file: String,
    pub line_number: usize,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
}

/// Public struct `SearchReport` summarizing one bounded search call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchReport {
    pub matches: Vec<SearchMatch>,
    pub truncated: bool,
    pub files_scanned: usize,
}

/// Validates a search pattern against the configured limits and the
/// dangerous-shape deny-list. Runs before any file access.
pub fn validate_search_pattern(
    pattern: &str,
    config: &LogReaderConfig,
) -> Result<(), LogSearchError> {
    if pattern.is_empty() {
        return Err(LogSearchError::PatternValidation(
            "pattern must not be empty".to_string(),
        ));
    }

    let length = pattern.chars().count();
    if length > config.max_pattern_chars {
        return Err(LogSearchError::PatternValidation(format!(
            "pattern length {length} exceeds the {} character limit",
            config.max_pattern_chars
        )));
    }

    let groups = count_capture_groups(pattern);
    if groups > config.max_capture_groups {
        return Err(LogSearchError::PatternValidation(format!(
            "pattern has {groups} capture groups, limit is {}",
            config.max_capture_groups
        )));
    }

    for shape in DANGEROUS_PATTERN_SHAPES {
        if pattern.contains(shape) {
            return Err(LogSearchError::PatternValidation(format!(
                "pattern contains the disallowed construct '{shape}'"
            )));
        }
    }

    Ok(())
}

/// Counts explicit capture groups: unescaped `(` outside character classes,
/// excluding `(?`-prefixed non-capturing forms.
fn count_capture_groups(pattern: &str) -> usize {
    let bytes = pattern.as_bytes();
    let mut count = 0usize;
    let mut in_class = false;
    let mut index = 0usize;
    while index < bytes.len() {
        match bytes[index] {
            b'\\' => index += 1,
            b'[' if !in_class => in_class = true,
            b']' if in_class => in_class = false,
            b'(' if !in_class => {
                if bytes.get(index + 1) != Some(&b'?') {
                    count += 1;
                }
            }
            _ => {}
        }
        index += 1;
    }
    count
}

impl LogReader {
    /// Searches the container's log files for `pattern`, case-insensitively,
    /// under the configured wall-clock budget.
    ///
    /// Candidate files are the distinct `log_file` values among the
    /// container's index entries plus the container aggregate log. The
    /// deadline is checked between lines and between files; exceeding it
    /// discards partial matches and returns [`LogSearchError::Timeout`].
    pub fn search_logs(
        &self,
        pattern: &str,
        container_id: &str,
        max_results: usize,
    ) -> Result<SearchReport, LogSearchError> {
        validate_search_pattern(pattern, &self.config)?;

        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|error| LogSearchError::PatternValidation(error.to_string()))?;

        let max_results = max_results.clamp(1, self.config.max_search_results);
        let budget = self.config.search_timeout;
        let deadline = Instant::now() + budget;
        let timeout = || LogSearchError::Timeout {
            budget_ms: budget.as_millis().min(u128::from(u64::MAX)) as u64,
        };

        let data = self.index.load();
        let mut seen: BTreeSet<PathBuf> = BTreeSet::new();
        let mut candidates: Vec<(PathBuf, Option<String>)> = Vec::new();
        for entry in data
            .entries
            .iter()
            .filter(|entry| entry.container_id == container_id)
        {
            let Some(log_file) = entry.log_file.as_deref() else {
                continue;
            };
            let path = PathBuf::from(log_file);
            let path = if path.is_absolute() {
                path
            } else {
                self.config.logs_dir.join(path)
            };
            if seen.insert(path.clone()) {
                candidates.push((path, entry.task_id.clone()));
            }
        }
        let aggregate = self.config.logs_dir.join(format!("{container_id}.log"));
        if seen.insert(aggregate.clone()) {
            candidates.push((aggregate, None));
        }

        let mut matches: Vec<SearchMatch> = Vec::new();
        let mut truncated = false;
        let mut files_scanned = 0usize;

        'files: for (path, task_id) in candidates {
            if Instant::now() >= deadline {
                return Err(timeout());
            }

            let metadata = match std::fs::metadata(&path) {
                Ok(value) => value,
                Err(_) => continue,
            };
            if metadata.len() > self.config.max_file_bytes {
                tracing::debug!(
                    path = %path.display(),
                    size_bytes = metadata.len(),
                    "skipping oversized log file in search"
                );
                continue;
            }
            let file = match std::fs::File::open(&path) {
                Ok(value) => value,
                Err(error) => {
                    tracing::debug!(path = %path.display(), error = %error, "skipping unreadable log file in search");
                    continue;
                }
            };
            files_scanned = files_scanned.saturating_add(1);

            let mut reader = BufReader::new(file);
            let mut buffer: Vec<u8> = Vec::new();
            let mut line_number = 0usize;
            loop {
                if Instant::now() >= deadline {
                    return Err(timeout());
                }
                buffer.clear();
                match reader.read_until(b'\n', &mut buffer) {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(_) => break,
                }
                line_number = line_number.saturating_add(1);
                let line = String::from_utf8_lossy(&buffer);
                let line = line.trim_end_matches(['\r', '\n']);
                if !regex.is_match(line) {
                    continue;
                }
                matches.push(SearchMatch {
                    log_file: path.display().to_string(),
                    line_number,
                    content: truncate_chars(line, MAX_MATCH_CHARS),
                    task_id: task_id.clone(),
                    container_id: Some(container_id.to_string()),
                });
                if matches.len() >= max_results {
                    truncated = true;
                    break 'files;
                }
            }
        }

        Ok(SearchReport {
            matches,
            truncated,
            files_scanned,
        })
    }
}
