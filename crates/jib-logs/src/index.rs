use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Public struct `LogEntry` describing one indexed task-log registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub container_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
    #[serde(default)]
    pub timestamp: f64,
}

/// Public struct `LogIndexData` holding one decoded snapshot of the on-disk
/// index written by the external log registrar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogIndexData {
    #[serde(default)]
    pub task_to_container: BTreeMap<String, String>,
    #[serde(default)]
    pub thread_to_task: BTreeMap<String, String>,
    #[serde(default)]
    pub entries: Vec<LogEntry>,
}

#[derive(Debug, Default)]
struct LogIndexCache {
    modified: Option<SystemTime>,
    data: Arc<LogIndexData>,
}

/// Mtime-cached reader over the shared log index file.
///
/// The cache holds exactly one decoded snapshot; `load` swaps snapshot and
/// recorded mtime together under the mutex, so readers always observe a
/// complete index. Decode and read failures degrade to the empty shape
/// instead of propagating.
#[derive(Debug)]
pub struct LogIndex {
    path: PathBuf,
    cache: Mutex<LogIndexCache>,
}

impl LogIndex {
    /// Creates an index reader over `path` with an empty warm cache.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(LogIndexCache::default()),
        }
    }

    /// Returns the decoded index, re-reading the file only when its
    /// modification time changed since the last load.
    pub fn load(&self) -> Arc<LogIndexData> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);

        let modified = match std::fs::metadata(&self.path).and_then(|meta| meta.modified()) {
            Ok(value) => value,
            Err(error) => {
                if error.kind() != ErrorKind::NotFound {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %error,
                        "log index stat failed; serving empty index"
                    );
                }
                return Arc::new(LogIndexData::default());
            }
        };

        if cache.modified == Some(modified) {
            return Arc::clone(&cache.data);
        }

        let data = match std::fs::read_to_string(&self.path) {
            Ok(raw) => match serde_json::from_str::<LogIndexData>(&raw) {
                Ok(parsed) => parsed,
                Err(error) => {
                    tracing::error!(
                        path = %self.path.display(),
                        error = %error,
                        "log index decode failed; serving empty index"
                    );
                    LogIndexData::default()
                }
            },
            Err(error) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %error,
                    "log index read failed; serving empty index"
                );
                LogIndexData::default()
            }
        };

        cache.modified = Some(modified);
        cache.data = Arc::new(data);
        Arc::clone(&cache.data)
    }

    /// Returns the container owning `task_id`, when indexed.
    pub fn container_for_task(&self, task_id: &str) -> Option<String> {
        self.load().task_to_container.get(task_id).cloned()
    }

    /// Returns the task registered for Slack thread `thread_ts`, when indexed.
    pub fn task_for_thread(&self, thread_ts: &str) -> Option<String> {
        self.load().thread_to_task.get(thread_ts).cloned()
    }

    /// Returns all task ids owned by `container_id`, ordered by task id.
    pub fn tasks_for_container(&self, container_id: &str) -> Vec<String> {
        self.load()
            .task_to_container
            .iter()
            .filter(|(_, owner)| owner.as_str() == container_id)
            .map(|(task_id, _)| task_id.clone())
            .collect()
    }

    /// Returns entries newest-first, optionally filtered by container, with
    /// the filter applied before pagination.
    pub fn list_entries(
        &self,
        container_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Vec<LogEntry> {
        self.load()
            .entries
            .iter()
            .rev()
            .filter(|entry| container_id.is_none_or(|wanted| entry.container_id == wanted))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }
}
