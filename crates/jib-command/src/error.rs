use jib_policy::PolicyResult;
use thiserror::Error;

/// Enumerates failure modes surfaced by git and gh command execution.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{0}")]
    Validation(String),
    #[error("unsupported git operation '{0}'")]
    UnsupportedOperation(String),
    #[error("{}", .0.reason)]
    PolicyDenied(PolicyResult),
    #[error("path '{0}' escapes the workspace root")]
    PathEscape(String),
    #[error("command timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
    #[error("failed to launch '{program}': {message}")]
    Spawn { program: String, message: String },
}
