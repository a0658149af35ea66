use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use jib_core::{redact_secrets, truncate_bytes};
use serde::Serialize;
use tokio::process::Command;

use crate::error::CommandError;

/// Environment variables copied into child processes after `env_clear`.
const SAFE_COMMAND_ENV_VARS: &[&str] = &["PATH", "HOME", "LANG", "LC_ALL", "TZ"];

/// Public struct `CommandOutput` describing one completed subprocess run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandOutput {
    pub success: bool,
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Shared subprocess runner for git and gh invocations.
///
/// Children start from a cleared environment plus the safe allow-list, are
/// killed on drop, and have stdout/stderr redacted and truncated before the
/// output leaves this module.
#[derive(Debug, Clone)]
pub(crate) struct ProcessRunner {
    pub(crate) max_output_bytes: usize,
    pub(crate) secrets: Vec<String>,
}

impl ProcessRunner {
    pub(crate) async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
        env: &[(&'static str, String)],
        timeout_ms: u64,
    ) -> Result<CommandOutput, CommandError> {
        let mut command = Command::new(program);
        command.args(args);
        command.kill_on_drop(true);
        command.env_clear();
        for key in SAFE_COMMAND_ENV_VARS {
            if let Ok(value) = std::env::var(key) {
                command.env(key, value);
            }
        }
        for (key, value) in env {
            command.env(key, value);
        }
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let timeout_duration = Duration::from_millis(timeout_ms.max(1));
        let output = match tokio::time::timeout(timeout_duration, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(error)) => {
                return Err(CommandError::Spawn {
                    program: program.to_string(),
                    message: error.to_string(),
                });
            }
            Err(_) => {
                tracing::warn!(program, timeout_ms, "command timed out");
                return Err(CommandError::Timeout { timeout_ms });
            }
        };

        let result = CommandOutput {
            success: output.status.success(),
            status: output.status.code(),
            stdout: self.clean_output(&String::from_utf8_lossy(&output.stdout)),
            stderr: self.clean_output(&String::from_utf8_lossy(&output.stderr)),
        };
        tracing::debug!(
            program,
            subcommand = args.first().map(String::as_str).unwrap_or_default(),
            status = result.status,
            success = result.success,
            "command finished"
        );
        Ok(result)
    }

    fn clean_output(&self, raw: &str) -> String {
        let mut cleaned = redact_secrets(raw);
        for secret in &self.secrets {
            if secret.trim().len() >= 6 {
                cleaned = cleaned.replace(secret, "[REDACTED]");
            }
        }
        truncate_bytes(&cleaned, self.max_output_bytes)
    }
}
