use std::path::PathBuf;

use clap::{ArgAction, Parser};
use jib_logs::reader::{MAX_LOG_FILE_BYTES, MAX_READ_LINES, MAX_SEARCH_RESULTS};

const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 10 * 60 * 1_000;
const DEFAULT_SEARCH_TIMEOUT_MS: u64 = 5_000;

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "jib-gateway",
    about = "Authenticated sidecar gateway fronting one sandboxed agent container",
    version
)]
/// Public struct `GatewayCli` holding every startup knob of the sidecar.
pub struct GatewayCli {
    #[arg(
        long,
        env = "JIB_GATEWAY_BIND",
        default_value = "127.0.0.1:8790",
        help = "Bind address in host:port form"
    )]
    pub bind: String,

    #[arg(
        long = "gateway-token",
        env = "JIB_GATEWAY_TOKEN",
        hide_env_values = true,
        help = "Shared bearer secret required on every route except health"
    )]
    pub gateway_token: String,

    #[arg(
        long = "container-id",
        env = "JIB_CONTAINER_ID",
        help = "Container identity this sidecar fronts; scopes log access"
    )]
    pub container_id: String,

    #[arg(
        long = "task-id",
        env = "JIB_TASK_ID",
        help = "Optional task identity used for log ownership checks"
    )]
    pub task_id: Option<String>,

    #[arg(
        long = "agent-login",
        env = "JIB_AGENT_LOGIN",
        help = "GitHub login the agent pushes and opens pull requests as"
    )]
    pub agent_login: String,

    #[arg(
        long = "branch-prefix",
        env = "JIB_BRANCH_PREFIX",
        default_value = "jib-",
        help = "Branch name prefix the agent owns; pushes outside it are denied"
    )]
    pub branch_prefix: String,

    #[arg(
        long = "workspace-root",
        env = "JIB_WORKSPACE_ROOT",
        default_value = "/workspace",
        help = "Directory every repo_path must resolve under"
    )]
    pub workspace_root: PathBuf,

    #[arg(
        long = "logs-dir",
        env = "JIB_LOGS_DIR",
        default_value = "/var/log/jib",
        help = "Directory holding container logs, task symlinks, and the shared index"
    )]
    pub logs_dir: PathBuf,

    #[arg(
        long = "output-dir",
        env = "JIB_OUTPUT_DIR",
        default_value = "/var/log/jib/output",
        help = "Directory holding per-task model output files"
    )]
    pub output_dir: PathBuf,

    #[arg(
        long = "chat-api-base",
        env = "JIB_CHAT_API_BASE",
        default_value = "https://api.anthropic.com",
        help = "Upstream base URL for proxied chat API requests"
    )]
    pub chat_api_base: String,

    #[arg(
        long = "chat-api-key",
        env = "JIB_CHAT_API_KEY",
        hide_env_values = true,
        help = "Upstream chat API key injected into proxied requests"
    )]
    pub chat_api_key: Option<String>,

    #[arg(
        long = "chat-oauth-token",
        env = "JIB_CHAT_OAUTH_TOKEN",
        hide_env_values = true,
        help = "Upstream chat OAuth token; preferred over the API key when both are set"
    )]
    pub chat_oauth_token: Option<String>,

    #[arg(
        long = "github-token",
        env = "JIB_GITHUB_TOKEN",
        hide_env_values = true,
        help = "GitHub token injected into push URLs and gh invocations"
    )]
    pub github_token: Option<String>,

    #[arg(
        long = "private-mode",
        env = "JIB_PRIVATE_MODE",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Strip web search and web fetch tools from proxied chat requests"
    )]
    pub private_mode: bool,

    #[arg(
        long = "upstream-timeout-ms",
        env = "JIB_UPSTREAM_TIMEOUT_MS",
        default_value_t = DEFAULT_UPSTREAM_TIMEOUT_MS,
        value_parser = parse_positive_u64,
        help = "Upstream chat request deadline in milliseconds, stream duration included"
    )]
    pub upstream_timeout_ms: u64,

    #[arg(
        long = "command-timeout-ms",
        env = "JIB_COMMAND_TIMEOUT_MS",
        default_value_t = jib_command::executor::DEFAULT_COMMAND_TIMEOUT_MS,
        value_parser = parse_positive_u64,
        help = "git/gh subprocess deadline in milliseconds"
    )]
    pub command_timeout_ms: u64,

    #[arg(
        long = "max-output-bytes",
        env = "JIB_MAX_OUTPUT_BYTES",
        default_value_t = jib_command::executor::DEFAULT_MAX_OUTPUT_BYTES,
        value_parser = parse_positive_usize,
        help = "Maximum subprocess output retained per stream"
    )]
    pub max_output_bytes: usize,

    #[arg(
        long = "log-max-lines",
        env = "JIB_LOG_MAX_LINES",
        default_value_t = MAX_READ_LINES,
        value_parser = parse_positive_usize,
        help = "Maximum lines returned by a single log read"
    )]
    pub log_max_lines: usize,

    #[arg(
        long = "log-max-file-bytes",
        env = "JIB_LOG_MAX_FILE_BYTES",
        default_value_t = MAX_LOG_FILE_BYTES,
        value_parser = parse_positive_u64,
        help = "Log files larger than this are read truncated and skipped by search"
    )]
    pub log_max_file_bytes: u64,

    #[arg(
        long = "search-max-results",
        env = "JIB_SEARCH_MAX_RESULTS",
        default_value_t = MAX_SEARCH_RESULTS,
        value_parser = parse_positive_usize,
        help = "Hard cap on matches returned by a log search"
    )]
    pub search_max_results: usize,

    #[arg(
        long = "search-timeout-ms",
        env = "JIB_SEARCH_TIMEOUT_MS",
        default_value_t = DEFAULT_SEARCH_TIMEOUT_MS,
        value_parser = parse_positive_u64,
        help = "Wall-clock budget for a log search in milliseconds"
    )]
    pub search_timeout_ms: u64,

    #[arg(
        long = "git-program",
        env = "JIB_GIT_PROGRAM",
        default_value = "git",
        help = "git executable used for repository operations"
    )]
    pub git_program: String,

    #[arg(
        long = "gh-program",
        env = "JIB_GH_PROGRAM",
        default_value = "gh",
        help = "gh executable used for GitHub operations"
    )]
    pub gh_program: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_positive_parsers_reject_zero_and_garbage() {
        assert!(parse_positive_u64("5000").is_ok());
        assert!(parse_positive_u64("0").is_err());
        assert!(parse_positive_u64("ten").is_err());
        assert!(parse_positive_usize("1").is_ok());
        assert!(parse_positive_usize("0").is_err());
    }

    #[test]
    fn functional_minimal_invocation_parses_with_defaults() {
        let cli = GatewayCli::try_parse_from([
            "jib-gateway",
            "--gateway-token",
            "secret",
            "--container-id",
            "container-1",
            "--agent-login",
            "jib-agent",
        ])
        .expect("parse minimal args");
        assert_eq!(cli.bind, "127.0.0.1:8790");
        assert_eq!(cli.branch_prefix, "jib-");
        assert_eq!(cli.log_max_lines, MAX_READ_LINES);
        assert_eq!(cli.search_timeout_ms, DEFAULT_SEARCH_TIMEOUT_MS);
        assert!(!cli.private_mode);
        assert!(cli.task_id.is_none());
    }

    #[test]
    fn unit_private_mode_accepts_the_bare_flag_and_explicit_values() {
        let bare = GatewayCli::try_parse_from([
            "jib-gateway",
            "--gateway-token",
            "secret",
            "--container-id",
            "container-1",
            "--agent-login",
            "jib-agent",
            "--private-mode",
        ])
        .expect("parse bare flag");
        assert!(bare.private_mode);

        let explicit = GatewayCli::try_parse_from([
            "jib-gateway",
            "--gateway-token",
            "secret",
            "--container-id",
            "container-1",
            "--agent-login",
            "jib-agent",
            "--private-mode=false",
        ])
        .expect("parse explicit value");
        assert!(!explicit.private_mode);
    }
}
