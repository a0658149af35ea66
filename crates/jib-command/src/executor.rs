use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use jib_policy::{check_blocked_command, BranchOwnership};

use crate::error::CommandError;
use crate::process::{CommandOutput, ProcessRunner};

/// Default wall-clock budget for push and fetch operations.
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 120_000;
/// Default wall-clock budget for metadata lookups (remote URLs, HEAD).
pub const DEFAULT_LOOKUP_TIMEOUT_MS: u64 = 15_000;
/// Default cap on captured stdout/stderr bytes per command.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1_048_576;

/// Tunables for git and gh subprocess execution.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub workspace_root: PathBuf,
    pub git_program: String,
    pub gh_program: String,
    pub github_token: Option<String>,
    pub command_timeout_ms: u64,
    pub lookup_timeout_ms: u64,
    pub max_output_bytes: usize,
}

impl ExecutorConfig {
    /// Builds a config rooted at `workspace_root` with the standard programs
    /// and budgets.
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            git_program: "git".to_string(),
            gh_program: "gh".to_string(),
            github_token: None,
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            lookup_timeout_ms: DEFAULT_LOOKUP_TIMEOUT_MS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

/// Executes policy-gated git and gh commands on behalf of the agent.
///
/// Every mutating path consults the injected [`BranchOwnership`] decider
/// before a child process is spawned; the GitHub credential only ever reaches
/// children through a rewritten https remote URL or the `GH_TOKEN`
/// environment variable, never through responses or logs.
pub struct CommandExecutor {
    config: ExecutorConfig,
    ownership: Arc<dyn BranchOwnership>,
    runner: ProcessRunner,
}

impl CommandExecutor {
    pub fn new(config: ExecutorConfig, ownership: Arc<dyn BranchOwnership>) -> Self {
        let runner = ProcessRunner {
            max_output_bytes: config.max_output_bytes,
            secrets: config.github_token.iter().cloned().collect(),
        };
        Self {
            config,
            ownership,
            runner,
        }
    }

    /// Pushes `refspec` to `remote` from the repository at `repo_path`,
    /// enforcing branch ownership before anything runs.
    pub async fn push(
        &self,
        repo_path: &str,
        remote: &str,
        refspec: Option<&str>,
        extra_args: &[String],
    ) -> Result<CommandOutput, CommandError> {
        let repo = self.resolve_repo_path(repo_path)?;

        let branch = match refspec.and_then(branch_from_refspec) {
            Some(branch) => branch,
            None => self.current_branch(&repo).await?,
        };

        let decision = self.ownership.check_branch_ownership(&branch).await;
        if !decision.allowed {
            return Err(CommandError::PolicyDenied(decision));
        }

        let remote_url = self.remote_url(&repo, remote).await?;
        let push_url = self.inject_credential(&remote_url);

        let mut args: Vec<String> = vec!["push".to_string()];
        args.extend(extra_args.iter().cloned());
        args.push(push_url);
        if let Some(refspec) = refspec {
            args.push(refspec.to_string());
        }

        self.runner
            .run(
                &self.config.git_program,
                &args,
                Some(&repo),
                &[git_no_prompt()],
                self.config.command_timeout_ms,
            )
            .await
    }

    /// Runs a read-only `fetch` or `ls-remote` against `remote` from the
    /// repository at `repo_path`, with extra arguments held to an allow-list.
    pub async fn fetch(
        &self,
        repo_path: &str,
        remote: &str,
        operation: &str,
        extra_args: &[String],
    ) -> Result<CommandOutput, CommandError> {
        let repo = self.resolve_repo_path(repo_path)?;

        if operation != "fetch" && operation != "ls-remote" {
            return Err(CommandError::UnsupportedOperation(operation.to_string()));
        }
        validate_fetch_args(extra_args)?;

        let remote_url = self.remote_url(&repo, remote).await?;
        let fetch_url = self.inject_credential(&remote_url);

        let mut args: Vec<String> = vec![operation.to_string(), fetch_url];
        args.extend(extra_args.iter().cloned());

        self.runner
            .run(
                &self.config.git_program,
                &args,
                Some(&repo),
                &[git_no_prompt()],
                self.config.command_timeout_ms,
            )
            .await
    }

    /// Creates a pull request. Creation carries no ownership requirement;
    /// field validation happens here so callers get a uniform error surface.
    pub async fn pr_create(
        &self,
        repo: &str,
        title: &str,
        head: &str,
        body: Option<&str>,
        base: Option<&str>,
    ) -> Result<CommandOutput, CommandError> {
        require_field(repo, "repo")?;
        require_field(title, "title")?;
        require_field(head, "head")?;

        let mut args: Vec<String> = [
            "pr", "create", "--repo", repo, "--title", title, "--head", head,
        ]
        .into_iter()
        .map(str::to_string)
        .collect();
        args.push("--body".to_string());
        args.push(body.unwrap_or_default().to_string());
        if let Some(base) = base {
            args.push("--base".to_string());
            args.push(base.to_string());
        }

        self.run_gh(&args).await
    }

    /// Comments on a pull request the agent authored.
    pub async fn pr_comment(
        &self,
        repo: &str,
        pr_number: u64,
        body: &str,
    ) -> Result<CommandOutput, CommandError> {
        require_field(repo, "repo")?;
        require_field(body, "body")?;
        self.require_pr_ownership(repo, pr_number).await?;

        let args: Vec<String> = [
            "pr",
            "comment",
            &pr_number.to_string(),
            "--repo",
            repo,
            "--body",
            body,
        ]
        .into_iter()
        .map(str::to_string)
        .collect();
        self.run_gh(&args).await
    }

    /// Edits the title and/or body of a pull request the agent authored.
    pub async fn pr_edit(
        &self,
        repo: &str,
        pr_number: u64,
        title: Option<&str>,
        body: Option<&str>,
    ) -> Result<CommandOutput, CommandError> {
        require_field(repo, "repo")?;
        if title.is_none() && body.is_none() {
            return Err(CommandError::Validation(
                "Missing title or body: at least one field must be provided".to_string(),
            ));
        }
        self.require_pr_ownership(repo, pr_number).await?;

        let mut args: Vec<String> = ["pr", "edit", &pr_number.to_string(), "--repo", repo]
            .into_iter()
            .map(str::to_string)
            .collect();
        if let Some(title) = title {
            args.push("--title".to_string());
            args.push(title.to_string());
        }
        if let Some(body) = body {
            args.push("--body".to_string());
            args.push(body.to_string());
        }
        self.run_gh(&args).await
    }

    /// Closes a pull request the agent authored.
    pub async fn pr_close(&self, repo: &str, pr_number: u64) -> Result<CommandOutput, CommandError> {
        require_field(repo, "repo")?;
        self.require_pr_ownership(repo, pr_number).await?;

        let args: Vec<String> = ["pr", "close", &pr_number.to_string(), "--repo", repo]
            .into_iter()
            .map(str::to_string)
            .collect();
        self.run_gh(&args).await
    }

    /// Runs an arbitrary `gh` invocation after the blocked-command gate.
    pub async fn execute(&self, args: &[String]) -> Result<CommandOutput, CommandError> {
        if args.is_empty() {
            return Err(CommandError::Validation("Missing args".to_string()));
        }
        if let Some(denial) = check_blocked_command(args) {
            return Err(CommandError::PolicyDenied(denial));
        }
        self.run_gh(args).await
    }

    async fn require_pr_ownership(&self, repo: &str, pr_number: u64) -> Result<(), CommandError> {
        let decision = self.ownership.check_pr_ownership(repo, pr_number).await;
        if !decision.allowed {
            return Err(CommandError::PolicyDenied(decision));
        }
        Ok(())
    }

    async fn run_gh(&self, args: &[String]) -> Result<CommandOutput, CommandError> {
        self.runner
            .run(
                &self.config.gh_program,
                args,
                None,
                &self.gh_env(),
                self.config.command_timeout_ms,
            )
            .await
    }

    fn gh_env(&self) -> Vec<(&'static str, String)> {
        self.config
            .github_token
            .iter()
            .map(|token| ("GH_TOKEN", token.clone()))
            .collect()
    }

    async fn current_branch(&self, repo: &Path) -> Result<String, CommandError> {
        let args: Vec<String> = ["rev-parse", "--abbrev-ref", "HEAD"]
            .into_iter()
            .map(str::to_string)
            .collect();
        let output = self
            .runner
            .run(
                &self.config.git_program,
                &args,
                Some(repo),
                &[git_no_prompt()],
                self.config.lookup_timeout_ms,
            )
            .await?;
        if !output.success {
            return Err(CommandError::Validation(format!(
                "failed to determine the current branch: {}",
                output.stderr.trim()
            )));
        }
        Ok(output.stdout.trim().to_string())
    }

    async fn remote_url(&self, repo: &Path, remote: &str) -> Result<String, CommandError> {
        let args: Vec<String> = ["remote", "get-url", remote]
            .into_iter()
            .map(str::to_string)
            .collect();
        let output = self
            .runner
            .run(
                &self.config.git_program,
                &args,
                Some(repo),
                &[git_no_prompt()],
                self.config.lookup_timeout_ms,
            )
            .await?;
        if !output.success {
            return Err(CommandError::Validation(format!(
                "failed to resolve remote '{remote}': {}",
                output.stderr.trim()
            )));
        }
        Ok(output.stdout.trim().to_string())
    }

    fn inject_credential(&self, url: &str) -> String {
        match &self.config.github_token {
            Some(token) if !token.trim().is_empty() => inject_https_credential(url, token),
            _ => url.to_string(),
        }
    }

    fn resolve_repo_path(&self, repo_path: &str) -> Result<PathBuf, CommandError> {
        if repo_path.trim().is_empty() {
            return Err(CommandError::Validation("Missing repo_path".to_string()));
        }

        let input = PathBuf::from(repo_path);
        if contains_parent_component(&input) {
            return Err(CommandError::PathEscape(repo_path.to_string()));
        }

        let absolute = if input.is_absolute() {
            input
        } else {
            self.config.workspace_root.join(input)
        };
        let canonical = canonicalize_best_effort(&absolute).map_err(|error| {
            CommandError::Validation(format!(
                "failed to resolve repo path '{repo_path}': {error}"
            ))
        })?;
        let canonical_root = canonicalize_best_effort(&self.config.workspace_root)
            .map_err(|error| CommandError::Validation(format!("invalid workspace root: {error}")))?;
        if !canonical.starts_with(&canonical_root) {
            return Err(CommandError::PathEscape(repo_path.to_string()));
        }

        Ok(canonical)
    }
}

fn git_no_prompt() -> (&'static str, String) {
    ("GIT_TERMINAL_PROMPT", "0".to_string())
}

fn require_field(value: &str, name: &str) -> Result<(), CommandError> {
    if value.trim().is_empty() {
        return Err(CommandError::Validation(format!("Missing {name}")));
    }
    Ok(())
}

/// Extracts the destination branch from a refspec, stripping any force marker
/// and the `refs/heads/` prefix. Returns `None` when the destination is
/// empty, so callers fall back to the checked-out branch.
fn branch_from_refspec(refspec: &str) -> Option<String> {
    let refspec = refspec.trim().trim_start_matches('+');
    let destination = match refspec.rsplit_once(':') {
        Some((_, destination)) => destination,
        None => refspec,
    };
    let destination = destination.trim();
    if destination.is_empty() {
        return None;
    }
    Some(destination.trim_start_matches("refs/heads/").to_string())
}

/// Flags accepted on fetch/ls-remote operations; bare ref names pass as-is.
fn validate_fetch_args(args: &[String]) -> Result<(), CommandError> {
    for arg in args {
        if !arg.starts_with('-') {
            continue;
        }
        let allowed = matches!(
            arg.as_str(),
            "--prune" | "--tags" | "--no-tags" | "--quiet" | "--heads"
        ) || arg
            .strip_prefix("--depth=")
            .is_some_and(|depth| depth.parse::<u32>().is_ok());
        if !allowed {
            return Err(CommandError::Validation(format!(
                "argument '{arg}' is not allowed for fetch operations"
            )));
        }
    }
    Ok(())
}

fn inject_https_credential(url: &str, token: &str) -> String {
    let Some(rest) = url.strip_prefix("https://") else {
        return url.to_string();
    };
    let host_and_path = match rest.split_once('@') {
        Some((_, tail)) => tail,
        None => rest,
    };
    format!("https://x-access-token:{token}@{host_and_path}")
}

fn contains_parent_component(path: &Path) -> bool {
    path.components()
        .any(|component| matches!(component, Component::ParentDir))
}

fn canonicalize_best_effort(path: &Path) -> std::io::Result<PathBuf> {
    if path.exists() {
        return std::fs::canonicalize(path);
    }

    let mut missing_suffix: Vec<OsString> = Vec::new();
    let mut cursor = path;

    while !cursor.exists() {
        if let Some(file_name) = cursor.file_name() {
            missing_suffix.push(file_name.to_os_string());
        }

        cursor = match cursor.parent() {
            Some(parent) => parent,
            None => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no existing ancestor for path",
                ));
            }
        };
    }

    let mut canonical = std::fs::canonicalize(cursor)?;
    for component in missing_suffix.iter().rev() {
        canonical.push(component);
    }

    Ok(canonical)
}

#[cfg(test)]
mod tests;
