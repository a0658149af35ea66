use async_trait::async_trait;
use jib_policy::{BranchOwnership, PolicyResult};
use serde_json::{json, Value};

use crate::executor::{DEFAULT_LOOKUP_TIMEOUT_MS, DEFAULT_MAX_OUTPUT_BYTES};
use crate::process::ProcessRunner;

/// Configuration for the live ownership decider.
#[derive(Debug, Clone)]
pub struct AgentOwnershipConfig {
    pub agent_login: String,
    pub owned_branch_prefix: String,
    pub gh_program: String,
    pub github_token: Option<String>,
    pub lookup_timeout_ms: u64,
    pub max_output_bytes: usize,
}

impl AgentOwnershipConfig {
    /// Builds a config for `agent_login` owning branches under
    /// `owned_branch_prefix`, with the standard program and budgets.
    pub fn new(agent_login: impl Into<String>, owned_branch_prefix: impl Into<String>) -> Self {
        Self {
            agent_login: agent_login.into(),
            owned_branch_prefix: owned_branch_prefix.into(),
            gh_program: "gh".to_string(),
            github_token: None,
            lookup_timeout_ms: DEFAULT_LOOKUP_TIMEOUT_MS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

/// Live [`BranchOwnership`] decider: branches are owned by configured prefix,
/// pull requests by author lookup through the `gh` CLI. Lookup failures deny.
pub struct AgentOwnership {
    config: AgentOwnershipConfig,
    runner: ProcessRunner,
}

impl AgentOwnership {
    pub fn new(config: AgentOwnershipConfig) -> Self {
        let runner = ProcessRunner {
            max_output_bytes: config.max_output_bytes,
            secrets: config.github_token.iter().cloned().collect(),
        };
        Self { config, runner }
    }

    fn gh_env(&self) -> Vec<(&'static str, String)> {
        self.config
            .github_token
            .iter()
            .map(|token| ("GH_TOKEN", token.clone()))
            .collect()
    }
}

#[async_trait]
impl BranchOwnership for AgentOwnership {
    async fn check_branch_ownership(&self, branch: &str) -> PolicyResult {
        let prefix = &self.config.owned_branch_prefix;
        if !prefix.is_empty() && branch.starts_with(prefix.as_str()) {
            return PolicyResult::allow(format!(
                "Branch '{branch}' matches the agent-owned prefix"
            ));
        }

        PolicyResult::deny_with_details(
            format!("Push to branch '{branch}' denied: the branch is not owned by this agent"),
            json!({ "branch": branch, "required_prefix": prefix }),
        )
    }

    async fn check_pr_ownership(&self, repo: &str, pr_number: u64) -> PolicyResult {
        let args: Vec<String> = [
            "pr",
            "view",
            &pr_number.to_string(),
            "--repo",
            repo,
            "--json",
            "author",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();

        let output = match self
            .runner
            .run(
                &self.config.gh_program,
                &args,
                None,
                &self.gh_env(),
                self.config.lookup_timeout_ms,
            )
            .await
        {
            Ok(output) => output,
            Err(error) => {
                return PolicyResult::deny_with_details(
                    format!("PR #{pr_number} modification denied: author lookup failed"),
                    json!({ "repo": repo, "pr_number": pr_number, "error": error.to_string() }),
                );
            }
        };
        if !output.success {
            return PolicyResult::deny_with_details(
                format!("PR #{pr_number} modification denied: author lookup failed"),
                json!({ "repo": repo, "pr_number": pr_number, "stderr": output.stderr.trim() }),
            );
        }

        let author = serde_json::from_str::<Value>(&output.stdout)
            .ok()
            .and_then(|value| {
                value
                    .pointer("/author/login")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            });
        let Some(author) = author else {
            return PolicyResult::deny_with_details(
                format!("PR #{pr_number} modification denied: author missing from lookup"),
                json!({ "repo": repo, "pr_number": pr_number }),
            );
        };

        if author == self.config.agent_login {
            return PolicyResult::allow(format!("PR #{pr_number} authored by the agent"));
        }

        PolicyResult::deny_with_details(
            format!("PR #{pr_number} modification denied: authored by '{author}', not the agent"),
            json!({
                "repo": repo,
                "pr_number": pr_number,
                "pr_author": author,
                "agent_login": self.config.agent_login,
            }),
        )
    }
}
