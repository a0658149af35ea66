use async_trait::async_trait;

use crate::result::PolicyResult;

/// Trait contract for `BranchOwnership` decisions made before mutating
/// git or GitHub state.
///
/// Implementations answer from configuration or live lookups; callers trust
/// the returned [`PolicyResult`] without re-deriving it.
#[async_trait]
pub trait BranchOwnership: Send + Sync {
    /// Decides whether the agent owns `branch`.
    async fn check_branch_ownership(&self, branch: &str) -> PolicyResult;

    /// Decides whether the agent authored pull request `pr_number` in `repo`.
    async fn check_pr_ownership(&self, repo: &str, pr_number: u64) -> PolicyResult;
}
