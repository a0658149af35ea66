use jib_policy::PolicyResult;
use serde_json::json;

use crate::index::LogIndexData;

/// Decides whether the requesting identity may read logs for `target_task`.
///
/// Ownership is granted to the container the task is registered under, or to
/// the task itself when the requester carries the same task identity.
pub fn check_task_access(
    index: &LogIndexData,
    requester_container: &str,
    requester_task: Option<&str>,
    target_task: &str,
) -> PolicyResult {
    let Some(owner_container) = index.task_to_container.get(target_task) else {
        return PolicyResult::deny("Task not found");
    };

    if owner_container == requester_container {
        return PolicyResult::allow("Owner access (container match)");
    }

    if requester_task == Some(target_task) {
        return PolicyResult::allow("Owner access (task identity match)");
    }

    PolicyResult::deny_with_details(
        "Cross-container log access denied",
        json!({
            "requester_container": requester_container,
            "owner_container": owner_container,
        }),
    )
}

/// Containers may read aggregate logs only for themselves.
pub fn check_container_access(requester_container: &str, target_container: &str) -> PolicyResult {
    if requester_container == target_container {
        return PolicyResult::allow("Self access");
    }

    PolicyResult::deny_with_details(
        "Cross-container log access denied",
        json!({
            "requester_container": requester_container,
            "target_container": target_container,
        }),
    )
}

/// Search is restricted to the requester's own scope.
pub fn check_search_access(requester_container: &str, scope: &str) -> PolicyResult {
    if scope == "self" {
        return PolicyResult::allow("Self-scope search");
    }

    PolicyResult::deny_with_details(
        format!("Search scope '{scope}' is not permitted"),
        json!({
            "requester_container": requester_container,
            "allowed_scopes": ["self"],
        }),
    )
}
