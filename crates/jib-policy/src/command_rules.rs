use serde_json::json;

use crate::result::PolicyResult;

/// `gh` subcommand pairs that are never allowed through the gateway,
/// regardless of ownership.
pub const BLOCKED_GH_COMMANDS: [&str; 7] = [
    "pr merge",
    "repo delete",
    "repo archive",
    "release delete",
    "auth logout",
    "auth login",
    "config set",
];

/// Returns a denial when `args` start with a blocked `gh` subcommand pair.
///
/// The first two non-flag tokens are compared case-sensitively, so flags
/// interleaved before the subcommand cannot mask a blocked pair.
pub fn check_blocked_command(args: &[String]) -> Option<PolicyResult> {
    let mut leading = args.iter().filter(|arg| !arg.starts_with('-'));
    let group = leading.next()?;
    let action = leading.next()?;
    let pattern = format!("{group} {action}");
    if !BLOCKED_GH_COMMANDS.contains(&pattern.as_str()) {
        return None;
    }

    Some(PolicyResult::deny_with_details(
        format!("Command 'gh {pattern}' is not allowed through the gateway"),
        json!({ "blocked_command": pattern }),
    ))
}
