//! Shared policy decision types and command rules for the Jib gateway.
//!
//! Holds the [`PolicyResult`] value exchanged between policy engines and the
//! HTTP layer, the unconditional blocked-command table, and the ownership
//! trait implemented by live and fixture deciders.

pub mod command_rules;
pub mod ownership;
pub mod result;

pub use command_rules::{check_blocked_command, BLOCKED_GH_COMMANDS};
pub use ownership::BranchOwnership;
pub use result::PolicyResult;
