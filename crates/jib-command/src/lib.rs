//! Policy-gated git and GitHub command execution for the Jib gateway.
//!
//! Commands run in cleared-environment child processes with explicit
//! timeouts; credentials reach children only through rewritten remote URLs
//! or `GH_TOKEN`, and are redacted from all captured output.

pub mod error;
pub mod executor;
pub mod ownership;
pub mod process;

pub use error::CommandError;
pub use executor::{CommandExecutor, ExecutorConfig};
pub use ownership::{AgentOwnership, AgentOwnershipConfig};
pub use process::CommandOutput;
