//! HTTP surface of the sidecar: bearer auth, command endpoints, log
//! endpoints, the chat proxy, and server bootstrap.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use reqwest::Client;
use serde_json::json;
use tokio::net::TcpListener;

use jib_command::{AgentOwnership, AgentOwnershipConfig, CommandExecutor, ExecutorConfig};
use jib_core::current_unix_timestamp_ms;
use jib_logs::{LogIndex, LogReader, LogReaderConfig};

use crate::cli_args::GatewayCli;
use crate::credentials::CredentialStore;

mod auth_runtime;
mod command_runtime;
mod log_runtime;
mod proxy_runtime;
#[cfg(test)]
mod tests;
mod types;

use auth_runtime::{authorize_gateway_request, GatewayAuthRuntimeState};
use command_runtime::{
    handle_execute, handle_git_fetch, handle_git_push, handle_pr_close, handle_pr_comment,
    handle_pr_create, handle_pr_edit,
};
use log_runtime::{
    handle_container_logs, handle_log_entries, handle_log_search, handle_model_output,
    handle_task_logs,
};
use proxy_runtime::{handle_chat_count_tokens, handle_chat_messages};
use types::GatewayApiError;

const HEALTH_ENDPOINT: &str = "/api/v1/health";
const GIT_PUSH_ENDPOINT: &str = "/api/v1/git/push";
const GIT_FETCH_ENDPOINT: &str = "/api/v1/git/fetch";
const PR_CREATE_ENDPOINT: &str = "/api/v1/gh/pr/create";
const PR_COMMENT_ENDPOINT: &str = "/api/v1/gh/pr/comment";
const PR_EDIT_ENDPOINT: &str = "/api/v1/gh/pr/edit";
const PR_CLOSE_ENDPOINT: &str = "/api/v1/gh/pr/close";
const GH_EXECUTE_ENDPOINT: &str = "/api/v1/gh/execute";
const CHAT_MESSAGES_ENDPOINT: &str = "/v1/messages";
const CHAT_COUNT_TOKENS_ENDPOINT: &str = "/v1/messages/count_tokens";
const TASK_LOGS_ENDPOINT: &str = "/api/v1/logs/task/{task_id}";
const CONTAINER_LOGS_ENDPOINT: &str = "/api/v1/logs/container/{container_id}";
const MODEL_OUTPUT_ENDPOINT: &str = "/api/v1/logs/model-output/{task_id}";
const LOG_ENTRIES_ENDPOINT: &str = "/api/v1/logs/entries";
const LOG_SEARCH_ENDPOINT: &str = "/api/v1/logs/search";

const LOG_INDEX_FILE: &str = "log_index.json";
const SERVICE_NAME: &str = "jib-gateway";

#[derive(Clone)]
/// Public struct `GatewayServerConfig` carrying the request-time settings of
/// the sidecar: identity, auth secret, and proxy targets.
pub struct GatewayServerConfig {
    pub bind: String,
    pub gateway_token: String,
    pub container_id: String,
    pub task_id: Option<String>,
    pub chat_api_base: String,
    pub private_mode: bool,
    pub upstream_timeout_ms: u64,
}

/// Public struct `GatewayServerState` shared by every handler.
///
/// All services are injected at construction so tests can substitute fixture
/// ownership deciders, stub executables, and temp log roots.
pub struct GatewayServerState {
    pub config: GatewayServerConfig,
    pub credentials: CredentialStore,
    pub executor: CommandExecutor,
    pub index: Arc<LogIndex>,
    pub reader: LogReader,
    pub http_client: Client,
    auth_runtime: Mutex<GatewayAuthRuntimeState>,
}

impl GatewayServerState {
    /// Assembles the shared state; the reader is built over `index` so log
    /// reads and policy checks observe the same snapshots.
    pub fn new(
        config: GatewayServerConfig,
        credentials: CredentialStore,
        executor: CommandExecutor,
        reader_config: LogReaderConfig,
        index: Arc<LogIndex>,
    ) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_millis(config.upstream_timeout_ms.max(1_000)))
            .build()
            .context("failed to construct the upstream chat API client")?;
        let reader = LogReader::new(reader_config, Arc::clone(&index));
        Ok(Self {
            config,
            credentials,
            executor,
            index,
            reader,
            http_client,
            auth_runtime: Mutex::new(GatewayAuthRuntimeState::default()),
        })
    }
}

/// Wire CLI arguments into gateway services and run the server to shutdown.
pub async fn run_gateway(cli: GatewayCli) -> Result<()> {
    if cli.gateway_token.trim().is_empty() {
        bail!("--gateway-token must not be empty");
    }
    if cli.chat_api_base.trim().is_empty() {
        bail!("--chat-api-base must not be empty");
    }

    let credentials = CredentialStore::new(
        cli.chat_api_key.clone(),
        cli.chat_oauth_token.clone(),
        cli.github_token.clone(),
    );

    let mut ownership_config =
        AgentOwnershipConfig::new(cli.agent_login.clone(), cli.branch_prefix.clone());
    ownership_config.gh_program = cli.gh_program.clone();
    ownership_config.github_token = credentials.github.clone();
    ownership_config.max_output_bytes = cli.max_output_bytes;
    let ownership = Arc::new(AgentOwnership::new(ownership_config));

    let mut executor_config = ExecutorConfig::new(cli.workspace_root.clone());
    executor_config.git_program = cli.git_program.clone();
    executor_config.gh_program = cli.gh_program.clone();
    executor_config.github_token = credentials.github.clone();
    executor_config.command_timeout_ms = cli.command_timeout_ms;
    executor_config.max_output_bytes = cli.max_output_bytes;
    let executor = CommandExecutor::new(executor_config, ownership);

    let index = Arc::new(LogIndex::new(cli.logs_dir.join(LOG_INDEX_FILE)));
    let mut reader_config = LogReaderConfig::new(cli.logs_dir.clone(), cli.output_dir.clone());
    reader_config.max_lines = cli.log_max_lines;
    reader_config.max_file_bytes = cli.log_max_file_bytes;
    reader_config.max_search_results = cli.search_max_results;
    reader_config.search_timeout = Duration::from_millis(cli.search_timeout_ms);

    let config = GatewayServerConfig {
        bind: cli.bind,
        gateway_token: cli.gateway_token,
        container_id: cli.container_id,
        task_id: cli.task_id,
        chat_api_base: cli.chat_api_base,
        private_mode: cli.private_mode,
        upstream_timeout_ms: cli.upstream_timeout_ms,
    };
    let state = Arc::new(GatewayServerState::new(
        config,
        credentials,
        executor,
        reader_config,
        index,
    )?);

    run_gateway_server(state).await
}

async fn handle_health(State(state): State<Arc<GatewayServerState>>) -> Response {
    let github_token_valid = state.credentials.github.is_some();
    let chat_credential_valid = state.credentials.chat.is_some();
    let status = if github_token_valid && chat_credential_valid {
        "ok"
    } else {
        "degraded"
    };
    (
        StatusCode::OK,
        Json(json!({
            "status": status,
            "service": SERVICE_NAME,
            "github_token_valid": github_token_valid,
            "chat_credential_valid": chat_credential_valid,
        })),
    )
        .into_response()
}

/// Builds the full gateway router over shared state.
pub fn build_gateway_router(state: Arc<GatewayServerState>) -> Router {
    Router::new()
        .route(HEALTH_ENDPOINT, get(handle_health))
        .route(GIT_PUSH_ENDPOINT, post(handle_git_push))
        .route(GIT_FETCH_ENDPOINT, post(handle_git_fetch))
        .route(PR_CREATE_ENDPOINT, post(handle_pr_create))
        .route(PR_COMMENT_ENDPOINT, post(handle_pr_comment))
        .route(PR_EDIT_ENDPOINT, post(handle_pr_edit))
        .route(PR_CLOSE_ENDPOINT, post(handle_pr_close))
        .route(GH_EXECUTE_ENDPOINT, post(handle_execute))
        .route(CHAT_MESSAGES_ENDPOINT, post(handle_chat_messages))
        .route(CHAT_COUNT_TOKENS_ENDPOINT, post(handle_chat_count_tokens))
        .route(TASK_LOGS_ENDPOINT, get(handle_task_logs))
        .route(CONTAINER_LOGS_ENDPOINT, get(handle_container_logs))
        .route(MODEL_OUTPUT_ENDPOINT, get(handle_model_output))
        .route(LOG_ENTRIES_ENDPOINT, get(handle_log_entries))
        .route(LOG_SEARCH_ENDPOINT, post(handle_log_search))
        .with_state(state)
}

/// Run the gateway server until ctrl-c.
pub async fn run_gateway_server(state: Arc<GatewayServerState>) -> Result<()> {
    let bind_addr: SocketAddr = state.config.bind.parse().with_context(|| {
        format!("invalid --bind '{}': expected host:port", state.config.bind)
    })?;

    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind gateway on {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve gateway listen address")?;

    println!(
        "gateway listening: addr={} container={} private_mode={} upstream={}",
        local_addr, state.config.container_id, state.config.private_mode, state.config.chat_api_base
    );

    let app = build_gateway_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("gateway server exited unexpectedly")?;
    Ok(())
}
