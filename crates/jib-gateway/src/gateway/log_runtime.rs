//! Handlers for the policy-gated log read and search endpoints.
//!
//! The requester identity is always the container (and optional task) this
//! sidecar fronts; there is no per-request identity header to spoof.

use super::*;

use axum::extract::{Path, Query};
use jib_logs::reader::{MAX_READ_LINES, MAX_SEARCH_RESULTS};
use jib_logs::{check_container_access, check_search_access, check_task_access, LogSearchError};

use super::types::{LogEntriesQuery, LogReadQuery, SearchRequest};

const DEFAULT_LOG_ENTRIES_LIMIT: usize = 50;
const DEFAULT_SEARCH_SCOPE: &str = "self";

fn search_error_response(error: LogSearchError) -> GatewayApiError {
    let message = error.to_string();
    match error {
        LogSearchError::PatternValidation(_) => {
            GatewayApiError::bad_request("invalid_pattern", message)
        }
        LogSearchError::Timeout { .. } => GatewayApiError::gateway_timeout("search_timeout", message),
    }
}

pub(super) async fn handle_task_logs(
    State(state): State<Arc<GatewayServerState>>,
    Path(task_id): Path<String>,
    Query(query): Query<LogReadQuery>,
    headers: HeaderMap,
) -> Response {
    if let Err(error) = authorize_gateway_request(&state, &headers) {
        return error.into_response();
    }
    let index = state.index.load();
    let decision = check_task_access(
        &index,
        &state.config.container_id,
        state.config.task_id.as_deref(),
        &task_id,
    );
    if !decision.allowed {
        return GatewayApiError::policy_denied(decision).into_response();
    }
    let max_lines = query.max_lines.unwrap_or(MAX_READ_LINES);
    match state.reader.read_task_logs(&task_id, max_lines) {
        Some(content) => (StatusCode::OK, Json(content)).into_response(),
        None => GatewayApiError::not_found(format!("No logs found for task '{task_id}'"))
            .into_response(),
    }
}

pub(super) async fn handle_container_logs(
    State(state): State<Arc<GatewayServerState>>,
    Path(container_id): Path<String>,
    Query(query): Query<LogReadQuery>,
    headers: HeaderMap,
) -> Response {
    if let Err(error) = authorize_gateway_request(&state, &headers) {
        return error.into_response();
    }
    let decision = check_container_access(&state.config.container_id, &container_id);
    if !decision.allowed {
        return GatewayApiError::policy_denied(decision).into_response();
    }
    let max_lines = query.max_lines.unwrap_or(MAX_READ_LINES);
    let content = state.reader.read_container_logs(&container_id, max_lines);
    (StatusCode::OK, Json(content)).into_response()
}

pub(super) async fn handle_model_output(
    State(state): State<Arc<GatewayServerState>>,
    Path(task_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(error) = authorize_gateway_request(&state, &headers) {
        return error.into_response();
    }
    let index = state.index.load();
    let decision = check_task_access(
        &index,
        &state.config.container_id,
        state.config.task_id.as_deref(),
        &task_id,
    );
    if !decision.allowed {
        return GatewayApiError::policy_denied(decision).into_response();
    }
    match state.reader.read_model_output(&task_id) {
        Some(content) => (StatusCode::OK, Json(content)).into_response(),
        None => GatewayApiError::not_found(format!("No model output found for task '{task_id}'"))
            .into_response(),
    }
}

pub(super) async fn handle_log_entries(
    State(state): State<Arc<GatewayServerState>>,
    Query(query): Query<LogEntriesQuery>,
    headers: HeaderMap,
) -> Response {
    if let Err(error) = authorize_gateway_request(&state, &headers) {
        return error.into_response();
    }
    let target_container = query
        .container_id
        .as_deref()
        .unwrap_or(&state.config.container_id);
    let decision = check_container_access(&state.config.container_id, target_container);
    if !decision.allowed {
        return GatewayApiError::policy_denied(decision).into_response();
    }
    let limit = query.limit.unwrap_or(DEFAULT_LOG_ENTRIES_LIMIT);
    let offset = query.offset.unwrap_or(0);
    let entries = state.index.list_entries(Some(target_container), limit, offset);
    let count = entries.len();
    (
        StatusCode::OK,
        Json(json!({ "entries": entries, "count": count })),
    )
        .into_response()
}

pub(super) async fn handle_log_search(
    State(state): State<Arc<GatewayServerState>>,
    headers: HeaderMap,
    Json(request): Json<SearchRequest>,
) -> Response {
    if let Err(error) = authorize_gateway_request(&state, &headers) {
        return error.into_response();
    }
    let scope = request.scope.as_deref().unwrap_or(DEFAULT_SEARCH_SCOPE);
    let decision = check_search_access(&state.config.container_id, scope);
    if !decision.allowed {
        return GatewayApiError::policy_denied(decision).into_response();
    }
    let Some(pattern) = request.pattern.as_deref() else {
        return GatewayApiError::bad_request("invalid_request", "Missing pattern").into_response();
    };
    let max_results = request.max_results.unwrap_or(MAX_SEARCH_RESULTS);
    match state
        .reader
        .search_logs(pattern, &state.config.container_id, max_results)
    {
        Ok(report) => {
            let count = report.matches.len();
            (
                StatusCode::OK,
                Json(json!({
                    "matches": report.matches,
                    "count": count,
                    "truncated": report.truncated,
                    "files_scanned": report.files_scanned,
                })),
            )
                .into_response()
        }
        Err(error) => search_error_response(error).into_response(),
    }
}
