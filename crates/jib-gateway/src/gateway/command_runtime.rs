//! Handlers for the policy-gated git and gh command endpoints.

use super::*;

use jib_command::{CommandError, CommandOutput};

use super::types::{
    ExecuteRequest, FetchRequest, PrCloseRequest, PrCommentRequest, PrCreateRequest, PrEditRequest,
    PushRequest,
};

fn command_response(result: Result<CommandOutput, CommandError>) -> Response {
    match result {
        Ok(output) => (
            StatusCode::OK,
            Json(json!({
                "success": output.success,
                "data": {
                    "status": output.status,
                    "stdout": output.stdout,
                    "stderr": output.stderr,
                },
            })),
        )
            .into_response(),
        Err(error) => command_error_response(error).into_response(),
    }
}

fn command_error_response(error: CommandError) -> GatewayApiError {
    let message = error.to_string();
    match error {
        CommandError::Validation(_) => GatewayApiError::bad_request("invalid_request", message),
        CommandError::UnsupportedOperation(_) => {
            GatewayApiError::bad_request("unsupported_operation", message)
        }
        CommandError::PolicyDenied(decision) => GatewayApiError::policy_denied(decision),
        CommandError::PathEscape(_) => GatewayApiError::forbidden("policy_denied", message),
        CommandError::Timeout { .. } => {
            GatewayApiError::gateway_timeout("command_timeout", message)
        }
        CommandError::Spawn { .. } => {
            GatewayApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "command_failed", message)
        }
    }
}

pub(super) async fn handle_git_push(
    State(state): State<Arc<GatewayServerState>>,
    headers: HeaderMap,
    Json(request): Json<PushRequest>,
) -> Response {
    if let Err(error) = authorize_gateway_request(&state, &headers) {
        return error.into_response();
    }
    let Some(repo_path) = request.repo_path.as_deref() else {
        return GatewayApiError::bad_request("invalid_request", "Missing repo_path").into_response();
    };
    let result = state
        .executor
        .push(
            repo_path,
            &request.remote,
            request.refspec.as_deref(),
            &request.args,
        )
        .await;
    command_response(result)
}

pub(super) async fn handle_git_fetch(
    State(state): State<Arc<GatewayServerState>>,
    headers: HeaderMap,
    Json(request): Json<FetchRequest>,
) -> Response {
    if let Err(error) = authorize_gateway_request(&state, &headers) {
        return error.into_response();
    }
    let Some(repo_path) = request.repo_path.as_deref() else {
        return GatewayApiError::bad_request("invalid_request", "Missing repo_path").into_response();
    };
    let result = state
        .executor
        .fetch(repo_path, &request.remote, &request.operation, &request.args)
        .await;
    command_response(result)
}

pub(super) async fn handle_pr_create(
    State(state): State<Arc<GatewayServerState>>,
    headers: HeaderMap,
    Json(request): Json<PrCreateRequest>,
) -> Response {
    if let Err(error) = authorize_gateway_request(&state, &headers) {
        return error.into_response();
    }
    let result = state
        .executor
        .pr_create(
            request.repo.as_deref().unwrap_or_default(),
            request.title.as_deref().unwrap_or_default(),
            request.head.as_deref().unwrap_or_default(),
            request.body.as_deref(),
            request.base.as_deref(),
        )
        .await;
    command_response(result)
}

pub(super) async fn handle_pr_comment(
    State(state): State<Arc<GatewayServerState>>,
    headers: HeaderMap,
    Json(request): Json<PrCommentRequest>,
) -> Response {
    if let Err(error) = authorize_gateway_request(&state, &headers) {
        return error.into_response();
    }
    let Some(pr_number) = request.pr_number else {
        return GatewayApiError::bad_request("invalid_request", "Missing pr_number").into_response();
    };
    let result = state
        .executor
        .pr_comment(
            request.repo.as_deref().unwrap_or_default(),
            pr_number,
            request.body.as_deref().unwrap_or_default(),
        )
        .await;
    command_response(result)
}

pub(super) async fn handle_pr_edit(
    State(state): State<Arc<GatewayServerState>>,
    headers: HeaderMap,
    Json(request): Json<PrEditRequest>,
) -> Response {
    if let Err(error) = authorize_gateway_request(&state, &headers) {
        return error.into_response();
    }
    let Some(pr_number) = request.pr_number else {
        return GatewayApiError::bad_request("invalid_request", "Missing pr_number").into_response();
    };
    let result = state
        .executor
        .pr_edit(
            request.repo.as_deref().unwrap_or_default(),
            pr_number,
            request.title.as_deref(),
            request.body.as_deref(),
        )
        .await;
    command_response(result)
}

pub(super) async fn handle_pr_close(
    State(state): State<Arc<GatewayServerState>>,
    headers: HeaderMap,
    Json(request): Json<PrCloseRequest>,
) -> Response {
    if let Err(error) = authorize_gateway_request(&state, &headers) {
        return error.into_response();
    }
    let Some(pr_number) = request.pr_number else {
        return GatewayApiError::bad_request("invalid_request", "Missing pr_number").into_response();
    };
    let result = state
        .executor
        .pr_close(request.repo.as_deref().unwrap_or_default(), pr_number)
        .await;
    command_response(result)
}

pub(super) async fn handle_execute(
    State(state): State<Arc<GatewayServerState>>,
    headers: HeaderMap,
    Json(request): Json<ExecuteRequest>,
) -> Response {
    if let Err(error) = authorize_gateway_request(&state, &headers) {
        return error.into_response();
    }
    command_response(state.executor.execute(&request.args).await)
}
