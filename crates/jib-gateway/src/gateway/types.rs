//! Request payloads and the error envelope shared by gateway handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use jib_policy::PolicyResult;

/// Error payload mapped to the gateway's JSON error envelope.
#[derive(Debug)]
pub(super) struct GatewayApiError {
    pub(super) status: StatusCode,
    pub(super) code: &'static str,
    pub(super) message: String,
    pub(super) details: Option<Value>,
}

impl GatewayApiError {
    pub(super) fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    pub(super) fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub(super) fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub(super) fn authentication_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "authentication_error", message)
    }

    pub(super) fn forbidden(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, code, message)
    }

    pub(super) fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub(super) fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "upstream_unavailable", message)
    }

    pub(super) fn gateway_timeout(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT, code, message)
    }

    pub(super) fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }

    /// Builds the 403 carrying a policy decision's reason and details.
    pub(super) fn policy_denied(decision: PolicyResult) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            code: "policy_denied",
            message: decision.reason,
            details: decision.details,
        }
    }
}

impl IntoResponse for GatewayApiError {
    fn into_response(self) -> Response {
        let error_type = match self.code {
            "authentication_error" => "authentication_error",
            _ if self.status.is_client_error() => "invalid_request_error",
            _ => "server_error",
        };
        let mut error = json!({
            "type": error_type,
            "code": self.code,
            "message": self.message,
        });
        if let Some(details) = self.details {
            error["details"] = details;
        }
        (self.status, Json(json!({ "error": error }))).into_response()
    }
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_fetch_operation() -> String {
    "fetch".to_string()
}

#[derive(Debug, Deserialize)]
pub(super) struct PushRequest {
    pub(super) repo_path: Option<String>,
    #[serde(default = "default_remote")]
    pub(super) remote: String,
    #[serde(default)]
    pub(super) refspec: Option<String>,
    #[serde(default)]
    pub(super) args: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct FetchRequest {
    pub(super) repo_path: Option<String>,
    #[serde(default = "default_remote")]
    pub(super) remote: String,
    #[serde(default = "default_fetch_operation")]
    pub(super) operation: String,
    #[serde(default)]
    pub(super) args: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct PrCreateRequest {
    pub(super) repo: Option<String>,
    pub(super) title: Option<String>,
    pub(super) head: Option<String>,
    pub(super) body: Option<String>,
    pub(super) base: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct PrCommentRequest {
    pub(super) repo: Option<String>,
    pub(super) pr_number: Option<u64>,
    pub(super) body: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct PrEditRequest {
    pub(super) repo: Option<String>,
    pub(super) pr_number: Option<u64>,
    pub(super) title: Option<String>,
    pub(super) body: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct PrCloseRequest {
    pub(super) repo: Option<String>,
    pub(super) pr_number: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ExecuteRequest {
    #[serde(default)]
    pub(super) args: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct SearchRequest {
    pub(super) pattern: Option<String>,
    pub(super) scope: Option<String>,
    pub(super) max_results: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(super) struct LogReadQuery {
    pub(super) max_lines: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(super) struct LogEntriesQuery {
    pub(super) container_id: Option<String>,
    pub(super) limit: Option<usize>,
    pub(super) offset: Option<usize>,
}
