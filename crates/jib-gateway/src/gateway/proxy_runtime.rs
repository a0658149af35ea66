//! Streaming-aware reverse proxy for the upstream chat API.
//!
//! Bodies pass through byte-for-byte except in private mode, where network
//! tool entries are stripped from JSON object payloads. The configured
//! credential replaces caller auth; caller `Authorization` carries the
//! gateway secret and must never reach the upstream.

use super::*;

use axum::body::Body;
use axum::http::HeaderName;
use serde_json::Value;

/// True iff the body parses as JSON carrying a top-level `"stream": true`
/// boolean. Malformed JSON, a missing field, and non-boolean values are all
/// non-streaming.
pub(super) fn is_streaming_request(body: &[u8]) -> bool {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|payload| payload.get("stream").and_then(Value::as_bool))
        .unwrap_or(false)
}

pub(super) fn should_forward_request_header(name: &HeaderName) -> bool {
    !matches!(
        name.as_str(),
        "host" | "content-length" | "transfer-encoding" | "authorization" | "x-api-key"
            | "connection"
    )
}

pub(super) fn should_forward_response_header(name: &HeaderName) -> bool {
    !matches!(
        name.as_str(),
        "content-encoding" | "transfer-encoding" | "connection"
    )
}

fn normalized_tool_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '-' && *c != '_')
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Matches `web_search` / `web_fetch` and their dated variants regardless of
/// case and separator style.
pub(super) fn is_network_tool(name: &str) -> bool {
    let normalized = normalized_tool_name(name);
    normalized.starts_with("websearch") || normalized.starts_with("webfetch")
}

/// Removes network tool entries from a top-level `tools` array in place.
/// Returns whether anything was removed.
fn strip_network_tools(payload: &mut Value) -> bool {
    let Some(tools) = payload.get_mut("tools").and_then(Value::as_array_mut) else {
        return false;
    };
    let before = tools.len();
    tools.retain(|tool| {
        !tool
            .get("name")
            .and_then(Value::as_str)
            .is_some_and(is_network_tool)
    });
    tools.len() != before
}

/// Applies private-mode tool filtering; non-JSON and non-object bodies, and
/// bodies with nothing to strip, pass through unchanged.
pub(super) fn filtered_request_body(body: &[u8]) -> Vec<u8> {
    let Ok(mut payload) = serde_json::from_slice::<Value>(body) else {
        return body.to_vec();
    };
    if !payload.is_object() {
        return body.to_vec();
    }
    if !strip_network_tools(&mut payload) {
        return body.to_vec();
    }
    serde_json::to_vec(&payload).unwrap_or_else(|_| body.to_vec())
}

async fn forward_chat_request(
    state: &GatewayServerState,
    endpoint: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayApiError> {
    let Some(credential) = state.credentials.chat.as_ref() else {
        return Err(GatewayApiError::authentication_error(
            "No chat API credential is configured for this gateway",
        ));
    };

    let streaming = is_streaming_request(&body);
    let forward_body = if state.config.private_mode {
        filtered_request_body(&body)
    } else {
        body.to_vec()
    };

    let upstream_url = format!(
        "{}{}",
        state.config.chat_api_base.trim_end_matches('/'),
        endpoint
    );
    let mut request = state.http_client.post(upstream_url).body(forward_body);
    for (name, value) in headers {
        if should_forward_request_header(name) {
            request = request.header(name, value);
        }
    }
    request = request.header(credential.header_name(), credential.header_value());

    let upstream_response = request.send().await.map_err(|error| {
        if error.is_connect() {
            GatewayApiError::bad_gateway(format!("failed to reach the upstream chat API: {error}"))
        } else if error.is_timeout() {
            GatewayApiError::gateway_timeout(
                "upstream_timeout",
                format!("upstream chat API request timed out: {error}"),
            )
        } else {
            GatewayApiError::bad_gateway(format!("upstream chat API request failed: {error}"))
        }
    })?;

    let status = upstream_response.status();
    let upstream_headers = upstream_response.headers().clone();

    let mut response = if streaming {
        Response::new(Body::from_stream(upstream_response.bytes_stream()))
    } else {
        let payload = upstream_response.bytes().await.map_err(|error| {
            GatewayApiError::bad_gateway(format!(
                "failed to read the upstream chat API response: {error}"
            ))
        })?;
        Response::new(Body::from(payload))
    };
    *response.status_mut() = status;
    for (name, value) in &upstream_headers {
        if should_forward_response_header(name) {
            response.headers_mut().append(name.clone(), value.clone());
        }
    }
    Ok(response)
}

pub(super) async fn handle_chat_messages(
    State(state): State<Arc<GatewayServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(error) = authorize_gateway_request(&state, &headers) {
        return error.into_response();
    }
    match forward_chat_request(&state, CHAT_MESSAGES_ENDPOINT, &headers, body).await {
        Ok(response) => response,
        Err(error) => error.into_response(),
    }
}

pub(super) async fn handle_chat_count_tokens(
    State(state): State<Arc<GatewayServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(error) = authorize_gateway_request(&state, &headers) {
        return error.into_response();
    }
    match forward_chat_request(&state, CHAT_COUNT_TOKENS_ENDPOINT, &headers, body).await {
        Ok(response) => response,
        Err(error) => error.into_response(),
    }
}
