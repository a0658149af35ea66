//! Shared-secret bearer authentication applied to every route except health.

use super::*;

/// Counters kept across requests for diagnostics; never exposed to callers.
#[derive(Debug, Default)]
pub(super) struct GatewayAuthRuntimeState {
    pub(super) auth_failures: u64,
    pub(super) last_failure_unix_ms: Option<u64>,
}

fn note_auth_failure(state: &GatewayServerState) {
    if let Ok(mut auth_state) = state.auth_runtime.lock() {
        auth_state.auth_failures = auth_state.auth_failures.saturating_add(1);
        auth_state.last_failure_unix_ms = Some(current_unix_timestamp_ms());
    }
}

/// Checks the `Authorization: Bearer` header against the configured secret.
///
/// The configured secret is validated non-empty at startup; an empty value
/// observed here therefore fails closed as a server error rather than
/// matching an empty caller token.
pub(super) fn authorize_gateway_request(
    state: &GatewayServerState,
    headers: &HeaderMap,
) -> Result<(), GatewayApiError> {
    let expected = state.config.gateway_token.trim();
    if expected.is_empty() {
        return Err(GatewayApiError::internal(
            "gateway bearer auth is misconfigured",
        ));
    }

    let Some(header) = headers.get(AUTHORIZATION) else {
        note_auth_failure(state);
        return Err(GatewayApiError::unauthorized("Missing Authorization header"));
    };

    let observed = header
        .to_str()
        .ok()
        .and_then(|raw| raw.strip_prefix("Bearer "))
        .map(str::trim);
    if observed != Some(expected) {
        note_auth_failure(state);
        return Err(GatewayApiError::unauthorized("Invalid bearer token"));
    }
    Ok(())
}
