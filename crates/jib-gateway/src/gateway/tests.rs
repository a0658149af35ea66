//! Gateway router tests grouped by surface: auth, commands, logs, proxy.
use super::*;

use std::fs;
use std::path::Path;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{HeaderName, Request};
use httpmock::prelude::*;
use jib_policy::{BranchOwnership, PolicyResult};
use serde_json::Value;
use tempfile::tempdir;
use tower::ServiceExt;

struct FixtureOwnership {
    allow_branches: bool,
    allow_prs: bool,
}

#[async_trait]
impl BranchOwnership for FixtureOwnership {
    async fn check_branch_ownership(&self, branch: &str) -> PolicyResult {
        if self.allow_branches {
            PolicyResult::allow(format!("Branch '{branch}' matches the agent-owned prefix"))
        } else {
            PolicyResult::deny_with_details(
                format!("Push to branch '{branch}' denied: the branch is not owned by this agent"),
                json!({ "branch": branch }),
            )
        }
    }

    async fn check_pr_ownership(&self, repo: &str, pr_number: u64) -> PolicyResult {
        if self.allow_prs {
            PolicyResult::allow(format!("PR #{pr_number} authored by the agent"))
        } else {
            PolicyResult::deny_with_details(
                format!("PR #{pr_number} denied: not authored by this agent"),
                json!({ "repo": repo, "pr_number": pr_number }),
            )
        }
    }
}

fn fixture_ownership(allow_branches: bool, allow_prs: bool) -> Arc<dyn BranchOwnership> {
    Arc::new(FixtureOwnership {
        allow_branches,
        allow_prs,
    })
}

fn test_config(chat_api_base: &str) -> GatewayServerConfig {
    GatewayServerConfig {
        bind: "127.0.0.1:0".to_string(),
        gateway_token: "secret".to_string(),
        container_id: "container-1".to_string(),
        task_id: Some("task-self".to_string()),
        chat_api_base: chat_api_base.to_string(),
        private_mode: false,
        upstream_timeout_ms: 2_000,
    }
}

fn test_state(
    root: &Path,
    config: GatewayServerConfig,
    credentials: CredentialStore,
    ownership: Arc<dyn BranchOwnership>,
) -> Arc<GatewayServerState> {
    let logs_dir = root.join("logs");
    let output_dir = logs_dir.join("output");
    fs::create_dir_all(&output_dir).expect("create log roots");
    fs::create_dir_all(root.join("workspace")).expect("create workspace root");

    let index = Arc::new(LogIndex::new(logs_dir.join(LOG_INDEX_FILE)));
    let reader_config = LogReaderConfig::new(&logs_dir, &output_dir);
    let mut executor_config = ExecutorConfig::new(root.join("workspace"));
    executor_config.github_token = credentials.github.clone();
    let executor = CommandExecutor::new(executor_config, ownership);
    Arc::new(
        GatewayServerState::new(config, credentials, executor, reader_config, index)
            .expect("assemble gateway state"),
    )
}

fn write_log_index(root: &Path, index: &Value) {
    let logs_dir = root.join("logs");
    fs::create_dir_all(&logs_dir).expect("create logs dir");
    fs::write(logs_dir.join(LOG_INDEX_FILE), index.to_string()).expect("write index");
}

fn seeded_log_index() -> Value {
    json!({
        "task_to_container": {
            "task-a": "container-1",
            "task-b": "container-1",
            "task-foreign": "container-2",
        },
        "thread_to_task": {},
        "entries": [
            {"container_id": "container-1", "task_id": "task-a", "log_file": "container-1.log", "timestamp": 1.0},
            {"container_id": "container-2", "task_id": "task-foreign", "log_file": "container-2.log", "timestamp": 2.0},
            {"container_id": "container-1", "task_id": "task-b", "log_file": "container-1.log", "timestamp": 3.0},
        ],
    })
}

fn authorized_json(method: &str, path: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path)
        .header("authorization", "Bearer secret")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("build request")
}

fn authorized_get(path: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(path)
        .header("authorization", "Bearer secret")
        .body(Body::empty())
        .expect("build request")
}

async fn send(state: &Arc<GatewayServerState>, request: Request<Body>) -> (StatusCode, Value) {
    let response = build_gateway_router(Arc::clone(state))
        .oneshot(request)
        .await
        .expect("route request");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    let payload = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, payload)
}

#[cfg(unix)]
fn write_stub_program(dir: &Path, name: &str, script: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    fs::write(&path, script).expect("write stub program");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod stub program");
    path
}

async fn spawn_test_server(
    state: Arc<GatewayServerState>,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("bind ephemeral listener")?;
    let addr = listener.local_addr().context("resolve listener addr")?;
    let app = build_gateway_router(state);
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    Ok((addr, handle))
}

fn unused_local_port() -> u16 {
    let probe = std::net::TcpListener::bind("127.0.0.1:0").expect("probe port");
    let port = probe.local_addr().expect("probe addr").port();
    drop(probe);
    port
}

#[tokio::test]
async fn unit_health_is_unauthenticated_and_reports_degraded_credentials() {
    let temp = tempdir().expect("tempdir");
    let state = test_state(
        temp.path(),
        test_config("http://127.0.0.1:9"),
        CredentialStore::default(),
        fixture_ownership(true, true),
    );

    let request = Request::builder()
        .method("GET")
        .uri(HEALTH_ENDPOINT)
        .body(Body::empty())
        .expect("build request");
    let (status, payload) = send(&state, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["status"], "degraded");
    assert_eq!(payload["service"], SERVICE_NAME);
    assert_eq!(payload["github_token_valid"], false);
    assert_eq!(payload["chat_credential_valid"], false);
}

#[tokio::test]
async fn functional_health_reports_ok_with_both_credentials() {
    let temp = tempdir().expect("tempdir");
    let credentials = CredentialStore::new(
        Some("upstream-key".to_string()),
        None,
        Some("ghp_fixture".to_string()),
    );
    let state = test_state(
        temp.path(),
        test_config("http://127.0.0.1:9"),
        credentials,
        fixture_ownership(true, true),
    );

    let request = Request::builder()
        .method("GET")
        .uri(HEALTH_ENDPOINT)
        .body(Body::empty())
        .expect("build request");
    let (status, payload) = send(&state, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["status"], "ok");
    assert_eq!(payload["github_token_valid"], true);
    assert_eq!(payload["chat_credential_valid"], true);
}

#[tokio::test]
async fn unit_missing_bearer_token_is_rejected_and_counted() {
    let temp = tempdir().expect("tempdir");
    let state = test_state(
        temp.path(),
        test_config("http://127.0.0.1:9"),
        CredentialStore::default(),
        fixture_ownership(true, true),
    );

    let request = Request::builder()
        .method("POST")
        .uri(GH_EXECUTE_ENDPOINT)
        .header("content-type", "application/json")
        .body(Body::from(json!({"args": ["auth", "status"]}).to_string()))
        .expect("build request");
    let (status, payload) = send(&state, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(payload["error"]["code"], "unauthorized");
    assert_eq!(payload["error"]["type"], "invalid_request_error");
    assert!(payload["error"]["message"]
        .as_str()
        .expect("message")
        .contains("Authorization"));
    let auth_state = state.auth_runtime.lock().expect("auth lock");
    assert_eq!(auth_state.auth_failures, 1);
    assert!(auth_state.last_failure_unix_ms.is_some());
}

#[tokio::test]
async fn unit_wrong_bearer_token_is_rejected_with_an_invalid_message() {
    let temp = tempdir().expect("tempdir");
    let state = test_state(
        temp.path(),
        test_config("http://127.0.0.1:9"),
        CredentialStore::default(),
        fixture_ownership(true, true),
    );

    let request = Request::builder()
        .method("POST")
        .uri(GH_EXECUTE_ENDPOINT)
        .header("authorization", "Bearer wrong")
        .header("content-type", "application/json")
        .body(Body::from(json!({"args": ["auth", "status"]}).to_string()))
        .expect("build request");
    let (status, payload) = send(&state, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(payload["error"]["message"]
        .as_str()
        .expect("message")
        .contains("Invalid"));
}

#[tokio::test]
async fn regression_non_bearer_authorization_schemes_are_rejected() {
    let temp = tempdir().expect("tempdir");
    let state = test_state(
        temp.path(),
        test_config("http://127.0.0.1:9"),
        CredentialStore::default(),
        fixture_ownership(true, true),
    );

    let request = Request::builder()
        .method("POST")
        .uri(GH_EXECUTE_ENDPOINT)
        .header("authorization", "Token secret")
        .header("content-type", "application/json")
        .body(Body::from(json!({"args": ["auth", "status"]}).to_string()))
        .expect("build request");
    let (status, payload) = send(&state, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(payload["error"]["message"]
        .as_str()
        .expect("message")
        .contains("Invalid"));
}

#[tokio::test]
async fn functional_execute_refuses_blocked_gh_commands() {
    let temp = tempdir().expect("tempdir");
    let state = test_state(
        temp.path(),
        test_config("http://127.0.0.1:9"),
        CredentialStore::default(),
        fixture_ownership(true, true),
    );

    let request = authorized_json(
        "POST",
        GH_EXECUTE_ENDPOINT,
        &json!({"args": ["pr", "merge", "42"]}),
    );
    let (status, payload) = send(&state, request).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(payload["error"]["code"], "policy_denied");
    assert!(payload["error"]["message"]
        .as_str()
        .expect("message")
        .contains("not allowed"));
    assert_eq!(payload["error"]["details"]["blocked_command"], "pr merge");
}

#[tokio::test]
async fn functional_execute_requires_arguments() {
    let temp = tempdir().expect("tempdir");
    let state = test_state(
        temp.path(),
        test_config("http://127.0.0.1:9"),
        CredentialStore::default(),
        fixture_ownership(true, true),
    );

    let request = authorized_json("POST", GH_EXECUTE_ENDPOINT, &json!({"args": []}));
    let (status, payload) = send(&state, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(payload["error"]["code"], "invalid_request");
    assert_eq!(payload["error"]["message"], "Missing args");
}

#[tokio::test]
async fn unit_push_requires_a_repo_path() {
    let temp = tempdir().expect("tempdir");
    let state = test_state(
        temp.path(),
        test_config("http://127.0.0.1:9"),
        CredentialStore::default(),
        fixture_ownership(true, true),
    );

    let request = authorized_json("POST", GIT_PUSH_ENDPOINT, &json!({}));
    let (status, payload) = send(&state, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(payload["error"]["message"], "Missing repo_path");
}

#[tokio::test]
async fn functional_push_denials_surface_the_policy_reason_and_details() {
    let temp = tempdir().expect("tempdir");
    let state = test_state(
        temp.path(),
        test_config("http://127.0.0.1:9"),
        CredentialStore::default(),
        fixture_ownership(false, true),
    );

    let request = authorized_json(
        "POST",
        GIT_PUSH_ENDPOINT,
        &json!({"repo_path": "repo", "refspec": "main:refs/heads/main"}),
    );
    let (status, payload) = send(&state, request).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(payload["error"]["code"], "policy_denied");
    assert!(payload["error"]["message"]
        .as_str()
        .expect("message")
        .contains("denied"));
    assert_eq!(payload["error"]["details"]["branch"], "main");
}

#[tokio::test]
async fn unit_fetch_rejects_parent_directory_escapes() {
    let temp = tempdir().expect("tempdir");
    let state = test_state(
        temp.path(),
        test_config("http://127.0.0.1:9"),
        CredentialStore::default(),
        fixture_ownership(true, true),
    );

    let request = authorized_json(
        "POST",
        GIT_FETCH_ENDPOINT,
        &json!({"repo_path": "../../../etc/passwd"}),
    );
    let (status, payload) = send(&state, request).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(payload["error"]["code"], "policy_denied");
    assert!(payload["error"]["message"]
        .as_str()
        .expect("message")
        .contains("escapes"));
}

#[tokio::test]
async fn unit_fetch_rejects_unsupported_operations() {
    let temp = tempdir().expect("tempdir");
    let state = test_state(
        temp.path(),
        test_config("http://127.0.0.1:9"),
        CredentialStore::default(),
        fixture_ownership(true, true),
    );

    let request = authorized_json(
        "POST",
        GIT_FETCH_ENDPOINT,
        &json!({"repo_path": "repo", "operation": "clone"}),
    );
    let (status, payload) = send(&state, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(payload["error"]["code"], "unsupported_operation");
}

#[tokio::test]
async fn unit_fetch_rejects_disallowed_arguments() {
    let temp = tempdir().expect("tempdir");
    let state = test_state(
        temp.path(),
        test_config("http://127.0.0.1:9"),
        CredentialStore::default(),
        fixture_ownership(true, true),
    );

    let request = authorized_json(
        "POST",
        GIT_FETCH_ENDPOINT,
        &json!({"repo_path": "repo", "args": ["--upload-pack=/bin/evil"]}),
    );
    let (status, payload) = send(&state, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(payload["error"]["code"], "invalid_request");
    assert!(payload["error"]["message"]
        .as_str()
        .expect("message")
        .contains("not allowed for fetch"));
}

#[tokio::test]
async fn functional_pr_create_validates_required_fields() {
    let temp = tempdir().expect("tempdir");
    let state = test_state(
        temp.path(),
        test_config("http://127.0.0.1:9"),
        CredentialStore::default(),
        fixture_ownership(true, true),
    );

    let request = authorized_json(
        "POST",
        PR_CREATE_ENDPOINT,
        &json!({"repo": "acme/widget", "head": "jib-topic"}),
    );
    let (status, payload) = send(&state, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(payload["error"]["message"], "Missing title");
}

#[tokio::test]
async fn functional_pr_edit_requires_a_title_or_body() {
    let temp = tempdir().expect("tempdir");
    let state = test_state(
        temp.path(),
        test_config("http://127.0.0.1:9"),
        CredentialStore::default(),
        fixture_ownership(true, true),
    );

    let request = authorized_json(
        "POST",
        PR_EDIT_ENDPOINT,
        &json!({"repo": "acme/widget", "pr_number": 7}),
    );
    let (status, payload) = send(&state, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(payload["error"]["message"]
        .as_str()
        .expect("message")
        .contains("at least one field"));
}

#[tokio::test]
async fn unit_pr_comment_requires_a_pr_number() {
    let temp = tempdir().expect("tempdir");
    let state = test_state(
        temp.path(),
        test_config("http://127.0.0.1:9"),
        CredentialStore::default(),
        fixture_ownership(true, true),
    );

    let request = authorized_json(
        "POST",
        PR_COMMENT_ENDPOINT,
        &json!({"repo": "acme/widget", "body": "ping"}),
    );
    let (status, payload) = send(&state, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(payload["error"]["message"], "Missing pr_number");
}

#[tokio::test]
async fn functional_pr_close_denies_foreign_pull_requests() {
    let temp = tempdir().expect("tempdir");
    let state = test_state(
        temp.path(),
        test_config("http://127.0.0.1:9"),
        CredentialStore::default(),
        fixture_ownership(true, false),
    );

    let request = authorized_json(
        "POST",
        PR_CLOSE_ENDPOINT,
        &json!({"repo": "acme/widget", "pr_number": 7}),
    );
    let (status, payload) = send(&state, request).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(payload["error"]["code"], "policy_denied");
    assert_eq!(payload["error"]["details"]["pr_number"], 7);
}

#[cfg(unix)]
#[tokio::test]
async fn functional_push_returns_the_command_envelope_for_owned_branches() {
    let temp = tempdir().expect("tempdir");
    let stub_dir = temp.path().join("bin");
    fs::create_dir_all(&stub_dir).expect("create stub dir");
    let git_stub = write_stub_program(
        &stub_dir,
        "git",
        "#!/bin/sh\ncase \"$1\" in\n  remote) echo \"https://github.com/acme/widget.git\" ;;\n  push) echo \"pushed $@\" ;;\nesac\nexit 0\n",
    );

    let logs_dir = temp.path().join("logs");
    let output_dir = logs_dir.join("output");
    fs::create_dir_all(&output_dir).expect("create log roots");
    fs::create_dir_all(temp.path().join("workspace").join("repo")).expect("create repo dir");

    let credentials = CredentialStore::new(None, None, Some("ghp_fixture_secret".to_string()));
    let index = Arc::new(LogIndex::new(logs_dir.join(LOG_INDEX_FILE)));
    let reader_config = LogReaderConfig::new(&logs_dir, &output_dir);
    let mut executor_config = ExecutorConfig::new(temp.path().join("workspace"));
    executor_config.git_program = git_stub.display().to_string();
    executor_config.github_token = credentials.github.clone();
    let executor = CommandExecutor::new(executor_config, fixture_ownership(true, true));
    let state = Arc::new(
        GatewayServerState::new(
            test_config("http://127.0.0.1:9"),
            credentials,
            executor,
            reader_config,
            index,
        )
        .expect("assemble gateway state"),
    );

    let request = authorized_json(
        "POST",
        GIT_PUSH_ENDPOINT,
        &json!({"repo_path": "repo", "refspec": "jib-topic:refs/heads/jib-topic"}),
    );
    let (status, payload) = send(&state, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["success"], true);
    assert_eq!(payload["data"]["status"], 0);
    let stdout = payload["data"]["stdout"].as_str().expect("stdout");
    assert!(stdout.contains("pushed"));
    assert!(!payload.to_string().contains("ghp_fixture_secret"));
}

#[tokio::test]
async fn functional_task_logs_are_served_for_the_owning_container() {
    let temp = tempdir().expect("tempdir");
    write_log_index(temp.path(), &seeded_log_index());
    fs::write(
        temp.path().join("logs").join("container-1.log"),
        "line one\nline two\n",
    )
    .expect("write container log");
    let state = test_state(
        temp.path(),
        test_config("http://127.0.0.1:9"),
        CredentialStore::default(),
        fixture_ownership(true, true),
    );

    let (status, payload) = send(&state, authorized_get("/api/v1/logs/task/task-a")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["task_id"], "task-a");
    assert_eq!(payload["container_id"], "container-1");
    assert_eq!(payload["lines"], 2);
    assert!(payload["content"]
        .as_str()
        .expect("content")
        .contains("line one"));
}

#[tokio::test]
async fn functional_cross_container_task_logs_are_denied_with_details() {
    let temp = tempdir().expect("tempdir");
    write_log_index(temp.path(), &seeded_log_index());
    let state = test_state(
        temp.path(),
        test_config("http://127.0.0.1:9"),
        CredentialStore::default(),
        fixture_ownership(true, true),
    );

    let (status, payload) = send(&state, authorized_get("/api/v1/logs/task/task-foreign")).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        payload["error"]["message"],
        "Cross-container log access denied"
    );
    assert_eq!(
        payload["error"]["details"]["requester_container"],
        "container-1"
    );
    assert_eq!(payload["error"]["details"]["owner_container"], "container-2");
}

#[tokio::test]
async fn unit_unknown_tasks_are_denied_before_any_read() {
    let temp = tempdir().expect("tempdir");
    write_log_index(temp.path(), &seeded_log_index());
    let state = test_state(
        temp.path(),
        test_config("http://127.0.0.1:9"),
        CredentialStore::default(),
        fixture_ownership(true, true),
    );

    let (status, payload) = send(&state, authorized_get("/api/v1/logs/task/task-unknown")).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(payload["error"]["message"], "Task not found");
}

#[tokio::test]
async fn functional_container_logs_are_self_scoped() {
    let temp = tempdir().expect("tempdir");
    write_log_index(temp.path(), &seeded_log_index());
    fs::write(
        temp.path().join("logs").join("container-1.log"),
        "aggregate line\n",
    )
    .expect("write container log");
    let state = test_state(
        temp.path(),
        test_config("http://127.0.0.1:9"),
        CredentialStore::default(),
        fixture_ownership(true, true),
    );

    let (denied_status, denied) = send(
        &state,
        authorized_get("/api/v1/logs/container/container-2"),
    )
    .await;
    assert_eq!(denied_status, StatusCode::FORBIDDEN);
    assert_eq!(denied["error"]["details"]["target_container"], "container-2");

    let (status, payload) = send(
        &state,
        authorized_get("/api/v1/logs/container/container-1"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["container_id"], "container-1");
    assert!(payload["content"]
        .as_str()
        .expect("content")
        .contains("aggregate line"));
}

#[tokio::test]
async fn functional_model_output_is_returned_when_present_and_404_when_absent() {
    let temp = tempdir().expect("tempdir");
    write_log_index(temp.path(), &seeded_log_index());
    let state = test_state(
        temp.path(),
        test_config("http://127.0.0.1:9"),
        CredentialStore::default(),
        fixture_ownership(true, true),
    );
    fs::write(
        temp.path().join("logs").join("output").join("task-a.json"),
        "{\"result\": \"done\"}\n",
    )
    .expect("write model output");

    let (status, payload) = send(
        &state,
        authorized_get("/api/v1/logs/model-output/task-a"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["task_id"], "task-a");
    assert!(payload["content"]
        .as_str()
        .expect("content")
        .contains("done"));

    let (missing_status, missing) = send(
        &state,
        authorized_get("/api/v1/logs/model-output/task-b"),
    )
    .await;
    assert_eq!(missing_status, StatusCode::NOT_FOUND);
    assert_eq!(missing["error"]["code"], "not_found");
}

#[tokio::test]
async fn unit_log_entries_list_newest_first_for_the_own_container() {
    let temp = tempdir().expect("tempdir");
    write_log_index(temp.path(), &seeded_log_index());
    let state = test_state(
        temp.path(),
        test_config("http://127.0.0.1:9"),
        CredentialStore::default(),
        fixture_ownership(true, true),
    );

    let (status, payload) = send(&state, authorized_get(LOG_ENTRIES_ENDPOINT)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["count"], 2);
    assert_eq!(payload["entries"][0]["task_id"], "task-b");
    assert_eq!(payload["entries"][1]["task_id"], "task-a");

    let (foreign_status, foreign) = send(
        &state,
        authorized_get("/api/v1/logs/entries?container_id=container-2"),
    )
    .await;
    assert_eq!(foreign_status, StatusCode::FORBIDDEN);
    assert_eq!(foreign["error"]["code"], "policy_denied");
}

#[tokio::test]
async fn functional_log_search_matches_are_scoped_and_case_insensitive() {
    let temp = tempdir().expect("tempdir");
    write_log_index(temp.path(), &seeded_log_index());
    fs::write(
        temp.path().join("logs").join("container-1.log"),
        "info: started\nERROR: boom at line 3\ninfo: done\n",
    )
    .expect("write container log");
    let state = test_state(
        temp.path(),
        test_config("http://127.0.0.1:9"),
        CredentialStore::default(),
        fixture_ownership(true, true),
    );

    let request = authorized_json(
        "POST",
        LOG_SEARCH_ENDPOINT,
        &json!({"pattern": "error: boom"}),
    );
    let (status, payload) = send(&state, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["count"], 1);
    assert_eq!(payload["truncated"], false);
    assert_eq!(payload["files_scanned"], 1);
    assert!(payload["matches"][0]["content"]
        .as_str()
        .expect("content")
        .contains("ERROR: boom"));
    assert_eq!(payload["matches"][0]["line_number"], 2);
}

#[tokio::test]
async fn unit_log_search_rejects_catastrophic_patterns() {
    let temp = tempdir().expect("tempdir");
    let state = test_state(
        temp.path(),
        test_config("http://127.0.0.1:9"),
        CredentialStore::default(),
        fixture_ownership(true, true),
    );

    let request = authorized_json("POST", LOG_SEARCH_ENDPOINT, &json!({"pattern": "(.*)+"}));
    let (status, payload) = send(&state, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(payload["error"]["code"], "invalid_pattern");
}

#[tokio::test]
async fn unit_log_search_rejects_foreign_scopes() {
    let temp = tempdir().expect("tempdir");
    let state = test_state(
        temp.path(),
        test_config("http://127.0.0.1:9"),
        CredentialStore::default(),
        fixture_ownership(true, true),
    );

    let request = authorized_json(
        "POST",
        LOG_SEARCH_ENDPOINT,
        &json!({"pattern": "boom", "scope": "global"}),
    );
    let (status, payload) = send(&state, request).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(payload["error"]["code"], "policy_denied");
    assert_eq!(payload["error"]["details"]["allowed_scopes"][0], "self");
}

#[tokio::test]
async fn unit_log_search_requires_a_pattern() {
    let temp = tempdir().expect("tempdir");
    let state = test_state(
        temp.path(),
        test_config("http://127.0.0.1:9"),
        CredentialStore::default(),
        fixture_ownership(true, true),
    );

    let request = authorized_json("POST", LOG_SEARCH_ENDPOINT, &json!({}));
    let (status, payload) = send(&state, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(payload["error"]["message"], "Missing pattern");
}

#[tokio::test]
async fn functional_chat_proxy_injects_the_configured_api_key() {
    let server = MockServer::start();
    let upstream = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/messages")
            .header("x-api-key", "upstream-key");
        then.status(200).json_body(json!({"content": "Hello"}));
    });

    let temp = tempdir().expect("tempdir");
    let credentials = CredentialStore::new(Some("upstream-key".to_string()), None, None);
    let state = test_state(
        temp.path(),
        test_config(&server.base_url()),
        credentials,
        fixture_ownership(true, true),
    );

    let request = authorized_json(
        "POST",
        CHAT_MESSAGES_ENDPOINT,
        &json!({"model": "opus", "messages": []}),
    );
    let (status, payload) = send(&state, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload, json!({"content": "Hello"}));
    upstream.assert();
}

#[tokio::test]
async fn functional_chat_proxy_prefers_the_oauth_token() {
    let server = MockServer::start();
    let upstream = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/messages")
            .header("authorization", "Bearer upstream-oauth");
        then.status(200).json_body(json!({"content": "Hi"}));
    });

    let temp = tempdir().expect("tempdir");
    let credentials = CredentialStore::new(
        Some("upstream-key".to_string()),
        Some("upstream-oauth".to_string()),
        None,
    );
    let state = test_state(
        temp.path(),
        test_config(&server.base_url()),
        credentials,
        fixture_ownership(true, true),
    );

    let request = authorized_json(
        "POST",
        CHAT_MESSAGES_ENDPOINT,
        &json!({"model": "opus", "messages": []}),
    );
    let (status, _payload) = send(&state, request).await;

    assert_eq!(status, StatusCode::OK);
    upstream.assert();
}

#[tokio::test]
async fn unit_chat_proxy_requires_a_configured_credential() {
    let server = MockServer::start();
    let upstream = server.mock(|when, then| {
        when.method(POST).path("/v1/messages");
        then.status(200).json_body(json!({"content": "never"}));
    });

    let temp = tempdir().expect("tempdir");
    let state = test_state(
        temp.path(),
        test_config(&server.base_url()),
        CredentialStore::default(),
        fixture_ownership(true, true),
    );

    let request = authorized_json(
        "POST",
        CHAT_MESSAGES_ENDPOINT,
        &json!({"model": "opus", "messages": []}),
    );
    let (status, payload) = send(&state, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(payload["error"]["type"], "authentication_error");
    assert_eq!(payload["error"]["code"], "authentication_error");
    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn functional_private_mode_strips_network_tools_from_the_payload() {
    let server = MockServer::start();
    let upstream = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/messages")
            .json_body(json!({"model": "opus", "tools": [{"name": "bash"}]}));
        then.status(200).json_body(json!({"content": "filtered"}));
    });

    let temp = tempdir().expect("tempdir");
    let mut config = test_config(&server.base_url());
    config.private_mode = true;
    let credentials = CredentialStore::new(Some("upstream-key".to_string()), None, None);
    let state = test_state(temp.path(), config, credentials, fixture_ownership(true, true));

    let request = authorized_json(
        "POST",
        CHAT_MESSAGES_ENDPOINT,
        &json!({
            "model": "opus",
            "tools": [
                {"name": "web_search_20250305"},
                {"name": "WebFetch"},
                {"name": "bash"},
            ],
        }),
    );
    let (status, payload) = send(&state, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["content"], "filtered");
    upstream.assert();
}

#[tokio::test]
async fn regression_non_private_mode_forwards_the_body_untouched() {
    let server = MockServer::start();
    let upstream = server.mock(|when, then| {
        when.method(POST).path("/v1/messages").json_body(json!({
            "model": "opus",
            "tools": [{"name": "web_search_20250305"}, {"name": "bash"}],
        }));
        then.status(200).json_body(json!({"content": "unfiltered"}));
    });

    let temp = tempdir().expect("tempdir");
    let credentials = CredentialStore::new(Some("upstream-key".to_string()), None, None);
    let state = test_state(
        temp.path(),
        test_config(&server.base_url()),
        credentials,
        fixture_ownership(true, true),
    );

    let request = authorized_json(
        "POST",
        CHAT_MESSAGES_ENDPOINT,
        &json!({
            "model": "opus",
            "tools": [{"name": "web_search_20250305"}, {"name": "bash"}],
        }),
    );
    let (status, _payload) = send(&state, request).await;

    assert_eq!(status, StatusCode::OK);
    upstream.assert();
}

#[tokio::test]
async fn functional_chat_proxy_passes_upstream_error_statuses_through() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/messages");
        then.status(429)
            .header("retry-after", "7")
            .json_body(json!({"error": {"type": "rate_limit_error"}}));
    });

    let temp = tempdir().expect("tempdir");
    let credentials = CredentialStore::new(Some("upstream-key".to_string()), None, None);
    let state = test_state(
        temp.path(),
        test_config(&server.base_url()),
        credentials,
        fixture_ownership(true, true),
    );

    let request = authorized_json(
        "POST",
        CHAT_MESSAGES_ENDPOINT,
        &json!({"model": "opus", "messages": []}),
    );
    let response = build_gateway_router(Arc::clone(&state))
        .oneshot(request)
        .await
        .expect("route request");

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        response
            .headers()
            .get("retry-after")
            .and_then(|value| value.to_str().ok()),
        Some("7")
    );
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let payload: Value = serde_json::from_slice(&bytes).expect("json body");
    assert_eq!(payload["error"]["type"], "rate_limit_error");
}

#[tokio::test]
async fn unit_chat_proxy_maps_unreachable_upstreams_to_bad_gateway() {
    let temp = tempdir().expect("tempdir");
    let base = format!("http://127.0.0.1:{}", unused_local_port());
    let credentials = CredentialStore::new(Some("upstream-key".to_string()), None, None);
    let state = test_state(
        temp.path(),
        test_config(&base),
        credentials,
        fixture_ownership(true, true),
    );

    let request = authorized_json(
        "POST",
        CHAT_MESSAGES_ENDPOINT,
        &json!({"model": "opus", "messages": []}),
    );
    let (status, payload) = send(&state, request).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(payload["error"]["code"], "upstream_unavailable");
    assert_eq!(payload["error"]["type"], "server_error");
}

#[tokio::test]
async fn functional_chat_proxy_streams_event_bytes_verbatim() {
    let sse_payload = "event: message_start\ndata: {}\n\nevent: message_stop\ndata: {}\n\n";
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/messages");
        then.status(200)
            .header("content-type", "text/event-stream")
            .body(sse_payload);
    });

    let temp = tempdir().expect("tempdir");
    let credentials = CredentialStore::new(Some("upstream-key".to_string()), None, None);
    let state = test_state(
        temp.path(),
        test_config(&server.base_url()),
        credentials,
        fixture_ownership(true, true),
    );

    let request = authorized_json(
        "POST",
        CHAT_MESSAGES_ENDPOINT,
        &json!({"model": "opus", "stream": true, "messages": []}),
    );
    let response = build_gateway_router(Arc::clone(&state))
        .oneshot(request)
        .await
        .expect("route request");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok()),
        Some("text/event-stream")
    );
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("collect stream");
    assert_eq!(bytes.as_ref(), sse_payload.as_bytes());
}

#[tokio::test]
async fn functional_count_tokens_shares_credential_injection() {
    let server = MockServer::start();
    let upstream = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/messages/count_tokens")
            .header("x-api-key", "upstream-key");
        then.status(200).json_body(json!({"input_tokens": 42}));
    });

    let temp = tempdir().expect("tempdir");
    let credentials = CredentialStore::new(Some("upstream-key".to_string()), None, None);
    let state = test_state(
        temp.path(),
        test_config(&server.base_url()),
        credentials,
        fixture_ownership(true, true),
    );

    let request = authorized_json(
        "POST",
        CHAT_COUNT_TOKENS_ENDPOINT,
        &json!({"model": "opus", "messages": []}),
    );
    let (status, payload) = send(&state, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["input_tokens"], 42);
    upstream.assert();
}

#[test]
fn unit_streaming_detection_requires_a_top_level_boolean() {
    assert!(proxy_runtime::is_streaming_request(br#"{"stream": true}"#));
    assert!(!proxy_runtime::is_streaming_request(
        br#"{"stream": false}"#
    ));
    assert!(!proxy_runtime::is_streaming_request(
        br#"{"stream": "true"}"#
    ));
    assert!(!proxy_runtime::is_streaming_request(br#"{}"#));
    assert!(!proxy_runtime::is_streaming_request(b"not json"));
    assert!(!proxy_runtime::is_streaming_request(
        br#"{"messages": [{"content": "set stream: true"}]}"#
    ));
}

#[test]
fn unit_request_and_response_header_filters_drop_unsafe_names() {
    use axum::http::HeaderName;

    for name in [
        "host",
        "content-length",
        "transfer-encoding",
        "authorization",
        "x-api-key",
        "connection",
    ] {
        let header = HeaderName::from_bytes(name.as_bytes()).expect("header name");
        assert!(
            !proxy_runtime::should_forward_request_header(&header),
            "{name} must be dropped from upstream requests"
        );
    }
    let kept = HeaderName::from_bytes(b"anthropic-version").expect("header name");
    assert!(proxy_runtime::should_forward_request_header(&kept));

    for name in ["content-encoding", "transfer-encoding", "connection"] {
        let header = HeaderName::from_bytes(name.as_bytes()).expect("header name");
        assert!(
            !proxy_runtime::should_forward_response_header(&header),
            "{name} must be dropped from proxied responses"
        );
    }
    let retry = HeaderName::from_bytes(b"retry-after").expect("header name");
    assert!(proxy_runtime::should_forward_response_header(&retry));
}

#[test]
fn unit_network_tool_names_are_matched_across_separator_styles() {
    for name in [
        "web_search",
        "web_search_20250305",
        "WebSearch",
        "web-fetch",
        "webfetch",
        "WEB_FETCH_20250910",
    ] {
        assert!(proxy_runtime::is_network_tool(name), "{name} should match");
    }
    for name in ["bash", "str_replace", "websocket_tool", "search_web"] {
        assert!(!proxy_runtime::is_network_tool(name), "{name} should pass");
    }
}

#[test]
fn unit_private_body_filter_preserves_non_object_payloads() {
    let garbage = b"not json at all";
    assert_eq!(proxy_runtime::filtered_request_body(garbage), garbage);

    let array = br#"[{"name": "web_search"}]"#;
    assert_eq!(proxy_runtime::filtered_request_body(array), array);

    let untouched = br#"{"model": "opus", "tools": [{"name": "bash"}]}"#;
    assert_eq!(proxy_runtime::filtered_request_body(untouched), untouched);
}

#[tokio::test]
async fn integration_gateway_serves_requests_over_a_real_socket() {
    let temp = tempdir().expect("tempdir");
    let state = test_state(
        temp.path(),
        test_config("http://127.0.0.1:9"),
        CredentialStore::default(),
        fixture_ownership(true, true),
    );
    let (addr, handle) = spawn_test_server(state).await.expect("spawn server");

    let client = Client::new();
    let health = client
        .get(format!("http://{addr}{HEALTH_ENDPOINT}"))
        .send()
        .await
        .expect("health request");
    assert_eq!(health.status(), StatusCode::OK);

    let blocked = client
        .post(format!("http://{addr}{GH_EXECUTE_ENDPOINT}"))
        .bearer_auth("secret")
        .json(&json!({"args": ["repo", "delete", "acme/widget"]}))
        .send()
        .await
        .expect("execute request");
    assert_eq!(blocked.status(), StatusCode::FORBIDDEN);
    let payload: Value = blocked.json().await.expect("error payload");
    assert!(payload["error"]["message"]
        .as_str()
        .expect("message")
        .contains("not allowed"));

    handle.abort();
}
