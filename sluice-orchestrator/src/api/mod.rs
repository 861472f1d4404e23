//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod execution;
pub mod health;
pub mod lock;

use axum::{
    Router,
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::service::{LockService, TokenManager, TriggerService};

/// Shared state of every handler
#[derive(Clone)]
pub struct AppState {
    pub triggers: Arc<TriggerService>,
    pub locks: Arc<LockService>,
    pub tokens: Arc<TokenManager>,
    /// Number of executions returned by the history endpoint
    pub history_limit: i64,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Webhook trigger and history
        .route(
            "/pipeline/{id}/execute",
            post(execution::execute_pipeline).get(execution::execution_history),
        )
        // Callback endpoints used by running scripts
        .route(
            "/pipeline/{id}/api/execute-other",
            post(execution::execute_other_pipeline),
        )
        .route(
            "/pipeline/{id}/api/lock/{lock_id}",
            put(lock::put_lock)
                .get(lock::get_lock)
                .delete(lock::delete_lock),
        )
        .route("/locks", get(lock::list_locks))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FilePipelineRegistry;
    use crate::repository::{
        InMemoryExecutionRepository, InMemoryLockRepository, InMemoryTokenRepository,
    };
    use crate::service::{ExecutionLedger, LockAdmissionController};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Duration;
    use sluice_supervisor::{
        Dispatcher, ExecutionRequest, ExecutionResult, Executor, ExecutorError,
        SelectionStrategy, SupervisorDefinition,
    };
    use tower::ServiceExt;

    /// Answers with the trigger payload; payloads containing "fail" exit 1
    struct EchoExecutor;

    impl Executor for EchoExecutor {
        fn kind(&self) -> &'static str {
            "echo"
        }

        fn execute(
            &self,
            request: &ExecutionRequest,
        ) -> std::result::Result<ExecutionResult, ExecutorError> {
            if request.payload == "show query" {
                let env = request.environment()?;
                return Ok(ExecutionResult {
                    output: env["HTTP_QUERY"].clone(),
                    exit_code: 0,
                });
            }

            Ok(ExecutionResult {
                output: format!("echo: {}", request.payload),
                exit_code: if request.payload.contains("fail") { 1 } else { 0 },
            })
        }
    }

    struct TestApp {
        router: Router,
        ledger: Arc<ExecutionLedger>,
        tokens: Arc<TokenManager>,
        _storage: tempfile::TempDir,
    }

    fn declare(root: &std::path::Path, id: &str) {
        std::fs::write(
            root.join("pipelines").join(format!("{}.json", id)),
            format!(
                r#"{{"title": "{id}", "secret": "{id}-secret", "script": "scripts/run.sh"}}"#
            ),
        )
        .unwrap();
    }

    fn app() -> TestApp {
        let storage = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(storage.path().join("pipelines")).unwrap();
        std::fs::create_dir_all(storage.path().join("scripts")).unwrap();
        std::fs::write(storage.path().join("scripts/run.sh"), "echo run").unwrap();
        declare(storage.path(), "deploy");
        declare(storage.path(), "build");

        let dispatcher = Dispatcher::new(
            vec![SupervisorDefinition {
                name: "local".to_string(),
                labels: vec![],
                default: true,
                executor: Arc::new(EchoExecutor),
            }],
            SelectionStrategy::Random,
        )
        .unwrap();

        let lock_repo = Arc::new(InMemoryLockRepository::new());
        let ledger = Arc::new(ExecutionLedger::new(Arc::new(
            InMemoryExecutionRepository::new(),
        )));
        let tokens = Arc::new(TokenManager::new(
            Arc::new(InMemoryTokenRepository::new()),
            Duration::hours(2),
        ));

        let triggers = TriggerService::new(
            Arc::new(FilePipelineRegistry::new(storage.path())),
            Arc::new(LockAdmissionController::new(lock_repo.clone(), false)),
            ledger.clone(),
            tokens.clone(),
            Arc::new(dispatcher),
            "http://localhost:8080",
        );

        let router = create_router(AppState {
            triggers: Arc::new(triggers),
            locks: Arc::new(LockService::new(lock_repo)),
            tokens: tokens.clone(),
            history_limit: 20,
        });

        TestApp {
            router,
            ledger,
            tokens,
            _storage: storage,
        }
    }

    impl TestApp {
        /// Issues a token as if an execution of `pipeline_id` were running
        async fn token_for(&self, pipeline_id: &str) -> String {
            let execution = self.ledger.begin(pipeline_id, "ip", "{}").await.unwrap();
            let token = self.tokens.request(pipeline_id, &execution).await.unwrap();
            token.id.to_string()
        }

        async fn send(
            &self,
            method: &str,
            uri: &str,
            token: Option<&str>,
            body: &str,
        ) -> (StatusCode, axum::http::HeaderMap, String) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header("Token", token);
            }
            let req = builder.body(Body::from(body.to_string())).unwrap();

            let resp = self.router.clone().oneshot(req).await.unwrap();
            let status = resp.status();
            let headers = resp.headers().clone();
            let bytes = axum::body::to_bytes(resp.into_body(), 1_000_000)
                .await
                .unwrap();
            (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
        }
    }

    fn json(body: &str) -> serde_json::Value {
        serde_json::from_str(body).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = app();
        let (status, _, body) = app.send("GET", "/health", None, "").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["status"], "OK");
    }

    #[tokio::test]
    async fn execute_returns_log_and_headers() {
        let app = app();
        let (status, headers, body) = app
            .send(
                "POST",
                "/pipeline/deploy/execute?secret=deploy-secret",
                None,
                "release v1",
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "echo: release v1");
        assert_eq!(headers["x-execution-number"], "1");
        assert_eq!(headers["x-execution-status"], "success");
        assert!(
            headers["content-type"]
                .to_str()
                .unwrap()
                .starts_with("text/plain")
        );

        let (_, headers, _) = app
            .send(
                "POST",
                "/pipeline/deploy/execute?secret=deploy-secret",
                None,
                "please fail",
            )
            .await;
        assert_eq!(headers["x-execution-number"], "2");
        assert_eq!(headers["x-execution-status"], "failure");
    }

    #[tokio::test]
    async fn execute_rejects_bad_secret_and_unknown_pipeline() {
        let app = app();

        let (status, _, body) = app
            .send("POST", "/pipeline/deploy/execute?secret=guess", None, "")
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json(&body)["type"], "AuthorizationError");

        let (status, _, body) = app
            .send("POST", "/pipeline/ghost/execute?secret=x", None, "")
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json(&body)["type"], "NotFoundError");
    }

    #[tokio::test]
    async fn history_lists_recent_executions() {
        let app = app();
        for _ in 0..2 {
            app.send("POST", "/pipeline/build/execute?secret=build-secret", None, "x")
                .await;
        }

        let (status, _, body) = app
            .send("GET", "/pipeline/build/execute?secret=build-secret", None, "")
            .await;
        assert_eq!(status, StatusCode::OK);

        let history = json(&body);
        assert_eq!(history["last_execution_number"], 2);
        assert_eq!(history["executions"].as_array().unwrap().len(), 2);
        assert_eq!(history["executions"][0]["execution_number"], 2);
    }

    #[tokio::test]
    async fn lock_blocks_trigger_until_deleted() {
        let app = app();
        let token = app.token_for("deploy").await;

        let (status, _, body) = app
            .send(
                "PUT",
                "/pipeline/deploy/api/lock/tag",
                Some(&token),
                r#"{"keywords": ["release"]}"#,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["keywords"][0], "release");

        let (status, _, body) = app
            .send(
                "POST",
                "/pipeline/deploy/execute?secret=deploy-secret",
                None,
                "release v2",
            )
            .await;
        assert_eq!(status, StatusCode::LOCKED);
        assert_eq!(json(&body)["type"], "AdmissionBlocked");

        let (status, _, _) = app
            .send(
                "POST",
                "/pipeline/deploy/execute?secret=deploy-secret",
                None,
                "debug build",
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (_, _, body) = app
            .send("DELETE", "/pipeline/deploy/api/lock/tag", Some(&token), "")
            .await;
        assert_eq!(json(&body)["detail"], "deleted");

        let (_, _, body) = app
            .send("DELETE", "/pipeline/deploy/api/lock/tag", Some(&token), "")
            .await;
        assert_eq!(json(&body)["detail"], "already_deleted");

        let (status, _, _) = app
            .send(
                "POST",
                "/pipeline/deploy/execute?secret=deploy-secret",
                None,
                "release v2",
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn lock_endpoints_require_matching_token() {
        let app = app();
        let token = app.token_for("build").await;

        let (status, _, _) = app
            .send("PUT", "/pipeline/deploy/api/lock/global", None, "")
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _, _) = app
            .send("PUT", "/pipeline/deploy/api/lock/global", Some(&token), "")
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _, body) = app
            .send("GET", "/pipeline/build/api/lock/global", Some(&token), "")
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json(&body)["type"], "NotFoundError");
    }

    #[tokio::test]
    async fn lock_on_other_pipeline_and_listing() {
        let app = app();
        let token = app.token_for("build").await;

        let (status, _, body) = app
            .send(
                "PUT",
                "/pipeline/build/api/lock/global?pipeline_id=deploy",
                Some(&token),
                "",
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["pipeline_id"], "deploy");

        let (status, _, _) = app
            .send(
                "POST",
                "/pipeline/deploy/execute?secret=deploy-secret",
                None,
                "anything",
            )
            .await;
        assert_eq!(status, StatusCode::LOCKED);

        let (status, _, body) = app.send("GET", "/locks", None, "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body).as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_locks_filters_by_pipeline() {
        let app = app();
        let deploy = app.token_for("deploy").await;
        let build = app.token_for("build").await;

        let puts = [
            ("deploy", &deploy, "a"),
            ("deploy", &deploy, "b"),
            ("build", &build, "c"),
        ];
        for (pipeline, token, lock) in puts {
            let uri = format!("/pipeline/{}/api/lock/{}", pipeline, lock);
            let (status, _, _) = app.send("PUT", &uri, Some(token), "").await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, _, body) = app
            .send("GET", "/locks?pipeline_id=deploy", None, "")
            .await;
        assert_eq!(status, StatusCode::OK);
        let locks = json(&body);
        let ids: Vec<&str> = locks
            .as_array()
            .unwrap()
            .iter()
            .map(|l| l["lock_id"].as_str().unwrap())
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"a") && ids.contains(&"b"));

        let (_, _, body) = app.send("GET", "/locks", None, "").await;
        assert_eq!(json(&body).as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn repeated_query_keys_reach_the_script() {
        let app = app();

        let (status, _, body) = app
            .send(
                "POST",
                "/pipeline/deploy/execute?tag=a&secret=deploy-secret&tag=b&ref=main",
                None,
                "show query",
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"ref":["main"],"tag":["a","b"]}"#);
    }

    #[tokio::test]
    async fn invalid_lock_body_is_bad_request() {
        let app = app();
        let token = app.token_for("deploy").await;

        let (status, _, body) = app
            .send(
                "PUT",
                "/pipeline/deploy/api/lock/l",
                Some(&token),
                r#"{"keywords": [1]}"#,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json(&body)["type"], "ValidationError");

        let (status, _, _) = app
            .send("PUT", "/pipeline/deploy/api/lock/l", Some(&token), "{oops")
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn execute_other_uses_delegated_token() {
        let app = app();
        let token = app.token_for("deploy").await;

        let (status, headers, body) = app
            .send(
                "POST",
                "/pipeline/deploy/api/execute-other?pipeline_id=build",
                Some(&token),
                "from deploy",
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "echo: from deploy");
        assert_eq!(headers["x-execution-number"], "1");

        let (status, _, _) = app
            .send(
                "POST",
                "/pipeline/build/api/execute-other?pipeline_id=deploy",
                Some(&token),
                "",
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _, _) = app
            .send(
                "POST",
                "/pipeline/deploy/api/execute-other",
                Some(&token),
                "",
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
