//! API routes.

pub mod health;
pub mod render;

use crate::AppState;
use crate::error::ApiError;
use axum::Router;

/// Build the main API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api", render::router())
        .merge(health::router())
        .fallback(not_found)
        .with_state(state)
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use listcast_config::{JobConfig, PipelineConfig};
    use listcast_executor::LocalProcessSupervisor;
    use listcast_scheduler::RenderOrchestrator;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn state(script: &str, timeout: Duration) -> AppState {
        let pipeline = PipelineConfig {
            program: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            script: None,
            working_dir: None,
            env: HashMap::new(),
        };
        let job = JobConfig {
            timeout,
            grace: Duration::from_millis(300),
            ..Default::default()
        };
        AppState::with_orchestrator(RenderOrchestrator::new(
            Arc::new(LocalProcessSupervisor::new()),
            pipeline,
            job,
        ))
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
        let response = crate::app(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn test_health() {
        let state = state("exit 0", Duration::from_secs(10));

        let (status, body) = send(&state, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);

        let (status, body) = send(&state, get("/health/ready")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["busy"], false);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let state = state("exit 0", Duration::from_secs(10));
        let (status, body) = send(&state, get("/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn test_render_success() {
        let state = state(r#"echo "::OUTPUT::/tmp/$0-$1.mp4""#, Duration::from_secs(10));

        let (status, body) = send(
            &state,
            post("/api/render", r#"{"listingId": 42, "variant": "kurumsal"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["output"], "/tmp/42-kurumsal.mp4");
        assert_eq!(body["listingId"], 42);
        assert_eq!(body["variant"], "kurumsal");
        assert!(body.get("externalUrl").is_none());
    }

    #[tokio::test]
    async fn test_render_reports_external_url() {
        let state = state(
            "echo ::OUTPUT::/tmp/a.mp4; echo ::S3_URL::https://cdn.example.com/a.mp4",
            Duration::from_secs(10),
        );

        let (status, body) = send(&state, post("/api/render", r#"{"id": "7"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["externalUrl"], "https://cdn.example.com/a.mp4");
        assert_eq!(body["variant"], "default");
    }

    #[tokio::test]
    async fn test_render_malformed_json() {
        let state = state("exit 0", Duration::from_secs(10));
        let (status, body) = send(&state, post("/api/render", "{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");
    }

    #[tokio::test]
    async fn test_render_validation() {
        let state = state("exit 0", Duration::from_secs(10));

        for body in [r#"{}"#, r#"{"listingId": 0}"#, r#"{"listingId": "abc"}"#, ""] {
            let (status, json) = send(&state, post("/api/render", body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body {body:?}");
            assert_eq!(json["error"], "validation");
        }
    }

    #[tokio::test]
    async fn test_render_pipeline_failure() {
        let state = state("echo working; echo broken >&2; exit 2", Duration::from_secs(10));

        let (status, body) = send(&state, post("/api/render", r#"{"listingId": 1}"#)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "pipeline_failed");
        assert_eq!(body["code"], 2);
        let logs = body["logs"].as_str().unwrap();
        assert!(logs.contains("working"));
        assert!(logs.contains("broken"));
    }

    #[tokio::test]
    async fn test_render_spawn_error() {
        let mut pipeline = PipelineConfig::default();
        pipeline.program = "/definitely/not/a/real/binary".to_string();
        pipeline.script = None;
        let state = AppState::with_orchestrator(RenderOrchestrator::new(
            Arc::new(LocalProcessSupervisor::new()),
            pipeline,
            JobConfig::default(),
        ));

        let (status, body) = send(&state, post("/api/render", r#"{"listingId": 1}"#)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "spawn_error");
        assert!(!state.orchestrator.is_busy());
    }

    #[tokio::test]
    async fn test_render_timeout() {
        let state = state("sleep 30", Duration::from_millis(200));

        let (status, body) = send(&state, post("/api/render", r#"{"listingId": 1}"#)).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["error"], "timeout");
        assert!(!state.orchestrator.is_busy());
    }

    #[tokio::test]
    async fn test_busy_then_cancel() {
        let state = state("sleep 30", Duration::from_secs(60));

        let first = tokio::spawn({
            let state = state.clone();
            async move { send(&state, post("/api/render", r#"{"listingId": 1}"#)).await }
        });

        for _ in 0..100 {
            if state.orchestrator.is_busy() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(state.orchestrator.is_busy());

        let (status, body) = send(&state, post("/api/render", r#"{"listingId": 2}"#)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "busy");

        let (_, ready) = send(&state, get("/health/ready")).await;
        assert_eq!(ready["busy"], true);

        let (status, body) = send(&state, post("/api/cancel", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cancelled"], true);
        assert!(!state.orchestrator.is_busy());

        let (status, body) = first.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cancelled"], true);
        assert_eq!(body["listingId"], 1);
    }

    #[tokio::test]
    async fn test_cancel_without_job() {
        let state = state("exit 0", Duration::from_secs(10));
        let (status, body) = send(&state, post("/api/cancel", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["cancelled"], false);
        assert_eq!(body["message"], "No active job");
    }

    #[tokio::test]
    async fn test_cancel_after_job_finished_on_its_own() {
        let pipeline = PipelineConfig {
            program: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), "sleep 5 & exit 0".to_string()],
            script: None,
            working_dir: None,
            env: HashMap::new(),
        };
        let job = JobConfig {
            timeout: Duration::from_secs(60),
            grace: Duration::from_secs(2),
            ..Default::default()
        };
        let state = AppState::with_orchestrator(RenderOrchestrator::new(
            Arc::new(LocalProcessSupervisor::new()),
            pipeline,
            job,
        ));

        let render = tokio::spawn({
            let state = state.clone();
            async move { send(&state, post("/api/render", r#"{"listingId": 1}"#)).await }
        });
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(state.orchestrator.is_busy());

        let (status, body) = send(&state, post("/api/cancel", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cancelled"], false);
        assert_eq!(body["message"], "Job already finished");

        let (status, body) = render.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let state = state("exit 0", Duration::from_secs(10));
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/render")
            .header("origin", "http://example.com")
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap();

        let response = crate::app(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
    }
}
