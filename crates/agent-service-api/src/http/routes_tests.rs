use super::*;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use serde_json::{Value, json};
use tower::ServiceExt;

use agent_service_config::QueueConfig;
use agent_service_queue::QueueStore;

fn memory_router() -> Router {
    let store = Arc::new(QueueStore::in_memory());
    create_router(Arc::new(AppState::new(store, 4000)))
}

fn unhealthy_router() -> Router {
    let store = Arc::new(QueueStore::new(QueueConfig::default()));
    create_router(Arc::new(AppState::new(store, 4000)))
}

fn post_json(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let response = memory_router().oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["queue"]["healthy"], true);
    assert_eq!(body["queue"]["mode"], "memory");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_test_endpoint_without_queue() {
    let response = unhealthy_router().oneshot(get_request("/test")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["config"]["port"], 4000);
    assert_eq!(body["config"]["queueMode"], "durable");
    assert_eq!(body["config"]["queueHealthy"], false);
}

#[tokio::test]
async fn test_run_and_status_roundtrip() {
    let app = memory_router();

    let response = app
        .clone()
        .oneshot(post_json(
            "/run",
            json!({ "jobId": "job-42", "command": "echo hi" }).to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({ "jobId": "job-42", "status": "queued" })
    );

    let response = app.oneshot(get_request("/status/job-42")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["jobId"], "job-42");
    assert_eq!(body["status"], "queued");
    assert_eq!(body["logs"], json!([]));
    assert!(body["createdAt"].is_string());
}

#[tokio::test]
async fn test_run_requires_job_id() {
    let response = memory_router()
        .oneshot(post_json("/run", json!({ "command": "ls" }).to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await,
        json!({
            "error": "Bad Request",
            "message": "jobId is required and must be a string",
        })
    );
}

#[tokio::test]
async fn test_run_rejects_non_string_command() {
    let response = memory_router()
        .oneshot(post_json("/run", json!({ "jobId": "j1", "command": 7 }).to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["message"], "command is required and must be a string");
}

#[tokio::test]
async fn test_run_rejects_malformed_json() {
    let response = memory_router()
        .oneshot(post_json("/run", "{not json".to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "Bad Request");
}

#[tokio::test]
async fn test_run_when_queue_unavailable() {
    let response = unhealthy_router()
        .oneshot(post_json(
            "/run",
            json!({ "jobId": "j1", "command": "ls" }).to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        json_body(response).await,
        json!({
            "error": "Service Unavailable",
            "message": "Redis connection not available",
        })
    );
}

#[tokio::test]
async fn test_run_validates_before_health() {
    let response = unhealthy_router()
        .oneshot(post_json("/run", json!({ "jobId": "j1" }).to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_status_unknown_job() {
    let response = memory_router().oneshot(get_request("/status/missing")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        json_body(response).await,
        json!({
            "error": "Not Found",
            "message": "Job with ID 'missing' not found",
        })
    );
}

#[tokio::test]
async fn test_status_when_queue_unavailable() {
    let response = unhealthy_router().oneshot(get_request("/status/j1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let request = Request::builder()
        .method("POST")
        .uri("/run")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, BODY_LIMIT + 1)
        .body(Body::from(vec![b' '; BODY_LIMIT + 1]))
        .unwrap();

    let response = memory_router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_unknown_route() {
    let response = memory_router().oneshot(get_request("/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
