// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::TestServer;
use genqueue::application::dto::job_request::{EnqueueResponseDto, UpdatedCountDto};
use genqueue::application::dto::queue_request::ConfigResponseDto;
use genqueue::domain::models::job::{JobRecord, JobStatus};
use genqueue::infrastructure::durable_store::DurableStore;
use genqueue::messaging::target_link::TargetLink;
use genqueue::presentation::routes::{routes, AppState};
use genqueue::queue::orchestrator::QueueOrchestrator;
use genqueue::utils::errors::DeliveryError;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

struct AcceptAll;

#[async_trait]
impl TargetLink for AcceptAll {
    async fn deliver(&self, _job: &JobRecord) -> Result<(), DeliveryError> {
        Ok(())
    }

    async fn signal_generation_complete(&self, _job_id: Uuid) -> Result<bool, DeliveryError> {
        Ok(false)
    }
}

fn create_test_app() -> (TestServer, Arc<QueueOrchestrator>) {
    let store = Arc::new(DurableStore::in_memory());
    let orchestrator = QueueOrchestrator::new(store, Arc::new(AcceptAll), None);
    let server = TestServer::new(routes(AppState::new(orchestrator.clone()))).unwrap();
    (server, orchestrator)
}

async fn enqueue(server: &TestServer, texts: &[&str]) -> Vec<Uuid> {
    let jobs: Vec<Value> = texts.iter().map(|text| json!({ "text": text })).collect();
    let response = server.post("/v1/jobs").json(&json!({ "jobs": jobs })).await;
    response.assert_status(StatusCode::CREATED);
    response.json::<EnqueueResponseDto>().job_ids
}

#[tokio::test]
async fn test_health_check() {
    let (server, _) = create_test_app();
    let response = server.get("/health").await;
    response.assert_status_ok();
    response.assert_text("OK");
}

#[tokio::test]
async fn test_enqueue_and_list_jobs() {
    let (server, _) = create_test_app();
    let ids = enqueue(&server, &["first", "second"]).await;
    assert_eq!(ids.len(), 2);

    let response = server
        .post("/v1/jobs")
        .json(&json!({
            "jobs": [{ "text": "urgent", "media_kind": "image" }],
            "position": "start"
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let urgent = response.json::<EnqueueResponseDto>().job_ids[0];

    let jobs = server.get("/v1/jobs").await.json::<Vec<JobRecord>>();
    let order: Vec<Uuid> = jobs.iter().map(|job| job.id).collect();
    assert_eq!(order, vec![urgent, ids[0], ids[1]]);
    assert!(jobs.iter().all(|job| job.status == JobStatus::Pending));
}

#[tokio::test]
async fn test_enqueue_rejects_invalid_payloads() {
    let (server, _) = create_test_app();

    let response = server.post("/v1/jobs").json(&json!({ "jobs": [] })).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert!(response.json::<Value>()["error"].is_string());

    let response = server
        .post("/v1/jobs")
        .json(&json!({ "jobs": [{ "text": "x" }], "position": "after" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .post("/v1/jobs")
        .json(&json!({ "jobs": [{ "text": "x" }], "position": "after", "reference_id": Uuid::new_v4() }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_unknown_job_is_not_found() {
    let (server, _) = create_test_app();
    let response = server.delete(&format!("/v1/jobs/{}", Uuid::new_v4())).await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_edit_duplicate_and_delete_job() {
    let (server, orchestrator) = create_test_app();
    let ids = enqueue(&server, &["draft"]).await;

    server
        .patch(&format!("/v1/jobs/{}", ids[0]))
        .json(&json!({ "text": "final" }))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let response = server.post(&format!("/v1/jobs/{}/duplicate", ids[0])).await;
    response.assert_status(StatusCode::CREATED);
    let copy = response.json::<JobRecord>();
    assert_eq!(copy.text, "final");
    assert_ne!(copy.id, ids[0]);

    server
        .delete(&format!("/v1/jobs/{}", ids[0]))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    let remaining = orchestrator.store().jobs().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, copy.id);
}

#[tokio::test]
async fn test_batch_label_and_priority() {
    let (server, orchestrator) = create_test_app();
    let ids = enqueue(&server, &["a", "b", "c"]).await;

    let response = server
        .post("/v1/jobs/batch-label")
        .json(&json!({ "job_ids": [ids[0], ids[2]], "batch_label": "night run" }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<UpdatedCountDto>().updated, 2);

    let response = server
        .post("/v1/jobs/priority")
        .json(&json!({ "job_ids": [ids[1]], "priority": "high" }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<UpdatedCountDto>().updated, 1);

    let jobs = orchestrator.store().jobs().await;
    assert_eq!(jobs[0].batch_label.as_deref(), Some("night run"));
    assert_eq!(jobs[1].batch_label, None);
    assert!(jobs[1].priority.is_some());
}

#[tokio::test]
async fn test_queue_lifecycle() {
    let (server, _) = create_test_app();
    let ids = enqueue(&server, &["one", "two"]).await;

    let state = server.get("/v1/queue").await.json::<Value>();
    assert_eq!(state["status"], "stopped");

    let response = server.post("/v1/queue/start").await;
    response.assert_status_ok();
    let state = response.json::<Value>();
    assert_eq!(state["status"], "running");
    assert_eq!(state["current_job_id"], json!(ids[0]));
    assert_eq!(state["total_count"], 2);

    let state = server.post("/v1/queue/pause").await.json::<Value>();
    assert_eq!(state["status"], "paused");

    let state = server.post("/v1/queue/stop").await.json::<Value>();
    assert_eq!(state["status"], "stopped");
    assert!(state["current_job_id"].is_null());
}

#[tokio::test]
async fn test_selection_requires_pending_jobs() {
    let (server, _) = create_test_app();
    let response = server
        .post("/v1/queue/selection")
        .json(&json!({ "job_ids": [Uuid::new_v4()] }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_config_roundtrip_hides_token() {
    let (server, _) = create_test_app();

    let response = server
        .put("/v1/config")
        .json(&json!({
            "min_delay_ms": 1000,
            "max_delay_ms": 4000,
            "telegram_bot_token": "secret",
            "telegram_chat_id": "42"
        }))
        .await;
    response.assert_status_ok();
    let config = response.json::<ConfigResponseDto>();
    assert_eq!(config.min_delay_ms, 1000);
    assert_eq!(config.max_delay_ms, 4000);
    assert!(config.telegram_configured);

    let raw = server.get("/v1/config").await.text();
    assert!(!raw.contains("secret"));

    let config = server
        .put("/v1/config")
        .json(&json!({ "telegram_bot_token": "" }))
        .await
        .json::<ConfigResponseDto>();
    assert!(!config.telegram_configured);
}

#[tokio::test]
async fn test_event_stream_reports_queue_start() {
    let store = Arc::new(DurableStore::in_memory());
    let orchestrator = QueueOrchestrator::new(store, Arc::new(AcceptAll), None);
    let server = TestServer::builder()
        .http_transport()
        .build(routes(AppState::new(orchestrator)))
        .unwrap();
    enqueue(&server, &["streamed"]).await;

    let url = server.server_url("/v1/events").unwrap();
    let mut events = reqwest::get(url.as_str()).await.unwrap();
    assert_eq!(events.status(), reqwest::StatusCode::OK);
    let content_type = events
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));

    server.post("/v1/queue/start").await.assert_status_ok();

    let received = tokio::time::timeout(Duration::from_secs(5), async {
        let mut body = String::new();
        while let Some(chunk) = events.chunk().await.unwrap() {
            body.push_str(&String::from_utf8_lossy(&chunk));
            if body.contains("event: queue_state_changed") && body.contains("\"is_running\":true") {
                break;
            }
        }
        body
    })
    .await
    .expect("queue_state_changed event did not arrive");

    assert!(received.contains("event: queue_state_changed"));
    assert!(received.contains("\"type\":\"queue_state_changed\""));
}
