// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::integration::helpers::{
    fast_detector_config, patterns, wait_until, FakePageDriver, CREATE_URL, POLL_URL,
};
use genqueue::detector::completion_detector::CompletionDetector;
use genqueue::detector::traits::{CompletionOutcome, DetectorEvent, Resolution, SignalSource};
use genqueue::domain::models::job::{JobRecord, MediaKind};
use genqueue::target::driver::PageSnapshot;
use genqueue::utils::errors::DetectionError;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

struct Run {
    driver: Arc<FakePageDriver>,
    external: mpsc::Sender<()>,
    events: mpsc::UnboundedReceiver<DetectorEvent>,
    handle: JoinHandle<Resolution>,
}

/// 在假驱动上启动一次检测并等待文本被提交
async fn spawn_detection(text: &str) -> Run {
    let driver = Arc::new(FakePageDriver::new());
    let detector = CompletionDetector::new(driver.clone(), fast_detector_config(), patterns());
    let job = JobRecord::new(text, MediaKind::Video);
    let (external, external_rx) = mpsc::channel(4);
    let (events_tx, events) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move { detector.run(&job, external_rx, events_tx).await });

    let watched = driver.clone();
    wait_until(|| {
        let watched = watched.clone();
        async move { !watched.submitted().is_empty() }
    })
    .await;

    Run {
        driver,
        external,
        events,
        handle,
    }
}

fn drain(events: &mut mpsc::UnboundedReceiver<DetectorEvent>) -> Vec<DetectorEvent> {
    let mut collected = Vec::new();
    while let Ok(event) = events.try_recv() {
        collected.push(event);
    }
    collected
}

#[tokio::test]
async fn api_signals_drive_start_progress_and_success() {
    let mut run = spawn_detection("a cat surfing").await;
    assert_eq!(run.driver.submitted(), vec!["a cat surfing"]);

    run.driver
        .respond(CREATE_URL, 200, json!({ "id": "task-9", "status": "queued" }));
    run.driver.respond(
        POLL_URL,
        200,
        json!({ "task_responses": [
            { "id": "other", "status": "running", "progress_pct": 0.9 },
            { "id": "task-9", "status": "running", "progress_pct": 0.25 }
        ]}),
    );
    run.driver.respond(
        POLL_URL,
        200,
        json!([{
            "id": "task-9",
            "status": "succeeded",
            "generations": [{ "id": "g1", "url": "https://cdn.test/g1.mp4" }]
        }]),
    );

    let resolution = run.handle.await.unwrap();
    assert_eq!(resolution.source, SignalSource::Api);
    match resolution.outcome {
        CompletionOutcome::Success { generations } => {
            assert_eq!(generations.len(), 1);
            assert_eq!(generations[0].url.as_deref(), Some("https://cdn.test/g1.mp4"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    let events = drain(&mut run.events);
    assert_eq!(
        events.first(),
        Some(&DetectorEvent::Started {
            source: SignalSource::Api
        })
    );
    assert!(events.contains(&DetectorEvent::Progress { percent: 25.0 }));
    assert!(!events.contains(&DetectorEvent::Progress { percent: 90.0 }));
}

#[tokio::test]
async fn page_structure_confirms_start_and_reports_ready() {
    let run = spawn_detection("sunset timelapse").await;

    run.driver.set_snapshot(PageSnapshot {
        loader_visible: true,
        loader_text: Some("42%".to_string()),
        ..PageSnapshot::default()
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    run.driver.set_snapshot(PageSnapshot {
        status_text: Some("Your video is ready".to_string()),
        ..PageSnapshot::default()
    });

    let resolution = run.handle.await.unwrap();
    assert_eq!(resolution.source, SignalSource::Structural);
    assert!(resolution.outcome.is_success());
}

#[tokio::test]
async fn same_tick_api_and_page_success_resolves_once_for_api() {
    let mut run = spawn_detection("both at once").await;
    run.driver.respond(
        POLL_URL,
        200,
        json!([{ "id": "task-3", "status": "running", "progress_pct": 0.5 }]),
    );
    tokio::time::sleep(Duration::from_millis(50)).await;

    // 两个信号在同一轮调度内到达
    run.driver.set_snapshot(PageSnapshot {
        status_text: Some("Ready".to_string()),
        ..PageSnapshot::default()
    });
    run.driver.respond(
        POLL_URL,
        200,
        json!([{ "id": "task-3", "status": "succeeded", "generations": [{ "id": "g3" }] }]),
    );

    let resolution = run.handle.await.unwrap();
    assert_eq!(resolution.source, SignalSource::Api);
    match resolution.outcome {
        CompletionOutcome::Success { generations } => assert_eq!(generations.len(), 1),
        other => panic!("unexpected outcome: {:?}", other),
    }

    let started = drain(&mut run.events)
        .into_iter()
        .filter(|event| matches!(event, DetectorEvent::Started { .. }))
        .count();
    assert_eq!(started, 1);
}

#[tokio::test]
async fn creation_network_failure_is_a_submission_failure() {
    let run = spawn_detection("broken request").await;
    run.driver.fail_request(CREATE_URL, "net::ERR_CONNECTION_RESET");

    let resolution = run.handle.await.unwrap();
    assert_eq!(resolution.source, SignalSource::Api);
    assert_eq!(
        resolution.outcome,
        CompletionOutcome::Failure(DetectionError::Submission(
            "net::ERR_CONNECTION_RESET".to_string()
        ))
    );
}

#[tokio::test]
async fn page_error_fails_without_rate_limit() {
    let run = spawn_detection("bad prompt").await;
    run.driver.set_snapshot(PageSnapshot {
        error_visible: true,
        ..PageSnapshot::default()
    });

    let resolution = run.handle.await.unwrap();
    match resolution.outcome {
        CompletionOutcome::Failure(error) => {
            assert!(!error.stops_queue());
            assert!(error.reason().starts_with("target-failure"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn external_signal_counts_only_after_start() {
    let run = spawn_detection("quiet traffic").await;

    run.external.send(()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!run.handle.is_finished());

    run.driver
        .respond(POLL_URL, 200, json!([{ "id": "task-1", "status": "running" }]));
    tokio::time::sleep(Duration::from_millis(100)).await;
    run.external.send(()).await.unwrap();

    let resolution = run.handle.await.unwrap();
    assert_eq!(resolution.source, SignalSource::External);
    assert_eq!(resolution.outcome, CompletionOutcome::success());
}

#[tokio::test(start_paused = true)]
async fn no_start_signal_within_window_is_did_not_start() {
    let run = spawn_detection("never starts").await;
    // 页面在启动前就处于空闲状态，不构成完成信号
    run.driver.set_snapshot(PageSnapshot::default());

    let resolution = run.handle.await.unwrap();
    assert_eq!(resolution.source, SignalSource::Detector);
    assert_eq!(
        resolution.outcome,
        CompletionOutcome::Failure(DetectionError::StartupTimeout)
    );
}

#[tokio::test(start_paused = true)]
async fn started_job_without_result_times_out() {
    let run = spawn_detection("endless").await;
    run.driver.respond(
        POLL_URL,
        200,
        json!([{ "id": "task-2", "status": "running", "progress_pct": 0.5 }]),
    );

    let resolution = run.handle.await.unwrap();
    assert_eq!(
        resolution.outcome,
        CompletionOutcome::Failure(DetectionError::CompletionTimeout)
    );
}
