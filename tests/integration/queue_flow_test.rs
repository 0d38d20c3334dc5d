// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::integration::helpers::{wait_until, Harness, CREATE_URL, POLL_URL};
use genqueue::domain::models::job::JobStatus;
use genqueue::domain::models::queue_state::{AlertKind, QueueStatus};
use serde_json::json;
use std::time::Duration;

/// 三个任务按顺序提交并全部完成，队列最终停止
#[tokio::test]
async fn three_jobs_run_in_order_until_drained() {
    let harness = Harness::new(3).await;
    harness.orchestrator.start().await.unwrap();

    for (n, id) in harness.job_ids.clone().into_iter().enumerate() {
        harness.wait_for_submissions(n + 1).await;
        harness.succeed_task(&format!("task-{}", n + 1));
        harness.wait_for_status(id, JobStatus::Completed).await;
    }

    assert_eq!(
        harness.driver.submitted(),
        vec!["prompt 1", "prompt 2", "prompt 3"]
    );

    let store = harness.store.clone();
    wait_until(|| {
        let store = store.clone();
        async move { !store.queue_state().await.is_running }
    })
    .await;

    let (state, jobs) = harness.orchestrator.snapshot().await;
    assert_eq!(state.status(), QueueStatus::Stopped);
    assert_eq!(state.processed_count, 3);
    assert_eq!(state.current_job_id, None);
    assert!(jobs.iter().all(|job| job.progress_percent == Some(100.0)));
    assert_eq!(jobs[0].generations.len(), 1);
    assert_eq!(
        jobs[0].generations[0].url.as_deref(),
        Some("https://cdn.test/task-1.mp4")
    );

    let history = harness.store.history().await;
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].id, harness.job_ids[2]);
}

/// 第二个任务被限流后队列停止，第三个任务保持待处理
#[tokio::test]
async fn rate_limit_on_second_job_stops_queue() {
    let harness = Harness::new(3).await;
    harness.orchestrator.start().await.unwrap();

    harness.wait_for_submissions(1).await;
    harness.succeed_task("task-1");
    harness.wait_for_status(harness.job_ids[0], JobStatus::Completed).await;

    harness.wait_for_submissions(2).await;
    harness.driver.respond(
        CREATE_URL,
        429,
        json!({ "error": { "code": "too_many_daily_tasks", "message": "Daily limit reached" } }),
    );
    harness.wait_for_status(harness.job_ids[1], JobStatus::Failed).await;

    let store = harness.store.clone();
    wait_until(|| {
        let store = store.clone();
        async move { store.queue_state().await.alert.is_some() }
    })
    .await;

    let state = harness.store.queue_state().await;
    assert!(!state.is_running);
    assert_eq!(state.alert.map(|alert| alert.kind), Some(AlertKind::RateLimited));

    let failed = harness.store.job(harness.job_ids[1]).await.unwrap();
    assert!(failed
        .failure_reason
        .as_deref()
        .is_some_and(|reason| reason.starts_with("rate-limited")));

    tokio::time::sleep(Duration::from_millis(100)).await;
    let third = harness.store.job(harness.job_ids[2]).await.unwrap();
    assert_eq!(third.status, JobStatus::Pending);
    assert_eq!(harness.driver.submitted().len(), 2);
}

/// 启动确认窗口内没有任何迹象，任务以 did-not-start 失败，队列继续
#[tokio::test(start_paused = true)]
async fn job_without_start_signal_fails_and_queue_continues() {
    let harness = Harness::new(2).await;
    harness.orchestrator.start().await.unwrap();

    harness.wait_for_submissions(1).await;
    harness.wait_for_status(harness.job_ids[0], JobStatus::Failed).await;

    let failed = harness.store.job(harness.job_ids[0]).await.unwrap();
    assert_eq!(failed.failure_reason.as_deref(), Some("did-not-start"));
    assert!(failed.duration_ms.is_some());
    assert!(failed.generations.is_empty());

    harness.wait_for_submissions(2).await;
    assert_eq!(
        harness.store.queue_state().await.current_job_id,
        Some(harness.job_ids[1])
    );
}

/// 开始后流量静默达到阈值，经外部信号完成任务，且只完成一次
#[tokio::test(start_paused = true)]
async fn traffic_silence_completes_started_job_once() {
    let harness = Harness::new(1).await;
    harness.orchestrator.start().await.unwrap();

    harness.wait_for_submissions(1).await;
    harness
        .driver
        .respond(CREATE_URL, 200, json!({ "id": "task-1", "status": "queued" }));
    harness.driver.respond(
        POLL_URL,
        200,
        json!([{ "id": "task-1", "status": "running", "progress_pct": 0.1 }]),
    );

    // 心跳推迟静默判定
    for _ in 0..3 {
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(harness.monitor.is_monitoring("fake-tab"));
        harness.driver.heartbeat();
    }
    let job = harness.store.job(harness.job_ids[0]).await.unwrap();
    assert_eq!(job.status, JobStatus::Processing);

    harness
        .wait_for_status(harness.job_ids[0], JobStatus::Completed)
        .await;
    assert!(!harness.monitor.is_monitoring("fake-tab"));
    assert_eq!(harness.store.history().await.len(), 1);

    let store = harness.store.clone();
    wait_until(|| {
        let store = store.clone();
        async move { !store.queue_state().await.is_running }
    })
    .await;
    assert_eq!(harness.store.queue_state().await.processed_count, 1);
}

/// 停止后迟到的结果被忽略，重新启动时孤儿任务被重新派发
#[tokio::test]
async fn stop_leaves_in_flight_job_until_restart() {
    let harness = Harness::new(2).await;
    harness.orchestrator.start().await.unwrap();
    harness.wait_for_submissions(1).await;

    harness.orchestrator.stop().await.unwrap();
    assert_eq!(harness.orchestrator.status().await, QueueStatus::Stopped);

    harness.succeed_task("task-1");
    tokio::time::sleep(Duration::from_millis(200)).await;
    let job = harness.store.job(harness.job_ids[0]).await.unwrap();
    assert_eq!(job.status, JobStatus::Processing);
    assert!(harness.store.history().await.is_empty());

    harness.orchestrator.start().await.unwrap();
    harness.wait_for_submissions(2).await;
    assert_eq!(harness.driver.submitted(), vec!["prompt 1", "prompt 1"]);
}

/// 页面仍在执行时重新启动，队列接管该任务而不是重复提交
#[tokio::test]
async fn restart_while_target_busy_reattaches_running_job() {
    let harness = Harness::new(2).await;
    harness.orchestrator.start().await.unwrap();
    harness.wait_for_submissions(1).await;

    harness.orchestrator.stop().await.unwrap();
    harness.orchestrator.start().await.unwrap();

    let state = harness.store.queue_state().await;
    assert_eq!(state.status(), QueueStatus::Running);
    assert!(state.alert.is_none());
    assert_eq!(state.current_job_id, Some(harness.job_ids[0]));

    harness.succeed_task("task-1");
    harness.wait_for_status(harness.job_ids[0], JobStatus::Completed).await;
    harness.wait_for_submissions(2).await;
    assert_eq!(harness.driver.submitted(), vec!["prompt 1", "prompt 2"]);
    assert_eq!(harness.store.history().await.len(), 1);
}
