// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use genqueue::domain::models::insert::InsertOptions;
use genqueue::domain::models::job::{JobRecord, JobStatus, MediaKind};
use genqueue::infrastructure::durable_store::DurableStore;
use genqueue::messaging::target_link::TargetLink;
use genqueue::queue::orchestrator::QueueOrchestrator;
use genqueue::utils::errors::{DeliveryError, DetectionError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// 只记录投递的页面链接
#[derive(Default)]
struct AcceptingLink {
    delivered: parking_lot::Mutex<Vec<Uuid>>,
}

#[async_trait]
impl TargetLink for AcceptingLink {
    async fn deliver(&self, job: &JobRecord) -> Result<(), DeliveryError> {
        self.delivered.lock().push(job.id);
        Ok(())
    }

    async fn signal_generation_complete(&self, _job_id: Uuid) -> Result<bool, DeliveryError> {
        Ok(false)
    }
}

async fn orchestrator(job_count: usize) -> (Arc<QueueOrchestrator>, Arc<AcceptingLink>) {
    let store = Arc::new(DurableStore::in_memory());
    store
        .update_stored_config(|config| {
            config.min_delay_ms = 0;
            config.max_delay_ms = 0;
        })
        .await
        .unwrap();
    let jobs: Vec<JobRecord> = (0..job_count)
        .map(|i| JobRecord::new(format!("job {}", i), MediaKind::Image))
        .collect();
    store.insert_jobs(jobs, &InsertOptions::default()).await.unwrap();

    let link = Arc::new(AcceptingLink::default());
    (QueueOrchestrator::new(store, link.clone(), None), link)
}

async fn assert_invariants(orchestrator: &QueueOrchestrator, terminal: &mut HashSet<Uuid>, step: usize) {
    let (state, jobs) = orchestrator.snapshot().await;

    let processing: Vec<&JobRecord> = jobs
        .iter()
        .filter(|job| job.status == JobStatus::Processing)
        .collect();
    assert!(processing.len() <= 1, "step {}: {} jobs processing", step, processing.len());

    if let Some(current) = state.current_job_id {
        assert!(state.is_running, "step {}: current job on a stopped queue", step);
        let job = jobs.iter().find(|job| job.id == current).unwrap();
        assert_eq!(job.status, JobStatus::Processing, "step {}", step);
    }
    if state.is_paused {
        assert!(state.is_running, "step {}: paused but not running", step);
    }

    for job in &jobs {
        if terminal.contains(&job.id) {
            assert!(job.is_terminal(), "step {}: job {} left a terminal state", step, job.id);
        } else if job.is_terminal() {
            terminal.insert(job.id);
        }
    }
}

/// 随机操作序列下，任何时刻最多一个任务在执行，终态不可逆
#[tokio::test(start_paused = true)]
async fn random_operations_keep_single_flight() {
    let mut rng = StdRng::seed_from_u64(0x5eed_2025);
    let (orchestrator, link) = orchestrator(6).await;
    let store = orchestrator.store().clone();
    let mut terminal = HashSet::new();

    for step in 0..400 {
        let current = store.queue_state().await.current_job_id;
        match rng.random_range(0..9) {
            0 => orchestrator.start().await.unwrap(),
            1 => orchestrator.pause().await.unwrap(),
            2 => orchestrator.resume().await.unwrap(),
            3 => orchestrator.stop().await.unwrap(),
            4 => {
                if let Some(job_id) = current {
                    orchestrator.on_job_completed(job_id, Vec::new()).await.unwrap();
                }
            }
            5 => {
                if let Some(job_id) = current {
                    let error = DetectionError::TargetFailure {
                        message: "moderation".to_string(),
                        rate_limited: rng.random_bool(0.1),
                    };
                    orchestrator.on_job_failed(job_id, &error).await.unwrap();
                }
            }
            6 => {
                // 针对任意一次历史投递的迟到结果
                let delivered = link.delivered.lock().clone();
                if !delivered.is_empty() {
                    let job_id = delivered[rng.random_range(0..delivered.len())];
                    orchestrator.on_job_completed(job_id, Vec::new()).await.unwrap();
                }
            }
            7 => {
                let job = JobRecord::new(format!("late job {}", step), MediaKind::Video);
                orchestrator
                    .enqueue(vec![job], InsertOptions::default())
                    .await
                    .unwrap();
            }
            _ => {
                if let Some(job_id) = current {
                    let percent = rng.random_range(0.0..100.0);
                    orchestrator.on_progress(job_id, percent).await.unwrap();
                }
            }
        }

        // 让零间隔的派发定时器运行
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_invariants(&orchestrator, &mut terminal, step).await;
    }

    let history = store.history().await;
    let unique: HashSet<Uuid> = history.iter().map(|job| job.id).collect();
    assert_eq!(unique.len(), history.len());
    assert!(history.iter().all(JobRecord::is_terminal));
}

/// 同一个任务的完成结果重复到达时只记一次
#[tokio::test]
async fn repeated_completion_is_applied_once() {
    let (orchestrator, link) = orchestrator(2).await;
    let store = orchestrator.store().clone();
    orchestrator.start().await.unwrap();

    let first = link.delivered.lock()[0];
    orchestrator.on_job_completed(first, Vec::new()).await.unwrap();
    orchestrator.on_job_completed(first, Vec::new()).await.unwrap();
    orchestrator
        .on_job_failed(first, &DetectionError::CompletionTimeout)
        .await
        .unwrap();

    let job = store.job(first).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.failure_reason, None);
    assert_eq!(store.history().await.len(), 1);
    assert_eq!(store.queue_state().await.processed_count, 1);
}
