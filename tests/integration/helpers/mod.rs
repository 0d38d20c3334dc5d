// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use genqueue::detector::completion_detector::{CompletionDetector, DetectorConfig};
use genqueue::detector::response_parser::EndpointPatterns;
use genqueue::domain::models::insert::InsertOptions;
use genqueue::domain::models::job::{JobRecord, JobStatus, MediaKind};
use genqueue::infrastructure::durable_store::DurableStore;
use genqueue::messaging::channel;
use genqueue::messaging::target_link::{ChannelTargetLink, TargetLink};
use genqueue::monitor::silence_monitor::{SilenceMonitorConfig, TrafficSilenceMonitor};
use genqueue::queue::orchestrator::QueueOrchestrator;
use genqueue::target::driver::{DriverError, NetworkEvent, PageDriver, PageSnapshot};
use genqueue::workers::{BackgroundWorker, TargetWorker};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

pub const CREATE_URL: &str = "https://target.test/backend/video_gen";
pub const POLL_URL: &str = "https://target.test/backend/tasks";
pub const HEARTBEAT_URL: &str = "https://browser-intake-datadoghq.com/api/v2/rum?batch=1";

/// 可编排的假页面驱动
///
/// 测试通过它注入网络响应和结构变化，并读取提交过的文本
pub struct FakePageDriver {
    network: broadcast::Sender<NetworkEvent>,
    changes: broadcast::Sender<()>,
    snapshot: Mutex<PageSnapshot>,
    submitted: Mutex<Vec<String>>,
    pending_text: Mutex<Option<String>>,
}

impl FakePageDriver {
    pub fn new() -> Self {
        Self {
            network: broadcast::channel(64).0,
            changes: broadcast::channel(64).0,
            snapshot: Mutex::new(PageSnapshot::default()),
            submitted: Mutex::new(Vec::new()),
            pending_text: Mutex::new(None),
        }
    }

    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().clone()
    }

    pub fn respond(&self, url: &str, status: u16, body: Value) {
        let _ = self.network.send(NetworkEvent::Response {
            url: url.to_string(),
            status,
            body: Some(body.to_string()),
        });
    }

    pub fn fail_request(&self, url: &str, error: &str) {
        let _ = self.network.send(NetworkEvent::Failed {
            url: url.to_string(),
            error: error.to_string(),
        });
    }

    pub fn heartbeat(&self) {
        let _ = self.network.send(NetworkEvent::Response {
            url: HEARTBEAT_URL.to_string(),
            status: 202,
            body: None,
        });
    }

    pub fn set_snapshot(&self, snapshot: PageSnapshot) {
        *self.snapshot.lock() = snapshot;
        let _ = self.changes.send(());
    }
}

#[async_trait]
impl PageDriver for FakePageDriver {
    fn target_id(&self) -> String {
        "fake-tab".to_string()
    }

    async fn set_prompt_text(&self, text: &str) -> Result<(), DriverError> {
        *self.pending_text.lock() = Some(text.to_string());
        Ok(())
    }

    async fn trigger_submit(&self) -> Result<(), DriverError> {
        let text = self
            .pending_text
            .lock()
            .take()
            .ok_or(DriverError::InputNotFound)?;
        self.submitted.lock().push(text);
        Ok(())
    }

    async fn snapshot(&self) -> Result<PageSnapshot, DriverError> {
        Ok(self.snapshot.lock().clone())
    }

    fn network_events(&self) -> broadcast::Receiver<NetworkEvent> {
        self.network.subscribe()
    }

    fn structure_changes(&self) -> broadcast::Receiver<()> {
        self.changes.subscribe()
    }
}

pub fn patterns() -> EndpointPatterns {
    EndpointPatterns::new(
        vec!["/backend/video_gen".into(), "/backend/image_gen".into()],
        vec!["/backend/tasks".into()],
    )
}

pub fn fast_detector_config() -> DetectorConfig {
    DetectorConfig {
        submit_pause: Duration::ZERO,
        ..DetectorConfig::default()
    }
}

/// 完整装配的两个上下文
pub struct Harness {
    pub store: Arc<DurableStore>,
    pub orchestrator: Arc<QueueOrchestrator>,
    pub driver: Arc<FakePageDriver>,
    pub monitor: Arc<TrafficSilenceMonitor>,
    pub job_ids: Vec<Uuid>,
}

impl Harness {
    /// 创建若干待处理任务并启动两个工作器，派发间隔为零
    pub async fn new(job_count: usize) -> Self {
        let store = Arc::new(DurableStore::in_memory());
        store
            .update_stored_config(|config| {
                config.min_delay_ms = 0;
                config.max_delay_ms = 0;
            })
            .await
            .unwrap();
        let jobs: Vec<JobRecord> = (0..job_count)
            .map(|i| JobRecord::new(format!("prompt {}", i + 1), MediaKind::Video))
            .collect();
        let job_ids = store.insert_jobs(jobs, &InsertOptions::default()).await.unwrap();

        let (target_endpoint, target_inbox) = channel::channel(16);
        let (background_endpoint, background_inbox) = channel::channel(16);
        let target_link: Arc<dyn TargetLink> = Arc::new(ChannelTargetLink::new(
            target_endpoint,
            Duration::from_secs(5),
        ));

        let driver = Arc::new(FakePageDriver::new());
        let detector = Arc::new(CompletionDetector::new(
            driver.clone(),
            fast_detector_config(),
            patterns(),
        ));
        TargetWorker::new(detector, background_endpoint, store.clone()).start(target_inbox);

        let orchestrator = QueueOrchestrator::new(store.clone(), target_link.clone(), None);
        let monitor = Arc::new(TrafficSilenceMonitor::new(SilenceMonitorConfig::default()));
        monitor.attach(driver.target_id(), driver.network_events());
        BackgroundWorker::new(orchestrator.clone(), monitor.clone(), target_link)
            .start(background_inbox);

        Self {
            store,
            orchestrator,
            driver,
            monitor,
            job_ids,
        }
    }

    /// 等待第 `count` 次提交到达页面
    pub async fn wait_for_submissions(&self, count: usize) {
        wait_until(|| {
            let driver = self.driver.clone();
            async move { driver.submitted().len() >= count }
        })
        .await;
    }

    pub async fn wait_for_status(&self, id: Uuid, status: JobStatus) {
        wait_until(|| {
            let store = self.store.clone();
            async move { store.job(id).await.is_some_and(|job| job.status == status) }
        })
        .await;
    }

    /// 模拟目标应用完整地跑完一个任务
    pub fn succeed_task(&self, task_id: &str) {
        self.driver
            .respond(CREATE_URL, 200, serde_json::json!({ "id": task_id, "status": "queued" }));
        self.driver.respond(
            POLL_URL,
            200,
            serde_json::json!([{ "id": task_id, "status": "running", "progress_pct": 0.4 }]),
        );
        self.driver.respond(
            POLL_URL,
            200,
            serde_json::json!([{
                "id": task_id,
                "status": "succeeded",
                "progress_pct": 1.0,
                "generations": [{
                    "id": format!("{}-gen", task_id),
                    "task_type": "video",
                    "url": format!("https://cdn.test/{}.mp4", task_id),
                    "width": 480,
                    "height": 854
                }]
            }]),
        );
    }
}

/// 轮询直到条件成立；暂停时钟下同样适用
pub async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..10_000 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
