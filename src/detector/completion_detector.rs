// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::settings::DetectorSettings;
use crate::detector::api_watcher::ApiWatcher;
use crate::detector::external_source::ExternalSignalSource;
use crate::detector::latch::{CompletionLatch, StartGate};
use crate::detector::response_parser::EndpointPatterns;
use crate::detector::structural_watcher::StructuralWatcher;
use crate::detector::traits::{
    CompletionOutcome, CompletionSource, DetectorEvent, Resolution, SignalSource, WatchContext,
};
use crate::domain::models::job::JobRecord;
use crate::infrastructure::metrics::DETECTOR_RESOLUTIONS;
use crate::target::driver::{DriverError, PageDriver};
use crate::utils::errors::DetectionError;

const TEARDOWN_GRACE: Duration = Duration::from_millis(250);

/// 完成检测配置
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// 启动确认窗口
    pub start_window: Duration,
    /// 开始确认后的硬性超时
    pub hard_timeout: Duration,
    /// 上报进度的最小变化量
    pub min_progress_delta: f64,
    /// 结构判定完成后的稳定等待
    pub settle_delay: Duration,
    /// 输入文本与提交之间的停顿
    pub submit_pause: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            start_window: Duration::from_secs(15),
            hard_timeout: Duration::from_secs(300),
            min_progress_delta: 1.0,
            settle_delay: Duration::from_secs(1),
            submit_pause: Duration::from_millis(500),
        }
    }
}

impl From<&DetectorSettings> for DetectorConfig {
    fn from(settings: &DetectorSettings) -> Self {
        Self {
            start_window: settings.start_window(),
            hard_timeout: settings.hard_timeout(),
            min_progress_delta: settings.min_progress_delta,
            settle_delay: Duration::from_millis(settings.settle_delay_ms),
            submit_pause: Duration::from_millis(settings.submit_pause_ms),
        }
    }
}

/// 完成检测器
///
/// 每次提交安装接口、页面结构和外部三个信号源，与启动确认窗口和硬性超时赛跑，
/// 只产生一个结论。结论产生后取消全部信号源。
pub struct CompletionDetector {
    driver: Arc<dyn PageDriver>,
    config: DetectorConfig,
    patterns: EndpointPatterns,
}

impl CompletionDetector {
    pub fn new(driver: Arc<dyn PageDriver>, config: DetectorConfig, patterns: EndpointPatterns) -> Self {
        Self {
            driver,
            config,
            patterns,
        }
    }

    pub fn driver(&self) -> &Arc<dyn PageDriver> {
        &self.driver
    }

    /// 提交任务并等待结论
    ///
    /// # 参数
    ///
    /// * `job` - 要提交的任务
    /// * `external` - 外部完成信号
    /// * `events` - 开始确认与进度事件的去向
    ///
    /// # 返回值
    ///
    /// 唯一的结论，失败原因见 [`DetectionError`]
    pub async fn run(
        &self,
        job: &JobRecord,
        external: mpsc::Receiver<()>,
        events: mpsc::UnboundedSender<DetectorEvent>,
    ) -> Resolution {
        let gate = StartGate::new();
        let latch = Arc::new(CompletionLatch::new(gate.clone()));
        let cancel = CancellationToken::new();
        let ctx = WatchContext {
            latch: latch.clone(),
            gate: gate.clone(),
            events,
            cancel: cancel.clone(),
        };

        // 先订阅再提交，避免错过创建响应
        let sources: Vec<Box<dyn CompletionSource>> = vec![
            Box::new(ApiWatcher::new(
                self.driver.network_events(),
                self.patterns.clone(),
                self.config.min_progress_delta,
            )),
            Box::new(StructuralWatcher::new(
                self.driver.clone(),
                self.config.settle_delay,
            )),
            Box::new(ExternalSignalSource::new(external)),
        ];

        info!(job_id = %job.id, "Submitting job to target");
        if let Err(e) = self.submit(job).await {
            warn!(job_id = %job.id, "Submission failed: {}", e);
            let resolution = latch.resolve_now(
                SignalSource::Detector,
                CompletionOutcome::Failure(DetectionError::Submission(e.to_string())),
            );
            return Self::record(job, resolution);
        }

        let handles: Vec<JoinHandle<()>> = sources
            .into_iter()
            .map(|mut source| {
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    let name = source.source();
                    source.run(ctx).await;
                    debug!(source = %name, "Completion source stopped");
                })
            })
            .collect();
        drop(ctx);

        let resolution = self.race(&latch, &gate).await;

        cancel.cancel();
        for handle in handles {
            let abort = handle.abort_handle();
            if tokio::time::timeout(TEARDOWN_GRACE, handle).await.is_err() {
                abort.abort();
            }
        }

        Self::record(job, resolution)
    }

    async fn submit(&self, job: &JobRecord) -> Result<(), DriverError> {
        self.driver.set_prompt_text(&job.text).await?;
        tokio::time::sleep(self.config.submit_pause).await;
        self.driver.trigger_submit().await
    }

    async fn race(&self, latch: &CompletionLatch, gate: &StartGate) -> Resolution {
        let started = tokio::select! {
            biased;
            resolution = latch.wait() => return resolution,
            source = gate.opened() => {
                debug!(source = %source, "Generation start confirmed");
                true
            }
            _ = tokio::time::sleep(self.config.start_window) => false,
        };

        if !started {
            return latch.resolve_now(
                SignalSource::Detector,
                CompletionOutcome::Failure(DetectionError::StartupTimeout),
            );
        }

        tokio::select! {
            biased;
            resolution = latch.wait() => resolution,
            _ = tokio::time::sleep(self.config.hard_timeout) => latch.resolve_now(
                SignalSource::Detector,
                CompletionOutcome::Failure(DetectionError::CompletionTimeout),
            ),
        }
    }

    fn record(job: &JobRecord, resolution: Resolution) -> Resolution {
        counter!(DETECTOR_RESOLUTIONS, "source" => resolution.source.as_str()).increment(1);
        match &resolution.outcome {
            CompletionOutcome::Success { generations } => info!(
                job_id = %job.id,
                source = %resolution.source,
                generations = generations.len(),
                "Job resolved as success"
            ),
            CompletionOutcome::Failure(error) => info!(
                job_id = %job.id,
                source = %resolution.source,
                reason = %error.reason(),
                "Job resolved as failure"
            ),
        }
        resolution
    }
}
