// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::detector::completion_detector::CompletionDetector;
use crate::detector::traits::{CompletionOutcome, DetectorEvent};
use crate::domain::models::job::JobRecord;
use crate::infrastructure::durable_store::DurableStore;
use crate::messaging::messages::{
    BackgroundEndpoint, BackgroundRequest, BackgroundResponse, TargetInbox, TargetRequest,
    TargetResponse,
};
use crate::utils::errors::{ChannelError, StoreError};
use crate::utils::retry_policy::RetryPolicy;

struct ActiveSubmission {
    job_id: Uuid,
    external: mpsc::Sender<()>,
}

/// 页面上下文工作器
///
/// 接收后台派发的任务，驱动完成检测，并把进度与结果上报给后台。
/// 同一时刻只执行一个任务，执行中收到的新任务以 `Busy` 拒绝。
#[derive(Clone)]
pub struct TargetWorker {
    detector: Arc<CompletionDetector>,
    background: BackgroundEndpoint,
    store: Arc<DurableStore>,
    retry: RetryPolicy,
    active: Arc<parking_lot::Mutex<Option<ActiveSubmission>>>,
}

impl TargetWorker {
    /// 创建页面上下文工作器
    ///
    /// # 参数
    ///
    /// * `detector` - 完成检测器
    /// * `background` - 后台上下文的请求端
    /// * `store` - 上报彻底失败时直接落盘使用的存储
    pub fn new(
        detector: Arc<CompletionDetector>,
        background: BackgroundEndpoint,
        store: Arc<DurableStore>,
    ) -> Self {
        Self {
            detector,
            background,
            store,
            retry: RetryPolicy::completion_report(),
            active: Arc::new(parking_lot::Mutex::new(None)),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// 当前执行中的任务
    pub fn active_job(&self) -> Option<Uuid> {
        self.active.lock().as_ref().map(|active| active.job_id)
    }

    /// 运行工作器，直到请求端全部关闭
    pub async fn run(self, mut inbox: TargetInbox) {
        info!(target_id = %self.detector.driver().target_id(), "Target worker started");
        while let Some(envelope) = inbox.recv().await {
            let (request, responder) = envelope.into_parts();
            let response = self.handle(request);
            if !responder.respond(response) {
                debug!("Requester went away before reply");
            }
        }
        info!("Target worker stopped");
    }

    /// 启动后台运行
    pub fn start(self, inbox: TargetInbox) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(inbox).await;
        })
    }

    fn handle(&self, request: TargetRequest) -> TargetResponse {
        match request {
            TargetRequest::Ping => TargetResponse::Pong,
            TargetRequest::SubmitJob(job) => {
                let (external, signals) = mpsc::channel(4);
                {
                    let mut active = self.active.lock();
                    if let Some(current) = active.as_ref() {
                        warn!(job_id = %job.id, current = %current.job_id, "Rejecting job while busy");
                        return TargetResponse::Busy {
                            current: current.job_id,
                        };
                    }
                    *active = Some(ActiveSubmission {
                        job_id: job.id,
                        external,
                    });
                }

                let worker = self.clone();
                tokio::spawn(async move {
                    worker.execute(job, signals).await;
                });
                TargetResponse::Accepted
            }
            TargetRequest::ActiveJob => TargetResponse::Active {
                job_id: self.active_job(),
            },
            TargetRequest::GenerationComplete { job_id } => {
                let active = self.active.lock();
                match active.as_ref() {
                    Some(current) if current.job_id == job_id => {
                        if current.external.try_send(()).is_err() {
                            debug!(job_id = %job_id, "External signal already pending");
                        }
                        TargetResponse::Signalled
                    }
                    _ => TargetResponse::NoActiveJob,
                }
            }
        }
    }

    async fn execute(&self, job: JobRecord, signals: mpsc::Receiver<()>) {
        let job_id = job.id;
        let target_id = self.detector.driver().target_id();

        self.notify(BackgroundRequest::StartMonitoring {
            target_id: target_id.clone(),
            job_id,
        })
        .await;

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let background = self.background.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                match event {
                    DetectorEvent::Progress { percent } => {
                        if let Err(e) = background
                            .request(BackgroundRequest::Progress { job_id, percent })
                            .await
                        {
                            debug!(job_id = %job_id, "Progress report dropped: {}", e);
                        }
                    }
                    DetectorEvent::Started { source } => {
                        info!(job_id = %job_id, source = %source, "Generation started");
                    }
                }
            }
        });

        let resolution = self.detector.run(&job, signals, events_tx).await;
        if let Err(e) = forwarder.await {
            debug!("Progress forwarder ended abnormally: {}", e);
        }

        self.notify(BackgroundRequest::StopMonitoring { target_id })
            .await;
        {
            let mut active = self.active.lock();
            if active.as_ref().is_some_and(|current| current.job_id == job_id) {
                *active = None;
            }
        }

        let report = match &resolution.outcome {
            CompletionOutcome::Success { generations } => BackgroundRequest::Completed {
                job_id,
                generations: generations.clone(),
            },
            CompletionOutcome::Failure(error) => BackgroundRequest::Failed {
                job_id,
                error: error.clone(),
            },
        };

        if let Err(e) = self.report(report).await {
            error!(job_id = %job_id, "Could not report result to background: {}", e);
            if let Err(e) = self.finalize_locally(job_id, &resolution.outcome).await {
                error!(job_id = %job_id, "Local finalization failed: {}", e);
            }
        }
    }

    /// 单次通知，失败只记录日志
    async fn notify(&self, request: BackgroundRequest) {
        let kind = request.kind();
        match self.background.request(request).await {
            Ok(BackgroundResponse::Ack) => {}
            Ok(BackgroundResponse::Ignored(reason)) => debug!(kind, "Background ignored: {}", reason),
            Err(e) => warn!(kind, "Background notification failed: {}", e),
        }
    }

    /// 按重试策略上报任务结果
    async fn report(&self, request: BackgroundRequest) -> Result<BackgroundResponse, ChannelError> {
        let mut attempt = 0;
        loop {
            match self.background.request(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if !self.retry.should_retry(attempt) {
                        return Err(e);
                    }
                    attempt += 1;
                    let backoff = self.retry.calculate_backoff(attempt);
                    warn!(
                        kind = request.kind(),
                        attempt,
                        "Result report failed, retrying in {:?}: {}",
                        backoff,
                        e
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// 后台不可达时直接在存储中写入任务结果
    async fn finalize_locally(
        &self,
        job_id: Uuid,
        outcome: &CompletionOutcome,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let record = self
            .store
            .update_job(job_id, |job| {
                if job.is_terminal() {
                    return Ok(None);
                }
                match outcome {
                    CompletionOutcome::Success { generations } => {
                        job.complete(now, generations.clone())?
                    }
                    CompletionOutcome::Failure(error) => job.fail(now, error.reason())?,
                }
                Ok(Some(job.clone()))
            })
            .await?;

        if let Some(record) = record {
            self.store.append_history(record).await?;
        }

        let processed = self
            .store
            .jobs()
            .await
            .iter()
            .filter(|job| job.is_terminal())
            .count() as u32;
        self.store
            .update_queue_state(|state| {
                if state.current_job_id == Some(job_id) {
                    state.current_job_id = None;
                }
                state.processed_count = processed;
            })
            .await?;
        warn!(job_id = %job_id, "Job finalized directly in store");
        Ok(())
    }
}

#[cfg(test)]
#[path = "target_worker_test.rs"]
mod tests;
