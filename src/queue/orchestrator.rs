// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::Utc;
use metrics::{counter, histogram};
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::models::active_task::GenerationRef;
use crate::domain::models::insert::InsertOptions;
use crate::domain::models::job::{DomainError, JobRecord, JobStatus};
use crate::domain::models::queue_state::{AlertKind, QueueAlert, QueueState, QueueStatus};
use crate::domain::services::completion_notifier::CompletionNotifier;
use crate::infrastructure::durable_store::DurableStore;
use crate::infrastructure::metrics::{
    JOBS_COMPLETED, JOBS_DISPATCHED, JOBS_FAILED, JOB_DURATION, QUEUE_RATE_LIMITED,
};
use crate::messaging::target_link::TargetLink;
use crate::utils::errors::{DeliveryError, DetectionError, QueueError, StoreError};

/// 编排器发出的通知
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    Progress { job_id: Uuid, percent: f64 },
    Completed { job_id: Uuid },
    Failed { job_id: Uuid, reason: String },
    QueueStateChanged { state: QueueState },
    Alert { alert: QueueAlert },
}

impl QueueEvent {
    /// 事件名，用作 SSE 的 event 字段
    pub fn name(&self) -> &'static str {
        match self {
            QueueEvent::Progress { .. } => "progress",
            QueueEvent::Completed { .. } => "completed",
            QueueEvent::Failed { .. } => "failed",
            QueueEvent::QueueStateChanged { .. } => "queue_state_changed",
            QueueEvent::Alert { .. } => "alert",
        }
    }
}

/// 一次派发的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 队列未运行或已暂停
    Idle,
    /// 已有任务在执行
    Busy(Uuid),
    /// 没有待处理任务，队列已停止
    Drained,
    /// 已投递任务
    Dispatched(Uuid),
}

enum JobOutcome {
    Completed(Vec<GenerationRef>),
    Failed(DetectionError),
}

enum Finalized {
    Done(JobRecord),
    AlreadyTerminal,
    Missing,
}

/// 队列编排器
///
/// 队列状态机的唯一修改入口。派发由内部闸门串行化，保证任何时刻最多一个任务处于处理中；
/// 完成通知是幂等的，只对当前任务生效。
pub struct QueueOrchestrator {
    store: Arc<DurableStore>,
    target: Arc<dyn TargetLink>,
    notifier: Option<Arc<dyn CompletionNotifier>>,
    events: broadcast::Sender<QueueEvent>,
    dispatch_gate: Mutex<()>,
    scheduled: parking_lot::Mutex<Option<CancellationToken>>,
    this: Weak<Self>,
}

impl QueueOrchestrator {
    /// 创建编排器
    ///
    /// # 参数
    ///
    /// * `store` - 持久化存储
    /// * `target` - 页面上下文链接
    /// * `notifier` - 可选的完成通知
    pub fn new(
        store: Arc<DurableStore>,
        target: Arc<dyn TargetLink>,
        notifier: Option<Arc<dyn CompletionNotifier>>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new_cyclic(|this| Self {
            store,
            target,
            notifier,
            events,
            dispatch_gate: Mutex::new(()),
            scheduled: parking_lot::Mutex::new(None),
            this: this.clone(),
        })
    }

    pub fn events(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    pub fn store(&self) -> &Arc<DurableStore> {
        &self.store
    }

    pub async fn status(&self) -> QueueStatus {
        self.store.queue_state().await.status()
    }

    pub async fn snapshot(&self) -> (QueueState, Vec<JobRecord>) {
        (self.store.queue_state().await, self.store.jobs().await)
    }

    fn emit(&self, event: QueueEvent) {
        // 没有订阅者时忽略
        let _ = self.events.send(event);
    }

    fn emit_state(&self, state: QueueState) {
        self.emit(QueueEvent::QueueStateChanged { state });
    }

    // ---- 命令 ----

    /// 启动队列，已在运行时什么也不做
    pub async fn start(&self) -> Result<(), QueueError> {
        if self.store.queue_state().await.is_running {
            debug!("Queue already running");
            return Ok(());
        }
        self.begin(None).await
    }

    /// 只运行选中的任务；队列已在运行时替换当前的选择范围
    pub async fn submit_selected(&self, job_ids: Vec<Uuid>) -> Result<(), QueueError> {
        let jobs = self.store.jobs().await;
        let selection: Vec<Uuid> = job_ids
            .into_iter()
            .filter(|id| {
                jobs.iter()
                    .any(|job| job.id == *id && job.status == JobStatus::Pending)
            })
            .collect();
        if selection.is_empty() {
            return Err(DomainError::ValidationError("no pending jobs selected".to_string()).into());
        }

        if !self.store.queue_state().await.is_running {
            return self.begin(Some(selection)).await;
        }

        let finished = count_finished(&jobs);
        let state = self
            .store
            .update_queue_state(|state| {
                state.total_count = finished + selection.len() as u32;
                state.selection = Some(selection);
                state.clone()
            })
            .await?;
        info!(selected = state.total_count - finished, "Queue selection replaced");
        self.emit_state(state.clone());

        if state.current_job_id.is_none() && !state.is_paused {
            self.dispatch_next().await?;
        }
        Ok(())
    }

    async fn begin(&self, selection: Option<Vec<Uuid>>) -> Result<(), QueueError> {
        {
            let _gate = self.dispatch_gate.lock().await;
            let current = self.store.queue_state().await.current_job_id;
            let page_active = match self.target.active_job().await {
                Ok(active) => active,
                Err(e) => {
                    warn!("Could not query target for active job: {}", e);
                    None
                }
            };

            // 页面仍在执行的任务重新接管，其余处理中的任务收回
            let (reattached, reclaimed) = self
                .store
                .update_jobs(|jobs| {
                    let mut reattached = None;
                    let mut reclaimed = 0;
                    for job in jobs
                        .iter_mut()
                        .filter(|job| job.status == JobStatus::Processing && Some(job.id) != current)
                    {
                        if current.is_none() && page_active == Some(job.id) {
                            reattached = Some(job.id);
                            continue;
                        }
                        job.revert_to_pending()?;
                        reclaimed += 1;
                    }
                    Ok((reattached, reclaimed))
                })
                .await?;
            if reclaimed > 0 {
                warn!(reclaimed, "Reclaimed orphaned processing jobs");
            }
            if let Some(job_id) = reattached {
                info!(job_id = %job_id, "Reattached job still running on target");
            }

            let jobs = self.store.jobs().await;
            let finished = count_finished(&jobs);
            let now = Utc::now();
            let state = self
                .store
                .update_queue_state(|state| {
                    let pending = jobs
                        .iter()
                        .filter(|job| {
                            job.status == JobStatus::Pending
                                && selection.as_ref().map_or(true, |s| s.contains(&job.id))
                        })
                        .count() as u32;
                    state.is_running = true;
                    state.is_paused = false;
                    state.queue_started_at = Some(now);
                    state.alert = None;
                    state.selection = selection;
                    state.processed_count = finished;
                    state.total_count = finished + pending;
                    if let Some(job_id) = reattached {
                        state.current_job_id = Some(job_id);
                        state.total_count += 1;
                    }
                    state.blocked_by = None;
                    state.clone()
                })
                .await?;

            info!(
                total = state.total_count,
                processed = state.processed_count,
                "Queue started"
            );
            self.emit_state(state);
        }

        self.dispatch_next().await.map(|_| ())
    }

    /// 暂停；不影响正在执行的任务
    pub async fn pause(&self) -> Result<(), QueueError> {
        let state = self
            .store
            .update_queue_state(|state| {
                if state.is_running {
                    state.is_paused = true;
                }
                state.clone()
            })
            .await?;
        if state.is_paused {
            info!("Queue paused");
            self.emit_state(state);
        }
        Ok(())
    }

    /// 恢复；当前没有任务在执行时立即派发
    pub async fn resume(&self) -> Result<(), QueueError> {
        let (resumed, state) = self
            .store
            .update_queue_state(|state| {
                let resumed = state.is_running && state.is_paused;
                state.is_paused = false;
                (resumed, state.clone())
            })
            .await?;
        if !resumed {
            return Ok(());
        }

        info!("Queue resumed");
        self.emit_state(state.clone());
        if state.current_job_id.is_none() {
            self.dispatch_next().await?;
        }
        Ok(())
    }

    /// 停止；正在执行的任务不会被取消，但其完成通知将被忽略，
    /// 重新启动时若页面仍在执行该任务则重新接管
    pub async fn stop(&self) -> Result<(), QueueError> {
        let _gate = self.dispatch_gate.lock().await;
        self.halt(None).await?;
        info!("Queue stopped");
        Ok(())
    }

    async fn halt(&self, alert: Option<QueueAlert>) -> Result<(), StoreError> {
        if let Some(token) = self.scheduled.lock().take() {
            token.cancel();
        }

        let state = self
            .store
            .update_queue_state(|state| {
                state.reset_to_stopped();
                if let Some(alert) = &alert {
                    state.alert = Some(alert.clone());
                }
                state.clone()
            })
            .await?;
        self.emit_state(state);
        if let Some(alert) = alert {
            self.emit(QueueEvent::Alert { alert });
        }
        Ok(())
    }

    /// 新任务入队
    ///
    /// # 返回值
    ///
    /// 新任务的 ID，按插入顺序
    pub async fn enqueue(
        &self,
        jobs: Vec<JobRecord>,
        options: InsertOptions,
    ) -> Result<Vec<Uuid>, QueueError> {
        let ids = self.store.insert_jobs(jobs, &options).await?;
        if ids.is_empty() {
            return Ok(ids);
        }

        let state = self.store.queue_state().await;
        if state.is_running {
            if state.selection.is_none() {
                let added = ids.len() as u32;
                let state = self
                    .store
                    .update_queue_state(|state| {
                        state.total_count += added;
                        state.clone()
                    })
                    .await?;
                self.emit_state(state);
            }
        } else if self.store.stored_config().await.auto_start_on_enqueue {
            info!(count = ids.len(), "Auto-starting queue after enqueue");
            self.start().await?;
        }
        Ok(ids)
    }

    /// 派发下一个待处理任务
    pub async fn dispatch_next(&self) -> Result<DispatchOutcome, QueueError> {
        let _gate = self.dispatch_gate.lock().await;

        let state = self.store.queue_state().await;
        if !state.is_running || state.is_paused {
            return Ok(DispatchOutcome::Idle);
        }
        if let Some(current) = state.current_job_id {
            return Ok(DispatchOutcome::Busy(current));
        }

        let now = Utc::now();
        let picked = self
            .store
            .update_jobs(|jobs| {
                let Some(job) = jobs
                    .iter_mut()
                    .find(|job| job.status == JobStatus::Pending && state.admits(job.id))
                else {
                    return Ok(None);
                };
                job.start(now)?;
                Ok(Some(job.clone()))
            })
            .await?;

        let Some(job) = picked else {
            info!("No pending jobs left, stopping queue");
            self.halt(None).await?;
            return Ok(DispatchOutcome::Drained);
        };

        let state = self
            .store
            .update_queue_state(|state| {
                state.current_job_id = Some(job.id);
                state.clone()
            })
            .await?;
        self.emit_state(state);
        counter!(JOBS_DISPATCHED).increment(1);

        match self.target.deliver(&job).await {
            Ok(()) => {
                info!(job_id = %job.id, "Job dispatched");
                Ok(DispatchOutcome::Dispatched(job.id))
            }
            Err(DeliveryError::Busy(busy)) => {
                warn!(job_id = %job.id, busy = %busy, "Target busy, job returned to pending");
                self.store
                    .update_job(job.id, |job| Ok(job.revert_to_pending()?))
                    .await?;
                // 页面空闲后由忙碌任务的结果触发下一次派发
                let tracked = self
                    .store
                    .job(busy)
                    .await
                    .is_some_and(|job| job.status == JobStatus::Processing);
                let state = self
                    .store
                    .update_queue_state(|state| {
                        if tracked {
                            state.current_job_id = Some(busy);
                        } else {
                            state.current_job_id = None;
                            state.blocked_by = Some(busy);
                        }
                        state.clone()
                    })
                    .await?;
                self.emit_state(state);
                Ok(DispatchOutcome::Busy(busy))
            }
            Err(e) => {
                error!(job_id = %job.id, "Failed to deliver job: {}", e);
                self.store
                    .update_job(job.id, |job| Ok(job.revert_to_pending()?))
                    .await?;
                self.halt(Some(QueueAlert::new(AlertKind::TargetUnreachable, e.to_string())))
                    .await?;
                Err(QueueError::Delivery(e))
            }
        }
    }

    // ---- 来自页面上下文的通知 ----

    /// 进度更新，仅对当前任务生效且单调递增
    pub async fn on_progress(&self, job_id: Uuid, percent: f64) -> Result<bool, QueueError> {
        if self.store.queue_state().await.current_job_id != Some(job_id) {
            debug!(job_id = %job_id, "Progress for non-current job ignored");
            return Ok(false);
        }

        let applied = match self
            .store
            .update_job(job_id, |job| Ok(job.apply_progress(percent)))
            .await
        {
            Ok(applied) => applied,
            Err(StoreError::NotFound(_)) => false,
            Err(e) => return Err(e.into()),
        };

        if applied {
            self.emit(QueueEvent::Progress { job_id, percent });
        } else {
            debug!(job_id = %job_id, percent, "Progress regression discarded");
        }
        Ok(applied)
    }

    /// 任务成功，可重复调用
    pub async fn on_job_completed(
        &self,
        job_id: Uuid,
        generations: Vec<GenerationRef>,
    ) -> Result<(), QueueError> {
        self.finalize(job_id, JobOutcome::Completed(generations)).await
    }

    /// 任务失败，可重复调用
    pub async fn on_job_failed(&self, job_id: Uuid, error: &DetectionError) -> Result<(), QueueError> {
        self.finalize(job_id, JobOutcome::Failed(error.clone())).await
    }

    async fn finalize(&self, job_id: Uuid, outcome: JobOutcome) -> Result<(), QueueError> {
        let state = self.store.queue_state().await;
        if state.blocked_by == Some(job_id) {
            return self.release_target(job_id).await;
        }
        if state.current_job_id != Some(job_id) {
            info!(job_id = %job_id, "Completion for non-current job ignored");
            return Ok(());
        }

        let now = Utc::now();
        let finalized = match self
            .store
            .update_job(job_id, |job| {
                if job.is_terminal() {
                    return Ok(Finalized::AlreadyTerminal);
                }
                match &outcome {
                    JobOutcome::Completed(generations) => job.complete(now, generations.clone())?,
                    JobOutcome::Failed(error) => job.fail(now, error.reason())?,
                }
                Ok(Finalized::Done(job.clone()))
            })
            .await
        {
            Ok(finalized) => finalized,
            Err(StoreError::NotFound(_)) => Finalized::Missing,
            Err(e) => return Err(e.into()),
        };

        match finalized {
            Finalized::Done(record) => {
                let label = match &outcome {
                    JobOutcome::Failed(error) => error.label(),
                    JobOutcome::Completed(_) => "completed",
                };
                self.record_outcome(record, label).await?
            }
            Finalized::AlreadyTerminal => debug!(job_id = %job_id, "Job already terminal"),
            Finalized::Missing => warn!(job_id = %job_id, "Job deleted while in flight"),
        }

        let alert = match &outcome {
            JobOutcome::Failed(error) if error.stops_queue() => {
                Some(QueueAlert::new(AlertKind::RateLimited, error.reason()))
            }
            _ => None,
        };
        self.advance(job_id, alert).await
    }

    /// 占用页面的任务已结束，结果本身不落盘，只恢复派发
    async fn release_target(&self, job_id: Uuid) -> Result<(), QueueError> {
        let state = self
            .store
            .update_queue_state(|state| {
                if state.blocked_by == Some(job_id) {
                    state.blocked_by = None;
                }
                state.clone()
            })
            .await?;
        info!(job_id = %job_id, "Target released by non-current job");
        self.emit_state(state.clone());

        if state.is_running && !state.is_paused && state.current_job_id.is_none() {
            self.schedule_dispatch().await;
        }
        Ok(())
    }

    async fn record_outcome(&self, record: JobRecord, label: &'static str) -> Result<(), QueueError> {
        self.store.append_history(record.clone()).await?;

        if let Some(ms) = record.duration_ms {
            histogram!(JOB_DURATION).record(ms as f64 / 1000.0);
        }
        match record.status {
            JobStatus::Completed => {
                counter!(JOBS_COMPLETED).increment(1);
                info!(job_id = %record.id, duration_ms = ?record.duration_ms, "Job completed");
                self.emit(QueueEvent::Completed { job_id: record.id });
            }
            _ => {
                let reason = record.failure_reason.clone().unwrap_or_default();
                counter!(JOBS_FAILED, "reason" => label).increment(1);
                warn!(job_id = %record.id, reason = %reason, "Job failed");
                self.emit(QueueEvent::Failed {
                    job_id: record.id,
                    reason,
                });
            }
        }

        if let Some(notifier) = &self.notifier {
            let notifier = notifier.clone();
            tokio::spawn(async move {
                if let Err(e) = notifier.notify(&record).await {
                    warn!("{} notification failed: {}", notifier.name(), e);
                }
            });
        }
        Ok(())
    }

    /// 清除当前任务并决定下一步
    async fn advance(&self, job_id: Uuid, alert: Option<QueueAlert>) -> Result<(), QueueError> {
        let jobs = self.store.jobs().await;
        let processed = count_finished(&jobs);
        let state = self
            .store
            .update_queue_state(|state| {
                if state.current_job_id == Some(job_id) {
                    state.current_job_id = None;
                }
                state.processed_count = processed;
                state.clone()
            })
            .await?;

        if let Some(alert) = alert {
            counter!(QUEUE_RATE_LIMITED).increment(1);
            warn!(message = %alert.message, "Target rate limit reached, stopping queue");
            self.halt(Some(alert)).await?;
            return Ok(());
        }

        self.emit_state(state.clone());
        if !state.is_running {
            return Ok(());
        }

        let has_pending = jobs
            .iter()
            .any(|job| job.status == JobStatus::Pending && state.admits(job.id));
        if !has_pending {
            info!(processed = state.processed_count, "Queue drained");
            self.halt(None).await?;
            return Ok(());
        }
        if state.is_paused {
            info!("Queue paused, waiting for resume before next dispatch");
            return Ok(());
        }

        self.schedule_dispatch().await;
        Ok(())
    }

    async fn schedule_dispatch(&self) {
        let Some(this) = self.this.upgrade() else {
            return;
        };

        let (min, max) = self.store.stored_config().await.delay_bounds();
        let delay = if max > min {
            rand::random_range(min..=max)
        } else {
            min
        };

        let token = CancellationToken::new();
        if let Some(previous) = self.scheduled.lock().replace(token.clone()) {
            previous.cancel();
        }

        debug!(delay_ms = delay, "Next dispatch scheduled");
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Scheduled dispatch cancelled");
                    return;
                }
                _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
            }
            if let Err(e) = this.dispatch_next().await {
                error!("Scheduled dispatch failed: {}", e);
            }
        });
    }
}

fn count_finished(jobs: &[JobRecord]) -> u32 {
    jobs.iter().filter(|job| job.is_terminal()).count() as u32
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod tests;
