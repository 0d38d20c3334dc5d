// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::detector::response_parser::{
    parse_creation, parse_polling, CreationResult, EndpointPatterns,
};
use crate::detector::traits::{
    CompletionOutcome, CompletionSource, DetectorEvent, SignalSource, WatchContext,
};
use crate::domain::models::active_task::{ActiveTaskState, TargetTaskStatus};
use crate::target::driver::NetworkEvent;
use crate::utils::errors::DetectionError;

/// 接口观察者
///
/// 从任务创建响应取得任务 ID，再跟踪轮询响应中该任务的状态与进度
pub struct ApiWatcher {
    network: broadcast::Receiver<NetworkEvent>,
    patterns: EndpointPatterns,
    min_progress_delta: f64,
    task: Option<ActiveTaskState>,
    last_reported: f64,
}

impl ApiWatcher {
    pub fn new(
        network: broadcast::Receiver<NetworkEvent>,
        patterns: EndpointPatterns,
        min_progress_delta: f64,
    ) -> Self {
        Self {
            network,
            patterns,
            min_progress_delta,
            task: None,
            last_reported: 0.0,
        }
    }

    /// 处理一个网络事件，提交结论后返回 true
    fn handle(&mut self, event: NetworkEvent, ctx: &WatchContext) -> bool {
        match event {
            NetworkEvent::Response { url, status, body } => {
                if self.patterns.is_creation(&url) {
                    self.on_creation(status, body.as_deref(), ctx)
                } else if self.patterns.is_polling(&url) {
                    if !(200..300).contains(&status) {
                        let transient =
                            DetectionError::RecoverableTransient(format!("polling HTTP {}", status));
                        debug!("{}", transient);
                        return false;
                    }
                    match body {
                        Some(body) => self.on_polling(&body, ctx),
                        None => false,
                    }
                } else {
                    false
                }
            }
            NetworkEvent::Failed { url, error } => {
                if self.patterns.is_creation(&url) {
                    ctx.offer(
                        SignalSource::Api,
                        CompletionOutcome::Failure(DetectionError::Submission(error)),
                    );
                    true
                } else {
                    if self.patterns.is_polling(&url) {
                        debug!(url = %url, "Polling request failed, will retry: {}", error);
                    }
                    false
                }
            }
        }
    }

    fn on_creation(&mut self, status: u16, body: Option<&str>, ctx: &WatchContext) -> bool {
        match parse_creation(status, body) {
            CreationResult::Created { task_id } => {
                info!(task_id = %task_id, "Target accepted task");
                self.task = Some(ActiveTaskState::new(task_id, Utc::now()));
                self.last_reported = 0.0;
                false
            }
            CreationResult::Rejected(error) => {
                warn!("Target rejected task: {}", error);
                ctx.offer(SignalSource::Api, CompletionOutcome::Failure(error));
                true
            }
            CreationResult::Unrecognized => {
                debug!(status, "Unrecognized creation response, assuming accepted");
                false
            }
        }
    }

    fn on_polling(&mut self, body: &str, ctx: &WatchContext) -> bool {
        let now = Utc::now();

        for snapshot in parse_polling(body) {
            if self.task.is_none() {
                // 尚未拿到创建响应时，跟踪第一个仍在进行的任务
                if snapshot.status.is_terminal() {
                    continue;
                }
                debug!(task_id = %snapshot.task_id, "Adopting task from polling response");
                self.task = Some(ActiveTaskState::new(snapshot.task_id.clone(), now));
            }

            let Some(task) = self.task.as_mut() else {
                continue;
            };
            if snapshot.task_id != task.task_id {
                continue;
            }

            let transition = task.apply_snapshot(&snapshot, now);
            if transition.started {
                ctx.confirm_started(SignalSource::Api);
            }

            if let Some(progress) = transition.progress {
                if progress - self.last_reported >= self.min_progress_delta {
                    self.last_reported = progress;
                    let _ = ctx.events.send(DetectorEvent::Progress { percent: progress });
                }
            }

            match transition.terminal {
                Some(TargetTaskStatus::Succeeded) => {
                    ctx.offer(
                        SignalSource::Api,
                        CompletionOutcome::Success {
                            generations: task.generations.clone(),
                        },
                    );
                    return true;
                }
                Some(_) => {
                    let message = task
                        .failure_reason
                        .clone()
                        .unwrap_or_else(|| "task failed".to_string());
                    ctx.offer(
                        SignalSource::Api,
                        CompletionOutcome::Failure(DetectionError::TargetFailure {
                            message,
                            rate_limited: false,
                        }),
                    );
                    return true;
                }
                None => {}
            }

            // 部分目标先把进度推到 100% 再切换状态
            if task.progress >= 100.0 {
                task.mark_completed();
                ctx.offer(
                    SignalSource::Api,
                    CompletionOutcome::Success {
                        generations: task.generations.clone(),
                    },
                );
                return true;
            }
        }
        false
    }
}

#[async_trait]
impl CompletionSource for ApiWatcher {
    fn source(&self) -> SignalSource {
        SignalSource::Api
    }

    async fn run(&mut self, ctx: WatchContext) {
        loop {
            tokio::select! {
                _ = ctx.cancel.cancelled() => break,
                event = self.network.recv() => match event {
                    Ok(event) => {
                        if self.handle(event, &ctx) {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Api watcher lagged behind network events");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    }
}
