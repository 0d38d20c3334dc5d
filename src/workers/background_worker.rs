// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::messaging::messages::{BackgroundInbox, BackgroundRequest, BackgroundResponse};
use crate::messaging::target_link::TargetLink;
use crate::monitor::silence_monitor::TrafficSilenceMonitor;
use crate::queue::orchestrator::QueueOrchestrator;

/// 后台上下文工作器
///
/// 把页面上下文的上报转交给编排器，并管理流量静默监控
pub struct BackgroundWorker {
    orchestrator: Arc<QueueOrchestrator>,
    monitor: Arc<TrafficSilenceMonitor>,
    target: Arc<dyn TargetLink>,
}

impl BackgroundWorker {
    pub fn new(
        orchestrator: Arc<QueueOrchestrator>,
        monitor: Arc<TrafficSilenceMonitor>,
        target: Arc<dyn TargetLink>,
    ) -> Self {
        Self {
            orchestrator,
            monitor,
            target,
        }
    }

    /// 运行工作器
    pub async fn run(self, mut inbox: BackgroundInbox) {
        info!("Background worker started");
        while let Some(envelope) = inbox.recv().await {
            let (request, responder) = envelope.into_parts();
            let kind = request.kind();
            let response = self.handle(request).await;
            if let BackgroundResponse::Ignored(reason) = &response {
                debug!(kind, "Background request ignored: {}", reason);
            }
            responder.respond(response);
        }
        info!("Background worker stopped");
    }

    /// 启动后台运行
    pub fn start(self, inbox: BackgroundInbox) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(inbox).await;
        })
    }

    /// 处理一条上报
    pub async fn handle(&self, request: BackgroundRequest) -> BackgroundResponse {
        let result = match request {
            BackgroundRequest::Progress { job_id, percent } => {
                match self.orchestrator.on_progress(job_id, percent).await {
                    Ok(true) => Ok(()),
                    Ok(false) => return BackgroundResponse::Ignored("stale progress".to_string()),
                    Err(e) => Err(e),
                }
            }
            BackgroundRequest::Completed {
                job_id,
                generations,
            } => self.orchestrator.on_job_completed(job_id, generations).await,
            BackgroundRequest::Failed { job_id, error } => {
                self.orchestrator.on_job_failed(job_id, &error).await
            }
            BackgroundRequest::StartMonitoring { target_id, job_id } => {
                self.start_monitoring(&target_id, job_id);
                Ok(())
            }
            BackgroundRequest::StopMonitoring { target_id } => {
                self.monitor.stop_monitoring(&target_id);
                Ok(())
            }
        };

        match result {
            Ok(()) => BackgroundResponse::Ack,
            Err(e) => {
                error!("Failed to apply background request: {}", e);
                BackgroundResponse::Ignored(e.to_string())
            }
        }
    }

    fn start_monitoring(&self, target_id: &str, job_id: Uuid) {
        let target = self.target.clone();
        let orchestrator = self.orchestrator.clone();
        self.monitor.start_monitoring(target_id, move || async move {
            match target.signal_generation_complete(job_id).await {
                Ok(true) => debug!(job_id = %job_id, "Silence signal forwarded to target"),
                Ok(false) => {
                    info!(job_id = %job_id, "Target has no active job, completing from background");
                    if let Err(e) = orchestrator.on_job_completed(job_id, Vec::new()).await {
                        error!(job_id = %job_id, "Failed to complete job: {}", e);
                    }
                }
                Err(e) => {
                    warn!(job_id = %job_id, "Target unreachable for silence signal: {}", e);
                    if let Err(e) = orchestrator.on_job_completed(job_id, Vec::new()).await {
                        error!(job_id = %job_id, "Failed to complete job: {}", e);
                    }
                }
            }
        });
    }
}
