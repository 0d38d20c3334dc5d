// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::models::job::JobRecord;
use crate::messaging::messages::{TargetEndpoint, TargetRequest, TargetResponse};
use crate::utils::errors::DeliveryError;

/// 编排器眼中的页面上下文
#[async_trait]
pub trait TargetLink: Send + Sync {
    /// 投递任务，页面接受后立即返回
    async fn deliver(&self, job: &JobRecord) -> Result<(), DeliveryError>;

    /// 转交外部完成信号
    ///
    /// # 返回值
    ///
    /// * `Ok(true)` - 页面上有对应的活动任务并已收到信号
    /// * `Ok(false)` - 页面上没有该任务
    async fn signal_generation_complete(&self, job_id: Uuid) -> Result<bool, DeliveryError>;

    /// 页面上正在执行的任务
    ///
    /// 无法观察页面状态的链接视页面为空闲
    async fn active_job(&self) -> Result<Option<Uuid>, DeliveryError> {
        Ok(None)
    }
}

/// 基于消息通道的页面链接
pub struct ChannelTargetLink {
    endpoint: TargetEndpoint,
    timeout: Duration,
}

impl ChannelTargetLink {
    pub fn new(endpoint: TargetEndpoint, timeout: Duration) -> Self {
        Self { endpoint, timeout }
    }

    /// 页面上下文是否可达
    pub async fn ping(&self) -> bool {
        matches!(
            self.endpoint
                .request_timeout(TargetRequest::Ping, self.timeout)
                .await,
            Ok(TargetResponse::Pong)
        )
    }
}

#[async_trait]
impl TargetLink for ChannelTargetLink {
    async fn deliver(&self, job: &JobRecord) -> Result<(), DeliveryError> {
        match self
            .endpoint
            .request_timeout(TargetRequest::SubmitJob(job.clone()), self.timeout)
            .await?
        {
            TargetResponse::Accepted => Ok(()),
            TargetResponse::Busy { current } => Err(DeliveryError::Busy(current)),
            other => Err(DeliveryError::Unexpected(format!("{:?}", other))),
        }
    }

    async fn signal_generation_complete(&self, job_id: Uuid) -> Result<bool, DeliveryError> {
        match self
            .endpoint
            .request_timeout(TargetRequest::GenerationComplete { job_id }, self.timeout)
            .await?
        {
            TargetResponse::Signalled => Ok(true),
            TargetResponse::NoActiveJob => Ok(false),
            other => Err(DeliveryError::Unexpected(format!("{:?}", other))),
        }
    }

    async fn active_job(&self) -> Result<Option<Uuid>, DeliveryError> {
        match self
            .endpoint
            .request_timeout(TargetRequest::ActiveJob, self.timeout)
            .await?
        {
            TargetResponse::Active { job_id } => Ok(job_id),
            other => Err(DeliveryError::Unexpected(format!("{:?}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::job::MediaKind;
    use crate::messaging::channel::channel;
    use crate::utils::errors::ChannelError;

    #[tokio::test]
    async fn test_busy_and_closed_are_delivery_failures() {
        let (endpoint, mut inbox) = channel(4);
        let link = ChannelTargetLink::new(endpoint, Duration::from_secs(5));
        let busy_id = Uuid::new_v4();

        let page = tokio::spawn(async move {
            let envelope = inbox.recv().await.unwrap();
            let (_, responder) = envelope.into_parts();
            responder.respond(TargetResponse::Busy { current: busy_id });
        });

        let job = JobRecord::new("x", MediaKind::Video);
        assert_eq!(link.deliver(&job).await, Err(DeliveryError::Busy(busy_id)));
        page.await.unwrap();

        assert_eq!(
            link.deliver(&job).await,
            Err(DeliveryError::Unreachable(ChannelError::Closed))
        );
        assert!(!link.ping().await);
    }

    #[tokio::test]
    async fn test_active_job_reports_page_state() {
        let (endpoint, mut inbox) = channel(4);
        let link = ChannelTargetLink::new(endpoint, Duration::from_secs(5));
        let running = Uuid::new_v4();

        let page = tokio::spawn(async move {
            for job_id in [Some(running), None] {
                let envelope = inbox.recv().await.unwrap();
                let (request, responder) = envelope.into_parts();
                assert!(matches!(request, TargetRequest::ActiveJob));
                responder.respond(TargetResponse::Active { job_id });
            }
        });

        assert_eq!(link.active_job().await, Ok(Some(running)));
        assert_eq!(link.active_job().await, Ok(None));
        page.await.unwrap();
    }
}
