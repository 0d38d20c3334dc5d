// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::job::JobRecord;

/// 通知错误类型
#[derive(Error, Debug)]
pub enum NotifyError {
    /// 请求发送失败
    #[error("Notification request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// 接收方拒绝
    #[error("Notification rejected with status {0}")]
    Rejected(u16),
}

/// 任务完成通知服务
///
/// 任务进入终态后由编排器以“发出即忘”的方式调用，失败只记录日志
#[async_trait]
pub trait CompletionNotifier: Send + Sync {
    /// 发送通知，未配置时应直接返回 Ok
    async fn notify(&self, job: &JobRecord) -> Result<(), NotifyError>;

    /// 通知渠道名称
    fn name(&self) -> &str;
}
