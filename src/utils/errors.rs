// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::insert::InsertError;
use crate::domain::models::job::DomainError;
use crate::domain::repositories::state_repository::StorageError;

/// 持久化存储错误类型
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("存储错误: {0}")]
    Storage(#[from] StorageError),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("未找到任务: {0}")]
    NotFound(Uuid),

    #[error("插入失败: {0}")]
    Insert(#[from] InsertError),

    #[error("领域错误: {0}")]
    Domain(#[from] DomainError),
}

/// 消息通道错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("对端已关闭")]
    Closed,

    #[error("对端未回复即丢弃了请求")]
    NoReply,

    #[error("等待回复超时")]
    Timeout,
}

/// 任务投递错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("目标页面不可达: {0}")]
    Unreachable(#[from] ChannelError),

    #[error("目标页面正在执行任务 {0}")]
    Busy(Uuid),

    #[error("目标页面返回了意外的回复: {0}")]
    Unexpected(String),
}

/// 队列编排错误类型
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),

    #[error("投递失败: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("领域错误: {0}")]
    Domain(#[from] DomainError),
}

impl QueueError {
    /// 是否为任务不存在
    pub fn is_not_found(&self) -> bool {
        matches!(self, QueueError::Store(StoreError::NotFound(_)))
    }
}

/// 完成检测错误类型
///
/// 每个变体都对应写入任务记录的原因字符串，见 [`DetectionError::reason`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectionError {
    /// 提交失败：目标不可达、找不到输入框或提交按钮
    #[error("submission failed: {0}")]
    Submission(String),

    /// 启动确认窗口内未观察到生成开始
    #[error("did-not-start")]
    StartupTimeout,

    /// 目标应用报告错误，包括限流
    #[error("target failure: {message}")]
    TargetFailure { message: String, rate_limited: bool },

    /// 超过硬性超时
    #[error("timeout")]
    CompletionTimeout,

    /// 轮询期间的临时网络错误，不影响任务状态
    #[error("transient: {0}")]
    RecoverableTransient(String),
}

impl DetectionError {
    /// 写入任务记录的失败原因
    pub fn reason(&self) -> String {
        match self {
            DetectionError::Submission(message) => format!("submission-failed: {}", message),
            DetectionError::StartupTimeout => "did-not-start".to_string(),
            DetectionError::TargetFailure {
                message,
                rate_limited: true,
            } => format!("rate-limited: {}", message),
            DetectionError::TargetFailure { message, .. } => format!("target-failure: {}", message),
            DetectionError::CompletionTimeout => "timeout".to_string(),
            DetectionError::RecoverableTransient(message) => format!("transient: {}", message),
        }
    }

    /// 是否需要停止整个队列
    pub fn stops_queue(&self) -> bool {
        matches!(
            self,
            DetectionError::TargetFailure {
                rate_limited: true,
                ..
            }
        )
    }

    /// 是否为可静默忽略的临时错误
    pub fn is_transient(&self) -> bool {
        matches!(self, DetectionError::RecoverableTransient(_))
    }

    /// 指标标签
    pub fn label(&self) -> &'static str {
        match self {
            DetectionError::Submission(_) => "submission",
            DetectionError::StartupTimeout => "did_not_start",
            DetectionError::TargetFailure {
                rate_limited: true,
                ..
            } => "rate_limited",
            DetectionError::TargetFailure { .. } => "target_failure",
            DetectionError::CompletionTimeout => "timeout",
            DetectionError::RecoverableTransient(_) => "transient",
        }
    }
}
