// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::active_task::GenerationRef;

/// 生成任务实体
///
/// 表示队列中的一条生成请求。任务由外部提交后以 `Pending` 状态进入队列，
/// 被派发时变为 `Processing`，由完成路径最终变为 `Completed` 或 `Failed`。
/// 进入终态后除清理附件等大体积临时数据外不再修改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// 任务唯一标识符
    pub id: Uuid,
    /// 提交给目标应用的提示文本
    pub text: String,
    /// 任务状态
    pub status: JobStatus,
    /// 生成的媒体类型
    pub media_kind: MediaKind,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 开始处理时间
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// 完成时间，仅在进入终态时设置
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// 处理耗时（毫秒），仅在进入终态时设置
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    /// 进度百分比 (0-100)，处理中单调不减
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<f64>,
    /// 优先级
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<JobPriority>,
    /// 批次标签
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_label: Option<String>,
    /// 失败原因
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// 画面比例，例如 "16:9"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    /// 变体数量
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variations: Option<u8>,
    /// 风格预设
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    /// 文本是否已被增强
    #[serde(default)]
    pub enhanced: bool,
    /// 插入队列的时间
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inserted_at: Option<DateTime<Utc>>,
    /// 插入位置所参照的任务
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inserted_after: Option<Uuid>,
    /// 参考图片等附件，完成后清理
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    /// 目标应用返回的生成结果引用
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub generations: Vec<GenerationRef>,
}

/// 任务附件
///
/// 体积可能很大（data URL），任务进入终态时会被清除
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Attachment {
    pub name: Option<String>,
    pub mime_type: Option<String>,
    pub data: Option<String>,
    pub url: Option<String>,
}

/// 任务状态枚举
///
/// 状态转换遵循以下流程：
/// Pending → Processing → Completed/Failed
///
/// Processing → Pending 仅用于派发失败、孤儿回收和启动恢复。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// 等待派发
    #[default]
    Pending,
    /// 正在目标页面中执行
    Processing,
    /// 已成功完成
    Completed,
    /// 已失败
    Failed,
}

impl JobStatus {
    /// 是否为终态
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(()),
        }
    }
}

/// 媒体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    #[default]
    Video,
    Image,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MediaKind::Video => write!(f, "video"),
            MediaKind::Image => write!(f, "image"),
        }
    }
}

/// 任务优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    High,
    Normal,
    Low,
}

/// 领域错误类型
///
/// 表示在领域层可能发生的各种错误情况
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 无效的状态转换，当任务状态转换不符合业务规则时发生
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: JobStatus, to: JobStatus },

    /// 验证错误，当输入数据不符合领域规则时发生
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl JobRecord {
    /// 创建一个新的待处理任务
    ///
    /// # 参数
    ///
    /// * `text` - 提示文本
    /// * `media_kind` - 媒体类型
    pub fn new(text: impl Into<String>, media_kind: MediaKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            status: JobStatus::Pending,
            media_kind,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            duration_ms: None,
            progress_percent: None,
            priority: None,
            batch_label: None,
            failure_reason: None,
            aspect_ratio: None,
            variations: None,
            preset: None,
            enhanced: false,
            inserted_at: None,
            inserted_after: None,
            attachment: None,
            generations: Vec::new(),
        }
    }

    /// 开始处理任务
    ///
    /// 将任务状态从 Pending 变更为 Processing
    ///
    /// # 返回值
    ///
    /// * `Ok(())` - 状态转换成功
    /// * `Err(DomainError)` - 当前状态不允许开始
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(JobStatus::Pending, JobStatus::Processing)?;
        self.started_at = Some(now);
        self.completed_at = None;
        self.duration_ms = None;
        self.progress_percent = None;
        self.failure_reason = None;
        Ok(())
    }

    /// 完成任务
    ///
    /// 将任务状态从 Processing 变更为 Completed，记录耗时与生成结果
    pub fn complete(
        &mut self,
        now: DateTime<Utc>,
        generations: Vec<GenerationRef>,
    ) -> Result<(), DomainError> {
        self.transition(JobStatus::Processing, JobStatus::Completed)?;
        self.finish(now);
        self.progress_percent = Some(100.0);
        self.generations = generations;
        Ok(())
    }

    /// 标记任务失败
    ///
    /// 将任务状态从 Processing 变更为 Failed，并记录失败原因
    pub fn fail(&mut self, now: DateTime<Utc>, reason: impl Into<String>) -> Result<(), DomainError> {
        self.transition(JobStatus::Processing, JobStatus::Failed)?;
        self.finish(now);
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    /// 将处理中的任务退回待处理状态
    pub fn revert_to_pending(&mut self) -> Result<(), DomainError> {
        self.transition(JobStatus::Processing, JobStatus::Pending)?;
        self.started_at = None;
        self.progress_percent = None;
        Ok(())
    }

    /// 应用进度更新
    ///
    /// 仅在处理中生效，回退的进度会被丢弃
    ///
    /// # 返回值
    ///
    /// 进度被采纳时返回 true
    pub fn apply_progress(&mut self, percent: f64) -> bool {
        if self.status != JobStatus::Processing || !percent.is_finite() {
            return false;
        }

        let percent = percent.clamp(0.0, 100.0);
        match self.progress_percent {
            Some(current) if percent <= current => false,
            _ => {
                self.progress_percent = Some(percent);
                true
            }
        }
    }

    /// 是否处于终态
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// 清除附件等临时大数据
    pub fn clear_transient_payload(&mut self) {
        self.attachment = None;
    }

    fn transition(&mut self, from: JobStatus, to: JobStatus) -> Result<(), DomainError> {
        if self.status != from {
            return Err(DomainError::InvalidStateTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    fn finish(&mut self, now: DateTime<Utc>) {
        self.completed_at = Some(now);
        self.duration_ms = self
            .started_at
            .map(|started| (now - started).num_milliseconds().max(0));
        self.clear_transient_payload();
    }
}

#[cfg(test)]
#[path = "job_test.rs"]
mod tests;
