// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::models::insert::{InsertOptions, InsertPosition};
use crate::domain::models::job::{Attachment, DomainError, JobPriority, JobRecord, MediaKind};

/// 单个任务的输入
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct JobInputDto {
    /// 提示文本
    #[validate(length(min = 1, max = 10000))]
    pub text: String,
    /// 媒体类型，默认视频
    #[serde(default)]
    pub media_kind: MediaKind,
    pub aspect_ratio: Option<String>,
    /// 每个提示生成的数量
    #[validate(range(min = 1, max = 4))]
    pub variations: Option<u8>,
    pub preset: Option<String>,
    #[serde(default)]
    pub enhanced: bool,
    pub priority: Option<JobPriority>,
    /// 参考图片
    pub attachment: Option<Attachment>,
}

impl JobInputDto {
    pub fn into_record(self) -> JobRecord {
        let mut job = JobRecord::new(self.text.trim(), self.media_kind);
        job.aspect_ratio = self.aspect_ratio;
        job.variations = self.variations;
        job.preset = self.preset;
        job.enhanced = self.enhanced;
        job.priority = self.priority;
        job.attachment = self.attachment;
        job
    }
}

/// 插入位置类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PositionKind {
    #[default]
    End,
    Start,
    After,
    Before,
    Index,
}

/// 入队请求数据传输对象
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct EnqueueRequestDto {
    /// 新任务
    #[validate(length(min = 1, max = 500), nested)]
    pub jobs: Vec<JobInputDto>,
    /// 插入位置，默认队尾
    #[serde(default)]
    pub position: PositionKind,
    /// `after`/`before` 的参照任务
    pub reference_id: Option<Uuid>,
    /// `index` 的目标下标
    pub index: Option<usize>,
    /// 批次标签
    #[validate(length(max = 100))]
    pub batch_label: Option<String>,
}

impl EnqueueRequestDto {
    /// 转换为插入选项
    ///
    /// # 返回值
    ///
    /// * `Ok(InsertOptions)` - 位置参数完整
    /// * `Err(DomainError)` - 缺少参照任务或下标
    pub fn insert_options(&self) -> Result<InsertOptions, DomainError> {
        let missing = |field: &str| {
            DomainError::ValidationError(format!("{} is required for this position", field))
        };

        let position = match self.position {
            PositionKind::End => InsertPosition::End,
            PositionKind::Start => InsertPosition::Start,
            PositionKind::After => InsertPosition::After {
                reference_id: self.reference_id.ok_or_else(|| missing("reference_id"))?,
            },
            PositionKind::Before => InsertPosition::Before {
                reference_id: self.reference_id.ok_or_else(|| missing("reference_id"))?,
            },
            PositionKind::Index => InsertPosition::Index {
                index: self.index.ok_or_else(|| missing("index"))?,
            },
        };

        let options = InsertOptions::at(position);
        Ok(match &self.batch_label {
            Some(label) if !label.trim().is_empty() => options.with_batch_label(label.trim()),
            _ => options,
        })
    }
}

/// 入队响应
#[derive(Debug, Deserialize, Serialize)]
pub struct EnqueueResponseDto {
    pub job_ids: Vec<Uuid>,
}

/// 批量设置批次标签
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct BatchLabelRequestDto {
    #[validate(length(min = 1))]
    pub job_ids: Vec<Uuid>,
    /// 为空时清除标签
    #[validate(length(max = 100))]
    pub batch_label: Option<String>,
}

/// 批量设置优先级
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct PriorityRequestDto {
    #[validate(length(min = 1))]
    pub job_ids: Vec<Uuid>,
    pub priority: Option<JobPriority>,
}

/// 修改任务文本
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct EditJobRequestDto {
    #[validate(length(min = 1, max = 10000))]
    pub text: String,
}

/// 批量更新的响应
#[derive(Debug, Deserialize, Serialize)]
pub struct UpdatedCountDto {
    pub updated: usize,
}
