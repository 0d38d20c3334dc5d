// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::job::JobRecord;

/// 插入位置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "position", rename_all = "snake_case")]
pub enum InsertPosition {
    /// 追加到队尾
    #[default]
    End,
    /// 插入到队首
    Start,
    /// 插入到指定任务之后
    After { reference_id: Uuid },
    /// 插入到指定任务之前
    Before { reference_id: Uuid },
    /// 插入到指定下标
    Index { index: usize },
}

/// 插入选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct InsertOptions {
    #[serde(flatten)]
    pub position: InsertPosition,
    /// 为新任务统一设置的批次标签
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_label: Option<String>,
}

/// 插入错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InsertError {
    #[error("Job with ID {0} not found")]
    ReferenceNotFound(Uuid),

    #[error("Invalid index: {index} (valid range: 0-{len})")]
    IndexOutOfRange { index: usize, len: usize },
}

impl InsertOptions {
    pub fn at(position: InsertPosition) -> Self {
        Self {
            position,
            batch_label: None,
        }
    }

    pub fn with_batch_label(mut self, label: impl Into<String>) -> Self {
        self.batch_label = Some(label.into());
        self
    }

    /// 将新任务按选项插入已有列表
    ///
    /// 先定位插入点再修改列表，定位失败时列表保持不变
    ///
    /// # 参数
    ///
    /// * `existing` - 现有任务列表
    /// * `incoming` - 新任务
    /// * `now` - 插入时间
    pub fn apply(
        &self,
        existing: &mut Vec<JobRecord>,
        incoming: Vec<JobRecord>,
        now: DateTime<Utc>,
    ) -> Result<(), InsertError> {
        let find = |id: Uuid| {
            existing
                .iter()
                .position(|job| job.id == id)
                .ok_or(InsertError::ReferenceNotFound(id))
        };

        let at = match self.position {
            InsertPosition::End => existing.len(),
            InsertPosition::Start => 0,
            InsertPosition::After { reference_id } => find(reference_id)? + 1,
            InsertPosition::Before { reference_id } => find(reference_id)?,
            InsertPosition::Index { index } => {
                if index > existing.len() {
                    return Err(InsertError::IndexOutOfRange {
                        index,
                        len: existing.len(),
                    });
                }
                index
            }
        };

        let inserted_after = match self.position {
            InsertPosition::After { reference_id } => Some(reference_id),
            _ => None,
        };

        let enriched = incoming.into_iter().map(|mut job| {
            job.inserted_at = Some(now);
            job.inserted_after = inserted_after;
            if let Some(label) = &self.batch_label {
                job.batch_label = Some(label.clone());
            }
            job
        });

        existing.splice(at..at, enriched);
        Ok(())
    }
}
