// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 目标应用侧的任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TargetTaskStatus {
    #[default]
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl TargetTaskStatus {
    /// 将目标应用返回的原始状态字符串映射为内部状态
    ///
    /// 未知的状态值一律视为运行中
    pub fn from_target(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "queued" | "pending" => TargetTaskStatus::Queued,
            "succeeded" | "completed" | "complete" | "success" => TargetTaskStatus::Succeeded,
            "failed" | "cancelled" | "canceled" | "rejected" | "error" => TargetTaskStatus::Failed,
            _ => TargetTaskStatus::Running,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TargetTaskStatus::Succeeded | TargetTaskStatus::Failed)
    }
}

impl fmt::Display for TargetTaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TargetTaskStatus::Queued => write!(f, "queued"),
            TargetTaskStatus::Running => write!(f, "running"),
            TargetTaskStatus::Succeeded => write!(f, "succeeded"),
            TargetTaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// 生成结果引用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GenerationRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// 轮询响应中解析出的单个任务快照
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub status: TargetTaskStatus,
    /// 进度百分比 (0-100)
    pub progress: Option<f64>,
    pub failure_reason: Option<String>,
    pub generations: Vec<GenerationRef>,
}

/// 应用快照后产生的变化
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskTransition {
    /// 观察到非初始状态，可作为开始确认
    pub started: bool,
    /// 进度上升后的新值
    pub progress: Option<f64>,
    /// 首次进入的终态
    pub terminal: Option<TargetTaskStatus>,
}

/// 活动任务状态
///
/// 仅存在于完成检测器内部，不做持久化。一旦 `is_completed` 为真，
/// 后续的任何快照都不再生效。
#[derive(Debug, Clone)]
pub struct ActiveTaskState {
    pub task_id: String,
    pub status: TargetTaskStatus,
    pub progress: f64,
    pub started_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub generations: Vec<GenerationRef>,
    pub failure_reason: Option<String>,
    pub is_completed: bool,
}

impl ActiveTaskState {
    pub fn new(task_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            task_id: task_id.into(),
            status: TargetTaskStatus::Queued,
            progress: 0.0,
            started_at: now,
            last_updated_at: now,
            generations: Vec::new(),
            failure_reason: None,
            is_completed: false,
        }
    }

    /// 应用一次轮询快照
    ///
    /// # 参数
    ///
    /// * `snapshot` - 与本任务 ID 匹配的快照
    /// * `now` - 当前时间
    ///
    /// # 返回值
    ///
    /// 返回本次更新引起的变化，已完成的任务返回空变化
    pub fn apply_snapshot(&mut self, snapshot: &TaskSnapshot, now: DateTime<Utc>) -> TaskTransition {
        if self.is_completed || snapshot.task_id != self.task_id {
            return TaskTransition::default();
        }

        let mut transition = TaskTransition::default();
        self.last_updated_at = now;
        self.status = snapshot.status;

        if let Some(progress) = snapshot.progress.filter(|p| p.is_finite()) {
            let progress = progress.clamp(0.0, 100.0);
            if progress > self.progress {
                self.progress = progress;
                transition.progress = Some(progress);
            }
        }

        if !snapshot.generations.is_empty() {
            self.generations = snapshot.generations.clone();
        }
        if snapshot.failure_reason.is_some() {
            self.failure_reason = snapshot.failure_reason.clone();
        }

        transition.started = self.status != TargetTaskStatus::Queued || self.progress > 0.0;

        if self.status.is_terminal() {
            self.is_completed = true;
            transition.terminal = Some(self.status);
        }

        transition
    }

    /// 标记为已完成，之后的快照全部忽略
    pub fn mark_completed(&mut self) {
        self.is_completed = true;
    }
}
