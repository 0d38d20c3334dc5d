// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 队列状态（单例）
///
/// 仅由队列编排器修改，其它上下文只读
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct QueueState {
    /// 队列是否在运行
    pub is_running: bool,
    /// 队列是否暂停，暂停时必然处于运行状态
    pub is_paused: bool,
    /// 当前正在执行的任务
    #[serde(default)]
    pub current_job_id: Option<Uuid>,
    /// 已处理（完成或失败）的任务数
    #[serde(default)]
    pub processed_count: u32,
    /// 本轮运行的任务总数
    #[serde(default)]
    pub total_count: u32,
    /// 本轮开始时间
    #[serde(default)]
    pub queue_started_at: Option<DateTime<Utc>>,
    /// 需要操作员处理的告警
    #[serde(default)]
    pub alert: Option<QueueAlert>,
    /// 只处理选中任务时的任务集合
    #[serde(default)]
    pub selection: Option<Vec<Uuid>>,
    /// 占用页面的非当前任务，其结果到达后重新派发
    #[serde(default)]
    pub blocked_by: Option<Uuid>,
}

impl QueueState {
    /// 队列徽标状态
    pub fn status(&self) -> QueueStatus {
        match (self.is_running, self.is_paused) {
            (true, true) => QueueStatus::Paused,
            (true, false) => QueueStatus::Running,
            _ => QueueStatus::Stopped,
        }
    }

    /// 重置为停止状态
    pub fn reset_to_stopped(&mut self) {
        self.is_running = false;
        self.is_paused = false;
        self.current_job_id = None;
        self.blocked_by = None;
        self.selection = None;
    }

    /// 判断任务是否属于本轮运行的范围
    pub fn admits(&self, job_id: Uuid) -> bool {
        self.selection
            .as_ref()
            .map_or(true, |selection| selection.contains(&job_id))
    }
}

/// 队列徽标状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Running,
    Paused,
    Stopped,
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QueueStatus::Running => write!(f, "running"),
            QueueStatus::Paused => write!(f, "paused"),
            QueueStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// 队列级告警
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueAlert {
    pub kind: AlertKind,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

impl QueueAlert {
    pub fn new(kind: AlertKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            raised_at: Utc::now(),
        }
    }
}

/// 告警类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// 目标应用触发了限流
    RateLimited,
    /// 目标页面不可达
    TargetUnreachable,
}
