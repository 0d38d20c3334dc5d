// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use uuid::Uuid;

use crate::domain::models::active_task::GenerationRef;
use crate::domain::models::job::JobRecord;
use crate::messaging::channel::{Endpoint, Inbox};
use crate::utils::errors::DetectionError;

/// 后台上下文发往页面上下文的请求
#[derive(Debug, Clone)]
pub enum TargetRequest {
    /// 探测页面上下文是否存活
    Ping,
    /// 提交任务
    SubmitJob(JobRecord),
    /// 流量静默推断出生成已完成
    GenerationComplete { job_id: Uuid },
    /// 查询页面上正在执行的任务
    ActiveJob,
}

/// 页面上下文的回复
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetResponse {
    Pong,
    /// 已接受提交，完成结果稍后通过后台请求上报
    Accepted,
    /// 已有任务在执行
    Busy { current: Uuid },
    /// 外部完成信号已转交给检测器
    Signalled,
    /// 没有与该信号对应的活动任务
    NoActiveJob,
    /// 页面上正在执行的任务，空闲时为 `None`
    Active { job_id: Option<Uuid> },
}

/// 页面上下文发往后台上下文的请求
#[derive(Debug, Clone)]
pub enum BackgroundRequest {
    Progress {
        job_id: Uuid,
        percent: f64,
    },
    Completed {
        job_id: Uuid,
        generations: Vec<GenerationRef>,
    },
    Failed {
        job_id: Uuid,
        error: DetectionError,
    },
    StartMonitoring {
        target_id: String,
        job_id: Uuid,
    },
    StopMonitoring {
        target_id: String,
    },
}

impl BackgroundRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            BackgroundRequest::Progress { .. } => "progress",
            BackgroundRequest::Completed { .. } => "completed",
            BackgroundRequest::Failed { .. } => "failed",
            BackgroundRequest::StartMonitoring { .. } => "start_monitoring",
            BackgroundRequest::StopMonitoring { .. } => "stop_monitoring",
        }
    }
}

/// 后台上下文的回复
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackgroundResponse {
    Ack,
    /// 请求被忽略，附带原因
    Ignored(String),
}

pub type TargetEndpoint = Endpoint<TargetRequest, TargetResponse>;
pub type TargetInbox = Inbox<TargetRequest, TargetResponse>;
pub type BackgroundEndpoint = Endpoint<BackgroundRequest, BackgroundResponse>;
pub type BackgroundInbox = Inbox<BackgroundRequest, BackgroundResponse>;
