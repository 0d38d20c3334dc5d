// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::detector::latch::{CompletionLatch, StartGate};
use crate::domain::models::active_task::GenerationRef;
use crate::utils::errors::DetectionError;

/// 完成信号来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalSource {
    /// 任务创建与轮询接口
    Api,
    /// 流量静默推断
    External,
    /// 页面结构启发式
    Structural,
    /// 检测器自身的超时
    Detector,
}

impl SignalSource {
    /// 同一时刻多个结果并存时的优先级，数值越大越权威
    pub fn priority(self) -> u8 {
        match self {
            SignalSource::Api => 3,
            SignalSource::External => 2,
            SignalSource::Structural => 1,
            SignalSource::Detector => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SignalSource::Api => "api",
            SignalSource::External => "external",
            SignalSource::Structural => "structural",
            SignalSource::Detector => "detector",
        }
    }
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 完成结果
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    Success { generations: Vec<GenerationRef> },
    Failure(DetectionError),
}

impl CompletionOutcome {
    pub fn success() -> Self {
        CompletionOutcome::Success {
            generations: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CompletionOutcome::Success { .. })
    }
}

/// 一次提交的最终结论
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub source: SignalSource,
    pub outcome: CompletionOutcome,
}

/// 检测过程中发往编排器方向的事件
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorEvent {
    Progress { percent: f64 },
    Started { source: SignalSource },
}

/// 信号源运行时拿到的共享上下文
#[derive(Clone)]
pub struct WatchContext {
    pub latch: Arc<CompletionLatch>,
    pub gate: StartGate,
    pub events: mpsc::UnboundedSender<DetectorEvent>,
    pub cancel: CancellationToken,
}

impl WatchContext {
    /// 报告开始确认；只有第一次打开闸门时发出事件
    pub fn confirm_started(&self, source: SignalSource) {
        if self.gate.open(source) {
            let _ = self.events.send(DetectorEvent::Started { source });
        }
    }

    pub fn offer(&self, source: SignalSource, outcome: CompletionOutcome) -> bool {
        self.latch.offer(source, outcome)
    }
}

/// 完成信号源
///
/// 每个实现独立观察一种信号，通过上下文中的闩锁提交结论。
/// 检测器在取消令牌触发后中止它们。
#[async_trait]
pub trait CompletionSource: Send {
    fn source(&self) -> SignalSource;

    /// 运行直到提交结论或被取消
    async fn run(&mut self, ctx: WatchContext);
}
