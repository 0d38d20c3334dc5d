// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tracing::{debug, warn};

use crate::detector::traits::{CompletionOutcome, Resolution, SignalSource};

/// 开始确认闸门
///
/// 只能打开一次，记录第一个确认开始的信号源
#[derive(Clone)]
pub struct StartGate {
    tx: Arc<watch::Sender<Option<SignalSource>>>,
}

impl Default for StartGate {
    fn default() -> Self {
        Self::new()
    }
}

impl StartGate {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// 打开闸门，首次打开返回 true
    pub fn open(&self, source: SignalSource) -> bool {
        self.tx.send_if_modified(|state| {
            if state.is_none() {
                *state = Some(source);
                true
            } else {
                false
            }
        })
    }

    pub fn is_open(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// 等待闸门打开，返回打开它的信号源
    pub async fn opened(&self) -> SignalSource {
        let mut rx = self.tx.subscribe();
        let opened = rx.wait_for(Option::is_some).await.ok().and_then(|state| *state);
        match opened {
            Some(source) => source,
            // 发送端由自身持有，不会关闭
            None => std::future::pending().await,
        }
    }
}

#[derive(Default)]
struct LatchState {
    pending: Option<Resolution>,
    committed: bool,
}

/// 一次性完成闩锁
///
/// 各信号源通过 `offer` 竞争同一个结论。检测器提交之前，更高优先级的来源
/// 可以替换已有结论；提交之后的所有结论都只记录日志并丢弃。
pub struct CompletionLatch {
    state: Mutex<LatchState>,
    notify: Notify,
    gate: StartGate,
}

impl CompletionLatch {
    pub fn new(gate: StartGate) -> Self {
        Self {
            state: Mutex::new(LatchState::default()),
            notify: Notify::new(),
            gate,
        }
    }

    /// 提交结论
    ///
    /// # 返回值
    ///
    /// 结论被记录为待提交结果时返回 true
    pub fn offer(&self, source: SignalSource, outcome: CompletionOutcome) -> bool {
        if outcome.is_success() && !self.gate.is_open() {
            debug!(source = %source, "Success offered before start was confirmed, ignoring");
            return false;
        }

        let mut state = self.state.lock();
        if state.committed {
            warn!(source = %source, outcome = ?outcome, "Signal arrived after resolution, discarded");
            return false;
        }

        let accept = match &state.pending {
            None => true,
            Some(existing) => source.priority() > existing.source.priority(),
        };
        if !accept {
            debug!(source = %source, "Lower priority signal discarded");
            return false;
        }

        if let Some(existing) = &state.pending {
            debug!(replaced = %existing.source, by = %source, "Pending resolution replaced");
        }
        state.pending = Some(Resolution { source, outcome });
        drop(state);

        self.notify.notify_one();
        true
    }

    /// 等待并提交结论
    ///
    /// 看到第一个结论后让出一次调度，使同一时刻到达的更高优先级结论可以替换它
    pub async fn wait(&self) -> Resolution {
        loop {
            let has_pending = self.state.lock().pending.is_some();
            if has_pending {
                tokio::task::yield_now().await;
                if let Some(resolution) = self.commit_pending() {
                    return resolution;
                }
            }
            self.notify.notified().await;
        }
    }

    fn commit_pending(&self) -> Option<Resolution> {
        let mut state = self.state.lock();
        let resolution = state.pending.take()?;
        state.committed = true;
        Some(resolution)
    }

    /// 立即提交；已有待提交结论时以它为准
    pub fn resolve_now(&self, source: SignalSource, outcome: CompletionOutcome) -> Resolution {
        let mut state = self.state.lock();
        state.committed = true;
        state
            .pending
            .take()
            .unwrap_or(Resolution { source, outcome })
    }

    pub fn is_committed(&self) -> bool {
        self.state.lock().committed
    }
}
