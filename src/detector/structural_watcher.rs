// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

use crate::detector::traits::{CompletionOutcome, CompletionSource, SignalSource, WatchContext};
use crate::target::driver::{PageDriver, PageSnapshot};
use crate::utils::errors::DetectionError;

static PERCENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+\s*%").expect("Failed to compile percent regex"));

/// 页面结构判定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageVerdict {
    /// 尚未观察到生成开始
    NotStarted,
    /// 正在生成
    Loading,
    /// 状态提示显示已就绪
    Ready,
    /// 页面显示错误
    Errored(String),
    /// 开始后加载指示器消失
    Settled,
}

/// 根据页面快照判定生成状态
///
/// # 参数
///
/// * `snapshot` - 页面结构快照
/// * `started` - 是否已经确认生成开始
pub fn classify(snapshot: &PageSnapshot, started: bool) -> PageVerdict {
    if snapshot
        .loader_text
        .as_deref()
        .is_some_and(|text| PERCENT.is_match(text))
    {
        return PageVerdict::Loading;
    }

    let status = snapshot
        .status_text
        .as_deref()
        .map(str::to_lowercase)
        .unwrap_or_default();

    if status.contains("ready") {
        return PageVerdict::Ready;
    }
    if status.contains("error") || status.contains("failed") {
        return PageVerdict::Errored(status.trim().to_string());
    }
    if snapshot.error_visible {
        return PageVerdict::Errored("error shown on page".to_string());
    }
    if snapshot.loader_visible
        || status.contains("generating")
        || status.contains("processing")
        || PERCENT.is_match(&status)
    {
        return PageVerdict::Loading;
    }

    if started {
        PageVerdict::Settled
    } else {
        PageVerdict::NotStarted
    }
}

/// 页面结构观察者
///
/// 每次结构变化通知到达时读取一次快照。加载指示器在开始确认之后消失，
/// 并且在稳定等待后仍未出现，即视为完成。
pub struct StructuralWatcher {
    driver: Arc<dyn PageDriver>,
    changes: broadcast::Receiver<()>,
    settle_delay: Duration,
}

impl StructuralWatcher {
    pub fn new(driver: Arc<dyn PageDriver>, settle_delay: Duration) -> Self {
        let changes = driver.structure_changes();
        Self {
            driver,
            changes,
            settle_delay,
        }
    }

    async fn verdict(&self, ctx: &WatchContext) -> Option<PageVerdict> {
        match self.driver.snapshot().await {
            Ok(snapshot) => Some(classify(&snapshot, ctx.gate.is_open())),
            Err(e) => {
                let transient = DetectionError::RecoverableTransient(e.to_string());
                debug!("Page snapshot failed: {}", transient);
                None
            }
        }
    }

    /// 处理一次判定，提交结论后返回 true
    async fn handle(&self, verdict: PageVerdict, ctx: &WatchContext) -> bool {
        match verdict {
            PageVerdict::NotStarted => false,
            PageVerdict::Loading => {
                ctx.confirm_started(SignalSource::Structural);
                false
            }
            PageVerdict::Ready => ctx.offer(SignalSource::Structural, CompletionOutcome::success()),
            PageVerdict::Errored(message) => {
                ctx.offer(
                    SignalSource::Structural,
                    CompletionOutcome::Failure(DetectionError::TargetFailure {
                        message,
                        rate_limited: false,
                    }),
                );
                true
            }
            PageVerdict::Settled => {
                tokio::select! {
                    _ = ctx.cancel.cancelled() => return true,
                    _ = tokio::time::sleep(self.settle_delay) => {}
                }
                // 稳定等待后再确认一次，避免指示器短暂消失造成误判
                if self.verdict(ctx).await == Some(PageVerdict::Settled) {
                    debug!("Loader gone after start, assuming generation finished");
                    ctx.offer(SignalSource::Structural, CompletionOutcome::success())
                } else {
                    false
                }
            }
        }
    }
}

#[async_trait]
impl CompletionSource for StructuralWatcher {
    fn source(&self) -> SignalSource {
        SignalSource::Structural
    }

    async fn run(&mut self, ctx: WatchContext) {
        loop {
            tokio::select! {
                _ = ctx.cancel.cancelled() => break,
                tick = self.changes.recv() => match tick {
                    Ok(()) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                },
            }

            if let Some(verdict) = self.verdict(&ctx).await {
                if self.handle(verdict, &ctx).await {
                    break;
                }
            }
        }
    }
}
