// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

use crate::detector::traits::{CompletionOutcome, CompletionSource, SignalSource, WatchContext};

/// 外部完成信号源
///
/// 由流量静默监控经后台上下文转发的完成信号驱动。
/// 开始确认之前收到的信号会被闩锁拒绝，之后的信号可以再次尝试。
pub struct ExternalSignalSource {
    signals: mpsc::Receiver<()>,
}

impl ExternalSignalSource {
    pub fn new(signals: mpsc::Receiver<()>) -> Self {
        Self { signals }
    }
}

#[async_trait]
impl CompletionSource for ExternalSignalSource {
    fn source(&self) -> SignalSource {
        SignalSource::External
    }

    async fn run(&mut self, ctx: WatchContext) {
        loop {
            tokio::select! {
                _ = ctx.cancel.cancelled() => break,
                signal = self.signals.recv() => {
                    if signal.is_none() {
                        break;
                    }
                    info!("Traffic silence reported generation complete");
                    if ctx.offer(SignalSource::External, CompletionOutcome::success()) {
                        break;
                    }
                }
            }
        }
    }
}
