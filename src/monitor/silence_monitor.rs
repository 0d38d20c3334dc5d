// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use dashmap::DashMap;
use metrics::counter;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info};

use crate::config::settings::MonitorSettings;
use crate::infrastructure::metrics::SILENCE_MONITOR_FIRED;
use crate::target::driver::NetworkEvent;

/// 流量静默监控配置
#[derive(Debug, Clone)]
pub struct SilenceMonitorConfig {
    /// 检查间隔
    pub check_interval: Duration,
    /// 静默阈值
    pub silence_threshold: Duration,
    /// 心跳请求的 URL 前缀
    pub heartbeat_prefix: String,
}

impl Default for SilenceMonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(5),
            silence_threshold: Duration::from_secs(30),
            heartbeat_prefix: "https://browser-intake-datadoghq.com/api/v2/rum".to_string(),
        }
    }
}

impl From<&MonitorSettings> for SilenceMonitorConfig {
    fn from(settings: &MonitorSettings) -> Self {
        Self {
            check_interval: settings.check_interval(),
            silence_threshold: settings.silence_threshold(),
            heartbeat_prefix: settings.heartbeat_prefix.clone(),
        }
    }
}

struct MonitorEntry {
    generation: u64,
    last_activity_at: Instant,
    handle: JoinHandle<()>,
}

/// 流量静默监控
///
/// 每个目标最多一个条目。替换条目时先中止旧的定时任务；
/// 静默达到阈值时回调只触发一次，随后条目被移除。
pub struct TrafficSilenceMonitor {
    config: SilenceMonitorConfig,
    entries: Arc<DashMap<String, MonitorEntry>>,
    next_generation: AtomicU64,
}

impl TrafficSilenceMonitor {
    pub fn new(config: SilenceMonitorConfig) -> Self {
        Self {
            config,
            entries: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// 开始监控目标
    ///
    /// # 参数
    ///
    /// * `target_id` - 目标标识
    /// * `on_complete` - 静默达到阈值时调用一次
    pub fn start_monitoring<F, Fut>(&self, target_id: &str, on_complete: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let entries = self.entries.clone();
        let threshold = self.config.silence_threshold;
        let period = self.config.check_interval;
        let id = target_id.to_string();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;

                let silent = match entries.get(&id) {
                    Some(entry) if entry.generation == generation => {
                        entry.last_activity_at.elapsed() >= threshold
                    }
                    // 条目已被替换或移除
                    _ => return,
                };
                if !silent {
                    continue;
                }

                if entries
                    .remove_if(&id, |_, entry| entry.generation == generation)
                    .is_some()
                {
                    counter!(SILENCE_MONITOR_FIRED).increment(1);
                    info!(target_id = %id, "Traffic silence threshold reached");
                    on_complete().await;
                }
                return;
            }
        });

        let entry = MonitorEntry {
            generation,
            last_activity_at: Instant::now(),
            handle,
        };
        if let Some(previous) = self.entries.insert(target_id.to_string(), entry) {
            debug!(target_id = %target_id, "Replacing silence monitor entry");
            previous.handle.abort();
        }
    }

    /// 记录一次活动
    pub fn record_activity(&self, target_id: &str) {
        if let Some(mut entry) = self.entries.get_mut(target_id) {
            entry.last_activity_at = Instant::now();
        }
    }

    /// 观察一个网络请求，只有心跳请求会刷新活动时间
    pub fn observe(&self, target_id: &str, url: &str) {
        if url.starts_with(&self.config.heartbeat_prefix) {
            self.record_activity(target_id);
        }
    }

    /// 停止监控，可重复调用
    pub fn stop_monitoring(&self, target_id: &str) {
        if let Some((_, entry)) = self.entries.remove(target_id) {
            entry.handle.abort();
            debug!(target_id = %target_id, "Silence monitoring stopped");
        }
    }

    pub fn is_monitoring(&self, target_id: &str) -> bool {
        self.entries.contains_key(target_id)
    }

    /// 将目标页面的网络事件接入监控
    pub fn attach(
        self: &Arc<Self>,
        target_id: String,
        mut events: broadcast::Receiver<NetworkEvent>,
    ) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => monitor.observe(&target_id, event.url()),
                    Err(RecvError::Lagged(_)) => monitor.record_activity(&target_id),
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
