// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::domain::models::stored_config::StoredConfig;

/// 应用程序配置设置
///
/// 包含服务器、存储、队列、完成检测、静默监控、目标页面和指标等配置项
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// 服务器配置
    pub server: ServerSettings,
    /// 存储配置
    pub store: StoreSettings,
    /// 队列配置
    pub queue: QueueSettings,
    /// 完成检测配置
    pub detector: DetectorSettings,
    /// 流量静默监控配置
    pub monitor: MonitorSettings,
    /// 目标页面配置
    pub target: TargetSettings,
    /// 指标配置
    pub metrics: MetricsSettings,
}

/// 服务器配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// 服务器监听主机地址
    pub host: String,
    /// 服务器监听端口
    pub port: u16,
}

/// 存储配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    /// 状态文件目录，为空时使用内存存储
    pub path: Option<String>,
    /// 历史记录保留条数
    pub history_limit: usize,
}

/// 队列配置设置
///
/// 仅用于首次打开存储时填充持久化配置
#[derive(Debug, Clone, Deserialize)]
pub struct QueueSettings {
    /// 派发间最小延迟（毫秒）
    pub min_delay_ms: u64,
    /// 派发间最大延迟（毫秒）
    pub max_delay_ms: u64,
    /// 入队后自动启动
    pub auto_start_on_enqueue: bool,
}

/// 完成检测配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct DetectorSettings {
    /// 启动确认窗口（毫秒）
    pub start_window_ms: u64,
    /// 硬性超时（毫秒）
    pub hard_timeout_ms: u64,
    /// 上报进度的最小变化量（百分点）
    pub min_progress_delta: f64,
    /// 页面判定完成后的稳定等待（毫秒）
    pub settle_delay_ms: u64,
    /// 输入文本与点击提交之间的停顿（毫秒）
    pub submit_pause_ms: u64,
}

/// 流量静默监控配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSettings {
    /// 检查间隔（毫秒）
    pub check_interval_ms: u64,
    /// 静默阈值（毫秒）
    pub silence_threshold_ms: u64,
    /// 心跳请求的 URL 前缀
    pub heartbeat_prefix: String,
}

/// 目标页面配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct TargetSettings {
    /// 目标应用地址
    pub url: String,
    /// 远程调试地址，设置时连接已有浏览器而不是启动新实例
    pub remote_debugging_url: Option<String>,
    /// 任务创建接口的路径特征
    pub creation_patterns: Vec<String>,
    /// 任务轮询接口的路径特征
    pub polling_patterns: Vec<String>,
    /// 输入框选择器，按顺序尝试
    pub input_selectors: Vec<String>,
    /// 提交按钮选择器，按顺序尝试
    pub submit_selectors: Vec<String>,
    /// 投递等待页面回复的超时（毫秒）
    pub delivery_timeout_ms: u64,
}

/// 指标配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSettings {
    /// 是否启用 Prometheus 导出
    pub enabled: bool,
    /// 导出监听地址
    pub listen: String,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 依次叠加内置默认值、`config/default`、`config/{APP_ENVIRONMENT}`
    /// 以及 `GENQUEUE__` 前缀的环境变量
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        Self::builder()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("GENQUEUE").separator("__").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// 仅包含内置默认值的配置
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::builder()?.build()?.try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("store.path", "./state")?
            .set_default("store.history_limit", 1000)?
            .set_default("queue.min_delay_ms", 2000)?
            .set_default("queue.max_delay_ms", 5000)?
            .set_default("queue.auto_start_on_enqueue", false)?
            .set_default("detector.start_window_ms", 15_000)?
            .set_default("detector.hard_timeout_ms", 300_000)?
            .set_default("detector.min_progress_delta", 1.0)?
            .set_default("detector.settle_delay_ms", 1000)?
            .set_default("detector.submit_pause_ms", 500)?
            .set_default("monitor.check_interval_ms", 5000)?
            .set_default("monitor.silence_threshold_ms", 30_000)?
            .set_default(
                "monitor.heartbeat_prefix",
                "https://browser-intake-datadoghq.com/api/v2/rum",
            )?
            .set_default("target.url", "https://sora.chatgpt.com/")?
            .set_default(
                "target.creation_patterns",
                vec!["/backend/video_gen", "/backend/image_gen"],
            )?
            .set_default(
                "target.polling_patterns",
                vec!["/backend/tasks", "/v1/video/tasks", "/api/tasks"],
            )?
            .set_default(
                "target.input_selectors",
                vec![
                    "textarea[placeholder*=\"Describe\"]",
                    "textarea.bg-transparent",
                    "textarea",
                ],
            )?
            .set_default(
                "target.submit_selectors",
                vec![
                    "button[aria-label*=\"generate\" i]",
                    "button[aria-label*=\"create\" i]",
                    "button[type=\"submit\"]",
                ],
            )?
            .set_default("target.delivery_timeout_ms", 10_000)?
            .set_default("metrics.enabled", false)?
            .set_default("metrics.listen", "0.0.0.0:9000")
    }
}

impl QueueSettings {
    /// 首次打开存储时写入的持久化配置
    pub fn seed_config(&self) -> StoredConfig {
        StoredConfig {
            min_delay_ms: self.min_delay_ms,
            max_delay_ms: self.max_delay_ms,
            auto_start_on_enqueue: self.auto_start_on_enqueue,
            ..StoredConfig::default()
        }
    }
}

impl DetectorSettings {
    pub fn start_window(&self) -> Duration {
        Duration::from_millis(self.start_window_ms)
    }

    pub fn hard_timeout(&self) -> Duration {
        Duration::from_millis(self.hard_timeout_ms)
    }
}

impl MonitorSettings {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn silence_threshold(&self) -> Duration {
        Duration::from_millis(self.silence_threshold_ms)
    }
}

#[cfg(test)]
#[path = "settings_test.rs"]
mod tests;
