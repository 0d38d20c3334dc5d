// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

/// 页面驱动错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// 找不到输入框
    #[error("Input element not found")]
    InputNotFound,
    /// 找不到提交按钮
    #[error("Submit element not found")]
    SubmitNotFound,
    /// 浏览器错误
    #[error("Browser error: {0}")]
    Browser(String),
}

/// 页面结构快照
///
/// 结构检测只依赖这几个字段，具体的选择器由驱动实现负责
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    /// 页面上是否可见加载指示器
    pub loader_visible: bool,
    /// 加载指示器的文本，例如 "42%"
    #[serde(default)]
    pub loader_text: Option<String>,
    /// 状态提示文本
    #[serde(default)]
    pub status_text: Option<String>,
    /// 页面上是否出现错误提示
    #[serde(default)]
    pub error_visible: bool,
}

/// 页面网络事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    /// 收到响应；只有匹配关注路径的响应才携带正文
    Response {
        url: String,
        status: u16,
        body: Option<String>,
    },
    /// 请求失败
    Failed { url: String, error: String },
}

impl NetworkEvent {
    pub fn url(&self) -> &str {
        match self {
            NetworkEvent::Response { url, .. } | NetworkEvent::Failed { url, .. } => url,
        }
    }
}

/// 页面驱动特质
///
/// 完成检测器对目标页面的全部访问都经过这里：两个写操作（填写文本、触发提交）
/// 以及只读的结构快照和网络流量观察
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// 目标标识，用于流量静默监控
    fn target_id(&self) -> String;

    /// 将文本写入输入框
    async fn set_prompt_text(&self, text: &str) -> Result<(), DriverError>;

    /// 触发提交
    async fn trigger_submit(&self) -> Result<(), DriverError>;

    /// 读取页面结构快照
    async fn snapshot(&self) -> Result<PageSnapshot, DriverError>;

    /// 订阅页面网络事件
    fn network_events(&self) -> broadcast::Receiver<NetworkEvent>;

    /// 订阅页面结构变化通知
    fn structure_changes(&self) -> broadcast::Receiver<()>;
}
