// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

/// 持久化的运行时配置
///
/// 保存在存储的 `config` 键下，首次打开存储时由启动配置填充，
/// 之后可由操作员修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredConfig {
    /// 两次派发之间的最小延迟（毫秒）
    pub min_delay_ms: u64,
    /// 两次派发之间的最大延迟（毫秒）
    pub max_delay_ms: u64,
    /// 入队后自动启动队列
    #[serde(default)]
    pub auto_start_on_enqueue: bool,
    /// Telegram 机器人令牌
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_bot_token: Option<String>,
    /// Telegram 会话 ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_chat_id: Option<String>,
}

impl Default for StoredConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 2000,
            max_delay_ms: 5000,
            auto_start_on_enqueue: false,
            telegram_bot_token: None,
            telegram_chat_id: None,
        }
    }
}

impl StoredConfig {
    /// 返回有序的延迟区间 (min, max)
    pub fn delay_bounds(&self) -> (u64, u64) {
        if self.min_delay_ms <= self.max_delay_ms {
            (self.min_delay_ms, self.max_delay_ms)
        } else {
            (self.max_delay_ms, self.min_delay_ms)
        }
    }

    /// Telegram 通知所需的凭据，均已配置时返回
    pub fn telegram_credentials(&self) -> Option<(&str, &str)> {
        match (&self.telegram_bot_token, &self.telegram_chat_id) {
            (Some(token), Some(chat)) if !token.is_empty() && !chat.is_empty() => {
                Some((token.as_str(), chat.as_str()))
            }
            _ => None,
        }
    }
}
