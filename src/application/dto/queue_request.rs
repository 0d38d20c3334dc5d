// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::models::queue_state::{QueueState, QueueStatus};
use crate::domain::models::stored_config::StoredConfig;

/// 只运行选中任务的请求
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct SelectionRequestDto {
    #[validate(length(min = 1))]
    pub job_ids: Vec<Uuid>,
}

/// 队列状态响应
#[derive(Debug, Deserialize, Serialize)]
pub struct QueueStateResponseDto {
    pub status: QueueStatus,
    #[serde(flatten)]
    pub state: QueueState,
}

impl From<QueueState> for QueueStateResponseDto {
    fn from(state: QueueState) -> Self {
        Self {
            status: state.status(),
            state,
        }
    }
}

/// 运行时配置更新，缺省字段保持不变
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct ConfigUpdateDto {
    #[validate(range(max = 600000))]
    pub min_delay_ms: Option<u64>,
    #[validate(range(max = 600000))]
    pub max_delay_ms: Option<u64>,
    pub auto_start_on_enqueue: Option<bool>,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

impl ConfigUpdateDto {
    /// 合并到已有配置；空字符串清除 Telegram 凭据
    pub fn apply(self, config: &mut StoredConfig) {
        if let Some(min) = self.min_delay_ms {
            config.min_delay_ms = min;
        }
        if let Some(max) = self.max_delay_ms {
            config.max_delay_ms = max;
        }
        if let Some(auto_start) = self.auto_start_on_enqueue {
            config.auto_start_on_enqueue = auto_start;
        }
        if let Some(token) = self.telegram_bot_token {
            config.telegram_bot_token = Some(token).filter(|t| !t.trim().is_empty());
        }
        if let Some(chat_id) = self.telegram_chat_id {
            config.telegram_chat_id = Some(chat_id).filter(|c| !c.trim().is_empty());
        }
    }
}

/// 运行时配置响应，令牌不回显
#[derive(Debug, Deserialize, Serialize)]
pub struct ConfigResponseDto {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub auto_start_on_enqueue: bool,
    pub telegram_configured: bool,
}

impl From<StoredConfig> for ConfigResponseDto {
    fn from(config: StoredConfig) -> Self {
        Self {
            telegram_configured: config.telegram_credentials().is_some(),
            min_delay_ms: config.min_delay_ms,
            max_delay_ms: config.max_delay_ms,
            auto_start_on_enqueue: config.auto_start_on_enqueue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_update_merges_and_clears() {
        let mut config = StoredConfig {
            telegram_bot_token: Some("token".to_string()),
            telegram_chat_id: Some("42".to_string()),
            ..StoredConfig::default()
        };
        ConfigUpdateDto {
            min_delay_ms: Some(100),
            max_delay_ms: None,
            auto_start_on_enqueue: Some(true),
            telegram_bot_token: Some(String::new()),
            telegram_chat_id: None,
        }
        .apply(&mut config);

        assert_eq!(config.min_delay_ms, 100);
        assert_eq!(config.max_delay_ms, 5000);
        assert!(config.auto_start_on_enqueue);
        assert_eq!(config.telegram_bot_token, None);
        assert_eq!(config.telegram_chat_id.as_deref(), Some("42"));
        assert!(!ConfigResponseDto::from(config).telegram_configured);
    }
}
