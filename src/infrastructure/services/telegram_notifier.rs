// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::domain::models::job::{JobRecord, JobStatus};
use crate::domain::services::completion_notifier::{CompletionNotifier, NotifyError};
use crate::infrastructure::durable_store::DurableStore;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const PREVIEW_CHARS: usize = 200;

/// Telegram 完成通知实现
///
/// 凭据在每次发送时从持久化配置读取，操作员修改后立即生效
pub struct TelegramNotifier {
    /// HTTP 客户端
    client: reqwest::Client,
    /// 持久化存储
    store: Arc<DurableStore>,
    /// Bot API 地址
    api_base: String,
}

impl TelegramNotifier {
    pub fn new(store: Arc<DurableStore>) -> Self {
        Self::with_api_base(store, TELEGRAM_API_BASE)
    }

    pub fn with_api_base(store: Arc<DurableStore>, api_base: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            client,
            store,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn render(job: &JobRecord) -> String {
        let preview: String = job.text.chars().take(PREVIEW_CHARS).collect();
        let ellipsis = if job.text.chars().count() > PREVIEW_CHARS {
            "..."
        } else {
            ""
        };
        let headline = match job.status {
            JobStatus::Failed => "Generation failed",
            _ => "Generation complete",
        };

        let mut message = format!(
            "{}\n\nPrompt: {}{}\nType: {}",
            headline, preview, ellipsis, job.media_kind
        );
        if let Some(ms) = job.duration_ms {
            message.push_str(&format!("\nDuration: {}s", ms / 1000));
        }
        if let Some(reason) = &job.failure_reason {
            message.push_str(&format!("\nReason: {}", reason));
        }
        message
    }
}

#[async_trait]
impl CompletionNotifier for TelegramNotifier {
    async fn notify(&self, job: &JobRecord) -> Result<(), NotifyError> {
        let config = self.store.stored_config().await;
        let Some((token, chat_id)) = config.telegram_credentials() else {
            debug!("Telegram not configured, skipping notification");
            return Ok(());
        };

        let response = self
            .client
            .post(format!("{}/bot{}/sendMessage", self.api_base, token))
            .json(&json!({
                "chat_id": chat_id,
                "text": Self::render(job),
            }))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(NotifyError::Rejected(response.status().as_u16()))
        }
    }

    fn name(&self) -> &str {
        "telegram"
    }
}
