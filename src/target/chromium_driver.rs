// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventLoadingFinished, EventResponseReceived,
    GetResponseBodyParams, RequestId,
};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::settings::TargetSettings;
use crate::detector::response_parser::EndpointPatterns;
use crate::target::driver::{DriverError, NetworkEvent, PageDriver, PageSnapshot};

const STRUCTURE_TICK: Duration = Duration::from_millis(500);

const SNAPSHOT_SCRIPT: &str = r#"(() => {
  const visible = (el) => !!el && el.offsetParent !== null;
  const percent = Array.from(document.querySelectorAll('svg circle[stroke-dashoffset], [aria-live="polite"]'))
    .map((el) => (el.closest('[aria-live]') || el.parentElement || el).textContent || '')
    .find((text) => /\d+\s*%/.test(text));
  const loader = document.querySelector('.bg-token-bg-secondary svg circle, svg circle[stroke-dashoffset]');
  const status = document.querySelector('[role="status"]');
  const error = document.querySelector('[role="alert"]');
  return {
    loaderVisible: visible(loader),
    loaderText: percent || null,
    statusText: status ? status.textContent : null,
    errorVisible: visible(error),
  };
})()"#;

fn browser_error(e: impl std::fmt::Display) -> DriverError {
    DriverError::Browser(e.to_string())
}

/// 基于 chromiumoxide 的页面驱动
///
/// 连接远程调试地址或启动本地浏览器，打开目标应用，
/// 通过 CDP 网络域观察页面流量
pub struct ChromiumPageDriver {
    _browser: Browser,
    page: Page,
    target_id: String,
    input_selectors: Vec<String>,
    submit_selectors: Vec<String>,
    network_tx: broadcast::Sender<NetworkEvent>,
    structure_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl ChromiumPageDriver {
    /// 打开目标页面并开始观察流量
    ///
    /// # 参数
    ///
    /// * `settings` - 目标页面配置
    pub async fn launch(settings: &TargetSettings) -> Result<Self, DriverError> {
        let (browser, mut handler) = if let Some(ref url) = settings.remote_debugging_url {
            info!("Connecting to remote Chrome instance at: {}", url);
            Browser::connect(url).await.map_err(browser_error)?
        } else {
            let config = BrowserConfig::builder()
                .with_head()
                .request_timeout(Duration::from_secs(30))
                .arg("--disable-dev-shm-usage")
                .build()
                .map_err(DriverError::Browser)?;
            Browser::launch(config).await.map_err(browser_error)?
        };

        // 处理浏览器事件
        let handler_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        let page = browser.new_page(settings.url.as_str()).await.map_err(browser_error)?;
        page.execute(EnableParams::default())
            .await
            .map_err(browser_error)?;
        let target_id = page.target_id().inner().clone();

        let (network_tx, _) = broadcast::channel(256);
        let (structure_tx, _) = broadcast::channel(16);

        let patterns = EndpointPatterns::new(
            settings.creation_patterns.clone(),
            settings.polling_patterns.clone(),
        );
        let network_task = Self::spawn_network_listener(page.clone(), patterns, network_tx.clone())
            .await?;

        let tick_tx = structure_tx.clone();
        let structure_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(STRUCTURE_TICK);
            loop {
                interval.tick().await;
                let _ = tick_tx.send(());
            }
        });

        info!(target_id = %target_id, url = %settings.url, "Target page opened");

        Ok(Self {
            _browser: browser,
            page,
            target_id,
            input_selectors: settings.input_selectors.clone(),
            submit_selectors: settings.submit_selectors.clone(),
            network_tx,
            structure_tx,
            tasks: vec![handler_task, network_task, structure_task],
        })
    }

    async fn spawn_network_listener(
        page: Page,
        patterns: EndpointPatterns,
        tx: broadcast::Sender<NetworkEvent>,
    ) -> Result<JoinHandle<()>, DriverError> {
        let mut responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(browser_error)?;
        let mut finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(browser_error)?;
        let mut failed = page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(browser_error)?;

        Ok(tokio::spawn(async move {
            // 等待正文加载完成的响应
            let mut awaiting_body: HashMap<RequestId, (String, u16)> = HashMap::new();
            // 已知请求的 URL，用于失败事件
            let mut urls: HashMap<RequestId, String> = HashMap::new();

            loop {
                tokio::select! {
                    Some(event) = responses.next() => {
                        let url = event.response.url.clone();
                        let status = event.response.status as u16;
                        if patterns.wants_body(&url) {
                            awaiting_body.insert(event.request_id.clone(), (url.clone(), status));
                        } else {
                            let _ = tx.send(NetworkEvent::Response { url: url.clone(), status, body: None });
                        }
                        urls.insert(event.request_id.clone(), url);
                    }
                    Some(event) = finished.next() => {
                        urls.remove(&event.request_id);
                        let Some((url, status)) = awaiting_body.remove(&event.request_id) else {
                            continue;
                        };
                        let body = match page
                            .execute(GetResponseBodyParams::new(event.request_id.clone()))
                            .await
                        {
                            Ok(resp) if resp.result.base64_encoded => BASE64
                                .decode(&resp.result.body)
                                .ok()
                                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()),
                            Ok(resp) => Some(resp.result.body.clone()),
                            Err(e) => {
                                debug!(url = %url, "Failed to fetch response body: {}", e);
                                None
                            }
                        };
                        let _ = tx.send(NetworkEvent::Response { url, status, body });
                    }
                    Some(event) = failed.next() => {
                        awaiting_body.remove(&event.request_id);
                        if let Some(url) = urls.remove(&event.request_id) {
                            let _ = tx.send(NetworkEvent::Failed { url, error: event.error_text.clone() });
                        }
                    }
                    else => break,
                }
            }
            warn!("Page network event streams closed");
        }))
    }

    async fn first_match(
        &self,
        selectors: &[String],
    ) -> Option<(String, chromiumoxide::Element)> {
        for selector in selectors {
            if let Ok(element) = self.page.find_element(selector.as_str()).await {
                return Some((selector.clone(), element));
            }
        }
        None
    }
}

#[async_trait]
impl PageDriver for ChromiumPageDriver {
    fn target_id(&self) -> String {
        self.target_id.clone()
    }

    async fn set_prompt_text(&self, text: &str) -> Result<(), DriverError> {
        let (selector, element) = self
            .first_match(&self.input_selectors)
            .await
            .ok_or(DriverError::InputNotFound)?;
        element.click().await.map_err(browser_error)?;

        // 通过原生 setter 写值并派发 input 事件，受控组件才能感知变化
        let script = format!(
            r#"(() => {{
  const el = document.querySelector({selector});
  if (!el) return false;
  const setter = Object.getOwnPropertyDescriptor(HTMLTextAreaElement.prototype, 'value').set;
  setter.call(el, {text});
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  return true;
}})()"#,
            selector = serde_json::to_string(&selector).map_err(browser_error)?,
            text = serde_json::to_string(text).map_err(browser_error)?,
        );
        let written: bool = self
            .page
            .evaluate(script)
            .await
            .map_err(browser_error)?
            .into_value()
            .map_err(browser_error)?;

        if written {
            Ok(())
        } else {
            Err(DriverError::InputNotFound)
        }
    }

    async fn trigger_submit(&self) -> Result<(), DriverError> {
        if let Some((selector, button)) = self.first_match(&self.submit_selectors).await {
            debug!(selector = %selector, "Clicking submit");
            button.click().await.map_err(browser_error)?;
            return Ok(());
        }

        // 没有提交按钮时退回到在输入框中按回车
        let (_, input) = self
            .first_match(&self.input_selectors)
            .await
            .ok_or(DriverError::SubmitNotFound)?;
        input.press_key("Enter").await.map_err(browser_error)?;
        Ok(())
    }

    async fn snapshot(&self) -> Result<PageSnapshot, DriverError> {
        self.page
            .evaluate(SNAPSHOT_SCRIPT)
            .await
            .map_err(browser_error)?
            .into_value::<PageSnapshot>()
            .map_err(browser_error)
    }

    fn network_events(&self) -> broadcast::Receiver<NetworkEvent> {
        self.network_tx.subscribe()
    }

    fn structure_changes(&self) -> broadcast::Receiver<()> {
        self.structure_tx.subscribe()
    }
}

impl Drop for ChromiumPageDriver {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
