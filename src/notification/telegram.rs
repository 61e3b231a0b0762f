//! Telegram 直连通知
//!
//! 调用 Bot API 的 sendMessage 接口

use crate::config::TelegramConfig;
use crate::error::DispatchError;
use crate::notification::sender::{AlertNotice, NotificationSender};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error, info};

/// Telegram 发送器
#[derive(Debug, Clone)]
pub struct TelegramSender {
    /// HTTP客户端
    client: Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
    timeout: Duration,
}

impl TelegramSender {
    /// 创建新的 Telegram 发送器
    pub fn new(config: &TelegramConfig) -> Result<Self, DispatchError> {
        let timeout = Duration::from_secs(config.timeout_seconds);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DispatchError::Channel(format!("创建HTTP客户端失败: {e}")))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.trim().to_string(),
            chat_id: config.chat_id.trim().to_string(),
            timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }
}

#[async_trait]
impl NotificationSender for TelegramSender {
    async fn deliver(&self, notice: &AlertNotice) -> Result<(), DispatchError> {
        debug!("发送 Telegram 通知: {}", notice.target);

        let params = [("chat_id", self.chat_id.as_str()), ("text", notice.message.as_str())];
        let response = self
            .client
            .post(self.endpoint())
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                // 错误里的 URL 带有 token，去掉
                let e = e.without_url();
                if e.is_timeout() {
                    DispatchError::Timeout(self.timeout.as_secs())
                } else {
                    DispatchError::Channel(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            info!("Telegram 通知发送成功: {}", notice.target);
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            let text: String = text.chars().take(200).collect();
            error!("Telegram 通知发送失败: {} - {}", status, text);
            Err(DispatchError::Rejected(format!("HTTP {status}: {text}")))
        }
    }

    fn channel_name(&self) -> &'static str {
        "telegram"
    }
}
