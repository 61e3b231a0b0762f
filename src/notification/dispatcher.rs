//! 告警分发器
//!
//! 按配置选择的告警通道，封闭的三种实现

use crate::config::{AlertConfig, AlertMethod};
use crate::error::DispatchError;
use crate::notification::sender::{AlertNotice, NoOpSender, NotificationSender};
use crate::notification::ssh::SshRelaySender;
use crate::notification::telegram::TelegramSender;
use async_trait::async_trait;

/// 告警分发器
#[derive(Debug, Clone)]
pub enum AlertDispatcher {
    /// 关闭告警
    None(NoOpSender),
    /// 经 ssh 在中转机上执行通知命令
    SshRelay(SshRelaySender),
    /// 直接调用 Telegram Bot API
    Telegram(TelegramSender),
}

impl AlertDispatcher {
    /// 根据告警配置创建
    pub fn from_config(config: &AlertConfig) -> Result<Self, DispatchError> {
        Ok(match config.method {
            AlertMethod::None => Self::None(NoOpSender),
            AlertMethod::Ssh => Self::SshRelay(SshRelaySender::new(&config.ssh)),
            AlertMethod::Telegram => Self::Telegram(TelegramSender::new(&config.telegram)?),
        })
    }

    /// 是否为关闭状态
    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::None(_))
    }
}

#[async_trait]
impl NotificationSender for AlertDispatcher {
    async fn deliver(&self, notice: &AlertNotice) -> Result<(), DispatchError> {
        match self {
            Self::None(sender) => sender.deliver(notice).await,
            Self::SshRelay(sender) => sender.deliver(notice).await,
            Self::Telegram(sender) => sender.deliver(notice).await,
        }
    }

    fn channel_name(&self) -> &'static str {
        match self {
            Self::None(sender) => sender.channel_name(),
            Self::SshRelay(sender) => sender.channel_name(),
            Self::Telegram(sender) => sender.channel_name(),
        }
    }
}
