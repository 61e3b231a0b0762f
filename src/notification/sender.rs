//! 通知发送器模块
//!
//! 定义通知发送的trait和基础实现

use crate::error::DispatchError;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    /// 告警消息
    Alert,
    /// 恢复消息
    Recovery,
    /// 测试消息
    Test,
}

impl fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoticeKind::Alert => write!(f, "alert"),
            NoticeKind::Recovery => write!(f, "recovery"),
            NoticeKind::Test => write!(f, "test"),
        }
    }
}

/// 待发送的通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertNotice {
    /// 通知类型
    pub kind: NoticeKind,
    /// 目标名称
    pub target: String,
    /// 渲染后的消息正文
    pub message: String,
}

impl AlertNotice {
    pub fn new(kind: NoticeKind, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            message: message.into(),
        }
    }
}

/// 通知发送器trait
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// 投递一条通知
    ///
    /// # 参数
    /// * `notice` - 通知内容
    ///
    /// # 返回
    /// * `Result<(), DispatchError>` - 通道不可用或远端拒绝时返回错误
    async fn deliver(&self, notice: &AlertNotice) -> Result<(), DispatchError>;

    /// 通道名称，用于日志
    fn channel_name(&self) -> &'static str;
}

/// 空的通知发送器实现（告警关闭时使用）
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpSender;

#[async_trait]
impl NotificationSender for NoOpSender {
    async fn deliver(&self, _notice: &AlertNotice) -> Result<(), DispatchError> {
        // 不执行任何操作
        Ok(())
    }

    fn channel_name(&self) -> &'static str {
        "none"
    }
}
