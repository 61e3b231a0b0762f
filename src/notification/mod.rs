//! 通知系统模块
//!
//! 告警/恢复消息的渲染和投递

pub mod dispatcher;
pub mod sender;
pub mod ssh;
pub mod telegram;
pub mod template;

// 重新导出主要类型
pub use dispatcher::AlertDispatcher;
pub use sender::{AlertNotice, NoOpSender, NoticeKind, NotificationSender};
pub use ssh::{shell_quote, SshRelaySender};
pub use telegram::TelegramSender;
pub use template::{
    format_timestamp, MessageRenderer, TemplateContext, DEFAULT_ALERT_TEMPLATE,
    DEFAULT_RECOVERY_TEMPLATE,
};
