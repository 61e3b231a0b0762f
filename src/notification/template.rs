//! 消息模板模块
//!
//! 使用 Handlebars 渲染告警和恢复消息

use crate::error::DispatchError;
use crate::notification::sender::NoticeKind;
use crate::probe::ProbeOutcome;
use crate::targets::OriginTarget;
use chrono::{DateTime, Local, Utc};
use handlebars::Handlebars;
use serde::Serialize;

const ALERT_TEMPLATE: &str = "alert";
const RECOVERY_TEMPLATE: &str = "recovery";

/// 模板上下文数据
#[derive(Debug, Clone, Serialize)]
pub struct TemplateContext {
    /// 目标名称
    pub name: String,
    /// 域名
    pub domain: String,
    /// 源站IP
    pub origin_ip: String,
    /// 端口
    pub port: u16,
    /// 失败原因或状态描述
    pub reason: String,
    /// HTTP状态码
    pub status_code: Option<u16>,
    /// 响应时间（毫秒）
    pub latency: u64,
    /// 连续失败次数
    pub consecutive_failures: u32,
    /// 时间（本地时间）
    pub timestamp: String,
}

impl TemplateContext {
    /// 由目标和探测结果构建
    pub fn from_outcome(
        target: &OriginTarget,
        outcome: &ProbeOutcome,
        consecutive_failures: u32,
    ) -> Self {
        Self {
            name: target.name.clone(),
            domain: target.domain.clone(),
            origin_ip: target.origin_ip.to_string(),
            port: target.port,
            reason: outcome.reason(),
            status_code: outcome.status_code,
            latency: outcome.latency_ms(),
            consecutive_failures,
            timestamp: format_timestamp(outcome.timestamp),
        }
    }
}

/// 格式化为本地时间
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// 消息渲染器
pub struct MessageRenderer {
    registry: Handlebars<'static>,
}

impl MessageRenderer {
    /// 创建渲染器
    ///
    /// # 参数
    /// * `alert_template` - 自定义告警模板，None 时使用默认模板
    /// * `recovery_template` - 自定义恢复模板，None 时使用默认模板
    ///
    /// # 返回
    /// * 模板语法错误时返回 `DispatchError::Template`
    pub fn new(
        alert_template: Option<&str>,
        recovery_template: Option<&str>,
    ) -> Result<Self, DispatchError> {
        let mut registry = Handlebars::new();
        // 纯文本消息，不做 HTML 转义
        registry.register_escape_fn(handlebars::no_escape);

        registry
            .register_template_string(
                ALERT_TEMPLATE,
                alert_template.unwrap_or(DEFAULT_ALERT_TEMPLATE),
            )
            .map_err(|e| DispatchError::Template(format!("告警模板: {e}")))?;
        registry
            .register_template_string(
                RECOVERY_TEMPLATE,
                recovery_template.unwrap_or(DEFAULT_RECOVERY_TEMPLATE),
            )
            .map_err(|e| DispatchError::Template(format!("恢复模板: {e}")))?;

        Ok(Self { registry })
    }

    /// 渲染消息
    pub fn render(
        &self,
        kind: NoticeKind,
        context: &TemplateContext,
    ) -> Result<String, DispatchError> {
        let name = match kind {
            NoticeKind::Recovery => RECOVERY_TEMPLATE,
            NoticeKind::Alert | NoticeKind::Test => ALERT_TEMPLATE,
        };
        self.registry
            .render(name, context)
            .map(|s| s.trim().to_string())
            .map_err(|e| DispatchError::Template(e.to_string()))
    }
}

/// 默认的告警消息模板
pub const DEFAULT_ALERT_TEMPLATE: &str = "🚨【源站直连异常】 | 名称: {{name}} | 域名: {{domain}} | IP: {{origin_ip}}:{{port}} | 原因: {{reason}} | 响应时间: {{latency}}ms | 连续异常: {{consecutive_failures}}次 | 时间: {{timestamp}}";

/// 默认的恢复消息模板
pub const DEFAULT_RECOVERY_TEMPLATE: &str = "✅【源站已恢复】 | 名称: {{name}} | 域名: {{domain}} | IP: {{origin_ip}}:{{port}} | {{#if status_code}}状态码: {{status_code}} | {{/if}}响应时间: {{latency}}ms | 时间: {{timestamp}}";

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> TemplateContext {
        TemplateContext {
            name: "api".to_string(),
            domain: "example.com".to_string(),
            origin_ip: "203.0.113.5".to_string(),
            port: 443,
            reason: "timeout: Request timeout".to_string(),
            status_code: None,
            latency: 5003,
            consecutive_failures: 3,
            timestamp: "2026-01-01 12:00:00".to_string(),
        }
    }

    #[test]
    fn test_default_alert_template() {
        let renderer = MessageRenderer::new(None, None).unwrap();
        let message = renderer.render(NoticeKind::Alert, &context()).unwrap();

        assert!(message.starts_with("🚨"));
        assert!(message.contains("名称: api"));
        assert!(message.contains("IP: 203.0.113.5:443"));
        assert!(message.contains("原因: timeout: Request timeout"));
        assert!(message.contains("连续异常: 3次"));
    }

    #[test]
    fn test_default_recovery_template_optional_status() {
        let renderer = MessageRenderer::new(None, None).unwrap();

        let without = renderer.render(NoticeKind::Recovery, &context()).unwrap();
        assert!(!without.contains("状态码"));

        let mut ctx = context();
        ctx.status_code = Some(200);
        let with = renderer.render(NoticeKind::Recovery, &ctx).unwrap();
        assert!(with.contains("状态码: 200"));
    }

    #[test]
    fn test_custom_template_is_not_html_escaped() {
        let renderer =
            MessageRenderer::new(Some("{{name}} <{{domain}}> & {{reason}}"), None).unwrap();
        let mut ctx = context();
        ctx.reason = "a<b>&'c'".to_string();

        let message = renderer.render(NoticeKind::Alert, &ctx).unwrap();
        assert_eq!(message, "api <example.com> & a<b>&'c'");
    }

    #[test]
    fn test_invalid_template_is_rejected() {
        let result = MessageRenderer::new(Some("{{#if name}}unclosed"), None);
        assert!(matches!(result, Err(DispatchError::Template(_))));
    }
}
