//! 探测结果数据结构
//!
//! 定义单次探测的结果类型和失败原因分类

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// 探测路径
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbePath {
    /// 直连（含指定IP直连源站）
    Direct,
    /// 经上游代理
    Proxy,
}

impl fmt::Display for ProbePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbePath::Direct => write!(f, "direct"),
            ProbePath::Proxy => write!(f, "proxy"),
        }
    }
}

/// 失败原因分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// 超时
    Timeout,
    /// 连接失败（拒绝、重置）
    Connect,
    /// TLS 握手或证书错误
    Tls,
    /// 域名解析失败
    Dns,
    /// 代理不可用（获取失败或代理连接失败）
    Proxy,
    /// 请求构建失败
    Request,
    /// 收到响应但状态码不符合预期
    Status,
    /// 其他
    Other,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Connect => "connect",
            FailureKind::Tls => "tls",
            FailureKind::Dns => "dns",
            FailureKind::Proxy => "proxy",
            FailureKind::Request => "request",
            FailureKind::Status => "status",
            FailureKind::Other => "other",
        };
        write!(f, "{s}")
    }
}

/// 单次探测结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeOutcome {
    /// 探测ID
    pub id: Uuid,
    /// 目标名称或域名
    pub target: String,
    /// 探测路径
    pub path: ProbePath,
    /// 是否成功
    pub success: bool,
    /// HTTP状态码（收到响应时）
    pub status_code: Option<u16>,
    /// 失败原因分类
    pub failure: Option<FailureKind>,
    /// 错误信息
    pub error_message: Option<String>,
    /// 耗时
    #[serde(rename = "latency_ms", with = "duration_serde")]
    pub elapsed: Duration,
    /// 是否超过慢响应阈值（仅提示，不影响成功判定）
    pub slow: bool,
    /// 检测时间戳
    pub timestamp: DateTime<Utc>,
}

impl ProbeOutcome {
    /// 创建成功结果
    pub fn success(target: impl Into<String>, path: ProbePath, status_code: u16) -> Self {
        Self::new(target.into(), path, true).with_status_code(status_code)
    }

    /// 创建失败结果
    pub fn failure(
        target: impl Into<String>,
        path: ProbePath,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        let mut outcome = Self::new(target.into(), path, false);
        outcome.failure = Some(kind);
        outcome.error_message = Some(message.into());
        outcome
    }

    fn new(target: String, path: ProbePath, success: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            path,
            success,
            status_code: None,
            failure: None,
            error_message: None,
            elapsed: Duration::ZERO,
            slow: false,
            timestamp: Utc::now(),
        }
    }

    /// 设置HTTP状态码
    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    /// 设置耗时
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    /// 根据阈值标记慢响应
    pub fn with_slow_threshold(mut self, threshold: Option<Duration>) -> Self {
        self.slow = self.success && threshold.is_some_and(|t| self.elapsed > t);
        self
    }

    /// 耗时（毫秒）
    pub fn latency_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }

    /// 一句话描述失败原因，用于告警消息
    pub fn reason(&self) -> String {
        if self.success {
            return match self.status_code {
                Some(code) => format!("HTTP {code}"),
                None => "ok".to_string(),
            };
        }
        match (&self.failure, &self.error_message) {
            (Some(FailureKind::Status), _) => match self.status_code {
                Some(code) => format!("HTTP {code}"),
                None => "unexpected status".to_string(),
            },
            (Some(kind), Some(msg)) => format!("{kind}: {msg}"),
            (Some(kind), None) => kind.to_string(),
            (None, Some(msg)) => msg.clone(),
            (None, None) => "unknown".to_string(),
        }
    }
}

/// Duration序列化模块
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
