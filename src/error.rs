//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use thiserror::Error;

/// Origin Vitals 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum OpsError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 列表文件解析错误
    #[error("列表解析错误: {0}")]
    Parse(#[from] ParseError),

    /// 通知相关错误
    #[error("通知错误: {0}")]
    Dispatch(#[from] DispatchError),

    /// 结果推送错误
    #[error("推送错误: {0}")]
    Publish(#[from] PublishError),

    /// 状态存储错误
    #[error("状态存储错误: {0}")]
    State(#[from] StateError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 列表文件中单行的解析错误，携带行号
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("第 {line} 行: {reason}")]
pub struct ParseError {
    /// 行号（从1开始）
    pub line: usize,
    /// 原因
    pub reason: String,
}

impl ParseError {
    pub fn new(line: usize, reason: impl Into<String>) -> Self {
        Self {
            line,
            reason: reason.into(),
        }
    }
}

/// 通知发送错误类型
#[derive(Error, Debug)]
pub enum DispatchError {
    /// 通道无法建立（进程无法启动、网络不可达）
    #[error("通知通道不可用: {0}")]
    Channel(String),

    /// 远端返回失败
    #[error("通知发送失败: {0}")]
    Rejected(String),

    /// 超时
    #[error("通知发送超时 ({0}s)")]
    Timeout(u64),

    /// 模板渲染错误
    #[error("模板渲染失败: {0}")]
    Template(String),
}

/// 结果推送错误类型
#[derive(Error, Debug)]
pub enum PublishError {
    /// 推送配置不完整
    #[error("推送配置不完整: {0}")]
    NotConfigured(String),

    /// 待推送文件不存在
    #[error("待推送文件不存在: {0}")]
    MissingFile(String),

    /// scp 无法启动
    #[error("scp 启动失败: {0}")]
    Spawn(String),

    /// scp 返回非零
    #[error("scp 失败 rc={code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    /// 超时
    #[error("推送超时 ({0}s)")]
    Timeout(u64),
}

/// 代理获取错误类型
#[derive(Error, Debug)]
pub enum ProxyError {
    /// 未配置代理来源
    #[error("未配置代理来源")]
    NotConfigured,

    /// 代理API请求失败
    #[error("代理API请求失败: {0}")]
    Fetch(String),

    /// 代理API返回内容无法识别
    #[error("无法识别的代理地址: {0}")]
    Malformed(String),
}

/// 状态存储错误类型
#[derive(Error, Debug)]
pub enum StateError {
    /// 读写失败
    #[error("状态文件读写失败 {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// 状态文件内容损坏
    #[error("状态文件格式错误 {path}: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// 获取文件锁失败
    #[error("获取状态文件锁失败: {0}")]
    Lock(String),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, OpsError>;
