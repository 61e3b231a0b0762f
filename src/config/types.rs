//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体和验证逻辑

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// 主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// 全局配置项
    #[serde(default)]
    pub global: GlobalConfig,
    /// 源站直连监控配置
    #[serde(default)]
    pub origin: OriginConfig,
    /// 告警通道配置
    #[serde(default)]
    pub alert: AlertConfig,
    /// 国内/代理对比检测配置
    #[serde(default)]
    pub cn: CnConfig,
}

/// 全局配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 状态目录（失败计数等）
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// 最大并发探测数
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_checks: usize,
    /// 单次运行的总时间预算（秒）
    #[serde(default = "default_run_timeout")]
    pub run_timeout_seconds: u64,
}

/// 源站监控配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OriginConfig {
    /// 目标列表文件
    #[serde(default = "default_targets_file")]
    pub targets_file: PathBuf,
    /// 单次探测超时（秒）
    #[serde(default = "default_origin_timeout")]
    pub timeout_seconds: u64,
    /// 连续失败多少次后告警
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// 视为正常的状态码
    #[serde(default = "default_expected_codes")]
    pub expected_status_codes: Vec<u16>,
    /// 默认端口
    #[serde(default = "default_port")]
    pub default_port: u16,
    /// 默认路径
    #[serde(default = "default_path")]
    pub default_path: String,
    /// 默认协议
    #[serde(default = "default_scheme")]
    pub default_scheme: String,
    /// 默认慢响应阈值（秒）
    #[serde(default = "default_slow_seconds")]
    pub default_slow_seconds: f64,
    /// 是否校验证书
    #[serde(default)]
    pub verify_tls: bool,
}

/// 告警方式
///
/// 反序列化走 [`FromStr`]，接受 `tg`、`off`、`false`、`0` 等别名。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum AlertMethod {
    /// 不发送
    #[default]
    None,
    /// 通过 ssh 在中转机上执行命令
    Ssh,
    /// 直接调用 Telegram Bot API
    Telegram,
}

impl fmt::Display for AlertMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertMethod::None => write!(f, "none"),
            AlertMethod::Ssh => write!(f, "ssh"),
            AlertMethod::Telegram => write!(f, "telegram"),
        }
    }
}

impl FromStr for AlertMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" | "off" | "false" | "0" => Ok(AlertMethod::None),
            "ssh" => Ok(AlertMethod::Ssh),
            "telegram" | "tg" => Ok(AlertMethod::Telegram),
            other => Err(format!("未知的告警方式: {other}")),
        }
    }
}

impl TryFrom<String> for AlertMethod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// 告警配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AlertConfig {
    /// 告警方式
    #[serde(default)]
    pub method: AlertMethod,
    /// 自定义告警模板（Handlebars）
    pub alert_template: Option<String>,
    /// 自定义恢复模板（Handlebars）
    pub recovery_template: Option<String>,
    /// ssh 中转配置
    #[serde(default)]
    pub ssh: SshRelayConfig,
    /// Telegram 配置
    #[serde(default)]
    pub telegram: TelegramConfig,
}

/// ssh 中转配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SshRelayConfig {
    /// 中转机地址（可带 user@）
    #[serde(default)]
    pub host: String,
    /// 中转机上执行的命令，消息作为最后一个参数
    #[serde(default = "default_relay_command")]
    pub command: String,
    /// 私钥路径
    pub key_file: Option<PathBuf>,
    /// 额外的 ssh 参数
    #[serde(default = "default_ssh_options")]
    pub options: Vec<String>,
    /// 超时（秒）
    #[serde(default = "default_ssh_timeout")]
    pub timeout_seconds: u64,
}

/// Telegram 配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelegramConfig {
    /// Bot token
    #[serde(default)]
    pub bot_token: String,
    /// 聊天ID
    #[serde(default)]
    pub chat_id: String,
    /// API 地址
    #[serde(default = "default_telegram_api")]
    pub api_base: String,
    /// 超时（秒）
    #[serde(default = "default_telegram_timeout")]
    pub timeout_seconds: u64,
}

/// 国内/代理对比检测配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CnConfig {
    /// 域名列表文件
    #[serde(default = "default_domains_file")]
    pub domains_file: PathBuf,
    /// 结果文件
    #[serde(default = "default_result_file")]
    pub result_file: PathBuf,
    /// 单次探测超时（秒）
    #[serde(default = "default_cn_timeout")]
    pub timeout_seconds: u64,
    /// 代理提取 API
    pub proxy_api: Option<String>,
    /// 固定代理地址
    pub proxy_url: Option<String>,
    /// 代理探测最多尝试次数（每次重新获取代理）
    #[serde(default = "default_proxy_attempts")]
    pub max_proxy_attempts: u32,
    /// 结果推送配置
    #[serde(default)]
    pub push: PushConfig,
}

/// 结果推送配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushConfig {
    /// 是否启用
    #[serde(default)]
    pub enabled: bool,
    /// 远端用户
    #[serde(default = "default_push_user")]
    pub user: String,
    /// 远端主机
    #[serde(default)]
    pub host: String,
    /// 远端目录
    #[serde(default = "default_push_dir")]
    pub remote_dir: String,
    /// 私钥路径
    pub key_file: Option<PathBuf>,
    /// 额外的 scp 参数
    #[serde(default = "default_ssh_options")]
    pub options: Vec<String>,
    /// 超时（秒）
    #[serde(default = "default_push_timeout")]
    pub timeout_seconds: u64,
}

// 默认值函数
fn default_log_level() -> String {
    "info".to_string()
}
fn default_state_dir() -> PathBuf {
    PathBuf::from("/var/lib/origin-vitals")
}
fn default_max_concurrent() -> usize {
    16
}
fn default_run_timeout() -> u64 {
    240
}
fn default_targets_file() -> PathBuf {
    PathBuf::from("/etc/origin-vitals/origin_targets.conf")
}
fn default_origin_timeout() -> u64 {
    5
}
fn default_failure_threshold() -> u32 {
    3
}
fn default_expected_codes() -> Vec<u16> {
    vec![200]
}
fn default_port() -> u16 {
    443
}
fn default_path() -> String {
    "/".to_string()
}
fn default_scheme() -> String {
    "https".to_string()
}
fn default_slow_seconds() -> f64 {
    5.0
}
fn default_relay_command() -> String {
    "/opt/telegram_send.sh".to_string()
}
fn default_ssh_options() -> Vec<String> {
    vec![
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-o".to_string(),
        "ConnectTimeout=5".to_string(),
    ]
}
fn default_ssh_timeout() -> u64 {
    15
}
fn default_telegram_api() -> String {
    "https://api.telegram.org".to_string()
}
fn default_telegram_timeout() -> u64 {
    10
}
fn default_domains_file() -> PathBuf {
    PathBuf::from("/etc/origin-vitals/domains.txt")
}
fn default_result_file() -> PathBuf {
    PathBuf::from("/var/lib/origin-vitals/result_cn.json")
}
fn default_cn_timeout() -> u64 {
    8
}
fn default_proxy_attempts() -> u32 {
    2
}
fn default_push_user() -> String {
    "root".to_string()
}
fn default_push_dir() -> String {
    "/opt/origin-vitals/results".to_string()
}
fn default_push_timeout() -> u64 {
    60
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            state_dir: default_state_dir(),
            max_concurrent_checks: default_max_concurrent(),
            run_timeout_seconds: default_run_timeout(),
        }
    }
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            targets_file: default_targets_file(),
            timeout_seconds: default_origin_timeout(),
            failure_threshold: default_failure_threshold(),
            expected_status_codes: default_expected_codes(),
            default_port: default_port(),
            default_path: default_path(),
            default_scheme: default_scheme(),
            default_slow_seconds: default_slow_seconds(),
            verify_tls: false,
        }
    }
}

impl Default for SshRelayConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            command: default_relay_command(),
            key_file: None,
            options: default_ssh_options(),
            timeout_seconds: default_ssh_timeout(),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            api_base: default_telegram_api(),
            timeout_seconds: default_telegram_timeout(),
        }
    }
}

impl Default for CnConfig {
    fn default() -> Self {
        Self {
            domains_file: default_domains_file(),
            result_file: default_result_file(),
            timeout_seconds: default_cn_timeout(),
            proxy_api: None,
            proxy_url: None,
            max_proxy_attempts: default_proxy_attempts(),
            push: PushConfig::default(),
        }
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            user: default_push_user(),
            host: String::new(),
            remote_dir: default_push_dir(),
            key_file: None,
            options: default_ssh_options(),
            timeout_seconds: default_push_timeout(),
        }
    }
}

impl CnConfig {
    /// 是否配置了任一代理来源
    pub fn has_proxy_source(&self) -> bool {
        let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        filled(&self.proxy_api) || filled(&self.proxy_url)
    }
}

fn is_valid_scheme(scheme: &str) -> bool {
    matches!(scheme, "http" | "https")
}

/// 配置验证函数
///
/// 只检查所有命令共用的部分以及已选择的告警方式、已启用的推送。
/// cn-check 专属的要求见 [`validate_cn_config`]。
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    // 验证全局配置
    if config.global.max_concurrent_checks == 0 {
        return Err("最大并发探测数不能为0".to_string());
    }

    if config.global.run_timeout_seconds == 0 {
        return Err("运行总时间预算不能为0".to_string());
    }

    let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&config.global.log_level.as_str()) {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            config.global.log_level, valid_log_levels
        ));
    }

    // 验证源站配置
    let origin = &config.origin;
    if origin.timeout_seconds == 0 {
        return Err("源站探测超时不能为0".to_string());
    }
    if origin.failure_threshold == 0 {
        return Err("失败阈值不能为0".to_string());
    }
    if origin.expected_status_codes.is_empty() {
        return Err("必须指定期望的状态码".to_string());
    }
    for &code in &origin.expected_status_codes {
        if !(100..=599).contains(&code) {
            return Err(format!("状态码 {code} 无效"));
        }
    }
    if origin.default_port == 0 {
        return Err("默认端口不能为0".to_string());
    }
    if !is_valid_scheme(&origin.default_scheme.to_lowercase()) {
        return Err(format!("无效的默认协议: {}", origin.default_scheme));
    }
    if crate::targets::slow_threshold(origin.default_slow_seconds).is_none() {
        return Err(format!(
            "默认慢响应阈值无效: {}",
            origin.default_slow_seconds
        ));
    }

    // 验证已选择的告警方式
    match config.alert.method {
        AlertMethod::None => {}
        AlertMethod::Ssh => {
            let ssh = &config.alert.ssh;
            if ssh.host.trim().is_empty() || ssh.command.trim().is_empty() {
                return Err("告警方式为 ssh 时必须配置 alert.ssh.host 和 alert.ssh.command".to_string());
            }
            if ssh.timeout_seconds == 0 {
                return Err("ssh 超时不能为0".to_string());
            }
        }
        AlertMethod::Telegram => {
            let tg = &config.alert.telegram;
            if tg.bot_token.trim().is_empty() || tg.chat_id.trim().is_empty() {
                return Err(
                    "告警方式为 telegram 时必须配置 alert.telegram.bot_token 和 alert.telegram.chat_id"
                        .to_string(),
                );
            }
            if tg.timeout_seconds == 0 {
                return Err("Telegram 超时不能为0".to_string());
            }
        }
    }

    // 验证 cn 通用项
    let cn = &config.cn;
    if cn.timeout_seconds == 0 {
        return Err("cn 探测超时不能为0".to_string());
    }
    if cn.max_proxy_attempts == 0 {
        return Err("代理尝试次数不能为0".to_string());
    }

    // 验证推送配置（如果启用）
    if cn.push.enabled {
        validate_push_config(&cn.push)?;
    }

    Ok(())
}

/// 推送所需字段检查
pub fn validate_push_config(push: &PushConfig) -> Result<(), String> {
    if push.host.trim().is_empty() || push.user.trim().is_empty() || push.remote_dir.trim().is_empty()
    {
        return Err("推送需要配置 cn.push.host、cn.push.user 和 cn.push.remote_dir".to_string());
    }
    if push.timeout_seconds == 0 {
        return Err("推送超时不能为0".to_string());
    }
    Ok(())
}

/// cn-check 运行前的额外检查
pub fn validate_cn_config(cn: &CnConfig) -> Result<(), String> {
    if !cn.has_proxy_source() {
        return Err("cn-check 需要配置 cn.proxy_api 或 cn.proxy_url".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> Config {
        let mut config = Config::default();
        config.global.state_dir = PathBuf::from("/tmp/origin-vitals-test");
        config.cn.proxy_url = Some("http://127.0.0.1:3128".to_string());
        config
    }

    #[test]
    fn test_config_serialization() {
        let config = create_test_config();

        let serialized = toml::to_string(&config).expect("序列化失败");
        assert!(!serialized.is_empty());

        let deserialized: Config = toml::from_str(&serialized).expect("反序列化失败");
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.origin.default_port, 443);
        assert_eq!(config.origin.default_path, "/");
        assert_eq!(config.origin.default_scheme, "https");
        assert_eq!(config.origin.failure_threshold, 3);
        assert_eq!(config.alert.method, AlertMethod::None);
        assert!(!config.cn.push.enabled);
    }

    #[test]
    fn test_config_validation() {
        let config = create_test_config();
        assert!(validate_config(&config).is_ok());
        assert!(validate_cn_config(&config.cn).is_ok());
    }

    #[test]
    fn test_ssh_method_requires_host() {
        let mut config = create_test_config();
        config.alert.method = AlertMethod::Ssh;

        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("alert.ssh.host"));

        config.alert.ssh.host = "relay.example.com".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_telegram_method_requires_token_and_chat() {
        let mut config = create_test_config();
        config.alert.method = AlertMethod::Telegram;
        config.alert.telegram.bot_token = "123:abc".to_string();

        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("chat_id"));

        config.alert.telegram.chat_id = "-100200".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_push_enabled_requires_host() {
        let mut config = create_test_config();
        config.cn.push.enabled = true;

        assert!(validate_config(&config).unwrap_err().contains("cn.push.host"));

        config.cn.push.host = "collector.example.com".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_zero_values_rejected() {
        let mut config = create_test_config();
        config.origin.failure_threshold = 0;
        assert!(validate_config(&config).is_err());

        let mut config = create_test_config();
        config.global.max_concurrent_checks = 0;
        assert!(validate_config(&config).is_err());

        let mut config = create_test_config();
        config.origin.timeout_seconds = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_scheme_rejected() {
        let mut config = create_test_config();
        config.origin.default_scheme = "ftp".to_string();
        assert!(validate_config(&config).unwrap_err().contains("ftp"));
    }

    #[test]
    fn test_cn_requires_proxy_source() {
        let mut cn = CnConfig::default();
        assert!(validate_cn_config(&cn).is_err());

        cn.proxy_api = Some("   ".to_string());
        assert!(validate_cn_config(&cn).is_err());

        cn.proxy_api = Some("https://proxy.example.com/get".to_string());
        assert!(validate_cn_config(&cn).is_ok());
    }

    #[test]
    fn test_alert_method_parsing() {
        assert_eq!("ssh".parse::<AlertMethod>().unwrap(), AlertMethod::Ssh);
        assert_eq!("TG".parse::<AlertMethod>().unwrap(), AlertMethod::Telegram);
        assert_eq!("off".parse::<AlertMethod>().unwrap(), AlertMethod::None);
        assert!("pager".parse::<AlertMethod>().is_err());
    }

    #[test]
    fn test_alert_method_aliases_deserialize() {
        for (raw, expected) in [
            ("tg", AlertMethod::Telegram),
            ("Telegram", AlertMethod::Telegram),
            ("ssh", AlertMethod::Ssh),
            ("off", AlertMethod::None),
            ("false", AlertMethod::None),
            ("0", AlertMethod::None),
            ("", AlertMethod::None),
        ] {
            let config: Config = toml::from_str(&format!("[alert]\nmethod = \"{raw}\"\n")).unwrap();
            assert_eq!(config.alert.method, expected, "method = {raw:?}");
        }
    }

    #[test]
    fn test_alert_method_serializes_canonical_name() {
        let mut config = create_test_config();
        config.alert.method = AlertMethod::Telegram;
        let serialized = toml::to_string(&config).unwrap();
        assert!(serialized.contains("method = \"telegram\""));
    }

    #[test]
    fn test_uppercase_default_scheme_accepted() {
        let mut config = create_test_config();
        config.origin.default_scheme = "HTTPS".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_out_of_range_default_slow_time_rejected() {
        let mut config = create_test_config();
        config.origin.default_slow_seconds = 1e20;
        assert!(validate_config(&config).unwrap_err().contains("慢响应阈值"));

        config.origin.default_slow_seconds = -0.5;
        assert!(validate_config(&config).is_err());

        config.origin.default_slow_seconds = 0.0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_unknown_alert_method_fails_to_deserialize() {
        let result: Result<Config, _> = toml::from_str("[alert]\nmethod = \"pager\"\n");
        assert!(result.is_err());
    }
}
