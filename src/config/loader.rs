//! 配置加载器实现
//!
//! 提供TOML配置文件解析、环境变量替换和错误处理功能

use crate::config::types::{validate_config, Config};
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::path::Path;

/// 配置加载器trait，定义配置加载接口
#[async_trait]
pub trait ConfigLoader: Send + Sync {
    /// 从文件加载配置
    ///
    /// # 参数
    /// * `path` - 配置文件路径
    ///
    /// # 返回
    /// * `Result<Config>` - 加载的配置或错误
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Config>;

    /// 从字符串加载配置
    async fn load_from_string(&self, content: &str) -> Result<Config>;

    /// 验证配置
    fn validate(&self, config: &Config) -> Result<()>;
}

/// TOML配置加载器实现
#[derive(Debug, Clone)]
pub struct TomlConfigLoader {
    /// 是否启用环境变量替换
    enable_env_substitution: bool,
}

impl TomlConfigLoader {
    /// 创建新的TOML配置加载器
    ///
    /// # 参数
    /// * `enable_env_substitution` - 是否启用 `${VAR}` 环境变量替换
    pub fn new(enable_env_substitution: bool) -> Self {
        Self {
            enable_env_substitution,
        }
    }

    /// 替换字符串中的环境变量
    ///
    /// 注释行中的占位符同样会被替换，缺失的变量直接报错。
    fn substitute_env_vars(&self, content: &str) -> Result<String> {
        if !self.enable_env_substitution {
            return Ok(content.to_string());
        }

        let pattern = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .map_err(|e| ConfigError::ParseError(format!("正则表达式错误: {}", e)))?;

        let mut missing: Option<String> = None;
        let substituted = pattern.replace_all(content, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| {
                missing.get_or_insert_with(|| caps[1].to_string());
                String::new()
            })
        });

        match missing {
            Some(var) => Err(ConfigError::EnvVarError { var }.into()),
            None => Ok(substituted.into_owned()),
        }
    }

    /// 解析TOML内容
    fn parse_toml(&self, content: &str) -> Result<Config> {
        let processed_content = self.substitute_env_vars(content)?;

        let config: Config = toml::from_str(&processed_content)
            .map_err(|e| ConfigError::ParseError(format!("TOML解析失败: {}", e)))?;

        Ok(config)
    }
}

#[async_trait]
impl ConfigLoader for TomlConfigLoader {
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_string_lossy().to_string(),
            }
            .into());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::ParseError(format!("读取文件失败: {}", e)))?;

        let config = self.parse_toml(&content)?;
        self.validate(&config)?;

        tracing::info!("成功加载配置文件: {}", path.display());
        tracing::debug!("配置内容: {:?}", mask_config(&config));

        Ok(config)
    }

    async fn load_from_string(&self, content: &str) -> Result<Config> {
        let config = self.parse_toml(content)?;
        self.validate(&config)?;

        tracing::debug!("成功解析配置字符串");

        Ok(config)
    }

    fn validate(&self, config: &Config) -> Result<()> {
        validate_config(config).map_err(|e| ConfigError::ValidationError(e).into())
    }
}

/// 打码单个敏感值，保留首尾各4个字符
pub fn mask_value(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        return String::new();
    }
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}****{tail}")
}

/// 返回敏感字段已打码的配置副本，用于展示和日志
pub fn mask_config(config: &Config) -> Config {
    let mut masked = config.clone();
    masked.alert.telegram.bot_token = mask_value(&masked.alert.telegram.bot_token);
    masked.cn.proxy_api = masked.cn.proxy_api.as_deref().map(mask_value);
    masked.cn.proxy_url = masked.cn.proxy_url.as_deref().map(mask_value);
    masked
}

/// 获取默认配置文件路径
///
/// 先检测当前目录的 `origin-vitals.toml`，不存在则使用用户配置目录。
pub fn get_default_config_path() -> std::path::PathBuf {
    let local = std::path::Path::new("origin-vitals.toml");
    if local.exists() {
        return local.to_path_buf();
    }
    dirs::config_dir()
        .map(|config_dir| config_dir.join("origin-vitals").join("config.toml"))
        .unwrap_or_else(|| std::path::PathBuf::from("origin-vitals.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AlertMethod;
    use serial_test::serial;
    use std::env;

    const TEST_CONFIG_TOML: &str = r#"
[global]
log_level = "debug"
max_concurrent_checks = 4

[origin]
targets_file = "/tmp/targets.conf"
failure_threshold = 2
default_port = 8443

[alert]
method = "ssh"

[alert.ssh]
host = "relay.example.com"
command = "/opt/notify.sh"

[cn]
proxy_url = "http://10.0.0.1:3128"
"#;

    const TEST_CONFIG_WITH_ENV_VARS: &str = r#"
[alert]
method = "telegram"

[alert.telegram]
bot_token = "${OV_TEST_BOT_TOKEN}"
chat_id = "${OV_TEST_CHAT_ID}"
"#;

    #[tokio::test]
    async fn test_toml_parsing() {
        let loader = TomlConfigLoader::new(false);
        let config = loader.load_from_string(TEST_CONFIG_TOML).await.unwrap();

        assert_eq!(config.global.log_level, "debug");
        assert_eq!(config.global.max_concurrent_checks, 4);
        assert_eq!(config.origin.failure_threshold, 2);
        assert_eq!(config.origin.default_port, 8443);
        assert_eq!(config.origin.default_path, "/");
        assert_eq!(config.alert.method, AlertMethod::Ssh);
        assert_eq!(config.alert.ssh.command, "/opt/notify.sh");
        assert_eq!(config.alert.ssh.timeout_seconds, 15);
    }

    #[tokio::test]
    #[serial]
    async fn test_env_var_substitution() {
        env::set_var("OV_TEST_BOT_TOKEN", "123456:secret-token-value");
        env::set_var("OV_TEST_CHAT_ID", "-1001");

        let loader = TomlConfigLoader::new(true);
        let config = loader
            .load_from_string(TEST_CONFIG_WITH_ENV_VARS)
            .await
            .unwrap();

        assert_eq!(config.alert.telegram.bot_token, "123456:secret-token-value");
        assert_eq!(config.alert.telegram.chat_id, "-1001");

        env::remove_var("OV_TEST_BOT_TOKEN");
        env::remove_var("OV_TEST_CHAT_ID");
    }

    #[tokio::test]
    #[serial]
    async fn test_env_var_substitution_missing_var() {
        env::remove_var("OV_TEST_MISSING_VAR");
        let content = r#"
[cn]
proxy_api = "${OV_TEST_MISSING_VAR}"
"#;

        let loader = TomlConfigLoader::new(true);
        let result = loader.load_from_string(content).await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("OV_TEST_MISSING_VAR"));
    }

    #[tokio::test]
    async fn test_invalid_alert_config_is_rejected() {
        let loader = TomlConfigLoader::new(false);
        let result = loader.load_from_string("[alert]\nmethod = \"ssh\"\n").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let loader = TomlConfigLoader::new(false);
        let result = loader.load_from_file("/nonexistent/origin-vitals.toml").await;
        assert!(matches!(
            result,
            Err(crate::error::OpsError::Config(ConfigError::FileNotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, TEST_CONFIG_TOML).unwrap();

        let loader = TomlConfigLoader::new(false);
        let config = loader.load_from_file(&path).await.unwrap();
        assert_eq!(config.alert.ssh.host, "relay.example.com");
    }

    #[test]
    fn test_substitute_env_vars_disabled() {
        let loader = TomlConfigLoader::new(false);
        let content = "test ${VAR} content";
        let result = loader.substitute_env_vars(content).unwrap();
        assert_eq!(result, content);
    }

    #[test]
    fn test_mask_value() {
        assert_eq!(mask_value(""), "");
        assert_eq!(mask_value("short"), "****");
        assert_eq!(mask_value("123456:ABCDEFGH"), "1234****EFGH");
    }

    #[test]
    fn test_mask_config_hides_secrets() {
        let mut config = Config::default();
        config.alert.telegram.bot_token = "123456789:AAHsecretsecretsecret".to_string();
        config.cn.proxy_api = Some("https://proxy.example.com/get?key=topsecretkey".to_string());

        let masked = mask_config(&config);
        let rendered = toml::to_string(&masked).unwrap();
        assert!(!rendered.contains("secretsecret"));
        assert!(!rendered.contains("topsecretkey"));
        assert!(rendered.contains("****"));
    }

    #[test]
    fn test_get_default_config_path() {
        let path = get_default_config_path();
        assert!(path.to_string_lossy().contains("origin-vitals"));
    }
}
