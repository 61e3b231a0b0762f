//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::cli::args::{
    Args, CnAction, Commands, ConfigAction, OriginAction, OutputFormat, StateAction,
};
use crate::cn::ScpPublisher;
use crate::config::{
    mask_config, validate_cn_config, validate_push_config, Config, ConfigLoader,
    TomlConfigLoader,
};
use crate::error::{ConfigError, OpsError, PublishError, Result};
use crate::notification::{
    format_timestamp, AlertDispatcher, AlertNotice, MessageRenderer, NoticeKind,
    NotificationSender,
};
use crate::runner::{CnCheck, OriginMonitor, RunOutcome, RunSummary};
use crate::state::{FileStateStore, StateStore};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    ///
    /// # 参数
    /// * `args` - 命令行参数
    /// * `config` - 已加载的配置（不需要配置的命令为 None）
    ///
    /// # 返回
    /// * `Result<RunOutcome>` - 运行结果，决定进程退出码
    async fn execute(&self, args: &Args, config: Option<&Config>) -> Result<RunOutcome>;
}

/// 按子命令选择处理器
pub fn command_for(command: &Commands) -> Box<dyn Command> {
    match command {
        Commands::Origin {
            action: OriginAction::Run,
        } => Box::new(OriginRunCommand),
        Commands::Cn {
            action: CnAction::Run(flags),
        } => Box::new(CnRunCommand {
            push_override: flags.override_value(),
        }),
        Commands::Cn {
            action: CnAction::Push { file },
        } => Box::new(CnPushCommand { file: file.clone() }),
        Commands::Config {
            action: ConfigAction::Show { format },
        } => Box::new(ConfigShowCommand { format: *format }),
        Commands::Config {
            action: ConfigAction::Validate,
        } => Box::new(ValidateCommand),
        Commands::State {
            action: StateAction::Show { format },
        } => Box::new(StateShowCommand { format: *format }),
        Commands::TestAlert { message } => Box::new(TestAlertCommand {
            message: message.clone(),
        }),
        Commands::Init { path, force } => Box::new(InitCommand {
            path: path.clone(),
            force: *force,
        }),
        Commands::Version { format } => Box::new(VersionCommand { format: *format }),
    }
}

/// 加载并验证配置文件
pub async fn load_config(args: &Args) -> Result<Config> {
    let loader = TomlConfigLoader::new(true);
    loader.load_from_file(args.get_config_path()).await
}

fn require_config(config: Option<&Config>) -> Result<&Config> {
    config.ok_or_else(|| OpsError::Config(ConfigError::ValidationError("未加载配置".to_string())))
}

fn print_summary(summary: &RunSummary) {
    println!("{summary}");
    for reason in &summary.skip_reasons {
        println!("  跳过: {reason}");
    }
    if let Some(e) = &summary.publish_error {
        println!("  推送失败: {e}");
    }
}

/// 源站检测命令
pub struct OriginRunCommand;

#[async_trait]
impl Command for OriginRunCommand {
    async fn execute(&self, _args: &Args, config: Option<&Config>) -> Result<RunOutcome> {
        let config = require_config(config)?;
        let monitor = OriginMonitor::from_config(config)?;
        let summary = monitor.run().await?;
        print_summary(&summary);
        Ok(summary.outcome())
    }
}

/// cn-check 命令
pub struct CnRunCommand {
    pub push_override: Option<bool>,
}

#[async_trait]
impl Command for CnRunCommand {
    async fn execute(&self, _args: &Args, config: Option<&Config>) -> Result<RunOutcome> {
        let config = require_config(config)?;
        let check = CnCheck::from_config(config)?;
        let summary = check.run(self.push_override).await?;
        print_summary(&summary);
        Ok(summary.outcome())
    }
}

/// 推送已有结果文件
pub struct CnPushCommand {
    pub file: Option<PathBuf>,
}

#[async_trait]
impl Command for CnPushCommand {
    async fn execute(&self, _args: &Args, config: Option<&Config>) -> Result<RunOutcome> {
        let config = require_config(config)?;
        let file = self
            .file
            .clone()
            .unwrap_or_else(|| config.cn.result_file.clone());

        validate_push_config(&config.cn.push).map_err(PublishError::NotConfigured)?;
        match ScpPublisher::new(&config.cn.push).publish(&file).await {
            Ok(()) => {
                println!("✅ 已推送 {}", file.display());
                Ok(RunOutcome::Success)
            }
            Err(PublishError::MissingFile(path)) => {
                error!("要推送的文件不存在: {}", path);
                Ok(RunOutcome::HardFailure)
            }
            Err(e) => {
                error!("推送失败: {}", e);
                println!("❌ 推送失败: {e}");
                Ok(RunOutcome::PartialFailure)
            }
        }
    }
}

/// 显示配置命令
pub struct ConfigShowCommand {
    pub format: OutputFormat,
}

#[async_trait]
impl Command for ConfigShowCommand {
    async fn execute(&self, args: &Args, config: Option<&Config>) -> Result<RunOutcome> {
        let masked = mask_config(require_config(config)?);
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&masked)?),
            OutputFormat::Text => {
                println!("# {}", args.get_config_path().display());
                let text = toml::to_string_pretty(&masked)
                    .map_err(|e| ConfigError::ParseError(e.to_string()))?;
                println!("{text}");
            }
        }
        Ok(RunOutcome::Success)
    }
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args, config: Option<&Config>) -> Result<RunOutcome> {
        let config = require_config(config)?;
        println!("验证配置文件: {}", args.get_config_path().display());
        println!("✓ 配置文件格式和取值有效");

        let mut warnings = 0;

        // 模板语法
        MessageRenderer::new(
            config.alert.alert_template.as_deref(),
            config.alert.recovery_template.as_deref(),
        )?;
        println!("✓ 告警模板可用 (告警方式: {})", config.alert.method);

        warnings += check_file("源站列表", &config.origin.targets_file);
        warnings += check_file("域名列表", &config.cn.domains_file);

        match validate_cn_config(&config.cn) {
            Ok(()) => println!("✓ cn-check 代理来源已配置"),
            Err(e) => {
                println!("⚠ {e}");
                warnings += 1;
            }
        }

        if warnings == 0 {
            Ok(RunOutcome::Success)
        } else {
            println!("共 {warnings} 项警告");
            Ok(RunOutcome::PartialFailure)
        }
    }
}

fn check_file(label: &str, path: &Path) -> usize {
    if path.is_file() {
        println!("✓ {}: {}", label, path.display());
        0
    } else {
        println!("⚠ {}不存在: {}", label, path.display());
        1
    }
}

/// 查看状态命令
pub struct StateShowCommand {
    pub format: OutputFormat,
}

#[async_trait]
impl Command for StateShowCommand {
    async fn execute(&self, _args: &Args, config: Option<&Config>) -> Result<RunOutcome> {
        let config = require_config(config)?;
        let store = FileStateStore::for_origin(&config.global.state_dir);
        let states = store.load_all()?;

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&states)?),
            OutputFormat::Text => {
                println!("状态文件: {}", store.path().display());
                if states.is_empty() {
                    println!("（暂无记录）");
                }
                for (name, state) in &states {
                    let since = state
                        .last_transition
                        .map(format_timestamp)
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{:<24} {:<9} 连续失败={:<4} 最近切换={}",
                        name, state.alert_state, state.consecutive_failures, since
                    );
                }
            }
        }
        Ok(RunOutcome::Success)
    }
}

/// 测试告警命令
pub struct TestAlertCommand {
    pub message: Option<String>,
}

#[async_trait]
impl Command for TestAlertCommand {
    async fn execute(&self, _args: &Args, config: Option<&Config>) -> Result<RunOutcome> {
        let config = require_config(config)?;

        let dispatcher = AlertDispatcher::from_config(&config.alert)?;
        if dispatcher.is_disabled() {
            println!("告警方式为 none，不会发送任何消息");
            return Ok(RunOutcome::Success);
        }
        let message = self.message.clone().unwrap_or_else(|| {
            format!(
                "🧪 {} 告警通道测试 | 通道: {} | 时间: {}",
                crate::APP_NAME,
                dispatcher.channel_name(),
                format_timestamp(chrono::Utc::now())
            )
        });

        println!("📤 通过 {} 发送测试消息...", dispatcher.channel_name());
        let notice = AlertNotice::new(NoticeKind::Test, "test", message);
        match dispatcher.deliver(&notice).await {
            Ok(()) => {
                info!("测试消息发送成功");
                println!("✅ 测试消息发送成功");
                Ok(RunOutcome::Success)
            }
            Err(e) => {
                error!("测试消息发送失败: {}", e);
                println!("❌ 测试消息发送失败: {e}");
                Ok(RunOutcome::PartialFailure)
            }
        }
    }
}

/// 初始化命令
pub struct InitCommand {
    pub path: Option<PathBuf>,
    pub force: bool,
}

#[async_trait]
impl Command for InitCommand {
    async fn execute(&self, args: &Args, _config: Option<&Config>) -> Result<RunOutcome> {
        let path = self.path.clone().unwrap_or_else(|| args.get_config_path());
        self.create_config_file(&path).await
    }
}

impl InitCommand {
    /// 创建配置文件
    async fn create_config_file(&self, config_path: &Path) -> Result<RunOutcome> {
        // 检查文件是否已存在
        if config_path.exists() && !self.force {
            eprintln!("配置文件已存在: {}", config_path.display());
            eprintln!("使用 --force 参数覆盖现有文件");
            return Ok(RunOutcome::PartialFailure);
        }

        // 创建目录（如果不存在）
        if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(config_path, CONFIG_TEMPLATE).await?;

        println!("配置文件已创建: {}", config_path.display());
        println!("请编辑配置文件，填写目标列表路径和告警方式");
        Ok(RunOutcome::Success)
    }
}

/// 配置文件模板
pub const CONFIG_TEMPLATE: &str = include_str!("../../config.example.toml");

/// 版本命令
pub struct VersionCommand {
    pub format: OutputFormat,
}

#[async_trait]
impl Command for VersionCommand {
    async fn execute(&self, _args: &Args, _config: Option<&Config>) -> Result<RunOutcome> {
        match self.format {
            OutputFormat::Json => {
                let version_info = serde_json::json!({
                    "name": crate::APP_NAME,
                    "version": crate::VERSION,
                    "description": crate::APP_DESCRIPTION
                });
                println!("{}", serde_json::to_string_pretty(&version_info)?);
            }
            OutputFormat::Text => {
                println!("{} v{}", crate::APP_NAME, crate::VERSION);
                println!("{}", crate::APP_DESCRIPTION);
            }
        }
        Ok(RunOutcome::Success)
    }
}
