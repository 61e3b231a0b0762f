//! 命令行参数定义
//!
//! 使用clap定义应用程序的命令行接口

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Origin Vitals - 源站直连与国内可达性探测
#[derive(Parser, Debug, Clone)]
#[command(
    name = "origin-vitals",
    version = crate::VERSION,
    about = crate::APP_DESCRIPTION,
    long_about = None
)]
pub struct Args {
    /// 配置文件路径
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "配置文件路径",
        env = "ORIGIN_VITALS_CONFIG",
        global = true
    )]
    pub config: Option<PathBuf>,

    /// 日志级别，未指定时使用配置文件中的 global.log_level
    #[arg(
        short,
        long,
        value_enum,
        help = "日志级别",
        env = "ORIGIN_VITALS_LOG_LEVEL",
        global = true
    )]
    pub log_level: Option<LogLevel>,

    /// 日志文件（追加写入）
    #[arg(
        long,
        value_name = "FILE",
        help = "日志文件路径",
        env = "ORIGIN_VITALS_LOG_FILE",
        global = true
    )]
    pub log_file: Option<PathBuf>,

    /// JSON格式日志
    #[arg(long, help = "使用JSON格式输出日志", global = true)]
    pub json_logs: bool,

    /// 子命令
    #[command(subcommand)]
    pub command: Commands,
}

/// 日志级别枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum LogLevel {
    /// 跟踪级别
    Trace,
    /// 调试级别
    Debug,
    /// 信息级别
    Info,
    /// 警告级别
    Warn,
    /// 错误级别
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

/// 子命令定义
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// 源站直连检测
    Origin {
        #[command(subcommand)]
        action: OriginAction,
    },

    /// 国内可达性检测
    Cn {
        #[command(subcommand)]
        action: CnAction,
    },

    /// 配置管理
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// 查看源站状态存储
    State {
        #[command(subcommand)]
        action: StateAction,
    },

    /// 通过已配置的告警通道发送测试消息
    TestAlert {
        /// 自定义消息内容
        #[arg(short, long, help = "测试消息内容")]
        message: Option<String>,
    },

    /// 生成配置文件模板
    Init {
        /// 输出路径，默认使用 --config 或默认配置路径
        #[arg(value_name = "FILE", help = "配置文件输出路径")]
        path: Option<PathBuf>,

        /// 覆盖已存在的文件
        #[arg(short, long, help = "覆盖已存在的配置文件")]
        force: bool,
    },

    /// 显示版本信息
    Version {
        /// 输出格式
        #[arg(long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },
}

/// 源站检测子命令
#[derive(Subcommand, Debug, Clone)]
pub enum OriginAction {
    /// 执行一轮检测
    Run,
}

/// cn-check 子命令
#[derive(Subcommand, Debug, Clone)]
pub enum CnAction {
    /// 执行一轮检测
    Run(PushFlags),

    /// 推送已有的结果文件
    Push {
        /// 结果文件，默认使用 cn.result_file
        #[arg(long, value_name = "FILE", help = "要推送的结果文件")]
        file: Option<PathBuf>,
    },
}

/// 推送开关覆盖
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct PushFlags {
    /// 本次强制推送
    #[arg(long, help = "检测完成后推送结果", conflicts_with = "no_push")]
    pub push: bool,

    /// 本次不推送
    #[arg(long, help = "检测完成后不推送结果")]
    pub no_push: bool,
}

impl PushFlags {
    /// 覆盖值，未指定时为 None
    pub fn override_value(&self) -> Option<bool> {
        match (self.push, self.no_push) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

/// 配置子命令
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// 显示生效配置（敏感字段打码）
    Show {
        /// 输出格式
        #[arg(long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 验证配置文件
    Validate,
}

/// 状态子命令
#[derive(Subcommand, Debug, Clone)]
pub enum StateAction {
    /// 显示所有目标的状态
    Show {
        /// 输出格式
        #[arg(long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },
}

/// 输出格式枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum OutputFormat {
    /// 文本格式
    Text,
    /// JSON格式
    Json,
}

impl Commands {
    /// 是否需要加载配置文件
    pub fn requires_config(&self) -> bool {
        !matches!(self, Commands::Init { .. } | Commands::Version { .. })
    }
}

impl Args {
    /// 获取配置文件路径
    pub fn get_config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::get_default_config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origin_run() {
        let args = Args::try_parse_from(["origin-vitals", "origin", "run"]).unwrap();
        assert!(matches!(
            args.command,
            Commands::Origin {
                action: OriginAction::Run
            }
        ));
        assert!(args.command.requires_config());
    }

    #[test]
    fn test_parse_push_flags() {
        let args = Args::try_parse_from(["origin-vitals", "cn", "run", "--no-push"]).unwrap();
        match args.command {
            Commands::Cn {
                action: CnAction::Run(flags),
            } => assert_eq!(flags.override_value(), Some(false)),
            other => panic!("unexpected command: {other:?}"),
        }

        let args = Args::try_parse_from(["origin-vitals", "cn", "run"]).unwrap();
        match args.command {
            Commands::Cn {
                action: CnAction::Run(flags),
            } => assert_eq!(flags.override_value(), None),
            other => panic!("unexpected command: {other:?}"),
        }

        assert!(
            Args::try_parse_from(["origin-vitals", "cn", "run", "--push", "--no-push"]).is_err()
        );
    }

    #[test]
    fn test_global_config_flag_after_subcommand() {
        let args = Args::try_parse_from([
            "origin-vitals",
            "state",
            "show",
            "--config",
            "/tmp/ov.toml",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(args.get_config_path(), PathBuf::from("/tmp/ov.toml"));
        match args.command {
            Commands::State {
                action: StateAction::Show { format },
            } => assert_eq!(format, OutputFormat::Json),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_init_and_version_skip_config() {
        let args = Args::try_parse_from(["origin-vitals", "init", "--force"]).unwrap();
        assert!(!args.command.requires_config());

        let args = Args::try_parse_from(["origin-vitals", "version"]).unwrap();
        assert!(!args.command.requires_config());
    }
}
