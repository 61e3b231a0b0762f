//! Origin Vitals 主程序入口
//!
//! 由外部调度器（cron / systemd timer）周期调用，每次执行一轮检测后退出

use anyhow::{Context, Result};
use clap::Parser;
use origin_vitals::cli::args::Args;
use origin_vitals::cli::{command_for, load_config};
use origin_vitals::config::Config;
use origin_vitals::logging::{parse_level, LogConfig, LoggingSystem};
use origin_vitals::runner::RunOutcome;
use tracing::{debug, error};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let args = Args::parse();

    // 需要配置的命令先加载配置，日志级别可能来自配置文件
    let config = if args.command.requires_config() {
        match load_config(&args).await {
            Ok(config) => Some(config),
            Err(e) => {
                eprintln!("加载配置失败 ({}): {}", args.get_config_path().display(), e);
                std::process::exit(RunOutcome::HardFailure.exit_code());
            }
        }
    } else {
        None
    };

    // 初始化日志系统
    let log_config = build_log_config(&args, config.as_ref());
    let _logging_system = LoggingSystem::setup_logging(log_config).context("初始化日志系统失败")?;

    debug!("{} v{} 启动", origin_vitals::APP_NAME, origin_vitals::VERSION);

    // 执行命令
    let outcome = match command_for(&args.command)
        .execute(&args, config.as_ref())
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("命令执行失败: {}", e);
            eprintln!("命令执行失败: {e}");
            RunOutcome::HardFailure
        }
    };

    std::process::exit(outcome.exit_code());
}

/// 组合命令行参数和配置文件得到日志配置
fn build_log_config(args: &Args, config: Option<&Config>) -> LogConfig {
    let level = match (args.log_level, config) {
        (Some(level), _) => level.into(),
        (None, Some(config)) => parse_level(&config.global.log_level),
        (None, None) => log::LevelFilter::Info,
    };

    let mut log_config = LogConfig {
        level,
        file_path: args.log_file.clone(),
        console: true,
        json_format: args.json_logs,
        ..Default::default()
    };
    // 第三方库的调试日志太多
    for module in ["hyper", "hyper_util", "reqwest", "rustls", "handlebars"] {
        log_config
            .module_levels
            .insert(module.to_string(), log::LevelFilter::Warn);
    }
    log_config
}
