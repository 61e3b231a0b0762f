//! 日志系统模块
//!
//! 单次运行的探测进程只初始化一次日志。默认输出到 stderr，
//! 指定日志文件时完整日志追加写入文件，控制台只保留告警以上级别。

use log::LevelFilter;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use tracing_log::AsTrace;
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter, Layer};

/// 进程内的初始化结果
static INIT_RESULT: OnceLock<Result<(), String>> = OnceLock::new();

/// 日志配置结构
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// 日志级别
    pub level: LevelFilter,
    /// 日志文件路径（可选，追加写入）
    pub file_path: Option<PathBuf>,
    /// 写文件时是否同时输出告警到控制台
    pub console: bool,
    /// 是否使用JSON格式
    pub json_format: bool,
    /// 模块级别日志控制
    pub module_levels: HashMap<String, LevelFilter>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            file_path: None,
            console: true,
            json_format: false,
            module_levels: HashMap::new(),
        }
    }
}

impl LogConfig {
    /// 过滤指令：全局级别在前，模块级别按名称排序
    pub fn directives(&self) -> Vec<String> {
        let mut modules: Vec<_> = self.module_levels.iter().collect();
        modules.sort_by(|a, b| a.0.cmp(b.0));

        std::iter::once(self.level.as_trace().to_string().to_lowercase())
            .chain(
                modules
                    .into_iter()
                    .map(|(module, level)| {
                        format!("{module}={}", level.as_trace().to_string().to_lowercase())
                    }),
            )
            .collect()
    }
}

/// 日志系统句柄
pub struct LoggingSystem {
    config: LogConfig,
}

impl LoggingSystem {
    /// 初始化日志系统
    ///
    /// 进程内只有第一次调用生效，之后的调用返回第一次的结果。
    ///
    /// # 参数
    /// * `config` - 日志配置
    ///
    /// # 返回
    /// * 日志文件无法打开或 subscriber 注册失败时返回错误
    pub fn setup_logging(config: LogConfig) -> anyhow::Result<Self> {
        let result = INIT_RESULT.get_or_init(|| install(&config).map_err(|e| e.to_string()));
        match result {
            Ok(()) => Ok(Self { config }),
            Err(e) => Err(anyhow::anyhow!("日志系统初始化失败: {}", e)),
        }
    }

    /// 当前句柄持有的配置
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// 检查日志系统是否已成功初始化
    pub fn is_initialized() -> bool {
        matches!(INIT_RESULT.get(), Some(Ok(())))
    }
}

fn build_env_filter(config: &LogConfig) -> EnvFilter {
    let mut filter = EnvFilter::from_default_env();
    for directive in config.directives() {
        match directive.parse() {
            Ok(d) => filter = filter.add_directive(d),
            Err(e) => eprintln!("忽略无效的日志指令 {directive}: {e}"),
        }
    }
    filter
}

fn install(config: &LogConfig) -> anyhow::Result<()> {
    let filter = build_env_filter(config);
    let timer = fmt::time::ChronoLocal::rfc_3339();

    let result = match &config.file_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| anyhow::anyhow!("创建日志目录失败: {}", e))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| anyhow::anyhow!("打开日志文件失败 {}: {}", path.display(), e))?;
            let writer = Mutex::new(file);

            let file_layer = if config.json_format {
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_timer(timer.clone())
                    .boxed()
            } else {
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(false)
                    .with_timer(timer.clone())
                    .boxed()
            };

            // cron 邮件只收到告警以上
            let console_layer = config.console.then(|| {
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_timer(timer)
                    .with_filter(tracing_subscriber::filter::LevelFilter::WARN)
            });

            registry()
                .with(filter)
                .with(file_layer)
                .with(console_layer)
                .try_init()
        }
        None => {
            let layer = if config.json_format {
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_timer(timer)
                    .boxed()
            } else {
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_timer(timer)
                    .boxed()
            };
            registry().with(filter).with(layer).try_init()
        }
    };

    // try_init 同时注册 LogTracer，依赖库的 log 记录也进入 tracing
    result.map_err(|e| anyhow::anyhow!("tracing subscriber初始化失败: {}", e))?;
    tracing::debug!("日志配置: {:?}", config);
    Ok(())
}

/// 把配置文件中的日志级别字符串转换为 LevelFilter
pub fn parse_level(level: &str) -> LevelFilter {
    level.parse().unwrap_or(LevelFilter::Info)
}
