//! Origin Vitals - 源站直连与国内可达性探测工具
//!
//! 由外部调度器周期调用的单次探测程序，包含两个检测引擎：
//! - origin-monitor: 绕过 DNS/CDN 直连源站IP，按连续失败次数告警和恢复
//! - cn-check: 对比直连与代理的可达性，输出结构化结果并可推送到收集端
//!
//! 跨运行的状态只有源站监控的一个小状态文件。

pub mod cli;
pub mod cn;
pub mod config;
pub mod error;
pub mod logging;
pub mod notification;
pub mod probe;
pub mod runner;
pub mod state;
pub mod targets;

// 重新导出主要类型
pub use config::Config;
pub use error::OpsError;
pub use runner::{CnCheck, OriginMonitor, RunOutcome, RunSummary};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
