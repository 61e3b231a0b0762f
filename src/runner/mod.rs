//! 运行编排模块
//!
//! 每次调用执行一轮检测并返回运行摘要

pub mod cn;
pub mod fanout;
pub mod origin;
pub mod summary;

// 重新导出主要类型
pub use cn::CnCheck;
pub use fanout::run_bounded;
pub use origin::OriginMonitor;
pub use summary::{RunOutcome, RunSummary};
