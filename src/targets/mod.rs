//! 目标列表模块
//!
//! 解析源站目标列表和域名列表文件

pub mod loader;

// 重新导出主要类型
pub use loader::{
    load_domains, load_origin_targets, parse_domains, parse_origin_targets, slow_threshold,
    LoadReport, OriginTarget, TargetDefaults,
};
