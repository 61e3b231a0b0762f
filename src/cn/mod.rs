//! cn-check 模块
//!
//! 直连与代理可达性对比、结果文档和推送

pub mod aggregator;
pub mod publisher;

// 重新导出主要类型
pub use aggregator::{
    classify, write_report, Classification, CnReport, CnResult, PathResult, ResultAggregator,
    SchemeResult,
};
pub use publisher::ScpPublisher;
