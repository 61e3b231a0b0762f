//! 状态模块
//!
//! 源站监控的跨运行状态：连续失败计数和告警状态

pub mod store;
pub mod tracker;

// 重新导出主要类型
pub use store::{FileStateStore, MemoryStateStore, StateChange, StateStore};
pub use tracker::{next_state, AlertEvent, AlertState, FailureStateTracker, TargetState, Transition};
