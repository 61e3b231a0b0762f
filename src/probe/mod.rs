//! 探测模块
//!
//! 提供单次限时HTTP探测、结果类型和上游代理获取

pub mod checker;
pub mod proxy;
pub mod result;

// 重新导出主要类型
pub use checker::{HttpProber, ProbeRequest, ProbeRoute, Prober, StatusExpectation};
pub use proxy::{normalize_proxy_line, ProxyResolver};
pub use result::{FailureKind, ProbeOutcome, ProbePath};
