//! 运行摘要

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// 运行结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunOutcome {
    /// 全部正常
    Success,
    /// 有失败，但运行完成
    PartialFailure,
    /// 没有检查任何目标
    HardFailure,
}

impl RunOutcome {
    /// 进程退出码
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Success => 0,
            RunOutcome::PartialFailure => 1,
            RunOutcome::HardFailure => 2,
        }
    }
}

/// 单次运行的摘要
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    /// 完成探测的目标数
    pub checked: usize,
    /// 探测失败数（cn-check 为非 reachable 的域名数）
    pub failures: usize,
    /// 慢响应数
    pub slow: usize,
    /// 预算内未完成的目标数
    pub not_checked: usize,
    /// 新产生的告警
    pub alerts_raised: usize,
    /// 新产生的恢复
    pub alerts_cleared: usize,
    /// 通知发送失败数
    pub dispatch_failures: usize,
    /// 状态存储错误数
    pub state_errors: usize,
    /// 跳过的列表行数
    pub skipped_lines: usize,
    /// 跳过原因
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skip_reasons: Vec<String>,
    /// 分类计数
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub classifications: BTreeMap<String, usize>,
    /// 推送结果，未推送时为 None
    pub published: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_error: Option<String>,
}

impl RunSummary {
    /// 汇总为运行结果
    pub fn outcome(&self) -> RunOutcome {
        if self.checked == 0 {
            return RunOutcome::HardFailure;
        }
        let troubled = self.failures > 0
            || self.not_checked > 0
            || self.dispatch_failures > 0
            || self.state_errors > 0
            || self.skipped_lines > 0
            || self.published == Some(false);
        if troubled {
            RunOutcome::PartialFailure
        } else {
            RunOutcome::Success
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "checked={} failures={} slow={} not_checked={} alerts_raised={} alerts_cleared={} \
             dispatch_failures={} state_errors={} skipped_lines={}",
            self.checked,
            self.failures,
            self.slow,
            self.not_checked,
            self.alerts_raised,
            self.alerts_cleared,
            self.dispatch_failures,
            self.state_errors,
            self.skipped_lines
        )?;
        for (label, count) in &self.classifications {
            write!(f, " {label}={count}")?;
        }
        if let Some(published) = self.published {
            write!(f, " published={published}")?;
        }
        Ok(())
    }
}
