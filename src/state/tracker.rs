//! 失败状态机
//!
//! 每个目标两个状态：`ok`（初始）和 `alerting`。
//! 连续失败次数达到阈值时进入 `alerting` 并产生一次 `alert` 事件，
//! 之后首次成功回到 `ok` 并产生一次 `recovered` 事件。
//! 两种事件对同一目标严格交替出现。

use crate::error::StateError;
use crate::state::store::{StateChange, StateStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// 告警状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    #[default]
    Ok,
    Alerting,
}

impl fmt::Display for AlertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertState::Ok => write!(f, "ok"),
            AlertState::Alerting => write!(f, "alerting"),
        }
    }
}

/// 状态切换事件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertEvent {
    /// 进入告警
    Alert,
    /// 告警恢复
    Recovered,
}

impl fmt::Display for AlertEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertEvent::Alert => write!(f, "alert"),
            AlertEvent::Recovered => write!(f, "recovered"),
        }
    }
}

/// 单个目标的持久化状态
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TargetState {
    /// 连续失败次数
    #[serde(default)]
    pub consecutive_failures: u32,
    /// 当前告警状态
    #[serde(default)]
    pub alert_state: AlertState,
    /// 最近一次状态切换时间
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition: Option<DateTime<Utc>>,
}

/// 计算下一个状态
///
/// 纯函数，不做任何 IO。
///
/// # 参数
/// * `current` - 当前状态
/// * `success` - 本次探测是否成功
/// * `threshold` - 告警阈值（连续失败次数）
/// * `now` - 切换时间
///
/// # 返回
/// * 新状态以及本次产生的事件（如果有）
pub fn next_state(
    current: &TargetState,
    success: bool,
    threshold: u32,
    now: DateTime<Utc>,
) -> (TargetState, Option<AlertEvent>) {
    match (current.alert_state, success) {
        (AlertState::Ok, false) => {
            let failures = current.consecutive_failures.saturating_add(1);
            if failures >= threshold {
                (
                    TargetState {
                        consecutive_failures: failures,
                        alert_state: AlertState::Alerting,
                        last_transition: Some(now),
                    },
                    Some(AlertEvent::Alert),
                )
            } else {
                (
                    TargetState {
                        consecutive_failures: failures,
                        ..current.clone()
                    },
                    None,
                )
            }
        }
        (AlertState::Alerting, false) => (
            TargetState {
                consecutive_failures: current.consecutive_failures.saturating_add(1),
                ..current.clone()
            },
            None,
        ),
        (AlertState::Ok, true) => (
            TargetState {
                consecutive_failures: 0,
                ..current.clone()
            },
            None,
        ),
        (AlertState::Alerting, true) => (
            TargetState {
                consecutive_failures: 0,
                alert_state: AlertState::Ok,
                last_transition: Some(now),
            },
            Some(AlertEvent::Recovered),
        ),
    }
}

/// 一次记录的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// 目标名称
    pub key: String,
    /// 记录后的状态
    pub state: TargetState,
    /// 产生的事件
    pub event: Option<AlertEvent>,
}

impl Transition {
    fn from_change(key: &str, change: StateChange) -> Self {
        let event = match (change.previous.alert_state, change.current.alert_state) {
            (AlertState::Ok, AlertState::Alerting) => Some(AlertEvent::Alert),
            (AlertState::Alerting, AlertState::Ok) => Some(AlertEvent::Recovered),
            _ => None,
        };
        Self {
            key: key.to_string(),
            state: change.current,
            event,
        }
    }
}

/// 失败状态跟踪器
///
/// 通过 [`StateStore`] 的原子更新应用 [`next_state`]。
#[derive(Clone)]
pub struct FailureStateTracker {
    store: Arc<dyn StateStore>,
    threshold: u32,
}

impl FailureStateTracker {
    /// 创建跟踪器
    pub fn new(store: Arc<dyn StateStore>, threshold: u32) -> Self {
        Self {
            store,
            threshold: threshold.max(1),
        }
    }

    /// 告警阈值
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// 记录一次探测结果
    ///
    /// 文件存储的加锁和读写是阻塞操作，放到阻塞线程池执行。
    pub async fn record(&self, key: &str, success: bool) -> Result<Transition, StateError> {
        let store = Arc::clone(&self.store);
        let threshold = self.threshold;
        let owned_key = key.to_string();

        let change = tokio::task::spawn_blocking(move || {
            store.update(&owned_key, &|current: &TargetState| {
                next_state(current, success, threshold, Utc::now()).0
            })
        })
        .await
        .map_err(|e| StateError::Lock(format!("状态更新任务异常退出: {e}")))??;

        let transition = Transition::from_change(key, change);
        match transition.event {
            Some(AlertEvent::Alert) => info!(
                "目标 {} 连续失败 {} 次，进入告警状态",
                key, transition.state.consecutive_failures
            ),
            Some(AlertEvent::Recovered) => info!("目标 {} 已恢复", key),
            None => debug!(
                "目标 {} 状态: {} (连续失败 {})",
                key, transition.state.alert_state, transition.state.consecutive_failures
            ),
        }
        Ok(transition)
    }
}
