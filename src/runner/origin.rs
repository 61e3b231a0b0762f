//! 源站监控编排
//!
//! 加载目标 → 并发探测 → 更新状态机 → 发送告警/恢复通知

use crate::config::{Config, GlobalConfig, OriginConfig};
use crate::error::{ConfigError, OpsError, Result};
use crate::notification::{
    AlertDispatcher, AlertNotice, MessageRenderer, NoticeKind, NotificationSender,
    TemplateContext,
};
use crate::probe::{HttpProber, ProbeOutcome, ProbeRequest, Prober};
use crate::runner::fanout::run_bounded;
use crate::runner::summary::RunSummary;
use crate::state::{AlertEvent, FailureStateTracker, FileStateStore, StateStore};
use crate::targets::{load_origin_targets, LoadReport, OriginTarget, TargetDefaults};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// 源站监控器
pub struct OriginMonitor {
    origin: OriginConfig,
    global: GlobalConfig,
    defaults: TargetDefaults,
    prober: Arc<dyn Prober>,
    tracker: FailureStateTracker,
    notifier: Arc<dyn NotificationSender>,
    renderer: MessageRenderer,
}

impl OriginMonitor {
    /// 按配置创建：HTTP探测器、文件状态存储、配置的告警通道
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = Arc::new(FileStateStore::for_origin(&config.global.state_dir));
        let dispatcher = AlertDispatcher::from_config(&config.alert)?;
        info!("源站监控告警通道: {}", dispatcher.channel_name());
        Self::new(config, Arc::new(HttpProber::new()), store, Arc::new(dispatcher))
    }

    /// 使用指定组件创建
    pub fn new(
        config: &Config,
        prober: Arc<dyn Prober>,
        store: Arc<dyn StateStore>,
        notifier: Arc<dyn NotificationSender>,
    ) -> Result<Self> {
        let renderer = MessageRenderer::new(
            config.alert.alert_template.as_deref(),
            config.alert.recovery_template.as_deref(),
        )?;
        let defaults =
            TargetDefaults::try_from(&config.origin).map_err(ConfigError::ValidationError)?;
        Ok(Self {
            origin: config.origin.clone(),
            global: config.global.clone(),
            defaults,
            prober,
            tracker: FailureStateTracker::new(store, config.origin.failure_threshold),
            notifier,
            renderer,
        })
    }

    /// 执行一次完整运行
    pub async fn run(&self) -> Result<RunSummary> {
        let path = &self.origin.targets_file;
        let report = load_origin_targets(path, &self.defaults)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => OpsError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                }),
                _ => OpsError::Io(e),
            })?;

        info!(
            "开始源站检测: targets={} skipped={}",
            report.records.len(),
            report.skipped.len()
        );
        Ok(self.run_targets(report).await)
    }

    /// 对已加载的目标执行探测和状态更新
    pub async fn run_targets(&self, report: LoadReport<OriginTarget>) -> RunSummary {
        let mut summary = RunSummary {
            skipped_lines: report.skipped.len(),
            skip_reasons: report.skipped.iter().map(|e| e.to_string()).collect(),
            ..Default::default()
        };
        for reason in &summary.skip_reasons {
            warn!("跳过目标行 {}", reason);
        }

        let targets = report.records;
        if targets.is_empty() {
            error!("没有可检测的源站目标");
            return summary;
        }

        let timeout = Duration::from_secs(self.origin.timeout_seconds);
        let jobs: Vec<(ProbeRequest, _)> = targets
            .iter()
            .map(|t| {
                ProbeRequest::for_origin(
                    t,
                    timeout,
                    &self.origin.expected_status_codes,
                    self.origin.verify_tls,
                )
            })
            .collect();

        let prober = Arc::clone(&self.prober);
        let outcomes = run_bounded(
            jobs,
            self.global.max_concurrent_checks,
            Duration::from_secs(self.global.run_timeout_seconds),
            move |(request, route)| {
                let prober = Arc::clone(&prober);
                async move { prober.probe(&request, &route).await }
            },
        )
        .await;

        // 状态先于通知提交
        let mut notices = Vec::new();
        for (target, outcome) in targets.iter().zip(outcomes) {
            let Some(outcome) = outcome else {
                warn!("{} | NOT_CHECKED | 运行预算内未完成", target.name);
                summary.not_checked += 1;
                continue;
            };
            summary.checked += 1;
            log_outcome(target, &outcome);

            if !outcome.success {
                summary.failures += 1;
            }
            if outcome.slow {
                summary.slow += 1;
            }

            let transition = match self.tracker.record(&target.name, outcome.success).await {
                Ok(transition) => transition,
                Err(e) => {
                    error!("{} | 状态更新失败: {}", target.name, e);
                    summary.state_errors += 1;
                    continue;
                }
            };

            let kind = match transition.event {
                Some(AlertEvent::Alert) => {
                    summary.alerts_raised += 1;
                    NoticeKind::Alert
                }
                Some(AlertEvent::Recovered) => {
                    summary.alerts_cleared += 1;
                    NoticeKind::Recovery
                }
                None => continue,
            };

            let context = TemplateContext::from_outcome(
                target,
                &outcome,
                transition.state.consecutive_failures,
            );
            match self.renderer.render(kind, &context) {
                Ok(message) => notices.push(AlertNotice::new(kind, &target.name, message)),
                Err(e) => {
                    error!("{} | 消息渲染失败: {}", target.name, e);
                    summary.dispatch_failures += 1;
                }
            }
        }

        summary.dispatch_failures += self.dispatch_all(&notices).await;
        info!("源站检测完成: {}", summary);
        summary
    }

    /// 并发发送通知，返回失败数
    async fn dispatch_all(&self, notices: &[AlertNotice]) -> usize {
        let results = join_all(notices.iter().map(|n| self.notifier.deliver(n))).await;

        let mut failed = 0;
        for (notice, result) in notices.iter().zip(results) {
            match result {
                Ok(()) => info!(
                    "{} | {} 已发送 via {}",
                    notice.target,
                    notice.kind,
                    self.notifier.channel_name()
                ),
                Err(e) => {
                    error!("{} | {} 发送失败: {}", notice.target, notice.kind, e);
                    failed += 1;
                }
            }
        }
        failed
    }
}

fn log_outcome(target: &OriginTarget, outcome: &ProbeOutcome) {
    let code = outcome
        .status_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "000".to_string());
    if outcome.success && outcome.slow {
        warn!(
            "{} | SLOW | code={} time={}ms > {}ms",
            target.name,
            code,
            outcome.latency_ms(),
            target.slow_threshold.as_millis()
        );
    } else if outcome.success {
        info!("{} | OK | code={} time={}ms", target.name, code, outcome.latency_ms());
    } else {
        warn!(
            "{} | FAIL | {} | code={} time={}ms",
            target.name,
            outcome.reason(),
            code,
            outcome.latency_ms()
        );
    }
}
