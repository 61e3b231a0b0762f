//! cn-check 编排
//!
//! 加载域名 → 并发对比直连/代理 → 写结果文档 → 按需推送

use crate::cn::{
    write_report, CnReport, CnResult, PathResult, ResultAggregator, SchemeResult, ScpPublisher,
};
use crate::config::{validate_cn_config, validate_push_config, CnConfig, Config, GlobalConfig};
use crate::error::{ConfigError, OpsError, PublishError, Result};
use crate::probe::{HttpProber, Prober, ProxyResolver};
use crate::runner::fanout::run_bounded;
use crate::runner::summary::RunSummary;
use crate::targets::{load_domains, LoadReport};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// cn-check 运行器
pub struct CnCheck {
    cn: CnConfig,
    global: GlobalConfig,
    aggregator: ResultAggregator,
    publisher: ScpPublisher,
}

impl CnCheck {
    /// 按配置创建，必须配置代理来源
    pub fn from_config(config: &Config) -> Result<Self> {
        validate_cn_config(&config.cn).map_err(ConfigError::ValidationError)?;
        let resolver = ProxyResolver::from_config(&config.cn)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        Ok(Self::new(config, Arc::new(HttpProber::new()), resolver))
    }

    /// 使用指定的探测器和代理来源创建
    pub fn new(config: &Config, prober: Arc<dyn Prober>, resolver: ProxyResolver) -> Self {
        let cn = config.cn.clone();
        let aggregator = ResultAggregator::new(
            prober,
            Arc::new(resolver),
            Duration::from_secs(cn.timeout_seconds),
            cn.max_proxy_attempts,
        );
        let publisher = ScpPublisher::new(&cn.push);
        Self {
            cn,
            global: config.global.clone(),
            aggregator,
            publisher,
        }
    }

    /// 替换推送器
    pub fn with_publisher(mut self, publisher: ScpPublisher) -> Self {
        self.publisher = publisher;
        self
    }

    /// 执行一次完整运行
    ///
    /// # 参数
    /// * `push_override` - 覆盖配置中的推送开关
    pub async fn run(&self, push_override: Option<bool>) -> Result<RunSummary> {
        let path = &self.cn.domains_file;
        let report = load_domains(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => OpsError::Config(ConfigError::FileNotFound {
                path: path.display().to_string(),
            }),
            _ => OpsError::Io(e),
        })?;

        info!(
            "开始国内检测: domains={} skipped={}",
            report.records.len(),
            report.skipped.len()
        );

        let (document, mut summary) = self.check_domains(report).await;
        let Some(document) = document else {
            error!("没有可检测的域名");
            return Ok(summary);
        };

        write_report(&self.cn.result_file, &document).await?;
        info!("结果已写入 {}", self.cn.result_file.display());

        if push_override.unwrap_or(self.cn.push.enabled) {
            match self.publish(&self.cn.result_file).await {
                Ok(()) => summary.published = Some(true),
                Err(e) => {
                    error!("结果推送失败: {}", e);
                    summary.published = Some(false);
                    summary.publish_error = Some(e.to_string());
                }
            }
        }

        info!("国内检测完成: {}", summary);
        Ok(summary)
    }

    /// 检查已加载的域名，没有任何有效域名时不生成文档
    pub async fn check_domains(
        &self,
        report: LoadReport<String>,
    ) -> (Option<CnReport>, RunSummary) {
        let mut summary = RunSummary {
            skipped_lines: report.skipped.len(),
            skip_reasons: report.skipped.iter().map(|e| e.to_string()).collect(),
            ..Default::default()
        };

        let domains = report.records;
        if domains.is_empty() {
            return (None, summary);
        }

        let aggregator = self.aggregator.clone();
        let outcomes = run_bounded(
            domains.clone(),
            self.global.max_concurrent_checks,
            Duration::from_secs(self.global.run_timeout_seconds),
            move |domain| {
                let aggregator = aggregator.clone();
                async move { aggregator.check_domain(&domain).await }
            },
        )
        .await;

        let mut results: Vec<CnResult> = Vec::with_capacity(domains.len());
        for (domain, outcome) in domains.iter().zip(outcomes) {
            match outcome {
                Some(result) => {
                    info!(
                        "{} | direct={} proxy={} | {}",
                        domain,
                        path_label(&result.direct),
                        path_label(&result.proxy),
                        result.classification
                    );
                    if result.direct.https_blocked() {
                        warn!("{} | 直连 HTTPS 受阻，HTTP 正常", domain);
                    }
                    results.push(result);
                }
                None => {
                    warn!("{} | NOT_CHECKED | 运行预算内未完成", domain);
                    summary.not_checked += 1;
                }
            }
        }

        let document = CnReport::new(results);
        summary.checked = document.results.len();
        summary.failures = document
            .results
            .iter()
            .filter(|r| !r.direct.success || !r.proxy.success)
            .count();
        summary.classifications = document
            .counts()
            .into_iter()
            .map(|(label, count)| (label.to_string(), count))
            .collect();

        (Some(document), summary)
    }

    /// 推送结果文档
    pub async fn publish(&self, file: &Path) -> std::result::Result<(), PublishError> {
        validate_push_config(&self.cn.push).map_err(PublishError::NotConfigured)?;
        self.publisher.publish(file).await
    }
}

fn path_label(path: &PathResult) -> String {
    format!(
        "{}(https={} http={})",
        if path.success { "ok" } else { "fail" },
        scheme_label(&path.https),
        scheme_label(&path.http)
    )
}

fn scheme_label(result: &SchemeResult) -> String {
    match result.status_code {
        Some(code) => code.to_string(),
        None if result.success => "ok".to_string(),
        None => "000".to_string(),
    }
}
