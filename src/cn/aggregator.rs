//! cn-check 结果聚合
//!
//! 每个域名同时做直连和代理探测，每条路径分别探测 https 和 http，
//! 按两条路径的成败分类，最终按输入顺序写出结果文档。

use crate::probe::{
    FailureKind, ProbeOutcome, ProbePath, ProbeRequest, ProbeRoute, Prober, ProxyResolver,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// 域名可达性分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    /// 直连和代理都正常
    Reachable,
    /// 仅代理可达，直连受阻
    BlockedDirect,
    /// 直连正常，代理异常
    ProxyIssue,
    /// 都不可达
    Unreachable,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Reachable => "reachable",
            Classification::BlockedDirect => "blocked-direct",
            Classification::ProxyIssue => "proxy-issue",
            Classification::Unreachable => "unreachable",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 分类规则，只取决于两条路径是否成功
pub fn classify(direct_ok: bool, proxy_ok: bool) -> Classification {
    match (direct_ok, proxy_ok) {
        (true, true) => Classification::Reachable,
        (false, true) => Classification::BlockedDirect,
        (true, false) => Classification::ProxyIssue,
        (false, false) => Classification::Unreachable,
    }
}

/// 单个协议的探测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemeResult {
    pub success: bool,
    pub status_code: Option<u16>,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ProbeOutcome> for SchemeResult {
    fn from(outcome: &ProbeOutcome) -> Self {
        Self {
            success: outcome.success,
            status_code: outcome.status_code,
            latency_ms: outcome.latency_ms(),
            error_kind: outcome.failure,
            error: outcome.error_message.clone(),
        }
    }
}

/// 单条路径（直连或代理）的结果
///
/// 每条路径都分别探测 https 和 http，任一协议成功即视为该路径可达。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathResult {
    pub success: bool,
    pub https: SchemeResult,
    pub http: SchemeResult,
    /// 尝试次数（代理路径可能重试）
    pub attempts: u32,
}

impl PathResult {
    fn new(https: &ProbeOutcome, http: &ProbeOutcome, attempts: u32) -> Self {
        Self {
            success: https.success || http.success,
            https: https.into(),
            http: http.into(),
            attempts,
        }
    }

    /// http 可达但 https 失败，多见于按 SNI 的拦截
    pub fn https_blocked(&self) -> bool {
        self.http.success && !self.https.success
    }
}

/// 单个域名的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CnResult {
    pub domain: String,
    pub classification: Classification,
    pub direct: PathResult,
    pub proxy: PathResult,
}

/// 结果文档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CnReport {
    pub generated_at: DateTime<Utc>,
    pub results: Vec<CnResult>,
}

impl CnReport {
    pub fn new(results: Vec<CnResult>) -> Self {
        Self {
            generated_at: Utc::now(),
            results,
        }
    }

    /// 各分类计数
    pub fn counts(&self) -> BTreeMap<Classification, usize> {
        let mut counts = BTreeMap::new();
        for result in &self.results {
            *counts.entry(result.classification).or_insert(0) += 1;
        }
        counts
    }
}

/// 同一域名的一对请求
struct SchemePair {
    https: ProbeRequest,
    http: ProbeRequest,
}

/// 聚合器
#[derive(Clone)]
pub struct ResultAggregator {
    prober: Arc<dyn Prober>,
    resolver: Arc<ProxyResolver>,
    timeout: Duration,
    max_proxy_attempts: u32,
}

impl ResultAggregator {
    /// 创建聚合器
    ///
    /// # 参数
    /// * `prober` - 探测器
    /// * `resolver` - 代理来源
    /// * `timeout` - 单次探测超时
    /// * `max_proxy_attempts` - 代理路径最多尝试次数
    pub fn new(
        prober: Arc<dyn Prober>,
        resolver: Arc<ProxyResolver>,
        timeout: Duration,
        max_proxy_attempts: u32,
    ) -> Self {
        Self {
            prober,
            resolver,
            timeout,
            max_proxy_attempts: max_proxy_attempts.max(1),
        }
    }

    /// 检查单个域名：直连和代理并发，每条路径都探测 https 和 http
    pub async fn check_domain(&self, domain: &str) -> CnResult {
        let pair = SchemePair {
            https: ProbeRequest::for_domain(domain, "https", self.timeout),
            http: ProbeRequest::for_domain(domain, "http", self.timeout),
        };

        let (direct, proxy) = tokio::join!(
            self.probe_pair(&pair, &ProbeRoute::Direct, 1),
            self.probe_via_proxy(&pair)
        );

        let classification = classify(direct.success, proxy.success);
        debug!(
            "{}: direct={} proxy={} -> {}",
            domain, direct.success, proxy.success, classification
        );

        CnResult {
            domain: domain.to_string(),
            classification,
            direct,
            proxy,
        }
    }

    async fn probe_pair(
        &self,
        pair: &SchemePair,
        route: &ProbeRoute,
        attempts: u32,
    ) -> PathResult {
        let (https, http) = tokio::join!(
            self.prober.probe(&pair.https, route),
            self.prober.probe(&pair.http, route)
        );
        PathResult::new(&https, &http, attempts)
    }

    /// 代理路径：每次尝试获取新的代理，任一协议成功即停止
    async fn probe_via_proxy(&self, pair: &SchemePair) -> PathResult {
        let label = &pair.https.label;
        let mut last = None;

        for attempt in 1..=self.max_proxy_attempts {
            let result = match self.resolver.acquire().await {
                Ok(url) => {
                    self.probe_pair(pair, &ProbeRoute::Proxy { url }, attempt)
                        .await
                }
                Err(e) => {
                    warn!("{}: 获取代理失败 (第 {} 次): {}", label, attempt, e);
                    let failed = ProbeOutcome::failure(
                        label,
                        ProbePath::Proxy,
                        FailureKind::Proxy,
                        e.to_string(),
                    );
                    PathResult::new(&failed, &failed, attempt)
                }
            };
            if result.success {
                return result;
            }
            last = Some(result);
        }

        last.unwrap_or_else(|| {
            let skipped =
                ProbeOutcome::failure(label, ProbePath::Proxy, FailureKind::Proxy, "未尝试");
            PathResult::new(&skipped, &skipped, 0)
        })
    }
}

/// 原子写出结果文档（临时文件 + rename）
pub async fn write_report(path: &Path, report: &CnReport) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let json = serde_json::to_vec_pretty(report)?;
    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "result.json".into());
    tmp_name.push(format!(".tmp.{}", std::process::id()));
    let tmp_path = path.with_file_name(tmp_name);

    let mut file = tokio::fs::File::create(&tmp_path).await?;
    file.write_all(&json).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// 按路径返回固定结果；代理路径前 `proxy_failures` 次尝试失败
    struct FixedProber {
        direct_ok: bool,
        proxy_failures: u32,
        proxy_calls: AtomicU32,
    }

    #[async_trait]
    impl Prober for FixedProber {
        async fn probe(&self, request: &ProbeRequest, route: &ProbeRoute) -> ProbeOutcome {
            let ok = match route {
                ProbeRoute::Proxy { .. } => {
                    // 每次尝试发出 https 和 http 两个请求
                    let call = self.proxy_calls.fetch_add(1, Ordering::SeqCst);
                    call / 2 >= self.proxy_failures
                }
                _ => self.direct_ok,
            };
            if ok {
                ProbeOutcome::success(&request.label, route.path(), 200)
            } else {
                ProbeOutcome::failure(&request.label, route.path(), FailureKind::Timeout, "t")
            }
        }
    }

    /// 直连 https 被拦截，http 和代理都正常
    struct SniBlockedProber;

    #[async_trait]
    impl Prober for SniBlockedProber {
        async fn probe(&self, request: &ProbeRequest, route: &ProbeRoute) -> ProbeOutcome {
            let direct = !matches!(route, ProbeRoute::Proxy { .. });
            if direct && request.url.starts_with("https://") {
                ProbeOutcome::failure(
                    &request.label,
                    route.path(),
                    FailureKind::Connect,
                    "connection reset",
                )
            } else {
                ProbeOutcome::success(&request.label, route.path(), 301)
            }
        }
    }

    fn resolver() -> Arc<ProxyResolver> {
        Arc::new(ProxyResolver::Static("http://10.0.0.1:3128".to_string()))
    }

    fn aggregator(direct_ok: bool, proxy_failures: u32, attempts: u32) -> ResultAggregator {
        ResultAggregator::new(
            Arc::new(FixedProber {
                direct_ok,
                proxy_failures,
                proxy_calls: AtomicU32::new(0),
            }),
            resolver(),
            Duration::from_secs(1),
            attempts,
        )
    }

    #[test]
    fn test_classification_table() {
        assert_eq!(classify(true, true), Classification::Reachable);
        assert_eq!(classify(false, true), Classification::BlockedDirect);
        assert_eq!(classify(true, false), Classification::ProxyIssue);
        assert_eq!(classify(false, false), Classification::Unreachable);
    }

    #[test]
    fn test_classification_serialization() {
        assert_eq!(
            serde_json::to_string(&Classification::BlockedDirect).unwrap(),
            "\"blocked-direct\""
        );
        assert_eq!(Classification::ProxyIssue.to_string(), "proxy-issue");
    }

    #[tokio::test]
    async fn test_blocked_direct_scenario() {
        let result = aggregator(false, 0, 2).check_domain("example.com").await;
        assert_eq!(result.domain, "example.com");
        assert_eq!(result.classification, Classification::BlockedDirect);
        assert!(!result.direct.success);
        assert!(!result.direct.https.success && !result.direct.http.success);
        assert!(result.proxy.success);
        assert_eq!(result.proxy.attempts, 1);
    }

    #[tokio::test]
    async fn test_either_scheme_makes_path_reachable() {
        let agg = ResultAggregator::new(
            Arc::new(SniBlockedProber),
            resolver(),
            Duration::from_secs(1),
            2,
        );
        let result = agg.check_domain("example.com").await;

        assert_eq!(result.classification, Classification::Reachable);
        assert!(result.direct.success);
        assert!(result.direct.https_blocked());
        assert_eq!(result.direct.https.error_kind, Some(FailureKind::Connect));
        assert_eq!(result.direct.http.status_code, Some(301));
        assert!(!result.proxy.https_blocked());
    }

    #[tokio::test]
    async fn test_proxy_retry_stops_at_first_success() {
        let result = aggregator(true, 1, 3).check_domain("example.com").await;
        assert_eq!(result.classification, Classification::Reachable);
        assert_eq!(result.proxy.attempts, 2);
    }

    #[tokio::test]
    async fn test_proxy_retry_exhausted() {
        let result = aggregator(true, 10, 2).check_domain("example.com").await;
        assert_eq!(result.classification, Classification::ProxyIssue);
        assert_eq!(result.proxy.attempts, 2);
        assert_eq!(result.proxy.https.error_kind, Some(FailureKind::Timeout));
        assert_eq!(result.proxy.http.error_kind, Some(FailureKind::Timeout));
    }

    #[tokio::test]
    async fn test_proxy_source_failure_is_proxy_outcome() {
        let agg = ResultAggregator::new(
            Arc::new(FixedProber {
                direct_ok: false,
                proxy_failures: 0,
                proxy_calls: AtomicU32::new(0),
            }),
            Arc::new(ProxyResolver::api("http://127.0.0.1:1/get").unwrap()),
            Duration::from_secs(1),
            2,
        );
        let result = agg.check_domain("example.com").await;
        assert_eq!(result.classification, Classification::Unreachable);
        assert_eq!(result.proxy.https.error_kind, Some(FailureKind::Proxy));
        assert_eq!(result.proxy.attempts, 2);
    }

    #[tokio::test]
    async fn test_write_report_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("result_cn.json");

        let agg = aggregator(false, 0, 1);
        let report = CnReport::new(vec![
            agg.check_domain("a.example").await,
            agg.check_domain("b.example").await,
        ]);
        write_report(&path, &report).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: CnReport = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.results.len(), 2);
        assert_eq!(parsed.results[0].domain, "a.example");
        assert_eq!(parsed.results[1].domain, "b.example");

        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["results"][0]["classification"], "blocked-direct");
        assert!(value["results"][0]["direct"]["https"]["latency_ms"].is_u64());
        assert_eq!(value["results"][0]["proxy"]["http"]["success"], true);

        // 不留下临时文件
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());

        let counts = parsed.counts();
        assert_eq!(counts.get(&Classification::BlockedDirect), Some(&2));
    }
}
