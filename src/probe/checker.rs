//! HTTP探测器实现
//!
//! 单次、限时的可达性探测。支持把域名解析到指定IP直连源站，
//! 或经上游代理转发。

use crate::probe::result::{FailureKind, ProbeOutcome, ProbePath};
use crate::targets::OriginTarget;
use async_trait::async_trait;
use reqwest::{Client, Proxy};
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;

/// 网络路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeRoute {
    /// 正常解析直连，忽略环境变量代理
    Direct,
    /// 把请求域名解析到指定IP，Host 头和 SNI 保持原域名
    DirectOverride { ip: IpAddr, port: u16 },
    /// 经上游代理
    Proxy { url: String },
}

impl ProbeRoute {
    /// 对应的结果路径标签
    pub fn path(&self) -> ProbePath {
        match self {
            ProbeRoute::Proxy { .. } => ProbePath::Proxy,
            _ => ProbePath::Direct,
        }
    }
}

/// 状态码判定规则
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusExpectation {
    /// 仅接受列出的状态码
    Codes(Vec<u16>),
    /// 接受 2xx 和 3xx
    SuccessOrRedirect,
}

impl StatusExpectation {
    /// 状态码是否符合预期
    pub fn accepts(&self, status_code: u16) -> bool {
        match self {
            StatusExpectation::Codes(codes) => codes.contains(&status_code),
            StatusExpectation::SuccessOrRedirect => (200..400).contains(&status_code),
        }
    }
}

/// 一次探测请求
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    /// 结果中使用的标识（目标名称或域名）
    pub label: String,
    /// 请求URL
    pub url: String,
    /// 超时时间
    pub timeout: Duration,
    /// 慢响应阈值
    pub slow_threshold: Option<Duration>,
    /// 状态码判定
    pub expect: StatusExpectation,
    /// 是否校验证书
    pub verify_tls: bool,
}

impl ProbeRequest {
    /// 为源站目标构建请求和直连路径
    pub fn for_origin(
        target: &OriginTarget,
        timeout: Duration,
        expected_codes: &[u16],
        verify_tls: bool,
    ) -> (Self, ProbeRoute) {
        let request = Self {
            label: target.name.clone(),
            url: target.url(),
            timeout,
            slow_threshold: Some(target.slow_threshold),
            expect: StatusExpectation::Codes(expected_codes.to_vec()),
            verify_tls,
        };
        let route = ProbeRoute::DirectOverride {
            ip: target.origin_ip,
            port: target.port,
        };
        (request, route)
    }

    /// 为 cn-check 域名构建请求
    pub fn for_domain(domain: &str, scheme: &str, timeout: Duration) -> Self {
        Self {
            label: domain.to_string(),
            url: format!("{scheme}://{domain}/"),
            timeout,
            slow_threshold: None,
            expect: StatusExpectation::SuccessOrRedirect,
            verify_tls: false,
        }
    }

    /// 请求URL中的主机名
    fn host(&self) -> Option<String> {
        reqwest::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }
}

/// 探测器trait
///
/// 每次调用恰好发起一次请求，失败不会在内部重试，也不会返回错误：
/// 所有失败都体现在 [`ProbeOutcome`] 中。
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, request: &ProbeRequest, route: &ProbeRoute) -> ProbeOutcome;
}

/// 基于 reqwest 的HTTP探测器
#[derive(Debug, Clone)]
pub struct HttpProber {
    /// User-Agent
    user_agent: String,
}

impl Default for HttpProber {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpProber {
    /// 创建新的HTTP探测器
    pub fn new() -> Self {
        Self {
            user_agent: format!("{}/{}", crate::APP_NAME, crate::VERSION),
        }
    }

    /// 按路径构建客户端
    ///
    /// 域名到IP的覆盖是客户端级别的，所以每次探测单独构建。
    fn build_client(
        &self,
        request: &ProbeRequest,
        route: &ProbeRoute,
    ) -> Result<Client, (FailureKind, String)> {
        let mut builder = Client::builder()
            .timeout(request.timeout)
            .connect_timeout(request.timeout)
            .user_agent(&self.user_agent)
            .danger_accept_invalid_certs(!request.verify_tls);

        match route {
            ProbeRoute::Direct => {
                builder = builder.no_proxy();
            }
            ProbeRoute::DirectOverride { ip, port } => {
                let host = request
                    .host()
                    .ok_or_else(|| (FailureKind::Request, format!("无效的URL: {}", request.url)))?;
                builder = builder
                    .no_proxy()
                    .resolve(&host, SocketAddr::new(*ip, *port));
            }
            ProbeRoute::Proxy { url } => {
                let proxy = Proxy::all(url.as_str())
                    .map_err(|e| (FailureKind::Proxy, format!("无效的代理地址: {e}")))?;
                builder = builder.proxy(proxy);
            }
        }

        builder
            .build()
            .map_err(|e| (FailureKind::Request, format!("创建HTTP客户端失败: {e}")))
    }

    /// 按错误类型分类
    fn classify_error(error: &reqwest::Error, route: &ProbeRoute) -> (FailureKind, String) {
        if error.is_timeout() {
            return (FailureKind::Timeout, "Request timeout".to_string());
        }

        // 拼接完整错误链，底层原因（dns/tls）往往在 source 里
        let mut detail = error.to_string();
        let mut source = std::error::Error::source(error);
        while let Some(inner) = source {
            detail.push_str(": ");
            detail.push_str(&inner.to_string());
            source = inner.source();
        }
        let lower = detail.to_lowercase();

        let kind = if matches!(route, ProbeRoute::Proxy { .. })
            && (lower.contains("proxy") || lower.contains("tunnel"))
        {
            FailureKind::Proxy
        } else if lower.contains("dns") || lower.contains("resolve") {
            FailureKind::Dns
        } else if lower.contains("certificate") || lower.contains("tls") || lower.contains("ssl")
        {
            FailureKind::Tls
        } else if lower.contains("timed out") || lower.contains("timeout") {
            FailureKind::Timeout
        } else if error.is_connect()
            || lower.contains("refused")
            || lower.contains("reset")
            || lower.contains("connection closed")
        {
            FailureKind::Connect
        } else if error.is_builder() || error.is_request() {
            FailureKind::Request
        } else {
            FailureKind::Other
        };

        (kind, detail)
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, request: &ProbeRequest, route: &ProbeRoute) -> ProbeOutcome {
        let path = route.path();

        let client = match self.build_client(request, route) {
            Ok(client) => client,
            Err((kind, message)) => {
                return ProbeOutcome::failure(&request.label, path, kind, message);
            }
        };

        debug!("探测 {} via {:?}: {}", request.label, route, request.url);

        let start_time = Instant::now();
        // 外层超时兜底，客户端自身的超时不覆盖建连前的阻塞
        let response_result = timeout(request.timeout, client.get(&request.url).send()).await;
        let elapsed = start_time.elapsed();

        let outcome = match response_result {
            Ok(Ok(response)) => {
                let status_code = response.status().as_u16();
                if request.expect.accepts(status_code) {
                    ProbeOutcome::success(&request.label, path, status_code)
                } else {
                    ProbeOutcome::failure(
                        &request.label,
                        path,
                        FailureKind::Status,
                        format!(
                            "HTTP {} {}",
                            status_code,
                            response.status().canonical_reason().unwrap_or("Unknown")
                        ),
                    )
                    .with_status_code(status_code)
                }
            }
            Ok(Err(e)) => {
                let (kind, message) = Self::classify_error(&e, route);
                ProbeOutcome::failure(&request.label, path, kind, message)
            }
            Err(_) => ProbeOutcome::failure(
                &request.label,
                path,
                FailureKind::Timeout,
                "Request timeout",
            ),
        };

        outcome
            .with_elapsed(elapsed)
            .with_slow_threshold(request.slow_threshold)
    }
}
