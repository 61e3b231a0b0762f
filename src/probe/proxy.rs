//! 上游代理获取
//!
//! cn-check 的代理来源可以是固定的 `proxy_url`，也可以是代理API。
//! 代理API每次调用返回一个新的出口，返回内容第一行支持以下格式：
//!
//! - `ip:port`
//! - `ip:port:user:pass`
//! - `user:pass@ip:port`
//! - `http://...` / `https://...` / `socks5://...`

use crate::config::CnConfig;
use crate::error::ProxyError;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// 代理API请求超时
const PROXY_API_TIMEOUT: Duration = Duration::from_secs(5);

/// 代理来源
#[derive(Debug, Clone)]
pub enum ProxyResolver {
    /// 固定代理地址
    Static(String),
    /// 代理API
    Api { endpoint: String, client: Client },
}

impl ProxyResolver {
    /// 根据 cn 配置创建，`proxy_url` 优先
    pub fn from_config(config: &CnConfig) -> Result<Self, ProxyError> {
        if let Some(url) = config.proxy_url.as_deref().filter(|u| !u.trim().is_empty()) {
            return Ok(Self::Static(normalize_proxy_line(url)?));
        }
        match config.proxy_api.as_deref().filter(|u| !u.trim().is_empty()) {
            Some(endpoint) => Self::api(endpoint),
            None => Err(ProxyError::NotConfigured),
        }
    }

    /// 创建代理API来源
    pub fn api(endpoint: &str) -> Result<Self, ProxyError> {
        let client = Client::builder()
            .timeout(PROXY_API_TIMEOUT)
            .no_proxy()
            .build()
            .map_err(|e| ProxyError::Fetch(format!("创建HTTP客户端失败: {e}")))?;
        Ok(Self::Api {
            endpoint: endpoint.trim().to_string(),
            client,
        })
    }

    /// 获取一个代理地址
    pub async fn acquire(&self) -> Result<String, ProxyError> {
        match self {
            ProxyResolver::Static(url) => Ok(url.clone()),
            ProxyResolver::Api { endpoint, client } => {
                let response = client
                    .get(endpoint)
                    .send()
                    .await
                    .map_err(|e| ProxyError::Fetch(e.to_string()))?;

                if !response.status().is_success() {
                    return Err(ProxyError::Fetch(format!("HTTP {}", response.status())));
                }

                let body = response
                    .text()
                    .await
                    .map_err(|e| ProxyError::Fetch(e.to_string()))?;
                let line = body.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");

                let url = normalize_proxy_line(line)?;
                debug!("从代理API获取到代理");
                Ok(url)
            }
        }
    }
}

/// 把代理API返回的一行规范化为代理URL
pub fn normalize_proxy_line(line: &str) -> Result<String, ProxyError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ProxyError::Malformed("空内容".to_string()));
    }

    if line.contains("://") {
        return Ok(line.to_string());
    }

    if let Some((credentials, address)) = line.rsplit_once('@') {
        if credentials.is_empty() || !is_host_port(address) {
            return Err(ProxyError::Malformed(line.to_string()));
        }
        return Ok(format!("http://{line}"));
    }

    let parts: Vec<&str> = line.split(':').collect();
    match parts.as_slice() {
        [host, port] if is_host_port(&format!("{host}:{port}")) => {
            Ok(format!("http://{host}:{port}"))
        }
        [host, port, user, pass]
            if is_host_port(&format!("{host}:{port}")) && !user.is_empty() =>
        {
            Ok(format!("http://{user}:{pass}@{host}:{port}"))
        }
        _ => Err(ProxyError::Malformed(line.to_string())),
    }
}

fn is_host_port(value: &str) -> bool {
    match value.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok_and(|p| p > 0),
        None => false,
    }
}
