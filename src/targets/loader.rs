//! 列表文件加载器
//!
//! 源站列表每行格式为 `name|domain|origin_ip|port|path|slow_time|scheme`，
//! `origin_ip` 之后的字段可省略，省略或留空时在加载阶段用配置默认值补齐。
//! 域名列表每行一个域名。两种文件都忽略空行和 `#` 开头的注释行。

use crate::config::OriginConfig;
use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// 源站行的最少字段数
const MIN_FIELDS: usize = 3;
/// 源站行的最多字段数
const MAX_FIELDS: usize = 7;

/// 源站探测目标，所有字段均已补齐
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginTarget {
    /// 目标名称（状态存储的键）
    pub name: String,
    /// 域名（Host 头和 SNI）
    pub domain: String,
    /// 源站真实IP
    pub origin_ip: IpAddr,
    /// 端口
    pub port: u16,
    /// 请求路径，总是以 `/` 开头
    pub path: String,
    /// 慢响应阈值
    pub slow_threshold: Duration,
    /// 协议
    pub scheme: String,
}

impl OriginTarget {
    /// 请求 URL（主机部分为域名，连接时再解析到源站IP）
    pub fn url(&self) -> String {
        format!("{}://{}:{}{}", self.scheme, self.domain, self.port, self.path)
    }
}

/// 目标字段默认值
#[derive(Debug, Clone, PartialEq)]
pub struct TargetDefaults {
    pub port: u16,
    pub path: String,
    pub scheme: String,
    pub slow_threshold: Duration,
}

impl TryFrom<&OriginConfig> for TargetDefaults {
    type Error = String;

    fn try_from(config: &OriginConfig) -> Result<Self, Self::Error> {
        let slow_threshold = slow_threshold(config.default_slow_seconds)
            .ok_or_else(|| format!("无效的默认慢响应阈值: {}", config.default_slow_seconds))?;
        Ok(Self {
            port: config.default_port,
            path: normalize_path(&config.default_path),
            scheme: config.default_scheme.to_lowercase(),
            slow_threshold,
        })
    }
}

/// 秒数转换为慢响应阈值，负数、NaN、无穷大和超出 `Duration` 范围的值返回 None
pub fn slow_threshold(seconds: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(seconds).ok()
}

/// 加载结果：有效记录和被跳过的行
#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport<T> {
    /// 有效记录，保持文件中的顺序
    pub records: Vec<T>,
    /// 被跳过的行及原因
    pub skipped: Vec<ParseError>,
}

impl<T> LoadReport<T> {
    fn new() -> Self {
        Self {
            records: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// 遍历有效行，返回 (行号, 去除首尾空白后的内容)
fn content_lines(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content
        .lines()
        .enumerate()
        .map(|(idx, raw)| (idx + 1, raw.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

/// 取可选字段，空字符串视为省略
fn optional_field<'a>(parts: &[&'a str], index: usize) -> Option<&'a str> {
    parts.get(index).copied().filter(|s| !s.is_empty())
}

fn parse_origin_line(
    line_no: usize,
    line: &str,
    defaults: &TargetDefaults,
) -> Result<OriginTarget, ParseError> {
    let parts: Vec<&str> = line.split('|').map(str::trim).collect();

    if parts.len() < MIN_FIELDS {
        return Err(ParseError::new(
            line_no,
            format!("字段过少: 需要至少 {MIN_FIELDS} 个，实际 {}", parts.len()),
        ));
    }
    if parts.len() > MAX_FIELDS {
        return Err(ParseError::new(
            line_no,
            format!("字段过多: 最多 {MAX_FIELDS} 个，实际 {}", parts.len()),
        ));
    }

    let name = parts[0];
    let domain = parts[1];
    let ip = parts[2];

    if name.is_empty() {
        return Err(ParseError::new(line_no, "name 为空"));
    }
    if domain.is_empty() {
        return Err(ParseError::new(line_no, "domain 为空"));
    }
    if ip.is_empty() {
        return Err(ParseError::new(line_no, "origin_ip 为空"));
    }

    let origin_ip: IpAddr = ip
        .parse()
        .map_err(|_| ParseError::new(line_no, format!("无效的IP地址: {ip}")))?;

    let port = match optional_field(&parts, 3) {
        Some(raw) => match raw.parse::<u16>() {
            Ok(port) if port > 0 => port,
            _ => return Err(ParseError::new(line_no, format!("无效的端口: {raw}"))),
        },
        None => defaults.port,
    };

    let path = optional_field(&parts, 4)
        .map(normalize_path)
        .unwrap_or_else(|| defaults.path.clone());

    let slow_threshold = match optional_field(&parts, 5) {
        Some(raw) => match raw.parse::<f64>().ok().and_then(slow_threshold) {
            Some(threshold) => threshold,
            None => return Err(ParseError::new(line_no, format!("无效的慢响应阈值: {raw}"))),
        },
        None => defaults.slow_threshold,
    };

    let scheme = match optional_field(&parts, 6) {
        Some(raw) => {
            let scheme = raw.to_lowercase();
            if scheme != "http" && scheme != "https" {
                return Err(ParseError::new(line_no, format!("不支持的协议: {raw}")));
            }
            scheme
        }
        None => defaults.scheme.clone(),
    };

    Ok(OriginTarget {
        name: name.to_string(),
        domain: domain.to_string(),
        origin_ip,
        port,
        path,
        slow_threshold,
        scheme,
    })
}

/// 解析源站目标列表内容
///
/// 格式错误的行会被跳过并记录原因，不会中断整体加载。
/// 重名目标会被保留（共享同一条失败状态），仅输出警告。
pub fn parse_origin_targets(content: &str, defaults: &TargetDefaults) -> LoadReport<OriginTarget> {
    let mut report = LoadReport::new();
    let mut seen = HashSet::new();

    for (line_no, line) in content_lines(content) {
        match parse_origin_line(line_no, line, defaults) {
            Ok(target) => {
                if !seen.insert(target.name.clone()) {
                    warn!("第 {} 行目标名称重复: {}，将共享失败状态", line_no, target.name);
                }
                report.records.push(target);
            }
            Err(e) => {
                warn!("跳过目标列表行 {}", e);
                report.skipped.push(e);
            }
        }
    }

    report
}

/// 解析域名列表内容
pub fn parse_domains(content: &str) -> LoadReport<String> {
    let mut report = LoadReport::new();

    for (line_no, line) in content_lines(content) {
        if line.contains("://") {
            report
                .skipped
                .push(ParseError::new(line_no, format!("应为裸域名，不应包含协议: {line}")));
        } else if line.contains('|') || line.contains(char::is_whitespace) {
            report
                .skipped
                .push(ParseError::new(line_no, format!("每行只能包含一个域名: {line}")));
        } else {
            report.records.push(line.to_string());
        }
    }

    for e in &report.skipped {
        warn!("跳过域名列表行 {}", e);
    }

    report
}

/// 从文件加载源站目标列表
pub async fn load_origin_targets(
    path: &Path,
    defaults: &TargetDefaults,
) -> std::io::Result<LoadReport<OriginTarget>> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(parse_origin_targets(&content, defaults))
}

/// 从文件加载域名列表
pub async fn load_domains(path: &Path) -> std::io::Result<LoadReport<String>> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(parse_domains(&content))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> TargetDefaults {
        TargetDefaults {
            port: 443,
            path: "/".to_string(),
            scheme: "https".to_string(),
            slow_threshold: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_omitted_fields_use_defaults() {
        let report = parse_origin_targets("web|example.com|203.0.113.5|||", &defaults());

        assert!(report.skipped.is_empty());
        let target = &report.records[0];
        assert_eq!(target.name, "web");
        assert_eq!(target.domain, "example.com");
        assert_eq!(target.origin_ip, "203.0.113.5".parse::<IpAddr>().unwrap());
        assert_eq!(target.port, 443);
        assert_eq!(target.path, "/");
        assert_eq!(target.scheme, "https");
        assert_eq!(target.slow_threshold, Duration::from_secs(5));
    }

    #[test]
    fn test_minimal_line_uses_defaults() {
        let report = parse_origin_targets("api|api.example.com|198.51.100.7", &defaults());
        let target = &report.records[0];
        assert_eq!(target.port, 443);
        assert_eq!(target.path, "/");
        assert_eq!(target.scheme, "https");
    }

    #[test]
    fn test_literal_fields_override_defaults() {
        let line = "api|api.example.com|2001:db8::1|8080|health|1.5|HTTP";
        let report = parse_origin_targets(line, &defaults());

        let target = &report.records[0];
        assert_eq!(target.port, 8080);
        assert_eq!(target.path, "/health");
        assert_eq!(target.slow_threshold, Duration::from_millis(1500));
        assert_eq!(target.scheme, "http");
        assert!(target.origin_ip.is_ipv6());
        assert_eq!(target.url(), "http://api.example.com:8080/health");
    }

    #[test]
    fn test_comments_and_blank_lines_are_ignored() {
        let content = "# name|domain|ip\n\n   \nweb|example.com|203.0.113.5\n  # indented comment\n";
        let report = parse_origin_targets(content, &defaults());
        assert_eq!(report.records.len(), 1);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_too_many_fields_is_skipped_and_loading_continues() {
        let content = "bad|only|two|fields|extra|extra|extra|extra\nweb|example.com|203.0.113.5\n";
        let report = parse_origin_targets(content, &defaults());

        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].name, "web");
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].line, 1);
        assert!(report.skipped[0].reason.contains("字段过多"));
    }

    #[test]
    fn test_malformed_lines_report_line_numbers() {
        let content = "\
web|example.com|203.0.113.5
only|two
|example.com|203.0.113.5
api||203.0.113.6
api|example.com|not-an-ip
api|example.com|203.0.113.7|http
api|example.com|203.0.113.7|443||abc
api|example.com|203.0.113.7|443|||ftp
last|example.org|203.0.113.9
";
        let report = parse_origin_targets(content, &defaults());

        let names: Vec<_> = report.records.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["web", "last"]);

        let lines: Vec<_> = report.skipped.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_duplicate_names_are_kept() {
        let content = "web|a.example.com|203.0.113.5\nweb|b.example.com|203.0.113.6\n";
        let report = parse_origin_targets(content, &defaults());
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[1].domain, "b.example.com");
    }

    #[test]
    fn test_defaults_from_config_normalize_path() {
        let mut config = OriginConfig::default();
        config.default_path = "status".to_string();
        config.default_scheme = "HTTP".to_string();
        let defaults = TargetDefaults::try_from(&config).unwrap();
        assert_eq!(defaults.path, "/status");
        assert_eq!(defaults.scheme, "http");
    }

    #[test]
    fn test_out_of_range_slow_time_is_skipped() {
        let content = "\
huge|example.com|203.0.113.5|443|/|1e20|https
neg|example.com|203.0.113.5|443|/|-1|https
nan|example.com|203.0.113.5|443|/|NaN|https
inf|example.com|203.0.113.5|443|/|inf|https
ok|example.org|203.0.113.6|443|/|0.5|https
";
        let report = parse_origin_targets(content, &defaults());

        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].name, "ok");
        let lines: Vec<_> = report.skipped.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![1, 2, 3, 4]);
        assert!(report.skipped[0].reason.contains("1e20"));
    }

    #[test]
    fn test_defaults_reject_out_of_range_slow_time() {
        let mut config = OriginConfig::default();
        config.default_slow_seconds = 1e20;
        assert!(TargetDefaults::try_from(&config).is_err());
    }

    #[test]
    fn test_parse_domains() {
        let content = "# domains\nexample.com\n\n  example.org  \nhttps://bad.example\ntwo words.com\n";
        let report = parse_domains(content);

        assert_eq!(report.records, vec!["example.com", "example.org"]);
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.skipped[0].line, 5);
        assert_eq!(report.skipped[1].line, 6);
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targets.conf");
        std::fs::write(&path, "web|example.com|203.0.113.5|8443\n").unwrap();

        let report = load_origin_targets(&path, &defaults()).await.unwrap();
        assert_eq!(report.records[0].port, 8443);

        let missing = load_origin_targets(&dir.path().join("missing.conf"), &defaults()).await;
        assert!(missing.is_err());
    }
}
