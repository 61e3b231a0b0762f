//! 结果推送
//!
//! 用 scp 把结果文档传到收集端。失败不影响本地文件。

use crate::config::PushConfig;
use crate::error::PublishError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::info;

/// scp 推送器
#[derive(Debug, Clone)]
pub struct ScpPublisher {
    user: String,
    host: String,
    remote_dir: String,
    key_file: Option<PathBuf>,
    options: Vec<String>,
    timeout: Duration,
    program: String,
}

impl ScpPublisher {
    pub fn new(config: &PushConfig) -> Self {
        Self {
            user: config.user.trim().to_string(),
            host: config.host.trim().to_string(),
            remote_dir: config.remote_dir.trim().to_string(),
            key_file: config.key_file.clone(),
            options: config.options.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
            program: "scp".to_string(),
        }
    }

    /// 替换 scp 可执行文件
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// 远端目标 `user@host:dir/`
    pub fn destination(&self) -> String {
        format!(
            "{}@{}:{}/",
            self.user,
            self.host,
            self.remote_dir.trim_end_matches('/')
        )
    }

    /// 构建 scp 参数
    pub fn build_args(&self, file: &Path) -> Vec<String> {
        let mut args = self.options.clone();
        if let Some(key) = &self.key_file {
            args.push("-i".to_string());
            args.push(key.display().to_string());
        }
        args.push(file.display().to_string());
        args.push(self.destination());
        args
    }

    /// 推送文件
    pub async fn publish(&self, file: &Path) -> Result<(), PublishError> {
        if !file.is_file() {
            return Err(PublishError::MissingFile(file.display().to_string()));
        }

        let child = Command::new(&self.program)
            .args(self.build_args(file))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PublishError::Spawn(format!("{}: {e}", self.program)))?;

        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| PublishError::Spawn(e.to_string()))?,
            Err(_) => return Err(PublishError::Timeout(self.timeout.as_secs())),
        };

        if output.status.success() {
            info!("结果已推送: {} -> {}", file.display(), self.destination());
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(PublishError::Failed {
                code: output.status.code(),
                stderr: stderr.trim().chars().take(200).collect(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PushConfig {
        PushConfig {
            enabled: true,
            user: "collector".to_string(),
            host: "10.0.0.9".to_string(),
            remote_dir: "/data/results/".to_string(),
            key_file: Some(PathBuf::from("/root/.ssh/push")),
            options: vec!["-o".to_string(), "BatchMode=yes".to_string()],
            timeout_seconds: 5,
        }
    }

    #[test]
    fn test_build_args() {
        let publisher = ScpPublisher::new(&config());
        let args = publisher.build_args(Path::new("/var/lib/origin-vitals/result_cn.json"));
        assert_eq!(
            args,
            vec![
                "-o",
                "BatchMode=yes",
                "-i",
                "/root/.ssh/push",
                "/var/lib/origin-vitals/result_cn.json",
                "collector@10.0.0.9:/data/results/",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_file() {
        let publisher = ScpPublisher::new(&config());
        let result = publisher.publish(Path::new("/nonexistent/result.json")).await;
        assert!(matches!(result, Err(PublishError::MissingFile(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_publish_exit_status() {
        let file = tempfile::NamedTempFile::new().unwrap();

        let ok = ScpPublisher::new(&config()).with_program("true");
        assert!(ok.publish(file.path()).await.is_ok());

        let failing = ScpPublisher::new(&config()).with_program("false");
        assert!(matches!(
            failing.publish(file.path()).await,
            Err(PublishError::Failed { code: Some(1), .. })
        ));
    }
}
