//! ssh 中转通知
//!
//! 在远端主机上执行通知命令，消息作为单个 shell 参数传入。
//! 本地只保证命令被执行，不保证远端的最终投递。

use crate::config::SshRelayConfig;
use crate::error::DispatchError;
use crate::notification::sender::{AlertNotice, NotificationSender};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

/// ssh 中转发送器
#[derive(Debug, Clone)]
pub struct SshRelaySender {
    host: String,
    command: String,
    key_file: Option<PathBuf>,
    options: Vec<String>,
    timeout: Duration,
    /// ssh 可执行文件，测试时可替换
    program: String,
}

impl SshRelaySender {
    pub fn new(config: &SshRelayConfig) -> Self {
        Self {
            host: config.host.trim().to_string(),
            command: config.command.trim().to_string(),
            key_file: config.key_file.clone(),
            options: config.options.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
            program: "ssh".to_string(),
        }
    }

    /// 替换 ssh 可执行文件
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// 构建 ssh 参数
    ///
    /// `ssh [options] [-i key] host "<command> '<message>'"`
    pub fn build_args(&self, message: &str) -> Vec<String> {
        let mut args = self.options.clone();
        if let Some(key) = &self.key_file {
            args.push("-i".to_string());
            args.push(key.display().to_string());
        }
        args.push(self.host.clone());
        args.push(format!("{} {}", self.command, shell_quote(message)));
        args
    }
}

/// POSIX shell 单引号转义
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[async_trait]
impl NotificationSender for SshRelaySender {
    async fn deliver(&self, notice: &AlertNotice) -> Result<(), DispatchError> {
        let args = self.build_args(&notice.message);
        debug!("通过 ssh 中转发送通知到 {}", self.host);

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DispatchError::Channel(format!("无法启动 {}: {e}", self.program)))?;

        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| DispatchError::Channel(e.to_string()))?,
            Err(_) => return Err(DispatchError::Timeout(self.timeout.as_secs())),
        };

        if output.status.success() {
            info!("ssh 中转通知已发送: {}", notice.target);
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr: String = stderr.trim().chars().take(200).collect();
            Err(DispatchError::Rejected(format!(
                "ssh rc={:?} stderr={}",
                output.status.code(),
                stderr
            )))
        }
    }

    fn channel_name(&self) -> &'static str {
        "ssh"
    }
}
