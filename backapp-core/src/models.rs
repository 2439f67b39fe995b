use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::session::LOOPBACK_HOSTS;
use crate::{BackupError, Result};

/// 认证方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthKind {
    Password,
    Key,
}

impl AuthKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthKind::Password => "password",
            AuthKind::Key => "key",
        }
    }
}

/// 远程主机（配置实体，由外部配置管理维护）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub id: i64,
    pub name: String,
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: String,
    /// 原始认证类型字符串，连接时再校验
    pub auth_type: String,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// 私钥文件路径或私钥内容
    #[serde(default, skip_serializing)]
    pub private_key: Option<String>,
}

fn default_ssh_port() -> u16 {
    crate::constants::session::DEFAULT_SSH_PORT
}

impl Server {
    pub fn is_loopback(&self) -> bool {
        LOOPBACK_HOSTS.contains(&self.host.trim())
    }

    pub fn auth_kind(&self) -> std::result::Result<AuthKind, crate::ConnectionError> {
        match self.auth_type.trim() {
            "password" => Ok(AuthKind::Password),
            "key" => Ok(AuthKind::Key),
            other => Err(crate::ConnectionError::UnsupportedAuth(other.to_string())),
        }
    }
}

/// 文件选择规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRule {
    pub id: i64,
    #[serde(default)]
    pub profile_id: i64,
    pub remote_path: String,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default)]
    pub exclude_pattern: String,
}

/// 本地存储位置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageLocation {
    pub id: i64,
    pub name: String,
    pub base_path: String,
}

/// 备份目录命名规则
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamingRule {
    pub id: i64,
    pub name: String,
    pub pattern: String,
}

/// 命令执行阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStage {
    Pre,
    Post,
}

impl CommandStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStage::Pre => "pre",
            CommandStage::Post => "post",
        }
    }
}

/// 备份前后在会话上执行的命令
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileCommand {
    pub id: i64,
    #[serde(default)]
    pub profile_id: i64,
    pub command: String,
    #[serde(default)]
    pub run_order: i32,
    pub run_stage: CommandStage,
}

/// 备份配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupProfile {
    pub id: i64,
    pub name: String,
    pub server_id: i64,
    pub storage_location_id: i64,
    pub naming_rule_id: i64,
    #[serde(default)]
    pub schedule_cron: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// 运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::Failed)
    }

    /// 状态只能单向推进：pending→running→{success,failed}，失败也可直接发生在 pending
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Pending, RunStatus::Running)
                | (RunStatus::Pending, RunStatus::Failed)
                | (RunStatus::Running, RunStatus::Success)
                | (RunStatus::Running, RunStatus::Failed)
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "success" => Ok(RunStatus::Success),
            "failed" => Ok(RunStatus::Failed),
            other => Err(BackupError::custom(format!("unknown run status: {other}"))),
        }
    }
}

/// 运行日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            other => Err(BackupError::custom(format!("unknown log level: {other}"))),
        }
    }
}

/// 一次备份运行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRun {
    pub id: i64,
    pub profile_id: i64,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_files: i64,
    pub total_size_bytes: i64,
    pub error_message: Option<String>,
}

/// 成功传输的单个文件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupFile {
    pub id: i64,
    pub run_id: i64,
    pub rule_id: i64,
    pub remote_path: String,
    pub local_path: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

/// 运行日志
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRunLog {
    pub id: i64,
    pub run_id: i64,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// 文件浏览条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSystemEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_transitions_are_monotonic() {
        use RunStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Failed));
        assert!(Running.can_transition_to(Success));
        assert!(Running.can_transition_to(Failed));

        assert!(!Running.can_transition_to(Pending));
        assert!(!Success.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Running));
        assert!(!Pending.can_transition_to(Success));
    }

    #[test]
    fn test_loopback_detection() {
        let mut server = Server {
            id: 1,
            name: "local".to_string(),
            host: "127.0.0.1".to_string(),
            port: 22,
            username: "root".to_string(),
            auth_type: "password".to_string(),
            password: Some("x".to_string()),
            private_key: None,
        };
        assert!(server.is_loopback());
        server.host = "localhost".to_string();
        assert!(server.is_loopback());
        server.host = "backup.example.com".to_string();
        assert!(!server.is_loopback());
    }

    #[test]
    fn test_unsupported_auth_kind() {
        let server = Server {
            id: 1,
            name: "s".to_string(),
            host: "h".to_string(),
            port: 22,
            username: "u".to_string(),
            auth_type: "kerberos".to_string(),
            password: None,
            private_key: None,
        };
        assert!(matches!(
            server.auth_kind(),
            Err(crate::ConnectionError::UnsupportedAuth(kind)) if kind == "kerberos"
        ));
    }
}
