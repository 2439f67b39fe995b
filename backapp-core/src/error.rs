use thiserror::Error;

pub type Result<T> = std::result::Result<T, BackupError>;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("配置错误: {0}")]
    Config(#[from] toml::de::Error),

    #[error("DuckDB数据库错误: {0}")]
    DuckDb(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("任务执行错误: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: i64 },

    #[error("profile {0} already has an active run")]
    RunAlreadyActive(i64),

    #[error("invalid status transition for run {run_id}: {from} -> {to}")]
    InvalidTransition {
        run_id: i64,
        from: String,
        to: String,
    },

    #[error("failed to create destination directory {path}: {source}")]
    Destination {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command failed ({stage}): {command}: {reason}")]
    Command {
        stage: String,
        command: String,
        reason: String,
    },

    #[error("自定义错误: {0}")]
    Custom(String),
}

/// 建立会话阶段的错误，对整个运行是致命的
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("unsupported auth_type: {0}")]
    UnsupportedAuth(String),

    #[error("server has no {0} configured")]
    MissingCredential(&'static str),

    #[error("failed to read private key file {path}: {source}")]
    KeyFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("SSH connection failed: {0}")]
    Connect(String),

    #[error("SSH authentication failed: {0}")]
    Auth(String),

    #[error("SSH session failed: {0}")]
    Session(String),

    #[error("SSH liveness check failed: {0}")]
    Liveness(String),
}

/// 会话上执行命令或文件操作失败
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("command `{command}` exited with status {status}: {stderr}")]
    NonZeroExit {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("session I/O failed: {0}")]
    Io(String),

    #[error("session is closed")]
    Closed,
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        SessionError::Io(err.to_string())
    }
}

impl From<ssh2::Error> for SessionError {
    fn from(err: ssh2::Error) -> Self {
        SessionError::Io(err.to_string())
    }
}

/// 文件选择规则解析失败，携带出错路径
#[derive(Error, Debug)]
pub enum SelectionError {
    #[error("remote path does not exist: {path}")]
    PathNotFound { path: String },

    #[error("failed to inspect {path}: {source}")]
    Inspect {
        path: String,
        #[source]
        source: SessionError,
    },

    #[error("failed to list files in {path}: {source}")]
    Listing {
        path: String,
        #[source]
        source: SessionError,
    },
}

impl SelectionError {
    pub fn path(&self) -> &str {
        match self {
            SelectionError::PathNotFound { path }
            | SelectionError::Inspect { path, .. }
            | SelectionError::Listing { path, .. } => path,
        }
    }
}

/// 单条规则的传输失败
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("failed to transfer files for rule {rule_id}: {source}")]
    Selection {
        rule_id: i64,
        #[source]
        source: SelectionError,
    },

    #[error("failed to get file size for {path} (rule {rule_id}): {source}")]
    Size {
        rule_id: i64,
        path: String,
        #[source]
        source: SessionError,
    },

    #[error("failed to create directory {path} (rule {rule_id}): {source}")]
    LocalDir {
        rule_id: i64,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to copy file {path} (rule {rule_id}): {source}")]
    Copy {
        rule_id: i64,
        path: String,
        #[source]
        source: SessionError,
    },

    #[error("failed to record copied file {path} (rule {rule_id}): {reason}")]
    Record {
        rule_id: i64,
        path: String,
        reason: String,
    },
}

impl TransferError {
    pub fn rule_id(&self) -> i64 {
        match self {
            TransferError::Selection { rule_id, .. }
            | TransferError::Size { rule_id, .. }
            | TransferError::LocalDir { rule_id, .. }
            | TransferError::Copy { rule_id, .. }
            | TransferError::Record { rule_id, .. } => *rule_id,
        }
    }
}

/// 调度失败只报告给调用方，不影响配置写入
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulingError {
    #[error("invalid cron expression `{expression}` for profile {profile_id}: {reason}")]
    InvalidCron {
        profile_id: i64,
        expression: String,
        reason: String,
    },

    #[error("profile {profile_id} references missing server {server_id}")]
    MissingServer { profile_id: i64, server_id: i64 },
}

// 为DuckDB错误实现From trait
impl From<duckdb::Error> for BackupError {
    fn from(err: duckdb::Error) -> Self {
        BackupError::DuckDb(err.to_string())
    }
}

impl BackupError {
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    pub fn not_found(kind: &'static str, id: i64) -> Self {
        Self::NotFound { kind, id }
    }

    pub fn command(
        stage: impl Into<String>,
        command: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Command {
            stage: stage.into(),
            command: command.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_error_carries_rule_id() {
        let err = TransferError::Selection {
            rule_id: 7,
            source: SelectionError::PathNotFound {
                path: "/missing".to_string(),
            },
        };
        assert_eq!(err.rule_id(), 7);
        let text = BackupError::from(err).to_string();
        assert!(text.contains("rule 7"));
        assert!(text.contains("/missing"));
    }
}
