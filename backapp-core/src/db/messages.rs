use crate::Result;
use crate::models::{BackupFile, BackupRun, BackupRunLog, LogLevel, RunStatus};
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

/// 结束一次运行时写入的汇总信息
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub status: RunStatus,
    pub end_time: DateTime<Utc>,
    pub total_files: i64,
    pub total_size_bytes: i64,
    pub error_message: Option<String>,
}

/// DuckDB数据库操作消息
#[derive(Debug)]
pub enum DbMessage {
    /// 初始化数据库表
    InitTables {
        respond_to: oneshot::Sender<Result<()>>,
    },

    // ========== 运行记录 ==========
    /// 创建 pending 运行
    CreateRun {
        profile_id: i64,
        start_time: DateTime<Utc>,
        respond_to: oneshot::Sender<Result<BackupRun>>,
    },
    /// 按预期的原状态切换运行状态
    TransitionRun {
        run_id: i64,
        from: RunStatus,
        to: RunStatus,
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// 写入终态与汇总
    FinishRun {
        run_id: i64,
        from: RunStatus,
        summary: RunSummary,
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// 将上次进程遗留的未结束运行标记为失败
    FailInterruptedRuns {
        end_time: DateTime<Utc>,
        message: String,
        respond_to: oneshot::Sender<Result<usize>>,
    },
    GetRun {
        run_id: i64,
        respond_to: oneshot::Sender<Result<Option<BackupRun>>>,
    },
    ListRuns {
        profile_id: Option<i64>,
        status: Option<RunStatus>,
        respond_to: oneshot::Sender<Result<Vec<BackupRun>>>,
    },
    /// 删除终态运行及其文件、日志记录
    DeleteRun {
        run_id: i64,
        respond_to: oneshot::Sender<Result<()>>,
    },

    // ========== 文件记录 ==========
    RecordFile {
        run_id: i64,
        rule_id: i64,
        remote_path: String,
        local_path: String,
        size_bytes: i64,
        created_at: DateTime<Utc>,
        respond_to: oneshot::Sender<Result<BackupFile>>,
    },
    ListFiles {
        run_id: i64,
        respond_to: oneshot::Sender<Result<Vec<BackupFile>>>,
    },
    GetFile {
        file_id: i64,
        respond_to: oneshot::Sender<Result<Option<BackupFile>>>,
    },

    // ========== 运行日志 ==========
    AppendLog {
        run_id: i64,
        timestamp: DateTime<Utc>,
        level: LogLevel,
        message: String,
        respond_to: oneshot::Sender<Result<i64>>,
    },
    GetRunLogs {
        run_id: i64,
        respond_to: oneshot::Sender<Result<Vec<BackupRunLog>>>,
    },
}
