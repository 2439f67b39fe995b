use crate::constants::config::DB_CHANNEL_CAPACITY;
use crate::models::{BackupFile, BackupRun, BackupRunLog, LogLevel, RunStatus};
use crate::{BackupError, Result};
use chrono::{DateTime, Utc};
use std::path::Path;
use tokio::sync::{mpsc, oneshot};

use super::actor::DuckDbActor;
use super::messages::{DbMessage, RunSummary};

/// DuckDB数据库管理器
#[derive(Debug, Clone)]
pub struct DuckDbManager {
    sender: mpsc::Sender<DbMessage>,
}

impl DuckDbManager {
    /// 创建新的DuckDB管理器
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        // 确保数据库文件的父目录存在
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let actor = DuckDbActor::new(db_path)?;
        Self::spawn(actor).await
    }

    /// 创建内存数据库管理器
    pub async fn new_memory() -> Result<Self> {
        let actor = DuckDbActor::new_memory()?;
        Self::spawn(actor).await
    }

    async fn spawn(actor: DuckDbActor) -> Result<Self> {
        let (sender, receiver) = mpsc::channel(DB_CHANNEL_CAPACITY);
        tokio::spawn(actor.run(receiver));

        let manager = Self { sender };
        manager.init_tables().await?;
        Ok(manager)
    }

    /// 发送请求并等待 Actor 应答
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> DbMessage,
    ) -> Result<T> {
        let (respond_to, receiver) = oneshot::channel();

        self.sender
            .send(build(respond_to))
            .await
            .map_err(|_| BackupError::custom("数据库Actor已关闭"))?;

        receiver
            .await
            .map_err(|_| BackupError::custom("等待数据库响应超时"))?
    }

    async fn init_tables(&self) -> Result<()> {
        self.request(|respond_to| DbMessage::InitTables { respond_to })
            .await
    }

    pub async fn create_run(&self, profile_id: i64, start_time: DateTime<Utc>) -> Result<BackupRun> {
        self.request(|respond_to| DbMessage::CreateRun {
            profile_id,
            start_time,
            respond_to,
        })
        .await
    }

    /// 仅当运行当前处于 `from` 时切换到 `to`
    pub async fn transition_run(&self, run_id: i64, from: RunStatus, to: RunStatus) -> Result<()> {
        self.request(|respond_to| DbMessage::TransitionRun {
            run_id,
            from,
            to,
            respond_to,
        })
        .await
    }

    pub async fn finish_run(&self, run_id: i64, from: RunStatus, summary: RunSummary) -> Result<()> {
        self.request(|respond_to| DbMessage::FinishRun {
            run_id,
            from,
            summary,
            respond_to,
        })
        .await
    }

    pub async fn fail_interrupted_runs(
        &self,
        end_time: DateTime<Utc>,
        message: String,
    ) -> Result<usize> {
        self.request(|respond_to| DbMessage::FailInterruptedRuns {
            end_time,
            message,
            respond_to,
        })
        .await
    }

    pub async fn get_run(&self, run_id: i64) -> Result<Option<BackupRun>> {
        self.request(|respond_to| DbMessage::GetRun { run_id, respond_to })
            .await
    }

    pub async fn list_runs(
        &self,
        profile_id: Option<i64>,
        status: Option<RunStatus>,
    ) -> Result<Vec<BackupRun>> {
        self.request(|respond_to| DbMessage::ListRuns {
            profile_id,
            status,
            respond_to,
        })
        .await
    }

    pub async fn delete_run(&self, run_id: i64) -> Result<()> {
        self.request(|respond_to| DbMessage::DeleteRun { run_id, respond_to })
            .await
    }

    pub async fn record_file(
        &self,
        run_id: i64,
        rule_id: i64,
        remote_path: String,
        local_path: String,
        size_bytes: i64,
    ) -> Result<BackupFile> {
        self.request(|respond_to| DbMessage::RecordFile {
            run_id,
            rule_id,
            remote_path,
            local_path,
            size_bytes,
            created_at: Utc::now(),
            respond_to,
        })
        .await
    }

    pub async fn list_files(&self, run_id: i64) -> Result<Vec<BackupFile>> {
        self.request(|respond_to| DbMessage::ListFiles { run_id, respond_to })
            .await
    }

    pub async fn get_file(&self, file_id: i64) -> Result<Option<BackupFile>> {
        self.request(|respond_to| DbMessage::GetFile {
            file_id,
            respond_to,
        })
        .await
    }

    pub async fn append_log(
        &self,
        run_id: i64,
        timestamp: DateTime<Utc>,
        level: LogLevel,
        message: String,
    ) -> Result<i64> {
        self.request(|respond_to| DbMessage::AppendLog {
            run_id,
            timestamp,
            level,
            message,
            respond_to,
        })
        .await
    }

    pub async fn get_run_logs(&self, run_id: i64) -> Result<Vec<BackupRunLog>> {
        self.request(|respond_to| DbMessage::GetRunLogs { run_id, respond_to })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_run_lifecycle_is_compare_and_set() {
        let db = DuckDbManager::new_memory().await.unwrap();
        let run = db.create_run(3, Utc::now()).await.unwrap();
        assert_eq!(run.status, RunStatus::Pending);

        db.transition_run(run.id, RunStatus::Pending, RunStatus::Running)
            .await
            .unwrap();

        // 原状态已不是 pending，第二次切换被拒绝
        let err = db
            .transition_run(run.id, RunStatus::Pending, RunStatus::Running)
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::InvalidTransition { ref from, .. } if from == "running"));

        db.finish_run(
            run.id,
            RunStatus::Running,
            RunSummary {
                status: RunStatus::Success,
                end_time: Utc::now(),
                total_files: 2,
                total_size_bytes: 2048,
                error_message: None,
            },
        )
        .await
        .unwrap();

        let stored = db.get_run(run.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Success);
        assert_eq!(stored.total_files, 2);
        assert!(stored.end_time.is_some());

        let err = db
            .transition_run(run.id, RunStatus::Success, RunStatus::Running)
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_transition_unknown_run_is_not_found() {
        let db = DuckDbManager::new_memory().await.unwrap();
        let err = db
            .transition_run(42, RunStatus::Pending, RunStatus::Running)
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::NotFound { kind: "run", id: 42 }));
    }

    #[tokio::test]
    async fn test_list_runs_filters() {
        let db = DuckDbManager::new_memory().await.unwrap();
        let a = db.create_run(1, Utc::now()).await.unwrap();
        db.create_run(2, Utc::now()).await.unwrap();
        db.transition_run(a.id, RunStatus::Pending, RunStatus::Running)
            .await
            .unwrap();

        assert_eq!(db.list_runs(None, None).await.unwrap().len(), 2);
        let for_profile = db.list_runs(Some(1), None).await.unwrap();
        assert_eq!(for_profile.len(), 1);
        assert_eq!(for_profile[0].id, a.id);

        let pending = db.list_runs(None, Some(RunStatus::Pending)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].profile_id, 2);

        assert!(db
            .list_runs(Some(1), Some(RunStatus::Pending))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_logs_are_ordered_and_files_recorded() {
        let db = DuckDbManager::new_memory().await.unwrap();
        let run = db.create_run(1, Utc::now()).await.unwrap();
        let ts = Utc::now();

        db.append_log(run.id, ts, LogLevel::Info, "first".to_string())
            .await
            .unwrap();
        db.append_log(run.id, ts, LogLevel::Error, "second".to_string())
            .await
            .unwrap();

        let logs = db.get_run_logs(run.id).await.unwrap();
        let messages: Vec<_> = logs.iter().map(|l| l.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second"]);
        assert_eq!(logs[1].level, LogLevel::Error);

        let file = db
            .record_file(run.id, 9, "/etc/hosts".into(), "/backup/hosts".into(), 120)
            .await
            .unwrap();
        assert_eq!(db.get_file(file.id).await.unwrap().unwrap().rule_id, 9);
        assert_eq!(db.list_files(run.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fail_interrupted_and_delete() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("data").join("runs.db");
        let db = DuckDbManager::new(&db_path).await.unwrap();

        let run = db.create_run(1, Utc::now()).await.unwrap();
        assert!(db.delete_run(run.id).await.is_err());

        let failed = db
            .fail_interrupted_runs(Utc::now(), "interrupted".to_string())
            .await
            .unwrap();
        assert_eq!(failed, 1);

        let stored = db.get_run(run.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        assert_eq!(stored.error_message.as_deref(), Some("interrupted"));

        db.record_file(run.id, 1, "/a".into(), "/b".into(), 1)
            .await
            .unwrap();
        db.delete_run(run.id).await.unwrap();
        assert!(db.get_run(run.id).await.unwrap().is_none());
        assert!(db.list_files(run.id).await.unwrap().is_empty());
    }
}
