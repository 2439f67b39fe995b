use crate::db::{DuckDbManager, RunSummary};
use crate::models::{BackupFile, BackupRun, BackupRunLog, LogLevel, RunStatus};
use crate::Result;
use chrono::Utc;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// 运行记录器 - 运行、文件、日志三类记录的唯一写入方
#[derive(Debug, Clone)]
pub struct RunRecorder {
    manager: DuckDbManager,
}

/// 运行累计的文件数与字节数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub files: i64,
    pub bytes: i64,
}

impl RunTotals {
    pub fn add(&mut self, size_bytes: i64) {
        self.files += 1;
        self.bytes += size_bytes;
    }
}

impl RunRecorder {
    /// 连接到数据库文件
    pub async fn connect<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let manager = DuckDbManager::new(db_path).await?;
        Ok(Self { manager })
    }

    /// 内存数据库，测试使用
    pub async fn new_memory() -> Result<Self> {
        let manager = DuckDbManager::new_memory().await?;
        Ok(Self { manager })
    }

    /// 创建 pending 状态的运行
    pub async fn start_run(&self, profile_id: i64) -> Result<BackupRun> {
        let run = self.manager.create_run(profile_id, Utc::now()).await?;
        debug!(run_id = run.id, profile_id, "已创建备份运行");
        Ok(run)
    }

    /// pending → running
    pub async fn mark_running(&self, run_id: i64) -> Result<()> {
        self.manager
            .transition_run(run_id, RunStatus::Pending, RunStatus::Running)
            .await
    }

    /// running → success
    pub async fn complete_run(&self, run_id: i64, totals: RunTotals) -> Result<()> {
        self.manager
            .finish_run(
                run_id,
                RunStatus::Running,
                RunSummary {
                    status: RunStatus::Success,
                    end_time: Utc::now(),
                    total_files: totals.files,
                    total_size_bytes: totals.bytes,
                    error_message: None,
                },
            )
            .await
    }

    /// `from` → failed，保留错误信息供展示
    pub async fn fail_run(
        &self,
        run_id: i64,
        from: RunStatus,
        totals: RunTotals,
        error_message: impl Into<String>,
    ) -> Result<()> {
        self.manager
            .finish_run(
                run_id,
                from,
                RunSummary {
                    status: RunStatus::Failed,
                    end_time: Utc::now(),
                    total_files: totals.files,
                    total_size_bytes: totals.bytes,
                    error_message: Some(error_message.into()),
                },
            )
            .await
    }

    /// 启动时调用：上次进程遗留的 pending/running 运行不可能再完成
    pub async fn fail_interrupted_runs(&self) -> Result<usize> {
        let count = self
            .manager
            .fail_interrupted_runs(Utc::now(), "interrupted by process restart".to_string())
            .await?;
        if count > 0 {
            warn!("已将 {} 个中断的备份运行标记为失败", count);
        }
        Ok(count)
    }

    /// 追加一行运行日志
    ///
    /// 写入失败只报告到 tracing，不会中断运行。
    pub async fn append_log(&self, run_id: i64, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Debug => debug!(run_id, "{}", message),
            LogLevel::Info => info!(run_id, "{}", message),
            LogLevel::Warning => warn!(run_id, "{}", message),
            LogLevel::Error => error!(run_id, "{}", message),
        }

        if let Err(e) = self
            .manager
            .append_log(run_id, Utc::now(), level, message)
            .await
        {
            warn!(run_id, "写入运行日志失败: {}", e);
        }
    }

    pub async fn debug(&self, run_id: i64, message: impl Into<String>) {
        self.append_log(run_id, LogLevel::Debug, message).await;
    }

    pub async fn info(&self, run_id: i64, message: impl Into<String>) {
        self.append_log(run_id, LogLevel::Info, message).await;
    }

    pub async fn warning(&self, run_id: i64, message: impl Into<String>) {
        self.append_log(run_id, LogLevel::Warning, message).await;
    }

    pub async fn error(&self, run_id: i64, message: impl Into<String>) {
        self.append_log(run_id, LogLevel::Error, message).await;
    }

    /// 记录一个已落盘的文件
    pub async fn record_file(
        &self,
        run_id: i64,
        rule_id: i64,
        remote_path: impl Into<String>,
        local_path: impl Into<String>,
        size_bytes: i64,
    ) -> Result<BackupFile> {
        self.manager
            .record_file(
                run_id,
                rule_id,
                remote_path.into(),
                local_path.into(),
                size_bytes,
            )
            .await
    }

    pub async fn get_run(&self, run_id: i64) -> Result<Option<BackupRun>> {
        self.manager.get_run(run_id).await
    }

    pub async fn list_runs(
        &self,
        profile_id: Option<i64>,
        status: Option<RunStatus>,
    ) -> Result<Vec<BackupRun>> {
        self.manager.list_runs(profile_id, status).await
    }

    pub async fn list_files(&self, run_id: i64) -> Result<Vec<BackupFile>> {
        self.manager.list_files(run_id).await
    }

    pub async fn get_file(&self, file_id: i64) -> Result<Option<BackupFile>> {
        self.manager.get_file(file_id).await
    }

    pub async fn get_run_logs(&self, run_id: i64) -> Result<Vec<BackupRunLog>> {
        self.manager.get_run_logs(run_id).await
    }

    pub async fn delete_run(&self, run_id: i64) -> Result<()> {
        self.manager.delete_run(run_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failed_before_session_keeps_error_message() {
        let recorder = RunRecorder::new_memory().await.unwrap();
        let run = recorder.start_run(5).await.unwrap();

        recorder
            .error(run.id, "Failed to connect: connection refused")
            .await;
        recorder
            .fail_run(
                run.id,
                RunStatus::Pending,
                RunTotals::default(),
                "connection refused",
            )
            .await
            .unwrap();

        let stored = recorder.get_run(run.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        assert_eq!(stored.error_message.as_deref(), Some("connection refused"));

        let logs = recorder.get_run_logs(run.id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].level, LogLevel::Error);
    }

    #[tokio::test]
    async fn test_complete_run_stores_totals() {
        let recorder = RunRecorder::new_memory().await.unwrap();
        let run = recorder.start_run(1).await.unwrap();
        recorder.mark_running(run.id).await.unwrap();

        let mut totals = RunTotals::default();
        totals.add(100);
        totals.add(24);
        recorder.complete_run(run.id, totals).await.unwrap();

        let stored = recorder.get_run(run.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Success);
        assert_eq!(stored.total_files, 2);
        assert_eq!(stored.total_size_bytes, 124);

        // 终态之后不能再失败
        assert!(recorder
            .fail_run(run.id, RunStatus::Running, totals, "late")
            .await
            .is_err());
    }
}
