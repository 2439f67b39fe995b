use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::catalog::ProfileCatalog;
use crate::constants::session::LIVENESS_COMMAND;
use crate::error::ConnectionError;
use crate::explorer::FileExplorer;
use crate::models::{BackupFile, BackupProfile, BackupRun, BackupRunLog, FileSystemEntry, RunStatus};
use crate::orchestrator::{BackupRunner, RunHandle};
use crate::recorder::RunRecorder;
use crate::scheduler::Scheduler;
use crate::session::SessionConnector;
use crate::{BackupError, Result};

/// 备份服务门面，供 CLI 或 REST 层调用
#[derive(Clone)]
pub struct BackupService {
    catalog: Arc<dyn ProfileCatalog>,
    connector: Arc<dyn SessionConnector>,
    runner: BackupRunner,
    scheduler: Scheduler,
    explorer: FileExplorer,
}

impl BackupService {
    pub fn new(
        catalog: Arc<dyn ProfileCatalog>,
        connector: Arc<dyn SessionConnector>,
        runner: BackupRunner,
        scheduler: Scheduler,
    ) -> Self {
        Self {
            explorer: FileExplorer::new(Arc::clone(&catalog), Arc::clone(&connector)),
            catalog,
            connector,
            runner,
            scheduler,
        }
    }

    fn recorder(&self) -> &RunRecorder {
        self.runner.recorder()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// 启动时将上次进程遗留的未完成运行标记为失败
    pub async fn recover(&self) -> Result<usize> {
        self.recorder().fail_interrupted_runs().await
    }

    /// 手动触发一次运行，返回 pending 状态的记录
    pub async fn create_run(&self, profile_id: i64) -> Result<BackupRun> {
        Ok(self.start_run(profile_id).await?.run)
    }

    /// 手动触发一次运行，调用方可等待其结束
    pub async fn start_run(&self, profile_id: i64) -> Result<RunHandle> {
        self.runner.start_run(profile_id).await
    }

    pub async fn get_run(&self, run_id: i64) -> Result<Option<BackupRun>> {
        self.recorder().get_run(run_id).await
    }

    pub async fn list_runs(
        &self,
        profile_id: Option<i64>,
        status: Option<RunStatus>,
    ) -> Result<Vec<BackupRun>> {
        self.recorder().list_runs(profile_id, status).await
    }

    pub async fn list_files(&self, run_id: i64) -> Result<Vec<BackupFile>> {
        self.recorder().list_files(run_id).await
    }

    pub async fn get_file(&self, file_id: i64) -> Result<Option<BackupFile>> {
        self.recorder().get_file(file_id).await
    }

    pub async fn get_run_logs(&self, run_id: i64) -> Result<Vec<BackupRunLog>> {
        self.recorder().get_run_logs(run_id).await
    }

    /// 删除已结束的运行及其复制到本地的文件
    pub async fn delete_run(&self, run_id: i64) -> Result<()> {
        let files = self.recorder().list_files(run_id).await?;
        self.recorder().delete_run(run_id).await?;

        let mut removed = 0usize;
        for file in &files {
            match tokio::fs::remove_file(Path::new(&file.local_path)).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("删除备份文件 {} 失败: {}", file.local_path, e),
            }
        }
        info!("🗑️ 已删除运行 {}，清理 {} 个本地文件", run_id, removed);
        Ok(())
    }

    /// 配置保存后重新调度，调度失败只记录日志
    pub async fn profile_saved(&self, profile: &BackupProfile) {
        if let Err(e) = self.scheduler.schedule_profile(profile).await {
            warn!("⚠️ 备份配置 {} 已保存，但调度失败: {}", profile.id, e);
        }
    }

    pub fn profile_deleted(&self, profile_id: i64) {
        self.scheduler.unschedule_profile(profile_id);
    }

    /// 按服务器的认证方式连接并执行存活检测，返回会话描述
    pub async fn test_connection(&self, server_id: i64) -> Result<String> {
        let server = self
            .catalog
            .get_server(server_id)
            .await?
            .ok_or_else(|| BackupError::not_found("server", server_id))?;
        info!("🔌 测试服务器连接: {} ({}:{})", server.name, server.host, server.port);

        let session = self.connector.connect(&server).await?;
        let outcome = session.run(LIVENESS_COMMAND).await;
        let description = session.describe();
        session.close().await;

        let output = outcome.map_err(|e| ConnectionError::Liveness(e.to_string()))?;
        let reply = output.stdout.trim();
        if reply != "test" {
            return Err(ConnectionError::Liveness(format!("unexpected reply `{reply}`")).into());
        }
        Ok(description)
    }

    pub async fn list_server_files(
        &self,
        server_id: i64,
        path: Option<&str>,
    ) -> Result<Vec<FileSystemEntry>> {
        self.explorer.list_server_files(server_id, path).await
    }

    pub async fn list_local_files(&self, path: &str) -> Result<Vec<FileSystemEntry>> {
        self.explorer.list_local_files(path).await
    }

    /// 等待运行结束，查询最终记录
    pub async fn wait_for(&self, handle: RunHandle) -> Result<BackupRun> {
        let run_id = handle.run.id;
        handle.wait().await?;
        self.get_run(run_id)
            .await?
            .ok_or_else(|| BackupError::not_found("run", run_id))
    }
}
