use dashmap::DashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};

use crate::catalog::ProfileCatalog;
use crate::models::{BackupProfile, BackupRun, CommandStage, ProfileCommand, RunStatus, Server};
use crate::naming::{NamingContext, render_directory};
use crate::recorder::{RunRecorder, RunTotals};
use crate::session::{RemoteSession, SessionConnector};
use crate::transfer::TransferExecutor;
use crate::{BackupError, Result};

/// 进程内正在运行的备份配置集合
///
/// 认领是原子的插入判断，同一配置的两个并发请求只有一个能成功。
#[derive(Debug, Clone, Default)]
pub struct ActiveRuns {
    profiles: Arc<DashSet<i64>>,
}

impl ActiveRuns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_claim(&self, profile_id: i64) -> Option<ActiveRunGuard> {
        if self.profiles.insert(profile_id) {
            Some(ActiveRunGuard {
                profiles: Arc::clone(&self.profiles),
                profile_id,
            })
        } else {
            None
        }
    }

    pub fn is_active(&self, profile_id: i64) -> bool {
        self.profiles.contains(&profile_id)
    }
}

/// 释放时归还认领
#[derive(Debug)]
pub struct ActiveRunGuard {
    profiles: Arc<DashSet<i64>>,
    profile_id: i64,
}

impl Drop for ActiveRunGuard {
    fn drop(&mut self) {
        self.profiles.remove(&self.profile_id);
    }
}

/// 已启动的运行
#[derive(Debug)]
pub struct RunHandle {
    pub run: BackupRun,
    handle: JoinHandle<RunStatus>,
}

impl RunHandle {
    /// 等待运行结束，返回最终状态
    pub async fn wait(self) -> Result<RunStatus> {
        Ok(self.handle.await?)
    }
}

/// 备份编排器
#[derive(Clone)]
pub struct BackupRunner {
    catalog: Arc<dyn ProfileCatalog>,
    recorder: RunRecorder,
    connector: Arc<dyn SessionConnector>,
    active: ActiveRuns,
}

impl BackupRunner {
    pub fn new(
        catalog: Arc<dyn ProfileCatalog>,
        recorder: RunRecorder,
        connector: Arc<dyn SessionConnector>,
        active: ActiveRuns,
    ) -> Self {
        Self {
            catalog,
            recorder,
            connector,
            active,
        }
    }

    pub fn recorder(&self) -> &RunRecorder {
        &self.recorder
    }

    pub fn active_runs(&self) -> &ActiveRuns {
        &self.active
    }

    /// 创建 pending 运行并在独立任务中执行
    ///
    /// 配置已有运行时返回 `RunAlreadyActive`，不创建记录。返回时运行记录已写入。
    pub async fn start_run(&self, profile_id: i64) -> Result<RunHandle> {
        let guard = self
            .active
            .try_claim(profile_id)
            .ok_or(BackupError::RunAlreadyActive(profile_id))?;

        let profile = self
            .catalog
            .get_profile(profile_id)
            .await?
            .ok_or_else(|| BackupError::not_found("profile", profile_id))?;

        // 记录创建和执行在同一个任务中，调用方被取消时运行仍会走到终态
        let (created_tx, created_rx) = oneshot::channel();
        let runner = self.clone();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            let run = match runner.recorder.start_run(profile_id).await {
                Ok(run) => run,
                Err(e) => {
                    let _ = created_tx.send(Err(e));
                    return RunStatus::Failed;
                }
            };
            info!("🚀 启动备份运行: 配置 {} ({}), 运行 {}", profile.name, profile.id, run.id);
            let _ = created_tx.send(Ok(run.clone()));
            runner.execute(run, profile).await
        });

        let run = created_rx
            .await
            .map_err(|_| BackupError::custom("run task ended before the run was recorded"))??;
        Ok(RunHandle { run, handle })
    }

    #[instrument(skip(self, run, profile), fields(run_id = run.id, profile_id = profile.id))]
    async fn execute(&self, run: BackupRun, profile: BackupProfile) -> RunStatus {
        let run_id = run.id;
        let recorder = &self.recorder;
        recorder
            .info(run_id, format!("Starting backup for profile {}", profile.name))
            .await;

        let server = match self.catalog.get_server(profile.server_id).await {
            Ok(Some(server)) => server,
            Ok(None) => {
                let err = BackupError::not_found("server", profile.server_id);
                return self.fail(run_id, RunStatus::Pending, RunTotals::default(), &err).await;
            }
            Err(err) => {
                return self.fail(run_id, RunStatus::Pending, RunTotals::default(), &err).await;
            }
        };

        recorder
            .info(
                run_id,
                format!("Connecting to server {} ({}:{})", server.name, server.host, server.port),
            )
            .await;
        let session = match self.connector.connect(&server).await {
            Ok(session) => session,
            Err(e) => {
                let err = BackupError::from(e);
                return self.fail(run_id, RunStatus::Pending, RunTotals::default(), &err).await;
            }
        };

        if let Err(err) = recorder.mark_running(run_id).await {
            session.close().await;
            return self.fail(run_id, RunStatus::Pending, RunTotals::default(), &err).await;
        }
        recorder
            .debug(run_id, format!("Session established: {}", session.describe()))
            .await;

        let mut totals = RunTotals::default();
        let outcome = self
            .run_with_session(run_id, &profile, &server, session.as_ref(), &mut totals)
            .await;
        session.close().await;

        match outcome {
            Ok(()) => {
                recorder
                    .info(
                        run_id,
                        format!(
                            "Backup completed: {} files ({} bytes)",
                            totals.files, totals.bytes
                        ),
                    )
                    .await;
                match recorder.complete_run(run_id, totals).await {
                    Ok(()) => {
                        info!("✅ 备份运行 {} 完成: {} 个文件", run_id, totals.files);
                        RunStatus::Success
                    }
                    Err(e) => {
                        error!("❌ 无法将运行 {} 标记为成功: {}", run_id, e);
                        RunStatus::Failed
                    }
                }
            }
            Err(err) => self.fail(run_id, RunStatus::Running, totals, &err).await,
        }
    }

    /// 目的目录、前置命令、规则、后置命令依次执行，任一失败即停止
    async fn run_with_session(
        &self,
        run_id: i64,
        profile: &BackupProfile,
        server: &Server,
        session: &dyn RemoteSession,
        totals: &mut RunTotals,
    ) -> Result<()> {
        let recorder = &self.recorder;
        let dest_dir = self.prepare_destination(profile, server).await?;
        if let Err(source) = tokio::fs::create_dir_all(&dest_dir).await {
            return Err(BackupError::Destination {
                path: dest_dir.display().to_string(),
                source,
            });
        }
        recorder
            .info(run_id, format!("Backup destination: {}", dest_dir.display()))
            .await;

        let commands = self.catalog.list_commands(profile.id).await?;
        self.run_commands(run_id, session, CommandStage::Pre, &commands)
            .await?;

        let rules = self.catalog.list_file_rules(profile.id).await?;
        if rules.is_empty() {
            recorder
                .warning(run_id, "No file rules configured for this profile")
                .await;
        }

        let executor = TransferExecutor::new(recorder.clone(), run_id);
        let total = rules.len();
        for (index, rule) in rules.iter().enumerate() {
            recorder
                .info(
                    run_id,
                    format!("Processing rule {}/{}: {}", index + 1, total, rule.remote_path),
                )
                .await;

            let files = executor.transfer_rule(rule, session, &dest_dir).await?;
            for file in &files {
                totals.add(file.size_bytes);
            }

            recorder
                .info(
                    run_id,
                    format!(
                        "Rule {} complete: transferred {} files",
                        index + 1,
                        files.len()
                    ),
                )
                .await;
        }

        self.run_commands(run_id, session, CommandStage::Post, &commands)
            .await?;
        Ok(())
    }

    async fn prepare_destination(&self, profile: &BackupProfile, server: &Server) -> Result<PathBuf> {
        let location = self
            .catalog
            .get_storage_location(profile.storage_location_id)
            .await?
            .ok_or_else(|| BackupError::not_found("storage location", profile.storage_location_id))?;
        let naming_rule = self
            .catalog
            .get_naming_rule(profile.naming_rule_id)
            .await?
            .ok_or_else(|| BackupError::not_found("naming rule", profile.naming_rule_id))?;

        let relative = render_directory(
            &naming_rule.pattern,
            &NamingContext {
                profile_name: &profile.name,
                server_name: &server.name,
                now: chrono::Utc::now(),
            },
        );
        Ok(Path::new(&location.base_path).join(relative))
    }

    async fn run_commands(
        &self,
        run_id: i64,
        session: &dyn RemoteSession,
        stage: CommandStage,
        commands: &[ProfileCommand],
    ) -> Result<()> {
        for command in commands.iter().filter(|c| c.run_stage == stage) {
            self.recorder
                .info(
                    run_id,
                    format!("Running {} command: {}", stage.as_str(), command.command),
                )
                .await;

            let output = session
                .run(&command.command)
                .await
                .map_err(|e| BackupError::command(stage.as_str(), &command.command, e.to_string()))?;

            let stdout = output.stdout.trim();
            if !stdout.is_empty() {
                self.recorder
                    .debug(run_id, format!("Command output: {stdout}"))
                    .await;
            }
        }
        Ok(())
    }

    async fn fail(
        &self,
        run_id: i64,
        from: RunStatus,
        totals: RunTotals,
        err: &BackupError,
    ) -> RunStatus {
        let message = err.to_string();
        self.recorder
            .error(run_id, format!("Backup failed: {message}"))
            .await;
        if let Err(e) = self.recorder.fail_run(run_id, from, totals, message).await {
            error!("❌ 无法将运行 {} 标记为失败: {}", run_id, e);
        }
        RunStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::error::{ConnectionError, SessionError};
    use crate::models::{FileRule, FileSystemEntry, LogLevel, NamingRule, StorageLocation};
    use crate::session::{CommandOutput, DefaultConnector, LocalSession, SessionResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::{TempDir, tempdir};

    struct RefusingConnector;

    #[async_trait]
    impl SessionConnector for RefusingConnector {
        async fn connect(
            &self,
            _server: &Server,
        ) -> std::result::Result<Box<dyn RemoteSession>, ConnectionError> {
            Err(ConnectionError::Connect("connection refused".to_string()))
        }
    }

    struct Fixture {
        catalog: InMemoryCatalog,
        source: TempDir,
        storage: TempDir,
    }

    fn fixture() -> Fixture {
        let source = tempdir().unwrap();
        let storage = tempdir().unwrap();
        let catalog = InMemoryCatalog::new();
        catalog.upsert_server(Server {
            id: 1,
            name: "local".to_string(),
            host: "localhost".to_string(),
            port: 22,
            username: "backup".to_string(),
            auth_type: "password".to_string(),
            password: Some("secret".to_string()),
            private_key: None,
        });
        catalog.upsert_storage_location(StorageLocation {
            id: 1,
            name: "disk".to_string(),
            base_path: storage.path().to_string_lossy().to_string(),
        });
        catalog.upsert_naming_rule(NamingRule {
            id: 1,
            name: "plain".to_string(),
            pattern: "{profile}".to_string(),
        });
        catalog.upsert_profile(BackupProfile {
            id: 1,
            name: "docs".to_string(),
            server_id: 1,
            storage_location_id: 1,
            naming_rule_id: 1,
            schedule_cron: String::new(),
            enabled: true,
        });
        Fixture {
            catalog,
            source,
            storage,
        }
    }

    async fn runner(catalog: &InMemoryCatalog, connector: Arc<dyn SessionConnector>) -> BackupRunner {
        let recorder = RunRecorder::new_memory().await.unwrap();
        BackupRunner::new(
            Arc::new(catalog.clone()),
            recorder,
            connector,
            ActiveRuns::new(),
        )
    }

    fn rule(id: i64, path: String, recursive: bool) -> FileRule {
        FileRule {
            id,
            profile_id: 1,
            remote_path: path,
            recursive,
            exclude_pattern: String::new(),
        }
    }

    #[tokio::test]
    async fn test_successful_run_copies_files_and_logs() {
        let fx = fixture();
        std::fs::create_dir_all(fx.source.path().join("a/b")).unwrap();
        std::fs::write(fx.source.path().join("a/b/c.txt"), "abc").unwrap();
        fx.catalog.set_file_rules(
            1,
            vec![rule(10, fx.source.path().to_string_lossy().to_string(), true)],
        );
        fx.catalog.set_commands(
            1,
            vec![ProfileCommand {
                id: 1,
                profile_id: 1,
                command: "echo pre-hook".to_string(),
                run_order: 1,
                run_stage: CommandStage::Pre,
            }],
        );

        let runner = runner(&fx.catalog, Arc::new(DefaultConnector::default())).await;
        let handle = runner.start_run(1).await.unwrap();
        assert_eq!(handle.run.status, RunStatus::Pending);
        let run_id = handle.run.id;

        assert_eq!(handle.wait().await.unwrap(), RunStatus::Success);
        assert!(fx.storage.path().join("docs/a/b/c.txt").is_file());

        let recorder = runner.recorder();
        let run = recorder.get_run(run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Success);
        assert_eq!(run.total_files, 1);
        assert_eq!(run.total_size_bytes, 3);
        assert!(run.end_time.is_some());

        let messages: Vec<_> = recorder
            .get_run_logs(run_id)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.message)
            .collect();
        assert!(messages[0].starts_with("Starting backup"));
        assert!(messages.iter().any(|m| m == "Command output: pre-hook"));
        assert!(messages.iter().any(|m| m.starts_with("Processing rule 1/1")));
        assert!(messages.iter().any(|m| m.contains("completed")));
        assert!(!runner.active_runs().is_active(1));
    }

    #[tokio::test]
    async fn test_missing_rule_path_fails_run_without_files() {
        let fx = fixture();
        fx.catalog.set_file_rules(
            1,
            vec![rule(77, "/no/such/path/for/backup".to_string(), true)],
        );

        let runner = runner(&fx.catalog, Arc::new(DefaultConnector::default())).await;
        let handle = runner.start_run(1).await.unwrap();
        let run_id = handle.run.id;
        assert_eq!(handle.wait().await.unwrap(), RunStatus::Failed);

        let recorder = runner.recorder();
        assert!(recorder.list_files(run_id).await.unwrap().is_empty());
        let run = recorder.get_run(run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.error_message.unwrap().contains("rule 77"));

        let logs = recorder.get_run_logs(run_id).await.unwrap();
        assert!(logs
            .iter()
            .any(|l| l.level == LogLevel::Error && l.message.contains("rule 77")));
    }

    #[tokio::test]
    async fn test_first_failing_rule_stops_later_rules() {
        let fx = fixture();
        std::fs::write(fx.source.path().join("one.txt"), "1").unwrap();
        std::fs::write(fx.source.path().join("three.txt"), "3").unwrap();
        let base = fx.source.path().to_string_lossy().to_string();
        fx.catalog.set_file_rules(
            1,
            vec![
                rule(1, format!("{base}/one.txt"), false),
                rule(2, format!("{base}/missing.txt"), false),
                rule(3, format!("{base}/three.txt"), false),
            ],
        );

        let runner = runner(&fx.catalog, Arc::new(DefaultConnector::default())).await;
        let handle = runner.start_run(1).await.unwrap();
        let run_id = handle.run.id;
        assert_eq!(handle.wait().await.unwrap(), RunStatus::Failed);

        let files = runner.recorder().list_files(run_id).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].rule_id, 1);
        assert!(!fx.storage.path().join("docs/three.txt").exists());
    }

    #[tokio::test]
    async fn test_connection_failure_fails_from_pending() {
        let fx = fixture();
        fx.catalog.set_file_rules(1, vec![rule(1, "/etc/hosts".to_string(), false)]);

        let runner = runner(&fx.catalog, Arc::new(RefusingConnector)).await;
        let handle = runner.start_run(1).await.unwrap();
        let run_id = handle.run.id;
        assert_eq!(handle.wait().await.unwrap(), RunStatus::Failed);

        let recorder = runner.recorder();
        let logs = recorder.get_run_logs(run_id).await.unwrap();
        assert!(logs
            .iter()
            .any(|l| l.message.contains("connection refused")));
        assert!(!logs.iter().any(|l| l.message.starts_with("Processing rule")));
        assert!(recorder.list_files(run_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_active_run_guard_rejects_overlap() {
        let fx = fixture();
        let runner = runner(&fx.catalog, Arc::new(DefaultConnector::default())).await;

        let guard = runner.active_runs().try_claim(1).unwrap();
        assert!(matches!(
            runner.start_run(1).await,
            Err(BackupError::RunAlreadyActive(1))
        ));
        assert!(runner.recorder().list_runs(Some(1), None).await.unwrap().is_empty());

        drop(guard);
        assert!(runner.active_runs().try_claim(1).is_some());
    }

    /// 本地会话包装，统计 close 次数，可让第 N 次复制失败
    struct CountingSession {
        inner: LocalSession,
        closes: Arc<AtomicUsize>,
        copies: AtomicUsize,
        fail_copy_at: Option<usize>,
    }

    #[async_trait]
    impl RemoteSession for CountingSession {
        fn describe(&self) -> String {
            "counting".to_string()
        }
        async fn exists(&self, path: &str) -> SessionResult<bool> {
            self.inner.exists(path).await
        }
        async fn is_dir(&self, path: &str) -> SessionResult<bool> {
            self.inner.is_dir(path).await
        }
        async fn list_files(&self, root: &str, recursive: bool) -> SessionResult<Vec<String>> {
            self.inner.list_files(root, recursive).await
        }
        async fn file_size(&self, path: &str) -> SessionResult<u64> {
            self.inner.file_size(path).await
        }
        async fn copy_file(&self, remote: &str, local: &Path) -> SessionResult<u64> {
            let attempt = self.copies.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_copy_at == Some(attempt) {
                return Err(SessionError::Io("connection reset".to_string()));
            }
            self.inner.copy_file(remote, local).await
        }
        async fn run(&self, command: &str) -> SessionResult<CommandOutput> {
            self.inner.run(command).await
        }
        async fn list_dir(&self, path: &str) -> SessionResult<Vec<FileSystemEntry>> {
            self.inner.list_dir(path).await
        }
        async fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct CountingConnector {
        closes: Arc<AtomicUsize>,
        fail_copy_at: Option<usize>,
    }

    impl CountingConnector {
        fn new(fail_copy_at: Option<usize>) -> (Arc<Self>, Arc<AtomicUsize>) {
            let closes = Arc::new(AtomicUsize::new(0));
            let connector = Arc::new(Self {
                closes: Arc::clone(&closes),
                fail_copy_at,
            });
            (connector, closes)
        }
    }

    #[async_trait]
    impl SessionConnector for CountingConnector {
        async fn connect(
            &self,
            _server: &Server,
        ) -> std::result::Result<Box<dyn RemoteSession>, ConnectionError> {
            Ok(Box::new(CountingSession {
                inner: LocalSession::new(),
                closes: Arc::clone(&self.closes),
                copies: AtomicUsize::new(0),
                fail_copy_at: self.fail_copy_at,
            }))
        }
    }

    fn command(id: i64, text: &str, stage: CommandStage) -> ProfileCommand {
        ProfileCommand {
            id,
            profile_id: 1,
            command: text.to_string(),
            run_order: 1,
            run_stage: stage,
        }
    }

    async fn error_message(runner: &BackupRunner, run_id: i64) -> String {
        let run = runner.recorder().get_run(run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        run.error_message.unwrap_or_default()
    }

    #[tokio::test]
    async fn test_copy_failure_keeps_recorded_files_and_closes_session() {
        let fx = fixture();
        for name in ["a.txt", "b.txt", "c.txt"] {
            std::fs::write(fx.source.path().join(name), name).unwrap();
        }
        fx.catalog.set_file_rules(
            1,
            vec![rule(5, fx.source.path().to_string_lossy().to_string(), false)],
        );

        let (connector, closes) = CountingConnector::new(Some(2));
        let runner = runner(&fx.catalog, connector).await;
        let handle = runner.start_run(1).await.unwrap();
        let run_id = handle.run.id;
        assert_eq!(handle.wait().await.unwrap(), RunStatus::Failed);

        let files = runner.recorder().list_files(run_id).await.unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].remote_path.ends_with("a.txt"));
        assert!(fx.storage.path().join("docs/a.txt").is_file());
        assert!(!fx.storage.path().join("docs/c.txt").exists());

        let message = error_message(&runner, run_id).await;
        assert!(message.contains("rule 5"));
        assert!(message.contains("connection reset"));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_success_path_closes_session_once() {
        let fx = fixture();
        std::fs::write(fx.source.path().join("a.txt"), "a").unwrap();
        fx.catalog.set_file_rules(
            1,
            vec![rule(1, fx.source.path().to_string_lossy().to_string(), false)],
        );

        let (connector, closes) = CountingConnector::new(None);
        let runner = runner(&fx.catalog, connector).await;
        let handle = runner.start_run(1).await.unwrap();
        assert_eq!(handle.wait().await.unwrap(), RunStatus::Success);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_pre_command_fails_before_rules() {
        let fx = fixture();
        std::fs::write(fx.source.path().join("a.txt"), "a").unwrap();
        fx.catalog.set_file_rules(
            1,
            vec![rule(1, fx.source.path().to_string_lossy().to_string(), false)],
        );
        fx.catalog
            .set_commands(1, vec![command(1, "exit 1", CommandStage::Pre)]);

        let (connector, closes) = CountingConnector::new(None);
        let runner = runner(&fx.catalog, connector).await;
        let handle = runner.start_run(1).await.unwrap();
        let run_id = handle.run.id;
        assert_eq!(handle.wait().await.unwrap(), RunStatus::Failed);

        let message = error_message(&runner, run_id).await;
        assert!(message.contains("command failed (pre): exit 1"));
        let logs = runner.recorder().get_run_logs(run_id).await.unwrap();
        assert!(!logs.iter().any(|l| l.message.starts_with("Processing rule")));
        assert!(runner.recorder().list_files(run_id).await.unwrap().is_empty());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_post_command_fails_after_copying() {
        let fx = fixture();
        std::fs::write(fx.source.path().join("a.txt"), "a").unwrap();
        fx.catalog.set_file_rules(
            1,
            vec![rule(1, fx.source.path().to_string_lossy().to_string(), false)],
        );
        fx.catalog
            .set_commands(1, vec![command(1, "exit 3", CommandStage::Post)]);

        let runner = runner(&fx.catalog, Arc::new(DefaultConnector::default())).await;
        let handle = runner.start_run(1).await.unwrap();
        let run_id = handle.run.id;
        assert_eq!(handle.wait().await.unwrap(), RunStatus::Failed);

        assert!(error_message(&runner, run_id)
            .await
            .contains("command failed (post): exit 3"));
        assert_eq!(runner.recorder().list_files(run_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_destination_collision_with_file_fails_run() {
        let fx = fixture();
        let blocker = fx.storage.path().join("occupied");
        std::fs::write(&blocker, "not a directory").unwrap();
        fx.catalog.upsert_storage_location(StorageLocation {
            id: 1,
            name: "disk".to_string(),
            base_path: blocker.to_string_lossy().to_string(),
        });
        fx.catalog.set_file_rules(
            1,
            vec![rule(1, fx.source.path().to_string_lossy().to_string(), false)],
        );

        let (connector, closes) = CountingConnector::new(None);
        let runner = runner(&fx.catalog, connector).await;
        let handle = runner.start_run(1).await.unwrap();
        let run_id = handle.run.id;
        assert_eq!(handle.wait().await.unwrap(), RunStatus::Failed);

        assert!(error_message(&runner, run_id)
            .await
            .contains("failed to create destination directory"));
        let logs = runner.recorder().get_run_logs(run_id).await.unwrap();
        assert!(logs
            .iter()
            .any(|l| l.level == LogLevel::Error && l.message.starts_with("Backup failed")));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
