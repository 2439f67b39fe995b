use anyhow::{Context, Result};
use backapp_core::catalog::{InMemoryCatalog, ProfileCatalog};
use backapp_core::config::AppConfig;
use backapp_core::orchestrator::{ActiveRuns, BackupRunner};
use backapp_core::recorder::RunRecorder;
use backapp_core::scheduler::{Scheduler, SystemClock};
use backapp_core::service::BackupService;
use backapp_core::session::{DefaultConnector, SessionConnector};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cli::Commands;
use crate::commands;

#[derive(Clone)]
pub struct CliApp {
    pub config: AppConfig,
    pub catalog: InMemoryCatalog,
    pub service: BackupService,
}

impl CliApp {
    /// 加载配置与备份清单，组装服务
    pub async fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => AppConfig::load_from_file(path)
                .with_context(|| format!("无法加载配置文件 {}", path.display()))?,
            None => AppConfig::find_and_load_config()?,
        };

        let catalog_path = config.catalog_path();
        let catalog = if catalog_path.exists() {
            InMemoryCatalog::load(&catalog_path)
                .with_context(|| format!("无法加载备份清单 {}", catalog_path.display()))?
        } else {
            warn!("⚠️ 备份清单不存在: {}，使用空清单", catalog_path.display());
            InMemoryCatalog::new()
        };

        let recorder = RunRecorder::connect(config.database_path()).await?;
        info!("数据库已连接: {}", config.database_path().display());

        let shared: Arc<dyn ProfileCatalog> = Arc::new(catalog.clone());
        let connector: Arc<dyn SessionConnector> =
            Arc::new(DefaultConnector::new(config.connect_timeout()));
        let runner = BackupRunner::new(
            Arc::clone(&shared),
            recorder,
            Arc::clone(&connector),
            ActiveRuns::new(),
        );
        let scheduler = Scheduler::new(runner.clone(), Arc::clone(&shared), Arc::new(SystemClock));
        let service = BackupService::new(shared, connector, runner, scheduler);

        Ok(Self {
            config,
            catalog,
            service,
        })
    }

    /// 运行应用命令
    pub async fn run_command(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Serve => commands::run_serve(self).await,
            Commands::Run { profile_id, wait } => commands::run_backup(self, profile_id, wait).await,
            Commands::Runs {
                profile,
                status,
                json,
            } => commands::list_runs(self, profile, status.as_deref(), json).await,
            Commands::Logs { run_id, json } => commands::show_logs(self, run_id, json).await,
            Commands::Files { run_id, json } => commands::list_files(self, run_id, json).await,
            Commands::Delete { run_id } => commands::delete_run(self, run_id).await,
            Commands::TestConnection { server_id } => {
                commands::test_connection(self, server_id).await
            }
            Commands::Browse { server_id, path } => {
                commands::browse_server(self, server_id, path.as_deref()).await
            }
            Commands::Local { path } => commands::browse_local(self, &path).await,
            Commands::Check => commands::run_check(self).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backapp_core::models::RunStatus;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_app_runs_local_profile_from_config_files() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source");
        let storage = dir.path().join("storage");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("notes.txt"), "hello").unwrap();

        let catalog_path = dir.path().join("catalog.toml");
        std::fs::write(
            &catalog_path,
            format!(
                r#"
[[servers]]
id = 1
name = "self"
host = "localhost"
username = "backup"
auth_type = "password"
password = "unused"

[[storage_locations]]
id = 1
name = "disk"
base_path = '{}'

[[naming_rules]]
id = 1
name = "plain"
pattern = "{{profile}}"

[[profiles]]
id = 1
name = "notes"
server_id = 1
storage_location_id = 1
naming_rule_id = 1
schedule_cron = "@daily"

[[profiles.file_rules]]
id = 1
remote_path = '{}'
"#,
                storage.display(),
                source.display()
            ),
        )
        .unwrap();

        let config_path = dir.path().join("backapp.toml");
        std::fs::write(
            &config_path,
            format!(
                "[database]\npath = '{}'\n\n[catalog]\npath = '{}'\n",
                dir.path().join("backapp.db").display(),
                catalog_path.display()
            ),
        )
        .unwrap();

        let app = CliApp::new(Some(&config_path)).await.unwrap();
        app.run_command(Commands::Check).await.unwrap();
        app.run_command(Commands::TestConnection { server_id: 1 })
            .await
            .unwrap();
        assert!(app
            .run_command(Commands::TestConnection { server_id: 9 })
            .await
            .is_err());
        app.run_command(Commands::Run {
            profile_id: 1,
            wait: true,
        })
        .await
        .unwrap();

        let runs = app.service.list_runs(Some(1), None).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Success);
        assert!(storage.join("notes").join("notes.txt").exists());
    }
}
