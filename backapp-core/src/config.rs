use crate::constants::{config, session};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 应用配置结构
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub ssh: SshConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// 数据库相关配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

/// 备份清单相关配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CatalogConfig {
    pub path: String,
}

/// SSH相关配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SshConfig {
    pub connect_timeout_secs: u64,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: session::DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

/// 调度相关配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                path: config::get_database_path().to_string_lossy().to_string(),
            },
            catalog: CatalogConfig {
                path: config::get_catalog_path().to_string_lossy().to_string(),
            },
            ssh: SshConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl AppConfig {
    /// 智能查找并加载配置文件
    /// 按优先级查找：backapp.toml -> config.toml -> .backapp.toml
    pub fn find_and_load_config() -> Result<Self> {
        for config_file in config::CONFIG_FILE_CANDIDATES {
            if Path::new(config_file).exists() {
                tracing::info!("找到配置文件: {}", config_file);
                return Self::load_from_file(config_file);
            }
        }

        // 如果没找到配置文件，创建默认配置
        tracing::warn!("未找到配置文件，创建默认配置: {}", config::CONFIG_FILE_NAME);
        let default_config = Self::default();
        default_config.save_to_file(config::CONFIG_FILE_NAME)?;
        Ok(default_config)
    }

    /// 从指定文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config: AppConfig = toml::from_str(&content)?;

        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&path, self.to_toml_with_comments())?;
        Ok(())
    }

    /// 生成带注释的TOML配置
    fn to_toml_with_comments(&self) -> String {
        const TEMPLATE: &str = include_str!("../templates/backapp.toml.template");

        TEMPLATE
            .replace("{database_path}", &escape_toml(&self.database.path))
            .replace("{catalog_path}", &escape_toml(&self.catalog.path))
            .replace(
                "{connect_timeout_secs}",
                &self.ssh.connect_timeout_secs.to_string(),
            )
            .replace("{scheduler_enabled}", &self.scheduler.enabled.to_string())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.ssh.connect_timeout_secs.max(1))
    }

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.database.path)
    }

    pub fn catalog_path(&self) -> PathBuf {
        PathBuf::from(&self.catalog.path)
    }
}

fn escape_toml(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
