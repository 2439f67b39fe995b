// 配置实体的只读视图
//
// 服务器、备份配置、文件规则等实体由外部配置管理持久化，引擎只通过
// `ProfileCatalog` 读取。`InMemoryCatalog` 是该接口的内存实现，可以从
// TOML 清单文件加载，也供测试直接构造。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::models::{
    BackupProfile, CommandStage, FileRule, NamingRule, ProfileCommand, Server, StorageLocation,
};
use crate::{BackupError, Result};

/// 配置实体读取接口
#[async_trait]
pub trait ProfileCatalog: Send + Sync {
    async fn get_profile(&self, id: i64) -> Result<Option<BackupProfile>>;

    async fn list_profiles(&self) -> Result<Vec<BackupProfile>>;

    async fn get_server(&self, id: i64) -> Result<Option<Server>>;

    /// 按配置中声明的顺序返回规则
    async fn list_file_rules(&self, profile_id: i64) -> Result<Vec<FileRule>>;

    /// 按 run_order 排序
    async fn list_commands(&self, profile_id: i64) -> Result<Vec<ProfileCommand>>;

    async fn get_storage_location(&self, id: i64) -> Result<Option<StorageLocation>>;

    async fn get_naming_rule(&self, id: i64) -> Result<Option<NamingRule>>;
}

/// 清单文件中的备份配置，规则与命令内联
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileEntry {
    #[serde(flatten)]
    pub profile: BackupProfile,
    #[serde(default)]
    pub file_rules: Vec<FileRule>,
    #[serde(default)]
    pub commands: Vec<ProfileCommand>,
}

/// TOML 清单文件结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub servers: Vec<Server>,
    #[serde(default)]
    pub storage_locations: Vec<StorageLocation>,
    #[serde(default)]
    pub naming_rules: Vec<NamingRule>,
    #[serde(default)]
    pub profiles: Vec<ProfileEntry>,
}

impl CatalogFile {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

#[derive(Debug, Default)]
struct CatalogData {
    servers: BTreeMap<i64, Server>,
    storage_locations: BTreeMap<i64, StorageLocation>,
    naming_rules: BTreeMap<i64, NamingRule>,
    profiles: BTreeMap<i64, BackupProfile>,
    file_rules: BTreeMap<i64, Vec<FileRule>>,
    commands: BTreeMap<i64, Vec<ProfileCommand>>,
}

/// 内存中的配置清单
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    data: Arc<RwLock<CatalogData>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从清单文件构建
    pub fn from_file(file: CatalogFile) -> Result<Self> {
        let catalog = Self::new();
        for server in file.servers {
            catalog.upsert_server(server);
        }
        for location in file.storage_locations {
            catalog.upsert_storage_location(location);
        }
        for rule in file.naming_rules {
            catalog.upsert_naming_rule(rule);
        }
        for entry in file.profiles {
            let profile_id = entry.profile.id;
            if catalog.read().profiles.contains_key(&profile_id) {
                return Err(BackupError::custom(format!(
                    "duplicate profile id in catalog: {profile_id}"
                )));
            }
            catalog.upsert_profile(entry.profile);
            catalog.set_file_rules(profile_id, entry.file_rules);
            catalog.set_commands(profile_id, entry.commands);
        }
        Ok(catalog)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = CatalogFile::load_from_file(path)?;
        tracing::info!(
            "已加载备份清单: {} ({} 个备份配置)",
            path.display(),
            file.profiles.len()
        );
        Self::from_file(file)
    }

    pub fn upsert_server(&self, server: Server) {
        self.write().servers.insert(server.id, server);
    }

    pub fn upsert_storage_location(&self, location: StorageLocation) {
        self.write().storage_locations.insert(location.id, location);
    }

    pub fn upsert_naming_rule(&self, rule: NamingRule) {
        self.write().naming_rules.insert(rule.id, rule);
    }

    pub fn upsert_profile(&self, profile: BackupProfile) {
        self.write().profiles.insert(profile.id, profile);
    }

    pub fn remove_profile(&self, id: i64) {
        let mut data = self.write();
        data.profiles.remove(&id);
        data.file_rules.remove(&id);
        data.commands.remove(&id);
    }

    pub fn set_file_rules(&self, profile_id: i64, rules: Vec<FileRule>) {
        let rules = rules
            .into_iter()
            .map(|mut rule| {
                rule.profile_id = profile_id;
                rule
            })
            .collect();
        self.write().file_rules.insert(profile_id, rules);
    }

    pub fn set_commands(&self, profile_id: i64, commands: Vec<ProfileCommand>) {
        let mut commands: Vec<ProfileCommand> = commands
            .into_iter()
            .map(|mut command| {
                command.profile_id = profile_id;
                command
            })
            .collect();
        commands.sort_by_key(|c| (c.run_stage == CommandStage::Post, c.run_order, c.id));
        self.write().commands.insert(profile_id, commands);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, CatalogData> {
        // 写锁内不会 panic，出现中毒时沿用内部数据
        self.data.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, CatalogData> {
        self.data.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ProfileCatalog for InMemoryCatalog {
    async fn get_profile(&self, id: i64) -> Result<Option<BackupProfile>> {
        Ok(self.read().profiles.get(&id).cloned())
    }

    async fn list_profiles(&self) -> Result<Vec<BackupProfile>> {
        Ok(self.read().profiles.values().cloned().collect())
    }

    async fn get_server(&self, id: i64) -> Result<Option<Server>> {
        Ok(self.read().servers.get(&id).cloned())
    }

    async fn list_file_rules(&self, profile_id: i64) -> Result<Vec<FileRule>> {
        Ok(self
            .read()
            .file_rules
            .get(&profile_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_commands(&self, profile_id: i64) -> Result<Vec<ProfileCommand>> {
        Ok(self
            .read()
            .commands
            .get(&profile_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_storage_location(&self, id: i64) -> Result<Option<StorageLocation>> {
        Ok(self.read().storage_locations.get(&id).cloned())
    }

    async fn get_naming_rule(&self, id: i64) -> Result<Option<NamingRule>> {
        Ok(self.read().naming_rules.get(&id).cloned())
    }
}
