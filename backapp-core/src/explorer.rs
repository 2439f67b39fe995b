use std::sync::Arc;
use tracing::{debug, warn};

use crate::catalog::ProfileCatalog;
use crate::constants::explorer::DEFAULT_BROWSE_PATH;
use crate::models::FileSystemEntry;
use crate::session::{SessionConnector, read_local_dir};
use crate::{BackupError, Result};

/// 文件浏览器 - 浏览服务器目录和本地存储目录
#[derive(Clone)]
pub struct FileExplorer {
    catalog: Arc<dyn ProfileCatalog>,
    connector: Arc<dyn SessionConnector>,
}

fn browse_path(path: Option<&str>) -> &str {
    match path.map(str::trim) {
        Some(path) if !path.is_empty() => path,
        _ => DEFAULT_BROWSE_PATH,
    }
}

impl FileExplorer {
    pub fn new(catalog: Arc<dyn ProfileCatalog>, connector: Arc<dyn SessionConnector>) -> Self {
        Self { catalog, connector }
    }

    /// 列出服务器上某个目录的直接子项，未指定路径时浏览 `/home`
    pub async fn list_server_files(
        &self,
        server_id: i64,
        path: Option<&str>,
    ) -> Result<Vec<FileSystemEntry>> {
        let server = self
            .catalog
            .get_server(server_id)
            .await?
            .ok_or_else(|| BackupError::not_found("server", server_id))?;
        let path = browse_path(path);
        debug!("浏览服务器 {} 的目录: {}", server.name, path);

        let session = self.connector.connect(&server).await?;
        let listing = session.list_dir(path).await;
        session.close().await;

        listing.map_err(|e| {
            warn!("列出服务器 {} 的目录 {} 失败: {}", server.name, path, e);
            BackupError::custom(format!("failed to list {path}: {e}"))
        })
    }

    /// 列出本地目录的直接子项
    pub async fn list_local_files(&self, path: &str) -> Result<Vec<FileSystemEntry>> {
        read_local_dir(path)
            .await
            .map_err(|e| BackupError::custom(format!("failed to list {path}: {e}")))
    }
}
