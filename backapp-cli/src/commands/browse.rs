use anyhow::Result;
use backapp_core::models::FileSystemEntry;
use tracing::info;

use crate::app::CliApp;
use crate::utils::format_size;

fn print_entries(entries: &[FileSystemEntry]) {
    if entries.is_empty() {
        info!("   (空目录)");
    }
    for entry in entries {
        if entry.is_dir {
            info!("   📁 {}/", entry.name);
        } else {
            info!("   📄 {} ({})", entry.name, format_size(entry.size as i64));
        }
    }
}

pub async fn browse_server(app: &CliApp, server_id: i64, path: Option<&str>) -> Result<()> {
    let entries = app.service.list_server_files(server_id, path).await?;
    info!("🖥️ 服务器 {} 的目录内容:", server_id);
    print_entries(&entries);
    Ok(())
}

pub async fn browse_local(app: &CliApp, path: &str) -> Result<()> {
    let entries = app.service.list_local_files(path).await?;
    info!("💾 本地目录 {}:", path);
    print_entries(&entries);
    Ok(())
}

/// 按服务器配置连接并执行存活检测
pub async fn test_connection(app: &CliApp, server_id: i64) -> Result<()> {
    let session = app.service.test_connection(server_id).await?;
    info!("✅ 服务器 {} 连接正常: {}", server_id, session);
    Ok(())
}
