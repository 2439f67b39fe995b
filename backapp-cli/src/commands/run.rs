use anyhow::{Result, bail};
use backapp_core::models::RunStatus;
use tracing::info;

use crate::app::CliApp;
use crate::commands::history::print_logs;
use crate::utils::{format_size, status_icon};

/// 立即执行一次备份
///
/// 运行在本进程内执行，所以总会等待其结束；`wait` 额外打印日志并在失败时返回错误。
pub async fn run_backup(app: &CliApp, profile_id: i64, wait: bool) -> Result<()> {
    let handle = app.service.start_run(profile_id).await?;
    info!("🚀 已创建运行 {} (配置 {})", handle.run.id, profile_id);

    let run = app.service.wait_for(handle).await?;
    info!(
        "{} 运行 {} 结束: {}，{} 个文件，{}",
        status_icon(run.status),
        run.id,
        run.status,
        run.total_files,
        format_size(run.total_size_bytes)
    );

    if wait {
        let logs = app.service.get_run_logs(run.id).await?;
        print_logs(&logs);

        if run.status == RunStatus::Failed {
            let message = run.error_message.unwrap_or_default();
            bail!("run {} failed: {}", run.id, message);
        }
    }
    Ok(())
}
