use anyhow::{Context, Result, bail};
use backapp_core::models::{BackupRunLog, LogLevel, RunStatus};
use serde::Serialize;
use tracing::{info, warn};

use crate::app::CliApp;
use crate::utils::{format_size, status_icon};

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn print_logs(logs: &[BackupRunLog]) {
    for log in logs {
        let line = format!(
            "{} [{}] {}",
            log.timestamp.format("%Y-%m-%d %H:%M:%S"),
            log.level,
            log.message
        );
        match log.level {
            LogLevel::Error | LogLevel::Warning => warn!("{}", line),
            _ => info!("{}", line),
        }
    }
}

/// 列出备份运行
pub async fn list_runs(
    app: &CliApp,
    profile_id: Option<i64>,
    status: Option<&str>,
    json: bool,
) -> Result<()> {
    let status = status
        .map(|s| s.parse::<RunStatus>())
        .transpose()
        .context("无效的运行状态")?;
    let runs = app.service.list_runs(profile_id, status).await?;

    if json {
        return print_json(&runs);
    }
    if runs.is_empty() {
        info!("📦 没有找到备份运行");
        return Ok(());
    }

    info!("📦 备份运行 ({} 条):", runs.len());
    for run in &runs {
        let end = run
            .end_time
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        info!(
            "   {} #{} 配置 {} | {} -> {} | {} 个文件, {}",
            status_icon(run.status),
            run.id,
            run.profile_id,
            run.start_time.format("%Y-%m-%d %H:%M:%S"),
            end,
            run.total_files,
            format_size(run.total_size_bytes)
        );
        if let Some(message) = &run.error_message {
            info!("      错误: {}", message);
        }
    }
    Ok(())
}

/// 显示运行日志
pub async fn show_logs(app: &CliApp, run_id: i64, json: bool) -> Result<()> {
    if app.service.get_run(run_id).await?.is_none() {
        bail!("run {run_id} not found");
    }
    let logs = app.service.get_run_logs(run_id).await?;
    if json {
        return print_json(&logs);
    }
    print_logs(&logs);
    Ok(())
}

/// 列出运行复制的文件
pub async fn list_files(app: &CliApp, run_id: i64, json: bool) -> Result<()> {
    let files = app.service.list_files(run_id).await?;
    if json {
        return print_json(&files);
    }
    if files.is_empty() {
        info!("运行 {} 没有复制任何文件", run_id);
        return Ok(());
    }

    let total: i64 = files.iter().map(|f| f.size_bytes).sum();
    info!("📁 运行 {} 复制了 {} 个文件 ({}):", run_id, files.len(), format_size(total));
    for file in &files {
        info!(
            "   {} -> {} ({})",
            file.remote_path,
            file.local_path,
            format_size(file.size_bytes)
        );
    }
    Ok(())
}

pub async fn delete_run(app: &CliApp, run_id: i64) -> Result<()> {
    app.service.delete_run(run_id).await?;
    info!("🗑️ 运行 {} 已删除", run_id);
    Ok(())
}
