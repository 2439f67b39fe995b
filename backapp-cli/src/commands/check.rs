use anyhow::{Result, bail};
use backapp_core::catalog::ProfileCatalog;
use backapp_core::models::BackupProfile;
use backapp_core::scheduler::CronSchedule;
use tracing::{info, warn};

use crate::app::CliApp;

/// 检查单个备份配置，返回发现的问题
async fn check_profile(catalog: &dyn ProfileCatalog, profile: &BackupProfile) -> Result<Vec<String>> {
    let mut issues = Vec::new();

    let server = catalog.get_server(profile.server_id).await?;
    match &server {
        None => issues.push(format!("missing server {}", profile.server_id)),
        Some(server) => {
            if let Err(e) = server.auth_kind() {
                issues.push(e.to_string());
            }
        }
    }
    if catalog
        .get_storage_location(profile.storage_location_id)
        .await?
        .is_none()
    {
        issues.push(format!("missing storage location {}", profile.storage_location_id));
    }
    if catalog.get_naming_rule(profile.naming_rule_id).await?.is_none() {
        issues.push(format!("missing naming rule {}", profile.naming_rule_id));
    }

    let cron = profile.schedule_cron.trim();
    if !cron.is_empty() {
        if let Err(e) = cron.parse::<CronSchedule>() {
            issues.push(format!("invalid cron `{cron}`: {e}"));
        }
    }

    if catalog.list_file_rules(profile.id).await?.is_empty() {
        issues.push("no file rules configured".to_string());
    }
    Ok(issues)
}

/// 检查配置与备份清单
pub async fn run_check(app: &CliApp) -> Result<()> {
    info!("🔍 检查配置");
    info!("   数据库: {}", app.config.database_path().display());
    info!("   备份清单: {}", app.config.catalog_path().display());
    info!("   SSH 连接超时: {} 秒", app.config.ssh.connect_timeout_secs);
    info!(
        "   调度器: {}",
        if app.config.scheduler.enabled { "启用" } else { "停用" }
    );

    let profiles = app.catalog.list_profiles().await?;
    info!("📋 备份配置 ({} 个):", profiles.len());

    let mut problem_count = 0;
    for profile in &profiles {
        let issues = check_profile(&app.catalog, profile).await?;
        let state = if profile.enabled { "启用" } else { "停用" };
        if issues.is_empty() {
            info!("   ✅ #{} {} ({})", profile.id, profile.name, state);
        } else {
            warn!("   ⚠️ #{} {} ({})", profile.id, profile.name, state);
            for issue in &issues {
                warn!("      - {}", issue);
            }
            problem_count += 1;
        }
    }

    if problem_count > 0 {
        bail!("{problem_count} profile(s) have problems");
    }
    info!("✅ 检查通过");
    Ok(())
}
