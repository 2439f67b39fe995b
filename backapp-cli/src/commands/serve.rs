use anyhow::Result;
use backapp_core::scheduler::SchedulerEvent;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::app::CliApp;

/// 启动调度服务，阻塞到 Ctrl+C
pub async fn run_serve(app: &CliApp) -> Result<()> {
    info!("🗄️ Backapp 调度服务启动");

    let recovered = app.service.recover().await?;
    if recovered > 0 {
        info!("   已将 {} 个中断的运行标记为失败", recovered);
    }

    let scheduler = app.service.scheduler();
    let mut events = if !app.config.scheduler.enabled {
        warn!("⚠️ 配置中已停用调度器，只保留手动触发");
        scheduler.subscribe()
    } else {
        let (events, failures) = scheduler.start().await?;
        for failure in &failures {
            warn!("   ⚠️ {}", failure);
        }
        for profile_id in scheduler.scheduled_profiles() {
            if let Some(next) = scheduler.next_fire_time(profile_id) {
                info!("   ⏰ 配置 {} 下次运行: {}", profile_id, next.format("%Y-%m-%d %H:%M UTC"));
            }
        }
        events
    };

    let watcher = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SchedulerEvent::RunStarted { profile_id, run_id }) => {
                    info!("🚀 配置 {} 开始运行 {}", profile_id, run_id);
                }
                Ok(SchedulerEvent::TickSkipped { profile_id, reason }) => {
                    warn!("⏭️ 配置 {} 跳过本次触发: {}", profile_id, reason);
                }
                Ok(SchedulerEvent::TickFailed { profile_id, error }) => {
                    warn!("❌ 配置 {} 触发失败: {}", profile_id, error);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("调度事件积压，丢弃 {} 条", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    info!("按 Ctrl+C 停止服务");
    tokio::signal::ctrl_c().await?;

    info!("🛑 收到停止信号，正在关闭调度器");
    scheduler.shutdown();
    watcher.abort();
    Ok(())
}
