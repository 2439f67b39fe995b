// 备份调度器
//
// 每个启用且配置了 cron 的备份配置对应一个定时任务。定时任务到点后
// 通过编排器启动运行；同一配置已有运行时本次触发直接丢弃并发出事件。

mod clock;
mod cron;

pub use clock::{Clock, ManualClock, SystemClock};
pub use cron::{CronParseError, CronSchedule};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::catalog::ProfileCatalog;
use crate::constants::scheduler::EVENT_CHANNEL_CAPACITY;
use crate::error::SchedulingError;
use crate::models::BackupProfile;
use crate::orchestrator::BackupRunner;
use crate::{BackupError, Result};

/// 调度器对外广播的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    RunStarted { profile_id: i64, run_id: i64 },
    /// 上一次运行尚未结束，本次触发被丢弃
    TickSkipped { profile_id: i64, reason: String },
    TickFailed { profile_id: i64, error: String },
}

struct ScheduledEntry {
    expression: String,
    schedule: CronSchedule,
    handle: JoinHandle<()>,
}

/// 按 cron 表达式触发备份运行
#[derive(Clone)]
pub struct Scheduler {
    runner: BackupRunner,
    catalog: Arc<dyn ProfileCatalog>,
    clock: Arc<dyn Clock>,
    timers: Arc<DashMap<i64, ScheduledEntry>>,
    events: broadcast::Sender<SchedulerEvent>,
}

impl Scheduler {
    pub fn new(
        runner: BackupRunner,
        catalog: Arc<dyn ProfileCatalog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            runner,
            catalog,
            clock,
            timers: Arc::new(DashMap::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    /// 安装或替换配置的定时任务
    ///
    /// 停用或未配置 cron 时只取消已有任务。表达式无效或服务器缺失时同样
    /// 取消已有任务并返回错误。
    pub async fn schedule_profile(
        &self,
        profile: &BackupProfile,
    ) -> std::result::Result<(), SchedulingError> {
        let profile_id = profile.id;
        let expression = profile.schedule_cron.trim();

        if !profile.enabled || expression.is_empty() {
            if self.unschedule_profile(profile_id) {
                info!("备份配置 {} 已停用或未设置 cron，已取消定时任务", profile_id);
            }
            return Ok(());
        }

        let schedule = match expression.parse::<CronSchedule>() {
            Ok(schedule) => schedule,
            Err(e) => {
                self.unschedule_profile(profile_id);
                return Err(SchedulingError::InvalidCron {
                    profile_id,
                    expression: expression.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let server_exists = match self.catalog.get_server(profile.server_id).await {
            Ok(server) => server.is_some(),
            Err(e) => {
                warn!("查询服务器 {} 失败: {}", profile.server_id, e);
                false
            }
        };
        if !server_exists {
            self.unschedule_profile(profile_id);
            return Err(SchedulingError::MissingServer {
                profile_id,
                server_id: profile.server_id,
            });
        }

        let handle = self.spawn_timer(profile_id, schedule.clone());
        let entry = ScheduledEntry {
            expression: expression.to_string(),
            schedule,
            handle,
        };
        // 原子替换，旧任务随即取消
        if let Some(previous) = self.timers.insert(profile_id, entry) {
            previous.handle.abort();
        }

        info!("⏰ 已为备份配置 {} 安装定时任务: {}", profile_id, expression);
        Ok(())
    }

    /// 取消定时任务，返回此前是否存在
    pub fn unschedule_profile(&self, profile_id: i64) -> bool {
        match self.timers.remove(&profile_id) {
            Some((_, entry)) => {
                entry.handle.abort();
                debug!("已取消备份配置 {} 的定时任务", profile_id);
                true
            }
            None => false,
        }
    }

    /// 为清单中所有配置安装定时任务，单个失败不影响其他配置
    pub async fn schedule_all(&self) -> Result<Vec<SchedulingError>> {
        let profiles = self.catalog.list_profiles().await?;
        let mut failures = Vec::new();

        for profile in &profiles {
            if let Err(e) = self.schedule_profile(profile).await {
                warn!("⚠️ 无法调度备份配置 {}: {}", profile.id, e);
                failures.push(e);
            }
        }

        info!(
            "调度器已启动: {} 个定时任务, {} 个配置调度失败",
            self.timers.len(),
            failures.len()
        );
        Ok(failures)
    }

    /// 先订阅事件再安装全部定时任务，启动期间触发的事件不会丢失
    pub async fn start(
        &self,
    ) -> Result<(broadcast::Receiver<SchedulerEvent>, Vec<SchedulingError>)> {
        let events = self.subscribe();
        let failures = self.schedule_all().await?;
        Ok((events, failures))
    }

    pub fn scheduled_profiles(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.timers.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_scheduled(&self, profile_id: i64) -> bool {
        self.timers.contains_key(&profile_id)
    }

    pub fn expression(&self, profile_id: i64) -> Option<String> {
        self.timers
            .get(&profile_id)
            .map(|entry| entry.expression.clone())
    }

    pub fn next_fire_time(&self, profile_id: i64) -> Option<DateTime<Utc>> {
        self.timers
            .get(&profile_id)
            .and_then(|entry| entry.schedule.next_after(self.clock.now()))
    }

    /// 取消所有定时任务
    pub fn shutdown(&self) {
        let ids = self.scheduled_profiles();
        for id in ids {
            self.unschedule_profile(id);
        }
        info!("调度器已停止");
    }

    fn spawn_timer(&self, profile_id: i64, schedule: CronSchedule) -> JoinHandle<()> {
        let clock = Arc::clone(&self.clock);
        let runner = self.runner.clone();
        let events = self.events.clone();
        // 游标在安装时取值，之后每次从上一次触发时间继续计算
        let mut cursor = clock.now();

        tokio::spawn(async move {
            loop {
                let Some(next) = schedule.next_after(cursor) else {
                    warn!("备份配置 {} 的 cron 表达式不会再触发", profile_id);
                    return;
                };
                clock.sleep_until(next).await;
                // 触发在独立任务中执行，替换定时任务时不会中断已开始的运行创建
                tokio::spawn(tick(runner.clone(), events.clone(), profile_id));

                // 错过的触发合并为一次
                cursor = next.max(clock.now());
            }
        })
    }
}

async fn tick(runner: BackupRunner, events: broadcast::Sender<SchedulerEvent>, profile_id: i64) {
    let event = match runner.start_run(profile_id).await {
        Ok(handle) => {
            info!("⏰ 定时触发备份配置 {}，运行 {}", profile_id, handle.run.id);
            SchedulerEvent::RunStarted {
                profile_id,
                run_id: handle.run.id,
            }
        }
        Err(BackupError::RunAlreadyActive(_)) => {
            warn!("⚠️ 备份配置 {} 仍在运行，跳过本次定时触发", profile_id);
            SchedulerEvent::TickSkipped {
                profile_id,
                reason: "previous run still active".to_string(),
            }
        }
        Err(e) => {
            error!("❌ 定时触发备份配置 {} 失败: {}", profile_id, e);
            SchedulerEvent::TickFailed {
                profile_id,
                error: e.to_string(),
            }
        }
    };
    let _ = events.send(event);
}
