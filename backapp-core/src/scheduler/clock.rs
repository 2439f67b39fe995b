use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;

/// 调度器使用的时钟
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// 阻塞到时钟到达 deadline
    async fn sleep_until(&self, deadline: DateTime<Utc>);
}

/// 系统时钟
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep_until(&self, deadline: DateTime<Utc>) {
        // 分段睡眠，系统时间被调整时也能按墙钟触发
        let max_chunk = std::time::Duration::from_secs(60);
        loop {
            let remaining = deadline - Utc::now();
            let Ok(remaining) = remaining.to_std() else {
                return;
            };
            if remaining.is_zero() {
                return;
            }
            tokio::time::sleep(remaining.min(max_chunk)).await;
        }
    }
}

/// 手动推进的时钟
#[derive(Debug)]
pub struct ManualClock {
    now: watch::Sender<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        let (now, _) = watch::channel(start);
        Self { now }
    }

    pub fn set(&self, time: DateTime<Utc>) {
        self.now.send_replace(time);
    }

    pub fn advance(&self, by: Duration) {
        self.now.send_modify(|now| *now += by);
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.borrow()
    }

    async fn sleep_until(&self, deadline: DateTime<Utc>) {
        let mut receiver = self.now.subscribe();
        loop {
            if *receiver.borrow_and_update() >= deadline {
                return;
            }
            if receiver.changed().await.is_err() {
                return;
            }
        }
    }
}
