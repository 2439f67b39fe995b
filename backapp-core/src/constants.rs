/// 远程会话相关常量
pub mod session {
    use std::time::Duration;

    /// 默认SSH端口
    pub const DEFAULT_SSH_PORT: u16 = 22;

    /// 连接超时（秒）
    pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

    /// 连接建立后的存活检测命令
    pub const LIVENESS_COMMAND: &str = "echo test";

    /// 视为本机的主机名，这些主机直接走本地文件系统
    pub const LOOPBACK_HOSTS: &[&str] = &["localhost", "127.0.0.1", "::1"];

    /// 非阻塞读取命令输出时的轮询间隔
    pub const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

    pub fn default_connect_timeout() -> Duration {
        Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)
    }
}

/// 文件浏览相关常量
pub mod explorer {
    /// 未指定路径时的默认浏览目录
    pub const DEFAULT_BROWSE_PATH: &str = "/home";
}

/// 命名规则占位符
pub mod naming {
    pub const PROFILE: &str = "{profile}";
    pub const DATE: &str = "{date}";
    pub const TIME: &str = "{time}";
    pub const TIMESTAMP: &str = "{TIMESTAMP}";
    pub const SERVER_NAME: &str = "{SERVER_NAME}";

    pub const DATE_FORMAT: &str = "%Y-%m-%d";
    pub const TIME_FORMAT: &str = "%H-%M-%S";
    pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
}

/// Cron任务相关常量
pub mod cron {
    /// Cron表达式字段数量
    pub const CRON_FIELDS_COUNT: usize = 5;

    /// 计算下次触发时间时最多向前搜索的年数
    pub const MAX_LOOKAHEAD_YEARS: i32 = 5;
}

/// 调度器相关常量
pub mod scheduler {
    /// 调度事件广播通道容量
    pub const EVENT_CHANNEL_CAPACITY: usize = 256;
}

/// 应用配置相关常量
pub mod config {
    use std::path::{Path, PathBuf};

    /// 数据目录名
    pub const DATA_DIR_NAME: &str = "data";

    /// 配置文件查找顺序
    pub const CONFIG_FILE_CANDIDATES: &[&str] = &["backapp.toml", "config.toml", ".backapp.toml"];

    /// 配置文件名
    pub const CONFIG_FILE_NAME: &str = "backapp.toml";

    /// 数据库文件名
    pub const DATABASE_FILE_NAME: &str = "backapp.db";

    /// 备份目录清单文件名
    pub const CATALOG_FILE_NAME: &str = "catalog.toml";

    /// DuckDB Actor 消息队列容量
    pub const DB_CHANNEL_CAPACITY: usize = 1024;

    /// 获取数据库文件路径（跨平台）
    pub fn get_database_path() -> PathBuf {
        Path::new(".").join(DATA_DIR_NAME).join(DATABASE_FILE_NAME)
    }

    /// 获取默认清单文件路径（跨平台）
    pub fn get_catalog_path() -> PathBuf {
        Path::new(".").join(DATA_DIR_NAME).join(CATALOG_FILE_NAME)
    }
}
