/// 项目元数据（从 Cargo.toml 同步）
pub mod metadata {
    pub const PROJECT_NAME: &str = env!("CARGO_PKG_NAME");

    pub const PROJECT_VERSION: &str = env!("CARGO_PKG_VERSION");

    pub const PROJECT_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

    pub const PROJECT_AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

    /// 比 Cargo.toml 中的描述更详细
    pub const DESCRIPTION_LONG: &str = "按 cron 计划通过 SSH 将远程主机上的文件备份到本地存储目录，\
        每次运行的状态、复制的文件和日志记录在 DuckDB 中";
}
