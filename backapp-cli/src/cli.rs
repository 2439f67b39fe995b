use crate::project_info::metadata;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Backapp - 定时远程文件备份工具
#[derive(Parser)]
#[command(name = "backapp")]
#[command(about = metadata::PROJECT_DESCRIPTION)]
#[command(version = metadata::PROJECT_VERSION)]
#[command(long_about = metadata::DESCRIPTION_LONG)]
#[command(author = metadata::PROJECT_AUTHORS)]
pub struct Cli {
    /// 配置文件路径，未指定时按 backapp.toml -> config.toml -> .backapp.toml 查找
    #[arg(short, long, env = "BACKAPP_CONFIG")]
    pub config: Option<PathBuf>,

    /// 详细输出
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 启动调度服务，直到收到 Ctrl+C
    Serve,
    /// 立即执行一次备份
    Run {
        /// 备份配置 ID
        profile_id: i64,
        /// 结束后打印运行日志，失败时以非零状态退出
        #[arg(long)]
        wait: bool,
    },
    /// 列出备份运行
    Runs {
        /// 只显示指定备份配置的运行
        #[arg(long)]
        profile: Option<i64>,
        /// 按状态过滤: pending, running, success, failed
        #[arg(long)]
        status: Option<String>,
        /// 以 JSON 输出
        #[arg(long)]
        json: bool,
    },
    /// 显示运行日志
    Logs {
        run_id: i64,
        #[arg(long)]
        json: bool,
    },
    /// 列出运行复制的文件
    Files {
        run_id: i64,
        #[arg(long)]
        json: bool,
    },
    /// 删除已结束的运行及其本地文件
    Delete { run_id: i64 },
    /// 测试服务器连接（认证并执行 echo test）
    TestConnection { server_id: i64 },
    /// 浏览服务器目录
    Browse {
        server_id: i64,
        /// 目录路径（默认 /home）
        path: Option<String>,
    },
    /// 浏览本地目录，例如存储位置
    Local { path: String },
    /// 检查配置与备份清单
    Check,
}
