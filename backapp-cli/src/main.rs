use backapp_cli::{Cli, CliApp, setup_logging};
use clap::Parser;
use tracing::error;

#[tokio::main]
async fn main() {
    // 解析命令行参数
    let cli = Cli::parse();

    // 文件日志的 guard 需要存活到进程结束
    let _log_guard = setup_logging(cli.verbose);

    let app = match CliApp::new(cli.config.as_deref()).await {
        Ok(app) => app,
        Err(e) => {
            error!("❌ 应用初始化失败: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = app.run_command(cli.command).await {
        error!("❌ 操作失败: {:#}", e);
        std::process::exit(1);
    }
}
