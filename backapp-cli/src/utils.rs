use backapp_core::models::RunStatus;
use tracing_appender::non_blocking::WorkerGuard;

/// # Backapp 日志系统使用说明
///
/// 库代码只使用 `tracing` 宏，日志配置只在 `main.rs` 中调用 `setup_logging()` 完成。
///
/// - `-v, --verbose`：启用 DEBUG 级别
/// - `RUST_LOG`：标准的日志级别控制，优先于 `--verbose`
/// - `BACKAPP_LOG_FILE`：日志文件路径，设置后日志输出到文件而非终端
///
/// ```bash
/// BACKAPP_LOG_FILE=backapp.log backapp serve
/// RUST_LOG=backapp_core::scheduler=debug backapp serve
/// ```
///
/// 文件输出经非阻塞写入器落盘，返回的 guard 必须存活到进程退出。
pub fn setup_logging(verbose: bool) -> Option<WorkerGuard> {
    use tracing_subscriber::{EnvFilter, fmt};

    // 根据verbose参数和环境变量确定日志级别
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if let Ok(log_file) = std::env::var("BACKAPP_LOG_FILE") {
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
        {
            Ok(file) => {
                let (writer, guard) = tracing_appender::non_blocking(file);
                // 输出到文件 - 使用详细格式便于调试
                fmt()
                    .with_env_filter(env_filter)
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true)
                    .with_thread_names(true)
                    .with_line_number(true)
                    .init();
                return Some(guard);
            }
            Err(e) => {
                eprintln!("无法打开日志文件 {log_file}: {e}，改为输出到终端");
            }
        }
    }

    // 输出到终端 - 使用简洁格式，用户友好
    fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_names(false)
        .with_line_number(false)
        .without_time()
        .compact()
        .init();
    None
}

/// 字节数格式化为易读的单位
pub fn format_size(bytes: i64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes.max(0) as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes.max(0), UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit])
    }
}

pub fn status_icon(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Pending => "⏳",
        RunStatus::Running => "🔄",
        RunStatus::Success => "✅",
        RunStatus::Failed => "❌",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size_units() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
    }
}
