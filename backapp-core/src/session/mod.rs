// 远程会话客户端
//
// 选择器和执行器只依赖 `RemoteSession` 这一组能力；SSH 主机和本机
// 各有一个实现，由连接器在每次运行开始时选定。

mod local;
mod ssh;

pub use local::{LocalSession, read_local_dir};
pub use ssh::SshSession;

use async_trait::async_trait;
use std::cmp::Ordering;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::constants::session::default_connect_timeout;
use crate::error::{ConnectionError, SessionError};
use crate::models::{FileSystemEntry, Server};

pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// 命令执行结果
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: i32,
}

/// 会话能力接口
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// 日志中展示的会话描述
    fn describe(&self) -> String;

    async fn exists(&self, path: &str) -> SessionResult<bool>;

    async fn is_dir(&self, path: &str) -> SessionResult<bool>;

    /// 列出 root 下的普通文件；不保证顺序
    async fn list_files(&self, root: &str, recursive: bool) -> SessionResult<Vec<String>>;

    async fn file_size(&self, path: &str) -> SessionResult<u64>;

    /// 复制到本地路径，返回写入的字节数；父目录由调用方保证存在
    async fn copy_file(&self, remote: &str, local: &Path) -> SessionResult<u64>;

    /// 执行命令，非零退出码返回 `SessionError::NonZeroExit`
    async fn run(&self, command: &str) -> SessionResult<CommandOutput>;

    /// 列出目录的直接子项，目录优先、按名称排序
    async fn list_dir(&self, path: &str) -> SessionResult<Vec<FileSystemEntry>>;

    async fn close(&self);
}

/// 建立会话
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self, server: &Server)
    -> std::result::Result<Box<dyn RemoteSession>, ConnectionError>;
}

/// 本机走本地文件系统，其余主机走 SSH
#[derive(Debug, Clone)]
pub struct DefaultConnector {
    connect_timeout: Duration,
}

impl DefaultConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for DefaultConnector {
    fn default() -> Self {
        Self::new(default_connect_timeout())
    }
}

#[async_trait]
impl SessionConnector for DefaultConnector {
    async fn connect(
        &self,
        server: &Server,
    ) -> std::result::Result<Box<dyn RemoteSession>, ConnectionError> {
        if server.is_loopback() {
            debug!("服务器 {} 为本机，使用本地文件系统会话", server.name);
            return Ok(Box::new(LocalSession::new()));
        }

        let session = SshSession::connect(server, self.connect_timeout).await?;
        Ok(Box::new(session))
    }
}

/// 单引号包裹，内部单引号转义为 `'\''`
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// 目录优先，其次按名称字典序
pub fn compare_entries(a: &FileSystemEntry, b: &FileSystemEntry) -> Ordering {
    b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name))
}

pub fn sort_entries(entries: &mut [FileSystemEntry]) {
    entries.sort_by(compare_entries);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, is_dir: bool) -> FileSystemEntry {
        FileSystemEntry {
            name: name.to_string(),
            path: format!("/x/{name}"),
            is_dir,
            size: 0,
        }
    }

    #[test]
    fn test_shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("/data/app"), "'/data/app'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_sort_entries_directories_first() {
        let mut entries = vec![
            entry("b.txt", false),
            entry("zeta", true),
            entry("a.txt", false),
            entry("alpha", true),
        ];
        sort_entries(&mut entries);
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta", "a.txt", "b.txt"]);
    }
}
