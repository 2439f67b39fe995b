use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::Path;
use tokio::process::Command;
use walkdir::WalkDir;

use super::{CommandOutput, RemoteSession, SessionResult, sort_entries};
use crate::error::SessionError;
use crate::models::FileSystemEntry;

/// 本机会话，直接访问本地文件系统
#[derive(Debug, Default, Clone)]
pub struct LocalSession;

impl LocalSession {
    pub fn new() -> Self {
        Self
    }
}

/// 读取目录的直接子项，供本机会话和本地存储浏览共用
pub async fn read_local_dir(path: &str) -> SessionResult<Vec<FileSystemEntry>> {
    let metadata = tokio::fs::metadata(path).await?;
    if !metadata.is_dir() {
        return Err(SessionError::Io(format!("path is not a directory: {path}")));
    }

    let mut entries = Vec::new();
    let mut reader = tokio::fs::read_dir(path).await?;
    while let Some(entry) = reader.next_entry().await? {
        let metadata = entry.metadata().await?;
        let is_dir = metadata.is_dir();
        entries.push(FileSystemEntry {
            name: entry.file_name().to_string_lossy().to_string(),
            path: entry.path().to_string_lossy().to_string(),
            is_dir,
            size: if is_dir { 0 } else { metadata.len() },
        });
    }

    sort_entries(&mut entries);
    Ok(entries)
}

#[async_trait]
impl RemoteSession for LocalSession {
    fn describe(&self) -> String {
        "local filesystem".to_string()
    }

    async fn exists(&self, path: &str) -> SessionResult<bool> {
        match tokio::fs::metadata(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn is_dir(&self, path: &str) -> SessionResult<bool> {
        match tokio::fs::metadata(path).await {
            Ok(metadata) => Ok(metadata.is_dir()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_files(&self, root: &str, recursive: bool) -> SessionResult<Vec<String>> {
        let root = root.to_string();
        tokio::task::spawn_blocking(move || {
            let mut walker = WalkDir::new(&root);
            if !recursive {
                walker = walker.max_depth(1);
            }

            let mut files = Vec::new();
            for entry in walker {
                let entry = entry.map_err(|e| SessionError::Io(e.to_string()))?;
                if entry.file_type().is_file() {
                    files.push(entry.path().to_string_lossy().to_string());
                }
            }
            Ok(files)
        })
        .await
        .map_err(|e| SessionError::Io(e.to_string()))?
    }

    async fn file_size(&self, path: &str) -> SessionResult<u64> {
        Ok(tokio::fs::metadata(path).await?.len())
    }

    async fn copy_file(&self, remote: &str, local: &Path) -> SessionResult<u64> {
        Ok(tokio::fs::copy(remote, local).await?)
    }

    async fn run(&self, command: &str) -> SessionResult<CommandOutput> {
        let output = Command::new("sh").arg("-c").arg(command).output().await?;

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_status: output.status.code().unwrap_or(-1),
        };

        if !output.status.success() {
            return Err(SessionError::NonZeroExit {
                command: command.to_string(),
                status: result.exit_status,
                stderr: result.stderr.trim().to_string(),
            });
        }
        Ok(result)
    }

    async fn list_dir(&self, path: &str) -> SessionResult<Vec<FileSystemEntry>> {
        read_local_dir(path).await
    }

    async fn close(&self) {}
}
