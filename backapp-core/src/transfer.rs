use std::path::Path;

use crate::error::{SelectionError, TransferError};
use crate::models::{BackupFile, FileRule};
use crate::recorder::RunRecorder;
use crate::selector::{self, SelectionMode};
use crate::session::RemoteSession;

/// 单次运行内的文件传输执行器
#[derive(Debug, Clone)]
pub struct TransferExecutor {
    recorder: RunRecorder,
    run_id: i64,
}

impl TransferExecutor {
    pub fn new(recorder: RunRecorder, run_id: i64) -> Self {
        Self { recorder, run_id }
    }

    /// 按选择顺序传输一条规则的全部文件
    ///
    /// 每个文件复制成功后立即写入文件记录；中途失败时已记录的文件保留。
    pub async fn transfer_rule(
        &self,
        rule: &FileRule,
        session: &dyn RemoteSession,
        dest_dir: &Path,
    ) -> Result<Vec<BackupFile>, TransferError> {
        let run_id = self.run_id;
        self.recorder
            .debug(run_id, format!("Checking remote path: {}", rule.remote_path))
            .await;

        let selection = match selector::resolve(rule, session).await {
            Ok(selection) => selection,
            Err(source) => {
                if let SelectionError::PathNotFound { path } = &source {
                    self.recorder
                        .error(run_id, format!("Remote path does not exist: {path}"))
                        .await;
                }
                return Err(TransferError::Selection {
                    rule_id: rule.id,
                    source,
                });
            }
        };

        if selection.mode != SelectionMode::Single {
            self.recorder
                .info(
                    run_id,
                    format!("Listing files in directory: {}", selection.root),
                )
                .await;
            self.recorder
                .info(
                    run_id,
                    format!("Found {} files to transfer", selection.files.len()),
                )
                .await;
        }
        for path in &selection.excluded {
            self.recorder
                .debug(run_id, format!("Excluded by pattern: {path}"))
                .await;
        }

        let mut transferred = Vec::with_capacity(selection.files.len());
        for file in &selection.files {
            let remote = file.remote_path.as_str();
            let local_path = dest_dir.join(&file.relative_path);

            if let Some(parent) = local_path.parent() {
                if let Err(source) = tokio::fs::create_dir_all(parent).await {
                    self.recorder
                        .error(
                            run_id,
                            format!("Failed to create directory {}: {source}", parent.display()),
                        )
                        .await;
                    return Err(TransferError::LocalDir {
                        rule_id: rule.id,
                        path: parent.display().to_string(),
                        source,
                    });
                }
            }

            let size = match session.file_size(remote).await {
                Ok(size) => size,
                Err(source) if selection.mode == SelectionMode::Recursive => {
                    self.recorder
                        .warning(
                            run_id,
                            format!("Skipping file {remote}: failed to get file size: {source}"),
                        )
                        .await;
                    continue;
                }
                Err(source) => {
                    self.recorder
                        .error(
                            run_id,
                            format!("Failed to get file size for {remote}: {source}"),
                        )
                        .await;
                    return Err(TransferError::Size {
                        rule_id: rule.id,
                        path: remote.to_string(),
                        source,
                    });
                }
            };

            if let Err(source) = session.copy_file(remote, &local_path).await {
                self.recorder
                    .error(run_id, format!("Failed to copy file {remote}: {source}"))
                    .await;
                return Err(TransferError::Copy {
                    rule_id: rule.id,
                    path: remote.to_string(),
                    source,
                });
            }

            let size_bytes = i64::try_from(size).unwrap_or(i64::MAX);
            let record = self
                .recorder
                .record_file(
                    run_id,
                    rule.id,
                    remote,
                    local_path.to_string_lossy(),
                    size_bytes,
                )
                .await
                .map_err(|e| TransferError::Record {
                    rule_id: rule.id,
                    path: remote.to_string(),
                    reason: e.to_string(),
                })?;

            self.recorder
                .debug(
                    run_id,
                    format!(
                        "File transferred successfully: {} ({:.2} KB)",
                        selector::base_name(remote),
                        size as f64 / 1024.0
                    ),
                )
                .await;
            transferred.push(record);
        }

        Ok(transferred)
    }
}
