use crate::models::{BackupFile, BackupRun, BackupRunLog, LogLevel, RunStatus};
use crate::{BackupError, Result};
use chrono::{DateTime, Utc};
use duckdb::types::Value;
use duckdb::{Connection, params, params_from_iter};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::messages::{DbMessage, RunSummary};

const RUN_COLUMNS: &str =
    "id, profile_id, status, start_time, end_time, total_files, total_size_bytes, error_message";
const FILE_COLUMNS: &str = "id, run_id, rule_id, remote_path, local_path, size_bytes, created_at";

/// 直接从行读取的运行记录，状态仍是字符串
struct RunRow {
    id: i64,
    profile_id: i64,
    status: String,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    total_files: i64,
    total_size_bytes: i64,
    error_message: Option<String>,
}

impl TryFrom<RunRow> for BackupRun {
    type Error = BackupError;

    fn try_from(row: RunRow) -> Result<Self> {
        Ok(BackupRun {
            id: row.id,
            profile_id: row.profile_id,
            status: row.status.parse()?,
            start_time: row.start_time,
            end_time: row.end_time,
            total_files: row.total_files,
            total_size_bytes: row.total_size_bytes,
            error_message: row.error_message,
        })
    }
}

fn map_run_row(row: &duckdb::Row<'_>) -> duckdb::Result<RunRow> {
    Ok(RunRow {
        id: row.get(0)?,
        profile_id: row.get(1)?,
        status: row.get(2)?,
        start_time: row.get(3)?,
        end_time: row.get(4)?,
        total_files: row.get(5)?,
        total_size_bytes: row.get(6)?,
        error_message: row.get(7)?,
    })
}

fn map_file_row(row: &duckdb::Row<'_>) -> duckdb::Result<BackupFile> {
    Ok(BackupFile {
        id: row.get(0)?,
        run_id: row.get(1)?,
        rule_id: row.get(2)?,
        remote_path: row.get(3)?,
        local_path: row.get(4)?,
        size_bytes: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// DuckDB Actor - 确保单线程访问DuckDB
pub struct DuckDbActor {
    connection: Connection,
}

impl DuckDbActor {
    /// 创建新的DuckDB Actor
    pub fn new(db_path: PathBuf) -> Result<Self> {
        let connection = Connection::open(db_path)?;
        Ok(Self { connection })
    }

    /// 创建内存DuckDB Actor
    pub fn new_memory() -> Result<Self> {
        let connection = Connection::open_in_memory()?;
        Ok(Self { connection })
    }

    /// 运行Actor消息循环
    pub async fn run(mut self, mut receiver: mpsc::Receiver<DbMessage>) {
        info!("DuckDB Actor 已启动");

        while let Some(message) = receiver.recv().await {
            self.handle_message(message);
        }

        info!("DuckDB Actor 已关闭");
    }

    /// 处理数据库消息，调用方放弃等待时应答被丢弃
    fn handle_message(&mut self, message: DbMessage) {
        match message {
            DbMessage::InitTables { respond_to } => {
                let _ = respond_to.send(self.init_tables());
            }
            DbMessage::CreateRun {
                profile_id,
                start_time,
                respond_to,
            } => {
                let _ = respond_to.send(self.create_run(profile_id, start_time));
            }
            DbMessage::TransitionRun {
                run_id,
                from,
                to,
                respond_to,
            } => {
                let _ = respond_to.send(self.transition_run(run_id, from, to));
            }
            DbMessage::FinishRun {
                run_id,
                from,
                summary,
                respond_to,
            } => {
                let _ = respond_to.send(self.finish_run(run_id, from, &summary));
            }
            DbMessage::FailInterruptedRuns {
                end_time,
                message,
                respond_to,
            } => {
                let _ = respond_to.send(self.fail_interrupted_runs(end_time, &message));
            }
            DbMessage::GetRun { run_id, respond_to } => {
                let _ = respond_to.send(self.get_run(run_id));
            }
            DbMessage::ListRuns {
                profile_id,
                status,
                respond_to,
            } => {
                let _ = respond_to.send(self.list_runs(profile_id, status));
            }
            DbMessage::DeleteRun { run_id, respond_to } => {
                let _ = respond_to.send(self.delete_run(run_id));
            }
            DbMessage::RecordFile {
                run_id,
                rule_id,
                remote_path,
                local_path,
                size_bytes,
                created_at,
                respond_to,
            } => {
                let result = self.record_file(
                    run_id,
                    rule_id,
                    remote_path,
                    local_path,
                    size_bytes,
                    created_at,
                );
                let _ = respond_to.send(result);
            }
            DbMessage::ListFiles { run_id, respond_to } => {
                let _ = respond_to.send(self.list_files(run_id));
            }
            DbMessage::GetFile {
                file_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.get_file(file_id));
            }
            DbMessage::AppendLog {
                run_id,
                timestamp,
                level,
                message,
                respond_to,
            } => {
                let _ = respond_to.send(self.append_log(run_id, timestamp, level, &message));
            }
            DbMessage::GetRunLogs { run_id, respond_to } => {
                let _ = respond_to.send(self.get_run_logs(run_id));
            }
        }
    }

    /// 初始化数据库表
    fn init_tables(&mut self) -> Result<()> {
        debug!("正在初始化DuckDB表...");

        let sql_content = include_str!("../../migrations/init_duckdb.sql");

        // 按分号分割SQL语句并执行
        for statement in sql_content.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                self.connection.execute(trimmed, [])?;
            }
        }

        info!("DuckDB表初始化完成");
        Ok(())
    }

    fn create_run(&mut self, profile_id: i64, start_time: DateTime<Utc>) -> Result<BackupRun> {
        self.connection.execute(
            "INSERT INTO backup_runs (profile_id, status, start_time) VALUES (?, ?, ?)",
            params![profile_id, RunStatus::Pending.as_str(), start_time],
        )?;

        let id: i64 = self
            .connection
            .query_row("SELECT currval('backup_run_id_seq')", [], |row| row.get(0))?;

        Ok(BackupRun {
            id,
            profile_id,
            status: RunStatus::Pending,
            start_time,
            end_time: None,
            total_files: 0,
            total_size_bytes: 0,
            error_message: None,
        })
    }

    fn current_status(&mut self, run_id: i64) -> Result<Option<RunStatus>> {
        let mut stmt = self
            .connection
            .prepare("SELECT status FROM backup_runs WHERE id = ?")?;
        let mut rows = stmt.query(params![run_id])?;

        match rows.next()? {
            Some(row) => {
                let status: String = row.get(0)?;
                Ok(Some(status.parse()?))
            }
            None => Ok(None),
        }
    }

    /// 条件更新没有命中时，给出具体原因
    fn rejected_transition(&mut self, run_id: i64, to: RunStatus) -> BackupError {
        match self.current_status(run_id) {
            Ok(Some(current)) => BackupError::InvalidTransition {
                run_id,
                from: current.to_string(),
                to: to.to_string(),
            },
            Ok(None) => BackupError::not_found("run", run_id),
            Err(e) => e,
        }
    }

    fn transition_run(&mut self, run_id: i64, from: RunStatus, to: RunStatus) -> Result<()> {
        if !from.can_transition_to(to) {
            return Err(BackupError::InvalidTransition {
                run_id,
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let updated = self.connection.execute(
            "UPDATE backup_runs SET status = ? WHERE id = ? AND status = ?",
            params![to.as_str(), run_id, from.as_str()],
        )?;
        if updated == 0 {
            return Err(self.rejected_transition(run_id, to));
        }
        Ok(())
    }

    fn finish_run(&mut self, run_id: i64, from: RunStatus, summary: &RunSummary) -> Result<()> {
        let to = summary.status;
        if !to.is_terminal() || !from.can_transition_to(to) {
            return Err(BackupError::InvalidTransition {
                run_id,
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let updated = self.connection.execute(
            "UPDATE backup_runs
             SET status = ?, end_time = ?, total_files = ?, total_size_bytes = ?, error_message = ?
             WHERE id = ? AND status = ?",
            params![
                to.as_str(),
                summary.end_time,
                summary.total_files,
                summary.total_size_bytes,
                summary.error_message,
                run_id,
                from.as_str()
            ],
        )?;
        if updated == 0 {
            return Err(self.rejected_transition(run_id, to));
        }
        Ok(())
    }

    fn fail_interrupted_runs(&mut self, end_time: DateTime<Utc>, message: &str) -> Result<usize> {
        let updated = self.connection.execute(
            "UPDATE backup_runs
             SET status = ?, end_time = ?, error_message = COALESCE(error_message, ?)
             WHERE status IN (?, ?)",
            params![
                RunStatus::Failed.as_str(),
                end_time,
                message,
                RunStatus::Pending.as_str(),
                RunStatus::Running.as_str()
            ],
        )?;
        Ok(updated)
    }

    fn get_run(&mut self, run_id: i64) -> Result<Option<BackupRun>> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM backup_runs WHERE id = ?");
        let mut stmt = self.connection.prepare(&sql)?;
        let mut rows = stmt.query(params![run_id])?;

        match rows.next()? {
            Some(row) => Ok(Some(map_run_row(row)?.try_into()?)),
            None => Ok(None),
        }
    }

    fn list_runs(
        &mut self,
        profile_id: Option<i64>,
        status: Option<RunStatus>,
    ) -> Result<Vec<BackupRun>> {
        let mut conditions = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(profile_id) = profile_id {
            conditions.push("profile_id = ?");
            values.push(Value::BigInt(profile_id));
        }
        if let Some(status) = status {
            conditions.push("status = ?");
            values.push(Value::Text(status.as_str().to_string()));
        }

        let mut sql = format!("SELECT {RUN_COLUMNS} FROM backup_runs");
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY start_time DESC, id DESC");

        let mut stmt = self.connection.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), map_run_row)?;

        let mut runs = Vec::new();
        for row in rows {
            runs.push(row?.try_into()?);
        }
        Ok(runs)
    }

    fn delete_run(&mut self, run_id: i64) -> Result<()> {
        match self.current_status(run_id)? {
            None => return Err(BackupError::not_found("run", run_id)),
            Some(status) if !status.is_terminal() => {
                return Err(BackupError::custom(format!(
                    "run {run_id} is still {status} and cannot be deleted"
                )));
            }
            Some(_) => {}
        }

        let tx = self.connection.transaction()?;
        tx.execute("DELETE FROM backup_run_logs WHERE run_id = ?", params![run_id])?;
        tx.execute("DELETE FROM backup_files WHERE run_id = ?", params![run_id])?;
        tx.execute("DELETE FROM backup_runs WHERE id = ?", params![run_id])?;
        tx.commit()?;
        Ok(())
    }

    fn record_file(
        &mut self,
        run_id: i64,
        rule_id: i64,
        remote_path: String,
        local_path: String,
        size_bytes: i64,
        created_at: DateTime<Utc>,
    ) -> Result<BackupFile> {
        self.connection.execute(
            "INSERT INTO backup_files (run_id, rule_id, remote_path, local_path, size_bytes, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![run_id, rule_id, remote_path, local_path, size_bytes, created_at],
        )?;

        let id: i64 = self
            .connection
            .query_row("SELECT currval('backup_file_id_seq')", [], |row| row.get(0))?;

        Ok(BackupFile {
            id,
            run_id,
            rule_id,
            remote_path,
            local_path,
            size_bytes,
            created_at,
        })
    }

    fn list_files(&mut self, run_id: i64) -> Result<Vec<BackupFile>> {
        let sql = format!("SELECT {FILE_COLUMNS} FROM backup_files WHERE run_id = ? ORDER BY id");
        let mut stmt = self.connection.prepare(&sql)?;
        let rows = stmt.query_map(params![run_id], map_file_row)?;

        let mut files = Vec::new();
        for file in rows {
            files.push(file?);
        }
        Ok(files)
    }

    fn get_file(&mut self, file_id: i64) -> Result<Option<BackupFile>> {
        let sql = format!("SELECT {FILE_COLUMNS} FROM backup_files WHERE id = ?");
        let mut stmt = self.connection.prepare(&sql)?;
        let mut rows = stmt.query(params![file_id])?;

        match rows.next()? {
            Some(row) => Ok(Some(map_file_row(row)?)),
            None => Ok(None),
        }
    }

    fn append_log(
        &mut self,
        run_id: i64,
        timestamp: DateTime<Utc>,
        level: LogLevel,
        message: &str,
    ) -> Result<i64> {
        self.connection.execute(
            "INSERT INTO backup_run_logs (run_id, logged_at, level, message) VALUES (?, ?, ?, ?)",
            params![run_id, timestamp, level.as_str(), message],
        )?;

        let id: i64 = self
            .connection
            .query_row("SELECT currval('backup_run_log_id_seq')", [], |row| {
                row.get(0)
            })?;
        Ok(id)
    }

    fn get_run_logs(&mut self, run_id: i64) -> Result<Vec<BackupRunLog>> {
        let mut stmt = self.connection.prepare(
            "SELECT id, run_id, logged_at, level, message
             FROM backup_run_logs WHERE run_id = ? ORDER BY logged_at, id",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, DateTime<Utc>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut logs = Vec::new();
        for row in rows {
            let (id, run_id, timestamp, level, message) = row?;
            logs.push(BackupRunLog {
                id,
                run_id,
                timestamp,
                level: level.parse()?,
                message,
            });
        }
        Ok(logs)
    }
}
