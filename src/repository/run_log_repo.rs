// ==========================================
// 注塑排产系统 - 排产运行日志仓储
// ==========================================

use crate::db::format_datetime;
use crate::domain::run_log::{RunStatus, ScheduleRunLog};
use crate::engine::repositories::RunLogStore;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::{get_datetime, get_enum};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

pub struct RunLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl RunLogRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn insert(&self, entry: &ScheduleRunLog) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO scheduling_run_log (
                    run_id, started_at, finished_at, status, plans_count, scheduled_count,
                    skipped_count, overdue_count, message, config_snapshot_json
               ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
            params![
                entry.run_id,
                format_datetime(&entry.started_at),
                format_datetime(&entry.finished_at),
                entry.status.to_db_str(),
                entry.plans_count as i64,
                entry.scheduled_count as i64,
                entry.skipped_count as i64,
                entry.overdue_count as i64,
                entry.message,
                entry.config_snapshot_json,
            ],
        )?;
        Ok(())
    }

    /// 最近的运行日志（按开始时间倒序）
    pub fn find_recent(&self, limit: usize) -> RepositoryResult<Vec<ScheduleRunLog>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT run_id, started_at, finished_at, status, plans_count, scheduled_count,
                      skipped_count, overdue_count, message, config_snapshot_json
               FROM scheduling_run_log
               ORDER BY started_at DESC, rowid DESC
               LIMIT ?1"#,
        )?;
        let logs = stmt
            .query_map(params![limit as i64], |row| {
                Ok(ScheduleRunLog {
                    run_id: row.get(0)?,
                    started_at: get_datetime(row, 1)?,
                    finished_at: get_datetime(row, 2)?,
                    status: get_enum(row, 3, RunStatus::from_db_str)?,
                    plans_count: row.get::<_, i64>(4)? as usize,
                    scheduled_count: row.get::<_, i64>(5)? as usize,
                    skipped_count: row.get::<_, i64>(6)? as usize,
                    overdue_count: row.get::<_, i64>(7)? as usize,
                    message: row.get(8)?,
                    config_snapshot_json: row.get(9)?,
                })
            })?
            .collect::<Result<Vec<ScheduleRunLog>, _>>()?;
        Ok(logs)
    }
}

impl RunLogStore for RunLogRepository {
    fn insert_run_log(&self, entry: &ScheduleRunLog) -> RepositoryResult<()> {
        self.insert(entry)
    }
}
