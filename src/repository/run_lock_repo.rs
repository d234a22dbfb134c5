// ==========================================
// 注塑排产系统 - 排产运行锁仓储
// ==========================================
// 职责: 基于 scheduling_run_lock 表的命名咨询锁
// 说明: 条件 UPDATE 保证同一时刻只有一个持有者；
//       持有超时 (stale) 的锁允许被新运行接管
// ==========================================

use crate::engine::repositories::RunLockStore;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

pub struct RunLockRepository {
    conn: Arc<Mutex<Connection>>,
}

impl RunLockRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 尝试获取锁
    ///
    /// # 返回
    /// - Ok(true): 获取成功
    /// - Ok(false): 锁被其他运行持有且未过期
    pub fn try_acquire(
        &self,
        lock_name: &str,
        holder: &str,
        stale_after_secs: i64,
    ) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;

        conn.execute(
            "INSERT OR IGNORE INTO scheduling_run_lock (lock_name, holder, acquired_at) VALUES (?1, NULL, NULL)",
            params![lock_name],
        )?;

        let stale_modifier = format!("-{} seconds", stale_after_secs.max(0));
        let rows = conn.execute(
            r#"
            UPDATE scheduling_run_lock
            SET holder = ?2,
                acquired_at = datetime('now', 'localtime')
            WHERE lock_name = ?1
              AND (
                holder IS NULL
                OR (acquired_at IS NOT NULL AND acquired_at < datetime('now', 'localtime', ?3))
              )
            "#,
            params![lock_name, holder, stale_modifier],
        )?;

        Ok(rows == 1)
    }

    /// 释放锁（持有者不匹配时不做任何修改）
    pub fn release(&self, lock_name: &str, holder: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            UPDATE scheduling_run_lock
            SET holder = NULL,
                acquired_at = NULL
            WHERE lock_name = ?1 AND holder = ?2
            "#,
            params![lock_name, holder],
        )?;
        Ok(())
    }

    /// 查询当前持有者
    pub fn current_holder(&self, lock_name: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        let holder: Option<Option<String>> = conn
            .query_row(
                "SELECT holder FROM scheduling_run_lock WHERE lock_name = ?1",
                params![lock_name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(holder.flatten())
    }
}

impl RunLockStore for RunLockRepository {
    fn try_acquire(
        &self,
        lock_name: &str,
        holder: &str,
        stale_after_secs: i64,
    ) -> RepositoryResult<bool> {
        RunLockRepository::try_acquire(self, lock_name, holder, stale_after_secs)
    }

    fn release(&self, lock_name: &str, holder: &str) -> RepositoryResult<()> {
        RunLockRepository::release(self, lock_name, holder)
    }
}
