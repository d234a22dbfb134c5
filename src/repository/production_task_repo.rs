// ==========================================
// 注塑排产系统 - 生产任务数据仓储
// ==========================================
// 红线: 任务提交与计划状态流转必须在同一事务内完成
// ==========================================

use crate::db::format_datetime;
use crate::domain::task::ProductionTask;
use crate::domain::types::{PlanStatus, ScheduleRule, TaskStatus};
use crate::engine::repositories::TaskStore;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::{get_datetime, get_enum};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const TASK_COLUMNS: &str = r#"task_id, plan_id, material_id, device_id, mold_id, task_quantity,
    due_date, planned_start_time, planned_end_time, is_overdue, status,
    schedule_rule, schedule_reason, sync_group_id, created_at"#;

// ==========================================
// ProductionTaskRepository - 生产任务仓储
// ==========================================
pub struct ProductionTaskRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ProductionTaskRepository {
    /// 创建新的ProductionTaskRepository实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<ProductionTask> {
        Ok(ProductionTask {
            task_id: row.get(0)?,
            plan_id: row.get(1)?,
            material_id: row.get(2)?,
            device_id: row.get(3)?,
            mold_id: row.get(4)?,
            task_quantity: row.get(5)?,
            due_date: get_datetime(row, 6)?,
            planned_start_time: get_datetime(row, 7)?,
            planned_end_time: get_datetime(row, 8)?,
            is_overdue: row.get::<_, i32>(9)? != 0,
            status: get_enum(row, 10, TaskStatus::from_db_str)?,
            schedule_rule: get_enum(row, 11, ScheduleRule::from_db_str)?,
            schedule_reason: row.get(12)?,
            sync_group_id: row.get(13)?,
            created_at: get_datetime(row, 14)?,
        })
    }

    /// 提交一次排产运行的结果
    ///
    /// # 参数
    /// - `tasks`: 本次运行生成的任务
    ///
    /// # 返回
    /// - `Ok(count)`: 写入的任务数
    /// - `Err`: 任一任务写入或计划状态更新失败（整体回滚）
    ///
    /// # 红线
    /// - 任务插入与计划状态更新在同一事务内
    /// - 计划必须仍处于 unscheduled，否则视为并发冲突并回滚
    pub fn commit_run(&self, tasks: &[ProductionTask]) -> RepositoryResult<usize> {
        if tasks.is_empty() {
            return Ok(0);
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        {
            let mut insert_stmt = tx.prepare(
                r#"INSERT INTO production_task (
                        task_id, plan_id, material_id, device_id, mold_id, task_quantity,
                        due_date, planned_start_time, planned_end_time, is_overdue, status,
                        schedule_rule, schedule_reason, sync_group_id, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"#,
            )?;
            let mut plan_stmt = tx.prepare(
                "UPDATE production_plan SET status = ?1 WHERE plan_id = ?2 AND status = ?3",
            )?;

            for task in tasks {
                insert_stmt.execute(params![
                    task.task_id,
                    task.plan_id,
                    task.material_id,
                    task.device_id,
                    task.mold_id,
                    task.task_quantity,
                    format_datetime(&task.due_date),
                    format_datetime(&task.planned_start_time),
                    format_datetime(&task.planned_end_time),
                    if task.is_overdue { 1 } else { 0 },
                    task.status.to_db_str(),
                    task.schedule_rule.to_db_str(),
                    task.schedule_reason,
                    task.sync_group_id,
                    format_datetime(&task.created_at),
                ])?;

                let affected = plan_stmt.execute(params![
                    PlanStatus::Scheduled.to_db_str(),
                    task.plan_id,
                    PlanStatus::Unscheduled.to_db_str(),
                ])?;
                if affected != 1 {
                    // 提前返回: tx 被 drop 时自动回滚
                    return Err(RepositoryError::PlanStatusConflict {
                        plan_id: task.plan_id.clone(),
                    });
                }
            }
        }

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(tasks.len())
    }

    /// 查询全部任务（按创建顺序）
    pub fn find_all(&self) -> RepositoryResult<Vec<ProductionTask>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM production_task ORDER BY created_at ASC, rowid ASC",
            TASK_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let tasks = stmt
            .query_map([], Self::map_row)?
            .collect::<Result<Vec<ProductionTask>, _>>()?;
        Ok(tasks)
    }

    /// 按计划ID查询任务
    pub fn find_by_plan_id(&self, plan_id: &str) -> RepositoryResult<Option<ProductionTask>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM production_task WHERE plan_id = ?1", TASK_COLUMNS);
        let task = conn
            .query_row(&sql, params![plan_id], Self::map_row)
            .optional()?;
        Ok(task)
    }

    /// 按设备查询任务（按计划开始时间）
    pub fn find_by_device(&self, device_id: &str) -> RepositoryResult<Vec<ProductionTask>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM production_task WHERE device_id = ?1 ORDER BY planned_start_time ASC",
            TASK_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let tasks = stmt
            .query_map(params![device_id], Self::map_row)?
            .collect::<Result<Vec<ProductionTask>, _>>()?;
        Ok(tasks)
    }
}

impl TaskStore for ProductionTaskRepository {
    fn find_all_in_creation_order(&self) -> RepositoryResult<Vec<ProductionTask>> {
        self.find_all()
    }

    fn commit_run(&self, tasks: &[ProductionTask]) -> RepositoryResult<usize> {
        ProductionTaskRepository::commit_run(self, tasks)
    }
}
