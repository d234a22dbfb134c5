// ==========================================
// 注塑排产系统 - 生产计划数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 说明: 计划由订单侧写入；排产引擎只读待排产计划，
//       状态流转在 ProductionTaskRepository::commit_run 的事务内完成
// ==========================================

use crate::db::format_datetime;
use crate::domain::plan::ProductionPlan;
use crate::domain::types::PlanStatus;
use crate::engine::repositories::PlanStore;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::{get_datetime, get_enum};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const PLAN_COLUMNS: &str =
    "plan_id, plan_no, material_id, quantity, due_date, status, created_at";

// ==========================================
// ProductionPlanRepository - 生产计划仓储
// ==========================================
pub struct ProductionPlanRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ProductionPlanRepository {
    /// 创建新的ProductionPlanRepository实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<ProductionPlan> {
        Ok(ProductionPlan {
            plan_id: row.get(0)?,
            plan_no: row.get(1)?,
            material_id: row.get(2)?,
            quantity: row.get(3)?,
            due_date: get_datetime(row, 4)?,
            status: get_enum(row, 5, PlanStatus::from_db_str)?,
            created_at: get_datetime(row, 6)?,
        })
    }

    /// 插入计划（订单侧录入/测试数据准备）
    pub fn insert(&self, plan: &ProductionPlan) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO production_plan (
                    plan_id, plan_no, material_id, quantity, due_date, status, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                plan.plan_id,
                plan.plan_no,
                plan.material_id,
                plan.quantity,
                format_datetime(&plan.due_date),
                plan.status.to_db_str(),
                format_datetime(&plan.created_at),
            ],
        )?;
        Ok(())
    }

    /// 按ID查询计划
    pub fn find_by_id(&self, plan_id: &str) -> RepositoryResult<Option<ProductionPlan>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM production_plan WHERE plan_id = ?1", PLAN_COLUMNS);
        let plan = conn
            .query_row(&sql, params![plan_id], Self::map_row)
            .optional()?;
        Ok(plan)
    }

    /// 查询待排产计划
    ///
    /// 排序: 交期升序；同交期按创建时间、计划ID，保证多次运行顺序稳定
    pub fn find_unscheduled(&self) -> RepositoryResult<Vec<ProductionPlan>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"SELECT {}
               FROM production_plan
               WHERE status = ?1
               ORDER BY due_date ASC, created_at ASC, plan_id ASC"#,
            PLAN_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let plans = stmt
            .query_map(params![PlanStatus::Unscheduled.to_db_str()], Self::map_row)?
            .collect::<Result<Vec<ProductionPlan>, _>>()?;
        Ok(plans)
    }

    /// 按状态统计计划数
    pub fn count_by_status(&self, status: PlanStatus) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM production_plan WHERE status = ?1",
            params![status.to_db_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

impl PlanStore for ProductionPlanRepository {
    fn find_unscheduled_ordered_by_due_date(&self) -> RepositoryResult<Vec<ProductionPlan>> {
        self.find_unscheduled()
    }
}
