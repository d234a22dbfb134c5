// ==========================================
// 注塑排产系统 - 生产任务领域模型
// ==========================================
// 红线: 一个计划只产生一个任务；任务提交后不可修改 (执行状态除外)
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::types::{ScheduleRule, TaskStatus};

// ==========================================
// ProductionTask - 生产任务
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionTask {
    pub task_id: String,                      // 任务ID
    pub plan_id: String,                      // 关联计划 (1:1)
    pub material_id: String,                  // 物料ID (冗余，用于一致性规则)
    pub device_id: String,                    // 设备ID
    pub mold_id: String,                      // 模具ID
    pub task_quantity: i64,                   // 任务数量
    pub due_date: NaiveDateTime,              // 交期
    pub planned_start_time: NaiveDateTime,    // 计划开始
    pub planned_end_time: NaiveDateTime,      // 计划结束
    pub is_overdue: bool,                     // 是否逾期
    pub status: TaskStatus,                   // 任务状态
    pub schedule_rule: ScheduleRule,          // 排产规则分类
    pub schedule_reason: String,              // 排产原因 (可解释性)
    pub sync_group_id: Option<String>,        // 共模同步组ID
    pub created_at: NaiveDateTime,            // 创建时间
}

impl ProductionTask {
    /// 计划时长（秒）
    pub fn duration_secs(&self) -> i64 {
        (self.planned_end_time - self.planned_start_time).num_seconds()
    }

    /// 两个任务是否属于同一共模同步组
    pub fn shares_sync_group(&self, other: &ProductionTask) -> bool {
        match (&self.sync_group_id, &other.sync_group_id) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}
