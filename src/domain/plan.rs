// ==========================================
// 注塑排产系统 - 生产计划领域模型
// ==========================================
// 红线: 计划由订单侧创建，排产引擎只做状态流转，不删除
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::types::PlanStatus;

// ==========================================
// ProductionPlan - 生产计划
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionPlan {
    pub plan_id: String,           // 计划ID
    pub plan_no: String,           // 计划编号 (仅展示，不参与规则判定)
    pub material_id: String,       // 物料ID
    pub quantity: i64,             // 需求数量 (件)
    pub due_date: NaiveDateTime,   // 交期
    pub status: PlanStatus,        // 状态
    pub created_at: NaiveDateTime, // 创建时间
}

impl ProductionPlan {
    /// 是否处于待排产状态
    pub fn is_unscheduled(&self) -> bool {
        self.status == PlanStatus::Unscheduled
    }

    /// 数量是否可排 (非正数量视为无效计划)
    pub fn has_valid_quantity(&self) -> bool {
        self.quantity > 0
    }
}
