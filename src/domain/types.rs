// ==========================================
// 注塑排产系统 - 领域类型定义
// ==========================================
// 职责: 计划/任务/资源状态枚举与排产规则分类
// 序列化格式: 与数据库存储一致 (小写 / SCREAMING_SNAKE_CASE)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 生产计划状态 (Plan Status)
// ==========================================
// 状态流转: unscheduled → scheduled (仅由排产引擎执行)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Unscheduled, // 待排产
    Scheduled,   // 已排产
    Cancelled,   // 已取消
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl PlanStatus {
    /// 从数据库字符串解析
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "unscheduled" => Some(PlanStatus::Unscheduled),
            "scheduled" => Some(PlanStatus::Scheduled),
            "cancelled" => Some(PlanStatus::Cancelled),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            PlanStatus::Unscheduled => "unscheduled",
            PlanStatus::Scheduled => "scheduled",
            PlanStatus::Cancelled => "cancelled",
        }
    }
}

// ==========================================
// 生产任务状态 (Task Status)
// ==========================================
// 排产引擎只创建 pending 任务，后续执行状态由下游维护
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,    // 待执行
    InProgress, // 执行中
    Completed,  // 已完成
    Cancelled,  // 已取消
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl TaskStatus {
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(TaskStatus::Pending),
            "in_progress" => Some(TaskStatus::InProgress),
            "completed" => Some(TaskStatus::Completed),
            "cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

// ==========================================
// 资源状态 (Resource Status)
// ==========================================
// 只有 normal 状态的设备/模具才能成为候选
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    Normal,      // 正常
    Maintenance, // 维修中
    Disabled,    // 停用
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl ResourceStatus {
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "normal" => Some(ResourceStatus::Normal),
            "maintenance" => Some(ResourceStatus::Maintenance),
            "disabled" => Some(ResourceStatus::Disabled),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            ResourceStatus::Normal => "normal",
            ResourceStatus::Maintenance => "maintenance",
            ResourceStatus::Disabled => "disabled",
        }
    }

    pub fn is_available(&self) -> bool {
        *self == ResourceStatus::Normal
    }
}

// ==========================================
// 排产规则分类 (Schedule Rule)
// ==========================================
// 规则优先级顺序:
// 1 交期优先 → 2 设备权重 → 3 模具权重 → 4 模具设备互斥 → 5 单套模具绑定
// → 6 同物料一致 → 7 同模具一致 → 8 一计划一任务 → 9 共模多物料同步 → 10 灵活兜底
//
// 红线: 只用于审计说明，不参与分配决策
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleRule {
    DueDatePriority,
    DeviceWeightPriority,
    MoldWeightPriority,
    MoldDeviceExclusivity,
    MoldDeviceBinding,
    SameMaterialConsistency,
    SameMoldConsistency,
    MultiMaterialSync,
    FlexibleFallback,
}

impl fmt::Display for ScheduleRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl ScheduleRule {
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "DUE_DATE_PRIORITY" => Some(ScheduleRule::DueDatePriority),
            "DEVICE_WEIGHT_PRIORITY" => Some(ScheduleRule::DeviceWeightPriority),
            "MOLD_WEIGHT_PRIORITY" => Some(ScheduleRule::MoldWeightPriority),
            "MOLD_DEVICE_EXCLUSIVITY" => Some(ScheduleRule::MoldDeviceExclusivity),
            "MOLD_DEVICE_BINDING" => Some(ScheduleRule::MoldDeviceBinding),
            "SAME_MATERIAL_CONSISTENCY" => Some(ScheduleRule::SameMaterialConsistency),
            "SAME_MOLD_CONSISTENCY" => Some(ScheduleRule::SameMoldConsistency),
            "MULTI_MATERIAL_SYNC" => Some(ScheduleRule::MultiMaterialSync),
            "FLEXIBLE_FALLBACK" => Some(ScheduleRule::FlexibleFallback),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            ScheduleRule::DueDatePriority => "DUE_DATE_PRIORITY",
            ScheduleRule::DeviceWeightPriority => "DEVICE_WEIGHT_PRIORITY",
            ScheduleRule::MoldWeightPriority => "MOLD_WEIGHT_PRIORITY",
            ScheduleRule::MoldDeviceExclusivity => "MOLD_DEVICE_EXCLUSIVITY",
            ScheduleRule::MoldDeviceBinding => "MOLD_DEVICE_BINDING",
            ScheduleRule::SameMaterialConsistency => "SAME_MATERIAL_CONSISTENCY",
            ScheduleRule::SameMoldConsistency => "SAME_MOLD_CONSISTENCY",
            ScheduleRule::MultiMaterialSync => "MULTI_MATERIAL_SYNC",
            ScheduleRule::FlexibleFallback => "FLEXIBLE_FALLBACK",
        }
    }

    /// 中文规则名（用于原因文本）
    pub fn title_cn(&self) -> &'static str {
        match self {
            ScheduleRule::DueDatePriority => "交期优先",
            ScheduleRule::DeviceWeightPriority => "设备权重优先",
            ScheduleRule::MoldWeightPriority => "模具权重优先",
            ScheduleRule::MoldDeviceExclusivity => "模具设备互斥",
            ScheduleRule::MoldDeviceBinding => "单套模具绑定",
            ScheduleRule::SameMaterialConsistency => "同物料一致性",
            ScheduleRule::SameMoldConsistency => "同模具一致性",
            ScheduleRule::MultiMaterialSync => "共模多物料同步",
            ScheduleRule::FlexibleFallback => "灵活兜底",
        }
    }
}
