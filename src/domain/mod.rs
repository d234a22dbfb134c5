// ==========================================
// 注塑排产系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod plan;
pub mod resource;
pub mod run_log;
pub mod task;
pub mod types;

// 重导出核心类型
pub use plan::ProductionPlan;
pub use resource::{
    Device, DeviceCandidate, MaterialDeviceRelation, MaterialMoldRelation, Mold, MoldCandidate,
};
pub use run_log::{RunStatus, ScheduleRunLog};
pub use task::ProductionTask;
pub use types::{PlanStatus, ResourceStatus, ScheduleRule, TaskStatus};
