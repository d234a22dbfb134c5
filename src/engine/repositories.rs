// ==========================================
// 注塑排产系统 - 引擎层仓储接口与聚合
// ==========================================
// 职责: 定义排产引擎所需的数据访问 trait，并聚合为一个参数
// 说明: Engine 层定义 trait，Repository 层 (SQLite) 实现；
//       单元测试可注入内存实现
// ==========================================

use std::sync::Arc;

use crate::domain::{
    Device, DeviceCandidate, Mold, MoldCandidate, ProductionPlan, ProductionTask, ScheduleRunLog,
};
use crate::repository::RepositoryResult;

/// 计划读取接口
pub trait PlanStore: Send + Sync {
    /// 查询全部待排产计划，按交期升序
    fn find_unscheduled_ordered_by_due_date(&self) -> RepositoryResult<Vec<ProductionPlan>>;
}

/// 设备/模具及关联读取接口
pub trait ResourceStore: Send + Sync {
    /// 可用设备 (status = normal)
    fn find_available_devices(&self) -> RepositoryResult<Vec<Device>>;

    /// 可用模具 (status = normal)
    fn find_available_molds(&self) -> RepositoryResult<Vec<Mold>>;

    /// 物料的设备候选，权重降序
    fn find_device_candidates(&self, material_id: &str) -> RepositoryResult<Vec<DeviceCandidate>>;

    /// 物料的模具候选，权重降序
    fn find_mold_candidates(&self, material_id: &str) -> RepositoryResult<Vec<MoldCandidate>>;
}

/// 任务读写接口
pub trait TaskStore: Send + Sync {
    /// 全部已提交任务，按创建顺序
    fn find_all_in_creation_order(&self) -> RepositoryResult<Vec<ProductionTask>>;

    /// 单事务提交: 插入全部任务 + 对应计划置为 scheduled
    ///
    /// 任一失败必须整体回滚
    fn commit_run(&self, tasks: &[ProductionTask]) -> RepositoryResult<usize>;
}

/// 排产运行互斥锁
pub trait RunLockStore: Send + Sync {
    /// 尝试获取命名锁；超过 stale_after_secs 未释放的锁允许接管
    fn try_acquire(&self, lock_name: &str, holder: &str, stale_after_secs: i64)
        -> RepositoryResult<bool>;

    /// 释放锁（仅持有者可释放）
    fn release(&self, lock_name: &str, holder: &str) -> RepositoryResult<()>;
}

/// 运行日志写入接口
pub trait RunLogStore: Send + Sync {
    fn insert_run_log(&self, entry: &ScheduleRunLog) -> RepositoryResult<()>;
}

/// 排产引擎仓储集合
///
/// 聚合排产引擎所需的所有仓储接口，简化依赖注入
#[derive(Clone)]
pub struct SchedulingRepositories {
    pub plans: Arc<dyn PlanStore>,
    pub resources: Arc<dyn ResourceStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub run_lock: Arc<dyn RunLockStore>,
    pub run_log: Arc<dyn RunLogStore>,
}

impl SchedulingRepositories {
    /// 创建新的仓储集合
    pub fn new(
        plans: Arc<dyn PlanStore>,
        resources: Arc<dyn ResourceStore>,
        tasks: Arc<dyn TaskStore>,
        run_lock: Arc<dyn RunLockStore>,
        run_log: Arc<dyn RunLogStore>,
    ) -> Self {
        Self {
            plans,
            resources,
            tasks,
            run_lock,
            run_log,
        }
    }
}
