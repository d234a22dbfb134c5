// ==========================================
// 注塑排产系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod error;
pub mod production_plan_repo;
pub mod production_task_repo;
pub mod resource_repo;
pub mod row_utils;
pub mod run_lock_repo;
pub mod run_log_repo;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use production_plan_repo::ProductionPlanRepository;
pub use production_task_repo::ProductionTaskRepository;
pub use resource_repo::ResourceRepository;
pub use run_lock_repo::RunLockRepository;
pub use run_log_repo::RunLogRepository;
