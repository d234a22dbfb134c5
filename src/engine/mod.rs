// ==========================================
// 注塑排产系统 - 引擎层
// ==========================================
// 职责: 实现排产规则引擎,不拼 SQL
// 红线: Engine 不拼 SQL, 所有分配必须输出 reason
// ==========================================

pub mod allocator;
pub mod candidate;
pub mod committer;
pub mod error;
pub mod occupancy;
pub mod orchestrator;
pub mod reason;
pub mod repositories;
pub mod sync_group;
pub mod time_slot;

// 重导出核心引擎
pub use allocator::{AllocationDecision, AllocationOutcome, Allocator, PairPreference, SkipCode};
pub use candidate::{CandidateResolver, CandidateSet};
pub use committer::TaskCommitter;
pub use error::{SchedulingError, SchedulingResult};
pub use occupancy::{OccupancyConflict, OccupancySnapshot, OccupiedWindow, ResourceTimeline};
pub use orchestrator::{
    RunStatistics, ScheduleRunResult, SchedulingEngine, SkippedPlan, RUN_LOCK_NAME,
};
pub use reason::ReasonAnnotator;
pub use repositories::{
    PlanStore, ResourceStore, RunLockStore, RunLogStore, SchedulingRepositories, TaskStore,
};
pub use sync_group::{GroupAllocation, SyncGroup, SyncGroupPlanner};
pub use time_slot::{TimeSlot, TimeSlotCalculator, TimeSlotError};
