// ==========================================
// 注塑排产系统 - 引擎层错误类型
// ==========================================
// 职责: 排产运行级错误（整次运行失败，不落库）
// 说明: 单个计划的跳过不是错误，见 SkippedPlan
// ==========================================

use crate::config::ConfigError;
use crate::engine::occupancy::OccupancyConflict;
use crate::repository::error::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulingError {
    /// 已有排产运行持有运行锁
    #[error("排产正在进行中: lock={lock_name}")]
    AlreadyRunning { lock_name: String },

    /// 超过运行时限，运行中止
    #[error("排产运行超时: 已耗时{elapsed_ms}ms，时限{deadline_secs}s（{stage}）")]
    DeadlineExceeded {
        elapsed_ms: u128,
        deadline_secs: u64,
        stage: &'static str,
    },

    /// 占用快照冲突（内部一致性被破坏）
    #[error(transparent)]
    OccupancyConflict(#[from] OccupancyConflict),

    #[error("配置读取失败: {0}")]
    Config(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<ConfigError> for SchedulingError {
    fn from(err: ConfigError) -> Self {
        SchedulingError::Config(err.to_string())
    }
}

pub type SchedulingResult<T> = Result<T, SchedulingError>;
