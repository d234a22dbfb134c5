// ==========================================
// 注塑排产系统 - 任务提交
// ==========================================
// 职责: 单事务写入本次运行的全部任务，并将对应计划置为 scheduled
// 红线: 一个计划只产生一个任务；任一失败整体回滚
// ==========================================

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::domain::ProductionTask;
use crate::engine::repositories::TaskStore;
use crate::repository::{RepositoryError, RepositoryResult};

pub struct TaskCommitter {
    store: Arc<dyn TaskStore>,
}

impl TaskCommitter {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    /// 提交任务
    ///
    /// # 返回
    /// 写入的任务数（空列表不访问数据库）
    #[instrument(skip(self, tasks), fields(tasks_count = tasks.len()))]
    pub fn commit(&self, tasks: &[ProductionTask]) -> RepositoryResult<usize> {
        if tasks.is_empty() {
            return Ok(0);
        }

        let mut seen = HashSet::with_capacity(tasks.len());
        for task in tasks {
            if !seen.insert(task.plan_id.as_str()) {
                return Err(RepositoryError::InternalError(format!(
                    "同一计划生成了多个任务: plan_id={}",
                    task.plan_id
                )));
            }
        }

        let written = self.store.commit_run(tasks)?;
        info!(written_count = written, "排产任务已提交");
        Ok(written)
    }
}
