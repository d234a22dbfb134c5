// ==========================================
// 注塑排产系统 - 排产执行 API
// ==========================================
// 职责: 触发一次排产运行并返回结构化结果
// 对应: POST /scheduling/execute
// ==========================================

use serde::Serialize;
use std::sync::Arc;

use crate::api::error::{ApiError, ApiResult};
use crate::config::SchedulingConfigReader;
use crate::domain::ProductionTask;
use crate::engine::{RunStatistics, ScheduleRunResult, SchedulingEngine, SkippedPlan};

// ==========================================
// 响应结构
// ==========================================

/// 排产执行响应
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleExecutionResponse {
    pub success: bool,
    pub message: String,
    pub tasks: Vec<ProductionTask>,
    pub skipped: Vec<SkippedPlan>,
    pub run_id: Option<String>,
    pub dry_run: bool,
    pub stats: Option<RunStatistics>,
}

impl ScheduleExecutionResponse {
    /// 失败响应（错误原因写入 message）
    pub fn failure(err: &ApiError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            tasks: Vec::new(),
            skipped: Vec::new(),
            run_id: None,
            dry_run: false,
            stats: None,
        }
    }
}

impl From<ScheduleRunResult> for ScheduleExecutionResponse {
    fn from(result: ScheduleRunResult) -> Self {
        Self {
            success: true,
            message: result.message,
            tasks: result.tasks,
            skipped: result.skipped,
            run_id: Some(result.run_id),
            dry_run: result.dry_run,
            stats: Some(result.stats),
        }
    }
}

// ==========================================
// SchedulingApi - 排产执行 API
// ==========================================
pub struct SchedulingApi<C>
where
    C: SchedulingConfigReader,
{
    engine: Arc<SchedulingEngine<C>>,
}

impl<C> SchedulingApi<C>
where
    C: SchedulingConfigReader,
{
    pub fn new(engine: Arc<SchedulingEngine<C>>) -> Self {
        Self { engine }
    }

    /// 执行排产并提交
    ///
    /// # 返回
    /// - Ok: 运行成功（包括无待排产计划的情况）
    /// - Err(SchedulingInProgress): 已有运行进行中
    /// - Err: 超时/持久化失败（整体回滚）
    pub async fn execute(&self) -> ApiResult<ScheduleExecutionResponse> {
        let result = self.engine.execute().await?;
        Ok(result.into())
    }

    /// 试算，不落库
    pub async fn execute_dry_run(&self) -> ApiResult<ScheduleExecutionResponse> {
        let result = self.engine.execute_dry_run().await?;
        Ok(result.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_response_carries_reason() {
        let resp = ScheduleExecutionResponse::failure(&ApiError::SchedulingInProgress);
        assert!(!resp.success);
        assert!(resp.message.contains("排产正在进行中"));
        assert!(resp.tasks.is_empty());

        let json = serde_json::to_value(&resp).unwrap();
        for key in ["success", "message", "tasks", "skipped", "run_id"] {
            assert!(json.get(key).is_some(), "缺少字段 {}", key);
        }
    }
}
