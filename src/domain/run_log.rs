// ==========================================
// 注塑排产系统 - 排产运行日志
// ==========================================
// 用途: 每次排产运行的审计记录 (成功/失败/试算不落库)
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Succeeded, // 成功提交
    NoWork,    // 无待排产计划
    Failed,    // 失败 (已回滚)
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl RunStatus {
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "SUCCEEDED" => Some(RunStatus::Succeeded),
            "NO_WORK" => Some(RunStatus::NoWork),
            "FAILED" => Some(RunStatus::Failed),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            RunStatus::Succeeded => "SUCCEEDED",
            RunStatus::NoWork => "NO_WORK",
            RunStatus::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRunLog {
    pub run_id: String,
    pub started_at: NaiveDateTime,
    pub finished_at: NaiveDateTime,
    pub status: RunStatus,
    pub plans_count: usize,
    pub scheduled_count: usize,
    pub skipped_count: usize,
    pub overdue_count: usize,
    pub message: String,
    pub config_snapshot_json: Option<String>,
}
