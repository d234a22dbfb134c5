// ==========================================
// 注塑排产系统 - 排产配置读取 Trait
// ==========================================
// 职责: 定义排产引擎所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;

/// 配置读取错误
pub type ConfigError = Box<dyn Error + Send + Sync>;

// ==========================================
// 默认值
// ==========================================
pub const DEFAULT_SYNC_WINDOW_DAYS: i64 = 3;
pub const DEFAULT_RUN_DEADLINE_SECS: u64 = 30;
pub const DEFAULT_RUN_LOCK_STALE_SECS: i64 = 600;

// ==========================================
// SchedulingConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）、测试 Mock
#[async_trait]
pub trait SchedulingConfigReader: Send + Sync {
    /// 共模多物料同步的交期窗口（天）
    ///
    /// # 默认值
    /// - 3
    async fn get_sync_window_days(&self) -> Result<i64, ConfigError>;

    /// 是否启用共模多物料同步
    ///
    /// # 默认值
    /// - true
    async fn is_sync_enabled(&self) -> Result<bool, ConfigError>;

    /// 是否启用灵活兜底（首选组合逾期时改选可按期完成的组合）
    ///
    /// # 默认值
    /// - true
    async fn is_flexible_fallback_enabled(&self) -> Result<bool, ConfigError>;

    /// 单次排产运行时限（秒），超时中止且不落库
    ///
    /// # 默认值
    /// - 30
    async fn get_run_deadline_secs(&self) -> Result<u64, ConfigError>;

    /// 运行锁过期时间（秒），超过后允许新运行接管
    ///
    /// # 默认值
    /// - 600
    async fn get_run_lock_stale_secs(&self) -> Result<i64, ConfigError>;

    /// 配置快照（JSON），写入运行日志；无快照能力的实现返回 None
    async fn get_config_snapshot_json(&self) -> Result<Option<String>, ConfigError> {
        Ok(None)
    }
}

// ==========================================
// SchedulingSettings - 单次运行的配置快照
// ==========================================
// 运行开始时一次性读取，运行期间不再访问配置源
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingSettings {
    pub sync_window_days: i64,
    pub sync_enabled: bool,
    pub flexible_fallback_enabled: bool,
    pub run_deadline_secs: u64,
    pub run_lock_stale_secs: i64,
}

impl Default for SchedulingSettings {
    fn default() -> Self {
        Self {
            sync_window_days: DEFAULT_SYNC_WINDOW_DAYS,
            sync_enabled: true,
            flexible_fallback_enabled: true,
            run_deadline_secs: DEFAULT_RUN_DEADLINE_SECS,
            run_lock_stale_secs: DEFAULT_RUN_LOCK_STALE_SECS,
        }
    }
}

impl SchedulingSettings {
    /// 从配置源加载
    pub async fn load<C>(config: &C) -> Result<Self, ConfigError>
    where
        C: SchedulingConfigReader + ?Sized,
    {
        Ok(Self {
            sync_window_days: config.get_sync_window_days().await?,
            sync_enabled: config.is_sync_enabled().await?,
            flexible_fallback_enabled: config.is_flexible_fallback_enabled().await?,
            run_deadline_secs: config.get_run_deadline_secs().await?,
            run_lock_stale_secs: config.get_run_lock_stale_secs().await?,
        })
    }
}
