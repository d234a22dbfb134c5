// ==========================================
// 注塑排产系统 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// ==========================================

use rusqlite::Connection;
use std::sync::{Arc, Mutex};

use crate::api::SchedulingApi;
use crate::config::config_manager::ConfigManager;
use crate::db::{init_schema, open_sqlite_connection};
use crate::engine::{SchedulingEngine, SchedulingRepositories};
use crate::repository::{
    ProductionPlanRepository, ProductionTaskRepository, ResourceRepository, RunLockRepository,
    RunLogRepository,
};

/// 应用状态
///
/// 包含所有API实例和共享资源
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 共享数据库连接
    pub conn: Arc<Mutex<Connection>>,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 计划仓储（订单侧录入计划）
    pub plan_repo: Arc<ProductionPlanRepository>,

    /// 任务仓储
    pub task_repo: Arc<ProductionTaskRepository>,

    /// 设备/模具主数据仓储
    pub resource_repo: Arc<ResourceRepository>,

    /// 运行日志仓储
    pub run_log_repo: Arc<RunLogRepository>,

    /// 排产引擎（API 与测试共用）
    pub engine: Arc<SchedulingEngine<ConfigManager>>,

    /// 排产执行API
    pub scheduling_api: Arc<SchedulingApi<ConfigManager>>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    ///
    /// # 说明
    /// 打开共享连接并初始化表结构（幂等），再装配仓储、引擎与 API
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!(db_path = %db_path, "初始化AppState");

        let conn = open_sqlite_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        init_schema(&conn).map_err(|e| format!("数据库表结构初始化失败: {}", e))?;

        Self::from_connection(db_path, Arc::new(Mutex::new(conn)))
    }

    /// 从已有连接装配（连接须已完成 init_schema）
    pub fn from_connection(db_path: String, conn: Arc<Mutex<Connection>>) -> Result<Self, String> {
        // ==========================================
        // 初始化Repository层
        // ==========================================
        let plan_repo = Arc::new(ProductionPlanRepository::new(conn.clone()));
        let task_repo = Arc::new(ProductionTaskRepository::new(conn.clone()));
        let resource_repo = Arc::new(ResourceRepository::new(conn.clone()));
        let run_lock_repo = Arc::new(RunLockRepository::new(conn.clone()));
        let run_log_repo = Arc::new(RunLogRepository::new(conn.clone()));

        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );

        // ==========================================
        // 初始化Engine与API层
        // ==========================================
        let repos = SchedulingRepositories::new(
            plan_repo.clone(),
            resource_repo.clone(),
            task_repo.clone(),
            run_lock_repo,
            run_log_repo.clone(),
        );
        let engine = Arc::new(SchedulingEngine::new(config_manager.clone(), repos));
        let scheduling_api = Arc::new(SchedulingApi::new(engine.clone()));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            conn,
            config_manager,
            plan_repo,
            task_repo,
            resource_repo,
            run_log_repo,
            engine,
            scheduling_api,
        })
    }
}

/// 获取默认数据库路径
///
/// 优先级: 环境变量 MOLD_APS_DB_PATH → 用户数据目录 → 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    // 允许通过环境变量显式指定 DB 路径（便于调试/测试/CI）
    if let Ok(path) = std::env::var("MOLD_APS_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./mold_aps.db");

    if let Some(data_dir) = dirs::data_dir() {
        // 开发环境使用独立目录，避免污染生产数据
        #[cfg(debug_assertions)]
        {
            path = data_dir.join("mold-aps-dev");
        }

        #[cfg(not(debug_assertions))]
        {
            path = data_dir.join("mold-aps");
        }

        // 确保目录存在
        std::fs::create_dir_all(&path).ok();
        path = path.join("mold_aps.db");
    }

    path.to_string_lossy().to_string()
}
