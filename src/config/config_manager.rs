// ==========================================
// 注塑排产系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::scheduling_config_trait::{
    ConfigError, SchedulingConfigReader, DEFAULT_RUN_DEADLINE_SECS, DEFAULT_RUN_LOCK_STALE_SECS,
    DEFAULT_SYNC_WINDOW_DAYS,
};
use crate::db::open_sqlite_connection;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, ConfigError> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, ConfigError> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> Result<Option<String>, ConfigError> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, ConfigError> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 读取并解析配置值；缺失使用默认值，格式错误告警后使用默认值
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + Copy + std::fmt::Display,
    {
        match self.get_config_value(key)? {
            None => Ok(default),
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(v) => Ok(v),
                Err(_) => {
                    tracing::warn!(
                        config_key = key,
                        raw_value = %raw,
                        default_value = %default,
                        "配置格式错误，使用默认值"
                    );
                    Ok(default)
                }
            },
        }
    }

    /// 读取布尔配置（支持 true/false/1/0/Y/N）
    fn get_bool_or_default(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get_config_value(key)? {
            None => Ok(default),
            Some(raw) => match raw.trim().to_lowercase().as_str() {
                "true" | "1" | "y" | "yes" => Ok(true),
                "false" | "0" | "n" | "no" => Ok(false),
                _ => {
                    tracing::warn!(config_key = key, raw_value = %raw, "布尔配置格式错误，使用默认值");
                    Ok(default)
                }
            },
        }
    }

    /// 获取所有配置的快照（JSON格式）
    ///
    /// # 用途
    /// - 写入排产运行日志，便于回溯当次运行使用的参数
    pub fn get_config_snapshot(&self) -> Result<String, ConfigError> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&config_map)?)
    }
}

// ==========================================
// SchedulingConfigReader Trait 实现
// ==========================================
#[async_trait]
impl SchedulingConfigReader for ConfigManager {
    async fn get_sync_window_days(&self) -> Result<i64, ConfigError> {
        let days = self.get_parsed_or_default(config_keys::SYNC_WINDOW_DAYS, DEFAULT_SYNC_WINDOW_DAYS)?;
        if days < 0 {
            tracing::warn!(sync_window_days = days, "同步窗口为负数，使用默认值");
            return Ok(DEFAULT_SYNC_WINDOW_DAYS);
        }
        Ok(days)
    }

    async fn is_sync_enabled(&self) -> Result<bool, ConfigError> {
        self.get_bool_or_default(config_keys::SYNC_ENABLED, true)
    }

    async fn is_flexible_fallback_enabled(&self) -> Result<bool, ConfigError> {
        self.get_bool_or_default(config_keys::FLEXIBLE_FALLBACK_ENABLED, true)
    }

    async fn get_run_deadline_secs(&self) -> Result<u64, ConfigError> {
        let secs = self.get_parsed_or_default(config_keys::RUN_DEADLINE_SECS, DEFAULT_RUN_DEADLINE_SECS)?;
        Ok(if secs == 0 { DEFAULT_RUN_DEADLINE_SECS } else { secs })
    }

    async fn get_run_lock_stale_secs(&self) -> Result<i64, ConfigError> {
        let secs =
            self.get_parsed_or_default(config_keys::RUN_LOCK_STALE_SECS, DEFAULT_RUN_LOCK_STALE_SECS)?;
        Ok(if secs <= 0 { DEFAULT_RUN_LOCK_STALE_SECS } else { secs })
    }

    async fn get_config_snapshot_json(&self) -> Result<Option<String>, ConfigError> {
        Ok(Some(self.get_config_snapshot()?))
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 共模多物料同步
    pub const SYNC_ENABLED: &str = "scheduling_sync_enabled";
    pub const SYNC_WINDOW_DAYS: &str = "scheduling_sync_window_days";

    // 灵活兜底
    pub const FLEXIBLE_FALLBACK_ENABLED: &str = "scheduling_flexible_fallback_enabled";

    // 运行控制
    pub const RUN_DEADLINE_SECS: &str = "scheduling_run_deadline_secs";
    pub const RUN_LOCK_STALE_SECS: &str = "scheduling_run_lock_stale_secs";
}
