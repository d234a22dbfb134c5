// ==========================================
// 注塑排产系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 提供幂等的建表脚本 (init_schema)
// ==========================================

use chrono::NaiveDateTime;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 时间戳存储格式（TEXT 列，字符串比较即时间比较）
pub const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 初始化数据库 schema（幂等）
///
/// 说明：
/// - 计划/任务/设备/模具/关联表由外部系统维护，这里只保证结构存在
/// - scheduling_run_lock / scheduling_run_log 为排产引擎自有表
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS device (
            device_id TEXT PRIMARY KEY,
            device_code TEXT NOT NULL,
            capacity_per_hour REAL NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'normal'
        );

        CREATE TABLE IF NOT EXISTS mold (
            mold_id TEXT PRIMARY KEY,
            mold_code TEXT NOT NULL,
            quantity INTEGER NOT NULL DEFAULT 1,
            status TEXT NOT NULL DEFAULT 'normal'
        );

        CREATE TABLE IF NOT EXISTS material_device_relation (
            material_id TEXT NOT NULL,
            device_id TEXT NOT NULL REFERENCES device(device_id),
            weight INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (material_id, device_id)
        );

        CREATE TABLE IF NOT EXISTS material_mold_relation (
            material_id TEXT NOT NULL,
            mold_id TEXT NOT NULL REFERENCES mold(mold_id),
            weight INTEGER NOT NULL DEFAULT 0,
            cycle_time_secs REAL,
            output_per_cycle INTEGER,
            PRIMARY KEY (material_id, mold_id)
        );

        CREATE TABLE IF NOT EXISTS production_plan (
            plan_id TEXT PRIMARY KEY,
            plan_no TEXT NOT NULL,
            material_id TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            due_date TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'unscheduled',
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_production_plan_status_due
            ON production_plan(status, due_date);

        CREATE TABLE IF NOT EXISTS production_task (
            task_id TEXT PRIMARY KEY,
            plan_id TEXT NOT NULL UNIQUE REFERENCES production_plan(plan_id),
            material_id TEXT NOT NULL,
            device_id TEXT NOT NULL,
            mold_id TEXT NOT NULL,
            task_quantity INTEGER NOT NULL,
            due_date TEXT NOT NULL,
            planned_start_time TEXT NOT NULL,
            planned_end_time TEXT NOT NULL,
            is_overdue INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending',
            schedule_rule TEXT NOT NULL,
            schedule_reason TEXT NOT NULL,
            sync_group_id TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_production_task_device ON production_task(device_id);
        CREATE INDEX IF NOT EXISTS idx_production_task_mold ON production_task(mold_id);

        CREATE TABLE IF NOT EXISTS scheduling_run_lock (
            lock_name TEXT PRIMARY KEY,
            holder TEXT,
            acquired_at TEXT
        );

        CREATE TABLE IF NOT EXISTS scheduling_run_log (
            run_id TEXT PRIMARY KEY,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            status TEXT NOT NULL,
            plans_count INTEGER NOT NULL DEFAULT 0,
            scheduled_count INTEGER NOT NULL DEFAULT 0,
            skipped_count INTEGER NOT NULL DEFAULT 0,
            overdue_count INTEGER NOT NULL DEFAULT 0,
            message TEXT NOT NULL,
            config_snapshot_json TEXT
        );
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 格式化时间戳
pub fn format_datetime(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FMT).to_string()
}

/// 解析时间戳（兼容 ISO 的 'T' 分隔符）
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    NaiveDateTime::parse_from_str(trimmed, DATETIME_FMT)
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}
