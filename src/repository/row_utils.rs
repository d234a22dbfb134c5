// ==========================================
// 注塑排产系统 - 行映射辅助函数
// ==========================================
// 职责: TEXT 列 → 领域类型的解析，解析失败转换为 rusqlite 转换错误
// ==========================================

use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::Row;

use crate::db::parse_datetime;

/// 构造列转换错误
pub fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

/// 读取时间戳列
pub fn get_datetime(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    parse_datetime(&raw).ok_or_else(|| conversion_error(idx, format!("无效时间戳: {}", raw)))
}

/// 读取枚举列（由调用方提供解析函数）
pub fn get_enum<T>(
    row: &Row<'_>,
    idx: usize,
    parse: impl Fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| conversion_error(idx, format!("无效枚举值: {}", raw)))
}
