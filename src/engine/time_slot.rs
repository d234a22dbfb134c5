// ==========================================
// 注塑排产系统 - 时间窗计算引擎
// ==========================================
// 职责: 计算最早可行开始时间、结束时间与逾期标记
// 公式: start = max(now, 设备最晚结束, 模具最晚结束)
//       duration = ceil(quantity / capacity_per_hour * 3600) 秒
//       end = start + duration; is_overdue = end > due_date
// 红线: 产能/数量非法时在除法之前拒绝
// ==========================================

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use thiserror::Error;

/// 时间窗计算错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimeSlotError {
    #[error("设备产能非法: {capacity_per_hour}")]
    InvalidCapacity { capacity_per_hour: f64 },

    #[error("计划数量非法: {quantity}")]
    InvalidQuantity { quantity: i64 },

    #[error("生产时长超出可表示范围: quantity={quantity}, capacity_per_hour={capacity_per_hour}")]
    DurationOverflow { quantity: i64, capacity_per_hour: f64 },
}

/// 计算得到的时间窗
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeSlot {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub is_overdue: bool,
}

impl TimeSlot {
    pub fn duration_secs(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }
}

// ==========================================
// TimeSlotCalculator - 时间窗计算引擎
// ==========================================
pub struct TimeSlotCalculator {
    // 无状态引擎
}

impl TimeSlotCalculator {
    pub fn new() -> Self {
        Self {}
    }

    /// 生产时长（秒，向上取整）
    pub fn duration_secs(&self, quantity: i64, capacity_per_hour: f64) -> Result<i64, TimeSlotError> {
        if !capacity_per_hour.is_finite() || capacity_per_hour <= 0.0 {
            return Err(TimeSlotError::InvalidCapacity { capacity_per_hour });
        }
        if quantity <= 0 {
            return Err(TimeSlotError::InvalidQuantity { quantity });
        }

        let secs = (quantity as f64 / capacity_per_hour * 3600.0).ceil();
        // 上限约 100 年，避免 chrono 溢出
        if !secs.is_finite() || secs > 3_155_760_000.0 {
            return Err(TimeSlotError::DurationOverflow {
                quantity,
                capacity_per_hour,
            });
        }
        Ok(secs as i64)
    }

    /// 最早可行开始时间
    pub fn earliest_start(
        &self,
        now: NaiveDateTime,
        device_free_at: Option<NaiveDateTime>,
        mold_free_at: Option<NaiveDateTime>,
    ) -> NaiveDateTime {
        [Some(now), device_free_at, mold_free_at]
            .into_iter()
            .flatten()
            .max()
            .unwrap_or(now)
    }

    /// 计算时间窗
    ///
    /// # 参数
    /// - now: 本次运行的当前时间
    /// - device_free_at / mold_free_at: 资源最晚占用结束时间（无占用为 None）
    /// - quantity: 计划数量
    /// - capacity_per_hour: 设备每小时产能
    /// - due_date: 交期
    pub fn calculate(
        &self,
        now: NaiveDateTime,
        device_free_at: Option<NaiveDateTime>,
        mold_free_at: Option<NaiveDateTime>,
        quantity: i64,
        capacity_per_hour: f64,
        due_date: NaiveDateTime,
    ) -> Result<TimeSlot, TimeSlotError> {
        let secs = self.duration_secs(quantity, capacity_per_hour)?;
        let start = self.earliest_start(now, device_free_at, mold_free_at);
        Ok(self.slot_from(start, secs, due_date))
    }

    /// 由开始时间与时长构造时间窗
    pub fn slot_from(&self, start: NaiveDateTime, duration_secs: i64, due_date: NaiveDateTime) -> TimeSlot {
        let end = start + Duration::seconds(duration_secs);
        TimeSlot {
            start,
            end,
            is_overdue: end > due_date,
        }
    }
}

impl Default for TimeSlotCalculator {
    fn default() -> Self {
        Self::new()
    }
}
