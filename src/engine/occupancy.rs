// ==========================================
// 注塑排产系统 - 资源占用快照 (Resource State Tracker)
// ==========================================
// 职责: 每次运行开始时，由已提交任务重建设备/模具占用时间窗
//       以及单套模具的绑定设备；运行中随新任务原地扩展
// 红线: 同一设备 / 同一模具的占用窗口不得重叠
//       (同一共模同步组共享同一窗口，视为一次生产)
// ==========================================
// 生命周期: 每次运行重建 → 运行中扩展 → 运行结束丢弃
// ==========================================

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use crate::domain::{Device, Mold, ProductionTask};

// ==========================================
// OccupiedWindow - 占用窗口 [start, end)
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OccupiedWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub sync_group_id: Option<String>,
}

impl OccupiedWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime, sync_group_id: Option<String>) -> Self {
        Self {
            start,
            end,
            sync_group_id,
        }
    }

    /// 半开区间重叠判定
    pub fn overlaps(&self, other: &OccupiedWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// 同一同步组的同一窗口（重复记录，不算冲突）
    fn is_same_group_window(&self, other: &OccupiedWindow) -> bool {
        self.sync_group_id.is_some()
            && self.sync_group_id == other.sync_group_id
            && self.start == other.start
            && self.end == other.end
    }
}

/// 占用冲突
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("占用冲突: resource={resource_id}, 新窗口=[{new_start}, {new_end}) 与已有窗口=[{existing_start}, {existing_end}) 重叠")]
pub struct OccupancyConflict {
    pub resource_id: String,
    pub new_start: NaiveDateTime,
    pub new_end: NaiveDateTime,
    pub existing_start: NaiveDateTime,
    pub existing_end: NaiveDateTime,
}

// ==========================================
// ResourceTimeline - 单个资源的有序占用列表
// ==========================================
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResourceTimeline {
    windows: Vec<OccupiedWindow>, // 按 start 升序
}

impl ResourceTimeline {
    pub fn windows(&self) -> &[OccupiedWindow] {
        &self.windows
    }

    /// 最晚占用结束时间
    pub fn latest_end(&self) -> Option<NaiveDateTime> {
        self.windows.iter().map(|w| w.end).max()
    }

    /// 插入占用窗口（显式冲突检查）
    ///
    /// # 返回
    /// - Ok(true): 已插入
    /// - Ok(false): 同一同步组的同一窗口已存在，忽略
    /// - Err: 与已有窗口重叠
    pub fn insert(
        &mut self,
        resource_id: &str,
        window: OccupiedWindow,
    ) -> Result<bool, OccupancyConflict> {
        for existing in &self.windows {
            if existing.is_same_group_window(&window) {
                return Ok(false);
            }
            if existing.overlaps(&window) {
                return Err(OccupancyConflict {
                    resource_id: resource_id.to_string(),
                    new_start: window.start,
                    new_end: window.end,
                    existing_start: existing.start,
                    existing_end: existing.end,
                });
            }
        }

        let pos = self
            .windows
            .partition_point(|w| (w.start, w.end) <= (window.start, window.end));
        self.windows.insert(pos, window);
        Ok(true)
    }
}

// ==========================================
// MoldOccupancy - 模具占用 + 绑定设备
// ==========================================
#[derive(Debug, Clone, Serialize)]
pub struct MoldOccupancy {
    pub single_instance: bool,
    pub bound_device_id: Option<String>, // 仅单套模具有意义
    pub last_device_id: Option<String>,  // 最近一次使用的设备（同模具一致性）
    pub timeline: ResourceTimeline,
}

// ==========================================
// OccupancySnapshot - 资源占用快照
// ==========================================
#[derive(Debug, Clone, Default, Serialize)]
pub struct OccupancySnapshot {
    devices: HashMap<String, ResourceTimeline>,
    molds: HashMap<String, MoldOccupancy>,
    // 物料 → 最近一次使用的 (设备, 模具)（同物料一致性）
    material_pairings: HashMap<String, (String, String)>,
}

impl OccupancySnapshot {
    /// 由可用资源与已提交任务构建快照
    ///
    /// # 参数
    /// - devices: 可用设备
    /// - molds: 可用模具
    /// - tasks: 已提交任务（按创建顺序；单套模具的绑定取首个任务的设备）
    ///
    /// # 说明
    /// - 引用了不在可用集合中的设备/模具的任务，其占用不记录（不报错）
    /// - 历史数据自身存在重叠时只告警并保留已有窗口，不中断运行
    pub fn build(devices: &[Device], molds: &[Mold], tasks: &[ProductionTask]) -> Self {
        let mut snapshot = Self {
            devices: devices
                .iter()
                .map(|d| (d.device_id.clone(), ResourceTimeline::default()))
                .collect(),
            molds: molds
                .iter()
                .map(|m| {
                    (
                        m.mold_id.clone(),
                        MoldOccupancy {
                            single_instance: m.is_single_instance(),
                            bound_device_id: None,
                            last_device_id: None,
                            timeline: ResourceTimeline::default(),
                        },
                    )
                })
                .collect(),
            material_pairings: HashMap::new(),
        };

        let mut ignored = 0usize;
        for task in tasks {
            let window = OccupiedWindow::new(
                task.planned_start_time,
                task.planned_end_time,
                task.sync_group_id.clone(),
            );

            if let Some(timeline) = snapshot.devices.get_mut(&task.device_id) {
                if let Err(conflict) = timeline.insert(&task.device_id, window.clone()) {
                    tracing::warn!(task_id = %task.task_id, %conflict, "历史任务设备占用重叠");
                }
            } else {
                ignored += 1;
            }

            if let Some(mold) = snapshot.molds.get_mut(&task.mold_id) {
                if let Err(conflict) = mold.timeline.insert(&task.mold_id, window) {
                    tracing::warn!(task_id = %task.task_id, %conflict, "历史任务模具占用重叠");
                }
                if mold.single_instance && mold.bound_device_id.is_none() {
                    mold.bound_device_id = Some(task.device_id.clone());
                }
                mold.last_device_id = Some(task.device_id.clone());
            }

            snapshot.material_pairings.insert(
                task.material_id.clone(),
                (task.device_id.clone(), task.mold_id.clone()),
            );
        }

        debug!(
            devices_count = snapshot.devices.len(),
            molds_count = snapshot.molds.len(),
            tasks_count = tasks.len(),
            ignored_count = ignored,
            "资源占用快照构建完成"
        );

        snapshot
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 设备是否在可用集合中
    pub fn has_device(&self, device_id: &str) -> bool {
        self.devices.contains_key(device_id)
    }

    /// 模具是否在可用集合中
    pub fn has_mold(&self, mold_id: &str) -> bool {
        self.molds.contains_key(mold_id)
    }

    /// 设备最晚占用结束时间
    pub fn device_free_at(&self, device_id: &str) -> Option<NaiveDateTime> {
        self.devices.get(device_id).and_then(|t| t.latest_end())
    }

    /// 模具最晚占用结束时间
    pub fn mold_free_at(&self, mold_id: &str) -> Option<NaiveDateTime> {
        self.molds.get(mold_id).and_then(|m| m.timeline.latest_end())
    }

    /// 单套模具的绑定设备
    pub fn bound_device(&self, mold_id: &str) -> Option<&str> {
        self.molds
            .get(mold_id)
            .and_then(|m| m.bound_device_id.as_deref())
    }

    /// 模具最近一次使用的设备
    pub fn last_device_of_mold(&self, mold_id: &str) -> Option<&str> {
        self.molds
            .get(mold_id)
            .and_then(|m| m.last_device_id.as_deref())
    }

    /// 绑定到该设备的单套模具列表
    pub fn molds_bound_to(&self, device_id: &str) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .molds
            .iter()
            .filter(|(_, m)| m.single_instance && m.bound_device_id.as_deref() == Some(device_id))
            .map(|(id, _)| id.as_str())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// 物料最近一次使用的 (设备, 模具)
    pub fn material_pairing(&self, material_id: &str) -> Option<(&str, &str)> {
        self.material_pairings
            .get(material_id)
            .map(|(d, m)| (d.as_str(), m.as_str()))
    }

    pub fn device_timeline(&self, device_id: &str) -> Option<&ResourceTimeline> {
        self.devices.get(device_id)
    }

    pub fn mold_timeline(&self, mold_id: &str) -> Option<&ResourceTimeline> {
        self.molds.get(mold_id).map(|m| &m.timeline)
    }

    // ==========================================
    // 更新
    // ==========================================

    /// 记录一次新的分配（设备 + 模具同时占用）
    ///
    /// 先做全部冲突检查再写入，失败时快照保持不变
    pub fn reserve(
        &mut self,
        material_id: &str,
        device_id: &str,
        mold_id: &str,
        window: OccupiedWindow,
    ) -> Result<(), OccupancyConflict> {
        let mut device_timeline = self.devices.get(device_id).cloned().unwrap_or_default();
        device_timeline.insert(device_id, window.clone())?;

        let mut mold_timeline = self
            .molds
            .get(mold_id)
            .map(|m| m.timeline.clone())
            .unwrap_or_default();
        mold_timeline.insert(mold_id, window)?;

        self.devices.insert(device_id.to_string(), device_timeline);
        if let Some(mold) = self.molds.get_mut(mold_id) {
            mold.timeline = mold_timeline;
            if mold.single_instance && mold.bound_device_id.is_none() {
                mold.bound_device_id = Some(device_id.to_string());
            }
            mold.last_device_id = Some(device_id.to_string());
        }
        self.material_pairings.insert(
            material_id.to_string(),
            (device_id.to_string(), mold_id.to_string()),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ResourceStatus, ScheduleRule, TaskStatus};
    use chrono::NaiveDate;

    fn ts(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 5, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn device(id: &str) -> Device {
        Device {
            device_id: id.to_string(),
            device_code: id.to_string(),
            capacity_per_hour: 100.0,
            status: ResourceStatus::Normal,
        }
    }

    fn mold(id: &str, quantity: i32) -> Mold {
        Mold {
            mold_id: id.to_string(),
            mold_code: id.to_string(),
            quantity,
            status: ResourceStatus::Normal,
        }
    }

    fn task(id: &str, device_id: &str, mold_id: &str, start: NaiveDateTime, end: NaiveDateTime) -> ProductionTask {
        ProductionTask {
            task_id: id.to_string(),
            plan_id: format!("P_{}", id),
            material_id: format!("MAT_{}", id),
            device_id: device_id.to_string(),
            mold_id: mold_id.to_string(),
            task_quantity: 100,
            due_date: ts(30, 0),
            planned_start_time: start,
            planned_end_time: end,
            is_overdue: false,
            status: TaskStatus::Pending,
            schedule_rule: ScheduleRule::DeviceWeightPriority,
            schedule_reason: "test".to_string(),
            sync_group_id: None,
            created_at: ts(1, 0),
        }
    }

    #[test]
    fn test_build_records_windows_and_first_binding() {
        let tasks = vec![
            task("T1", "D1", "M_FIX", ts(1, 8), ts(1, 10)),
            task("T2", "D2", "M_FIX", ts(1, 10), ts(1, 12)),
        ];
        let snapshot = OccupancySnapshot::build(
            &[device("D1"), device("D2")],
            &[mold("M_FIX", 1)],
            &tasks,
        );

        assert_eq!(snapshot.bound_device("M_FIX"), Some("D1"));
        assert_eq!(snapshot.device_free_at("D1"), Some(ts(1, 10)));
        assert_eq!(snapshot.mold_free_at("M_FIX"), Some(ts(1, 12)));
        assert_eq!(snapshot.molds_bound_to("D1"), vec!["M_FIX"]);
        assert!(snapshot.molds_bound_to("D2").is_empty());
    }

    #[test]
    fn test_build_ignores_unknown_resources() {
        let tasks = vec![task("T1", "D_GONE", "M_GONE", ts(1, 8), ts(1, 10))];
        let snapshot = OccupancySnapshot::build(&[device("D1")], &[mold("M1", 2)], &tasks);

        assert!(!snapshot.has_device("D_GONE"));
        assert_eq!(snapshot.device_free_at("D1"), None);
        assert_eq!(snapshot.mold_free_at("M1"), None);
    }

    #[test]
    fn test_multi_instance_mold_is_never_bound() {
        let tasks = vec![task("T1", "D1", "M_MULTI", ts(1, 8), ts(1, 10))];
        let snapshot = OccupancySnapshot::build(&[device("D1")], &[mold("M_MULTI", 3)], &tasks);

        assert_eq!(snapshot.bound_device("M_MULTI"), None);
        assert_eq!(snapshot.last_device_of_mold("M_MULTI"), Some("D1"));
    }

    #[test]
    fn test_timeline_rejects_overlap_and_keeps_order() {
        let mut timeline = ResourceTimeline::default();
        assert!(timeline
            .insert("D1", OccupiedWindow::new(ts(2, 8), ts(2, 10), None))
            .unwrap());
        assert!(timeline
            .insert("D1", OccupiedWindow::new(ts(1, 8), ts(1, 10), None))
            .unwrap());
        // 首尾相接不算重叠
        assert!(timeline
            .insert("D1", OccupiedWindow::new(ts(2, 10), ts(2, 11), None))
            .unwrap());

        let err = timeline
            .insert("D1", OccupiedWindow::new(ts(2, 9), ts(2, 12), None))
            .unwrap_err();
        assert_eq!(err.existing_start, ts(2, 8));

        let starts: Vec<_> = timeline.windows().iter().map(|w| w.start).collect();
        assert_eq!(starts, vec![ts(1, 8), ts(2, 8), ts(2, 10)]);
    }

    #[test]
    fn test_same_sync_group_window_is_recorded_once() {
        let mut timeline = ResourceTimeline::default();
        let group = Some("G1".to_string());
        assert!(timeline
            .insert("M1", OccupiedWindow::new(ts(1, 8), ts(1, 10), group.clone()))
            .unwrap());
        assert!(!timeline
            .insert("M1", OccupiedWindow::new(ts(1, 8), ts(1, 10), group))
            .unwrap());
        assert_eq!(timeline.windows().len(), 1);
    }

    #[test]
    fn test_reserve_is_all_or_nothing() {
        let tasks = vec![task("T1", "D2", "M1", ts(1, 8), ts(1, 10))];
        let mut snapshot =
            OccupancySnapshot::build(&[device("D1"), device("D2")], &[mold("M1", 1)], &tasks);

        // 设备 D1 空闲，但模具 M1 冲突 → 整体失败，D1 不被占用
        let result = snapshot.reserve(
            "MAT_X",
            "D1",
            "M1",
            OccupiedWindow::new(ts(1, 9), ts(1, 11), None),
        );
        assert!(result.is_err());
        assert_eq!(snapshot.device_free_at("D1"), None);

        snapshot
            .reserve("MAT_X", "D2", "M1", OccupiedWindow::new(ts(1, 10), ts(1, 11), None))
            .unwrap();
        assert_eq!(snapshot.device_free_at("D2"), Some(ts(1, 11)));
        assert_eq!(snapshot.material_pairing("MAT_X"), Some(("D2", "M1")));
    }
}
