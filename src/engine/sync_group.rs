// ==========================================
// 注塑排产系统 - 共模多物料同步
// ==========================================
// 职责: 交期相近、可共用同一模具的不同物料计划合并为同步组，
//       在同一设备/模具/时间窗内一次生产
// 分组: 按交期顺序贪心；锚点计划收集交期在窗口内、物料不同、
//       且公共模具集合保持非空的后续计划
// 分配: 设备须为全部成员的候选，按成员权重之和排序（同分按ID）；
//       公共模具按权重之和排序（同分按ID）；首个兼容组合胜出
// 时长: 取成员在该设备上的最长生产时长
// 降级: 无公共模具或无兼容组合 → 成员各自独立分配
// ==========================================

use chrono::{Duration, NaiveDateTime};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::ProductionPlan;
use crate::engine::allocator::{AllocationDecision, Allocator, PairPreference};
use crate::engine::candidate::CandidateSet;
use crate::engine::occupancy::OccupancySnapshot;

/// 同步组（成员为计划列表下标，按交期顺序）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncGroup {
    pub members: Vec<usize>,
    pub common_molds: Vec<String>,
}

impl SyncGroup {
    pub fn anchor(&self) -> usize {
        self.members[0]
    }
}

/// 同步组分配结果
#[derive(Debug, Clone)]
pub struct GroupAllocation {
    pub sync_group_id: String,
    pub device_id: String,
    pub mold_id: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub decisions: Vec<(usize, AllocationDecision)>,
}

// ==========================================
// SyncGroupPlanner - 共模同步规划器
// ==========================================
pub struct SyncGroupPlanner {
    window: Duration,
}

impl SyncGroupPlanner {
    /// # 参数
    /// - window_days: 成员交期与锚点交期的最大间隔（天）
    pub fn new(window_days: i64) -> Self {
        Self {
            window: Duration::days(window_days.max(0)),
        }
    }

    /// 贪心分组
    ///
    /// # 参数
    /// - plans: 待排产计划（交期升序）
    /// - candidates: 各计划对应的候选集合（None 表示无候选，不参与分组）
    pub fn form_groups(
        &self,
        plans: &[ProductionPlan],
        candidates: &[Option<Arc<CandidateSet>>],
    ) -> Vec<SyncGroup> {
        let mut grouped = vec![false; plans.len()];
        let mut groups = Vec::new();

        for anchor_idx in 0..plans.len() {
            if grouped[anchor_idx] || !plans[anchor_idx].has_valid_quantity() {
                continue;
            }
            let Some(anchor_set) = candidates[anchor_idx].as_ref() else {
                continue;
            };

            let anchor = &plans[anchor_idx];
            let mut members = vec![anchor_idx];
            let mut materials = vec![anchor.material_id.as_str()];
            let mut common: Vec<String> = anchor_set
                .molds
                .iter()
                .map(|m| m.mold_id().to_string())
                .collect();

            for idx in (anchor_idx + 1)..plans.len() {
                let plan = &plans[idx];
                if plan.due_date - anchor.due_date > self.window {
                    break;
                }
                if grouped[idx] || !plan.has_valid_quantity() || materials.contains(&plan.material_id.as_str()) {
                    continue;
                }
                let Some(set) = candidates[idx].as_ref() else {
                    continue;
                };

                let narrowed: Vec<String> = common.iter().filter(|m| set.has_mold(m)).cloned().collect();
                if narrowed.is_empty() {
                    continue;
                }
                common = narrowed;
                members.push(idx);
                materials.push(plan.material_id.as_str());
            }

            if members.len() > 1 {
                for &m in &members {
                    grouped[m] = true;
                }
                debug!(
                    anchor_plan_id = %anchor.plan_id,
                    members_count = members.len(),
                    common_molds = ?common,
                    "形成共模同步组"
                );
                groups.push(SyncGroup {
                    members,
                    common_molds: common,
                });
            }
        }

        groups
    }

    /// 为同步组选择设备/模具与共享时间窗
    ///
    /// 返回 None 表示无兼容组合，成员应降级为独立分配
    pub fn allocate_group(
        &self,
        group: &SyncGroup,
        plans: &[ProductionPlan],
        candidates: &[Option<Arc<CandidateSet>>],
        snapshot: &OccupancySnapshot,
        allocator: &Allocator,
        now: NaiveDateTime,
    ) -> Option<GroupAllocation> {
        let member_sets: Vec<(&ProductionPlan, &CandidateSet)> = group
            .members
            .iter()
            .filter_map(|&idx| candidates[idx].as_deref().map(|set| (&plans[idx], set)))
            .collect();
        if member_sets.len() != group.members.len() {
            return None;
        }

        // 公共设备: 全部成员的候选，产能合法，且不被任何成员的不相关单套模具占有
        let mut device_scores: BTreeMap<&str, (i64, f64)> = BTreeMap::new();
        let (_, first_set) = member_sets[0];
        for device in &first_set.devices {
            if !device.device.has_valid_capacity() {
                continue;
            }
            let mut score = 0i64;
            let mut shared = true;
            for (_, set) in &member_sets {
                match set.device_weight(device.device_id()) {
                    Some(w) if !allocator.device_reserved_by_foreign_mold(device.device_id(), set, snapshot) => {
                        score += i64::from(w);
                    }
                    _ => {
                        shared = false;
                        break;
                    }
                }
            }
            if shared {
                device_scores.insert(device.device_id(), (score, device.device.capacity_per_hour));
            }
        }

        let mut devices: Vec<(&str, i64, f64)> = device_scores
            .into_iter()
            .map(|(id, (score, cap))| (id, score, cap))
            .collect();
        devices.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let mut molds: Vec<(&str, i64)> = group
            .common_molds
            .iter()
            .map(|mold_id| {
                let score = member_sets
                    .iter()
                    .filter_map(|(_, set)| set.mold(mold_id).map(|m| i64::from(m.weight)))
                    .sum::<i64>();
                (mold_id.as_str(), score)
            })
            .collect();
        molds.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let (device_id, mold_id, capacity) = devices.iter().find_map(|&(device_id, _, cap)| {
            molds
                .iter()
                .find(|(mold_id, _)| allocator.mold_fits_device(mold_id, device_id, snapshot))
                .map(|&(mold_id, _)| (device_id, mold_id, cap))
        })?;

        let calc = allocator.time_slot();
        let mut longest = 0i64;
        for (plan, _) in &member_sets {
            match calc.duration_secs(plan.quantity, capacity) {
                Ok(secs) => longest = longest.max(secs),
                Err(e) => {
                    debug!(plan_id = %plan.plan_id, error = %e, "同步组成员时长计算失败，降级");
                    return None;
                }
            }
        }

        let start = calc.earliest_start(
            now,
            snapshot.device_free_at(device_id),
            snapshot.mold_free_at(mold_id),
        );
        let sync_group_id = uuid::Uuid::new_v4().to_string();

        let mut decisions = Vec::with_capacity(member_sets.len());
        for (&idx, (plan, set)) in group.members.iter().zip(member_sets.iter()) {
            let slot = calc.slot_from(start, longest, plan.due_date);
            decisions.push((
                idx,
                AllocationDecision {
                    device_id: device_id.to_string(),
                    mold_id: mold_id.to_string(),
                    device_weight: set.device_weight(device_id).unwrap_or(0),
                    mold_weight: set.mold(mold_id).map(|m| m.weight).unwrap_or(0),
                    capacity_per_hour: capacity,
                    slot,
                    preference: PairPreference::WeightFirst,
                    fallback_used: false,
                    binding_applied: snapshot.bound_device(mold_id) == Some(device_id),
                    exclusivity_skips: 0,
                    capacity_skips: 0,
                    device_candidates_count: set.devices.len(),
                    mold_candidates_count: set.molds.len(),
                },
            ));
        }

        let end = start + Duration::seconds(longest);
        info!(
            sync_group_id = %sync_group_id,
            device_id = device_id,
            mold_id = mold_id,
            members_count = decisions.len(),
            start = %start,
            end = %end,
            "共模同步组分配完成"
        );

        Some(GroupAllocation {
            sync_group_id,
            device_id: device_id.to_string(),
            mold_id: mold_id.to_string(),
            start,
            end,
            decisions,
        })
    }
}

/// 计划下标 → 所属同步组下标
pub fn index_members(groups: &[SyncGroup]) -> HashMap<usize, usize> {
    groups
        .iter()
        .enumerate()
        .flat_map(|(g, group)| group.members.iter().map(move |&m| (m, g)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Device, DeviceCandidate, Mold, MoldCandidate, PlanStatus, ResourceStatus,
    };
    use chrono::NaiveDate;

    fn ts(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 5, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn plan(id: &str, material_id: &str, quantity: i64, due: NaiveDateTime) -> ProductionPlan {
        ProductionPlan {
            plan_id: id.to_string(),
            plan_no: id.to_string(),
            material_id: material_id.to_string(),
            quantity,
            due_date: due,
            status: PlanStatus::Unscheduled,
            created_at: ts(1, 0),
        }
    }

    fn set(devices: &[(&str, f64, i32)], molds: &[(&str, i32, i32)]) -> Option<Arc<CandidateSet>> {
        Some(Arc::new(CandidateSet {
            devices: devices
                .iter()
                .map(|&(id, cap, weight)| DeviceCandidate {
                    device: Device {
                        device_id: id.to_string(),
                        device_code: id.to_string(),
                        capacity_per_hour: cap,
                        status: ResourceStatus::Normal,
                    },
                    weight,
                })
                .collect(),
            molds: molds
                .iter()
                .map(|&(id, quantity, weight)| MoldCandidate {
                    mold: Mold {
                        mold_id: id.to_string(),
                        mold_code: id.to_string(),
                        quantity,
                        status: ResourceStatus::Normal,
                    },
                    weight,
                    cycle_time_secs: None,
                    output_per_cycle: None,
                })
                .collect(),
        }))
    }

    fn snapshot(sets: &[Option<Arc<CandidateSet>>]) -> OccupancySnapshot {
        let mut devices: Vec<Device> = Vec::new();
        let mut molds: Vec<Mold> = Vec::new();
        for s in sets.iter().flatten() {
            for d in &s.devices {
                if !devices.iter().any(|x| x.device_id == d.device.device_id) {
                    devices.push(d.device.clone());
                }
            }
            for m in &s.molds {
                if !molds.iter().any(|x| x.mold_id == m.mold.mold_id) {
                    molds.push(m.mold.clone());
                }
            }
        }
        OccupancySnapshot::build(&devices, &molds, &[])
    }

    #[test]
    fn test_two_materials_sharing_mold_form_group() {
        let plans = vec![
            plan("P1", "MAT_A", 100, ts(3, 0)),
            plan("P2", "MAT_B", 50, ts(4, 0)),
        ];
        let sets = vec![
            set(&[("D1", 50.0, 5)], &[("M_SHARED", 2, 1)]),
            set(&[("D1", 50.0, 5)], &[("M_SHARED", 2, 1)]),
        ];
        let planner = SyncGroupPlanner::new(3);
        let groups = planner.form_groups(&plans, &sets);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members, vec![0, 1]);
        assert_eq!(groups[0].common_molds, vec!["M_SHARED".to_string()]);

        let allocation = planner
            .allocate_group(&groups[0], &plans, &sets, &snapshot(&sets), &Allocator::new(), ts(1, 8))
            .unwrap();
        assert_eq!(allocation.device_id, "D1");
        assert_eq!(allocation.mold_id, "M_SHARED");
        // 最长成员时长: 100 / 50 = 2 小时
        assert_eq!(allocation.start, ts(1, 8));
        assert_eq!(allocation.end, ts(1, 10));
        assert!(allocation
            .decisions
            .iter()
            .all(|(_, d)| d.slot.start == allocation.start && d.slot.end == allocation.end));
    }

    #[test]
    fn test_outside_window_or_same_material_not_grouped() {
        let plans = vec![
            plan("P1", "MAT_A", 100, ts(1, 0)),
            plan("P2", "MAT_A", 100, ts(2, 0)),
            plan("P3", "MAT_B", 100, ts(9, 0)),
        ];
        let shared = set(&[("D1", 50.0, 5)], &[("M1", 2, 1)]);
        let sets = vec![shared.clone(), shared.clone(), shared];
        let groups = SyncGroupPlanner::new(3).form_groups(&plans, &sets);
        assert!(groups.is_empty());
    }

    #[test]
    fn test_no_common_mold_not_grouped() {
        let plans = vec![
            plan("P1", "MAT_A", 100, ts(1, 0)),
            plan("P2", "MAT_B", 100, ts(2, 0)),
        ];
        let sets = vec![
            set(&[("D1", 50.0, 5)], &[("M1", 2, 1)]),
            set(&[("D1", 50.0, 5)], &[("M2", 2, 1)]),
        ];
        assert!(SyncGroupPlanner::new(3).form_groups(&plans, &sets).is_empty());
    }

    #[test]
    fn test_group_device_scored_by_summed_weight() {
        let plans = vec![
            plan("P1", "MAT_A", 100, ts(1, 0)),
            plan("P2", "MAT_B", 100, ts(2, 0)),
        ];
        // A: D1=9, D2=1 ; B: D1=1, D2=10 → D1=10, D2=11 → D2
        let sets = vec![
            set(&[("D1", 50.0, 9), ("D2", 50.0, 1)], &[("M1", 2, 1)]),
            set(&[("D2", 50.0, 10), ("D1", 50.0, 1)], &[("M1", 2, 1)]),
        ];
        let planner = SyncGroupPlanner::new(3);
        let groups = planner.form_groups(&plans, &sets);
        let allocation = planner
            .allocate_group(&groups[0], &plans, &sets, &snapshot(&sets), &Allocator::new(), ts(1, 8))
            .unwrap();
        assert_eq!(allocation.device_id, "D2");
    }

    #[test]
    fn test_no_common_device_degrades() {
        let plans = vec![
            plan("P1", "MAT_A", 100, ts(1, 0)),
            plan("P2", "MAT_B", 100, ts(2, 0)),
        ];
        let sets = vec![
            set(&[("D1", 50.0, 9)], &[("M1", 2, 1)]),
            set(&[("D2", 50.0, 9)], &[("M1", 2, 1)]),
        ];
        let planner = SyncGroupPlanner::new(3);
        let groups = planner.form_groups(&plans, &sets);
        assert_eq!(groups.len(), 1);
        assert!(planner
            .allocate_group(&groups[0], &plans, &sets, &snapshot(&sets), &Allocator::new(), ts(1, 8))
            .is_none());
    }

    #[test]
    fn test_index_members() {
        let groups = vec![SyncGroup {
            members: vec![0, 2],
            common_molds: vec!["M1".to_string()],
        }];
        let index = index_members(&groups);
        assert_eq!(index.get(&2), Some(&0));
        assert_eq!(index.get(&1), None);
    }
}
