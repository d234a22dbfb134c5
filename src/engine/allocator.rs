// ==========================================
// 注塑排产系统 - 设备/模具分配引擎
// ==========================================
// 职责: 为单个计划选择一台设备与一套模具，并计算时间窗
// 输入: 计划 + 物料候选 + 资源占用快照
// 输出: AllocationOutcome（分配决策 或 跳过原因）
// ==========================================
// 规则:
// - 设备按权重遍历；产能非法的设备不可用
// - 设备已绑定某单套模具、而该物料不关联此模具 → 跳过设备（绑定互斥）
// - 模具按权重遍历；单套模具已绑定其他设备 → 跳过模具
// - 成对遍历: 设备上无兼容模具则尝试下一台设备
// - 同物料一致性: 沿用该物料上次的 (设备, 模具)
// - 同模具一致性: 沿用兼容模具上次所在的设备
// - 灵活兜底: 首选组合逾期时改选最早完工且不逾期的组合
//   (可放开设备侧绑定互斥，模具侧绑定永不放开)
// 红线: 分配器只读快照，不修改快照
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, instrument, warn};

use crate::domain::{DeviceCandidate, MoldCandidate, ProductionPlan};
use crate::engine::candidate::CandidateSet;
use crate::engine::occupancy::OccupancySnapshot;
use crate::engine::time_slot::{TimeSlot, TimeSlotCalculator, TimeSlotError};

// ==========================================
// SkipCode - 计划跳过原因代码
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipCode {
    NoResource,        // 无设备候选或无模具候选
    InvalidQuantity,   // 计划数量 <= 0
    NoCompatiblePair,  // 候选均被互斥/绑定/产能排除
    InvalidTimeSlot,   // 时间窗无法计算
}

impl SkipCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipCode::NoResource => "NO_RESOURCE",
            SkipCode::InvalidQuantity => "INVALID_QUANTITY",
            SkipCode::NoCompatiblePair => "NO_COMPATIBLE_PAIR",
            SkipCode::InvalidTimeSlot => "INVALID_TIME_SLOT",
        }
    }
}

impl fmt::Display for SkipCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// PairPreference - 一致性偏好
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PairPreference {
    WeightFirst,
    SameMaterial,
    SameMold,
}

// ==========================================
// AllocationDecision - 分配决策（供原因标注使用的事实）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationDecision {
    pub device_id: String,
    pub mold_id: String,
    pub device_weight: i32,
    pub mold_weight: i32,
    pub capacity_per_hour: f64,
    pub slot: TimeSlot,

    pub preference: PairPreference,
    pub fallback_used: bool,
    pub binding_applied: bool,      // 所选单套模具已绑定所选设备
    pub exclusivity_skips: usize,   // 因互斥/绑定被跳过的候选数
    pub capacity_skips: usize,      // 因产能非法被跳过的设备数
    pub device_candidates_count: usize,
    pub mold_candidates_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AllocationOutcome {
    Allocated(AllocationDecision),
    Skipped { code: SkipCode, message: String },
}

/// 候选组合
#[derive(Clone, Copy)]
struct Pair<'a> {
    device: &'a DeviceCandidate,
    mold: &'a MoldCandidate,
}

impl<'a> Pair<'a> {
    fn same_as(&self, device_id: &str, mold_id: &str) -> bool {
        self.device.device_id() == device_id && self.mold.mold_id() == mold_id
    }
}

/// 严格遍历结果
struct StrictWalk<'a> {
    first: Option<Pair<'a>>,
    compatible: Vec<Pair<'a>>,
    exclusivity_skips: usize,
    capacity_skips: usize,
}

// ==========================================
// Allocator - 分配引擎
// ==========================================
pub struct Allocator {
    time_slot: TimeSlotCalculator,
}

impl Allocator {
    pub fn new() -> Self {
        Self {
            time_slot: TimeSlotCalculator::new(),
        }
    }

    pub fn time_slot(&self) -> &TimeSlotCalculator {
        &self.time_slot
    }

    // ==========================================
    // 兼容性判定（供同步组复用）
    // ==========================================

    /// 设备被不相关的单套模具占有（绑定互斥）
    pub fn device_reserved_by_foreign_mold(
        &self,
        device_id: &str,
        candidates: &CandidateSet,
        snapshot: &OccupancySnapshot,
    ) -> bool {
        snapshot
            .molds_bound_to(device_id)
            .into_iter()
            .any(|mold_id| !candidates.has_mold(mold_id))
    }

    /// 模具可以在该设备上运行（单套模具只能在绑定设备上运行）
    pub fn mold_fits_device(&self, mold_id: &str, device_id: &str, snapshot: &OccupancySnapshot) -> bool {
        snapshot
            .bound_device(mold_id)
            .map_or(true, |bound| bound == device_id)
    }

    /// 严格兼容组合（不放开任何约束）
    fn strict_walk<'a>(&self, candidates: &'a CandidateSet, snapshot: &OccupancySnapshot) -> StrictWalk<'a> {
        let mut walk = StrictWalk {
            first: None,
            compatible: Vec::new(),
            exclusivity_skips: 0,
            capacity_skips: 0,
        };

        for device in &candidates.devices {
            if !device.device.has_valid_capacity() {
                if walk.first.is_none() {
                    walk.capacity_skips += 1;
                }
                continue;
            }
            if self.device_reserved_by_foreign_mold(device.device_id(), candidates, snapshot) {
                if walk.first.is_none() {
                    walk.exclusivity_skips += 1;
                }
                continue;
            }
            for mold in &candidates.molds {
                if !self.mold_fits_device(mold.mold_id(), device.device_id(), snapshot) {
                    if walk.first.is_none() {
                        walk.exclusivity_skips += 1;
                    }
                    continue;
                }
                let pair = Pair { device, mold };
                if walk.first.is_none() {
                    walk.first = Some(pair);
                }
                walk.compatible.push(pair);
            }
        }

        walk
    }

    /// 放开设备侧绑定互斥后的兼容组合（灵活兜底）
    fn relaxed_pairs<'a>(&self, candidates: &'a CandidateSet, snapshot: &OccupancySnapshot) -> Vec<Pair<'a>> {
        let mut pairs = Vec::new();
        for device in candidates.devices.iter().filter(|d| d.device.has_valid_capacity()) {
            for mold in &candidates.molds {
                if self.mold_fits_device(mold.mold_id(), device.device_id(), snapshot) {
                    pairs.push(Pair { device, mold });
                }
            }
        }
        pairs
    }

    fn slot_for(
        &self,
        pair: Pair<'_>,
        plan: &ProductionPlan,
        snapshot: &OccupancySnapshot,
        now: NaiveDateTime,
    ) -> Result<TimeSlot, TimeSlotError> {
        self.time_slot.calculate(
            now,
            snapshot.device_free_at(pair.device.device_id()),
            snapshot.mold_free_at(pair.mold.mold_id()),
            plan.quantity,
            pair.device.device.capacity_per_hour,
            plan.due_date,
        )
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 为单个计划分配设备与模具
    ///
    /// # 参数
    /// - plan: 待排产计划
    /// - candidates: 物料候选（权重降序）
    /// - snapshot: 当前资源占用快照（只读）
    /// - now: 本次运行的当前时间
    /// - flexible_fallback: 是否启用灵活兜底
    #[instrument(skip(self, plan, candidates, snapshot), fields(
        plan_id = %plan.plan_id,
        material_id = %plan.material_id
    ))]
    pub fn allocate(
        &self,
        plan: &ProductionPlan,
        candidates: &CandidateSet,
        snapshot: &OccupancySnapshot,
        now: NaiveDateTime,
        flexible_fallback: bool,
    ) -> AllocationOutcome {
        if !plan.has_valid_quantity() {
            return AllocationOutcome::Skipped {
                code: SkipCode::InvalidQuantity,
                message: format!("计划数量非法: {}", plan.quantity),
            };
        }

        let walk = self.strict_walk(candidates, snapshot);
        let Some(weight_first) = walk.first else {
            warn!(
                device_candidates = candidates.devices.len(),
                mold_candidates = candidates.molds.len(),
                capacity_skips = walk.capacity_skips,
                "无兼容的设备/模具组合，计划跳过"
            );
            return AllocationOutcome::Skipped {
                code: SkipCode::NoCompatiblePair,
                message: format!(
                    "设备候选{}个、模具候选{}个均因互斥/绑定/产能不可用",
                    candidates.devices.len(),
                    candidates.molds.len()
                ),
            };
        };

        // 一致性偏好
        let (mut chosen, preference) = self.preferred_pair(plan, &walk, snapshot, weight_first);

        let mut slot = match self.slot_for(chosen, plan, snapshot, now) {
            Ok(slot) => slot,
            Err(e) => {
                warn!(error = %e, "时间窗计算失败，计划跳过");
                return AllocationOutcome::Skipped {
                    code: SkipCode::InvalidTimeSlot,
                    message: e.to_string(),
                };
            }
        };

        // 灵活兜底
        let mut fallback_used = false;
        if slot.is_overdue && flexible_fallback {
            if let Some((pair, alt_slot)) = self.earliest_on_time_pair(plan, candidates, snapshot, now) {
                if !pair.same_as(chosen.device.device_id(), chosen.mold.mold_id()) {
                    debug!(
                        from_device = %chosen.device.device_id(),
                        to_device = %pair.device.device_id(),
                        to_mold = %pair.mold.mold_id(),
                        "首选组合逾期，启用灵活兜底"
                    );
                    chosen = pair;
                    slot = alt_slot;
                    fallback_used = true;
                }
            }
        }

        let binding_applied = snapshot.bound_device(chosen.mold.mold_id()) == Some(chosen.device.device_id());

        AllocationOutcome::Allocated(AllocationDecision {
            device_id: chosen.device.device_id().to_string(),
            mold_id: chosen.mold.mold_id().to_string(),
            device_weight: chosen.device.weight,
            mold_weight: chosen.mold.weight,
            capacity_per_hour: chosen.device.device.capacity_per_hour,
            slot,
            preference: if fallback_used {
                PairPreference::WeightFirst
            } else {
                preference
            },
            fallback_used,
            binding_applied,
            exclusivity_skips: walk.exclusivity_skips,
            capacity_skips: walk.capacity_skips,
            device_candidates_count: candidates.devices.len(),
            mold_candidates_count: candidates.molds.len(),
        })
    }

    /// 同物料一致性 → 同模具一致性 → 权重优先
    ///
    /// 偏好命中的组合与权重首选相同时按权重优先标注（偏好未改变结果）
    fn preferred_pair<'a>(
        &self,
        plan: &ProductionPlan,
        walk: &StrictWalk<'a>,
        snapshot: &OccupancySnapshot,
        weight_first: Pair<'a>,
    ) -> (Pair<'a>, PairPreference) {
        let (pair, preference) = self.consistency_pair(plan, walk, snapshot, weight_first);
        if pair.same_as(weight_first.device.device_id(), weight_first.mold.mold_id()) {
            return (pair, PairPreference::WeightFirst);
        }
        (pair, preference)
    }

    fn consistency_pair<'a>(
        &self,
        plan: &ProductionPlan,
        walk: &StrictWalk<'a>,
        snapshot: &OccupancySnapshot,
        weight_first: Pair<'a>,
    ) -> (Pair<'a>, PairPreference) {
        if let Some((device_id, mold_id)) = snapshot.material_pairing(&plan.material_id) {
            if let Some(pair) = walk.compatible.iter().find(|p| p.same_as(device_id, mold_id)) {
                return (*pair, PairPreference::SameMaterial);
            }
        }

        // 兼容列表按设备权重、模具权重排列；按模具权重找第一个有历史设备的组合
        let mut by_mold: Vec<&Pair<'a>> = walk.compatible.iter().collect();
        by_mold.sort_by(|a, b| {
            b.mold
                .weight
                .cmp(&a.mold.weight)
                .then_with(|| a.mold.mold_id().cmp(b.mold.mold_id()))
        });
        for pair in by_mold {
            if snapshot.last_device_of_mold(pair.mold.mold_id()) == Some(pair.device.device_id()) {
                return (*pair, PairPreference::SameMold);
            }
        }

        (weight_first, PairPreference::WeightFirst)
    }

    /// 最早完工且不逾期的组合
    fn earliest_on_time_pair<'a>(
        &self,
        plan: &ProductionPlan,
        candidates: &'a CandidateSet,
        snapshot: &OccupancySnapshot,
        now: NaiveDateTime,
    ) -> Option<(Pair<'a>, TimeSlot)> {
        let mut best: Option<(Pair<'a>, TimeSlot)> = None;
        for pair in self.relaxed_pairs(candidates, snapshot) {
            let Ok(slot) = self.slot_for(pair, plan, snapshot, now) else {
                continue;
            };
            if slot.is_overdue {
                continue;
            }
            let earlier = best.as_ref().map_or(true, |(_, best_slot)| slot.end < best_slot.end);
            if earlier {
                best = Some((pair, slot));
            }
        }
        best
    }
}

impl Default for Allocator {
    fn default() -> Self {
        Self::new()
    }
}
