// ==========================================
// 注塑排产系统 - 排产原因标注
// ==========================================
// 职责: 依据分配器记录的事实，归类本次分配由哪条规则决定
// 优先级: 共模同步 → 灵活兜底 → 同物料一致 → 同模具一致
//         → 单套模具绑定 → 模具设备互斥 → 权重优先 → 交期优先
// 红线: 只做事后说明，不影响分配结果
// ==========================================

use crate::domain::ScheduleRule;
use crate::engine::allocator::{AllocationDecision, PairPreference};

pub struct ReasonAnnotator {
    // 无状态引擎
}

impl ReasonAnnotator {
    pub fn new() -> Self {
        Self {}
    }

    /// 归类规则并生成原因文本
    ///
    /// # 参数
    /// - decision: 分配决策
    /// - sync_members: 所属共模同步组的成员数（非同步分配为 None）
    pub fn annotate(&self, decision: &AllocationDecision, sync_members: Option<usize>) -> (ScheduleRule, String) {
        let rule = self.classify(decision, sync_members);
        let detail = match rule {
            ScheduleRule::MultiMaterialSync => format!(
                "{}个物料共用模具{}在设备{}同窗生产",
                sync_members.unwrap_or(0),
                decision.mold_id,
                decision.device_id
            ),
            ScheduleRule::FlexibleFallback => format!(
                "首选组合将逾期，改用设备{}/模具{}按期完成",
                decision.device_id, decision.mold_id
            ),
            ScheduleRule::SameMaterialConsistency => format!(
                "沿用该物料上次的设备{}/模具{}",
                decision.device_id, decision.mold_id
            ),
            ScheduleRule::SameMoldConsistency => format!(
                "模具{}沿用上次所在设备{}",
                decision.mold_id, decision.device_id
            ),
            ScheduleRule::MoldDeviceBinding => format!(
                "单套模具{}已绑定设备{}",
                decision.mold_id, decision.device_id
            ),
            ScheduleRule::MoldDeviceExclusivity => format!(
                "跳过{}个互斥/绑定冲突候选后选定设备{}/模具{}",
                decision.exclusivity_skips, decision.device_id, decision.mold_id
            ),
            ScheduleRule::DeviceWeightPriority => format!(
                "设备{}权重最高({})",
                decision.device_id, decision.device_weight
            ),
            ScheduleRule::MoldWeightPriority => format!(
                "模具{}权重最高({})",
                decision.mold_id, decision.mold_weight
            ),
            ScheduleRule::DueDatePriority => format!(
                "按交期顺序排入唯一候选设备{}/模具{}",
                decision.device_id, decision.mold_id
            ),
        };

        let mut reason = format!("{}: {}", rule.title_cn(), detail);
        if decision.slot.is_overdue {
            reason.push_str("（预计逾期）");
        }
        (rule, reason)
    }

    fn classify(&self, decision: &AllocationDecision, sync_members: Option<usize>) -> ScheduleRule {
        if sync_members.is_some() {
            return ScheduleRule::MultiMaterialSync;
        }
        if decision.fallback_used {
            return ScheduleRule::FlexibleFallback;
        }
        match decision.preference {
            PairPreference::SameMaterial => return ScheduleRule::SameMaterialConsistency,
            PairPreference::SameMold => return ScheduleRule::SameMoldConsistency,
            PairPreference::WeightFirst => {}
        }
        if decision.binding_applied {
            return ScheduleRule::MoldDeviceBinding;
        }
        if decision.exclusivity_skips > 0 {
            return ScheduleRule::MoldDeviceExclusivity;
        }
        if decision.device_candidates_count > 1 {
            return ScheduleRule::DeviceWeightPriority;
        }
        if decision.mold_candidates_count > 1 {
            return ScheduleRule::MoldWeightPriority;
        }
        ScheduleRule::DueDatePriority
    }
}

impl Default for ReasonAnnotator {
    fn default() -> Self {
        Self::new()
    }
}
