// ==========================================
// 注塑排产系统 - 候选资源解析
// ==========================================
// 职责: 按物料加载加权设备候选与模具候选
// 排序: 权重降序，同权重按资源ID升序（结果确定）
// 缓存: 单次运行内按物料缓存
// ==========================================

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{DeviceCandidate, MoldCandidate};
use crate::engine::repositories::ResourceStore;
use crate::repository::RepositoryResult;

/// 物料的候选资源集合
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    pub devices: Vec<DeviceCandidate>,
    pub molds: Vec<MoldCandidate>,
}

impl CandidateSet {
    pub fn device_weight(&self, device_id: &str) -> Option<i32> {
        self.devices
            .iter()
            .find(|c| c.device_id() == device_id)
            .map(|c| c.weight)
    }

    pub fn mold(&self, mold_id: &str) -> Option<&MoldCandidate> {
        self.molds.iter().find(|c| c.mold_id() == mold_id)
    }

    pub fn has_mold(&self, mold_id: &str) -> bool {
        self.mold(mold_id).is_some()
    }
}

// ==========================================
// CandidateResolver - 候选资源解析器
// ==========================================
pub struct CandidateResolver {
    store: Arc<dyn ResourceStore>,
    cache: HashMap<String, Option<Arc<CandidateSet>>>,
}

impl CandidateResolver {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self {
            store,
            cache: HashMap::new(),
        }
    }

    /// 解析物料候选
    ///
    /// # 返回
    /// - Some: 设备与模具候选均非空
    /// - None: 任一为空（无可用资源，计划跳过）
    pub fn resolve(&mut self, material_id: &str) -> RepositoryResult<Option<Arc<CandidateSet>>> {
        if let Some(cached) = self.cache.get(material_id) {
            return Ok(cached.clone());
        }

        let mut devices = self.store.find_device_candidates(material_id)?;
        let mut molds = self.store.find_mold_candidates(material_id)?;

        devices.sort_by(|a, b| {
            b.weight
                .cmp(&a.weight)
                .then_with(|| a.device_id().cmp(b.device_id()))
        });
        molds.sort_by(|a, b| {
            b.weight
                .cmp(&a.weight)
                .then_with(|| a.mold_id().cmp(b.mold_id()))
        });

        let resolved = if devices.is_empty() || molds.is_empty() {
            tracing::debug!(
                material_id = material_id,
                devices_count = devices.len(),
                molds_count = molds.len(),
                "物料无完整候选资源"
            );
            None
        } else {
            Some(Arc::new(CandidateSet { devices, molds }))
        };

        self.cache.insert(material_id.to_string(), resolved.clone());
        Ok(resolved)
    }
}
