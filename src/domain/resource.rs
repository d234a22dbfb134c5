// ==========================================
// 注塑排产系统 - 设备/模具资源领域模型
// ==========================================
// 职责: 设备、模具及物料-资源加权关联
// 红线: 关联表对引擎只读
// ==========================================

use serde::{Deserialize, Serialize};

use crate::domain::types::ResourceStatus;

// ==========================================
// Device - 设备
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub device_id: String,
    pub device_code: String,
    pub capacity_per_hour: f64, // 每小时产能 (件/小时)
    pub status: ResourceStatus,
}

impl Device {
    /// 产能是否可用于时长计算 (0/负数/非有限值均视为不可用)
    pub fn has_valid_capacity(&self) -> bool {
        self.capacity_per_hour.is_finite() && self.capacity_per_hour > 0.0
    }
}

// ==========================================
// Mold - 模具
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mold {
    pub mold_id: String,
    pub mold_code: String,
    pub quantity: i32, // 模具套数
    pub status: ResourceStatus,
}

impl Mold {
    /// 单套模具: 终身绑定首次分配的设备
    pub fn is_single_instance(&self) -> bool {
        self.quantity == 1
    }
}

// ==========================================
// MaterialDeviceRelation / MaterialMoldRelation - 物料资源关联
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialDeviceRelation {
    pub material_id: String,
    pub device_id: String,
    pub weight: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialMoldRelation {
    pub material_id: String,
    pub mold_id: String,
    pub weight: i32,
    pub cycle_time_secs: Option<f64>, // 成型周期 (秒)
    pub output_per_cycle: Option<i32>, // 每模出数
}

// ==========================================
// 候选资源 (关联 + 资源主数据)
// ==========================================

/// 设备候选 (按权重降序)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCandidate {
    pub device: Device,
    pub weight: i32,
}

/// 模具候选 (按权重降序)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoldCandidate {
    pub mold: Mold,
    pub weight: i32,
    pub cycle_time_secs: Option<f64>,
    pub output_per_cycle: Option<i32>,
}

impl DeviceCandidate {
    pub fn device_id(&self) -> &str {
        &self.device.device_id
    }
}

impl MoldCandidate {
    pub fn mold_id(&self) -> &str {
        &self.mold.mold_id
    }
}
