// ==========================================
// 注塑排产系统 - 设备/模具资源数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑；关联表对排产引擎只读
// ==========================================
// 职责: device / mold / material_device_relation / material_mold_relation
// ==========================================

use crate::domain::resource::{
    Device, DeviceCandidate, MaterialDeviceRelation, MaterialMoldRelation, Mold, MoldCandidate,
};
use crate::domain::types::ResourceStatus;
use crate::engine::repositories::ResourceStore;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::get_enum;
use rusqlite::{params, Connection, Row};
use std::sync::{Arc, Mutex};

// ==========================================
// ResourceRepository - 资源仓储
// ==========================================
pub struct ResourceRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ResourceRepository {
    /// 创建新的ResourceRepository实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_device(row: &Row<'_>, offset: usize) -> rusqlite::Result<Device> {
        Ok(Device {
            device_id: row.get(offset)?,
            device_code: row.get(offset + 1)?,
            capacity_per_hour: row.get(offset + 2)?,
            status: get_enum(row, offset + 3, ResourceStatus::from_db_str)?,
        })
    }

    fn map_mold(row: &Row<'_>, offset: usize) -> rusqlite::Result<Mold> {
        Ok(Mold {
            mold_id: row.get(offset)?,
            mold_code: row.get(offset + 1)?,
            quantity: row.get(offset + 2)?,
            status: get_enum(row, offset + 3, ResourceStatus::from_db_str)?,
        })
    }

    // ==========================================
    // 写入（主数据维护/测试数据准备）
    // ==========================================

    pub fn upsert_device(&self, device: &Device) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT OR REPLACE INTO device (device_id, device_code, capacity_per_hour, status)
               VALUES (?1, ?2, ?3, ?4)"#,
            params![
                device.device_id,
                device.device_code,
                device.capacity_per_hour,
                device.status.to_db_str(),
            ],
        )?;
        Ok(())
    }

    pub fn upsert_mold(&self, mold: &Mold) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT OR REPLACE INTO mold (mold_id, mold_code, quantity, status)
               VALUES (?1, ?2, ?3, ?4)"#,
            params![mold.mold_id, mold.mold_code, mold.quantity, mold.status.to_db_str()],
        )?;
        Ok(())
    }

    pub fn upsert_device_relation(&self, relation: &MaterialDeviceRelation) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT OR REPLACE INTO material_device_relation (material_id, device_id, weight)
               VALUES (?1, ?2, ?3)"#,
            params![relation.material_id, relation.device_id, relation.weight],
        )?;
        Ok(())
    }

    pub fn upsert_mold_relation(&self, relation: &MaterialMoldRelation) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT OR REPLACE INTO material_mold_relation (
                    material_id, mold_id, weight, cycle_time_secs, output_per_cycle
               ) VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![
                relation.material_id,
                relation.mold_id,
                relation.weight,
                relation.cycle_time_secs,
                relation.output_per_cycle,
            ],
        )?;
        Ok(())
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 查询可用设备
    pub fn find_devices_by_status(&self, status: ResourceStatus) -> RepositoryResult<Vec<Device>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT device_id, device_code, capacity_per_hour, status
               FROM device
               WHERE status = ?1
               ORDER BY device_id"#,
        )?;
        let devices = stmt
            .query_map(params![status.to_db_str()], |row| Self::map_device(row, 0))?
            .collect::<Result<Vec<Device>, _>>()?;
        Ok(devices)
    }

    /// 查询可用模具
    pub fn find_molds_by_status(&self, status: ResourceStatus) -> RepositoryResult<Vec<Mold>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT mold_id, mold_code, quantity, status
               FROM mold
               WHERE status = ?1
               ORDER BY mold_id"#,
        )?;
        let molds = stmt
            .query_map(params![status.to_db_str()], |row| Self::map_mold(row, 0))?
            .collect::<Result<Vec<Mold>, _>>()?;
        Ok(molds)
    }

    /// 查询物料的设备候选
    ///
    /// 只返回 normal 状态设备；权重降序，同权重按设备ID升序
    pub fn find_device_candidates_by_material(
        &self,
        material_id: &str,
    ) -> RepositoryResult<Vec<DeviceCandidate>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT r.weight, d.device_id, d.device_code, d.capacity_per_hour, d.status
               FROM material_device_relation r
               JOIN device d ON d.device_id = r.device_id
               WHERE r.material_id = ?1 AND d.status = ?2
               ORDER BY r.weight DESC, d.device_id ASC"#,
        )?;
        let candidates = stmt
            .query_map(
                params![material_id, ResourceStatus::Normal.to_db_str()],
                |row| {
                    Ok(DeviceCandidate {
                        weight: row.get(0)?,
                        device: Self::map_device(row, 1)?,
                    })
                },
            )?
            .collect::<Result<Vec<DeviceCandidate>, _>>()?;
        Ok(candidates)
    }

    /// 查询物料的模具候选
    ///
    /// 只返回 normal 状态模具；权重降序，同权重按模具ID升序
    pub fn find_mold_candidates_by_material(
        &self,
        material_id: &str,
    ) -> RepositoryResult<Vec<MoldCandidate>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT r.weight, r.cycle_time_secs, r.output_per_cycle,
                      m.mold_id, m.mold_code, m.quantity, m.status
               FROM material_mold_relation r
               JOIN mold m ON m.mold_id = r.mold_id
               WHERE r.material_id = ?1 AND m.status = ?2
               ORDER BY r.weight DESC, m.mold_id ASC"#,
        )?;
        let candidates = stmt
            .query_map(
                params![material_id, ResourceStatus::Normal.to_db_str()],
                |row| {
                    Ok(MoldCandidate {
                        weight: row.get(0)?,
                        cycle_time_secs: row.get(1)?,
                        output_per_cycle: row.get(2)?,
                        mold: Self::map_mold(row, 3)?,
                    })
                },
            )?
            .collect::<Result<Vec<MoldCandidate>, _>>()?;
        Ok(candidates)
    }
}

impl ResourceStore for ResourceRepository {
    fn find_available_devices(&self) -> RepositoryResult<Vec<Device>> {
        self.find_devices_by_status(ResourceStatus::Normal)
    }

    fn find_available_molds(&self) -> RepositoryResult<Vec<Mold>> {
        self.find_molds_by_status(ResourceStatus::Normal)
    }

    fn find_device_candidates(&self, material_id: &str) -> RepositoryResult<Vec<DeviceCandidate>> {
        self.find_device_candidates_by_material(material_id)
    }

    fn find_mold_candidates(&self, material_id: &str) -> RepositoryResult<Vec<MoldCandidate>> {
        self.find_mold_candidates_by_material(material_id)
    }
}
