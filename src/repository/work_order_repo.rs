// ==========================================
// 固化罐装载分配系统 - 工单数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 并发控制: 每次写入 revision + 1，带期望 revision 校验
// ==========================================

use crate::domain::types::WorkOrderStatus;
use crate::domain::work_order::{ToolFootprint, WorkOrder};
use crate::repository::error::{
    format_datetime, parse_datetime, status_conversion_error, RepositoryError, RepositoryResult,
};
use chrono::Local;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"SELECT wo_id, part_ref, width_mm, height_mm, weight_kg,
       connector_count, rotation_allowed, cure_cycle_id, priority,
       status, previous_status, revision, updated_at
  FROM work_order"#;

// ==========================================
// WorkOrderRepository - 工单仓储
// ==========================================
pub struct WorkOrderRepository {
    conn: Arc<Mutex<Connection>>,
}

impl WorkOrderRepository {
    /// 创建新的WorkOrderRepository实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入或更新工单（目录导入用）
    ///
    /// 已存在的工单 revision + 1
    pub fn upsert(&self, wo: &WorkOrder) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::upsert_tx(&conn, wo)
    }

    /// 批量插入或更新（单事务）
    pub fn batch_upsert(&self, work_orders: &[WorkOrder]) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        for wo in work_orders {
            Self::upsert_tx(&tx, wo)?;
        }
        tx.commit()?;
        Ok(work_orders.len())
    }

    /// 按 wo_id 查询
    pub fn find_by_id(&self, wo_id: &str) -> RepositoryResult<Option<WorkOrder>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, wo_id)
    }

    /// 按 wo_id 列表查询（不存在的 id 直接忽略）
    pub fn find_by_ids(&self, wo_ids: &[String]) -> RepositoryResult<Vec<WorkOrder>> {
        let conn = self.get_conn()?;
        let mut result = Vec::with_capacity(wo_ids.len());
        for wo_id in wo_ids {
            if let Some(wo) = Self::find_by_id_tx(&conn, wo_id)? {
                result.push(wo);
            }
        }
        Ok(result)
    }

    /// 按状态查询，wo_id 升序
    pub fn list_by_status(&self, status: WorkOrderStatus) -> RepositoryResult<Vec<WorkOrder>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!("{} WHERE status = ?1 ORDER BY wo_id", SELECT_COLUMNS))?;
        let rows = stmt
            .query_map(params![status.to_db_str()], map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_all(&self) -> RepositoryResult<Vec<WorkOrder>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!("{} ORDER BY wo_id", SELECT_COLUMNS))?;
        let rows = stmt
            .query_map([], map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 车间外部状态流转（仅作为输入）
    ///
    /// # 参数
    /// - `expected_revision`: 为 Some 时做乐观锁校验
    ///
    /// # 返回
    /// 更新后的工单
    pub fn set_status(
        &self,
        wo_id: &str,
        status: WorkOrderStatus,
        expected_revision: Option<i64>,
    ) -> RepositoryResult<WorkOrder> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let current = Self::find_by_id_tx(&tx, wo_id)?.ok_or_else(|| RepositoryError::NotFound {
            entity: "WorkOrder".to_string(),
            id: wo_id.to_string(),
        })?;
        let revision = expected_revision.unwrap_or(current.revision);
        Self::update_status_tx(&tx, wo_id, revision, status, Some(current.status))?;

        let updated = Self::find_by_id_tx(&tx, wo_id)?.ok_or_else(|| RepositoryError::NotFound {
            entity: "WorkOrder".to_string(),
            id: wo_id.to_string(),
        })?;
        tx.commit()?;
        Ok(updated)
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    pub(crate) fn upsert_tx(conn: &Connection, wo: &WorkOrder) -> RepositoryResult<()> {
        let fp = wo.footprint.as_ref();
        conn.execute(
            r#"INSERT INTO work_order (
                wo_id, part_ref, width_mm, height_mm, weight_kg, connector_count,
                rotation_allowed, cure_cycle_id, priority, status, previous_status,
                revision, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(wo_id) DO UPDATE SET
                part_ref = excluded.part_ref,
                width_mm = excluded.width_mm,
                height_mm = excluded.height_mm,
                weight_kg = excluded.weight_kg,
                connector_count = excluded.connector_count,
                rotation_allowed = excluded.rotation_allowed,
                cure_cycle_id = excluded.cure_cycle_id,
                priority = excluded.priority,
                status = CASE WHEN work_order.status IN ('CURING', 'DONE')
                    THEN work_order.status ELSE excluded.status END,
                previous_status = CASE WHEN work_order.status IN ('CURING', 'DONE')
                    THEN work_order.previous_status ELSE excluded.previous_status END,
                revision = work_order.revision + 1,
                updated_at = excluded.updated_at"#,
            params![
                &wo.wo_id,
                &wo.part_ref,
                fp.map(|f| f.width_mm),
                fp.map(|f| f.height_mm),
                fp.map(|f| f.weight_kg),
                fp.map(|f| f.connector_count),
                fp.map(|f| f.rotation_allowed).unwrap_or(true),
                &wo.cure_cycle_id,
                wo.priority,
                wo.status.to_db_str(),
                wo.previous_status.map(|s| s.to_db_str()),
                wo.revision,
                format_datetime(&wo.updated_at),
            ],
        )?;
        Ok(())
    }

    pub(crate) fn find_by_id_tx(conn: &Connection, wo_id: &str) -> RepositoryResult<Option<WorkOrder>> {
        let wo = conn
            .query_row(
                &format!("{} WHERE wo_id = ?1", SELECT_COLUMNS),
                params![wo_id],
                map_row,
            )
            .optional()?;
        Ok(wo)
    }

    /// 带 revision 校验的状态更新
    ///
    /// # 错误
    /// - `OptimisticLockFailure`: revision 不匹配
    /// - `NotFound`: wo_id 不存在
    pub(crate) fn update_status_tx(
        conn: &Connection,
        wo_id: &str,
        expected_revision: i64,
        status: WorkOrderStatus,
        previous_status: Option<WorkOrderStatus>,
    ) -> RepositoryResult<()> {
        let now = format_datetime(&Local::now().naive_local());
        let rows_affected = conn.execute(
            r#"UPDATE work_order
               SET status = ?1, previous_status = ?2, revision = revision + 1, updated_at = ?3
               WHERE wo_id = ?4 AND revision = ?5"#,
            params![
                status.to_db_str(),
                previous_status.map(|s| s.to_db_str()),
                now,
                wo_id,
                expected_revision
            ],
        )?;

        if rows_affected == 0 {
            let actual: Option<i64> = conn
                .query_row(
                    "SELECT revision FROM work_order WHERE wo_id = ?1",
                    params![wo_id],
                    |row| row.get(0),
                )
                .optional()?;
            return Err(match actual {
                Some(actual) => RepositoryError::OptimisticLockFailure {
                    entity: "WorkOrder".to_string(),
                    id: wo_id.to_string(),
                    expected: expected_revision,
                    actual,
                },
                None => RepositoryError::NotFound {
                    entity: "WorkOrder".to_string(),
                    id: wo_id.to_string(),
                },
            });
        }
        Ok(())
    }
}

/// 映射数据库行到 WorkOrder
fn map_row(row: &rusqlite::Row) -> rusqlite::Result<WorkOrder> {
    let width_mm: Option<f64> = row.get(2)?;
    let height_mm: Option<f64> = row.get(3)?;
    let weight_kg: Option<f64> = row.get(4)?;
    let connector_count: Option<u32> = row.get(5)?;
    let rotation_allowed: bool = row.get(6)?;

    // 任一外形字段缺失即视为外形缺失
    let footprint = match (width_mm, height_mm, weight_kg, connector_count) {
        (Some(width_mm), Some(height_mm), Some(weight_kg), Some(connector_count)) => {
            Some(ToolFootprint {
                width_mm,
                height_mm,
                weight_kg,
                connector_count,
                rotation_allowed,
            })
        }
        _ => None,
    };

    let status_raw: String = row.get(9)?;
    let status = WorkOrderStatus::from_db_str(&status_raw)
        .ok_or_else(|| status_conversion_error(9, "work_order.status", &status_raw))?;
    let previous_raw: Option<String> = row.get(10)?;
    let previous_status = match previous_raw {
        Some(raw) => Some(
            WorkOrderStatus::from_db_str(&raw)
                .ok_or_else(|| status_conversion_error(10, "work_order.previous_status", &raw))?,
        ),
        None => None,
    };

    Ok(WorkOrder {
        wo_id: row.get(0)?,
        part_ref: row.get(1)?,
        footprint,
        cure_cycle_id: row.get(7)?,
        priority: row.get(8)?,
        status,
        previous_status,
        revision: row.get(11)?,
        updated_at: parse_datetime(12, &row.get::<_, String>(12)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;

    fn setup() -> WorkOrderRepository {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        WorkOrderRepository::new(Arc::new(Mutex::new(conn)))
    }

    fn sample(wo_id: &str) -> WorkOrder {
        WorkOrder {
            wo_id: wo_id.to_string(),
            part_ref: "P-100".to_string(),
            footprint: Some(ToolFootprint {
                width_mm: 300.0,
                height_mm: 200.0,
                weight_kg: 40.0,
                connector_count: 2,
                rotation_allowed: true,
            }),
            cure_cycle_id: Some("C180".to_string()),
            priority: 5,
            status: WorkOrderStatus::AwaitingCure,
            previous_status: Some(WorkOrderStatus::InProgress),
            revision: 0,
            updated_at: Local::now().naive_local(),
        }
    }

    #[test]
    fn test_upsert_and_find() {
        let repo = setup();
        repo.upsert(&sample("WO-1")).unwrap();

        let found = repo.find_by_id("WO-1").unwrap().unwrap();
        assert_eq!(found.footprint, sample("WO-1").footprint);
        assert_eq!(found.status, WorkOrderStatus::AwaitingCure);
        assert_eq!(found.revision, 0);

        // 再次写入 revision 递增
        repo.upsert(&sample("WO-1")).unwrap();
        assert_eq!(repo.find_by_id("WO-1").unwrap().unwrap().revision, 1);
    }

    #[test]
    fn test_missing_footprint_column_reads_as_none() {
        let repo = setup();
        let mut wo = sample("WO-2");
        wo.footprint = None;
        repo.upsert(&wo).unwrap();
        assert!(repo.find_by_id("WO-2").unwrap().unwrap().footprint.is_none());
    }

    #[test]
    fn test_set_status_tracks_previous_and_checks_revision() {
        let repo = setup();
        repo.upsert(&sample("WO-3")).unwrap();

        let updated = repo.set_status("WO-3", WorkOrderStatus::Curing, Some(0)).unwrap();
        assert_eq!(updated.status, WorkOrderStatus::Curing);
        assert_eq!(updated.previous_status, Some(WorkOrderStatus::AwaitingCure));
        assert_eq!(updated.revision, 1);

        // 过期 revision
        let err = repo
            .set_status("WO-3", WorkOrderStatus::Done, Some(0))
            .unwrap_err();
        assert!(matches!(err, RepositoryError::OptimisticLockFailure { actual: 1, .. }));
    }

    #[test]
    fn test_upsert_keeps_curing_and_done_status() {
        let repo = setup();
        repo.batch_upsert(&[sample("WO-5"), sample("WO-6"), sample("WO-7")]).unwrap();
        repo.set_status("WO-5", WorkOrderStatus::Curing, None).unwrap();
        repo.set_status("WO-6", WorkOrderStatus::Curing, None).unwrap();
        repo.set_status("WO-6", WorkOrderStatus::Done, None).unwrap();
        repo.set_status("WO-7", WorkOrderStatus::InProgress, None).unwrap();

        let mut reimported = sample("WO-5");
        reimported.priority = 9;
        repo.batch_upsert(&[reimported, sample("WO-6"), sample("WO-7")]).unwrap();

        let wo5 = repo.find_by_id("WO-5").unwrap().unwrap();
        assert_eq!(wo5.status, WorkOrderStatus::Curing);
        assert_eq!(wo5.previous_status, Some(WorkOrderStatus::AwaitingCure));
        assert_eq!(wo5.priority, 9);

        let wo6 = repo.find_by_id("WO-6").unwrap().unwrap();
        assert_eq!(wo6.status, WorkOrderStatus::Done);
        assert_eq!(wo6.previous_status, Some(WorkOrderStatus::Curing));

        // 车间状态仍以导入内容为准
        let wo7 = repo.find_by_id("WO-7").unwrap().unwrap();
        assert_eq!(wo7.status, WorkOrderStatus::AwaitingCure);
        assert_eq!(wo7.previous_status, Some(WorkOrderStatus::InProgress));
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let repo = setup();
        repo.upsert(&sample("WO-4")).unwrap();
        {
            let conn = repo.get_conn().unwrap();
            conn.execute(
                "UPDATE work_order SET status = 'awaiting' WHERE wo_id = 'WO-4'",
                [],
            )
            .unwrap();
        }
        let err = repo.find_by_id("WO-4").unwrap_err();
        assert!(matches!(err, RepositoryError::UnknownStatus { .. }));
    }
}
