// ==========================================
// 固化罐装载分配系统 - 分配方案数据仓储
// ==========================================
// 表: allocation / allocation_placement / allocation_exclusion
// 红线: Repository 不含业务逻辑，状态合法性由生命周期管理器判定
// 并发控制: 状态写入带 revision 校验
// ==========================================

use crate::domain::allocation::{Allocation, AllocationMetrics, Exclusion, Placement};
use crate::domain::types::{AllocationStatus, ExclusionReason, Level, PackingStatus};
use crate::repository::error::{
    format_datetime, parse_datetime, status_conversion_error, RepositoryError, RepositoryResult,
};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"SELECT allocation_id, vessel_id, cure_cycle_id, status,
       packing_status, metrics_json, confirmed_by, cancelled_by, note,
       config_snapshot_json, created_at, updated_at, confirmed_at, completed_at, revision
  FROM allocation"#;

// 占用工单的状态（Draft / Pending / Active）
const CLAIMING_STATUSES: &str = "('DRAFT', 'PENDING', 'ACTIVE')";

// ==========================================
// 状态写入参数
// ==========================================
#[derive(Debug, Clone)]
pub struct AllocationStatusUpdate {
    pub status: AllocationStatus,
    pub confirmed_by: Option<String>,
    pub cancelled_by: Option<String>,
    pub confirmed_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub updated_at: NaiveDateTime,
}

// ==========================================
// AllocationRepository - 分配方案仓储
// ==========================================
pub struct AllocationRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AllocationRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入方案（含摆放与排除明细，单事务）
    pub fn insert(&self, allocation: &Allocation) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        Self::insert_tx(&tx, allocation)?;
        tx.commit()?;
        Ok(())
    }

    pub fn find_by_id(&self, allocation_id: &str) -> RepositoryResult<Option<Allocation>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, allocation_id)
    }

    pub fn list_all(&self) -> RepositoryResult<Vec<Allocation>> {
        let conn = self.get_conn()?;
        Self::query_list(&conn, "ORDER BY created_at, allocation_id", params![])
    }

    pub fn list_by_status(&self, status: AllocationStatus) -> RepositoryResult<Vec<Allocation>> {
        let conn = self.get_conn()?;
        Self::query_list(
            &conn,
            "WHERE status = ?1 ORDER BY created_at, allocation_id",
            params![status.to_db_str()],
        )
    }

    pub fn list_by_vessel(&self, vessel_id: &str) -> RepositoryResult<Vec<Allocation>> {
        let conn = self.get_conn()?;
        Self::query_list(
            &conn,
            "WHERE vessel_id = ?1 ORDER BY created_at, allocation_id",
            params![vessel_id],
        )
    }

    /// 当前被占用的工单: wo_id → allocation_id
    pub fn claimed_work_orders(&self) -> RepositoryResult<HashMap<String, String>> {
        let conn = self.get_conn()?;
        Self::claimed_work_orders_tx(&conn)
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    pub(crate) fn insert_tx(conn: &Connection, allocation: &Allocation) -> RepositoryResult<()> {
        let metrics_json = serde_json::to_string(&allocation.metrics)?;
        conn.execute(
            r#"INSERT INTO allocation (
                allocation_id, vessel_id, cure_cycle_id, status, packing_status,
                metrics_json, confirmed_by, cancelled_by, note, config_snapshot_json,
                created_at, updated_at, confirmed_at, completed_at, revision
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"#,
            params![
                &allocation.allocation_id,
                &allocation.vessel_id,
                &allocation.cure_cycle_id,
                allocation.status.to_db_str(),
                allocation.packing_status.to_db_str(),
                metrics_json,
                &allocation.confirmed_by,
                &allocation.cancelled_by,
                &allocation.note,
                &allocation.config_snapshot_json,
                format_datetime(&allocation.created_at),
                format_datetime(&allocation.updated_at),
                allocation.confirmed_at.as_ref().map(format_datetime),
                allocation.completed_at.as_ref().map(format_datetime),
                allocation.revision,
            ],
        )?;

        {
            let mut stmt = conn.prepare(
                r#"INSERT INTO allocation_placement (
                    allocation_id, seq_no, wo_id, level, x_mm, y_mm, width_mm, height_mm, rotated
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
            )?;
            for (seq_no, p) in allocation.placements.iter().enumerate() {
                stmt.execute(params![
                    &allocation.allocation_id,
                    seq_no as i64,
                    &p.wo_id,
                    p.level.index(),
                    p.x_mm,
                    p.y_mm,
                    p.width_mm,
                    p.height_mm,
                    p.rotated,
                ])?;
            }
        }

        let mut stmt = conn.prepare(
            r#"INSERT INTO allocation_exclusion (allocation_id, wo_id, reason_code, reason_detail)
               VALUES (?1, ?2, ?3, ?4)"#,
        )?;
        for ex in &allocation.excluded {
            stmt.execute(params![
                &allocation.allocation_id,
                &ex.wo_id,
                ex.reason.code(),
                ex.reason.detail(),
            ])?;
        }
        Ok(())
    }

    pub(crate) fn find_by_id_tx(
        conn: &Connection,
        allocation_id: &str,
    ) -> RepositoryResult<Option<Allocation>> {
        let header = conn
            .query_row(
                &format!("{} WHERE allocation_id = ?1", SELECT_COLUMNS),
                params![allocation_id],
                map_header,
            )
            .optional()?;
        match header {
            Some(header) => Ok(Some(Self::load_children(conn, header)?)),
            None => Ok(None),
        }
    }

    /// 同一罐上除 `exclude_id` 外的 Active 方案
    pub(crate) fn active_on_vessel_tx(
        conn: &Connection,
        vessel_id: &str,
        exclude_id: &str,
    ) -> RepositoryResult<Vec<String>> {
        let mut stmt = conn.prepare(
            r#"SELECT allocation_id FROM allocation
               WHERE vessel_id = ?1 AND status = 'ACTIVE' AND allocation_id <> ?2
               ORDER BY allocation_id"#,
        )?;
        let ids = stmt
            .query_map(params![vessel_id, exclude_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub(crate) fn claimed_work_orders_tx(conn: &Connection) -> RepositoryResult<HashMap<String, String>> {
        let mut stmt = conn.prepare(&format!(
            r#"SELECT p.wo_id, a.allocation_id
               FROM allocation_placement p
               JOIN allocation a ON a.allocation_id = p.allocation_id
               WHERE a.status IN {}"#,
            CLAIMING_STATUSES
        ))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(rows)
    }

    /// 工单是否已被其它占用中的方案占用，返回占用方案 id
    pub(crate) fn find_claim_tx(
        conn: &Connection,
        wo_id: &str,
        exclude_id: &str,
    ) -> RepositoryResult<Option<String>> {
        let claim = conn
            .query_row(
                &format!(
                    r#"SELECT a.allocation_id
                       FROM allocation_placement p
                       JOIN allocation a ON a.allocation_id = p.allocation_id
                       WHERE p.wo_id = ?1 AND a.allocation_id <> ?2 AND a.status IN {}
                       ORDER BY a.allocation_id
                       LIMIT 1"#,
                    CLAIMING_STATUSES
                ),
                params![wo_id, exclude_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(claim)
    }

    /// 带 revision 校验的状态写入
    pub(crate) fn update_status_tx(
        conn: &Connection,
        allocation_id: &str,
        expected_revision: i64,
        update: &AllocationStatusUpdate,
    ) -> RepositoryResult<()> {
        let rows_affected = conn.execute(
            r#"UPDATE allocation SET
                   status = ?1,
                   confirmed_by = COALESCE(?2, confirmed_by),
                   cancelled_by = COALESCE(?3, cancelled_by),
                   confirmed_at = COALESCE(?4, confirmed_at),
                   completed_at = COALESCE(?5, completed_at),
                   updated_at = ?6,
                   revision = revision + 1
               WHERE allocation_id = ?7 AND revision = ?8"#,
            params![
                update.status.to_db_str(),
                &update.confirmed_by,
                &update.cancelled_by,
                update.confirmed_at.as_ref().map(format_datetime),
                update.completed_at.as_ref().map(format_datetime),
                format_datetime(&update.updated_at),
                allocation_id,
                expected_revision,
            ],
        )?;

        if rows_affected == 0 {
            let actual: Option<i64> = conn
                .query_row(
                    "SELECT revision FROM allocation WHERE allocation_id = ?1",
                    params![allocation_id],
                    |row| row.get(0),
                )
                .optional()?;
            return Err(match actual {
                Some(actual) => RepositoryError::OptimisticLockFailure {
                    entity: "Allocation".to_string(),
                    id: allocation_id.to_string(),
                    expected: expected_revision,
                    actual,
                },
                None => RepositoryError::NotFound {
                    entity: "Allocation".to_string(),
                    id: allocation_id.to_string(),
                },
            });
        }
        Ok(())
    }

    // ==========================================
    // 内部
    // ==========================================

    fn query_list(
        conn: &Connection,
        tail: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> RepositoryResult<Vec<Allocation>> {
        let mut stmt = conn.prepare(&format!("{} {}", SELECT_COLUMNS, tail))?;
        let headers = stmt
            .query_map(params, map_header)?
            .collect::<Result<Vec<_>, _>>()?;
        headers
            .into_iter()
            .map(|header| Self::load_children(conn, header))
            .collect()
    }

    fn load_children(conn: &Connection, mut allocation: Allocation) -> RepositoryResult<Allocation> {
        let mut stmt = conn.prepare(
            r#"SELECT wo_id, level, x_mm, y_mm, width_mm, height_mm, rotated
               FROM allocation_placement
               WHERE allocation_id = ?1
               ORDER BY seq_no"#,
        )?;
        let placements = stmt
            .query_map(params![&allocation.allocation_id], |row| {
                let level_raw: i64 = row.get(1)?;
                let level = Level::from_index(level_raw).ok_or_else(|| {
                    status_conversion_error(1, "allocation_placement.level", &level_raw.to_string())
                })?;
                Ok(Placement {
                    wo_id: row.get(0)?,
                    level,
                    x_mm: row.get(2)?,
                    y_mm: row.get(3)?,
                    width_mm: row.get(4)?,
                    height_mm: row.get(5)?,
                    rotated: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            r#"SELECT wo_id, reason_code, reason_detail
               FROM allocation_exclusion
               WHERE allocation_id = ?1
               ORDER BY rowid"#,
        )?;
        let excluded = stmt
            .query_map(params![&allocation.allocation_id], |row| {
                let code: String = row.get(1)?;
                let detail: Option<String> = row.get(2)?;
                let reason = ExclusionReason::from_code(&code, detail)
                    .ok_or_else(|| status_conversion_error(1, "allocation_exclusion.reason_code", &code))?;
                Ok(Exclusion {
                    wo_id: row.get(0)?,
                    reason,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        allocation.included_wo_ids = placements.iter().map(|p| p.wo_id.clone()).collect();
        allocation.placements = placements;
        allocation.excluded = excluded;
        Ok(allocation)
    }
}

/// 映射方案主表行（明细另行加载）
fn map_header(row: &rusqlite::Row) -> rusqlite::Result<Allocation> {
    let status_raw: String = row.get(3)?;
    let status = AllocationStatus::from_db_str(&status_raw)
        .ok_or_else(|| status_conversion_error(3, "allocation.status", &status_raw))?;
    let packing_raw: String = row.get(4)?;
    let packing_status = PackingStatus::from_db_str(&packing_raw)
        .ok_or_else(|| status_conversion_error(4, "allocation.packing_status", &packing_raw))?;

    let metrics_json: String = row.get(5)?;
    let metrics: AllocationMetrics = serde_json::from_str(&metrics_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let confirmed_at: Option<String> = row.get(12)?;
    let completed_at: Option<String> = row.get(13)?;

    Ok(Allocation {
        allocation_id: row.get(0)?,
        vessel_id: row.get(1)?,
        cure_cycle_id: row.get(2)?,
        status,
        included_wo_ids: Vec::new(),
        excluded: Vec::new(),
        placements: Vec::new(),
        metrics,
        packing_status,
        confirmed_by: row.get(6)?,
        cancelled_by: row.get(7)?,
        note: row.get(8)?,
        config_snapshot_json: row.get(9)?,
        created_at: parse_datetime(10, &row.get::<_, String>(10)?)?,
        updated_at: parse_datetime(11, &row.get::<_, String>(11)?)?,
        confirmed_at: confirmed_at.map(|s| parse_datetime(12, &s)).transpose()?,
        completed_at: completed_at.map(|s| parse_datetime(13, &s)).transpose()?,
        revision: row.get(14)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;
    use crate::domain::allocation::LevelMetrics;
    use crate::domain::types::VesselStatus;
    use crate::domain::vessel::Vessel;
    use crate::repository::vessel_repo::VesselRepository;
    use chrono::Local;

    fn setup() -> (Arc<Mutex<Connection>>, AllocationRepository) {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        VesselRepository::new(conn.clone())
            .upsert(&Vessel {
                vessel_id: "V1".to_string(),
                name: "AC-1".to_string(),
                usable_width_mm: 1000.0,
                usable_length_mm: 1000.0,
                weight_limit_kg: 500.0,
                connector_capacity: 8,
                elevated: None,
                status: VesselStatus::Available,
                revision: 0,
                updated_at: Local::now().naive_local(),
            })
            .unwrap();
        (conn.clone(), AllocationRepository::new(conn))
    }

    fn sample(allocation_id: &str, status: AllocationStatus) -> Allocation {
        let now = Local::now().naive_local();
        Allocation {
            allocation_id: allocation_id.to_string(),
            vessel_id: "V1".to_string(),
            cure_cycle_id: "C180".to_string(),
            status,
            included_wo_ids: vec!["WO-1".to_string()],
            excluded: vec![
                Exclusion::new("WO-2", ExclusionReason::InsufficientSpace),
                Exclusion::new("WO-3", ExclusionReason::Invalid("missing footprint".into())),
            ],
            placements: vec![Placement {
                wo_id: "WO-1".to_string(),
                level: Level::Base,
                x_mm: 15.0,
                y_mm: 15.0,
                width_mm: 200.0,
                height_mm: 100.0,
                rotated: false,
            }],
            metrics: AllocationMetrics {
                levels: vec![LevelMetrics::empty(Level::Base, 1_000_000.0)],
                weight_used_kg: 20.0,
                weight_limit_kg: 500.0,
                connectors_used: 1,
                connector_capacity: 8,
            },
            packing_status: PackingStatus::ExactOptimal,
            confirmed_by: None,
            cancelled_by: None,
            note: None,
            config_snapshot_json: None,
            created_at: now,
            updated_at: now,
            confirmed_at: None,
            completed_at: None,
            revision: 0,
        }
    }

    #[test]
    fn test_insert_and_load_with_children() {
        let (_, repo) = setup();
        let allocation = sample("A1", AllocationStatus::Pending);
        repo.insert(&allocation).unwrap();

        let loaded = repo.find_by_id("A1").unwrap().unwrap();
        assert_eq!(loaded.placements, allocation.placements);
        assert_eq!(loaded.excluded, allocation.excluded);
        assert_eq!(loaded.included_wo_ids, vec!["WO-1".to_string()]);
        assert_eq!(loaded.packing_status, PackingStatus::ExactOptimal);
        assert_eq!(repo.list_by_vessel("V1").unwrap().len(), 1);
    }

    #[test]
    fn test_claims_ignore_terminal_allocations() {
        let (conn, repo) = setup();
        repo.insert(&sample("A1", AllocationStatus::Cancelled)).unwrap();
        assert!(repo.claimed_work_orders().unwrap().is_empty());

        repo.insert(&sample("A2", AllocationStatus::Draft)).unwrap();
        let claims = repo.claimed_work_orders().unwrap();
        assert_eq!(claims.get("WO-1").map(String::as_str), Some("A2"));

        let guard = conn.lock().unwrap();
        assert_eq!(
            AllocationRepository::find_claim_tx(&guard, "WO-1", "A9").unwrap(),
            Some("A2".to_string())
        );
        assert_eq!(AllocationRepository::find_claim_tx(&guard, "WO-1", "A2").unwrap(), None);
    }

    #[test]
    fn test_status_update_is_revision_checked() {
        let (conn, repo) = setup();
        repo.insert(&sample("A1", AllocationStatus::Pending)).unwrap();
        let update = AllocationStatusUpdate {
            status: AllocationStatus::Active,
            confirmed_by: Some("operator".to_string()),
            cancelled_by: None,
            confirmed_at: Some(Local::now().naive_local()),
            completed_at: None,
            updated_at: Local::now().naive_local(),
        };

        {
            let guard = conn.lock().unwrap();
            AllocationRepository::update_status_tx(&guard, "A1", 0, &update).unwrap();
            let err = AllocationRepository::update_status_tx(&guard, "A1", 0, &update).unwrap_err();
            assert!(matches!(err, RepositoryError::OptimisticLockFailure { actual: 1, .. }));
        }

        let loaded = repo.find_by_id("A1").unwrap().unwrap();
        assert_eq!(loaded.status, AllocationStatus::Active);
        assert_eq!(loaded.confirmed_by.as_deref(), Some("operator"));
        assert!(loaded.confirmed_at.is_some());
    }
}
