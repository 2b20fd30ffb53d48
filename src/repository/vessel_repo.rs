// ==========================================
// 固化罐装载分配系统 - 固化罐数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 罐状态写入带 revision 校验
// ==========================================

use crate::domain::types::VesselStatus;
use crate::domain::vessel::{ElevatedLevel, Vessel};
use crate::repository::error::{
    format_datetime, parse_datetime, status_conversion_error, RepositoryError, RepositoryResult,
};
use chrono::Local;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"SELECT vessel_id, name, usable_width_mm, usable_length_mm,
       weight_limit_kg, connector_capacity, support_height_mm, max_supports,
       per_support_weight_kg, clearance_mm, status, revision, updated_at
  FROM vessel"#;

pub struct VesselRepository {
    conn: Arc<Mutex<Connection>>,
}

impl VesselRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn upsert(&self, vessel: &Vessel) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::upsert_tx(&conn, vessel)
    }

    pub fn batch_upsert(&self, vessels: &[Vessel]) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        for vessel in vessels {
            Self::upsert_tx(&tx, vessel)?;
        }
        tx.commit()?;
        Ok(vessels.len())
    }

    pub fn find_by_id(&self, vessel_id: &str) -> RepositoryResult<Option<Vessel>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, vessel_id)
    }

    /// 全部固化罐，vessel_id 升序
    pub fn list_all(&self) -> RepositoryResult<Vec<Vessel>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!("{} ORDER BY vessel_id", SELECT_COLUMNS))?;
        let rows = stmt
            .query_map([], map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_by_status(&self, status: VesselStatus) -> RepositoryResult<Vec<Vessel>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare(&format!("{} WHERE status = ?1 ORDER BY vessel_id", SELECT_COLUMNS))?;
        let rows = stmt
            .query_map(params![status.to_db_str()], map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 外部输入的罐状态变更（故障、停用、维护）
    pub fn set_status(
        &self,
        vessel_id: &str,
        status: VesselStatus,
        expected_revision: Option<i64>,
    ) -> RepositoryResult<Vessel> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let current = Self::find_by_id_tx(&tx, vessel_id)?.ok_or_else(|| RepositoryError::NotFound {
            entity: "Vessel".to_string(),
            id: vessel_id.to_string(),
        })?;
        Self::update_status_tx(
            &tx,
            vessel_id,
            expected_revision.unwrap_or(current.revision),
            status,
        )?;
        let updated = Self::find_by_id_tx(&tx, vessel_id)?.ok_or_else(|| RepositoryError::NotFound {
            entity: "Vessel".to_string(),
            id: vessel_id.to_string(),
        })?;
        tx.commit()?;
        Ok(updated)
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    pub(crate) fn upsert_tx(conn: &Connection, vessel: &Vessel) -> RepositoryResult<()> {
        let elevated = vessel.elevated.as_ref();
        conn.execute(
            r#"INSERT INTO vessel (
                vessel_id, name, usable_width_mm, usable_length_mm, weight_limit_kg,
                connector_capacity, support_height_mm, max_supports, per_support_weight_kg,
                clearance_mm, status, revision, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(vessel_id) DO UPDATE SET
                name = excluded.name,
                usable_width_mm = excluded.usable_width_mm,
                usable_length_mm = excluded.usable_length_mm,
                weight_limit_kg = excluded.weight_limit_kg,
                connector_capacity = excluded.connector_capacity,
                support_height_mm = excluded.support_height_mm,
                max_supports = excluded.max_supports,
                per_support_weight_kg = excluded.per_support_weight_kg,
                clearance_mm = excluded.clearance_mm,
                status = CASE WHEN vessel.status = 'IN_USE' THEN vessel.status ELSE excluded.status END,
                revision = vessel.revision + 1,
                updated_at = excluded.updated_at"#,
            params![
                &vessel.vessel_id,
                &vessel.name,
                vessel.usable_width_mm,
                vessel.usable_length_mm,
                vessel.weight_limit_kg,
                vessel.connector_capacity,
                elevated.map(|e| e.support_height_mm),
                elevated.map(|e| e.max_supports),
                elevated.map(|e| e.per_support_weight_kg),
                elevated.map(|e| e.clearance_mm),
                vessel.status.to_db_str(),
                vessel.revision,
                format_datetime(&vessel.updated_at),
            ],
        )?;
        Ok(())
    }

    pub(crate) fn find_by_id_tx(conn: &Connection, vessel_id: &str) -> RepositoryResult<Option<Vessel>> {
        let vessel = conn
            .query_row(
                &format!("{} WHERE vessel_id = ?1", SELECT_COLUMNS),
                params![vessel_id],
                map_row,
            )
            .optional()?;
        Ok(vessel)
    }

    pub(crate) fn update_status_tx(
        conn: &Connection,
        vessel_id: &str,
        expected_revision: i64,
        status: VesselStatus,
    ) -> RepositoryResult<()> {
        let now = format_datetime(&Local::now().naive_local());
        let rows_affected = conn.execute(
            r#"UPDATE vessel
               SET status = ?1, revision = revision + 1, updated_at = ?2
               WHERE vessel_id = ?3 AND revision = ?4"#,
            params![status.to_db_str(), now, vessel_id, expected_revision],
        )?;

        if rows_affected == 0 {
            let actual: Option<i64> = conn
                .query_row(
                    "SELECT revision FROM vessel WHERE vessel_id = ?1",
                    params![vessel_id],
                    |row| row.get(0),
                )
                .optional()?;
            return Err(match actual {
                Some(actual) => RepositoryError::OptimisticLockFailure {
                    entity: "Vessel".to_string(),
                    id: vessel_id.to_string(),
                    expected: expected_revision,
                    actual,
                },
                None => RepositoryError::NotFound {
                    entity: "Vessel".to_string(),
                    id: vessel_id.to_string(),
                },
            });
        }
        Ok(())
    }
}

fn map_row(row: &rusqlite::Row) -> rusqlite::Result<Vessel> {
    let support_height_mm: Option<f64> = row.get(6)?;
    let max_supports: Option<u32> = row.get(7)?;
    let per_support_weight_kg: Option<f64> = row.get(8)?;
    let clearance_mm: Option<f64> = row.get(9)?;

    let elevated = match (support_height_mm, max_supports, per_support_weight_kg) {
        (Some(support_height_mm), Some(max_supports), Some(per_support_weight_kg)) => {
            Some(ElevatedLevel {
                support_height_mm,
                max_supports,
                per_support_weight_kg,
                clearance_mm: clearance_mm.unwrap_or(0.0),
            })
        }
        _ => None,
    };

    let status_raw: String = row.get(10)?;
    let status = VesselStatus::from_db_str(&status_raw)
        .ok_or_else(|| status_conversion_error(10, "vessel.status", &status_raw))?;

    Ok(Vessel {
        vessel_id: row.get(0)?,
        name: row.get(1)?,
        usable_width_mm: row.get(2)?,
        usable_length_mm: row.get(3)?,
        weight_limit_kg: row.get(4)?,
        connector_capacity: row.get(5)?,
        elevated,
        status,
        revision: row.get(11)?,
        updated_at: parse_datetime(12, &row.get::<_, String>(12)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;

    fn setup() -> VesselRepository {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        VesselRepository::new(Arc::new(Mutex::new(conn)))
    }

    fn sample(vessel_id: &str, elevated: bool) -> Vessel {
        Vessel {
            vessel_id: vessel_id.to_string(),
            name: format!("Autoclave {}", vessel_id),
            usable_width_mm: 2000.0,
            usable_length_mm: 1200.0,
            weight_limit_kg: 1500.0,
            connector_capacity: 16,
            elevated: elevated.then(|| ElevatedLevel {
                support_height_mm: 450.0,
                max_supports: 4,
                per_support_weight_kg: 60.0,
                clearance_mm: 30.0,
            }),
            status: VesselStatus::Available,
            revision: 0,
            updated_at: Local::now().naive_local(),
        }
    }

    #[test]
    fn test_round_trip_with_and_without_elevated_level() {
        let repo = setup();
        repo.batch_upsert(&[sample("V1", false), sample("V2", true)]).unwrap();

        let all = repo.list_all().unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].elevated.is_none());
        assert_eq!(all[1].elevated, sample("V2", true).elevated);
    }

    #[test]
    fn test_upsert_keeps_in_use_status() {
        let repo = setup();
        repo.upsert(&sample("V1", false)).unwrap();
        repo.upsert(&sample("V2", false)).unwrap();
        repo.set_status("V1", VesselStatus::InUse, None).unwrap();
        repo.set_status("V2", VesselStatus::Faulted, None).unwrap();

        // 目录重新导入只更新参数，占用状态归生命周期管理
        let mut reimported = sample("V1", false);
        reimported.weight_limit_kg = 1800.0;
        repo.batch_upsert(&[reimported, sample("V2", false)]).unwrap();

        let v1 = repo.find_by_id("V1").unwrap().unwrap();
        assert_eq!(v1.status, VesselStatus::InUse);
        assert_eq!(v1.weight_limit_kg, 1800.0);
        assert_eq!(v1.revision, 2);
        assert_eq!(repo.find_by_id("V2").unwrap().unwrap().status, VesselStatus::Available);
    }

    #[test]
    fn test_set_status_conflict() {
        let repo = setup();
        repo.upsert(&sample("V1", false)).unwrap();
        repo.set_status("V1", VesselStatus::Faulted, Some(0)).unwrap();

        let err = repo
            .set_status("V1", VesselStatus::Available, Some(0))
            .unwrap_err();
        assert!(matches!(err, RepositoryError::OptimisticLockFailure { .. }));

        let err = repo
            .set_status("V404", VesselStatus::Available, None)
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }
}
