// ==========================================
// 固化罐装载分配系统 - 固化曲线数据仓储
// ==========================================
// 曲线阶段以 JSON 存储（1~2 段）
// ==========================================

use crate::domain::work_order::{CureCycle, CureStage};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

pub struct CureCycleRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CureCycleRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn upsert(&self, cycle: &CureCycle) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::upsert_tx(&conn, cycle)
    }

    pub fn batch_upsert(&self, cycles: &[CureCycle]) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        for cycle in cycles {
            Self::upsert_tx(&tx, cycle)?;
        }
        tx.commit()?;
        Ok(cycles.len())
    }

    pub fn find_by_id(&self, cycle_id: &str) -> RepositoryResult<Option<CureCycle>> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(
                "SELECT cycle_id, name, stages_json FROM cure_cycle WHERE cycle_id = ?1",
                params![cycle_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?)),
            )
            .optional()?;
        row.map(decode).transpose()
    }

    pub fn list_all(&self) -> RepositoryResult<Vec<CureCycle>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT cycle_id, name, stages_json FROM cure_cycle ORDER BY cycle_id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(decode).collect()
    }

    fn upsert_tx(conn: &Connection, cycle: &CureCycle) -> RepositoryResult<()> {
        let stages_json = serde_json::to_string(&cycle.stages)?;
        conn.execute(
            r#"INSERT INTO cure_cycle (cycle_id, name, stages_json) VALUES (?1, ?2, ?3)
               ON CONFLICT(cycle_id) DO UPDATE SET
                   name = excluded.name,
                   stages_json = excluded.stages_json"#,
            params![&cycle.cycle_id, &cycle.name, stages_json],
        )?;
        Ok(())
    }
}

fn decode((cycle_id, name, stages_json): (String, String, String)) -> RepositoryResult<CureCycle> {
    let stages: Vec<CureStage> = serde_json::from_str(&stages_json)?;
    Ok(CureCycle {
        cycle_id,
        name,
        stages,
    })
}
