// ==========================================
// 固化罐装载分配系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 建表语句集中维护（幂等）
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要"每个连接"单独开启
/// - busy_timeout 需要"每个连接"单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 初始化 schema（幂等）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS cure_cycle (
            cycle_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            stages_json TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS work_order (
            wo_id TEXT PRIMARY KEY,
            part_ref TEXT NOT NULL DEFAULT '',
            width_mm REAL,
            height_mm REAL,
            weight_kg REAL,
            connector_count INTEGER,
            rotation_allowed INTEGER NOT NULL DEFAULT 1,
            cure_cycle_id TEXT,
            priority INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            previous_status TEXT,
            revision INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_work_order_status ON work_order(status);

        CREATE TABLE IF NOT EXISTS vessel (
            vessel_id TEXT PRIMARY KEY,
            name TEXT NOT NULL DEFAULT '',
            usable_width_mm REAL NOT NULL,
            usable_length_mm REAL NOT NULL,
            weight_limit_kg REAL NOT NULL,
            connector_capacity INTEGER NOT NULL,
            support_height_mm REAL,
            max_supports INTEGER,
            per_support_weight_kg REAL,
            clearance_mm REAL,
            status TEXT NOT NULL,
            revision INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS allocation (
            allocation_id TEXT PRIMARY KEY,
            vessel_id TEXT NOT NULL REFERENCES vessel(vessel_id),
            cure_cycle_id TEXT NOT NULL,
            status TEXT NOT NULL,
            packing_status TEXT NOT NULL,
            metrics_json TEXT NOT NULL,
            confirmed_by TEXT,
            cancelled_by TEXT,
            note TEXT,
            config_snapshot_json TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            confirmed_at TEXT,
            completed_at TEXT,
            revision INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_allocation_vessel ON allocation(vessel_id, status);

        CREATE TABLE IF NOT EXISTS allocation_placement (
            allocation_id TEXT NOT NULL REFERENCES allocation(allocation_id) ON DELETE CASCADE,
            seq_no INTEGER NOT NULL,
            wo_id TEXT NOT NULL,
            level INTEGER NOT NULL,
            x_mm REAL NOT NULL,
            y_mm REAL NOT NULL,
            width_mm REAL NOT NULL,
            height_mm REAL NOT NULL,
            rotated INTEGER NOT NULL,
            PRIMARY KEY (allocation_id, seq_no)
        );
        CREATE INDEX IF NOT EXISTS idx_allocation_placement_wo ON allocation_placement(wo_id);

        CREATE TABLE IF NOT EXISTS allocation_exclusion (
            allocation_id TEXT NOT NULL REFERENCES allocation(allocation_id) ON DELETE CASCADE,
            wo_id TEXT NOT NULL,
            reason_code TEXT NOT NULL,
            reason_detail TEXT,
            PRIMARY KEY (allocation_id, wo_id)
        );
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}
