// ==========================================
// 固化罐装载分配系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::allocation_config::{AllocationConfig, OptimizationPriority};
use crate::db::open_sqlite_connection;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::HashMap;
use std::error::Error;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at)
             VALUES ('global', ?1, ?2, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 读取并解析数值配置，缺省或解析失败时使用默认值
    fn get_parsed_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, Box<dyn Error>> {
        match self.get_config_value(key)? {
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(v) => Ok(v),
                Err(_) => {
                    tracing::warn!(key, value = %raw, "配置值无法解析，使用默认值");
                    Ok(default)
                }
            },
            None => Ok(default),
        }
    }

    // ===== 分配参数 =====

    /// 加载分配参数（缺省键使用默认值）
    pub fn load_allocation_config(&self) -> Result<AllocationConfig, Box<dyn Error>> {
        let defaults = AllocationConfig::default();

        let optimization_priority = match self.get_config_value(config_keys::OPTIMIZATION_PRIORITY)? {
            Some(raw) => OptimizationPriority::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "优化侧重配置非法，使用 balanced");
                OptimizationPriority::Balanced
            }),
            None => defaults.optimization_priority,
        };

        let connector_cap_overrides: HashMap<String, u32> =
            match self.get_config_value(config_keys::CONNECTOR_CAP_OVERRIDES)? {
                Some(raw) => serde_json::from_str(&raw)?,
                None => HashMap::new(),
            };

        let exact_time_budget_ms = match self.get_config_value(config_keys::EXACT_TIME_BUDGET_MS)? {
            Some(raw) if !raw.trim().is_empty() => Some(raw.trim().parse::<u64>()?),
            _ => None,
        };

        let config = AllocationConfig {
            padding_margin_mm: self
                .get_parsed_or(config_keys::PADDING_MARGIN_MM, defaults.padding_margin_mm)?,
            item_spacing_mm: self
                .get_parsed_or(config_keys::ITEM_SPACING_MM, defaults.item_spacing_mm)?,
            rotation_allowed: self
                .get_parsed_or(config_keys::ROTATION_ALLOWED, defaults.rotation_allowed)?,
            optimization_priority,
            connector_cap_overrides,
            exact_time_budget_ms,
            exact_budget_per_item_ms: self.get_parsed_or(
                config_keys::EXACT_BUDGET_PER_ITEM_MS,
                defaults.exact_budget_per_item_ms,
            )?,
            exact_budget_min_ms: self
                .get_parsed_or(config_keys::EXACT_BUDGET_MIN_MS, defaults.exact_budget_min_ms)?,
            exact_budget_max_ms: self
                .get_parsed_or(config_keys::EXACT_BUDGET_MAX_MS, defaults.exact_budget_max_ms)?,
            per_item_bonus: self
                .get_parsed_or(config_keys::PER_ITEM_BONUS, defaults.per_item_bonus)?,
            parallel_candidates: self.get_parsed_or(
                config_keys::PARALLEL_CANDIDATES,
                defaults.parallel_candidates,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// 保存分配参数（逐键写入）
    pub fn save_allocation_config(&self, config: &AllocationConfig) -> Result<(), Box<dyn Error>> {
        config.validate()?;

        let mut entries: Vec<(&str, String)> = vec![
            (config_keys::PADDING_MARGIN_MM, config.padding_margin_mm.to_string()),
            (config_keys::ITEM_SPACING_MM, config.item_spacing_mm.to_string()),
            (config_keys::ROTATION_ALLOWED, config.rotation_allowed.to_string()),
            (
                config_keys::OPTIMIZATION_PRIORITY,
                config.optimization_priority.as_str().to_string(),
            ),
            (
                config_keys::CONNECTOR_CAP_OVERRIDES,
                serde_json::to_string(&config.connector_cap_overrides)?,
            ),
            (
                config_keys::EXACT_BUDGET_PER_ITEM_MS,
                config.exact_budget_per_item_ms.to_string(),
            ),
            (config_keys::EXACT_BUDGET_MIN_MS, config.exact_budget_min_ms.to_string()),
            (config_keys::EXACT_BUDGET_MAX_MS, config.exact_budget_max_ms.to_string()),
            (config_keys::PER_ITEM_BONUS, config.per_item_bonus.to_string()),
            (config_keys::PARALLEL_CANDIDATES, config.parallel_candidates.to_string()),
        ];
        entries.push((
            config_keys::EXACT_TIME_BUDGET_MS,
            config
                .exact_time_budget_ms
                .map(|v| v.to_string())
                .unwrap_or_default(),
        ));

        let mut conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let tx = conn.transaction()?;
        for (key, value) in entries {
            tx.execute(
                "INSERT INTO config_kv (scope_id, key, value, updated_at)
                 VALUES ('global', ?1, ?2, datetime('now'))
                 ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
                params![key, value],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// 获取所有配置的快照（JSON格式）
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        let json_value = json!(config_map);
        Ok(serde_json::to_string(&json_value)?)
    }

    /// 从配置快照恢复配置
    ///
    /// # 注意
    /// - 此方法会覆盖现有的 global 配置
    pub fn restore_config_from_snapshot(&self, snapshot_json: &str) -> Result<usize, Box<dyn Error>> {
        let config_map: HashMap<String, String> = serde_json::from_str(snapshot_json)?;

        let mut conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let tx = conn.transaction()?;

        let mut count = 0;
        for (key, value) in config_map.iter() {
            if key.starts_with("__meta_") {
                continue;
            }
            let affected = tx.execute(
                "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
                 ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2",
                params![key, value],
            )?;
            count += affected;
        }

        tx.commit()?;
        Ok(count)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 几何
    pub const PADDING_MARGIN_MM: &str = "padding_margin_mm";
    pub const ITEM_SPACING_MM: &str = "item_spacing_mm";
    pub const ROTATION_ALLOWED: &str = "rotation_allowed";

    // 选罐
    pub const OPTIMIZATION_PRIORITY: &str = "optimization_priority";
    pub const CONNECTOR_CAP_OVERRIDES: &str = "connector_cap_overrides"; // JSON: {"V1": 6}
    pub const PER_ITEM_BONUS: &str = "per_item_bonus";
    pub const PARALLEL_CANDIDATES: &str = "parallel_candidates";

    // 精确求解预算
    pub const EXACT_TIME_BUDGET_MS: &str = "exact_time_budget_ms";
    pub const EXACT_BUDGET_PER_ITEM_MS: &str = "exact_budget_per_item_ms";
    pub const EXACT_BUDGET_MIN_MS: &str = "exact_budget_min_ms";
    pub const EXACT_BUDGET_MAX_MS: &str = "exact_budget_max_ms";
}
