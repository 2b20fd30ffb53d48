// ==========================================
// 固化罐装载分配系统 - 分配参数
// ==========================================
// 存储位置: config_kv（scope_id='global'），缺省键使用默认值
// 每个方案落库时附带一份 JSON 快照
// ==========================================

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// 默认四周留边 (mm)
pub const DEFAULT_PADDING_MARGIN_MM: f64 = 15.0;
/// 默认工装间距 (mm)
pub const DEFAULT_ITEM_SPACING_MM: f64 = 10.0;
/// 精确求解单件预算 (ms)
pub const DEFAULT_EXACT_BUDGET_PER_ITEM_MS: u64 = 3_000;
pub const DEFAULT_EXACT_BUDGET_MIN_MS: u64 = 1_000;
pub const DEFAULT_EXACT_BUDGET_MAX_MS: u64 = 30_000;
/// 选罐评分中每个入罐工单的加分
pub const DEFAULT_PER_ITEM_BONUS: f64 = 0.05;
/// 每组并行试排的候选罐数量
pub const DEFAULT_PARALLEL_CANDIDATES: usize = 3;

// ==========================================
// OptimizationPriority - 优化侧重
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationPriority {
    Area,
    Weight,
    #[default]
    Balanced,
}

impl OptimizationPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationPriority::Area => "area",
            OptimizationPriority::Weight => "weight",
            OptimizationPriority::Balanced => "balanced",
        }
    }

    /// 评分权重 (面积, 接口, 重量)
    pub fn weights(&self) -> ScoreWeights {
        match self {
            OptimizationPriority::Area => ScoreWeights {
                area: 0.6,
                connector: 0.2,
                weight: 0.2,
            },
            OptimizationPriority::Weight => ScoreWeights {
                area: 0.2,
                connector: 0.2,
                weight: 0.6,
            },
            OptimizationPriority::Balanced => ScoreWeights {
                area: 1.0 / 3.0,
                connector: 1.0 / 3.0,
                weight: 1.0 / 3.0,
            },
        }
    }
}

impl std::str::FromStr for OptimizationPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "area" => Ok(OptimizationPriority::Area),
            "weight" => Ok(OptimizationPriority::Weight),
            "balanced" => Ok(OptimizationPriority::Balanced),
            other => Err(format!("未知优化侧重: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub area: f64,
    pub connector: f64,
    pub weight: f64,
}

// ==========================================
// AllocationConfig - 单次运行参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationConfig {
    /// 工装与罐壁的留边
    #[serde(default = "default_padding")]
    pub padding_margin_mm: f64,

    /// 同层工装之间的最小间距
    #[serde(default = "default_spacing")]
    pub item_spacing_mm: f64,

    /// 是否允许 90° 旋转（还需工装本身允许）
    #[serde(default = "default_true")]
    pub rotation_allowed: bool,

    #[serde(default)]
    pub optimization_priority: OptimizationPriority,

    /// 按罐覆写真空接口上限
    #[serde(default)]
    pub connector_cap_overrides: HashMap<String, u32>,

    /// 精确求解预算覆写 (ms)，为空时按批量大小缩放
    #[serde(default)]
    pub exact_time_budget_ms: Option<u64>,

    #[serde(default = "default_budget_per_item")]
    pub exact_budget_per_item_ms: u64,

    #[serde(default = "default_budget_min")]
    pub exact_budget_min_ms: u64,

    #[serde(default = "default_budget_max")]
    pub exact_budget_max_ms: u64,

    #[serde(default = "default_per_item_bonus")]
    pub per_item_bonus: f64,

    #[serde(default = "default_parallel_candidates")]
    pub parallel_candidates: usize,
}

fn default_padding() -> f64 {
    DEFAULT_PADDING_MARGIN_MM
}

fn default_spacing() -> f64 {
    DEFAULT_ITEM_SPACING_MM
}

fn default_true() -> bool {
    true
}

fn default_budget_per_item() -> u64 {
    DEFAULT_EXACT_BUDGET_PER_ITEM_MS
}

fn default_budget_min() -> u64 {
    DEFAULT_EXACT_BUDGET_MIN_MS
}

fn default_budget_max() -> u64 {
    DEFAULT_EXACT_BUDGET_MAX_MS
}

fn default_per_item_bonus() -> f64 {
    DEFAULT_PER_ITEM_BONUS
}

fn default_parallel_candidates() -> usize {
    DEFAULT_PARALLEL_CANDIDATES
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            padding_margin_mm: DEFAULT_PADDING_MARGIN_MM,
            item_spacing_mm: DEFAULT_ITEM_SPACING_MM,
            rotation_allowed: true,
            optimization_priority: OptimizationPriority::Balanced,
            connector_cap_overrides: HashMap::new(),
            exact_time_budget_ms: None,
            exact_budget_per_item_ms: DEFAULT_EXACT_BUDGET_PER_ITEM_MS,
            exact_budget_min_ms: DEFAULT_EXACT_BUDGET_MIN_MS,
            exact_budget_max_ms: DEFAULT_EXACT_BUDGET_MAX_MS,
            per_item_bonus: DEFAULT_PER_ITEM_BONUS,
            parallel_candidates: DEFAULT_PARALLEL_CANDIDATES,
        }
    }
}

impl AllocationConfig {
    /// 精确求解预算：显式覆写优先，否则按件数缩放并夹在 [min, max]
    pub fn exact_budget_for(&self, item_count: usize) -> Duration {
        if let Some(ms) = self.exact_time_budget_ms {
            return Duration::from_millis(ms);
        }
        let scaled = self
            .exact_budget_per_item_ms
            .saturating_mul(item_count as u64)
            .clamp(self.exact_budget_min_ms, self.exact_budget_max_ms.max(self.exact_budget_min_ms));
        Duration::from_millis(scaled)
    }

    /// 某罐生效的真空接口上限
    pub fn connector_cap_for(&self, vessel_id: &str, catalog_capacity: u32) -> u32 {
        self.connector_cap_overrides
            .get(vessel_id)
            .copied()
            .unwrap_or(catalog_capacity)
    }

    /// 参数合法性校验，返回首个问题描述
    pub fn validate(&self) -> Result<(), String> {
        if !self.padding_margin_mm.is_finite() || self.padding_margin_mm < 0.0 {
            return Err(format!("padding_margin_mm 非法: {}", self.padding_margin_mm));
        }
        if !self.item_spacing_mm.is_finite() || self.item_spacing_mm < 0.0 {
            return Err(format!("item_spacing_mm 非法: {}", self.item_spacing_mm));
        }
        if self.exact_time_budget_ms == Some(0) {
            return Err("exact_time_budget_ms 不能为 0".to_string());
        }
        if self.exact_budget_max_ms == 0 {
            return Err("exact_budget_max_ms 不能为 0".to_string());
        }
        if self.parallel_candidates == 0 {
            return Err("parallel_candidates 至少为 1".to_string());
        }
        if !self.per_item_bonus.is_finite() || self.per_item_bonus < 0.0 {
            return Err(format!("per_item_bonus 非法: {}", self.per_item_bonus));
        }
        Ok(())
    }

    pub fn to_snapshot_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
