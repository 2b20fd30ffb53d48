// ==========================================
// 固化罐装载分配系统 - 分配方案领域模型
// ==========================================
// Allocation → Vessel (1) / WorkOrder (N, 经由 Placement)
// 红线: 同一罐上所有未取消方案的工单集合互不相交
// 该结构即对外持久化契约
// ==========================================

use crate::domain::types::{AllocationStatus, ExclusionReason, Level, PackingStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// Placement - 摆放位置
// ==========================================
// 只由几何排布器产生，不做修改；重新排布产生新集合
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub wo_id: String,
    pub level: Level,
    pub x_mm: f64,
    pub y_mm: f64,
    pub width_mm: f64,  // 旋转后的有效宽
    pub height_mm: f64, // 旋转后的有效长
    pub rotated: bool,
}

impl Placement {
    pub fn area_mm2(&self) -> f64 {
        self.width_mm * self.height_mm
    }

    /// 按 padding 外扩后的矩形是否与另一个相交（不同层永不相交）
    pub fn padded_overlaps(&self, other: &Placement, padding_mm: f64) -> bool {
        if self.level != other.level {
            return false;
        }
        let half = padding_mm / 2.0;
        let (ax0, ay0) = (self.x_mm - half, self.y_mm - half);
        let (ax1, ay1) = (self.x_mm + self.width_mm + half, self.y_mm + self.height_mm + half);
        let (bx0, by0) = (other.x_mm - half, other.y_mm - half);
        let (bx1, by1) = (
            other.x_mm + other.width_mm + half,
            other.y_mm + other.height_mm + half,
        );
        ax0 < bx1 && bx0 < ax1 && ay0 < by1 && by0 < ay1
    }
}

// ==========================================
// Exclusion - 排除记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exclusion {
    pub wo_id: String,
    pub reason: ExclusionReason,
}

impl Exclusion {
    pub fn new(wo_id: impl Into<String>, reason: ExclusionReason) -> Self {
        Self {
            wo_id: wo_id.into(),
            reason,
        }
    }
}

// ==========================================
// 方案指标
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelMetrics {
    pub level: Level,
    pub area_used_mm2: f64,
    pub area_total_mm2: f64,
    pub weight_kg: f64,
    pub connectors: u32,
    pub item_count: usize,
    pub supports_in_use: u32, // 仅支架层有意义
}

impl LevelMetrics {
    pub fn empty(level: Level, area_total_mm2: f64) -> Self {
        Self {
            level,
            area_used_mm2: 0.0,
            area_total_mm2,
            weight_kg: 0.0,
            connectors: 0,
            item_count: 0,
            supports_in_use: 0,
        }
    }

    pub fn area_utilization(&self) -> f64 {
        if self.area_total_mm2 <= 0.0 {
            return 0.0;
        }
        self.area_used_mm2 / self.area_total_mm2
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationMetrics {
    pub levels: Vec<LevelMetrics>,
    pub weight_used_kg: f64,
    pub weight_limit_kg: f64,
    pub connectors_used: u32,
    pub connector_capacity: u32,
}

impl AllocationMetrics {
    pub fn level(&self, level: Level) -> Option<&LevelMetrics> {
        self.levels.iter().find(|m| m.level == level)
    }

    pub fn total_area_used_mm2(&self) -> f64 {
        self.levels.iter().map(|m| m.area_used_mm2).sum()
    }

    pub fn total_area_mm2(&self) -> f64 {
        self.levels.iter().map(|m| m.area_total_mm2).sum()
    }

    pub fn weight_utilization(&self) -> f64 {
        if self.weight_limit_kg <= 0.0 {
            return 0.0;
        }
        self.weight_used_kg / self.weight_limit_kg
    }

    pub fn connector_utilization(&self) -> f64 {
        if self.connector_capacity == 0 {
            return 0.0;
        }
        self.connectors_used as f64 / self.connector_capacity as f64
    }
}

// ==========================================
// Allocation - 分配方案
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub allocation_id: String,
    pub vessel_id: String,
    pub cure_cycle_id: String,
    pub status: AllocationStatus,
    pub included_wo_ids: Vec<String>,
    pub excluded: Vec<Exclusion>,
    pub placements: Vec<Placement>, // 有序
    pub metrics: AllocationMetrics,
    pub packing_status: PackingStatus,
    pub confirmed_by: Option<String>,
    pub cancelled_by: Option<String>,
    pub note: Option<String>,
    pub config_snapshot_json: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub confirmed_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub revision: i64,
}

impl Allocation {
    pub fn includes(&self, wo_id: &str) -> bool {
        self.included_wo_ids.iter().any(|id| id == wo_id)
    }

    pub fn included_count(&self) -> usize {
        self.included_wo_ids.len()
    }
}
