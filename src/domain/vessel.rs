// ==========================================
// 固化罐装载分配系统 - 固化罐领域模型
// ==========================================
// 罐面为固定矩形；部分罐带第二层支架
// 状态只由生命周期管理器修改（故障/维护为外部输入）
// ==========================================

use crate::domain::types::VesselStatus;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// ElevatedLevel - 支架层参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElevatedLevel {
    pub support_height_mm: f64,
    pub max_supports: u32,
    pub per_support_weight_kg: f64, // 单个支架承重
    pub clearance_mm: f64,          // 支架层四周净空
}

// ==========================================
// Vessel - 固化罐
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vessel {
    pub vessel_id: String,
    pub name: String,
    pub usable_width_mm: f64,
    pub usable_length_mm: f64,
    pub weight_limit_kg: f64,
    pub connector_capacity: u32,
    pub elevated: Option<ElevatedLevel>,
    pub status: VesselStatus,
    pub revision: i64,
    pub updated_at: NaiveDateTime,
}

impl Vessel {
    /// 单层可用面积 (mm²)
    pub fn base_area_mm2(&self) -> f64 {
        self.usable_width_mm * self.usable_length_mm
    }

    /// 支架层面积（与罐底同尺寸；无支架层为 0）
    pub fn elevated_area_mm2(&self) -> f64 {
        if self.elevated.is_some() {
            self.base_area_mm2()
        } else {
            0.0
        }
    }

    pub fn total_area_mm2(&self) -> f64 {
        self.base_area_mm2() + self.elevated_area_mm2()
    }

    pub fn has_elevated_level(&self) -> bool {
        self.elevated.is_some()
    }

    /// 支架层最大承重（全部支架投入使用时）
    pub fn elevated_weight_ceiling_kg(&self) -> f64 {
        self.elevated
            .as_ref()
            .map(|e| e.per_support_weight_kg * e.max_supports as f64)
            .unwrap_or(0.0)
    }
}
