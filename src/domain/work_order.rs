// ==========================================
// 固化罐装载分配系统 - 工单领域模型
// ==========================================
// 工单 → 工装外形 (1) / 固化制度 (1)
// 工单状态只由生命周期管理器或外部车间流转修改
// ==========================================

use crate::domain::types::WorkOrderStatus;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// ToolFootprint - 工装外形
// ==========================================
// 不可变：外形变化应产生新的工装记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFootprint {
    pub width_mm: f64,       // 宽 (mm)
    pub height_mm: f64,      // 长 (mm)，俯视平面内的第二个方向
    pub weight_kg: f64,      // 重量 (kg)
    pub connector_count: u32, // 所需真空接口数
    pub rotation_allowed: bool,
}

impl ToolFootprint {
    /// 俯视面积 (mm²)
    pub fn area_mm2(&self) -> f64 {
        self.width_mm * self.height_mm
    }

    /// 外形尺寸是否有效（有限且为正）
    pub fn has_valid_dimensions(&self) -> bool {
        self.width_mm.is_finite()
            && self.height_mm.is_finite()
            && self.width_mm > 0.0
            && self.height_mm > 0.0
    }

    /// 是否能放进给定的矩形（考虑旋转）
    pub fn fits_within(&self, width_mm: f64, length_mm: f64, rotation_allowed: bool) -> bool {
        let direct = self.width_mm <= width_mm && self.height_mm <= length_mm;
        let rotated = rotation_allowed
            && self.rotation_allowed
            && self.height_mm <= width_mm
            && self.width_mm <= length_mm;
        direct || rotated
    }
}

// ==========================================
// WorkOrder - 工单
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrder {
    pub wo_id: String,
    pub part_ref: String,               // 零件号
    pub footprint: Option<ToolFootprint>, // 缺失视为数据不完整
    pub cure_cycle_id: Option<String>,
    pub priority: i32, // 越大越紧急
    pub status: WorkOrderStatus,
    pub previous_status: Option<WorkOrderStatus>,
    pub revision: i64,
    pub updated_at: NaiveDateTime,
}

impl WorkOrder {
    pub fn area_mm2(&self) -> f64 {
        self.footprint.as_ref().map(|f| f.area_mm2()).unwrap_or(0.0)
    }

    pub fn weight_kg(&self) -> f64 {
        self.footprint.as_ref().map(|f| f.weight_kg).unwrap_or(0.0)
    }

    pub fn connector_count(&self) -> u32 {
        self.footprint.as_ref().map(|f| f.connector_count).unwrap_or(0)
    }
}

// ==========================================
// CureCycle - 固化制度
// ==========================================
// 只被工单引用，不被修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CureStage {
    pub temperature_c: f64,
    pub pressure_bar: f64,
    pub duration_min: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CureCycle {
    pub cycle_id: String,
    pub name: String,
    pub stages: Vec<CureStage>, // 1 或 2 段
}

impl CureCycle {
    pub fn total_duration_min(&self) -> u32 {
        self.stages.iter().map(|s| s.duration_min).sum()
    }

    /// 段数必须为 1 或 2，且各段参数有限
    pub fn is_valid(&self) -> bool {
        (1..=2).contains(&self.stages.len())
            && self.stages.iter().all(|s| {
                s.temperature_c.is_finite() && s.pressure_bar.is_finite() && s.duration_min > 0
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn footprint(w: f64, h: f64, rotation_allowed: bool) -> ToolFootprint {
        ToolFootprint {
            width_mm: w,
            height_mm: h,
            weight_kg: 10.0,
            connector_count: 1,
            rotation_allowed,
        }
    }

    #[test]
    fn test_fits_within_respects_rotation_flag() {
        let fp = footprint(800.0, 300.0, true);
        assert!(fp.fits_within(400.0, 900.0, true));
        assert!(!fp.fits_within(400.0, 900.0, false));

        let locked = footprint(800.0, 300.0, false);
        assert!(!locked.fits_within(400.0, 900.0, true));
    }

    #[test]
    fn test_cure_cycle_stage_count() {
        let stage = CureStage {
            temperature_c: 180.0,
            pressure_bar: 6.0,
            duration_min: 120,
        };
        let mut cycle = CureCycle {
            cycle_id: "C1".into(),
            name: "180C".into(),
            stages: vec![stage.clone(), stage.clone()],
        };
        assert!(cycle.is_valid());
        assert_eq!(cycle.total_duration_min(), 240);

        cycle.stages.push(stage);
        assert!(!cycle.is_valid());
        cycle.stages.clear();
        assert!(!cycle.is_valid());
    }
}
