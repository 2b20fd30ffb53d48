// ==========================================
// 固化罐装载分配系统 - 排布几何与容量状态
// ==========================================
// 内部统一使用整数毫米: 工装尺寸向上取整、罐面尺寸向下取整
// 两层共用同一套不相交/容量校验（支架层是第三个坐标）
// ==========================================

use crate::config::AllocationConfig;
use crate::domain::allocation::{AllocationMetrics, LevelMetrics, Placement};
use crate::domain::types::{ExclusionReason, Level};
use crate::domain::vessel::Vessel;
use crate::domain::work_order::WorkOrder;

pub(crate) type Mm = i64;

const WEIGHT_EPS: f64 = 1e-9;

fn ceil_mm(v: f64) -> Mm {
    v.ceil() as Mm
}

fn floor_mm(v: f64) -> Mm {
    v.floor() as Mm
}

// ==========================================
// Surface - 单层可摆放区域（已扣除留边）
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Surface {
    pub level: Level,
    pub x_min: Mm,
    pub y_min: Mm,
    pub x_max: Mm,
    pub y_max: Mm,
    pub area_mm2: f64, // 罐面原始面积，用于归一化
}

impl Surface {
    fn new(level: Level, width: Mm, length: Mm, margin: Mm, area_mm2: f64) -> Self {
        Self {
            level,
            x_min: margin,
            y_min: margin,
            x_max: width - margin,
            y_max: length - margin,
            area_mm2,
        }
    }

    pub fn inner_width(&self) -> Mm {
        (self.x_max - self.x_min).max(0)
    }

    pub fn inner_length(&self) -> Mm {
        (self.y_max - self.y_min).max(0)
    }

    pub fn contains(&self, x: Mm, y: Mm, w: Mm, h: Mm) -> bool {
        x >= self.x_min && y >= self.y_min && x + w <= self.x_max && y + h <= self.y_max
    }
}

// ==========================================
// Layout - 一次试排的罐面与容量约束
// ==========================================
#[derive(Debug, Clone)]
pub(crate) struct Layout {
    pub surfaces: Vec<Surface>, // 罐底在前
    pub gap: Mm,
    pub weight_limit_kg: f64,
    pub connector_cap: u32,
    pub max_supports: u32,
    pub per_support_weight_kg: f64,
}

impl Layout {
    pub fn for_vessel(vessel: &Vessel, config: &AllocationConfig) -> Self {
        let width = floor_mm(vessel.usable_width_mm);
        let length = floor_mm(vessel.usable_length_mm);
        let margin = ceil_mm(config.padding_margin_mm.max(0.0));
        let base_area = vessel.base_area_mm2();

        let mut surfaces = vec![Surface::new(Level::Base, width, length, margin, base_area)];
        let (max_supports, per_support_weight_kg) = match &vessel.elevated {
            Some(elevated) => {
                let elevated_margin =
                    ceil_mm(config.padding_margin_mm.max(elevated.clearance_mm).max(0.0));
                surfaces.push(Surface::new(
                    Level::Elevated,
                    width,
                    length,
                    elevated_margin,
                    vessel.elevated_area_mm2(),
                ));
                (elevated.max_supports, elevated.per_support_weight_kg)
            }
            None => (0, 0.0),
        };

        Self {
            surfaces,
            // 同层工装间隙同时满足留边与间距
            gap: ceil_mm(config.padding_margin_mm.max(config.item_spacing_mm).max(0.0)),
            weight_limit_kg: vessel.weight_limit_kg,
            connector_cap: config.connector_cap_for(&vessel.vessel_id, vessel.connector_capacity),
            max_supports,
            per_support_weight_kg,
        }
    }

    pub fn surface(&self, level: Level) -> Option<&Surface> {
        self.surfaces.iter().find(|s| s.level == level)
    }

    /// 单件在任一层、任一允许朝向下是否放得下
    pub fn fits_dimensions(&self, item: &PackItem) -> bool {
        self.surfaces.iter().any(|s| {
            item.orientations().iter().any(|&rotated| {
                let (w, h) = item.extent(rotated);
                w <= s.inner_width() && h <= s.inner_length()
            })
        })
    }
}

// ==========================================
// PackItem - 待排工装
// ==========================================
#[derive(Debug, Clone)]
pub(crate) struct PackItem {
    pub index: usize, // 在请求中的原始序号
    pub wo_id: String,
    pub w: Mm,
    pub h: Mm,
    pub width_mm: f64,
    pub height_mm: f64,
    pub rotatable: bool,
    pub weight_kg: f64,
    pub connectors: u32,
    pub area_mm2: f64,
}

impl PackItem {
    /// 外形缺失返回 None
    pub fn from_work_order(index: usize, wo: &WorkOrder, config: &AllocationConfig) -> Option<Self> {
        let fp = wo.footprint.as_ref()?;
        let w = ceil_mm(fp.width_mm);
        let h = ceil_mm(fp.height_mm);
        Some(Self {
            index,
            wo_id: wo.wo_id.clone(),
            w,
            h,
            width_mm: fp.width_mm,
            height_mm: fp.height_mm,
            // 正方形旋转无意义
            rotatable: config.rotation_allowed && fp.rotation_allowed && w != h,
            weight_kg: fp.weight_kg,
            connectors: fp.connector_count,
            area_mm2: fp.area_mm2(),
        })
    }

    pub fn extent(&self, rotated: bool) -> (Mm, Mm) {
        if rotated {
            (self.h, self.w)
        } else {
            (self.w, self.h)
        }
    }

    pub fn orientations(&self) -> &'static [bool] {
        if self.rotatable {
            &[false, true]
        } else {
            &[false]
        }
    }

    /// 尺寸、重量、接口完全相同（用于对称性剪枝）
    pub fn is_twin_of(&self, other: &PackItem) -> bool {
        self.w == other.w
            && self.h == other.h
            && self.rotatable == other.rotatable
            && self.connectors == other.connectors
            && (self.weight_kg - other.weight_kg).abs() <= WEIGHT_EPS
    }
}

// ==========================================
// Rect - 已摆放矩形
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Rect {
    pub item: usize, // 排序后的序号
    pub level: Level,
    pub x: Mm,
    pub y: Mm,
    pub w: Mm,
    pub h: Mm,
    pub rotated: bool,
}

impl Rect {
    /// 同层且间隙小于 gap 即冲突
    pub fn conflicts(&self, other: &Rect, gap: Mm) -> bool {
        self.level == other.level
            && self.x < other.x + other.w + gap
            && other.x < self.x + self.w + gap
            && self.y < other.y + other.h + gap
            && other.y < self.y + self.h + gap
    }

    /// 左下优先的排序键
    pub fn order_key(&self) -> (u8, Mm, Mm) {
        (self.level.index(), self.y, self.x)
    }
}

// ==========================================
// PackState - 试排过程中的占用状态
// ==========================================
#[derive(Debug, Clone, Default)]
pub(crate) struct PackState {
    pub rects: Vec<Rect>,
    pub weight_kg: f64,
    pub connectors: u32,
    pub elevated_weight_kg: f64,
    pub supports_in_use: u32,
}

impl PackState {
    pub fn count(&self) -> usize {
        self.rects.len()
    }

    /// 整罐重量 / 接口校验
    pub fn admits(&self, layout: &Layout, item: &PackItem) -> Result<(), ExclusionReason> {
        if self.weight_kg + item.weight_kg > layout.weight_limit_kg + WEIGHT_EPS {
            return Err(ExclusionReason::Overweight);
        }
        if self.connectors + item.connectors > layout.connector_cap {
            return Err(ExclusionReason::ConnectorOverflow);
        }
        Ok(())
    }

    /// 支架层校验: 每件占一个支架，承重 = 单支架承重 × 在用支架数
    pub fn admits_on(&self, layout: &Layout, item: &PackItem, level: Level) -> Result<(), ExclusionReason> {
        if level == Level::Base {
            return Ok(());
        }
        if self.supports_in_use + 1 > layout.max_supports {
            return Err(ExclusionReason::InsufficientSpace);
        }
        let ceiling = layout.per_support_weight_kg * (self.supports_in_use + 1) as f64;
        if self.elevated_weight_kg + item.weight_kg > ceiling + WEIGHT_EPS {
            return Err(ExclusionReason::Overweight);
        }
        Ok(())
    }

    /// 在界内且与同层已摆放矩形保持间隙
    pub fn fits(&self, layout: &Layout, surface: &Surface, rect: &Rect) -> bool {
        surface.contains(rect.x, rect.y, rect.w, rect.h)
            && !self.rects.iter().any(|r| r.conflicts(rect, layout.gap))
    }

    pub fn push(&mut self, rect: Rect, item: &PackItem) {
        self.weight_kg += item.weight_kg;
        self.connectors += item.connectors;
        if rect.level == Level::Elevated {
            self.elevated_weight_kg += item.weight_kg;
            self.supports_in_use += 1;
        }
        self.rects.push(rect);
    }

    pub fn pop(&mut self, item: &PackItem) -> Option<Rect> {
        let rect = self.rects.pop()?;
        self.weight_kg -= item.weight_kg;
        self.connectors -= item.connectors;
        if rect.level == Level::Elevated {
            self.elevated_weight_kg -= item.weight_kg;
            self.supports_in_use -= 1;
        }
        Some(rect)
    }

    pub fn rect_of(&self, item: usize) -> Option<&Rect> {
        self.rects.iter().find(|r| r.item == item)
    }

    /// 各层包络矩形面积 / 罐面面积 之和（随摆放单调不减）
    pub fn extent_penalty(&self, layout: &Layout) -> f64 {
        layout
            .surfaces
            .iter()
            .map(|s| {
                let mut x_end = None;
                let mut y_end = None;
                for r in self.rects.iter().filter(|r| r.level == s.level) {
                    x_end = Some(x_end.map_or(r.x + r.w, |v: Mm| v.max(r.x + r.w)));
                    y_end = Some(y_end.map_or(r.y + r.h, |v: Mm| v.max(r.y + r.h)));
                }
                match (x_end, y_end) {
                    (Some(xe), Some(ye)) if s.area_mm2 > 0.0 => {
                        ((xe - s.x_min) * (ye - s.y_min)) as f64 / s.area_mm2
                    }
                    _ => 0.0,
                }
            })
            .sum()
    }

    /// 未入罐工单的原因（相对于最终状态）
    ///
    /// 罐底已无空位而支架层还有空位时，以支架层承重校验的结果为准
    pub fn reason_for_unplaced(&self, layout: &Layout, item: &PackItem) -> ExclusionReason {
        if let Err(reason) = self.admits(layout, item) {
            return reason;
        }
        if let Some(elevated) = layout.surface(Level::Elevated) {
            let base_full = layout
                .surface(Level::Base)
                .map_or(true, |base| !self.has_room(layout, base, item));
            if base_full && self.has_room(layout, elevated, item) {
                if let Err(reason) = self.admits_on(layout, item, Level::Elevated) {
                    return reason;
                }
            }
        }
        ExclusionReason::InsufficientSpace
    }

    /// 该层是否还有容纳此件的位置
    ///
    /// 候选坐标取层边界与已摆放矩形右/上边缘加间隙
    fn has_room(&self, layout: &Layout, surface: &Surface, item: &PackItem) -> bool {
        let on_level: Vec<&Rect> = self.rects.iter().filter(|r| r.level == surface.level).collect();
        let xs: Vec<Mm> = std::iter::once(surface.x_min)
            .chain(on_level.iter().map(|r| r.x + r.w + layout.gap))
            .collect();
        let ys: Vec<Mm> = std::iter::once(surface.y_min)
            .chain(on_level.iter().map(|r| r.y + r.h + layout.gap))
            .collect();

        item.orientations().iter().any(|&rotated| {
            let (w, h) = item.extent(rotated);
            xs.iter().any(|&x| {
                ys.iter().any(|&y| {
                    let rect = Rect { item: item.index, level: surface.level, x, y, w, h, rotated };
                    self.fits(layout, surface, &rect)
                })
            })
        })
    }
}

/// 目标值: 入罐数量优先，其次包络面积更小
pub(crate) fn objective(count: usize, penalty: f64) -> f64 {
    count as f64 * 1000.0 - penalty
}

/// Rect → Placement（坐标为整数毫米，宽长为工装实际尺寸）
pub(crate) fn to_placement(rect: &Rect, item: &PackItem) -> Placement {
    let (width_mm, height_mm) = if rect.rotated {
        (item.height_mm, item.width_mm)
    } else {
        (item.width_mm, item.height_mm)
    };
    Placement {
        wo_id: item.wo_id.clone(),
        level: rect.level,
        x_mm: rect.x as f64,
        y_mm: rect.y as f64,
        width_mm,
        height_mm,
        rotated: rect.rotated,
    }
}

/// 汇总方案指标
pub(crate) fn build_metrics(
    vessel: &Vessel,
    layout: &Layout,
    state: &PackState,
    items: &[PackItem],
) -> AllocationMetrics {
    let levels = layout
        .surfaces
        .iter()
        .map(|s| {
            let mut m = LevelMetrics::empty(s.level, s.area_mm2);
            for r in state.rects.iter().filter(|r| r.level == s.level) {
                let item = &items[r.item];
                m.area_used_mm2 += item.area_mm2;
                m.weight_kg += item.weight_kg;
                m.connectors += item.connectors;
                m.item_count += 1;
            }
            if s.level == Level::Elevated {
                m.supports_in_use = m.item_count as u32;
            }
            m
        })
        .collect();

    AllocationMetrics {
        levels,
        weight_used_kg: state.weight_kg,
        weight_limit_kg: vessel.weight_limit_kg,
        connectors_used: state.connectors,
        connector_capacity: layout.connector_cap,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::VesselStatus;
    use crate::domain::vessel::ElevatedLevel;
    use chrono::Local;

    fn vessel(elevated: bool) -> Vessel {
        Vessel {
            vessel_id: "V1".into(),
            name: "AC-1".into(),
            usable_width_mm: 1000.0,
            usable_length_mm: 800.0,
            weight_limit_kg: 500.0,
            connector_capacity: 8,
            elevated: elevated.then(|| ElevatedLevel {
                support_height_mm: 400.0,
                max_supports: 2,
                per_support_weight_kg: 40.0,
                clearance_mm: 30.0,
            }),
            status: VesselStatus::Available,
            revision: 0,
            updated_at: Local::now().naive_local(),
        }
    }

    fn item(index: usize, w: Mm, h: Mm, weight_kg: f64) -> PackItem {
        PackItem {
            index,
            wo_id: format!("WO-{}", index),
            w,
            h,
            width_mm: w as f64,
            height_mm: h as f64,
            rotatable: true,
            weight_kg,
            connectors: 1,
            area_mm2: (w * h) as f64,
        }
    }

    #[test]
    fn test_layout_margins_and_gap() {
        let layout = Layout::for_vessel(&vessel(true), &AllocationConfig::default());
        let base = layout.surface(Level::Base).unwrap();
        assert_eq!((base.x_min, base.x_max, base.y_max), (15, 985, 785));
        // 支架层留边取 max(padding, clearance)
        let elevated = layout.surface(Level::Elevated).unwrap();
        assert_eq!((elevated.x_min, elevated.x_max), (30, 970));
        assert_eq!(layout.gap, 15);
    }

    #[test]
    fn test_conflict_respects_gap_and_level() {
        let a = Rect { item: 0, level: Level::Base, x: 15, y: 15, w: 100, h: 100, rotated: false };
        let touching = Rect { x: 130, ..a };
        let too_close = Rect { x: 129, ..a };
        let other_level = Rect { level: Level::Elevated, ..too_close };
        assert!(!a.conflicts(&touching, 15));
        assert!(a.conflicts(&too_close, 15));
        assert!(!a.conflicts(&other_level, 15));
    }

    #[test]
    fn test_elevated_weight_is_per_support() {
        let layout = Layout::for_vessel(&vessel(true), &AllocationConfig::default());
        let mut state = PackState::default();
        let light = item(0, 100, 100, 30.0);
        let heavy = item(1, 100, 100, 55.0);

        assert!(state.admits_on(&layout, &light, Level::Elevated).is_ok());
        assert_eq!(
            state.admits_on(&layout, &heavy, Level::Elevated),
            Err(ExclusionReason::Overweight)
        );

        let rect = Rect { item: 0, level: Level::Elevated, x: 30, y: 30, w: 100, h: 100, rotated: false };
        state.push(rect, &light);
        // 两个支架共 80kg，已用 30kg
        assert!(state.admits_on(&layout, &item(2, 50, 50, 50.0), Level::Elevated).is_ok());
        state.push(Rect { item: 2, x: 200, ..rect }, &item(2, 50, 50, 50.0));
        assert_eq!(
            state.admits_on(&layout, &item(3, 50, 50, 1.0), Level::Elevated),
            Err(ExclusionReason::InsufficientSpace)
        );
    }

    #[test]
    fn test_unplaced_reason_reports_support_overweight() {
        let layout = Layout::for_vessel(&vessel(true), &AllocationConfig::default());
        let heavy = item(1, 100, 100, 55.0);

        // 罐底仍有空位: 放不下只能是空间不足
        let mut state = PackState::default();
        assert_eq!(state.reason_for_unplaced(&layout, &heavy), ExclusionReason::InsufficientSpace);

        // 罐底占满后，支架层单支架 40kg 托不住 55kg
        let filler = item(0, 970, 770, 100.0);
        state.push(Rect { item: 0, level: Level::Base, x: 15, y: 15, w: 970, h: 770, rotated: false }, &filler);
        assert_eq!(state.reason_for_unplaced(&layout, &heavy), ExclusionReason::Overweight);

        // 整罐重量仍优先
        let too_heavy = item(2, 100, 100, 450.0);
        assert_eq!(state.reason_for_unplaced(&layout, &too_heavy), ExclusionReason::Overweight);
    }

    #[test]
    fn test_extent_penalty_grows_with_items() {
        let layout = Layout::for_vessel(&vessel(false), &AllocationConfig::default());
        let mut state = PackState::default();
        assert_eq!(state.extent_penalty(&layout), 0.0);

        let a = item(0, 200, 100, 10.0);
        state.push(Rect { item: 0, level: Level::Base, x: 15, y: 15, w: 200, h: 100, rotated: false }, &a);
        let p1 = state.extent_penalty(&layout);
        assert!((p1 - 20_000.0 / 800_000.0).abs() < 1e-12);

        let b = item(1, 100, 100, 10.0);
        state.push(Rect { item: 1, level: Level::Base, x: 230, y: 15, w: 100, h: 100, rotated: false }, &b);
        assert!(state.extent_penalty(&layout) > p1);
        state.pop(&b);
        assert_eq!(state.count(), 1);
        assert!((state.weight_kg - 10.0).abs() < 1e-12);
    }
}
