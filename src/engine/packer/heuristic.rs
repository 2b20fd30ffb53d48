// ==========================================
// 固化罐装载分配系统 - 货架式启发排布
// ==========================================
// 面积降序逐件摆放: 最低 y、其次最低 x；先不旋转后旋转
// 罐底放不下时尝试支架层
// 对固定输入与参数完全确定
// ==========================================

use super::geometry::{Layout, Mm, PackItem, PackState, Rect, Surface};
use crate::domain::types::{ExclusionReason, Level};
use std::collections::HashMap;

/// 启发式结果
#[derive(Debug, Clone)]
pub(crate) struct HeuristicResult {
    pub state: PackState,
    pub reasons: HashMap<usize, ExclusionReason>, // 排序后序号 → 原因
}

/// 按输入顺序（调用方已按面积降序排好）逐件摆放
pub(crate) fn pack(layout: &Layout, items: &[PackItem]) -> HeuristicResult {
    let mut state = PackState::default();
    let mut reasons = HashMap::new();

    for (idx, item) in items.iter().enumerate() {
        // 先查累计重量 / 接口，再尝试摆放
        if let Err(reason) = state.admits(layout, item) {
            reasons.insert(idx, reason);
            continue;
        }

        let mut last_reason = ExclusionReason::InsufficientSpace;
        let mut placed = false;
        for surface in &layout.surfaces {
            if let Err(reason) = state.admits_on(layout, item, surface.level) {
                last_reason = reason;
                continue;
            }
            if let Some(rect) = lowest_position(layout, surface, &state, idx, item) {
                state.push(rect, item);
                placed = true;
                break;
            }
            // 几何放不下时以空间原因为准，除非支架层承重另有原因
            if surface.level == Level::Base {
                last_reason = ExclusionReason::InsufficientSpace;
            }
        }

        if !placed {
            reasons.insert(idx, last_reason);
        }
    }

    HeuristicResult { state, reasons }
}

/// 某朝向下最低 y、其次最低 x 的可行位置；不旋转优先
fn lowest_position(
    layout: &Layout,
    surface: &Surface,
    state: &PackState,
    idx: usize,
    item: &PackItem,
) -> Option<Rect> {
    let (xs, ys) = candidate_coordinates(layout, surface, state);

    for &rotated in item.orientations() {
        let (w, h) = item.extent(rotated);
        for &y in &ys {
            for &x in &xs {
                let rect = Rect {
                    item: idx,
                    level: surface.level,
                    x,
                    y,
                    w,
                    h,
                    rotated,
                };
                if state.fits(layout, surface, &rect) {
                    return Some(rect);
                }
            }
        }
    }
    None
}

/// 候选坐标: 留边角点 + 已摆放件的右侧/上侧外沿（加间隙）
fn candidate_coordinates(layout: &Layout, surface: &Surface, state: &PackState) -> (Vec<Mm>, Vec<Mm>) {
    let mut xs = vec![surface.x_min];
    let mut ys = vec![surface.y_min];
    for r in state.rects.iter().filter(|r| r.level == surface.level) {
        xs.push(r.x + r.w + layout.gap);
        ys.push(r.y + r.h + layout.gap);
    }
    xs.sort_unstable();
    xs.dedup();
    ys.sort_unstable();
    ys.dedup();
    (xs, ys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AllocationConfig;
    use crate::domain::types::VesselStatus;
    use crate::domain::vessel::{ElevatedLevel, Vessel};
    use chrono::Local;

    fn layout(width: f64, length: f64, elevated: Option<ElevatedLevel>) -> Layout {
        let vessel = Vessel {
            vessel_id: "V1".into(),
            name: "AC-1".into(),
            usable_width_mm: width,
            usable_length_mm: length,
            weight_limit_kg: 500.0,
            connector_capacity: 8,
            elevated,
            status: VesselStatus::Available,
            revision: 0,
            updated_at: Local::now().naive_local(),
        };
        Layout::for_vessel(&vessel, &AllocationConfig::default())
    }

    fn item(index: usize, w: Mm, h: Mm, weight_kg: f64, connectors: u32) -> PackItem {
        PackItem {
            index,
            wo_id: format!("WO-{}", index),
            w,
            h,
            width_mm: w as f64,
            height_mm: h as f64,
            rotatable: w != h,
            weight_kg,
            connectors,
            area_mm2: (w * h) as f64,
        }
    }

    #[test]
    fn test_shelf_fills_bottom_row_first() {
        let layout = layout(1000.0, 1000.0, None);
        let items: Vec<_> = (0..3).map(|i| item(i, 300, 300, 50.0, 2)).collect();
        let result = pack(&layout, &items);

        assert!(result.reasons.is_empty());
        let positions: Vec<_> = result.state.rects.iter().map(|r| (r.x, r.y)).collect();
        assert_eq!(positions, vec![(15, 15), (330, 15), (645, 15)]);
    }

    #[test]
    fn test_running_totals_checked_before_placement() {
        let layout = layout(2000.0, 2000.0, None);
        let items = vec![
            item(0, 300, 300, 300.0, 2),
            item(1, 200, 200, 300.0, 2),
            item(2, 100, 100, 50.0, 7),
        ];
        let result = pack(&layout, &items);

        assert_eq!(result.state.count(), 1);
        assert_eq!(result.reasons.get(&1), Some(&ExclusionReason::Overweight));
        assert_eq!(result.reasons.get(&2), Some(&ExclusionReason::ConnectorOverflow));
    }

    #[test]
    fn test_rotates_when_unrotated_does_not_fit() {
        // 内宽 470，内长 970
        let layout = layout(500.0, 1000.0, None);
        let items = vec![item(0, 900, 400, 10.0, 1)];
        let result = pack(&layout, &items);

        let rect = result.state.rects[0];
        assert!(rect.rotated);
        assert_eq!((rect.w, rect.h), (400, 900));
    }

    #[test]
    fn test_overflow_goes_to_elevated_level_then_insufficient_space() {
        let elevated = ElevatedLevel {
            support_height_mm: 400.0,
            max_supports: 1,
            per_support_weight_kg: 100.0,
            clearance_mm: 15.0,
        };
        let layout = layout(400.0, 400.0, Some(elevated));
        let items: Vec<_> = (0..3).map(|i| item(i, 300, 300, 20.0, 1)).collect();
        let result = pack(&layout, &items);

        let levels: Vec<_> = result.state.rects.iter().map(|r| r.level).collect();
        assert_eq!(levels, vec![Level::Base, Level::Elevated]);
        assert_eq!(result.reasons.get(&2), Some(&ExclusionReason::InsufficientSpace));
    }

    #[test]
    fn test_is_deterministic() {
        let layout = layout(1200.0, 900.0, None);
        let items = vec![
            item(0, 500, 300, 20.0, 1),
            item(1, 400, 300, 20.0, 1),
            item(2, 300, 250, 20.0, 1),
            item(3, 200, 200, 20.0, 1),
        ];
        let a = pack(&layout, &items);
        let b = pack(&layout, &items);
        assert_eq!(a.state.rects, b.state.rects);
    }
}
