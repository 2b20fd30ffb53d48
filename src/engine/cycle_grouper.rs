// ==========================================
// 固化罐装载分配系统 - 固化曲线分组器
// ==========================================
// 输入: 工单池（只接受 AwaitingCure 且数据完整的工单）
// 输出: 固化曲线 id → 工单列表
//   组内排序: 优先级降序 → 外形面积降序 → wo_id 升序
//   组间顺序: 总面积降序 → 曲线 id 升序
// 红线: 纯函数，无副作用，结果确定
// ==========================================

use crate::domain::allocation::Exclusion;
use crate::domain::work_order::WorkOrder;
use crate::engine::validation::CatalogValidator;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use tracing::instrument;

// ==========================================
// CycleGroup - 同曲线批次
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct CycleGroup {
    pub cure_cycle_id: String,
    pub work_orders: Vec<WorkOrder>,
}

impl CycleGroup {
    pub fn total_area_mm2(&self) -> f64 {
        self.work_orders.iter().map(|w| w.area_mm2()).sum()
    }

    pub fn total_weight_kg(&self) -> f64 {
        self.work_orders.iter().map(|w| w.weight_kg()).sum()
    }

    pub fn total_connectors(&self) -> u32 {
        self.work_orders.iter().map(|w| w.connector_count()).sum()
    }

    pub fn len(&self) -> usize {
        self.work_orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.work_orders.is_empty()
    }
}

/// 分组结果
#[derive(Debug, Clone, Default)]
pub struct GroupingResult {
    pub groups: Vec<CycleGroup>, // 已按处理顺序排列
    pub rejected: Vec<Exclusion>,
}

impl GroupingResult {
    /// 以曲线 id 为键的视图
    pub fn as_map(&self) -> BTreeMap<&str, &[WorkOrder]> {
        self.groups
            .iter()
            .map(|g| (g.cure_cycle_id.as_str(), g.work_orders.as_slice()))
            .collect()
    }
}

// ==========================================
// CycleGrouper - 分组引擎
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleGrouper {
    // 无状态引擎
}

impl CycleGrouper {
    pub fn new() -> Self {
        Self {}
    }

    /// 分组
    ///
    /// # 参数
    /// - `work_orders`: 工单池
    /// - `known_cycles`: 已知固化曲线（None 时不校验曲线是否存在）
    #[instrument(skip_all, fields(pool_size = work_orders.len()))]
    pub fn group(
        &self,
        work_orders: Vec<WorkOrder>,
        known_cycles: Option<&HashSet<String>>,
    ) -> GroupingResult {
        let (valid, rejected) = CatalogValidator::partition_work_orders(work_orders, known_cycles);

        let mut by_cycle: BTreeMap<String, Vec<WorkOrder>> = BTreeMap::new();
        for wo in valid {
            // 校验已保证曲线 id 存在
            let cycle_id = wo.cure_cycle_id.as_deref().map(str::trim).unwrap_or_default().to_string();
            by_cycle.entry(cycle_id).or_default().push(wo);
        }

        let mut groups: Vec<CycleGroup> = by_cycle
            .into_iter()
            .map(|(cure_cycle_id, mut work_orders)| {
                work_orders.sort_by(compare_within_group);
                CycleGroup {
                    cure_cycle_id,
                    work_orders,
                }
            })
            .collect();

        groups.sort_by(|a, b| {
            b.total_area_mm2()
                .total_cmp(&a.total_area_mm2())
                .then_with(|| a.cure_cycle_id.cmp(&b.cure_cycle_id))
        });

        tracing::debug!(
            groups = groups.len(),
            rejected = rejected.len(),
            "工单分组完成"
        );
        GroupingResult { groups, rejected }
    }
}

/// 组内排序: 优先级降序 → 面积降序 → wo_id 升序
pub fn compare_within_group(a: &WorkOrder, b: &WorkOrder) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| b.area_mm2().total_cmp(&a.area_mm2()))
        .then_with(|| a.wo_id.cmp(&b.wo_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{ExclusionReason, WorkOrderStatus};
    use crate::domain::work_order::ToolFootprint;
    use chrono::Local;

    fn wo(id: &str, cycle: &str, priority: i32, w: f64, h: f64) -> WorkOrder {
        WorkOrder {
            wo_id: id.into(),
            part_ref: "P".into(),
            footprint: Some(ToolFootprint {
                width_mm: w,
                height_mm: h,
                weight_kg: 10.0,
                connector_count: 1,
                rotation_allowed: true,
            }),
            cure_cycle_id: Some(cycle.into()),
            priority,
            status: WorkOrderStatus::AwaitingCure,
            previous_status: None,
            revision: 0,
            updated_at: Local::now().naive_local(),
        }
    }

    #[test]
    fn test_group_ordering_is_deterministic() {
        let pool = vec![
            wo("WO-3", "C1", 1, 100.0, 100.0),
            wo("WO-1", "C1", 5, 100.0, 100.0),
            wo("WO-2", "C1", 1, 200.0, 100.0),
            wo("WO-4", "C1", 1, 100.0, 100.0),
            wo("WO-9", "C2", 0, 900.0, 900.0),
        ];
        let result = CycleGrouper::new().group(pool, None);

        assert!(result.rejected.is_empty());
        // C2 总面积更大，排在前面
        let cycles: Vec<_> = result.groups.iter().map(|g| g.cure_cycle_id.as_str()).collect();
        assert_eq!(cycles, vec!["C2", "C1"]);

        let c1: Vec<_> = result.groups[1].work_orders.iter().map(|w| w.wo_id.as_str()).collect();
        assert_eq!(c1, vec!["WO-1", "WO-2", "WO-3", "WO-4"]);
        assert_eq!(result.as_map().len(), 2);
    }

    #[test]
    fn test_invalid_orders_are_rejected_not_grouped() {
        let mut missing = wo("WO-X", "C1", 0, 100.0, 100.0);
        missing.footprint = None;
        let mut no_cycle = wo("WO-Y", "C1", 0, 100.0, 100.0);
        no_cycle.cure_cycle_id = None;

        let result = CycleGrouper::new().group(vec![missing, no_cycle, wo("WO-1", "C1", 0, 10.0, 10.0)], None);

        assert_eq!(result.groups.len(), 1);
        assert_eq!(result.groups[0].len(), 1);
        assert_eq!(result.rejected.len(), 2);
        assert!(result
            .rejected
            .iter()
            .all(|e| matches!(e.reason, ExclusionReason::Invalid(_))));
    }

    #[test]
    fn test_group_totals() {
        let result = CycleGrouper::new().group(
            vec![wo("WO-1", "C1", 0, 100.0, 100.0), wo("WO-2", "C1", 0, 200.0, 100.0)],
            None,
        );
        let group = &result.groups[0];
        assert_eq!(group.total_area_mm2(), 30_000.0);
        assert_eq!(group.total_weight_kg(), 20.0);
        assert_eq!(group.total_connectors(), 2);
    }
}
