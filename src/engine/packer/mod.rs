// ==========================================
// 固化罐装载分配系统 - 几何排布器
// ==========================================
// 职责: 一个批次在一个罐上的不重叠摆放（位置、旋转、层）
// 状态机: Formulating → Solving → {Solved, InfeasibleExact}
//         → (未 Solved) HeuristicFallback → {Solved, Infeasible}
// 精确求解限时；到期丢弃搜索状态后回落启发式
// 红线: 每个未入罐工单必须给出唯一原因
// ==========================================

mod exact;
mod geometry;
mod heuristic;

use crate::config::AllocationConfig;
use crate::domain::allocation::{AllocationMetrics, Exclusion, Placement};
use crate::domain::types::{ExclusionReason, PackingStatus};
use crate::domain::vessel::Vessel;
use crate::domain::work_order::WorkOrder;
use exact::{ExactOutcome, ExactSolver};
use geometry::{build_metrics, objective, to_placement, Layout, PackItem, PackState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

// ==========================================
// PackerPhase - 排布状态机
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackerPhase {
    Formulating,
    Solving,
    Solved,
    InfeasibleExact,
    HeuristicFallback,
    Infeasible,
}

// ==========================================
// PackRequest / PackOutcome
// ==========================================

/// 单次试排请求（持有数据，便于移入阻塞线程）
#[derive(Debug, Clone)]
pub struct PackRequest {
    pub vessel: Vessel,
    pub work_orders: Vec<WorkOrder>,
    pub config: AllocationConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackOutcome {
    pub vessel_id: String,
    pub placements: Vec<Placement>, // 按 (层, y, x) 排序
    pub excluded: Vec<Exclusion>,   // 按请求顺序
    pub metrics: AllocationMetrics,
    pub status: PackingStatus,
    pub timed_out: bool,
    pub objective: f64,
    pub phases: Vec<PackerPhase>,
}

impl PackOutcome {
    pub fn included_count(&self) -> usize {
        self.placements.len()
    }

    pub fn included_wo_ids(&self) -> Vec<String> {
        self.placements.iter().map(|p| p.wo_id.clone()).collect()
    }

    pub fn final_phase(&self) -> Option<PackerPhase> {
        self.phases.last().copied()
    }
}

// ==========================================
// GeometricPacker - 几何排布器
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct GeometricPacker {
    // 无状态引擎
}

impl GeometricPacker {
    pub fn new() -> Self {
        Self {}
    }

    /// 对一个 (罐, 批次) 试排
    #[instrument(skip(self, request), fields(
        vessel_id = %request.vessel.vessel_id,
        item_count = request.work_orders.len()
    ))]
    pub fn pack(&self, request: &PackRequest) -> PackOutcome {
        let vessel = &request.vessel;
        let config = &request.config;
        let mut phases = vec![PackerPhase::Formulating];
        debug!(phase = ?PackerPhase::Formulating, "建立排布模型");

        let layout = Layout::for_vessel(vessel, config);
        let mut pre_excluded: HashMap<usize, ExclusionReason> = HashMap::new();
        let mut items = Vec::with_capacity(request.work_orders.len());
        for (index, wo) in request.work_orders.iter().enumerate() {
            let Some(item) = PackItem::from_work_order(index, wo, config) else {
                pre_excluded.insert(index, ExclusionReason::Invalid("missing footprint".to_string()));
                continue;
            };
            // 单件即超限的工单不进入求解
            match single_item_reason(&layout, &item) {
                Some(reason) => {
                    pre_excluded.insert(index, reason);
                }
                None => items.push(item),
            }
        }
        // 面积降序，同面积保持请求顺序
        items.sort_by(|a, b| b.area_mm2.total_cmp(&a.area_mm2).then(a.index.cmp(&b.index)));

        // 启发式结果作为精确求解的初始下界
        let warm = heuristic::pack(&layout, &items);
        let warm_count = warm.state.count();
        let warm_penalty = warm.state.extent_penalty(&layout);

        let budget = config.exact_budget_for(items.len());
        phases.push(PackerPhase::Solving);
        debug!(phase = ?PackerPhase::Solving, budget_ms = budget.as_millis() as u64, "开始精确求解");
        let deadline = Instant::now() + budget;
        let exact = ExactSolver::new(&layout, &items, deadline, Some((warm_count, warm_penalty))).solve();

        let (state, reasons, status, timed_out) = match exact {
            ExactOutcome::Completed(best) => {
                let (state, reasons) = match best {
                    Some(solution) => {
                        let reasons = unplaced_reasons(&layout, &solution.state, &items);
                        (solution.state, reasons)
                    }
                    None => (warm.state, warm.reasons),
                };
                if state.count() > 0 {
                    phases.push(PackerPhase::Solved);
                    (state, reasons, PackingStatus::ExactOptimal, false)
                } else {
                    phases.push(PackerPhase::InfeasibleExact);
                    phases.push(PackerPhase::HeuristicFallback);
                    phases.push(PackerPhase::Infeasible);
                    (state, reasons, PackingStatus::Heuristic, false)
                }
            }
            ExactOutcome::TimedOut(incumbent) => {
                warn!(budget_ms = budget.as_millis() as u64, "精确求解超时，回落启发式");
                match incumbent {
                    // 到期前已找到严格优于启发式的完整解
                    Some(solution) => {
                        phases.push(PackerPhase::Solved);
                        let reasons = unplaced_reasons(&layout, &solution.state, &items);
                        (solution.state, reasons, PackingStatus::ExactFeasible, true)
                    }
                    None => {
                        phases.push(PackerPhase::InfeasibleExact);
                        phases.push(PackerPhase::HeuristicFallback);
                        let placed = warm.state.count() > 0;
                        phases.push(if placed {
                            PackerPhase::Solved
                        } else {
                            PackerPhase::Infeasible
                        });
                        (warm.state, warm.reasons, PackingStatus::Heuristic, true)
                    }
                }
            }
        };

        let outcome = assemble(request, &layout, &items, state, reasons, pre_excluded, status, timed_out, phases);
        info!(
            included = outcome.included_count(),
            excluded = outcome.excluded.len(),
            status = outcome.status.label(),
            timed_out = outcome.timed_out,
            "试排完成"
        );
        outcome
    }
}

/// 单件就超出罐的能力
fn single_item_reason(layout: &Layout, item: &PackItem) -> Option<ExclusionReason> {
    if !layout.fits_dimensions(item) {
        return Some(ExclusionReason::Oversize);
    }
    PackState::default().admits(layout, item).err()
}

fn unplaced_reasons(
    layout: &Layout,
    state: &PackState,
    items: &[PackItem],
) -> HashMap<usize, ExclusionReason> {
    items
        .iter()
        .enumerate()
        .filter(|(idx, _)| state.rect_of(*idx).is_none())
        .map(|(idx, item)| (idx, state.reason_for_unplaced(layout, item)))
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn assemble(
    request: &PackRequest,
    layout: &Layout,
    items: &[PackItem],
    state: PackState,
    reasons: HashMap<usize, ExclusionReason>,
    mut pre_excluded: HashMap<usize, ExclusionReason>,
    status: PackingStatus,
    timed_out: bool,
    phases: Vec<PackerPhase>,
) -> PackOutcome {
    let mut rects = state.rects.clone();
    rects.sort_by_key(|r| (r.order_key(), items[r.item].index));
    let placements: Vec<Placement> = rects.iter().map(|r| to_placement(r, &items[r.item])).collect();

    // 排序后序号 → 请求序号
    for (idx, item) in items.iter().enumerate() {
        if state.rect_of(idx).is_none() {
            let reason = reasons
                .get(&idx)
                .cloned()
                .unwrap_or(ExclusionReason::InsufficientSpace);
            pre_excluded.insert(item.index, reason);
        }
    }
    let mut excluded: Vec<(usize, ExclusionReason)> = pre_excluded.into_iter().collect();
    excluded.sort_by_key(|(index, _)| *index);
    let excluded = excluded
        .into_iter()
        .map(|(index, reason)| Exclusion::new(request.work_orders[index].wo_id.clone(), reason))
        .collect();

    let penalty = state.extent_penalty(layout);
    PackOutcome {
        vessel_id: request.vessel.vessel_id.clone(),
        placements,
        excluded,
        metrics: build_metrics(&request.vessel, layout, &state, items),
        status,
        timed_out,
        objective: objective(state.count(), penalty),
        phases,
    }
}
