// ==========================================
// 固化罐装载分配系统 - 选罐引擎
// ==========================================
// 可行性: 接口需求 ≤ 上限 且 重量 ≤ 限重 且 面积 ≤ 罐底面积
//         （罐底不足且有支架层时 ≤ 罐底 + 支架层面积）
// 评分: 面积/接口/重量利用率加权 + 每件入罐加分
// 并列: 可用面积小者优先，再按 vessel_id
// 无罐能整组接收时，按罐做容量裁剪（组内顺序贪心）
// ==========================================

use crate::config::AllocationConfig;
use crate::domain::allocation::Exclusion;
use crate::domain::types::ExclusionReason;
use crate::domain::vessel::Vessel;
use crate::domain::work_order::WorkOrder;
use tracing::{debug, instrument};

const WEIGHT_EPS: f64 = 1e-9;

/// 候选罐
#[derive(Debug, Clone)]
pub struct VesselCandidate {
    pub vessel: Vessel,
    pub work_orders: Vec<WorkOrder>, // 送去试排的工单（整组或裁剪后子集）
    pub trimmed: Vec<Exclusion>,
    pub score: f64,
    pub full_fit: bool,
}

/// 排名结果
#[derive(Debug, Clone, Default)]
pub struct Ranking {
    pub candidates: Vec<VesselCandidate>, // 评分降序
    pub trimmed: Vec<Exclusion>,          // 各罐裁剪原因（按罐池顺序，后者覆盖前者）
}

// ==========================================
// VesselSelector - 选罐引擎
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct VesselSelector {
    // 无状态引擎
}

impl VesselSelector {
    pub fn new() -> Self {
        Self {}
    }

    /// 整组可行性
    pub fn is_feasible(&self, vessel: &Vessel, work_orders: &[WorkOrder], config: &AllocationConfig) -> bool {
        let cap = config.connector_cap_for(&vessel.vessel_id, vessel.connector_capacity);
        let connectors: u32 = work_orders.iter().map(|w| w.connector_count()).sum();
        let weight: f64 = work_orders.iter().map(|w| w.weight_kg()).sum();
        let area: f64 = work_orders.iter().map(|w| w.area_mm2()).sum();

        connectors <= cap
            && weight <= vessel.weight_limit_kg + WEIGHT_EPS
            && area <= area_capacity(vessel, area)
            && work_orders.iter().all(|w| fits_dimensions(vessel, w, config))
    }

    /// 利用率评分
    pub fn score(&self, vessel: &Vessel, work_orders: &[WorkOrder], config: &AllocationConfig) -> f64 {
        let weights = config.optimization_priority.weights();
        let cap = config.connector_cap_for(&vessel.vessel_id, vessel.connector_capacity);
        let connectors: u32 = work_orders.iter().map(|w| w.connector_count()).sum();
        let weight: f64 = work_orders.iter().map(|w| w.weight_kg()).sum();
        let area: f64 = work_orders.iter().map(|w| w.area_mm2()).sum();

        let area_util = ratio(area, area_capacity(vessel, area));
        let connector_util = ratio(connectors as f64, cap as f64);
        let weight_util = ratio(weight, vessel.weight_limit_kg);

        weights.area * area_util
            + weights.connector * connector_util
            + weights.weight * weight_util
            + config.per_item_bonus * work_orders.len() as f64
    }

    /// 按罐容量裁剪: 组内顺序贪心，放不下的给出原因
    pub fn trim_to_capacity(
        &self,
        vessel: &Vessel,
        work_orders: &[WorkOrder],
        config: &AllocationConfig,
    ) -> (Vec<WorkOrder>, Vec<Exclusion>) {
        let cap = config.connector_cap_for(&vessel.vessel_id, vessel.connector_capacity);
        let mut kept = Vec::new();
        let mut trimmed = Vec::new();
        let mut weight = 0.0;
        let mut connectors = 0u32;

        for wo in work_orders {
            let reason = if !fits_dimensions(vessel, wo, config) {
                Some(ExclusionReason::Oversize)
            } else if weight + wo.weight_kg() > vessel.weight_limit_kg + WEIGHT_EPS {
                Some(ExclusionReason::Overweight)
            } else if connectors + wo.connector_count() > cap {
                Some(ExclusionReason::ConnectorOverflow)
            } else {
                None
            };

            match reason {
                Some(reason) => trimmed.push(Exclusion::new(wo.wo_id.clone(), reason)),
                None => {
                    weight += wo.weight_kg();
                    connectors += wo.connector_count();
                    kept.push(wo.clone());
                }
            }
        }
        (kept, trimmed)
    }

    /// 为一组剩余工单给罐池排名
    ///
    /// 先找能整组接收的罐；一个都没有时改用裁剪子集排名
    #[instrument(skip_all, fields(items = work_orders.len(), pool = vessels.len()))]
    pub fn rank(&self, work_orders: &[WorkOrder], vessels: &[Vessel], config: &AllocationConfig) -> Ranking {
        let mut candidates: Vec<VesselCandidate> = vessels
            .iter()
            .filter(|v| self.is_feasible(v, work_orders, config))
            .map(|v| VesselCandidate {
                vessel: v.clone(),
                work_orders: work_orders.to_vec(),
                trimmed: Vec::new(),
                score: self.score(v, work_orders, config),
                full_fit: true,
            })
            .collect();

        let mut all_trimmed = Vec::new();
        if candidates.is_empty() {
            for vessel in vessels {
                let (kept, trimmed) = self.trim_to_capacity(vessel, work_orders, config);
                all_trimmed.extend(trimmed.iter().cloned());
                if kept.is_empty() {
                    continue;
                }
                candidates.push(VesselCandidate {
                    vessel: vessel.clone(),
                    score: self.score(vessel, &kept, config),
                    work_orders: kept,
                    trimmed,
                    full_fit: false,
                });
            }
        }

        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.vessel.base_area_mm2().total_cmp(&b.vessel.base_area_mm2()))
                .then_with(|| a.vessel.vessel_id.cmp(&b.vessel.vessel_id))
        });

        debug!(
            candidates = candidates.len(),
            full_fit = candidates.first().map(|c| c.full_fit).unwrap_or(false),
            "选罐排名完成"
        );
        Ranking {
            candidates,
            trimmed: all_trimmed,
        }
    }
}

/// 面积容量: 罐底够用就只算罐底，否则加上支架层
fn area_capacity(vessel: &Vessel, demand_mm2: f64) -> f64 {
    let base = vessel.base_area_mm2();
    if demand_mm2 <= base || !vessel.has_elevated_level() {
        base
    } else {
        vessel.total_area_mm2()
    }
}

/// 单件尺寸是否放得进罐底留边后的区域
fn fits_dimensions(vessel: &Vessel, wo: &WorkOrder, config: &AllocationConfig) -> bool {
    let margin = config.padding_margin_mm.max(0.0) * 2.0;
    match &wo.footprint {
        Some(fp) => fp.fits_within(
            vessel.usable_width_mm - margin,
            vessel.usable_length_mm - margin,
            config.rotation_allowed,
        ),
        None => false,
    }
}

fn ratio(used: f64, total: f64) -> f64 {
    if total <= 0.0 {
        0.0
    } else {
        used / total
    }
}
