// ==========================================
// 固化罐装载分配系统 - 目录数据校验
// ==========================================
// 职责: 分组前剔除数据不完整的工单 / 参数异常的固化罐
// 红线: 无状态、无副作用、无 I/O；每条剔除必须带原因
// ==========================================

use crate::domain::allocation::Exclusion;
use crate::domain::types::{ExclusionReason, WorkOrderStatus};
use crate::domain::vessel::Vessel;
use crate::domain::work_order::WorkOrder;
use std::collections::HashSet;

/// 罐面单边尺寸上限（毫米）
pub const MAX_VESSEL_DIMENSION_MM: f64 = 20_000.0;

// ==========================================
// CatalogValidator - 纯函数工具类
// ==========================================
pub struct CatalogValidator;

impl CatalogValidator {
    /// 校验单个工单
    ///
    /// # 规则
    /// - 状态必须为 AwaitingCure
    /// - 外形存在、尺寸有限且为正
    /// - 重量为正、接口数 > 0
    /// - 固化曲线存在；给定 `known_cycles` 时必须在其中
    pub fn validate_work_order(
        wo: &WorkOrder,
        known_cycles: Option<&HashSet<String>>,
    ) -> Result<(), ExclusionReason> {
        if wo.status != WorkOrderStatus::AwaitingCure {
            return Err(ExclusionReason::Invalid(format!("status is {}", wo.status)));
        }

        let fp = wo
            .footprint
            .as_ref()
            .ok_or_else(|| ExclusionReason::Invalid("missing footprint".to_string()))?;
        if !fp.has_valid_dimensions() {
            return Err(ExclusionReason::Invalid("zero-area footprint".to_string()));
        }
        if !fp.weight_kg.is_finite() || fp.weight_kg <= 0.0 {
            return Err(ExclusionReason::Invalid("non-positive weight".to_string()));
        }
        if fp.connector_count == 0 {
            return Err(ExclusionReason::Invalid("zero connector count".to_string()));
        }

        let cycle_id = match wo.cure_cycle_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id,
            _ => return Err(ExclusionReason::Invalid("missing cure cycle".to_string())),
        };
        if let Some(known) = known_cycles {
            if !known.contains(cycle_id) {
                return Err(ExclusionReason::Invalid(format!("unknown cure cycle {}", cycle_id)));
            }
        }
        Ok(())
    }

    /// 拆分为 (有效工单, 剔除记录)，保持输入顺序
    pub fn partition_work_orders(
        work_orders: Vec<WorkOrder>,
        known_cycles: Option<&HashSet<String>>,
    ) -> (Vec<WorkOrder>, Vec<Exclusion>) {
        let mut valid = Vec::with_capacity(work_orders.len());
        let mut rejected = Vec::new();
        for wo in work_orders {
            match Self::validate_work_order(&wo, known_cycles) {
                Ok(()) => valid.push(wo),
                Err(reason) => rejected.push(Exclusion::new(wo.wo_id, reason)),
            }
        }
        (valid, rejected)
    }

    /// 校验固化罐参数
    pub fn validate_vessel(vessel: &Vessel) -> Result<(), String> {
        let positive = |v: f64| v.is_finite() && v > 0.0;

        if !positive(vessel.usable_width_mm) || !positive(vessel.usable_length_mm) {
            return Err("non-positive usable surface".to_string());
        }
        if vessel.usable_width_mm > MAX_VESSEL_DIMENSION_MM
            || vessel.usable_length_mm > MAX_VESSEL_DIMENSION_MM
        {
            return Err(format!("usable surface exceeds {} mm", MAX_VESSEL_DIMENSION_MM));
        }
        if !positive(vessel.weight_limit_kg) {
            return Err("non-positive weight limit".to_string());
        }
        if vessel.connector_capacity == 0 {
            return Err("zero connector capacity".to_string());
        }
        if let Some(elevated) = &vessel.elevated {
            if elevated.max_supports == 0 {
                return Err("elevated level without supports".to_string());
            }
            if !positive(elevated.per_support_weight_kg) || !positive(elevated.support_height_mm) {
                return Err("non-positive elevated support parameters".to_string());
            }
            if !elevated.clearance_mm.is_finite() || elevated.clearance_mm < 0.0 {
                return Err("negative elevated clearance".to_string());
            }
        }
        Ok(())
    }
}
