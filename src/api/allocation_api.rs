// ==========================================
// 固化罐装载分配系统 - 分配方案 API
// ==========================================
// 职责: 预览 / 自动运行 / 人工运行 / 生命周期流转 / 查询
// 每次运行重新读取工单与罐的最新状态，运行之间不共享内存状态
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::AllocationConfig;
use crate::domain::allocation::{Allocation, Exclusion};
use crate::domain::types::{AllocationStatus, WorkOrderStatus};
use crate::domain::vessel::Vessel;
use crate::domain::work_order::WorkOrder;
use crate::engine::lifecycle::AllocationLifecycle;
use crate::engine::orchestrator::{AllocationRunner, RunOutcome};
use crate::engine::validation::CatalogValidator;
use crate::repository::{AllocationRepository, CureCycleCatalog, VesselCatalog, WorkOrderCatalog};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 自动运行中未能落库的方案
///
/// 方案附带的剔除工单转入 `AutomaticRunResult::unallocated`
#[derive(Debug, Clone, Serialize)]
pub struct RunConflict {
    pub vessel_id: String,
    pub wo_ids: Vec<String>,
    pub message: String,
}

/// 自动运行结果
#[derive(Debug, Clone, Serialize)]
pub struct AutomaticRunResult {
    /// 已落库的 Pending 方案
    pub allocations: Vec<Allocation>,
    pub conflicts: Vec<RunConflict>,
    pub rejected: Vec<Exclusion>,
    pub unallocated: Vec<Exclusion>,
}

// ==========================================
// AllocationApi
// ==========================================
pub struct AllocationApi {
    work_orders: Arc<dyn WorkOrderCatalog>,
    vessels: Arc<dyn VesselCatalog>,
    cure_cycles: Arc<dyn CureCycleCatalog>,
    allocation_repo: Arc<AllocationRepository>,
    lifecycle: Arc<AllocationLifecycle>,
    runner: AllocationRunner,
}

impl AllocationApi {
    pub fn new(
        work_orders: Arc<dyn WorkOrderCatalog>,
        vessels: Arc<dyn VesselCatalog>,
        cure_cycles: Arc<dyn CureCycleCatalog>,
        allocation_repo: Arc<AllocationRepository>,
        lifecycle: Arc<AllocationLifecycle>,
    ) -> Self {
        Self {
            work_orders,
            vessels,
            cure_cycles,
            allocation_repo,
            lifecycle,
            runner: AllocationRunner::new(),
        }
    }

    // ==========================================
    // 分配运行
    // ==========================================

    /// 预览（Draft，不落库）
    ///
    /// # 参数
    /// - `cure_cycle_id`: 只预览该固化曲线的工单；None 表示全部
    #[instrument(skip(self, config))]
    pub async fn preview(
        &self,
        cure_cycle_id: Option<&str>,
        config: &AllocationConfig,
    ) -> ApiResult<RunOutcome> {
        validate_config(config)?;
        let (mut work_orders, vessels, known) = self.gather_run_input().await?;
        if let Some(cycle) = cure_cycle_id {
            work_orders.retain(|wo| wo.cure_cycle_id.as_deref().map(str::trim) == Some(cycle.trim()));
        }
        Ok(self.runner.run(work_orders, vessels, known.as_ref(), config).await)
    }

    /// 自动运行: 全部可分配工单/罐，结果以 Pending 落库（预留罐）
    ///
    /// 方案各自一个事务；期间罐/工单被改动的方案记为冲突，不落库
    #[instrument(skip(self, config))]
    pub async fn run_automatic(&self, config: &AllocationConfig) -> ApiResult<AutomaticRunResult> {
        validate_config(config)?;
        let (work_orders, vessels, known) = self.gather_run_input().await?;
        let outcome = self.runner.run(work_orders, vessels, known.as_ref(), config).await;

        let mut unallocated = outcome.unallocated;
        let mut persisted = Vec::with_capacity(outcome.allocations.len());
        let mut conflicts = Vec::new();
        for allocation in &outcome.allocations {
            match self.lifecycle.persist_pending(allocation) {
                Ok(stored) => persisted.push(stored),
                Err(e) => match ApiError::from(e) {
                    err @ (ApiError::StateConflict { .. } | ApiError::Conflict(_)) => {
                        warn!(vessel_id = %allocation.vessel_id, error = %err, "方案落库冲突");
                        conflicts.push(RunConflict {
                            vessel_id: allocation.vessel_id.clone(),
                            wo_ids: allocation.included_wo_ids.clone(),
                            message: err.to_string(),
                        });
                        unallocated.extend(allocation.excluded.iter().cloned());
                    }
                    other => return Err(other),
                },
            }
        }

        info!(persisted = persisted.len(), conflicts = conflicts.len(), "自动运行完成");
        Ok(AutomaticRunResult {
            allocations: persisted,
            conflicts,
            rejected: outcome.rejected,
            unallocated,
        })
    }

    /// 人工运行: 为操作员选定的工单挑选最佳罐，落库一个 Draft
    ///
    /// # 错误
    /// - `InvalidInput`: 列表为空
    /// - `NotFound`: 有 id 不存在
    /// - `ValidationError`: 数据不完整 / 非待固化 / 固化曲线不一致
    /// - `StateConflict`: 工单已被其它方案占用
    /// - `CapacityError`: 没有罐能接收
    #[instrument(skip(self, config), fields(count = wo_ids.len()))]
    pub async fn run_manual(
        &self,
        wo_ids: &[String],
        note: Option<String>,
        config: &AllocationConfig,
    ) -> ApiResult<Allocation> {
        validate_config(config)?;
        let ids: BTreeSet<String> = wo_ids
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        if ids.is_empty() {
            return Err(ApiError::InvalidInput("工单列表不能为空".to_string()));
        }
        let ids: Vec<String> = ids.into_iter().collect();

        let work_orders = self.work_orders.find_work_orders(&ids).await?;
        let missing: Vec<String> = {
            let found: HashSet<&str> = work_orders.iter().map(|wo| wo.wo_id.as_str()).collect();
            ids.iter().filter(|id| !found.contains(id.as_str())).cloned().collect()
        };
        if !missing.is_empty() {
            return Err(ApiError::NotFound(format!("工单不存在: {}", missing.join(", "))));
        }

        let known = self.known_cycles().await?;
        for wo in &work_orders {
            if let Err(reason) = CatalogValidator::validate_work_order(wo, known.as_ref()) {
                return Err(ApiError::ValidationError(format!("工单 {}: {}", wo.wo_id, reason)));
            }
        }
        let cycles: BTreeSet<String> = work_orders
            .iter()
            .filter_map(|wo| wo.cure_cycle_id.as_deref().map(|c| c.trim().to_string()))
            .collect();
        if cycles.len() > 1 {
            return Err(ApiError::ValidationError(format!(
                "所选工单固化曲线不一致: {}",
                cycles.into_iter().collect::<Vec<_>>().join(", ")
            )));
        }

        let claimed = self.allocation_repo.claimed_work_orders()?;
        if let Some(wo) = work_orders.iter().find(|wo| claimed.contains_key(&wo.wo_id)) {
            return Err(ApiError::StateConflict {
                message: format!("工单 {} 已被其它方案占用", wo.wo_id),
                current_state: format!("CLAIMED_BY {}", claimed[&wo.wo_id]),
            });
        }

        let vessels = self.vessels.vessels().await?;
        let mut allocation = self
            .runner
            .run_single(work_orders, vessels, config)
            .await
            .map_err(|reasons| ApiError::CapacityError(describe_exclusions(&reasons)))?;
        allocation.note = note.filter(|n| !n.trim().is_empty());

        let stored = self.lifecycle.persist_draft(&allocation)?;
        info!(allocation_id = %stored.allocation_id, vessel_id = %stored.vessel_id, "人工方案已保存");
        Ok(stored)
    }

    // ==========================================
    // 生命周期
    // ==========================================

    pub fn promote(&self, allocation_id: &str) -> ApiResult<Allocation> {
        let id = require_id(allocation_id)?;
        Ok(self.lifecycle.promote(id)?)
    }

    pub fn confirm(&self, allocation_id: &str, role: &str) -> ApiResult<Allocation> {
        let id = require_id(allocation_id)?;
        let role = require_role(role)?;
        Ok(self.lifecycle.confirm(id, role)?)
    }

    pub fn cancel(&self, allocation_id: &str, role: &str) -> ApiResult<Allocation> {
        let id = require_id(allocation_id)?;
        let role = require_role(role)?;
        Ok(self.lifecycle.cancel(id, role)?)
    }

    pub fn complete(&self, allocation_id: &str) -> ApiResult<Allocation> {
        let id = require_id(allocation_id)?;
        Ok(self.lifecycle.complete(id)?)
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn get(&self, allocation_id: &str) -> ApiResult<Allocation> {
        let id = require_id(allocation_id)?;
        self.allocation_repo
            .find_by_id(id)?
            .ok_or_else(|| ApiError::NotFound(format!("Allocation(id={})不存在", id)))
    }

    pub fn list(&self, status: Option<AllocationStatus>) -> ApiResult<Vec<Allocation>> {
        Ok(match status {
            Some(status) => self.allocation_repo.list_by_status(status)?,
            None => self.allocation_repo.list_all()?,
        })
    }

    pub fn list_by_vessel(&self, vessel_id: &str) -> ApiResult<Vec<Allocation>> {
        let id = vessel_id.trim();
        if id.is_empty() {
            return Err(ApiError::InvalidInput("罐号不能为空".to_string()));
        }
        Ok(self.allocation_repo.list_by_vessel(id)?)
    }

    // ==========================================
    // 内部
    // ==========================================

    /// 运行输入: 未被占用的待固化工单、罐目录、已知固化曲线
    async fn gather_run_input(
        &self,
    ) -> ApiResult<(Vec<WorkOrder>, Vec<Vessel>, Option<HashSet<String>>)> {
        let claimed = self.allocation_repo.claimed_work_orders()?;
        let work_orders: Vec<WorkOrder> = self
            .work_orders
            .awaiting_cure()
            .await?
            .into_iter()
            .filter(|wo| wo.status == WorkOrderStatus::AwaitingCure && !claimed.contains_key(&wo.wo_id))
            .collect();
        let vessels = self.vessels.vessels().await?;
        let known = self.known_cycles().await?;
        Ok((work_orders, vessels, known))
    }

    /// 固化曲线目录为空时不校验曲线是否存在
    async fn known_cycles(&self) -> ApiResult<Option<HashSet<String>>> {
        let cycles = self.cure_cycles.cure_cycles().await?;
        if cycles.is_empty() {
            return Ok(None);
        }
        Ok(Some(cycles.into_iter().map(|c| c.cycle_id).collect()))
    }
}

fn validate_config(config: &AllocationConfig) -> ApiResult<()> {
    config.validate().map_err(ApiError::InvalidInput)
}

fn require_id(allocation_id: &str) -> ApiResult<&str> {
    let id = allocation_id.trim();
    if id.is_empty() {
        return Err(ApiError::InvalidInput("方案ID不能为空".to_string()));
    }
    Ok(id)
}

fn require_role(role: &str) -> ApiResult<&str> {
    let role = role.trim();
    if role.is_empty() {
        return Err(ApiError::InvalidInput("操作角色不能为空".to_string()));
    }
    Ok(role)
}

fn describe_exclusions(exclusions: &[Exclusion]) -> String {
    if exclusions.is_empty() {
        return "no vessel capacity available".to_string();
    }
    exclusions
        .iter()
        .map(|e| format!("{}: {}", e.wo_id, e.reason))
        .collect::<Vec<_>>()
        .join("; ")
}
