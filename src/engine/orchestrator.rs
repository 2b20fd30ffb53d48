// ==========================================
// 固化罐装载分配系统 - 分配运行编排器
// ==========================================
// 主流程: 分组 → (每组) 选罐排名 → 前 K 个候选并行试排 → 择优提交
// 一次运行的已用罐集合由 RunContext 持有，运行结束即丢弃
// 红线: 每个输入工单恰好出现一次
//       （某方案 included / 某方案 excluded / rejected / unallocated）
// ==========================================

use crate::config::AllocationConfig;
use crate::domain::allocation::{Allocation, Exclusion};
use crate::domain::types::{AllocationStatus, ExclusionReason, VesselStatus};
use crate::domain::vessel::Vessel;
use crate::domain::work_order::WorkOrder;
use crate::engine::cycle_grouper::{CycleGroup, CycleGrouper};
use crate::engine::packer::{GeometricPacker, PackOutcome, PackRequest};
use crate::engine::validation::CatalogValidator;
use crate::engine::vessel_selector::{VesselCandidate, VesselSelector};
use chrono::Local;
use futures::future::join_all;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

// ==========================================
// RunOutcome - 运行结果
// ==========================================
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunOutcome {
    /// Draft 状态的方案（由调用方决定是否落库）
    pub allocations: Vec<Allocation>,
    /// 数据校验未通过的工单
    pub rejected: Vec<Exclusion>,
    /// 所在组一个方案都没有产生的工单
    pub unallocated: Vec<Exclusion>,
}

impl RunOutcome {
    pub fn included_count(&self) -> usize {
        self.allocations.iter().map(|a| a.included_count()).sum()
    }

    pub fn total_area_used_mm2(&self) -> f64 {
        self.allocations
            .iter()
            .map(|a| a.metrics.total_area_used_mm2())
            .sum()
    }

    /// 全部排除记录（方案内 + 运行级）
    pub fn all_exclusions(&self) -> Vec<&Exclusion> {
        self.allocations
            .iter()
            .flat_map(|a| a.excluded.iter())
            .chain(self.rejected.iter())
            .chain(self.unallocated.iter())
            .collect()
    }
}

// ==========================================
// RunContext - 单次运行上下文
// ==========================================
struct RunContext {
    pool: Vec<Vessel>, // 本次运行尚未使用的罐
    snapshot: Option<String>,
}

impl RunContext {
    fn new(vessels: Vec<Vessel>, config: &AllocationConfig) -> Self {
        let mut pool: Vec<Vessel> = Vec::with_capacity(vessels.len());
        for vessel in vessels {
            if vessel.status != VesselStatus::Available {
                debug!(vessel_id = %vessel.vessel_id, status = %vessel.status, "罐不可用，跳过");
                continue;
            }
            if let Err(reason) = CatalogValidator::validate_vessel(&vessel) {
                warn!(vessel_id = %vessel.vessel_id, reason = %reason, "罐参数非法，跳过");
                continue;
            }
            pool.push(vessel);
        }
        pool.sort_by(|a, b| a.vessel_id.cmp(&b.vessel_id));

        let snapshot = match config.to_snapshot_json() {
            Ok(json) => Some(json),
            Err(e) => {
                warn!(error = %e, "配置快照序列化失败");
                None
            }
        };
        Self { pool, snapshot }
    }

    fn commit(&mut self, vessel_id: &str) {
        self.pool.retain(|v| v.vessel_id != vessel_id);
    }
}

// ==========================================
// AllocationRunner - 分配运行编排器
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct AllocationRunner {
    grouper: CycleGrouper,
    selector: VesselSelector,
    packer: GeometricPacker,
}

impl AllocationRunner {
    pub fn new() -> Self {
        Self {
            grouper: CycleGrouper::new(),
            selector: VesselSelector::new(),
            packer: GeometricPacker::new(),
        }
    }

    /// 执行一次分配运行
    ///
    /// # 参数
    /// - `work_orders`: 候选工单（调用方已剔除被占用的工单）
    /// - `vessels`: 罐目录，只使用 Available 且参数合法的罐
    /// - `known_cycles`: 已知固化曲线（None 时不校验）
    ///
    /// # 返回
    /// 未落库的 Draft 方案与运行级排除清单
    #[instrument(skip_all, fields(work_orders = work_orders.len(), vessels = vessels.len()))]
    pub async fn run(
        &self,
        work_orders: Vec<WorkOrder>,
        vessels: Vec<Vessel>,
        known_cycles: Option<&HashSet<String>>,
        config: &AllocationConfig,
    ) -> RunOutcome {
        let grouping = self.grouper.group(work_orders, known_cycles);
        let mut ctx = RunContext::new(vessels, config);
        let mut outcome = RunOutcome {
            rejected: grouping.rejected,
            ..RunOutcome::default()
        };

        info!(
            groups = grouping.groups.len(),
            pool = ctx.pool.len(),
            rejected = outcome.rejected.len(),
            "开始分配运行"
        );

        for group in grouping.groups {
            let (allocations, unallocated) = self.allocate_group(group, &mut ctx, config, None).await;
            outcome.allocations.extend(allocations);
            outcome.unallocated.extend(unallocated);
        }

        info!(
            allocations = outcome.allocations.len(),
            included = outcome.included_count(),
            unallocated = outcome.unallocated.len(),
            "分配运行完成"
        );
        outcome
    }

    /// 为人工选定的一批工单（同一固化曲线）挑选最佳罐，只产生一个方案
    ///
    /// # 返回
    /// - `Ok(allocation)`: 放不下的工单记在方案的 excluded 中
    /// - `Err(exclusions)`: 没有任何罐能接收，附每个工单的原因
    #[instrument(skip_all, fields(work_orders = work_orders.len(), vessels = vessels.len()))]
    pub async fn run_single(
        &self,
        work_orders: Vec<WorkOrder>,
        vessels: Vec<Vessel>,
        config: &AllocationConfig,
    ) -> Result<Allocation, Vec<Exclusion>> {
        let grouping = self.grouper.group(work_orders, None);
        if !grouping.rejected.is_empty() {
            return Err(grouping.rejected);
        }
        let mut groups = grouping.groups.into_iter();
        let group = match (groups.next(), groups.next()) {
            (Some(group), None) => group,
            (None, _) => return Err(Vec::new()),
            (Some(_), Some(_)) => {
                warn!("人工批次包含多个固化曲线");
                return Err(Vec::new());
            }
        };

        let mut ctx = RunContext::new(vessels, config);
        let (mut allocations, unallocated) = self.allocate_group(group, &mut ctx, config, Some(1)).await;
        allocations.pop().ok_or(unallocated)
    }

    /// 处理一个曲线组，返回 (方案, 运行级未分配)
    ///
    /// `max_allocations` 为 Some(n) 时最多提交 n 个罐
    #[instrument(skip_all, fields(cure_cycle_id = %group.cure_cycle_id, items = group.len()))]
    async fn allocate_group(
        &self,
        group: CycleGroup,
        ctx: &mut RunContext,
        config: &AllocationConfig,
        max_allocations: Option<usize>,
    ) -> (Vec<Allocation>, Vec<Exclusion>) {
        let cure_cycle_id = group.cure_cycle_id;
        let mut remaining = group.work_orders;
        let mut allocations: Vec<Allocation> = Vec::new();
        let mut last_reason: HashMap<String, ExclusionReason> = HashMap::new();
        let mut tried: HashSet<String> = HashSet::new();
        let parallel = config.parallel_candidates.max(1);

        while !remaining.is_empty() {
            if max_allocations.is_some_and(|max| allocations.len() >= max) {
                break;
            }
            let untried: Vec<Vessel> = ctx
                .pool
                .iter()
                .filter(|v| !tried.contains(&v.vessel_id))
                .cloned()
                .collect();
            if untried.is_empty() {
                break;
            }

            let ranking = self.selector.rank(&remaining, &untried, config);
            for ex in ranking.trimmed {
                last_reason.insert(ex.wo_id, ex.reason);
            }
            if ranking.candidates.is_empty() {
                debug!("没有可行候选罐");
                break;
            }

            let top: Vec<VesselCandidate> = ranking.candidates.into_iter().take(parallel).collect();
            let attempts = self.pack_candidates(&top, config).await;

            let mut best: Option<(&VesselCandidate, PackOutcome)> = None;
            for (candidate, result) in top.iter().zip(attempts) {
                let Some(result) = result else {
                    tried.insert(candidate.vessel.vessel_id.clone());
                    continue;
                };
                for ex in &result.excluded {
                    last_reason.insert(ex.wo_id.clone(), ex.reason.clone());
                }
                if result.included_count() == 0 {
                    tried.insert(candidate.vessel.vessel_id.clone());
                    continue;
                }
                let better = match &best {
                    None => true,
                    Some((current, current_result)) => is_better(candidate, &result, current, current_result),
                };
                if better {
                    best = Some((candidate, result));
                }
            }

            let Some((winner, result)) = best else {
                continue;
            };

            let placed: HashSet<String> = result.included_wo_ids().into_iter().collect();
            remaining.retain(|wo| !placed.contains(&wo.wo_id));
            for wo_id in &placed {
                last_reason.remove(wo_id);
            }

            let allocation = build_allocation(&cure_cycle_id, result, ctx.snapshot.clone());
            info!(
                vessel_id = %winner.vessel.vessel_id,
                included = allocation.included_count(),
                remaining = remaining.len(),
                packing_status = %allocation.packing_status,
                weight_util = allocation.metrics.weight_utilization(),
                connector_util = allocation.metrics.connector_utilization(),
                "罐已提交"
            );
            ctx.commit(&winner.vessel.vessel_id);
            allocations.push(allocation);
        }

        // 剩余工单: 用最近一次原因，从未被考虑过的记为无可用罐
        let leftovers: Vec<Exclusion> = remaining
            .into_iter()
            .map(|wo| {
                let reason = last_reason
                    .remove(&wo.wo_id)
                    .unwrap_or(ExclusionReason::NoVesselCapacity);
                Exclusion::new(wo.wo_id, reason)
            })
            .collect();

        if !leftovers.is_empty() {
            debug!(leftovers = leftovers.len(), "组内剩余工单");
        }
        match allocations.last_mut() {
            Some(last) => {
                last.excluded.extend(leftovers);
                (allocations, Vec::new())
            }
            None => (allocations, leftovers),
        }
    }

    /// 前 K 个候选在阻塞线程池上并行试排；线程异常的候选返回 None
    async fn pack_candidates(
        &self,
        candidates: &[VesselCandidate],
        config: &AllocationConfig,
    ) -> Vec<Option<PackOutcome>> {
        let handles = candidates.iter().map(|candidate| {
            let packer = self.packer;
            let request = PackRequest {
                vessel: candidate.vessel.clone(),
                work_orders: candidate.work_orders.clone(),
                config: config.clone(),
            };
            tokio::task::spawn_blocking(move || packer.pack(&request))
        });

        join_all(handles)
            .await
            .into_iter()
            .zip(candidates)
            .map(|(joined, candidate)| match joined {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    warn!(vessel_id = %candidate.vessel.vessel_id, error = %e, "试排任务异常");
                    None
                }
            })
            .collect()
    }
}

/// 择优: 入罐件数 → 选罐评分 → 罐底面积小者
fn is_better(
    candidate: &VesselCandidate,
    result: &PackOutcome,
    current: &VesselCandidate,
    current_result: &PackOutcome,
) -> bool {
    result
        .included_count()
        .cmp(&current_result.included_count())
        .then_with(|| candidate.score.total_cmp(&current.score))
        .then_with(|| {
            current
                .vessel
                .base_area_mm2()
                .total_cmp(&candidate.vessel.base_area_mm2())
        })
        .is_gt()
}

fn build_allocation(cure_cycle_id: &str, result: PackOutcome, snapshot: Option<String>) -> Allocation {
    let now = Local::now().naive_local();
    Allocation {
        allocation_id: Uuid::new_v4().to_string(),
        vessel_id: result.vessel_id.clone(),
        cure_cycle_id: cure_cycle_id.to_string(),
        status: AllocationStatus::Draft,
        included_wo_ids: result.included_wo_ids(),
        excluded: Vec::new(),
        placements: result.placements,
        metrics: result.metrics,
        packing_status: result.status,
        confirmed_by: None,
        cancelled_by: None,
        note: None,
        config_snapshot_json: snapshot,
        created_at: now,
        updated_at: now,
        confirmed_at: None,
        completed_at: None,
        revision: 0,
    }
}
