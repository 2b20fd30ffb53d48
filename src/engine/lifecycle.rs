// ==========================================
// 固化罐装载分配系统 - 方案生命周期管理器
// ==========================================
// 状态: Draft → Pending → Active → Completed
//       Draft/Pending → Cancelled（软删除，记录保留）
//       Active 不可回退，更正须新建方案
// 红线:
// - 每次流转 = 一个事务内的 读取 → 校验 → 写入，全成或全不成
// - 每个写入带 revision 校验，并发输家以冲突失败
// - 同罐至多一个 Active；一个工单至多被一个 Draft/Pending/Active 方案占用
// - 事件在提交后发布
// ==========================================

use crate::domain::allocation::Allocation;
use crate::domain::types::{AllocationStatus, VesselStatus, WorkOrderStatus};
use crate::domain::vessel::Vessel;
use crate::domain::work_order::WorkOrder;
use crate::engine::events::{AllocationEvent, AllocationEventType, OptionalEventPublisher};
use crate::repository::allocation_repo::{AllocationRepository, AllocationStatusUpdate};
use crate::repository::error::RepositoryError;
use crate::repository::vessel_repo::VesselRepository;
use crate::repository::work_order_repo::WorkOrderRepository;
use chrono::{Local, NaiveDateTime};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{info, instrument, warn};

// ==========================================
// LifecycleError
// ==========================================
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("状态冲突: {entity} {id} 当前状态 {current}, 需要 {expected}")]
    StateConflict {
        entity: String,
        id: String,
        current: String,
        expected: String,
    },

    #[error("工单 {wo_id} 已被方案 {allocation_id} 占用")]
    WorkOrderClaimed { wo_id: String, allocation_id: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<rusqlite::Error> for LifecycleError {
    fn from(err: rusqlite::Error) -> Self {
        LifecycleError::Repository(RepositoryError::from(err))
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

fn conflict(entity: &str, id: &str, current: impl ToString, expected: &str) -> LifecycleError {
    LifecycleError::StateConflict {
        entity: entity.to_string(),
        id: id.to_string(),
        current: current.to_string(),
        expected: expected.to_string(),
    }
}

fn not_found(entity: &str, id: &str) -> LifecycleError {
    LifecycleError::Repository(RepositoryError::NotFound {
        entity: entity.to_string(),
        id: id.to_string(),
    })
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

// ==========================================
// AllocationLifecycle - 生命周期管理器
// ==========================================
pub struct AllocationLifecycle {
    conn: Arc<Mutex<Connection>>,
    events: OptionalEventPublisher,
}

impl AllocationLifecycle {
    pub fn new(conn: Arc<Mutex<Connection>>, events: OptionalEventPublisher) -> Self {
        Self { conn, events }
    }

    fn get_conn(&self) -> LifecycleResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| LifecycleError::Repository(RepositoryError::LockError(e.to_string())))
    }

    // ==========================================
    // 方案落库
    // ==========================================

    /// 以 Draft 落库（罐不预留，工单保持 AwaitingCure）
    #[instrument(skip(self, allocation), fields(allocation_id = %allocation.allocation_id))]
    pub fn persist_draft(&self, allocation: &Allocation) -> LifecycleResult<Allocation> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        VesselRepository::find_by_id_tx(&tx, &allocation.vessel_id)?
            .ok_or_else(|| not_found("Vessel", &allocation.vessel_id))?;
        check_work_orders(&tx, allocation, WorkOrderStatus::AwaitingCure)?;

        let mut draft = allocation.clone();
        draft.status = AllocationStatus::Draft;
        draft.revision = 0;
        AllocationRepository::insert_tx(&tx, &draft)?;
        let stored = reload(&tx, &draft.allocation_id)?;
        tx.commit()?;

        info!(vessel_id = %stored.vessel_id, "Draft 方案已保存");
        Ok(stored)
    }

    /// 以 Pending 落库并预留罐（自动运行使用）
    #[instrument(skip(self, allocation), fields(allocation_id = %allocation.allocation_id))]
    pub fn persist_pending(&self, allocation: &Allocation) -> LifecycleResult<Allocation> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let vessel = load_vessel(&tx, &allocation.vessel_id)?;
        if vessel.status != VesselStatus::Available {
            return Err(conflict("Vessel", &vessel.vessel_id, vessel.status, "AVAILABLE"));
        }
        check_work_orders(&tx, allocation, WorkOrderStatus::AwaitingCure)?;

        let mut pending = allocation.clone();
        pending.status = AllocationStatus::Pending;
        pending.revision = 0;
        AllocationRepository::insert_tx(&tx, &pending)?;
        VesselRepository::update_status_tx(&tx, &vessel.vessel_id, vessel.revision, VesselStatus::InUse)?;
        let stored = reload(&tx, &pending.allocation_id)?;
        tx.commit()?;

        info!(vessel_id = %stored.vessel_id, "Pending 方案已保存，罐已预留");
        Ok(stored)
    }

    // ==========================================
    // 状态流转
    // ==========================================

    /// Draft → Pending: 预留罐 (Available → InUse)
    #[instrument(skip(self))]
    pub fn promote(&self, allocation_id: &str) -> LifecycleResult<Allocation> {
        let stored = {
            let mut conn = self.get_conn()?;
            let tx = conn.transaction()?;

            let allocation = load_allocation(&tx, allocation_id)?;
            expect_status(&allocation, &[AllocationStatus::Draft], "DRAFT")?;

            let vessel = load_vessel(&tx, &allocation.vessel_id)?;
            if vessel.status != VesselStatus::Available {
                return Err(conflict("Vessel", &vessel.vessel_id, vessel.status, "AVAILABLE"));
            }
            check_work_orders(&tx, &allocation, WorkOrderStatus::AwaitingCure)?;

            VesselRepository::update_status_tx(&tx, &vessel.vessel_id, vessel.revision, VesselStatus::InUse)?;
            write_status(&tx, &allocation, AllocationStatus::Pending, None, None)?;
            let stored = reload(&tx, allocation_id)?;
            tx.commit()?;
            stored
        };

        info!(vessel_id = %stored.vessel_id, "方案已提交为 Pending");
        self.emit(&stored, AllocationEventType::Promoted, None);
        Ok(stored)
    }

    /// Pending → Active: 工单 AwaitingCure → Curing，记录确认角色
    #[instrument(skip(self))]
    pub fn confirm(&self, allocation_id: &str, role: &str) -> LifecycleResult<Allocation> {
        let stored = {
            let mut conn = self.get_conn()?;
            let tx = conn.transaction()?;

            let allocation = load_allocation(&tx, allocation_id)?;
            expect_status(&allocation, &[AllocationStatus::Pending], "PENDING")?;

            let vessel = load_vessel(&tx, &allocation.vessel_id)?;
            if matches!(
                vessel.status,
                VesselStatus::Faulted | VesselStatus::Off | VesselStatus::Maintenance
            ) {
                return Err(conflict("Vessel", &vessel.vessel_id, vessel.status, "IN_USE"));
            }
            let active = AllocationRepository::active_on_vessel_tx(&tx, &vessel.vessel_id, allocation_id)?;
            if let Some(other) = active.first() {
                return Err(conflict(
                    "Vessel",
                    &vessel.vessel_id,
                    format!("ACTIVE allocation {}", other),
                    "no active allocation",
                ));
            }
            let work_orders = check_work_orders(&tx, &allocation, WorkOrderStatus::AwaitingCure)?;

            for wo in &work_orders {
                WorkOrderRepository::update_status_tx(
                    &tx,
                    &wo.wo_id,
                    wo.revision,
                    WorkOrderStatus::Curing,
                    Some(wo.status),
                )?;
            }
            if vessel.status != VesselStatus::InUse {
                VesselRepository::update_status_tx(&tx, &vessel.vessel_id, vessel.revision, VesselStatus::InUse)?;
            }
            let at = now();
            write_status(&tx, &allocation, AllocationStatus::Active, Some(role), Some(at))?;
            let stored = reload(&tx, allocation_id)?;
            tx.commit()?;
            stored
        };

        info!(vessel_id = %stored.vessel_id, role = role, "方案已确认，工单进入固化");
        self.emit(&stored, AllocationEventType::Confirmed, Some(role));
        Ok(stored)
    }

    /// Active → Completed: 工单 Curing → Done，罐释放（除非仍有其它 Active）
    #[instrument(skip(self))]
    pub fn complete(&self, allocation_id: &str) -> LifecycleResult<Allocation> {
        let stored = {
            let mut conn = self.get_conn()?;
            let tx = conn.transaction()?;

            let allocation = load_allocation(&tx, allocation_id)?;
            expect_status(&allocation, &[AllocationStatus::Active], "ACTIVE")?;

            let work_orders = check_work_orders(&tx, &allocation, WorkOrderStatus::Curing)?;
            for wo in &work_orders {
                WorkOrderRepository::update_status_tx(
                    &tx,
                    &wo.wo_id,
                    wo.revision,
                    WorkOrderStatus::Done,
                    Some(wo.status),
                )?;
            }

            let vessel = load_vessel(&tx, &allocation.vessel_id)?;
            release_vessel(&tx, &vessel, allocation_id)?;

            let completed_at = now();
            let update = AllocationStatusUpdate {
                status: AllocationStatus::Completed,
                confirmed_by: None,
                cancelled_by: None,
                confirmed_at: None,
                completed_at: Some(completed_at),
                updated_at: completed_at,
            };
            AllocationRepository::update_status_tx(&tx, allocation_id, allocation.revision, &update)?;
            let stored = reload(&tx, allocation_id)?;
            tx.commit()?;
            stored
        };

        info!(vessel_id = %stored.vessel_id, "方案已完工");
        self.emit(&stored, AllocationEventType::Completed, None);
        Ok(stored)
    }

    /// Draft/Pending → Cancelled（软删除）
    ///
    /// Pending 取消时释放罐（除非仍有其它 Active）；工单状态不变
    #[instrument(skip(self))]
    pub fn cancel(&self, allocation_id: &str, role: &str) -> LifecycleResult<Allocation> {
        let stored = {
            let mut conn = self.get_conn()?;
            let tx = conn.transaction()?;

            let allocation = load_allocation(&tx, allocation_id)?;
            expect_status(
                &allocation,
                &[AllocationStatus::Draft, AllocationStatus::Pending],
                "DRAFT or PENDING",
            )?;

            if allocation.status == AllocationStatus::Pending {
                let vessel = load_vessel(&tx, &allocation.vessel_id)?;
                release_vessel(&tx, &vessel, allocation_id)?;
            }

            let at = now();
            let update = AllocationStatusUpdate {
                status: AllocationStatus::Cancelled,
                confirmed_by: None,
                cancelled_by: Some(role.to_string()),
                confirmed_at: None,
                completed_at: None,
                updated_at: at,
            };
            AllocationRepository::update_status_tx(&tx, allocation_id, allocation.revision, &update)?;
            let stored = reload(&tx, allocation_id)?;
            tx.commit()?;
            stored
        };

        info!(vessel_id = %stored.vessel_id, role = role, "方案已取消");
        self.emit(&stored, AllocationEventType::Cancelled, Some(role));
        Ok(stored)
    }

    fn emit(&self, allocation: &Allocation, event_type: AllocationEventType, actor: Option<&str>) {
        self.events.publish(AllocationEvent {
            allocation_id: allocation.allocation_id.clone(),
            vessel_id: allocation.vessel_id.clone(),
            event_type,
            actor: actor.map(str::to_string),
            wo_ids: allocation.included_wo_ids.clone(),
            occurred_at: allocation.updated_at,
        });
    }
}

// ==========================================
// 事务内辅助
// ==========================================

fn load_allocation(conn: &Connection, allocation_id: &str) -> LifecycleResult<Allocation> {
    AllocationRepository::find_by_id_tx(conn, allocation_id)?
        .ok_or_else(|| not_found("Allocation", allocation_id))
}

fn reload(conn: &Connection, allocation_id: &str) -> LifecycleResult<Allocation> {
    load_allocation(conn, allocation_id)
}

fn load_vessel(conn: &Connection, vessel_id: &str) -> LifecycleResult<Vessel> {
    VesselRepository::find_by_id_tx(conn, vessel_id)?.ok_or_else(|| not_found("Vessel", vessel_id))
}

fn expect_status(
    allocation: &Allocation,
    allowed: &[AllocationStatus],
    expected: &str,
) -> LifecycleResult<()> {
    if allowed.contains(&allocation.status) {
        Ok(())
    } else {
        Err(conflict("Allocation", &allocation.allocation_id, allocation.status, expected))
    }
}

/// 校验方案内全部工单: 存在、处于期望状态、未被其它占用中的方案占用
fn check_work_orders(
    conn: &Connection,
    allocation: &Allocation,
    expected: WorkOrderStatus,
) -> LifecycleResult<Vec<WorkOrder>> {
    let mut work_orders = Vec::with_capacity(allocation.included_wo_ids.len());
    for wo_id in &allocation.included_wo_ids {
        let wo = WorkOrderRepository::find_by_id_tx(conn, wo_id)?
            .ok_or_else(|| not_found("WorkOrder", wo_id))?;
        if wo.status != expected {
            return Err(conflict("WorkOrder", wo_id, wo.status, expected.to_db_str()));
        }
        if let Some(other) = AllocationRepository::find_claim_tx(conn, wo_id, &allocation.allocation_id)? {
            return Err(LifecycleError::WorkOrderClaimed {
                wo_id: wo_id.clone(),
                allocation_id: other,
            });
        }
        work_orders.push(wo);
    }
    Ok(work_orders)
}

/// InUse → Available，除非同罐仍有其它 Active 方案；故障/停用等外部状态不覆盖
fn release_vessel(conn: &Connection, vessel: &Vessel, allocation_id: &str) -> LifecycleResult<()> {
    if vessel.status != VesselStatus::InUse {
        warn!(vessel_id = %vessel.vessel_id, status = %vessel.status, "罐不在使用中，保持当前状态");
        return Ok(());
    }
    let active = AllocationRepository::active_on_vessel_tx(conn, &vessel.vessel_id, allocation_id)?;
    if !active.is_empty() {
        info!(vessel_id = %vessel.vessel_id, others = active.len(), "罐仍被其它 Active 方案占用");
        return Ok(());
    }
    VesselRepository::update_status_tx(conn, &vessel.vessel_id, vessel.revision, VesselStatus::Available)?;
    Ok(())
}

fn write_status(
    conn: &Connection,
    allocation: &Allocation,
    status: AllocationStatus,
    confirmed_by: Option<&str>,
    confirmed_at: Option<NaiveDateTime>,
) -> LifecycleResult<()> {
    let update = AllocationStatusUpdate {
        status,
        confirmed_by: confirmed_by.map(str::to_string),
        cancelled_by: None,
        confirmed_at,
        completed_at: None,
        updated_at: now(),
    };
    AllocationRepository::update_status_tx(conn, &allocation.allocation_id, allocation.revision, &update)?;
    Ok(())
}
