// ==========================================
// 固化罐装载分配系统 - 外部目录接口
// ==========================================
// 职责: 分配运行读取工单 / 固化罐 / 固化曲线的数据源抽象
// 实现者: SQLite 仓储（测试可替换为内存实现）
// 红线: 只读，不含业务规则
// ==========================================

use crate::domain::types::WorkOrderStatus;
use crate::domain::vessel::Vessel;
use crate::domain::work_order::{CureCycle, WorkOrder};
use crate::repository::cure_cycle_repo::CureCycleRepository;
use crate::repository::error::RepositoryResult;
use crate::repository::vessel_repo::VesselRepository;
use crate::repository::work_order_repo::WorkOrderRepository;
use async_trait::async_trait;

// ==========================================
// WorkOrderCatalog Trait
// ==========================================
#[async_trait]
pub trait WorkOrderCatalog: Send + Sync {
    /// 全部待固化工单
    async fn awaiting_cure(&self) -> RepositoryResult<Vec<WorkOrder>>;

    /// 按 id 查询（不存在的 id 不返回）
    async fn find_work_orders(&self, wo_ids: &[String]) -> RepositoryResult<Vec<WorkOrder>>;
}

#[async_trait]
pub trait VesselCatalog: Send + Sync {
    async fn vessels(&self) -> RepositoryResult<Vec<Vessel>>;
}

#[async_trait]
pub trait CureCycleCatalog: Send + Sync {
    async fn cure_cycles(&self) -> RepositoryResult<Vec<CureCycle>>;
}

// ==========================================
// SQLite 仓储实现
// ==========================================

#[async_trait]
impl WorkOrderCatalog for WorkOrderRepository {
    async fn awaiting_cure(&self) -> RepositoryResult<Vec<WorkOrder>> {
        self.list_by_status(WorkOrderStatus::AwaitingCure)
    }

    async fn find_work_orders(&self, wo_ids: &[String]) -> RepositoryResult<Vec<WorkOrder>> {
        self.find_by_ids(wo_ids)
    }
}

#[async_trait]
impl VesselCatalog for VesselRepository {
    async fn vessels(&self) -> RepositoryResult<Vec<Vessel>> {
        self.list_all()
    }
}

#[async_trait]
impl CureCycleCatalog for CureCycleRepository {
    async fn cure_cycles(&self) -> RepositoryResult<Vec<CureCycle>> {
        self.list_all()
    }
}
