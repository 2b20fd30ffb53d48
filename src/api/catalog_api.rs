// ==========================================
// 固化罐装载分配系统 - 目录数据 API
// ==========================================
// 职责: 目录导入、车间外部状态输入（罐故障/维护、工单流转）
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::domain::types::{VesselStatus, WorkOrderStatus};
use crate::domain::vessel::Vessel;
use crate::domain::work_order::WorkOrder;
use crate::importer::{CatalogImporter, ImportSummary};
use crate::repository::{VesselRepository, WorkOrderRepository};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub struct CatalogApi {
    importer: Arc<CatalogImporter>,
    work_order_repo: Arc<WorkOrderRepository>,
    vessel_repo: Arc<VesselRepository>,
}

impl CatalogApi {
    pub fn new(
        importer: Arc<CatalogImporter>,
        work_order_repo: Arc<WorkOrderRepository>,
        vessel_repo: Arc<VesselRepository>,
    ) -> Self {
        Self {
            importer,
            work_order_repo,
            vessel_repo,
        }
    }

    // ===== 导入 =====

    pub async fn import_work_orders(&self, file_path: &Path) -> ApiResult<ImportSummary> {
        Ok(self.importer.import_work_orders(file_path).await?)
    }

    pub async fn import_vessels(&self, file_path: &Path) -> ApiResult<ImportSummary> {
        Ok(self.importer.import_vessels(file_path).await?)
    }

    pub async fn import_cure_cycles(&self, file_path: &Path) -> ApiResult<ImportSummary> {
        Ok(self.importer.import_cure_cycles(file_path).await?)
    }

    // ===== 外部状态输入 =====

    /// 设备系统上报的罐状态（故障、停机、维护、恢复）
    ///
    /// InUse 只由生命周期管理器写入，这里拒绝
    pub fn set_vessel_status(
        &self,
        vessel_id: &str,
        status: VesselStatus,
        expected_revision: Option<i64>,
    ) -> ApiResult<Vessel> {
        if status == VesselStatus::InUse {
            return Err(ApiError::InvalidInput(
                "IN_USE 只能由分配方案流转产生".to_string(),
            ));
        }
        let vessel = self.vessel_repo.set_status(vessel_id, status, expected_revision)?;
        info!(vessel_id = %vessel_id, status = %status, "罐状态已更新");
        Ok(vessel)
    }

    /// 车间工单流转（Preparing → InProgress → AwaitingCure）
    ///
    /// Curing / Done 只由生命周期管理器写入，这里拒绝
    pub fn set_work_order_status(
        &self,
        wo_id: &str,
        status: WorkOrderStatus,
        expected_revision: Option<i64>,
    ) -> ApiResult<WorkOrder> {
        if matches!(status, WorkOrderStatus::Curing | WorkOrderStatus::Done) {
            return Err(ApiError::InvalidInput(format!(
                "{} 只能由分配方案流转产生",
                status
            )));
        }
        let wo = self.work_order_repo.set_status(wo_id, status, expected_revision)?;
        info!(wo_id = %wo_id, status = %status, "工单状态已更新");
        Ok(wo)
    }

    pub fn list_vessels(&self) -> ApiResult<Vec<Vessel>> {
        Ok(self.vessel_repo.list_all()?)
    }

    pub fn list_work_orders(&self) -> ApiResult<Vec<WorkOrder>> {
        Ok(self.work_order_repo.list_all()?)
    }
}
