// ==========================================
// 固化罐装载分配系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod allocation;
pub mod types;
pub mod vessel;
pub mod work_order;

// 重导出核心类型
pub use allocation::{Allocation, AllocationMetrics, Exclusion, LevelMetrics, Placement};
pub use types::{
    AllocationStatus, ErrorCategory, ExclusionReason, Level, PackingStatus, VesselStatus,
    WorkOrderStatus,
};
pub use vessel::{ElevatedLevel, Vessel};
pub use work_order::{CureCycle, CureStage, ToolFootprint, WorkOrder};
