// ==========================================
// 固化罐装载分配系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod allocation_repo;
pub mod catalog;
pub mod cure_cycle_repo;
pub mod error;
pub mod vessel_repo;
pub mod work_order_repo;

// 重导出核心仓储
pub use allocation_repo::{AllocationRepository, AllocationStatusUpdate};
pub use catalog::{CureCycleCatalog, VesselCatalog, WorkOrderCatalog};
pub use cure_cycle_repo::CureCycleRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use vessel_repo::VesselRepository;
pub use work_order_repo::WorkOrderRepository;
