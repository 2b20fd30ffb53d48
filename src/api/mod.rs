// ==========================================
// 固化罐装载分配系统 - API 层
// ==========================================
// 职责: 对外业务接口（分配运行、生命周期、目录数据）
// ==========================================

pub mod allocation_api;
pub mod catalog_api;
pub mod error;

// 重导出核心类型
pub use allocation_api::{AllocationApi, AutomaticRunResult, RunConflict};
pub use catalog_api::CatalogApi;
pub use error::{ApiError, ApiResult};
