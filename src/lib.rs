// ==========================================
// 固化罐装载分配系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 装罐决策支持 (人工最终确认)
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 分组 / 选罐 / 排布 / 生命周期
pub mod engine;

// 导入层 - 外部目录数据
pub mod importer;

// 配置层 - 分配参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 共享状态组装
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    AllocationStatus, ExclusionReason, Level, PackingStatus, VesselStatus, WorkOrderStatus,
};

// 领域实体
pub use domain::{Allocation, CureCycle, Exclusion, Placement, Vessel, WorkOrder};

// 引擎
pub use engine::{
    AllocationLifecycle, AllocationRunner, CycleGrouper, GeometricPacker, RunOutcome,
    VesselSelector,
};

// API
pub use api::{AllocationApi, ApiError, CatalogApi};

// 配置
pub use config::AllocationConfig;

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "固化罐装载分配系统";
