// ==========================================
// 固化罐装载分配系统 - 配置层
// ==========================================
// 职责: 分配参数管理
// 存储: config_kv 表
// ==========================================

pub mod allocation_config;
pub mod config_manager;

// 重导出核心配置类型
pub use allocation_config::{AllocationConfig, OptimizationPriority, ScoreWeights};
pub use config_manager::{config_keys, ConfigManager};
