// ==========================================
// 固化罐装载分配系统 - 应用层
// ==========================================
// 职责: 组装仓储 / 引擎 / API 的共享状态
// ==========================================

pub mod state;

pub use state::{get_default_db_path, AppState};
