// ==========================================
// 固化罐装载分配系统 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// 所有仓储共享同一个 SQLite 连接，保证生命周期事务跨仓储一致
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::api::{AllocationApi, CatalogApi};
use crate::config::ConfigManager;
use crate::engine::{AllocationEventPublisher, AllocationLifecycle, OptionalEventPublisher};
use crate::importer::CatalogImporter;
use crate::repository::{
    AllocationRepository, CureCycleRepository, VesselRepository, WorkOrderRepository,
};

/// 应用状态
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 共享连接
    pub conn: Arc<Mutex<Connection>>,

    /// 分配方案API
    pub allocation_api: Arc<AllocationApi>,

    /// 目录数据API
    pub catalog_api: Arc<CatalogApi>,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,
}

impl AppState {
    /// 创建新的AppState实例（不挂事件订阅者）
    pub fn new(db_path: String) -> Result<Self, String> {
        Self::with_event_publisher(db_path, OptionalEventPublisher::none())
    }

    /// 创建AppState并挂接方案生命周期事件订阅者
    pub fn with_publisher(
        db_path: String,
        publisher: Arc<dyn AllocationEventPublisher>,
    ) -> Result<Self, String> {
        Self::with_event_publisher(db_path, OptionalEventPublisher::with_publisher(publisher))
    }

    fn with_event_publisher(db_path: String, events: OptionalEventPublisher) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        // ==========================================
        // 初始化数据库
        // ==========================================
        let conn = crate::db::open_sqlite_connection(&db_path)
            .map_err(|e| format!("无法打开数据库: {}", e))?;
        crate::db::init_schema(&conn).map_err(|e| format!("无法初始化数据库schema: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 初始化Repository层
        // ==========================================
        let work_order_repo = Arc::new(WorkOrderRepository::new(conn.clone()));
        let vessel_repo = Arc::new(VesselRepository::new(conn.clone()));
        let cure_cycle_repo = Arc::new(CureCycleRepository::new(conn.clone()));
        let allocation_repo = Arc::new(AllocationRepository::new(conn.clone()));

        // 配置管理器
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );

        // ==========================================
        // 初始化Engine层
        // ==========================================
        if events.is_configured() {
            tracing::info!("方案生命周期事件订阅者已挂接");
        }
        let lifecycle = Arc::new(AllocationLifecycle::new(conn.clone(), events));

        // 导入器持有独立的仓储句柄（同一连接）
        let importer = Arc::new(CatalogImporter::new(
            WorkOrderRepository::new(conn.clone()),
            VesselRepository::new(conn.clone()),
            CureCycleRepository::new(conn.clone()),
        ));

        // ==========================================
        // 初始化API层
        // ==========================================
        let allocation_api = Arc::new(AllocationApi::new(
            work_order_repo.clone(),
            vessel_repo.clone(),
            cure_cycle_repo,
            allocation_repo,
            lifecycle,
        ));
        let catalog_api = Arc::new(CatalogApi::new(importer, work_order_repo, vessel_repo));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            conn,
            allocation_api,
            catalog_api,
            config_manager,
        })
    }
}

/// 获取默认数据库路径
///
/// 优先级: 环境变量 AUTOCLAVE_APS_DB_PATH > 用户数据目录 > 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("AUTOCLAVE_APS_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./autoclave_aps.db");

    if let Some(data_dir) = dirs::data_dir() {
        #[cfg(debug_assertions)]
        {
            path = data_dir.join("autoclave-aps-dev");
        }

        #[cfg(not(debug_assertions))]
        {
            path = data_dir.join("autoclave-aps");
        }

        // 目录创建失败时由 open 报错
        std::fs::create_dir_all(&path).ok();
        path = path.join("autoclave_aps.db");
    }

    path.to_string_lossy().to_string()
}
