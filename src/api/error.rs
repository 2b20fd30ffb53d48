// ==========================================
// 固化罐装载分配系统 - API层错误类型
// ==========================================
// 职责: 把仓储/生命周期/导入错误转换为调用方可处理的类型化错误
// 状态冲突必须带出实体的当前实际状态
// ==========================================

use crate::engine::lifecycle::LifecycleError;
use crate::importer::error::ImportError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 分配错误
    // ==========================================
    /// 工单或罐数据不完整/不合法
    #[error("数据验证失败: {0}")]
    ValidationError(String),

    /// 没有罐能接收
    #[error("容量不足: {0}")]
    CapacityError(String),

    /// 生命周期流转前置条件不满足
    #[error("状态冲突: {message} (当前状态: {current_state})")]
    StateConflict {
        message: String,
        current_state: String,
    },

    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    // ==========================================
    // 并发控制错误
    // ==========================================
    /// 并发写入输家（revision 已变化）
    #[error("并发冲突: {0}")]
    Conflict(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("文件导入失败: {0}")]
    ImportError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// 状态冲突时的当前状态
    pub fn current_state(&self) -> Option<&str> {
        match self {
            ApiError::StateConflict { current_state, .. } => Some(current_state.as_str()),
            _ => None,
        }
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::OptimisticLockFailure {
                entity,
                id,
                expected,
                actual,
            } => ApiError::Conflict(format!(
                "{}(id={})已被其他操作修改（期望revision={}，实际revision={}）",
                entity, id, expected, actual
            )),
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseTransactionError(msg) | RepositoryError::DatabaseQueryError(msg) => {
                ApiError::DatabaseError(msg)
            }
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::Conflict(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::InvalidInput(format!("外键约束违反: {}", msg))
            }
            RepositoryError::UnknownStatus { field, value } => {
                ApiError::DatabaseError(format!("未知状态值 (field={}): {}", field, value))
            }
            RepositoryError::SerializationError(msg) => ApiError::InternalError(msg),
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 LifecycleError 转换
// ==========================================
impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::StateConflict {
                entity,
                id,
                current,
                expected,
            } => ApiError::StateConflict {
                message: format!("{} {} 需要状态 {}", entity, id, expected),
                current_state: current,
            },
            LifecycleError::WorkOrderClaimed { wo_id, allocation_id } => ApiError::StateConflict {
                message: format!("工单 {} 已被其它方案占用", wo_id),
                current_state: format!("CLAIMED_BY {}", allocation_id),
            },
            LifecycleError::Repository(err) => ApiError::from(err),
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::Repository(err) => ApiError::from(err),
            ImportError::FileNotFound(path) => ApiError::NotFound(format!("文件 {}", path)),
            ImportError::UnsupportedFormat(ext) => ApiError::InvalidInput(format!("文件格式不支持: {}", ext)),
            other => ApiError::ImportError(other.to_string()),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
