// ==========================================
// 固化罐装载分配系统 - 仓储层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 并发控制: revision 乐观锁
// ==========================================

use thiserror::Error;

/// 仓储层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    // ===== 并发控制错误 =====
    #[error("乐观锁冲突: {entity} id={id}, expected_revision={expected}, actual_revision={actual}")]
    OptimisticLockFailure {
        entity: String,
        id: String,
        expected: i64,
        actual: i64,
    },

    // ===== 数据库错误 =====
    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    #[error("数据库锁获取失败: {0}")]
    LockError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    #[error("数据库查询失败: {0}")]
    DatabaseQueryError(String),

    #[error("唯一约束违反: {0}")]
    UniqueConstraintViolation(String),

    #[error("外键约束违反: {0}")]
    ForeignKeyViolation(String),

    // ===== 数据质量错误 =====
    #[error("未知状态值 (field={field}): {value}")]
    UnknownStatus { field: String, value: String },

    #[error("序列化失败: {0}")]
    SerializationError(String),

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// 实现 From<rusqlite::Error>
impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(_, Some(msg)) => {
                if msg.contains("UNIQUE") {
                    RepositoryError::UniqueConstraintViolation(msg)
                } else if msg.contains("FOREIGN KEY") {
                    RepositoryError::ForeignKeyViolation(msg)
                } else {
                    RepositoryError::DatabaseQueryError(msg)
                }
            }
            rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound {
                entity: "Unknown".to_string(),
                id: "Unknown".to_string(),
            },
            rusqlite::Error::FromSqlConversionFailure(col, ty, inner) => {
                match inner.downcast::<RepositoryError>() {
                    Ok(repo_err) => *repo_err,
                    Err(inner) => RepositoryError::DatabaseQueryError(
                        rusqlite::Error::FromSqlConversionFailure(col, ty, inner).to_string(),
                    ),
                }
            }
            _ => RepositoryError::DatabaseQueryError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::SerializationError(err.to_string())
    }
}

/// Result 类型别名
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// 把行内文本状态解析失败转换为 rusqlite 错误（供 map_row 使用）
pub(crate) fn status_conversion_error(col: usize, field: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        col,
        rusqlite::types::Type::Text,
        Box::new(RepositoryError::UnknownStatus {
            field: field.to_string(),
            value: value.to_string(),
        }),
    )
}

/// 日期时间格式
pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub(crate) fn parse_datetime(col: usize, raw: &str) -> rusqlite::Result<chrono::NaiveDateTime> {
    chrono::NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn format_datetime(dt: &chrono::NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rusqlite_error_mapping() {
        let err: RepositoryError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, RepositoryError::NotFound { .. }));

        // 行内状态解析失败还原为原始的仓储错误
        let err: RepositoryError = status_conversion_error(3, "status", "BROKEN").into();
        assert!(matches!(err, RepositoryError::UnknownStatus { ref value, .. } if value == "BROKEN"));

        let err: RepositoryError = rusqlite::Error::InvalidColumnIndex(7).into();
        assert!(matches!(err, RepositoryError::DatabaseQueryError(_)));

        let err: RepositoryError = parse_datetime(0, "not-a-date").unwrap_err().into();
        assert!(matches!(err, RepositoryError::DatabaseQueryError(_)));
    }
}
