// ==========================================
// 抽样方案引擎 - 仓储层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 说明: 业务规则违反（重叠/重复代码/已绑定/被引用）与存储故障分开建模，
//       只有 StorageUnavailable 属于可重试类别
// ==========================================

use rusqlite::ErrorCode;
use thiserror::Error;

/// 仓储层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    // ===== 业务规则错误 =====
    #[error("抽样区间重叠: 与区间 {range_id} [{lot_min}, {lot_max}] 相交")]
    RangeOverlap {
        range_id: String,
        lot_min: i64,
        lot_max: i64,
    },

    #[error("NQA 代码已存在: {code}")]
    DuplicateCode { code: String },

    #[error("分组已绑定: group_id={group_id}, level_id={level_id}")]
    AlreadyBound { group_id: i64, level_id: String },

    #[error("仍被引用，无法删除: {entity}(id={id}) 引用数: 区间={ranges}, 分组={bindings}")]
    ReferencedEntity {
        entity: String,
        id: String,
        ranges: i64,
        bindings: i64,
    },

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    // ===== 数据质量错误 =====
    #[error("数据验证失败: {0}")]
    ValidationError(String),

    #[error("字段值错误 (field={field}): {message}")]
    FieldValueError { field: String, message: String },

    // ===== 数据库错误 =====
    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    #[error("存储暂不可用: {0}")]
    StorageUnavailable(String),

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

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RepositoryError {
    /// 构造 NotFound
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        RepositoryError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    /// 构造字段错误
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        RepositoryError::FieldValueError {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// 是否可重试（仅存储暂不可用）
    pub fn is_retryable(&self) -> bool {
        matches!(self, RepositoryError::StorageUnavailable(_))
    }
}

// 实现 From<rusqlite::Error>
impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref e, ref msg)
                if matches!(
                    e.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::CannotOpen
                ) =>
            {
                RepositoryError::StorageUnavailable(
                    msg.clone().unwrap_or_else(|| e.to_string()),
                )
            }
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
            _ => RepositoryError::DatabaseQueryError(err.to_string()),
        }
    }
}

/// Result 类型别名
pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_maps_to_storage_unavailable() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        );
        let repo_err: RepositoryError = err.into();
        assert!(repo_err.is_retryable());
    }

    #[test]
    fn test_unique_violation_is_not_retryable() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            Some("UNIQUE constraint failed: quality_level.code".to_string()),
        );
        let repo_err: RepositoryError = err.into();
        assert!(matches!(repo_err, RepositoryError::UniqueConstraintViolation(_)));
        assert!(!repo_err.is_retryable());
    }
}
