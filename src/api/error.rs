// ==========================================
// 抽样方案引擎 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，转换Repository/导入错误为调用方可分支的错误
// 说明: code() 提供稳定的错误码，供传输层映射；只有 STORAGE_UNAVAILABLE 可重试
// ==========================================

use crate::config::ConfigManager;
use crate::importer::error::ImportError;
use crate::repository::error::{RepositoryError, RepositoryResult};
use std::time::Duration;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 输入错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("数据验证失败: {0}")]
    ValidationError(String),

    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("抽样区间重叠: 与区间 {range_id} [{lot_min}, {lot_max}] 相交")]
    RangeOverlap {
        range_id: String,
        lot_min: i64,
        lot_max: i64,
    },

    #[error("NQA 代码已存在: {0}")]
    DuplicateCode(String),

    #[error("分组已绑定: group_id={group_id}, level_id={level_id}")]
    AlreadyBound { group_id: i64, level_id: String },

    /// 删除仍被引用的实体
    #[error("存在引用冲突: {0}")]
    Conflict(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    /// 存储暂不可用（唯一可重试的类别）
    #[error("存储暂不可用: {0}")]
    StorageUnavailable(String),

    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    // ==========================================
    // 导入错误
    // ==========================================
    #[error("文件导入失败: {0}")]
    ImportError(String),

    #[error("导入被拒绝 (行 {row}): {message}")]
    ImportRowRejected { row: usize, code: String, message: String },

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// 稳定错误码
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) | ApiError::ValidationError(_) => "VALIDATION_ERROR",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::RangeOverlap { .. } => "RANGE_OVERLAP",
            ApiError::DuplicateCode(_) => "DUPLICATE_CODE",
            ApiError::AlreadyBound { .. } => "ALREADY_BOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::BusinessRuleViolation(_) => "BUSINESS_RULE_VIOLATION",
            ApiError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            ApiError::DatabaseError(_) | ApiError::DatabaseConnectionError(_) => "DATABASE_ERROR",
            ApiError::ImportError(_) => "IMPORT_ERROR",
            ApiError::ImportRowRejected { .. } => "IMPORT_ROW_REJECTED",
            ApiError::InternalError(_) | ApiError::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否可重试（仅存储暂不可用）
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::StorageUnavailable(_))
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            // 业务规则错误
            RepositoryError::RangeOverlap {
                range_id,
                lot_min,
                lot_max,
            } => ApiError::RangeOverlap {
                range_id,
                lot_min,
                lot_max,
            },
            RepositoryError::DuplicateCode { code } => ApiError::DuplicateCode(code),
            RepositoryError::AlreadyBound { group_id, level_id } => {
                ApiError::AlreadyBound { group_id, level_id }
            }
            RepositoryError::ReferencedEntity {
                entity,
                id,
                ranges,
                bindings,
            } => ApiError::Conflict(format!(
                "{}(id={})仍被引用: 区间 {} 条, 分组绑定 {} 条",
                entity, id, ranges, bindings
            )),
            RepositoryError::BusinessRuleViolation(msg) => ApiError::BusinessRuleViolation(msg),

            // 数据质量错误
            RepositoryError::ValidationError(msg) => ApiError::ValidationError(msg),
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }

            // 数据库错误
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::StorageUnavailable(msg) => ApiError::StorageUnavailable(msg),
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseTransactionError(msg) | RepositoryError::DatabaseQueryError(msg) => {
                ApiError::DatabaseError(msg)
            }
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }

            // 通用错误
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 ImportError 转换
// ==========================================
impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::RowRejected { row, source } => {
                let inner = ApiError::from(source);
                ApiError::ImportRowRejected {
                    row,
                    code: inner.code().to_string(),
                    message: inner.to_string(),
                }
            }
            ImportError::Repository(e) => ApiError::from(e),
            ImportError::Other(e) => ApiError::Other(e),
            other => ApiError::ImportError(other.to_string()),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

/// 存储暂不可用时按配置重试；业务规则错误立即返回
///
/// 重试间隔 50ms、100ms ... 递增
pub fn retry_transient<T, F>(config: &ConfigManager, op: &str, mut f: F) -> ApiResult<T>
where
    F: FnMut() -> RepositoryResult<T>,
{
    let max_retries = config
        .get_storage_retry_attempts()
        .unwrap_or(crate::config::config_manager::DEFAULT_STORAGE_RETRY_ATTEMPTS);

    let mut attempt: u32 = 0;
    loop {
        match f() {
            Err(e) if e.is_retryable() && attempt < max_retries => {
                attempt += 1;
                tracing::warn!(op, attempt, error = %e, "存储暂不可用，重试");
                std::thread::sleep(Duration::from_millis(50 * u64::from(attempt)));
            }
            result => return result.map_err(ApiError::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use std::cell::Cell;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_repository_error_conversion() {
        let api_err: ApiError = RepositoryError::not_found("QualityLevel", "L1").into();
        match api_err {
            ApiError::NotFound(ref msg) => {
                assert!(msg.contains("QualityLevel"));
                assert!(msg.contains("L1"));
            }
            _ => panic!("Expected NotFound"),
        }
        assert_eq!(api_err.code(), "NOT_FOUND");

        let api_err: ApiError = RepositoryError::ReferencedEntity {
            entity: "QualityLevel".to_string(),
            id: "L1".to_string(),
            ranges: 3,
            bindings: 1,
        }
        .into();
        assert_eq!(api_err.code(), "CONFLICT");
        assert!(!api_err.is_retryable());

        let api_err: ApiError = RepositoryError::StorageUnavailable("database is locked".to_string()).into();
        assert_eq!(api_err.code(), "STORAGE_UNAVAILABLE");
        assert!(api_err.is_retryable());
    }

    #[test]
    fn test_import_row_rejection_keeps_inner_code() {
        let api_err: ApiError = ImportError::RowRejected {
            row: 4,
            source: RepositoryError::RangeOverlap {
                range_id: "R1".to_string(),
                lot_min: 2,
                lot_max: 8,
            },
        }
        .into();
        match api_err {
            ApiError::ImportRowRejected { row, ref code, .. } => {
                assert_eq!(row, 4);
                assert_eq!(code, "RANGE_OVERLAP");
            }
            _ => panic!("Expected ImportRowRejected"),
        }
    }

    fn config() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_retry_transient_retries_only_storage_errors() {
        let config = config();

        let calls = Cell::new(0);
        let result: ApiResult<i32> = retry_transient(&config, "test", || {
            calls.set(calls.get() + 1);
            if calls.get() == 1 {
                Err(RepositoryError::StorageUnavailable("busy".to_string()))
            } else {
                Ok(7)
            }
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.get(), 2);

        let calls = Cell::new(0);
        let result: ApiResult<i32> = retry_transient(&config, "test", || {
            calls.set(calls.get() + 1);
            Err(RepositoryError::DuplicateCode {
                code: "2.5".to_string(),
            })
        });
        assert!(matches!(result, Err(ApiError::DuplicateCode(_))));
        assert_eq!(calls.get(), 1);
    }
}
