// ==========================================
// 抽样方案引擎 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件格式不支持: {0}（仅支持 .xlsx/.xls/.csv）")]
    UnsupportedFormat(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("Excel 解析失败: {0}")]
    ExcelParseError(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    #[error("文件没有数据行")]
    EmptyFile,

    // ===== 数据映射错误 =====
    #[error("缺少必需列: {0}")]
    MissingColumn(String),

    #[error("类型转换失败 (行 {row}, 字段 {field}): {message}")]
    TypeConversionError {
        row: usize,
        field: String,
        message: String,
    },

    // ===== 业务规则错误 =====
    /// 行被业务规则拒绝（字段校验、重叠、NQA 停用等），整个文件回滚
    #[error("第 {row} 行被拒绝: {source}")]
    RowRejected {
        row: usize,
        #[source]
        source: RepositoryError,
    },

    // ===== 数据库错误 =====
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    // ===== 通用错误 =====
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    /// 存储暂不可用时可重试；行级拒绝与文件问题均不可重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, ImportError::Repository(e) if e.is_retryable())
    }
}

// ==========================================
// 底层错误转换
// ==========================================
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_storage_unavailable_is_retryable() {
        let busy = ImportError::from(RepositoryError::StorageUnavailable("database is locked".to_string()));
        assert!(busy.is_retryable());

        let rejected = ImportError::RowRejected {
            row: 3,
            source: RepositoryError::StorageUnavailable("database is locked".to_string()),
        };
        assert!(!rejected.is_retryable());
        assert!(!ImportError::MissingColumn("lot_min".to_string()).is_retryable());
    }

    #[test]
    fn test_row_rejected_message_names_row() {
        let err = ImportError::RowRejected {
            row: 7,
            source: RepositoryError::ValidationError("re 必须大于 ac".to_string()),
        };
        assert!(err.to_string().starts_with("第 7 行被拒绝"));
    }
}
