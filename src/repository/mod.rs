// ==========================================
// 抽样方案引擎 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod audit_log_repo;
pub mod error;
pub mod group_binding_repo;
pub mod quality_level_repo;
pub mod sampling_range_repo;

// 重导出核心仓储
pub use audit_log_repo::{AuditLogRepository, AuditSink, NoOpAuditSink};
pub use error::{RepositoryError, RepositoryResult};
pub use group_binding_repo::GroupBindingRepository;
pub use quality_level_repo::QualityLevelRepository;
pub use sampling_range_repo::SamplingRangeRepository;
