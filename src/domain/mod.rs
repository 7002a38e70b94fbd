// ==========================================
// 抽样方案引擎 - 领域模型层
// ==========================================
// 职责: 定义领域实体、输入结构、纯校验规则
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod audit_log;
pub mod group_binding;
pub mod plan;
pub mod quality_level;
pub mod sampling_range;
pub mod types;

// 重导出核心类型
pub use audit_log::{AuditAction, AuditEntity, AuditLog, FieldChange};
pub use group_binding::{BindingResolution, GroupBinding};
pub use plan::{PlanOutcome, PlanSummary, RangeLookup, SamplingPlan};
pub use quality_level::{
    normalize_code, QualityLevel, QualityLevelDraft, QualityLevelPatch, ValidQualityLevel,
};
pub use sampling_range::{RangeDraft, RangePatch, SamplingRange, ShelfLife, ValidRange};
pub use types::InspectionRigor;
