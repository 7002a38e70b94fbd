// ==========================================
// 抽样方案引擎 - API 层
// ==========================================
// 职责: 提供业务 API 接口（请求校验、重试、审计、错误映射），供传输层或 CLI 调用
// ==========================================

pub mod audit;
pub mod error;
pub mod group_binding_api;
pub mod import_api;
pub mod nqa_api;
pub mod plan_api;
pub mod sampling_range_api;

// 重导出核心类型
pub use audit::AuditTrail;
pub use error::{ApiError, ApiResult};
pub use group_binding_api::{BindGroupRequest, GroupBindingApi};
pub use import_api::{ImportApi, ImportApiResponse};
pub use nqa_api::{CreateQualityLevelRequest, NqaApi, UpdateQualityLevelRequest};
pub use plan_api::PlanApi;
pub use sampling_range_api::{RangeCreatedWithCode, RangeInput, SamplingRangeApi};
