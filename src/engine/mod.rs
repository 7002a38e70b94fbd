// ==========================================
// 抽样方案引擎 - 引擎层
// ==========================================
// 职责: 实现业务规则（唯一性、重叠、引用、绑定），不拼 SQL
// 红线: 先检查后写入的序列必须在同一事务内完成
// ==========================================

pub mod binding_resolver;
pub mod nqa_registry;
pub mod plan_lookup;
pub mod range_partition;
pub mod range_store;

use serde::{Deserialize, Serialize};

// 重导出核心引擎
pub use binding_resolver::GroupBindingResolver;
pub use nqa_registry::{AutoLevelDefaults, LevelResolution, NqaRegistry};
pub use plan_lookup::PlanLookupService;
pub use range_partition::{RangeGap, RangeListing, RangePartition};
pub use range_store::RangePartitionStore;

/// 更新操作的前后状态（供审计计算差异）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change<T> {
    pub before: T,
    pub after: T,
}
