// ==========================================
// 抽样方案引擎 - 核心库
// ==========================================
// 职责: 来料批次抽样检验的决策核心
//   NQA 注册 / 抽样区间分区 / 产品分组绑定 / 抽样方案查询
// 技术栈: Rust + SQLite
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 导入层 - 外部抽样表
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA/事务）
pub mod db;

// 产品分组目录（外部协作方）
pub mod directory;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 组件装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域实体
pub use domain::{
    BindingResolution, GroupBinding, InspectionRigor, PlanOutcome, QualityLevel, RangeLookup,
    SamplingPlan, SamplingRange,
};

// 引擎
pub use engine::{GroupBindingResolver, NqaRegistry, PlanLookupService, RangePartitionStore};

// API
pub use api::{GroupBindingApi, ImportApi, NqaApi, PlanApi, SamplingRangeApi};

// 应用状态
pub use app::AppState;

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "抽样方案引擎";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
