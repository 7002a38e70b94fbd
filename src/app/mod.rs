// ==========================================
// 抽样方案引擎 - 应用层
// ==========================================
// 职责: 组装各层组件，供 CLI / 传输层使用
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState, DB_PATH_ENV};
