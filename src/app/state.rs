// ==========================================
// 抽样方案引擎 - 应用状态
// ==========================================
// 职责: 打开数据库、组装 Repository / Engine / API，作为调用方的共享入口
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::api::{AuditTrail, GroupBindingApi, ImportApi, NqaApi, PlanApi, SamplingRangeApi};
use crate::config::config_manager::ConfigManager;
use crate::directory::{GroupDirectory, SqliteGroupDirectory};
use crate::engine::{GroupBindingResolver, NqaRegistry, PlanLookupService, RangePartitionStore};
use crate::importer::{SamplingTableImporterImpl, UniversalFileParser};
use crate::repository::{
    AuditLogRepository, AuditSink, GroupBindingRepository, QualityLevelRepository,
    SamplingRangeRepository,
};

/// 数据库路径环境变量
pub const DB_PATH_ENV: &str = "SAMPLING_PLAN_DB_PATH";

/// 应用状态
///
/// 所有组件共享同一个连接（Arc<Mutex<Connection>>）
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// NQA 管理API
    pub nqa_api: Arc<NqaApi>,

    /// 抽样区间API
    pub sampling_range_api: Arc<SamplingRangeApi>,

    /// 分组绑定API
    pub group_binding_api: Arc<GroupBindingApi>,

    /// 抽样方案查询API
    pub plan_api: Arc<PlanApi>,

    /// 抽样表导入API
    pub import_api: Arc<ImportApi>,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 审计日志仓储（用于审计追踪查询）
    pub audit_log_repo: Arc<AuditLogRepository>,
}

impl AppState {
    /// 创建新的AppState实例（分组目录读取同库的 product_group 表）
    ///
    /// # 返回
    /// - Err(String): 数据库无法打开或建表失败
    pub fn new(db_path: String) -> Result<Self, String> {
        let conn = crate::db::open_and_init(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));
        let directory: Arc<dyn GroupDirectory> = Arc::new(SqliteGroupDirectory::new(conn.clone()));
        Self::assemble(db_path, conn, directory)
    }

    /// 使用外部提供的分组目录
    pub fn with_directory(db_path: String, directory: Arc<dyn GroupDirectory>) -> Result<Self, String> {
        let conn = crate::db::open_and_init(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        Self::assemble(db_path, Arc::new(Mutex::new(conn)), directory)
    }

    fn assemble(
        db_path: String,
        conn: Arc<Mutex<Connection>>,
        directory: Arc<dyn GroupDirectory>,
    ) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        // ==========================================
        // Repository 层
        // ==========================================
        let level_repo = Arc::new(QualityLevelRepository::new(conn.clone()));
        let range_repo = Arc::new(SamplingRangeRepository::new(conn.clone()));
        let binding_repo = Arc::new(GroupBindingRepository::new(conn.clone()));
        let audit_log_repo = Arc::new(AuditLogRepository::new(conn.clone()));

        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );

        // ==========================================
        // Engine 层
        // ==========================================
        let registry = Arc::new(NqaRegistry::new(
            conn.clone(),
            level_repo.clone(),
            config_manager.clone(),
        ));
        let store = Arc::new(RangePartitionStore::new(
            conn.clone(),
            range_repo.clone(),
            level_repo.clone(),
            config_manager.clone(),
        ));
        let resolver = Arc::new(GroupBindingResolver::new(
            conn.clone(),
            binding_repo.clone(),
            directory,
        ));
        let plan_service = Arc::new(PlanLookupService::new(
            resolver.clone(),
            store.clone(),
            level_repo,
            range_repo,
            binding_repo,
        ));

        // ==========================================
        // API 层
        // ==========================================
        let sink: Arc<dyn AuditSink> = audit_log_repo.clone();
        let audit = Arc::new(AuditTrail::new(sink, config_manager.clone()));

        let importer = Arc::new(SamplingTableImporterImpl::new(
            conn,
            config_manager.clone(),
            Box::new(UniversalFileParser),
        ));

        Ok(Self {
            db_path,
            nqa_api: Arc::new(NqaApi::new(registry.clone(), config_manager.clone(), audit.clone())),
            sampling_range_api: Arc::new(SamplingRangeApi::new(store, config_manager.clone(), audit.clone())),
            group_binding_api: Arc::new(GroupBindingApi::new(resolver, config_manager.clone(), audit.clone())),
            plan_api: Arc::new(PlanApi::new(plan_service, registry, config_manager.clone())),
            import_api: Arc::new(ImportApi::new(importer, audit)),
            config_manager,
            audit_log_repo,
        })
    }
}

/// 默认数据库路径
///
/// 优先级: 环境变量 SAMPLING_PLAN_DB_PATH > 用户数据目录 > 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./sampling_plan.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("sampling-plan");
        // 目录创建失败时回退到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("sampling_plan.db");
        }
    }

    path.to_string_lossy().to_string()
}
