// ==========================================
// 抽样方案引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::db::{configure_sqlite_connection, open_sqlite_connection};
use crate::domain::types::InspectionRigor;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

// ==========================================
// 配置键
// ==========================================
pub mod config_keys {
    // 自动创建 NQA（按代码解析或创建）
    pub const AUTO_LEVEL_RIGOR: &str = "auto_level_rigor";
    pub const AUTO_LEVEL_NAME_TEMPLATE: &str = "auto_level_name_template";

    // 存储暂不可用时的重试次数
    pub const STORAGE_RETRY_ATTEMPTS: &str = "storage_retry_attempts";

    // 审计
    pub const AUDIT_ENABLED: &str = "audit_enabled";
}

/// 自动创建 NQA 的默认名称模板（{code} 替换为规范化代码）
pub const DEFAULT_AUTO_LEVEL_NAME_TEMPLATE: &str = "{code}";

/// 默认重试次数
pub const DEFAULT_STORAGE_RETRY_ATTEMPTS: u32 = 1;

/// 重试次数上限
const MAX_STORAGE_RETRY_ATTEMPTS: u32 = 5;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例（独立连接）
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            configure_sqlite_connection(&guard)?;
        }
        Ok(Self { conn })
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取 global scope 的配置值
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入 global scope 的配置值（存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at) VALUES ('global', ?1, ?2, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    fn get_config_or_default(&self, key: &str, default: &str) -> RepositoryResult<String> {
        Ok(self
            .get_global_config_value(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// 获取所有配置的快照（JSON格式）
    pub fn get_config_snapshot(&self) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(json!(config_map).to_string())
    }

    // ===== 自动创建 NQA =====

    /// 自动创建 NQA 的检验严格度
    ///
    /// # 默认值
    /// - NORMAL（配置值无法识别时同样回退）
    pub fn get_auto_level_rigor(&self) -> RepositoryResult<InspectionRigor> {
        let value = self.get_config_or_default(config_keys::AUTO_LEVEL_RIGOR, "NORMAL")?;
        Ok(InspectionRigor::parse(&value).unwrap_or_else(|| {
            tracing::warn!("auto_level_rigor 配置值无法识别: {}，使用 NORMAL", value);
            InspectionRigor::Normal
        }))
    }

    /// 自动创建 NQA 的名称模板
    pub fn get_auto_level_name_template(&self) -> RepositoryResult<String> {
        self.get_config_or_default(
            config_keys::AUTO_LEVEL_NAME_TEMPLATE,
            DEFAULT_AUTO_LEVEL_NAME_TEMPLATE,
        )
    }

    /// 按模板生成自动创建 NQA 的名称
    pub fn render_auto_level_name(&self, code: &str) -> RepositoryResult<String> {
        let template = self.get_auto_level_name_template()?;
        let name = template.replace("{code}", code);
        Ok(if name.trim().is_empty() { code.to_string() } else { name })
    }

    // ===== 重试 =====

    /// 存储暂不可用时的重试次数（0..=5）
    pub fn get_storage_retry_attempts(&self) -> RepositoryResult<u32> {
        let value = self.get_global_config_value(config_keys::STORAGE_RETRY_ATTEMPTS)?;
        Ok(value
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(DEFAULT_STORAGE_RETRY_ATTEMPTS)
            .min(MAX_STORAGE_RETRY_ATTEMPTS))
    }

    // ===== 审计 =====

    pub fn is_audit_enabled(&self) -> RepositoryResult<bool> {
        let value = self.get_config_or_default(config_keys::AUDIT_ENABLED, "true")?;
        Ok(!matches!(value.trim().to_ascii_lowercase().as_str(), "false" | "0" | "off"))
    }
}
