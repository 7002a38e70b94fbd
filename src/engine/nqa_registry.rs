// ==========================================
// 抽样方案引擎 - NQA 注册表
// ==========================================
// 职责: 质量水平定义的增删改查、按代码解析或创建
// 约束: 规范化代码唯一；仍被区间或分组引用时禁止删除
// ==========================================

use crate::config::ConfigManager;
use crate::db::with_immediate_transaction;
use crate::domain::quality_level::{
    validate_code, QualityLevel, QualityLevelDraft, QualityLevelPatch,
};
use crate::domain::types::{now_ts, InspectionRigor};
use crate::engine::Change;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::{GroupBindingRepository, QualityLevelRepository, SamplingRangeRepository};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};

// ==========================================
// LevelResolution - 按代码解析的结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "resolution", content = "level", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LevelResolution {
    Existing(QualityLevel),
    Created(QualityLevel),
}

impl LevelResolution {
    pub fn level(&self) -> &QualityLevel {
        match self {
            LevelResolution::Existing(l) | LevelResolution::Created(l) => l,
        }
    }

    pub fn into_level(self) -> QualityLevel {
        match self {
            LevelResolution::Existing(l) | LevelResolution::Created(l) => l,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, LevelResolution::Created(_))
    }
}

/// 自动创建 NQA 时使用的默认值（在进入事务前从配置读取）
#[derive(Debug, Clone)]
pub struct AutoLevelDefaults {
    pub rigor: InspectionRigor,
    pub name_template: String,
}

impl Default for AutoLevelDefaults {
    fn default() -> Self {
        Self {
            rigor: InspectionRigor::Normal,
            name_template: crate::config::config_manager::DEFAULT_AUTO_LEVEL_NAME_TEMPLATE.to_string(),
        }
    }
}

impl AutoLevelDefaults {
    /// 从配置读取（须在持有连接锁之前调用，配置与业务共享同一连接）
    pub fn from_config(config: &ConfigManager) -> RepositoryResult<Self> {
        Ok(Self {
            rigor: config.get_auto_level_rigor()?,
            name_template: config.get_auto_level_name_template()?,
        })
    }

    fn name_for(&self, code: &str) -> String {
        let name = self.name_template.replace("{code}", code);
        if name.trim().is_empty() {
            code.to_string()
        } else {
            name
        }
    }
}

// ==========================================
// NqaRegistry
// ==========================================
pub struct NqaRegistry {
    conn: Arc<Mutex<Connection>>,
    level_repo: Arc<QualityLevelRepository>,
    config: Arc<ConfigManager>,
}

impl NqaRegistry {
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        level_repo: Arc<QualityLevelRepository>,
        config: Arc<ConfigManager>,
    ) -> Self {
        Self {
            conn,
            level_repo,
            config,
        }
    }

    /// 创建 NQA
    ///
    /// # 错误
    /// - FieldValueError: 代码/名称不合法
    /// - DuplicateCode: 规范化后的代码已存在
    #[instrument(skip(self, draft), fields(code = %draft.code))]
    pub fn create(&self, draft: QualityLevelDraft) -> RepositoryResult<QualityLevel> {
        let valid = draft.validate()?;
        let level = QualityLevel::new(valid, now_ts());

        with_immediate_transaction(&self.conn, |tx| {
            if QualityLevelRepository::code_taken_tx(tx, &level.code, None)? {
                return Err(RepositoryError::DuplicateCode {
                    code: level.code.clone(),
                });
            }
            QualityLevelRepository::insert_tx(tx, &level)
        })?;

        info!(level_id = %level.level_id, code = %level.code, "NQA 已创建");
        Ok(level)
    }

    /// 更新 NQA
    ///
    /// # 错误
    /// - NotFound / DuplicateCode / FieldValueError
    #[instrument(skip(self, patch))]
    pub fn update(&self, level_id: &str, patch: &QualityLevelPatch) -> RepositoryResult<Change<QualityLevel>> {
        if patch.is_empty() {
            return Err(RepositoryError::ValidationError("没有需要更新的字段".to_string()));
        }

        let change = with_immediate_transaction(&self.conn, |tx| {
            let before = QualityLevelRepository::find_by_id_tx(tx, level_id)?
                .ok_or_else(|| RepositoryError::not_found("QualityLevel", level_id))?;
            let after = before.apply_patch(patch, now_ts())?;

            if after.code != before.code
                && QualityLevelRepository::code_taken_tx(tx, &after.code, Some(level_id))?
            {
                return Err(RepositoryError::DuplicateCode {
                    code: after.code.clone(),
                });
            }

            QualityLevelRepository::update_tx(tx, &after)?;
            Ok(Change { before, after })
        })?;

        info!(level_id = %level_id, code = %change.after.code, "NQA 已更新");
        Ok(change)
    }

    /// 删除 NQA
    ///
    /// # 错误
    /// - NotFound: 不存在
    /// - ReferencedEntity: 仍有区间或分组绑定引用
    #[instrument(skip(self))]
    pub fn delete(&self, level_id: &str) -> RepositoryResult<QualityLevel> {
        let deleted = with_immediate_transaction(&self.conn, |tx| {
            let level = QualityLevelRepository::find_by_id_tx(tx, level_id)?
                .ok_or_else(|| RepositoryError::not_found("QualityLevel", level_id))?;

            let ranges = SamplingRangeRepository::count_by_level_tx(tx, level_id)?;
            let bindings = GroupBindingRepository::count_by_level_tx(tx, level_id)?;
            if ranges > 0 || bindings > 0 {
                warn!(level_id = %level_id, ranges, bindings, "NQA 仍被引用，拒绝删除");
                return Err(RepositoryError::ReferencedEntity {
                    entity: "QualityLevel".to_string(),
                    id: level_id.to_string(),
                    ranges,
                    bindings,
                });
            }

            QualityLevelRepository::delete_tx(tx, level_id)?;
            Ok(level)
        })?;

        info!(level_id = %level_id, code = %deleted.code, "NQA 已删除");
        Ok(deleted)
    }

    pub fn list(&self, active_only: bool) -> RepositoryResult<Vec<QualityLevel>> {
        self.level_repo.list(active_only)
    }

    pub fn get(&self, level_id: &str) -> RepositoryResult<QualityLevel> {
        self.level_repo
            .find_by_id(level_id)?
            .ok_or_else(|| RepositoryError::not_found("QualityLevel", level_id))
    }

    /// 按代码查询（代码先规范化）
    pub fn find_by_code(&self, code: &str) -> RepositoryResult<Option<QualityLevel>> {
        let code = validate_code(code)?;
        self.level_repo.find_by_code(&code)
    }

    /// 按代码解析或创建 NQA（独立事务）
    #[instrument(skip(self))]
    pub fn resolve_or_create_by_code(&self, code: &str) -> RepositoryResult<LevelResolution> {
        let defaults = AutoLevelDefaults::from_config(&self.config)?;
        let resolution = with_immediate_transaction(&self.conn, |tx| {
            Self::resolve_or_create_tx(tx, code, &defaults)
        })?;
        if resolution.was_created() {
            info!(code = %resolution.level().code, "NQA 按代码自动创建");
        }
        Ok(resolution)
    }

    /// 事务内的按代码解析或创建，供组合操作（区间写入、批量导入）复用
    pub fn resolve_or_create_tx(
        conn: &Connection,
        code: &str,
        defaults: &AutoLevelDefaults,
    ) -> RepositoryResult<LevelResolution> {
        let code = validate_code(code)?;

        if let Some(existing) = QualityLevelRepository::find_by_code_tx(conn, &code)? {
            debug!(code = %code, level_id = %existing.level_id, "NQA 已存在");
            return Ok(LevelResolution::Existing(existing));
        }

        let valid = QualityLevelDraft {
            code: code.clone(),
            name: defaults.name_for(&code),
            rigor: defaults.rigor,
            active: true,
        }
        .validate()?;
        let level = QualityLevel::new(valid, now_ts());
        QualityLevelRepository::insert_tx(conn, &level)?;
        Ok(LevelResolution::Created(level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::config_keys;
    use crate::domain::group_binding::GroupBinding;

    fn setup() -> (NqaRegistry, Arc<Mutex<Connection>>, Arc<ConfigManager>) {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let config = Arc::new(ConfigManager::from_connection(conn.clone()).unwrap());
        let registry = NqaRegistry::new(
            conn.clone(),
            Arc::new(QualityLevelRepository::new(conn.clone())),
            config.clone(),
        );
        (registry, conn, config)
    }

    fn draft(code: &str) -> QualityLevelDraft {
        QualityLevelDraft {
            code: code.to_string(),
            name: format!("NQA {}", code),
            rigor: InspectionRigor::Normal,
            active: true,
        }
    }

    #[test]
    fn test_create_rejects_duplicate_after_normalization() {
        let (registry, _conn, _config) = setup();
        let level = registry.create(draft("2,5")).unwrap();
        assert_eq!(level.code, "2.5");

        match registry.create(draft(" 2.5 ")).unwrap_err() {
            RepositoryError::DuplicateCode { code } => assert_eq!(code, "2.5"),
            other => panic!("expected DuplicateCode, got {:?}", other),
        }
        assert_eq!(registry.list(false).unwrap().len(), 1);
    }

    #[test]
    fn test_update_keeps_own_code_and_rejects_taken_code() {
        let (registry, _conn, _config) = setup();
        let a = registry.create(draft("1.0")).unwrap();
        registry.create(draft("4.0")).unwrap();

        let change = registry
            .update(
                &a.level_id,
                &QualityLevelPatch {
                    code: Some("1.0".to_string()),
                    name: Some("Renamed".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(change.before.name, "NQA 1.0");
        assert_eq!(change.after.name, "Renamed");

        let err = registry
            .update(
                &a.level_id,
                &QualityLevelPatch {
                    code: Some("4.0".to_string()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, RepositoryError::DuplicateCode { .. }));

        let err = registry.update(&a.level_id, &QualityLevelPatch::default()).unwrap_err();
        assert!(matches!(err, RepositoryError::ValidationError(_)));
    }

    #[test]
    fn test_delete_blocked_while_bound() {
        let (registry, conn, _config) = setup();
        let level = registry.create(draft("2.5")).unwrap();
        GroupBindingRepository::insert_tx(
            &conn.lock().unwrap(),
            &GroupBinding {
                group_id: 42,
                level_id: level.level_id.clone(),
                notes: None,
                created_at: now_ts(),
            },
        )
        .unwrap();

        match registry.delete(&level.level_id).unwrap_err() {
            RepositoryError::ReferencedEntity { ranges, bindings, .. } => {
                assert_eq!(ranges, 0);
                assert_eq!(bindings, 1);
            }
            other => panic!("expected ReferencedEntity, got {:?}", other),
        }

        GroupBindingRepository::delete_tx(&conn.lock().unwrap(), 42).unwrap();
        registry.delete(&level.level_id).unwrap();
        assert!(matches!(
            registry.get(&level.level_id),
            Err(RepositoryError::NotFound { .. })
        ));
    }

    #[test]
    fn test_resolve_or_create_uses_configured_defaults() {
        let (registry, _conn, config) = setup();
        config
            .set_global_config_value(config_keys::AUTO_LEVEL_NAME_TEMPLATE, "NQA {code}")
            .unwrap();
        config
            .set_global_config_value(config_keys::AUTO_LEVEL_RIGOR, "TIGHTENED")
            .unwrap();

        let first = registry.resolve_or_create_by_code("0,65").unwrap();
        assert!(first.was_created());
        assert_eq!(first.level().code, "0.65");
        assert_eq!(first.level().name, "NQA 0.65");
        assert_eq!(first.level().rigor, InspectionRigor::Tightened);

        let second = registry.resolve_or_create_by_code("0.65").unwrap();
        assert!(!second.was_created());
        assert_eq!(second.into_level().level_id, first.level().level_id);
        assert_eq!(registry.list(false).unwrap().len(), 1);
    }

    #[test]
    fn test_find_by_code_normalizes() {
        let (registry, _conn, _config) = setup();
        registry.create(draft("6.5")).unwrap();
        assert!(registry.find_by_code("6,5").unwrap().is_some());
        assert!(registry.find_by_code("10").unwrap().is_none());
    }
}
