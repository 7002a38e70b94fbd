// ==========================================
// 抽样方案引擎 - NQA 管理 API
// ==========================================
// 职责: NQA 增删改查、按代码解析或创建；写操作记录审计
// ==========================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::audit::AuditTrail;
use crate::api::error::{retry_transient, ApiError, ApiResult};
use crate::config::ConfigManager;
use crate::domain::audit_log::AuditEntity;
use crate::domain::quality_level::{QualityLevel, QualityLevelDraft, QualityLevelPatch};
use crate::domain::types::InspectionRigor;
use crate::engine::nqa_registry::{LevelResolution, NqaRegistry};

// ==========================================
// 请求结构
// ==========================================

/// 创建 NQA 请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateQualityLevelRequest {
    pub code: String,
    /// 为空时取代码
    #[serde(default)]
    pub name: Option<String>,
    /// REDUCED / NORMAL / TIGHTENED，缺省 NORMAL
    #[serde(default)]
    pub rigor: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}

impl CreateQualityLevelRequest {
    fn into_draft(self) -> ApiResult<QualityLevelDraft> {
        let rigor = parse_rigor(self.rigor.as_deref())?.unwrap_or_default();
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| self.code.clone());
        Ok(QualityLevelDraft {
            code: self.code,
            name,
            rigor,
            active: self.active.unwrap_or(true),
        })
    }
}

/// 更新 NQA 请求（None 表示不修改）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateQualityLevelRequest {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub rigor: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}

impl UpdateQualityLevelRequest {
    fn into_patch(self) -> ApiResult<QualityLevelPatch> {
        Ok(QualityLevelPatch {
            code: self.code,
            name: self.name,
            rigor: parse_rigor(self.rigor.as_deref())?,
            active: self.active,
        })
    }
}

fn parse_rigor(raw: Option<&str>) -> ApiResult<Option<InspectionRigor>> {
    match raw {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => InspectionRigor::parse(s)
            .map(Some)
            .ok_or_else(|| ApiError::InvalidInput(format!("未知的检验严格度: {}", s))),
    }
}

pub(crate) fn require_actor(actor: &str) -> ApiResult<()> {
    if actor.trim().is_empty() {
        return Err(ApiError::InvalidInput("操作人不能为空".to_string()));
    }
    Ok(())
}

// ==========================================
// NqaApi
// ==========================================
pub struct NqaApi {
    registry: Arc<NqaRegistry>,
    config: Arc<ConfigManager>,
    audit: Arc<AuditTrail>,
}

impl NqaApi {
    pub fn new(registry: Arc<NqaRegistry>, config: Arc<ConfigManager>, audit: Arc<AuditTrail>) -> Self {
        Self {
            registry,
            config,
            audit,
        }
    }

    /// 创建 NQA
    ///
    /// # 错误
    /// - InvalidInput: 字段不合法
    /// - DuplicateCode: 规范化后的代码已存在
    pub fn create(&self, req: CreateQualityLevelRequest, actor: &str) -> ApiResult<QualityLevel> {
        require_actor(actor)?;
        let draft = req.into_draft()?;
        let level = retry_transient(&self.config, "nqa.create", || self.registry.create(draft.clone()))?;

        self.audit
            .created(AuditEntity::QualityLevel, &level.level_id, actor, &level);
        Ok(level)
    }

    /// 更新 NQA
    pub fn update(&self, level_id: &str, req: UpdateQualityLevelRequest, actor: &str) -> ApiResult<QualityLevel> {
        require_actor(actor)?;
        let patch = req.into_patch()?;
        let change = retry_transient(&self.config, "nqa.update", || self.registry.update(level_id, &patch))?;

        self.audit.updated(
            AuditEntity::QualityLevel,
            level_id,
            actor,
            &change.before,
            &change.after,
        );
        Ok(change.after)
    }

    /// 删除 NQA
    ///
    /// # 错误
    /// - Conflict: 仍有区间或分组绑定引用
    pub fn delete(&self, level_id: &str, actor: &str) -> ApiResult<()> {
        require_actor(actor)?;
        let deleted = retry_transient(&self.config, "nqa.delete", || self.registry.delete(level_id))?;

        self.audit
            .deleted(AuditEntity::QualityLevel, level_id, actor, &deleted);
        Ok(())
    }

    pub fn list(&self, active_only: bool) -> ApiResult<Vec<QualityLevel>> {
        retry_transient(&self.config, "nqa.list", || self.registry.list(active_only))
    }

    pub fn get(&self, level_id: &str) -> ApiResult<QualityLevel> {
        retry_transient(&self.config, "nqa.get", || self.registry.get(level_id))
    }

    /// 按代码查询（"2,5" 与 "2.5" 等价）
    pub fn get_by_code(&self, code: &str) -> ApiResult<QualityLevel> {
        retry_transient(&self.config, "nqa.get_by_code", || self.registry.find_by_code(code))?
            .ok_or_else(|| ApiError::NotFound(format!("NQA(code={})不存在", code)))
    }

    /// 按代码解析或创建 NQA；新建时记录审计
    pub fn resolve_or_create_by_code(&self, code: &str, actor: &str) -> ApiResult<LevelResolution> {
        require_actor(actor)?;
        let resolution = retry_transient(&self.config, "nqa.resolve_or_create", || {
            self.registry.resolve_or_create_by_code(code)
        })?;

        if let LevelResolution::Created(ref level) = resolution {
            self.audit
                .created(AuditEntity::QualityLevel, &level.level_id, actor, level);
        }
        Ok(resolution)
    }
}
