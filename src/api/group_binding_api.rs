// ==========================================
// 抽样方案引擎 - 分组绑定 API
// ==========================================
// 职责: 分组绑定/解绑/查询；写操作记录审计
// ==========================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::audit::AuditTrail;
use crate::api::error::{retry_transient, ApiError, ApiResult};
use crate::api::nqa_api::require_actor;
use crate::config::ConfigManager;
use crate::domain::audit_log::AuditEntity;
use crate::domain::group_binding::{BindingResolution, GroupBinding};
use crate::engine::binding_resolver::GroupBindingResolver;

/// 绑定请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindGroupRequest {
    pub group_id: i64,
    pub level_id: String,
    #[serde(default)]
    pub notes: Option<String>,
}

pub struct GroupBindingApi {
    resolver: Arc<GroupBindingResolver>,
    config: Arc<ConfigManager>,
    audit: Arc<AuditTrail>,
}

impl GroupBindingApi {
    pub fn new(resolver: Arc<GroupBindingResolver>, config: Arc<ConfigManager>, audit: Arc<AuditTrail>) -> Self {
        Self {
            resolver,
            config,
            audit,
        }
    }

    /// 绑定分组
    ///
    /// # 错误
    /// - NotFound: 分组或 NQA 不存在
    /// - AlreadyBound: 分组已绑定（需先解绑）
    pub fn bind(&self, req: BindGroupRequest, actor: &str) -> ApiResult<GroupBinding> {
        require_actor(actor)?;
        if req.group_id <= 0 {
            return Err(ApiError::InvalidInput(format!("无效的分组ID: {}", req.group_id)));
        }
        if req.level_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("NQA ID不能为空".to_string()));
        }

        let binding = retry_transient(&self.config, "binding.bind", || {
            self.resolver.bind(req.group_id, &req.level_id, req.notes.clone())
        })?;

        self.audit.created(
            AuditEntity::GroupBinding,
            &binding.group_id.to_string(),
            actor,
            &binding,
        );
        Ok(binding)
    }

    /// 解绑分组
    ///
    /// # 错误
    /// - NotFound: 分组没有绑定
    pub fn unbind(&self, group_id: i64, actor: &str) -> ApiResult<()> {
        require_actor(actor)?;
        let removed = retry_transient(&self.config, "binding.unbind", || self.resolver.unbind(group_id))?;

        self.audit.deleted(
            AuditEntity::GroupBinding,
            &group_id.to_string(),
            actor,
            &removed,
        );
        Ok(())
    }

    pub fn resolve(&self, group_id: i64) -> ApiResult<BindingResolution> {
        retry_transient(&self.config, "binding.resolve", || self.resolver.resolve(group_id))
    }

    pub fn list_all(&self) -> ApiResult<Vec<GroupBinding>> {
        retry_transient(&self.config, "binding.list_all", || self.resolver.list_all())
    }

    pub fn get_by_group(&self, group_id: i64) -> ApiResult<Option<GroupBinding>> {
        retry_transient(&self.config, "binding.get_by_group", || self.resolver.get_by_group(group_id))
    }

    /// 某 NQA 下绑定的分组
    pub fn list_groups_by_level(&self, level_id: &str) -> ApiResult<Vec<GroupBinding>> {
        retry_transient(&self.config, "binding.list_by_level", || self.resolver.list_by_level(level_id))
    }

    /// 尚未绑定的分组 ID（供选择界面使用）
    pub fn list_unbound_groups(&self) -> ApiResult<Vec<i64>> {
        retry_transient(&self.config, "binding.list_unbound", || self.resolver.list_unbound_groups())
    }
}
