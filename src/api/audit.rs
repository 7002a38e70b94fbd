// ==========================================
// 抽样方案引擎 - API 审计记录
// ==========================================
// 职责: 在业务操作提交后计算字段级差异并交给审计协作方
// 约束: 审计失败只告警，不影响已提交的业务操作
// ==========================================

use crate::config::ConfigManager;
use crate::domain::audit_log::{AuditAction, AuditEntity, AuditLog};
use crate::domain::types::now_ts;
use crate::repository::AuditSink;
use serde::Serialize;
use std::sync::Arc;

pub struct AuditTrail {
    sink: Arc<dyn AuditSink>,
    config: Arc<ConfigManager>,
}

impl AuditTrail {
    pub fn new(sink: Arc<dyn AuditSink>, config: Arc<ConfigManager>) -> Self {
        Self { sink, config }
    }

    pub fn created<T: Serialize>(&self, entity: AuditEntity, id: &str, actor: &str, after: &T) {
        self.record(entity, id, AuditAction::Create, actor, None, Some(after), None);
    }

    pub fn updated<T: Serialize>(&self, entity: AuditEntity, id: &str, actor: &str, before: &T, after: &T) {
        self.record(entity, id, AuditAction::Update, actor, Some(before), Some(after), None);
    }

    pub fn deleted<T: Serialize>(&self, entity: AuditEntity, id: &str, actor: &str, before: &T) {
        self.record(entity, id, AuditAction::Delete, actor, Some(before), None, None);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record<T: Serialize>(
        &self,
        entity: AuditEntity,
        id: &str,
        action: AuditAction,
        actor: &str,
        before: Option<&T>,
        after: Option<&T>,
        detail: Option<&str>,
    ) {
        match self.config.is_audit_enabled() {
            Ok(false) => return,
            Ok(true) => {}
            Err(e) => tracing::warn!(error = %e, "读取审计开关失败，按开启处理"),
        }

        let before = before.and_then(|v| serde_json::to_value(v).ok());
        let after = after.and_then(|v| serde_json::to_value(v).ok());
        let mut log = AuditLog::from_snapshots(entity, id, action, actor, before, after, now_ts());
        if let Some(detail) = detail {
            log = log.with_detail(detail);
        }

        if let Err(e) = self.sink.record(&log) {
            tracing::warn!(
                entity = %entity,
                entity_id = %id,
                action = %action,
                error = %e,
                "审计记录失败（业务操作已提交）"
            );
        }
    }
}
