// ==========================================
// 抽样方案引擎 - 审计日志领域模型
// ==========================================
// 用途: 记录 NQA / 抽样区间 / 分组绑定 的增删改，含字段级前后差异
// 对齐: audit_log 表
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

// ==========================================
// AuditLog - 审计日志
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub audit_id: String,
    pub entity_type: AuditEntity,
    pub entity_id: String,
    pub action_type: AuditAction,
    pub action_ts: NaiveDateTime,
    pub actor: String,

    // ===== 前后快照 =====
    pub before_json: Option<JsonValue>,
    pub after_json: Option<JsonValue>,
    pub changes: Vec<FieldChange>,

    pub detail: Option<String>,
}

impl AuditLog {
    /// 由前后快照构造审计记录，自动计算字段差异
    pub fn from_snapshots(
        entity_type: AuditEntity,
        entity_id: &str,
        action_type: AuditAction,
        actor: &str,
        before: Option<JsonValue>,
        after: Option<JsonValue>,
        now: NaiveDateTime,
    ) -> Self {
        let changes = diff_fields(before.as_ref(), after.as_ref());
        Self {
            audit_id: uuid::Uuid::new_v4().to_string(),
            entity_type,
            entity_id: entity_id.to_string(),
            action_type,
            action_ts: now,
            actor: actor.to_string(),
            before_json: before,
            after_json: after,
            changes,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEntity {
    QualityLevel,
    SamplingRange,
    GroupBinding,
}

impl AuditEntity {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            AuditEntity::QualityLevel => "QUALITY_LEVEL",
            AuditEntity::SamplingRange => "SAMPLING_RANGE",
            AuditEntity::GroupBinding => "GROUP_BINDING",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "QUALITY_LEVEL" => Some(AuditEntity::QualityLevel),
            "SAMPLING_RANGE" => Some(AuditEntity::SamplingRange),
            "GROUP_BINDING" => Some(AuditEntity::GroupBinding),
            _ => None,
        }
    }
}

impl fmt::Display for AuditEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CREATE" => Some(AuditAction::Create),
            "UPDATE" => Some(AuditAction::Update),
            "DELETE" => Some(AuditAction::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// FieldChange - 字段级差异
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub before: Option<JsonValue>,
    pub after: Option<JsonValue>,
}

/// 对比两个 JSON 对象的顶层字段，输出有变化的字段（按字段名排序）
///
/// created_at / updated_at 不参与对比
pub fn diff_fields(before: Option<&JsonValue>, after: Option<&JsonValue>) -> Vec<FieldChange> {
    const IGNORED: [&str; 2] = ["created_at", "updated_at"];

    let empty = serde_json::Map::new();
    let b = before.and_then(|v| v.as_object()).unwrap_or(&empty);
    let a = after.and_then(|v| v.as_object()).unwrap_or(&empty);

    let mut keys: Vec<&String> = b.keys().chain(a.keys()).collect();
    keys.sort();
    keys.dedup();

    keys.into_iter()
        .filter(|k| !IGNORED.contains(&k.as_str()))
        .filter_map(|k| {
            let old = b.get(k);
            let new = a.get(k);
            if old == new {
                None
            } else {
                Some(FieldChange {
                    field: k.clone(),
                    before: old.cloned(),
                    after: new.cloned(),
                })
            }
        })
        .collect()
}
