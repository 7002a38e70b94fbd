// ==========================================
// 抽样方案引擎 - 分组绑定领域模型
// ==========================================
// 对齐: group_binding 表（group_id 唯一）
// 约束: 一个分类分组同一时刻至多绑定一个 NQA
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// GroupBinding - 分组 → NQA 绑定
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupBinding {
    pub group_id: i64,
    pub level_id: String,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}

// ==========================================
// BindingResolution - 分组解析结果
// ==========================================
// 未绑定是正常业务结果，不是错误
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BindingResolution {
    Bound { level_id: String },
    Unbound { group_id: i64 },
}

impl BindingResolution {
    pub fn level_id(&self) -> Option<&str> {
        match self {
            BindingResolution::Bound { level_id } => Some(level_id),
            BindingResolution::Unbound { .. } => None,
        }
    }
}
