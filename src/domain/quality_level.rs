// ==========================================
// 抽样方案引擎 - 质量水平 (NQA) 领域模型
// ==========================================
// 对齐: quality_level 表
// 约束: code 以规范化形式存储（去首尾空白，逗号换成点）
// ==========================================

use crate::domain::types::InspectionRigor;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// NQA 代码最大长度
pub const MAX_CODE_LEN: usize = 20;

/// NQA 名称最大长度
pub const MAX_NAME_LEN: usize = 100;

// ==========================================
// QualityLevel - 质量水平 (NQA / AQL)
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityLevel {
    pub level_id: String,
    pub code: String,
    pub name: String,
    pub rigor: InspectionRigor,
    pub active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl QualityLevel {
    /// 由已校验的输入构造新实体（生成 UUID）
    pub fn new(input: ValidQualityLevel, now: NaiveDateTime) -> Self {
        Self {
            level_id: uuid::Uuid::new_v4().to_string(),
            code: input.code,
            name: input.name,
            rigor: input.rigor,
            active: input.active,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 规范化 NQA 代码: 去除首尾空白，小数逗号统一为点
///
/// "2,5" / " 2.5 " 都规范化为 "2.5"
pub fn normalize_code(raw: &str) -> String {
    raw.trim().replace(',', ".")
}

// ==========================================
// 输入结构
// ==========================================

/// 创建 NQA 的原始输入
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityLevelDraft {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub rigor: InspectionRigor,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// 更新 NQA 的字段补丁（None 表示不修改）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityLevelPatch {
    pub code: Option<String>,
    pub name: Option<String>,
    pub rigor: Option<InspectionRigor>,
    pub active: Option<bool>,
}

impl QualityLevelPatch {
    pub fn is_empty(&self) -> bool {
        self.code.is_none() && self.name.is_none() && self.rigor.is_none() && self.active.is_none()
    }
}

/// 已通过校验的 NQA 字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidQualityLevel {
    pub code: String,
    pub name: String,
    pub rigor: InspectionRigor,
    pub active: bool,
}

impl QualityLevelDraft {
    /// 校验并规范化
    pub fn validate(self) -> RepositoryResult<ValidQualityLevel> {
        let code = validate_code(&self.code)?;
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(RepositoryError::field("name", "名称不能为空"));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(RepositoryError::field(
                "name",
                format!("名称长度不能超过 {} 个字符", MAX_NAME_LEN),
            ));
        }
        Ok(ValidQualityLevel {
            code,
            name,
            rigor: self.rigor,
            active: self.active,
        })
    }
}

/// 校验并规范化 NQA 代码
pub fn validate_code(raw: &str) -> RepositoryResult<String> {
    let code = normalize_code(raw);
    if code.is_empty() {
        return Err(RepositoryError::field("code", "NQA 代码不能为空"));
    }
    if code.chars().count() > MAX_CODE_LEN {
        return Err(RepositoryError::field(
            "code",
            format!("NQA 代码长度不能超过 {} 个字符", MAX_CODE_LEN),
        ));
    }
    Ok(code)
}

impl QualityLevel {
    /// 应用补丁，返回校验后的新状态（不修改 self）
    pub fn apply_patch(&self, patch: &QualityLevelPatch, now: NaiveDateTime) -> RepositoryResult<QualityLevel> {
        let draft = QualityLevelDraft {
            code: patch.code.clone().unwrap_or_else(|| self.code.clone()),
            name: patch.name.clone().unwrap_or_else(|| self.name.clone()),
            rigor: patch.rigor.unwrap_or(self.rigor),
            active: patch.active.unwrap_or(self.active),
        };
        let valid = draft.validate()?;
        Ok(QualityLevel {
            level_id: self.level_id.clone(),
            code: valid.code,
            name: valid.name,
            rigor: valid.rigor,
            active: valid.active,
            created_at: self.created_at,
            updated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::now_ts;

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code(" 2,5 "), "2.5");
        assert_eq!(normalize_code("0.65"), "0.65");
        assert_eq!(normalize_code("   "), "");
    }

    #[test]
    fn test_draft_validation() {
        let ok = QualityLevelDraft {
            code: "1,0".to_string(),
            name: " NQA 1.0 ".to_string(),
            rigor: InspectionRigor::Tightened,
            active: true,
        }
        .validate()
        .unwrap();
        assert_eq!(ok.code, "1.0");
        assert_eq!(ok.name, "NQA 1.0");

        let err = QualityLevelDraft {
            code: " ".to_string(),
            name: "x".to_string(),
            rigor: InspectionRigor::Normal,
            active: true,
        }
        .validate();
        assert!(matches!(err, Err(RepositoryError::FieldValueError { ref field, .. }) if field == "code"));
    }

    #[test]
    fn test_apply_patch_keeps_identity() {
        let now = now_ts();
        let level = QualityLevel::new(
            QualityLevelDraft {
                code: "2.5".to_string(),
                name: "2.5".to_string(),
                rigor: InspectionRigor::Normal,
                active: true,
            }
            .validate()
            .unwrap(),
            now,
        );

        let patched = level
            .apply_patch(
                &QualityLevelPatch {
                    code: Some("4,0".to_string()),
                    active: Some(false),
                    ..Default::default()
                },
                now,
            )
            .unwrap();

        assert_eq!(patched.level_id, level.level_id);
        assert_eq!(patched.code, "4.0");
        assert_eq!(patched.name, "2.5");
        assert!(!patched.active);
    }
}
