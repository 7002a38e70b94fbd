// ==========================================
// 抽样方案引擎 - 抽样区间领域模型
// ==========================================
// 对齐: sampling_range 表
// 约束: lot_min >= 1, lot_max >= lot_min, sample_size >= 1, ac >= 0, re > ac
// 约束: 同一 NQA 下的有效区间两两不相交（由引擎层保证）
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// 备注最大长度
pub const MAX_NOTES_LEN: usize = 500;

// ==========================================
// SamplingRange - 抽样区间（批量区间 → 抽样参数）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingRange {
    pub range_id: String,
    pub level_id: String,

    // ===== 批量闭区间 =====
    pub lot_min: i64,
    pub lot_max: i64,

    // ===== 抽样参数 =====
    pub sample_size: i64,
    pub ac: i64, // 接收数
    pub re: i64, // 拒收数

    // ===== 保质期相关（可选） =====
    pub shelf_life: ShelfLife,

    pub notes: Option<String>,
    pub active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// 保质期参数（来料验收时用于判断剩余保质期）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShelfLife {
    pub months: Option<i64>,
    pub days: Option<i64>,
    /// 保质期 70% 对应的天数
    pub days_70: Option<i64>,
}

impl SamplingRange {
    /// 由已校验字段构造新区间（生成 UUID）
    pub fn new(level_id: &str, fields: ValidRange, now: NaiveDateTime) -> Self {
        Self {
            range_id: uuid::Uuid::new_v4().to_string(),
            level_id: level_id.to_string(),
            lot_min: fields.lot_min,
            lot_max: fields.lot_max,
            sample_size: fields.sample_size,
            ac: fields.ac,
            re: fields.re,
            shelf_life: fields.shelf_life,
            notes: fields.notes,
            active: fields.active,
            created_at: now,
            updated_at: now,
        }
    }

    /// 闭区间是否包含给定批量
    pub fn contains(&self, lot_size: i64) -> bool {
        self.lot_min <= lot_size && lot_size <= self.lot_max
    }

    /// 闭区间相交判定: E.min <= N.max && N.min <= E.max
    pub fn intersects(&self, lot_min: i64, lot_max: i64) -> bool {
        self.lot_min <= lot_max && lot_min <= self.lot_max
    }

    /// 当前字段（用于补丁合并）
    pub fn to_draft(&self) -> RangeDraft {
        RangeDraft {
            lot_min: self.lot_min,
            lot_max: self.lot_max,
            sample_size: self.sample_size,
            ac: self.ac,
            re: self.re,
            shelf_life: self.shelf_life,
            notes: self.notes.clone(),
            active: self.active,
        }
    }

    /// 应用补丁，返回校验后的新状态；level_id 不可变
    pub fn apply_patch(&self, patch: &RangePatch, now: NaiveDateTime) -> RepositoryResult<SamplingRange> {
        let mut draft = self.to_draft();
        if let Some(v) = patch.lot_min {
            draft.lot_min = v;
        }
        if let Some(v) = patch.lot_max {
            draft.lot_max = v;
        }
        if let Some(v) = patch.sample_size {
            draft.sample_size = v;
        }
        if let Some(v) = patch.ac {
            draft.ac = v;
        }
        if let Some(v) = patch.re {
            draft.re = v;
        }
        if let Some(v) = patch.shelf_life {
            draft.shelf_life = v;
        }
        if let Some(ref v) = patch.notes {
            draft.notes = v.clone();
        }
        if let Some(v) = patch.active {
            draft.active = v;
        }

        let valid = draft.validate()?;
        Ok(SamplingRange {
            range_id: self.range_id.clone(),
            level_id: self.level_id.clone(),
            lot_min: valid.lot_min,
            lot_max: valid.lot_max,
            sample_size: valid.sample_size,
            ac: valid.ac,
            re: valid.re,
            shelf_life: valid.shelf_life,
            notes: valid.notes,
            active: valid.active,
            created_at: self.created_at,
            updated_at: now,
        })
    }
}

// ==========================================
// 输入结构
// ==========================================

/// 区间原始输入（未校验）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeDraft {
    pub lot_min: i64,
    pub lot_max: i64,
    pub sample_size: i64,
    pub ac: i64,
    pub re: i64,
    #[serde(default)]
    pub shelf_life: ShelfLife,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// 区间更新补丁
///
/// `notes: Some(None)` 表示清空备注
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RangePatch {
    pub lot_min: Option<i64>,
    pub lot_max: Option<i64>,
    pub sample_size: Option<i64>,
    pub ac: Option<i64>,
    pub re: Option<i64>,
    pub shelf_life: Option<ShelfLife>,
    pub notes: Option<Option<String>>,
    pub active: Option<bool>,
}

impl RangePatch {
    pub fn is_empty(&self) -> bool {
        self.lot_min.is_none()
            && self.lot_max.is_none()
            && self.sample_size.is_none()
            && self.ac.is_none()
            && self.re.is_none()
            && self.shelf_life.is_none()
            && self.notes.is_none()
            && self.active.is_none()
    }
}

/// 已通过校验的区间字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRange {
    pub lot_min: i64,
    pub lot_max: i64,
    pub sample_size: i64,
    pub ac: i64,
    pub re: i64,
    pub shelf_life: ShelfLife,
    pub notes: Option<String>,
    pub active: bool,
}

impl RangeDraft {
    /// 校验字段（任何持久化之前执行）
    pub fn validate(self) -> RepositoryResult<ValidRange> {
        if self.lot_min < 1 {
            return Err(RepositoryError::field("lot_min", "批量下限必须 >= 1"));
        }
        if self.lot_max < self.lot_min {
            return Err(RepositoryError::field(
                "lot_max",
                format!("批量上限({})不能小于下限({})", self.lot_max, self.lot_min),
            ));
        }
        if self.sample_size < 1 {
            return Err(RepositoryError::field("sample_size", "样本量必须 >= 1"));
        }
        if self.ac < 0 {
            return Err(RepositoryError::field("ac", "接收数不能为负"));
        }
        if self.re <= self.ac {
            return Err(RepositoryError::field(
                "re",
                format!("拒收数({})必须大于接收数({})", self.re, self.ac),
            ));
        }

        for (field, value) in [
            ("shelf_life_months", self.shelf_life.months),
            ("shelf_life_days", self.shelf_life.days),
            ("days_70", self.shelf_life.days_70),
        ] {
            if matches!(value, Some(v) if v < 0) {
                return Err(RepositoryError::field(field, "不能为负"));
            }
        }

        let notes = self
            .notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        if matches!(notes, Some(ref n) if n.chars().count() > MAX_NOTES_LEN) {
            return Err(RepositoryError::field(
                "notes",
                format!("备注长度不能超过 {} 个字符", MAX_NOTES_LEN),
            ));
        }

        Ok(ValidRange {
            lot_min: self.lot_min,
            lot_max: self.lot_max,
            sample_size: self.sample_size,
            ac: self.ac,
            re: self.re,
            shelf_life: self.shelf_life,
            notes,
            active: self.active,
        })
    }
}
