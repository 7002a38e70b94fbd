// ==========================================
// 抽样方案引擎 - 抽样区间 API
// ==========================================
// 职责: 区间增删改查、按批量查找、空隙提示；写操作记录审计
// ==========================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::audit::AuditTrail;
use crate::api::error::{retry_transient, ApiError, ApiResult};
use crate::api::nqa_api::require_actor;
use crate::config::ConfigManager;
use crate::domain::audit_log::{AuditAction, AuditEntity};
use crate::domain::plan::RangeLookup;
use crate::domain::quality_level::QualityLevel;
use crate::domain::sampling_range::{RangeDraft, RangePatch, SamplingRange, ShelfLife};
use crate::engine::nqa_registry::LevelResolution;
use crate::engine::range_partition::RangeListing;
use crate::engine::range_store::RangePartitionStore;

// ==========================================
// 请求结构
// ==========================================

/// 区间输入（创建用）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeInput {
    pub lot_min: i64,
    pub lot_max: i64,
    pub sample_size: i64,
    pub ac: i64,
    pub re: i64,
    #[serde(default)]
    pub shelf_life_months: Option<i64>,
    #[serde(default)]
    pub shelf_life_days: Option<i64>,
    #[serde(default)]
    pub days_70: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}

impl RangeInput {
    /// 最小输入: 批量区间 + 抽样参数
    pub fn new(lot_min: i64, lot_max: i64, sample_size: i64, ac: i64, re: i64) -> Self {
        Self {
            lot_min,
            lot_max,
            sample_size,
            ac,
            re,
            shelf_life_months: None,
            shelf_life_days: None,
            days_70: None,
            notes: None,
            active: None,
        }
    }

    fn into_draft(self) -> RangeDraft {
        RangeDraft {
            lot_min: self.lot_min,
            lot_max: self.lot_max,
            sample_size: self.sample_size,
            ac: self.ac,
            re: self.re,
            shelf_life: ShelfLife {
                months: self.shelf_life_months,
                days: self.shelf_life_days,
                days_70: self.days_70,
            },
            notes: self.notes,
            active: self.active.unwrap_or(true),
        }
    }
}

/// 按代码创建区间的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeCreatedWithCode {
    pub level: LevelResolution,
    pub range: SamplingRange,
}

// ==========================================
// SamplingRangeApi
// ==========================================
pub struct SamplingRangeApi {
    store: Arc<RangePartitionStore>,
    config: Arc<ConfigManager>,
    audit: Arc<AuditTrail>,
}

impl SamplingRangeApi {
    pub fn new(store: Arc<RangePartitionStore>, config: Arc<ConfigManager>, audit: Arc<AuditTrail>) -> Self {
        Self { store, config, audit }
    }

    /// 在指定 NQA 下创建区间
    ///
    /// # 错误
    /// - InvalidInput: 字段校验失败
    /// - NotFound: NQA 不存在或已停用
    /// - RangeOverlap: 与已有启用区间相交
    pub fn create(&self, level_id: &str, input: RangeInput, actor: &str) -> ApiResult<SamplingRange> {
        require_actor(actor)?;
        if level_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("NQA ID不能为空".to_string()));
        }
        let draft = input.into_draft();
        let range = retry_transient(&self.config, "range.create", || {
            self.store.insert(level_id, draft.clone())
        })?;

        self.audit
            .created(AuditEntity::SamplingRange, &range.range_id, actor, &range);
        Ok(range)
    }

    /// 按 NQA 代码创建区间（代码不存在时自动创建 NQA，与区间写入原子完成）
    pub fn create_with_code(&self, code: &str, input: RangeInput, actor: &str) -> ApiResult<RangeCreatedWithCode> {
        require_actor(actor)?;
        let draft = input.into_draft();
        let (level, range) = retry_transient(&self.config, "range.create_with_code", || {
            self.store.insert_with_code(code, draft.clone())
        })?;

        if let LevelResolution::Created(ref created) = level {
            self.audit.record::<QualityLevel>(
                AuditEntity::QualityLevel,
                &created.level_id,
                AuditAction::Create,
                actor,
                None,
                Some(created),
                Some("创建区间时按代码自动创建"),
            );
        }
        self.audit
            .created(AuditEntity::SamplingRange, &range.range_id, actor, &range);
        Ok(RangeCreatedWithCode { level, range })
    }

    /// 更新区间
    pub fn update(&self, range_id: &str, patch: RangePatch, actor: &str) -> ApiResult<SamplingRange> {
        require_actor(actor)?;
        let change = retry_transient(&self.config, "range.update", || self.store.update(range_id, &patch))?;

        self.audit.updated(
            AuditEntity::SamplingRange,
            range_id,
            actor,
            &change.before,
            &change.after,
        );
        Ok(change.after)
    }

    /// 删除区间
    ///
    /// # 错误
    /// - NotFound: 区间不存在（包括重复删除）
    pub fn delete(&self, range_id: &str, actor: &str) -> ApiResult<()> {
        require_actor(actor)?;
        let deleted = retry_transient(&self.config, "range.delete", || self.store.delete(range_id))?;

        self.audit
            .deleted(AuditEntity::SamplingRange, range_id, actor, &deleted);
        Ok(())
    }

    pub fn get(&self, range_id: &str) -> ApiResult<SamplingRange> {
        retry_transient(&self.config, "range.get", || self.store.get(range_id))
    }

    pub fn list_by_level(&self, level_id: &str) -> ApiResult<Vec<SamplingRange>> {
        retry_transient(&self.config, "range.list_by_level", || self.store.list_by_level(level_id))
    }

    /// 区间列表 + 空隙提示
    pub fn listing_by_level(&self, level_id: &str) -> ApiResult<RangeListing> {
        retry_transient(&self.config, "range.listing_by_level", || {
            self.store.listing_by_level(level_id)
        })
    }

    pub fn lookup(&self, level_id: &str, lot_size: i64) -> ApiResult<RangeLookup> {
        retry_transient(&self.config, "range.lookup", || self.store.lookup(level_id, lot_size))
    }

    /// 巡检相交的启用区间对
    pub fn verify_level(&self, level_id: &str) -> ApiResult<Vec<(String, String)>> {
        retry_transient(&self.config, "range.verify_level", || self.store.verify_level(level_id))
    }
}
