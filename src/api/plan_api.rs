// ==========================================
// 抽样方案引擎 - 抽样方案查询 API
// ==========================================
// 职责: 对外唯一的决策入口（分组 + 批量 → 抽样方案），以及统计
// 说明: "无方案"以 PlanOutcome 变体返回，调用方据此分支（如改为全检）
// ==========================================

use std::sync::Arc;

use crate::api::error::{retry_transient, ApiError, ApiResult};
use crate::config::ConfigManager;
use crate::domain::plan::{PlanOutcome, PlanSummary};
use crate::engine::nqa_registry::NqaRegistry;
use crate::engine::plan_lookup::PlanLookupService;

pub struct PlanApi {
    plan_service: Arc<PlanLookupService>,
    registry: Arc<NqaRegistry>,
    config: Arc<ConfigManager>,
}

impl PlanApi {
    pub fn new(plan_service: Arc<PlanLookupService>, registry: Arc<NqaRegistry>, config: Arc<ConfigManager>) -> Self {
        Self {
            plan_service,
            registry,
            config,
        }
    }

    /// 查询分组在指定批量下的抽样方案
    ///
    /// # 错误
    /// - InvalidInput: 批量 < 1
    pub fn get_plan(&self, group_id: i64, lot_size: i64) -> ApiResult<PlanOutcome> {
        validate_lot_size(lot_size)?;
        retry_transient(&self.config, "plan.get_plan", || {
            self.plan_service.get_plan(group_id, lot_size)
        })
    }

    /// 批量已由调用方解析时的入口
    pub fn get_plan_for_group_and_lot(&self, group_id: i64, lot_size: i64) -> ApiResult<PlanOutcome> {
        validate_lot_size(lot_size)?;
        retry_transient(&self.config, "plan.get_plan_for_group_and_lot", || {
            self.plan_service.get_plan_for_group_and_lot(group_id, lot_size)
        })
    }

    /// 按 NQA ID 查询
    pub fn get_plan_for_level(&self, level_id: &str, lot_size: i64) -> ApiResult<PlanOutcome> {
        validate_lot_size(lot_size)?;
        retry_transient(&self.config, "plan.get_plan_for_level", || {
            self.plan_service.get_plan_for_level(level_id, lot_size)
        })
    }

    /// 按 NQA 代码查询
    ///
    /// # 错误
    /// - NotFound: 代码不存在
    pub fn get_plan_for_level_code(&self, code: &str, lot_size: i64) -> ApiResult<PlanOutcome> {
        validate_lot_size(lot_size)?;
        let level = retry_transient(&self.config, "plan.find_level", || self.registry.find_by_code(code))?
            .ok_or_else(|| ApiError::NotFound(format!("NQA(code={})不存在", code)))?;
        self.get_plan_for_level(&level.level_id, lot_size)
    }

    pub fn summary(&self) -> ApiResult<PlanSummary> {
        retry_transient(&self.config, "plan.summary", || self.plan_service.summary())
    }
}

fn validate_lot_size(lot_size: i64) -> ApiResult<()> {
    if lot_size < 1 {
        return Err(ApiError::InvalidInput(format!("批量必须 >= 1，实际 {}", lot_size)));
    }
    Ok(())
}
