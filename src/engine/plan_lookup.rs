// ==========================================
// 抽样方案引擎 - 抽样方案查询
// ==========================================
// 职责: 组合分组解析与区间查找，回答"分组 G、批量 N 用什么抽样方案"
// 说明: 纯读操作，结果是当前状态的确定性函数
// ==========================================

use crate::domain::group_binding::BindingResolution;
use crate::domain::plan::{PlanOutcome, PlanSummary, RangeLookup, SamplingPlan};
use crate::engine::binding_resolver::GroupBindingResolver;
use crate::engine::range_store::RangePartitionStore;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::{GroupBindingRepository, QualityLevelRepository, SamplingRangeRepository};
use std::sync::Arc;
use tracing::{debug, instrument};

pub struct PlanLookupService {
    resolver: Arc<GroupBindingResolver>,
    store: Arc<RangePartitionStore>,
    level_repo: Arc<QualityLevelRepository>,
    range_repo: Arc<SamplingRangeRepository>,
    binding_repo: Arc<GroupBindingRepository>,
}

impl PlanLookupService {
    pub fn new(
        resolver: Arc<GroupBindingResolver>,
        store: Arc<RangePartitionStore>,
        level_repo: Arc<QualityLevelRepository>,
        range_repo: Arc<SamplingRangeRepository>,
        binding_repo: Arc<GroupBindingRepository>,
    ) -> Self {
        Self {
            resolver,
            store,
            level_repo,
            range_repo,
            binding_repo,
        }
    }

    /// 查询分组在指定批量下的抽样方案
    ///
    /// # 返回
    /// - `Plan`: 命中区间
    /// - `NoPlanForGroup`: 分组未绑定 NQA
    /// - `NoPlanForLotSize`: NQA 下没有覆盖该批量的启用区间
    #[instrument(skip(self))]
    pub fn get_plan(&self, group_id: i64, lot_size: i64) -> RepositoryResult<PlanOutcome> {
        let level_id = match self.resolver.resolve(group_id)? {
            BindingResolution::Bound { level_id } => level_id,
            BindingResolution::Unbound { group_id } => {
                debug!("分组未绑定 NQA");
                return Ok(PlanOutcome::NoPlanForGroup { group_id });
            }
        };
        self.plan_for_level(&level_id, lot_size)
    }

    /// 批量已由调用方解析（如扫码取批号）时的入口，语义与 get_plan 相同
    pub fn get_plan_for_group_and_lot(&self, group_id: i64, lot_size: i64) -> RepositoryResult<PlanOutcome> {
        self.get_plan(group_id, lot_size)
    }

    /// 直接按 NQA 查询（检验员已知 NQA 时使用）
    ///
    /// # 错误
    /// - NotFound: NQA 不存在
    #[instrument(skip(self))]
    pub fn get_plan_for_level(&self, level_id: &str, lot_size: i64) -> RepositoryResult<PlanOutcome> {
        self.plan_for_level(level_id, lot_size)
    }

    fn plan_for_level(&self, level_id: &str, lot_size: i64) -> RepositoryResult<PlanOutcome> {
        let level = self
            .level_repo
            .find_by_id(level_id)?
            .ok_or_else(|| RepositoryError::not_found("QualityLevel", level_id))?;

        let outcome = match self.store.lookup(level_id, lot_size)? {
            RangeLookup::Covered(range) => PlanOutcome::Plan(SamplingPlan::from_range(&range, &level.code)),
            RangeLookup::NotCovered { level_id, lot_size } => {
                PlanOutcome::NoPlanForLotSize { level_id, lot_size }
            }
        };
        Ok(outcome)
    }

    /// 配置统计
    pub fn summary(&self) -> RepositoryResult<PlanSummary> {
        let (total_levels, active_levels) = self.level_repo.count()?;
        Ok(PlanSummary {
            total_levels,
            active_levels,
            inactive_levels: total_levels - active_levels,
            total_ranges: self.range_repo.count_all()?,
            total_bindings: self.binding_repo.count_all()?,
        })
    }
}
