// ==========================================
// 抽样方案引擎 - 抽样方案（查询结果）
// ==========================================
// 用途: 检验流程的唯一决策输出（抽多少件、接收/拒收阈值）
// ==========================================

use crate::domain::sampling_range::{SamplingRange, ShelfLife};
use serde::{Deserialize, Serialize};

// ==========================================
// SamplingPlan - 抽样方案
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingPlan {
    pub sample_size: i64,
    pub ac: i64,
    pub re: i64,
    pub level_code: String,

    // ===== 追溯信息 =====
    pub level_id: String,
    pub range_id: String,
    pub lot_min: i64,
    pub lot_max: i64,
    pub shelf_life: ShelfLife,
}

impl SamplingPlan {
    /// 由命中的区间和 NQA 代码投影
    pub fn from_range(range: &SamplingRange, level_code: &str) -> Self {
        Self {
            sample_size: range.sample_size,
            ac: range.ac,
            re: range.re,
            level_code: level_code.to_string(),
            level_id: range.level_id.clone(),
            range_id: range.range_id.clone(),
            lot_min: range.lot_min,
            lot_max: range.lot_max,
            shelf_life: range.shelf_life,
        }
    }
}

// ==========================================
// RangeLookup - 区间查找结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeLookup {
    Covered(SamplingRange),
    NotCovered { level_id: String, lot_size: i64 },
}

// ==========================================
// PlanOutcome - 方案查询结果
// ==========================================
// "无方案"是正常业务分支（调用方可回退为全检），不作为错误返回
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanOutcome {
    Plan(SamplingPlan),
    NoPlanForGroup { group_id: i64 },
    NoPlanForLotSize { level_id: String, lot_size: i64 },
}

impl PlanOutcome {
    pub fn plan(&self) -> Option<&SamplingPlan> {
        match self {
            PlanOutcome::Plan(p) => Some(p),
            _ => None,
        }
    }

    pub fn into_plan(self) -> Option<SamplingPlan> {
        match self {
            PlanOutcome::Plan(p) => Some(p),
            _ => None,
        }
    }
}

// ==========================================
// PlanSummary - 配置统计
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub total_levels: i64,
    pub active_levels: i64,
    pub inactive_levels: i64,
    pub total_ranges: i64,
    pub total_bindings: i64,
}
