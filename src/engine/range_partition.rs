// ==========================================
// 抽样方案引擎 - 批量区间划分（纯逻辑）
// ==========================================
// 职责: 在单个 NQA 的启用区间集合上做重叠判定、空隙计算、一致性检查
// 覆盖查找走 SQL（sampling_range_repo::find_covering），不在此处
// 红线: 不拼 SQL, 不做 I/O
// 不变量: 启用区间按 lot_min 升序排列，两两不相交
// ==========================================

use crate::domain::sampling_range::SamplingRange;
use serde::{Deserialize, Serialize};

// ==========================================
// RangeGap - 未覆盖的批量区间（仅提示，不是错误）
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeGap {
    pub from: i64,
    pub to: i64,
}

// ==========================================
// RangeListing - 带空隙提示的区间列表
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeListing {
    pub level_id: String,
    /// 全部区间（含停用），按 lot_min 升序
    pub ranges: Vec<SamplingRange>,
    /// 启用区间之间（以及 1 到首个区间之间）的空隙
    pub gaps: Vec<RangeGap>,
}

// ==========================================
// RangePartition - 单个 NQA 的启用区间划分
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct RangePartition {
    ranges: Vec<SamplingRange>,
}

impl RangePartition {
    /// 由任意顺序的区间构造；停用区间被忽略
    pub fn from_ranges<I>(ranges: I) -> Self
    where
        I: IntoIterator<Item = SamplingRange>,
    {
        let mut ranges: Vec<SamplingRange> = ranges.into_iter().filter(|r| r.active).collect();
        ranges.sort_by(|a, b| a.lot_min.cmp(&b.lot_min).then(a.lot_max.cmp(&b.lot_max)));
        Self { ranges }
    }

    pub fn ranges(&self) -> &[SamplingRange] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// 查找与 [lot_min, lot_max] 相交的第一个区间（按 lot_min 顺序）
    ///
    /// # 参数
    /// - `exclude_range_id`: 更新场景下排除自身
    pub fn find_conflict(
        &self,
        lot_min: i64,
        lot_max: i64,
        exclude_range_id: Option<&str>,
    ) -> Option<&SamplingRange> {
        self.ranges
            .iter()
            .filter(|r| Some(r.range_id.as_str()) != exclude_range_id)
            .find(|r| r.intersects(lot_min, lot_max))
    }

    /// 计算空隙: 从 1 开始，到最后一个区间的 lot_max 为止
    pub fn gaps(&self) -> Vec<RangeGap> {
        let mut gaps = Vec::new();
        let mut next_uncovered: i64 = 1;

        for r in &self.ranges {
            if r.lot_min > next_uncovered {
                gaps.push(RangeGap {
                    from: next_uncovered,
                    to: r.lot_min - 1,
                });
            }
            next_uncovered = next_uncovered.max(r.lot_max.saturating_add(1));
        }

        gaps
    }

    /// 相交的区间对（正常情况下为空；用于完整性巡检）
    pub fn overlapping_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for (i, a) in self.ranges.iter().enumerate() {
            for b in &self.ranges[i + 1..] {
                if b.lot_min > a.lot_max {
                    break;
                }
                pairs.push((a.range_id.clone(), b.range_id.clone()));
            }
        }
        pairs
    }
}
