// ==========================================
// 抽样方案引擎 - 批量区间存储
// ==========================================
// 职责: 按 NQA 维护互不相交的批量区间，并按批量查找覆盖区间
// 红线: 先检查后写入必须在同一个 IMMEDIATE 事务内完成
// 不变量: 任意时刻，同一 NQA 的启用区间两两不相交
// ==========================================

use crate::config::ConfigManager;
use crate::db::with_immediate_transaction;
use crate::domain::plan::RangeLookup;
use crate::domain::sampling_range::{RangeDraft, RangePatch, SamplingRange, ValidRange};
use crate::domain::types::now_ts;
use crate::engine::nqa_registry::{AutoLevelDefaults, LevelResolution, NqaRegistry};
use crate::engine::range_partition::{RangeListing, RangePartition};
use crate::engine::Change;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::{QualityLevelRepository, SamplingRangeRepository};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};

// ==========================================
// RangePartitionStore
// ==========================================
pub struct RangePartitionStore {
    conn: Arc<Mutex<Connection>>,
    range_repo: Arc<SamplingRangeRepository>,
    level_repo: Arc<QualityLevelRepository>,
    config: Arc<ConfigManager>,
}

impl RangePartitionStore {
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        range_repo: Arc<SamplingRangeRepository>,
        level_repo: Arc<QualityLevelRepository>,
        config: Arc<ConfigManager>,
    ) -> Self {
        Self {
            conn,
            range_repo,
            level_repo,
            config,
        }
    }

    // ==========================================
    // 写操作
    // ==========================================

    /// 在指定 NQA 下新增区间
    ///
    /// # 错误
    /// - FieldValueError: 字段校验失败（未触及存储）
    /// - NotFound: NQA 不存在或已停用
    /// - RangeOverlap: 与启用区间相交，返回第一个冲突区间
    #[instrument(skip(self, draft), fields(lot_min = draft.lot_min, lot_max = draft.lot_max))]
    pub fn insert(&self, level_id: &str, draft: RangeDraft) -> RepositoryResult<SamplingRange> {
        let valid = draft.validate()?;

        let range = with_immediate_transaction(&self.conn, |tx| {
            Self::ensure_active_level_tx(tx, level_id)?;
            Self::insert_checked_tx(tx, level_id, valid)
        })?;

        info!(
            range_id = %range.range_id,
            level_id = %level_id,
            lot_min = range.lot_min,
            lot_max = range.lot_max,
            "抽样区间已新增"
        );
        Ok(range)
    }

    /// 按 NQA 代码新增区间（代码不存在时自动创建 NQA）
    ///
    /// NQA 创建与区间写入在同一事务内：区间被拒绝时 NQA 一并回滚
    #[instrument(skip(self, draft), fields(lot_min = draft.lot_min, lot_max = draft.lot_max))]
    pub fn insert_with_code(
        &self,
        code: &str,
        draft: RangeDraft,
    ) -> RepositoryResult<(LevelResolution, SamplingRange)> {
        let valid = draft.validate()?;
        let defaults = AutoLevelDefaults::from_config(&self.config)?;

        let (resolution, range) = with_immediate_transaction(&self.conn, |tx| {
            let resolution = NqaRegistry::resolve_or_create_tx(tx, code, &defaults)?;
            let level = resolution.level();
            if !level.active {
                return Err(RepositoryError::not_found("QualityLevel", &level.level_id));
            }
            let range = Self::insert_checked_tx(tx, &level.level_id, valid)?;
            Ok((resolution, range))
        })?;

        info!(
            range_id = %range.range_id,
            code = %resolution.level().code,
            level_created = resolution.was_created(),
            "抽样区间已按代码新增"
        );
        Ok((resolution, range))
    }

    /// 更新区间（排除自身参与重叠判定；所属 NQA 不可变）
    ///
    /// 更新后为停用状态时不做重叠判定；重新启用会重新判定
    #[instrument(skip(self, patch))]
    pub fn update(&self, range_id: &str, patch: &RangePatch) -> RepositoryResult<Change<SamplingRange>> {
        if patch.is_empty() {
            return Err(RepositoryError::ValidationError("没有需要更新的字段".to_string()));
        }

        let change = with_immediate_transaction(&self.conn, |tx| {
            let before = SamplingRangeRepository::find_by_id_tx(tx, range_id)?
                .ok_or_else(|| RepositoryError::not_found("SamplingRange", range_id))?;
            let after = before.apply_patch(patch, now_ts())?;

            if after.active {
                let partition = Self::load_partition_tx(tx, &after.level_id)?;
                if let Some(conflict) = partition.find_conflict(after.lot_min, after.lot_max, Some(range_id)) {
                    warn!(
                        range_id = %range_id,
                        conflict_id = %conflict.range_id,
                        "更新后的区间与已有区间重叠"
                    );
                    return Err(overlap_error(conflict));
                }
            }

            SamplingRangeRepository::update_tx(tx, &after)?;
            Ok(Change { before, after })
        })?;

        info!(
            range_id = %range_id,
            lot_min = change.after.lot_min,
            lot_max = change.after.lot_max,
            active = change.after.active,
            "抽样区间已更新"
        );
        Ok(change)
    }

    /// 删除区间（无条件；区间不被其他实体引用）
    ///
    /// # 错误
    /// - NotFound: 区间不存在（包括重复删除）
    #[instrument(skip(self))]
    pub fn delete(&self, range_id: &str) -> RepositoryResult<SamplingRange> {
        let deleted = with_immediate_transaction(&self.conn, |tx| {
            let range = SamplingRangeRepository::find_by_id_tx(tx, range_id)?
                .ok_or_else(|| RepositoryError::not_found("SamplingRange", range_id))?;
            SamplingRangeRepository::delete_tx(tx, range_id)?;
            Ok(range)
        })?;

        info!(range_id = %range_id, level_id = %deleted.level_id, "抽样区间已删除");
        Ok(deleted)
    }

    // ==========================================
    // 读操作
    // ==========================================

    pub fn get(&self, range_id: &str) -> RepositoryResult<SamplingRange> {
        self.range_repo
            .find_by_id(range_id)?
            .ok_or_else(|| RepositoryError::not_found("SamplingRange", range_id))
    }

    /// 查找覆盖 lot_size 的启用区间
    ///
    /// 未覆盖是正常业务结果（NotCovered），不是错误
    #[instrument(skip(self))]
    pub fn lookup(&self, level_id: &str, lot_size: i64) -> RepositoryResult<RangeLookup> {
        let found = if lot_size < 1 {
            None
        } else {
            self.range_repo.find_covering(level_id, lot_size)?
        };

        match found {
            Some(range) => {
                debug!(range_id = %range.range_id, "批量命中区间");
                Ok(RangeLookup::Covered(range))
            }
            None => {
                debug!("批量未被任何区间覆盖");
                Ok(RangeLookup::NotCovered {
                    level_id: level_id.to_string(),
                    lot_size,
                })
            }
        }
    }

    /// NQA 下全部区间（含停用），按 lot_min 升序
    pub fn list_by_level(&self, level_id: &str) -> RepositoryResult<Vec<SamplingRange>> {
        self.ensure_level_exists(level_id)?;
        self.range_repo.list_by_level(level_id)
    }

    /// 区间列表 + 空隙提示
    pub fn listing_by_level(&self, level_id: &str) -> RepositoryResult<RangeListing> {
        let ranges = self.list_by_level(level_id)?;
        let gaps = RangePartition::from_ranges(ranges.iter().cloned()).gaps();
        Ok(RangeListing {
            level_id: level_id.to_string(),
            ranges,
            gaps,
        })
    }

    /// 巡检: 返回 NQA 下相交的启用区间对（正常应为空）
    pub fn verify_level(&self, level_id: &str) -> RepositoryResult<Vec<(String, String)>> {
        let ranges = self.range_repo.list_active_by_level(level_id)?;
        let pairs = RangePartition::from_ranges(ranges).overlapping_pairs();
        if !pairs.is_empty() {
            warn!(level_id = %level_id, pairs = pairs.len(), "发现相交的启用区间");
        }
        Ok(pairs)
    }

    // ==========================================
    // 内部辅助
    // ==========================================

    fn ensure_level_exists(&self, level_id: &str) -> RepositoryResult<()> {
        match self.level_repo.find_by_id(level_id)? {
            Some(_) => Ok(()),
            None => Err(RepositoryError::not_found("QualityLevel", level_id)),
        }
    }

    fn ensure_active_level_tx(conn: &Connection, level_id: &str) -> RepositoryResult<()> {
        match QualityLevelRepository::find_by_id_tx(conn, level_id)? {
            Some(level) if level.active => Ok(()),
            _ => Err(RepositoryError::not_found("QualityLevel", level_id)),
        }
    }

    fn load_partition_tx(conn: &Connection, level_id: &str) -> RepositoryResult<RangePartition> {
        let ranges = SamplingRangeRepository::list_by_level_tx(conn, level_id, true)?;
        Ok(RangePartition::from_ranges(ranges))
    }

    /// 事务内: 重叠判定 + 写入（NQA 已确认存在且启用）
    pub(crate) fn insert_checked_tx(
        conn: &Connection,
        level_id: &str,
        valid: ValidRange,
    ) -> RepositoryResult<SamplingRange> {
        let range = SamplingRange::new(level_id, valid, now_ts());

        if range.active {
            let partition = Self::load_partition_tx(conn, level_id)?;
            if let Some(conflict) = partition.find_conflict(range.lot_min, range.lot_max, None) {
                warn!(
                    level_id = %level_id,
                    lot_min = range.lot_min,
                    lot_max = range.lot_max,
                    conflict_id = %conflict.range_id,
                    "新区间与已有区间重叠"
                );
                return Err(overlap_error(conflict));
            }
        }

        SamplingRangeRepository::insert_tx(conn, &range)?;
        Ok(range)
    }
}

fn overlap_error(conflict: &SamplingRange) -> RepositoryError {
    RepositoryError::RangeOverlap {
        range_id: conflict.range_id.clone(),
        lot_min: conflict.lot_min,
        lot_max: conflict.lot_max,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::quality_level::QualityLevelDraft;
    use crate::domain::sampling_range::ShelfLife;
    use crate::domain::types::InspectionRigor;

    struct Fixture {
        registry: NqaRegistry,
        store: RangePartitionStore,
    }

    fn setup() -> Fixture {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));

        let level_repo = Arc::new(QualityLevelRepository::new(conn.clone()));
        let range_repo = Arc::new(SamplingRangeRepository::new(conn.clone()));
        let config = Arc::new(ConfigManager::from_connection(conn.clone()).unwrap());

        Fixture {
            registry: NqaRegistry::new(conn.clone(), level_repo.clone(), config.clone()),
            store: RangePartitionStore::new(conn, range_repo, level_repo, config),
        }
    }

    fn draft(lot_min: i64, lot_max: i64, sample_size: i64, ac: i64, re: i64) -> RangeDraft {
        RangeDraft {
            lot_min,
            lot_max,
            sample_size,
            ac,
            re,
            shelf_life: ShelfLife::default(),
            notes: None,
            active: true,
        }
    }

    fn create_level(fx: &Fixture, code: &str) -> String {
        fx.registry
            .create(QualityLevelDraft {
                code: code.to_string(),
                name: format!("NQA {}", code),
                rigor: InspectionRigor::Normal,
                active: true,
            })
            .unwrap()
            .level_id
    }

    #[test]
    fn test_insert_and_lookup() {
        let fx = setup();
        let level_id = create_level(&fx, "2.5");
        fx.store.insert(&level_id, draft(2, 8, 2, 0, 1)).unwrap();
        fx.store.insert(&level_id, draft(9, 15, 3, 0, 1)).unwrap();
        fx.store.insert(&level_id, draft(16, 25, 5, 1, 2)).unwrap();

        match fx.store.lookup(&level_id, 10).unwrap() {
            RangeLookup::Covered(r) => assert_eq!((r.sample_size, r.ac, r.re), (3, 0, 1)),
            other => panic!("expected covered, got {:?}", other),
        }
        assert_eq!(
            fx.store.lookup(&level_id, 1).unwrap(),
            RangeLookup::NotCovered {
                level_id: level_id.clone(),
                lot_size: 1
            }
        );
    }

    #[test]
    fn test_lookup_agrees_with_linear_scan() {
        let fx = setup();
        let level_id = create_level(&fx, "6.5");
        fx.store.insert(&level_id, draft(40, 90, 5, 1, 2)).unwrap();
        fx.store.insert(&level_id, draft(2, 8, 2, 0, 1)).unwrap();
        fx.store.insert(&level_id, draft(12, 15, 3, 0, 1)).unwrap();
        let mut old = draft(20, 30, 3, 0, 1);
        old.active = false;
        fx.store.insert(&level_id, old).unwrap();

        let all = fx.store.list_by_level(&level_id).unwrap();
        for x in 0..100 {
            let linear = all
                .iter()
                .find(|r| r.active && r.contains(x))
                .map(|r| r.range_id.clone());
            let found = match fx.store.lookup(&level_id, x).unwrap() {
                RangeLookup::Covered(r) => Some(r.range_id),
                RangeLookup::NotCovered { .. } => None,
            };
            assert_eq!(found, linear, "lot_size={}", x);
        }
    }

    #[test]
    fn test_overlap_is_rejected_and_nothing_persisted() {
        let fx = setup();
        let level_id = create_level(&fx, "2.5");
        let first = fx.store.insert(&level_id, draft(2, 8, 2, 0, 1)).unwrap();
        fx.store.insert(&level_id, draft(9, 15, 3, 0, 1)).unwrap();

        let err = fx.store.insert(&level_id, draft(7, 12, 3, 0, 1)).unwrap_err();
        match err {
            RepositoryError::RangeOverlap { range_id, lot_min, lot_max } => {
                assert_eq!(range_id, first.range_id);
                assert_eq!((lot_min, lot_max), (2, 8));
            }
            other => panic!("expected overlap, got {:?}", other),
        }
        assert_eq!(fx.store.list_by_level(&level_id).unwrap().len(), 2);
    }

    #[test]
    fn test_validation_runs_before_storage() {
        let fx = setup();
        // 即使 NQA 不存在，字段错误也优先返回
        let err = fx.store.insert("missing", draft(5, 4, 2, 0, 1)).unwrap_err();
        assert!(matches!(err, RepositoryError::FieldValueError { ref field, .. } if field == "lot_max"));

        let err = fx.store.insert("missing", draft(1, 4, 2, 0, 1)).unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }

    #[test]
    fn test_insert_into_inactive_level_is_not_found() {
        let fx = setup();
        let level_id = create_level(&fx, "4.0");
        fx.registry
            .update(
                &level_id,
                &crate::domain::quality_level::QualityLevelPatch {
                    active: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        let err = fx.store.insert(&level_id, draft(1, 10, 2, 0, 1)).unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }

    #[test]
    fn test_update_excludes_self_and_checks_neighbours() {
        let fx = setup();
        let level_id = create_level(&fx, "1.0");
        fx.store.insert(&level_id, draft(2, 8, 2, 0, 1)).unwrap();
        let b = fx.store.insert(&level_id, draft(9, 15, 3, 0, 1)).unwrap();
        fx.store.insert(&level_id, draft(16, 25, 5, 1, 2)).unwrap();

        let grow = RangePatch {
            lot_min: Some(9),
            lot_max: Some(15),
            sample_size: Some(4),
            ..Default::default()
        };
        let change = fx.store.update(&b.range_id, &grow).unwrap();
        assert_eq!(change.before.sample_size, 3);
        assert_eq!(change.after.sample_size, 4);

        let clash = RangePatch {
            lot_max: Some(16),
            ..Default::default()
        };
        assert!(matches!(
            fx.store.update(&b.range_id, &clash),
            Err(RepositoryError::RangeOverlap { .. })
        ));
        assert_eq!(fx.store.get(&b.range_id).unwrap().lot_max, 15);
    }

    #[test]
    fn test_reactivation_rechecks_overlap() {
        let fx = setup();
        let level_id = create_level(&fx, "6.5");
        let old = fx.store.insert(&level_id, draft(1, 10, 2, 0, 1)).unwrap();
        fx.store
            .update(
                &old.range_id,
                &RangePatch {
                    active: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();

        // 停用区间不参与重叠判定
        fx.store.insert(&level_id, draft(5, 20, 3, 0, 1)).unwrap();

        let err = fx
            .store
            .update(
                &old.range_id,
                &RangePatch {
                    active: Some(true),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, RepositoryError::RangeOverlap { lot_min: 5, lot_max: 20, .. }));
        assert!(fx.store.verify_level(&level_id).unwrap().is_empty());
    }

    #[test]
    fn test_delete_twice() {
        let fx = setup();
        let level_id = create_level(&fx, "2.5");
        let r = fx.store.insert(&level_id, draft(2, 8, 2, 0, 1)).unwrap();

        fx.store.delete(&r.range_id).unwrap();
        assert!(matches!(
            fx.store.delete(&r.range_id),
            Err(RepositoryError::NotFound { .. })
        ));
        assert!(fx.store.list_by_level(&level_id).unwrap().is_empty());
    }

    #[test]
    fn test_insert_with_code_rolls_back_created_level() {
        let fx = setup();

        let (resolution, _) = fx.store.insert_with_code("1,5", draft(1, 10, 2, 0, 1)).unwrap();
        assert!(resolution.was_created());
        assert_eq!(resolution.level().code, "1.5");
        assert_eq!(resolution.level().name, "1.5");

        let (again, _) = fx.store.insert_with_code("1.5", draft(11, 20, 3, 0, 1)).unwrap();
        assert!(!again.was_created());

        // 新代码 + 非法区间: NQA 不应残留
        let err = fx.store.insert_with_code("9.9", draft(1, 10, 2, 1, 1)).unwrap_err();
        assert!(matches!(err, RepositoryError::FieldValueError { .. }));
        assert!(fx.registry.find_by_code("9.9").unwrap().is_none());

        // 已有代码 + 重叠: 不产生任何新 NQA
        let err = fx.store.insert_with_code("1.5", draft(5, 6, 2, 0, 1)).unwrap_err();
        assert!(matches!(err, RepositoryError::RangeOverlap { .. }));
        assert_eq!(fx.registry.list(false).unwrap().len(), 1);
    }

    #[test]
    fn test_listing_reports_gaps() {
        let fx = setup();
        let level_id = create_level(&fx, "2.5");
        fx.store.insert(&level_id, draft(2, 8, 2, 0, 1)).unwrap();
        fx.store.insert(&level_id, draft(20, 30, 5, 1, 2)).unwrap();
        let listing = fx.store.listing_by_level(&level_id).unwrap();
        assert_eq!(listing.ranges.len(), 2);
        assert_eq!(listing.gaps.len(), 2);
        assert_eq!((listing.gaps[1].from, listing.gaps[1].to), (9, 19));
    }
}
