// ==========================================
// 抽样方案引擎 - 抽样区间数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑（重叠判定在引擎层）
// 约束: 所有列表按 lot_min 升序返回
// ==========================================

use crate::domain::sampling_range::{SamplingRange, ShelfLife};
use crate::domain::types::{parse_ts, TIMESTAMP_FORMAT};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex, MutexGuard};

const SELECT_COLUMNS: &str = r#"
    SELECT range_id, level_id, lot_min, lot_max, sample_size, ac, re,
           shelf_life_months, shelf_life_days, days_70, notes, active,
           created_at, updated_at
    FROM sampling_range
"#;

// ==========================================
// SamplingRangeRepository - 抽样区间仓储
// ==========================================
pub struct SamplingRangeRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SamplingRangeRepository {
    /// 从共享连接创建仓储实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 读操作
    // ==========================================

    pub fn find_by_id(&self, range_id: &str) -> RepositoryResult<Option<SamplingRange>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, range_id)
    }

    /// 查询 NQA 下全部区间（含停用），按 lot_min 升序
    pub fn list_by_level(&self, level_id: &str) -> RepositoryResult<Vec<SamplingRange>> {
        let conn = self.get_conn()?;
        Self::list_by_level_tx(&conn, level_id, false)
    }

    /// 查询 NQA 下启用的区间，按 lot_min 升序
    pub fn list_active_by_level(&self, level_id: &str) -> RepositoryResult<Vec<SamplingRange>> {
        let conn = self.get_conn()?;
        Self::list_by_level_tx(&conn, level_id, true)
    }

    /// 查询覆盖指定批量的启用区间
    ///
    /// 取 lot_min <= lot_size 中 lot_min 最大的一条，再校验 lot_size <= lot_max；
    /// 依赖 (level_id, lot_min) 索引
    pub fn find_covering(&self, level_id: &str, lot_size: i64) -> RepositoryResult<Option<SamplingRange>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "{} WHERE level_id = ?1 AND active = 1 AND lot_min <= ?2 ORDER BY lot_min DESC LIMIT 1",
            SELECT_COLUMNS
        );
        let candidate = conn
            .query_row(&sql, params![level_id, lot_size], map_row)
            .optional()?;
        Ok(candidate.filter(|r| r.contains(lot_size)))
    }

    /// 全部区间数量
    pub fn count_all(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let n = conn.query_row("SELECT COUNT(*) FROM sampling_range", [], |row| row.get(0))?;
        Ok(n)
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    pub fn find_by_id_tx(conn: &Connection, range_id: &str) -> RepositoryResult<Option<SamplingRange>> {
        let sql = format!("{} WHERE range_id = ?1", SELECT_COLUMNS);
        let range = conn.query_row(&sql, params![range_id], map_row).optional()?;
        Ok(range)
    }

    pub fn list_by_level_tx(
        conn: &Connection,
        level_id: &str,
        active_only: bool,
    ) -> RepositoryResult<Vec<SamplingRange>> {
        let sql = format!(
            "{} WHERE level_id = ?1 AND (?2 = 0 OR active = 1) ORDER BY lot_min ASC, lot_max ASC",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let ranges = stmt
            .query_map(params![level_id, active_only], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(ranges)
    }

    /// NQA 下的区间数量（含停用）
    pub fn count_by_level_tx(conn: &Connection, level_id: &str) -> RepositoryResult<i64> {
        let n = conn.query_row(
            "SELECT COUNT(*) FROM sampling_range WHERE level_id = ?1",
            params![level_id],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    pub fn insert_tx(conn: &Connection, range: &SamplingRange) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO sampling_range (
                range_id, level_id, lot_min, lot_max, sample_size, ac, re,
                shelf_life_months, shelf_life_days, days_70, notes, active,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                range.range_id,
                range.level_id,
                range.lot_min,
                range.lot_max,
                range.sample_size,
                range.ac,
                range.re,
                range.shelf_life.months,
                range.shelf_life.days,
                range.shelf_life.days_70,
                range.notes,
                range.active,
                range.created_at.format(TIMESTAMP_FORMAT).to_string(),
                range.updated_at.format(TIMESTAMP_FORMAT).to_string(),
            ],
        )?;
        Ok(())
    }

    /// 更新区间字段（level_id 不可变）
    pub fn update_tx(conn: &Connection, range: &SamplingRange) -> RepositoryResult<usize> {
        let rows = conn.execute(
            r#"
            UPDATE sampling_range
            SET lot_min = ?2, lot_max = ?3, sample_size = ?4, ac = ?5, re = ?6,
                shelf_life_months = ?7, shelf_life_days = ?8, days_70 = ?9,
                notes = ?10, active = ?11, updated_at = ?12
            WHERE range_id = ?1
            "#,
            params![
                range.range_id,
                range.lot_min,
                range.lot_max,
                range.sample_size,
                range.ac,
                range.re,
                range.shelf_life.months,
                range.shelf_life.days,
                range.shelf_life.days_70,
                range.notes,
                range.active,
                range.updated_at.format(TIMESTAMP_FORMAT).to_string(),
            ],
        )?;
        Ok(rows)
    }

    pub fn delete_tx(conn: &Connection, range_id: &str) -> RepositoryResult<usize> {
        let rows = conn.execute(
            "DELETE FROM sampling_range WHERE range_id = ?1",
            params![range_id],
        )?;
        Ok(rows)
    }
}

fn map_row(row: &Row<'_>) -> SqliteResult<SamplingRange> {
    Ok(SamplingRange {
        range_id: row.get(0)?,
        level_id: row.get(1)?,
        lot_min: row.get(2)?,
        lot_max: row.get(3)?,
        sample_size: row.get(4)?,
        ac: row.get(5)?,
        re: row.get(6)?,
        shelf_life: ShelfLife {
            months: row.get(7)?,
            days: row.get(8)?,
            days_70: row.get(9)?,
        },
        notes: row.get(10)?,
        active: row.get(11)?,
        created_at: parse_ts(&row.get::<_, String>(12)?),
        updated_at: parse_ts(&row.get::<_, String>(13)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sampling_range::RangeDraft;
    use crate::domain::types::now_ts;

    fn setup() -> Arc<Mutex<Connection>> {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO quality_level (level_id, code, name, rigor, active, created_at, updated_at)
             VALUES ('L1', '2.5', '2.5', 'NORMAL', 1, '2026-01-01 00:00:00', '2026-01-01 00:00:00')",
            [],
        )
        .unwrap();
        Arc::new(Mutex::new(conn))
    }

    fn range(lot_min: i64, lot_max: i64, sample_size: i64, active: bool) -> SamplingRange {
        SamplingRange::new(
            "L1",
            RangeDraft {
                lot_min,
                lot_max,
                sample_size,
                ac: 0,
                re: 1,
                shelf_life: ShelfLife::default(),
                notes: None,
                active,
            }
            .validate()
            .unwrap(),
            now_ts(),
        )
    }

    #[test]
    fn test_list_is_sorted_by_lot_min() {
        let conn = setup();
        let repo = SamplingRangeRepository::new(conn.clone());
        {
            let c = conn.lock().unwrap();
            SamplingRangeRepository::insert_tx(&c, &range(16, 25, 5, true)).unwrap();
            SamplingRangeRepository::insert_tx(&c, &range(2, 8, 2, true)).unwrap();
            SamplingRangeRepository::insert_tx(&c, &range(9, 15, 3, false)).unwrap();
        }

        let all: Vec<i64> = repo.list_by_level("L1").unwrap().iter().map(|r| r.lot_min).collect();
        assert_eq!(all, vec![2, 9, 16]);

        let active: Vec<i64> = repo
            .list_active_by_level("L1")
            .unwrap()
            .iter()
            .map(|r| r.lot_min)
            .collect();
        assert_eq!(active, vec![2, 16]);
    }

    #[test]
    fn test_find_covering_respects_gaps_and_inactive() {
        let conn = setup();
        let repo = SamplingRangeRepository::new(conn.clone());
        {
            let c = conn.lock().unwrap();
            SamplingRangeRepository::insert_tx(&c, &range(2, 8, 2, true)).unwrap();
            SamplingRangeRepository::insert_tx(&c, &range(9, 15, 3, false)).unwrap();
            SamplingRangeRepository::insert_tx(&c, &range(20, 30, 5, true)).unwrap();
        }

        assert_eq!(repo.find_covering("L1", 8).unwrap().map(|r| r.sample_size), Some(2));
        assert_eq!(repo.find_covering("L1", 10).unwrap(), None); // 停用区间不命中
        assert_eq!(repo.find_covering("L1", 17).unwrap(), None); // 空隙
        assert_eq!(repo.find_covering("L1", 1).unwrap(), None);
        assert_eq!(repo.find_covering("L1", 30).unwrap().map(|r| r.sample_size), Some(5));
    }

    #[test]
    fn test_update_and_delete_report_rows() {
        let conn = setup();
        let c = conn.lock().unwrap();
        let mut r = range(2, 8, 2, true);
        SamplingRangeRepository::insert_tx(&c, &r).unwrap();

        r.lot_max = 9;
        assert_eq!(SamplingRangeRepository::update_tx(&c, &r).unwrap(), 1);
        assert_eq!(
            SamplingRangeRepository::find_by_id_tx(&c, &r.range_id).unwrap().map(|x| x.lot_max),
            Some(9)
        );

        assert_eq!(SamplingRangeRepository::delete_tx(&c, &r.range_id).unwrap(), 1);
        assert_eq!(SamplingRangeRepository::delete_tx(&c, &r.range_id).unwrap(), 0);
    }
}
