// ==========================================
// 抽样方案引擎 - NQA 数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 说明: `*_tx` 关联函数接收调用方持有的连接/事务，
//       供引擎层把“检查 + 写入”组合进同一事务
// ==========================================

use crate::domain::quality_level::QualityLevel;
use crate::domain::types::{parse_ts, InspectionRigor, TIMESTAMP_FORMAT};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex, MutexGuard};

const SELECT_COLUMNS: &str =
    "SELECT level_id, code, name, rigor, active, created_at, updated_at FROM quality_level";

// ==========================================
// QualityLevelRepository - NQA 仓储
// ==========================================
pub struct QualityLevelRepository {
    conn: Arc<Mutex<Connection>>,
}

impl QualityLevelRepository {
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

    /// 按 ID 查询
    pub fn find_by_id(&self, level_id: &str) -> RepositoryResult<Option<QualityLevel>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, level_id)
    }

    /// 按规范化代码查询
    pub fn find_by_code(&self, code: &str) -> RepositoryResult<Option<QualityLevel>> {
        let conn = self.get_conn()?;
        Self::find_by_code_tx(&conn, code)
    }

    /// 列表（按代码排序）
    ///
    /// # 参数
    /// - `active_only`: 为 true 时只返回启用的 NQA
    pub fn list(&self, active_only: bool) -> RepositoryResult<Vec<QualityLevel>> {
        let conn = self.get_conn()?;
        let sql = if active_only {
            format!("{} WHERE active = 1 ORDER BY code ASC", SELECT_COLUMNS)
        } else {
            format!("{} ORDER BY code ASC", SELECT_COLUMNS)
        };
        let mut stmt = conn.prepare(&sql)?;
        let levels = stmt
            .query_map([], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(levels)
    }

    /// 统计 (总数, 启用数)
    pub fn count(&self) -> RepositoryResult<(i64, i64)> {
        let conn = self.get_conn()?;
        let counts = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN active = 1 THEN 1 ELSE 0 END), 0) FROM quality_level",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(counts)
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    pub fn find_by_id_tx(conn: &Connection, level_id: &str) -> RepositoryResult<Option<QualityLevel>> {
        let sql = format!("{} WHERE level_id = ?1", SELECT_COLUMNS);
        let level = conn
            .query_row(&sql, params![level_id], map_row)
            .optional()?;
        Ok(level)
    }

    pub fn find_by_code_tx(conn: &Connection, code: &str) -> RepositoryResult<Option<QualityLevel>> {
        let sql = format!("{} WHERE code = ?1", SELECT_COLUMNS);
        let level = conn.query_row(&sql, params![code], map_row).optional()?;
        Ok(level)
    }

    /// 代码是否已被其他 NQA 占用
    pub fn code_taken_tx(conn: &Connection, code: &str, exclude_level_id: Option<&str>) -> RepositoryResult<bool> {
        let taken: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM quality_level WHERE code = ?1 AND (?2 IS NULL OR level_id <> ?2) LIMIT 1",
                params![code, exclude_level_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(taken.is_some())
    }

    pub fn insert_tx(conn: &Connection, level: &QualityLevel) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO quality_level (level_id, code, name, rigor, active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                level.level_id,
                level.code,
                level.name,
                level.rigor.to_db_str(),
                level.active,
                level.created_at.format(TIMESTAMP_FORMAT).to_string(),
                level.updated_at.format(TIMESTAMP_FORMAT).to_string(),
            ],
        )?;
        Ok(())
    }

    /// 更新全部可变字段
    ///
    /// # 返回
    /// - Ok(rows): 受影响行数（0 表示不存在）
    pub fn update_tx(conn: &Connection, level: &QualityLevel) -> RepositoryResult<usize> {
        let rows = conn.execute(
            r#"
            UPDATE quality_level
            SET code = ?2, name = ?3, rigor = ?4, active = ?5, updated_at = ?6
            WHERE level_id = ?1
            "#,
            params![
                level.level_id,
                level.code,
                level.name,
                level.rigor.to_db_str(),
                level.active,
                level.updated_at.format(TIMESTAMP_FORMAT).to_string(),
            ],
        )?;
        Ok(rows)
    }

    pub fn delete_tx(conn: &Connection, level_id: &str) -> RepositoryResult<usize> {
        let rows = conn.execute(
            "DELETE FROM quality_level WHERE level_id = ?1",
            params![level_id],
        )?;
        Ok(rows)
    }
}

fn map_row(row: &Row<'_>) -> SqliteResult<QualityLevel> {
    Ok(QualityLevel {
        level_id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        rigor: InspectionRigor::parse(&row.get::<_, String>(3)?).unwrap_or_default(),
        active: row.get(4)?,
        created_at: parse_ts(&row.get::<_, String>(5)?),
        updated_at: parse_ts(&row.get::<_, String>(6)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::quality_level::QualityLevelDraft;
    use crate::domain::types::now_ts;

    fn setup() -> Arc<Mutex<Connection>> {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        Arc::new(Mutex::new(conn))
    }

    fn level(code: &str, active: bool) -> QualityLevel {
        QualityLevel::new(
            QualityLevelDraft {
                code: code.to_string(),
                name: format!("NQA {}", code),
                rigor: InspectionRigor::Normal,
                active,
            }
            .validate()
            .unwrap(),
            now_ts(),
        )
    }

    #[test]
    fn test_insert_and_find() {
        let conn = setup();
        let repo = QualityLevelRepository::new(conn.clone());
        let l = level("2.5", true);
        {
            let c = conn.lock().unwrap();
            QualityLevelRepository::insert_tx(&c, &l).unwrap();
        }

        assert_eq!(repo.find_by_id(&l.level_id).unwrap(), Some(l.clone()));
        assert_eq!(repo.find_by_code("2.5").unwrap().map(|x| x.level_id), Some(l.level_id));
        assert!(repo.find_by_code("4.0").unwrap().is_none());
    }

    #[test]
    fn test_list_active_only_and_count() {
        let conn = setup();
        let repo = QualityLevelRepository::new(conn.clone());
        {
            let c = conn.lock().unwrap();
            QualityLevelRepository::insert_tx(&c, &level("1.0", true)).unwrap();
            QualityLevelRepository::insert_tx(&c, &level("0.65", false)).unwrap();
        }

        assert_eq!(repo.list(false).unwrap().len(), 2);
        let active = repo.list(true).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].code, "1.0");
        assert_eq!(repo.count().unwrap(), (2, 1));
    }

    #[test]
    fn test_duplicate_code_hits_unique_constraint() {
        let conn = setup();
        let c = conn.lock().unwrap();
        QualityLevelRepository::insert_tx(&c, &level("2.5", true)).unwrap();
        let err = QualityLevelRepository::insert_tx(&c, &level("2.5", true)).unwrap_err();
        assert!(matches!(err, RepositoryError::UniqueConstraintViolation(_)));
        assert!(QualityLevelRepository::code_taken_tx(&c, "2.5", None).unwrap());
    }
}
