// ==========================================
// 抽样方案引擎 - 分组绑定数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 约束: group_id 为主键，数据库层面保证一组一绑定
// ==========================================

use crate::domain::group_binding::GroupBinding;
use crate::domain::types::{parse_ts, TIMESTAMP_FORMAT};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

const SELECT_COLUMNS: &str = "SELECT group_id, level_id, notes, created_at FROM group_binding";

// ==========================================
// GroupBindingRepository - 分组绑定仓储
// ==========================================
pub struct GroupBindingRepository {
    conn: Arc<Mutex<Connection>>,
}

impl GroupBindingRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 读操作
    // ==========================================

    pub fn find_by_group(&self, group_id: i64) -> RepositoryResult<Option<GroupBinding>> {
        let conn = self.get_conn()?;
        Self::find_by_group_tx(&conn, group_id)
    }

    /// 全部绑定（按 group_id 升序）
    pub fn list_all(&self) -> RepositoryResult<Vec<GroupBinding>> {
        let conn = self.get_conn()?;
        let sql = format!("{} ORDER BY group_id ASC", SELECT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let bindings = stmt
            .query_map([], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(bindings)
    }

    /// 某 NQA 下的绑定（按 group_id 升序）
    pub fn list_by_level(&self, level_id: &str) -> RepositoryResult<Vec<GroupBinding>> {
        let conn = self.get_conn()?;
        let sql = format!("{} WHERE level_id = ?1 ORDER BY group_id ASC", SELECT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let bindings = stmt
            .query_map(params![level_id], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(bindings)
    }

    /// 已绑定的 group_id 集合
    pub fn bound_group_ids(&self) -> RepositoryResult<HashSet<i64>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT group_id FROM group_binding")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<SqliteResult<HashSet<_>>>()?;
        Ok(ids)
    }

    pub fn count_all(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let n = conn.query_row("SELECT COUNT(*) FROM group_binding", [], |row| row.get(0))?;
        Ok(n)
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    pub fn find_by_group_tx(conn: &Connection, group_id: i64) -> RepositoryResult<Option<GroupBinding>> {
        let sql = format!("{} WHERE group_id = ?1", SELECT_COLUMNS);
        let binding = conn.query_row(&sql, params![group_id], map_row).optional()?;
        Ok(binding)
    }

    pub fn count_by_level_tx(conn: &Connection, level_id: &str) -> RepositoryResult<i64> {
        let n = conn.query_row(
            "SELECT COUNT(*) FROM group_binding WHERE level_id = ?1",
            params![level_id],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    pub fn insert_tx(conn: &Connection, binding: &GroupBinding) -> RepositoryResult<()> {
        conn.execute(
            "INSERT INTO group_binding (group_id, level_id, notes, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                binding.group_id,
                binding.level_id,
                binding.notes,
                binding.created_at.format(TIMESTAMP_FORMAT).to_string(),
            ],
        )?;
        Ok(())
    }

    pub fn delete_tx(conn: &Connection, group_id: i64) -> RepositoryResult<usize> {
        let rows = conn.execute(
            "DELETE FROM group_binding WHERE group_id = ?1",
            params![group_id],
        )?;
        Ok(rows)
    }
}

fn map_row(row: &Row<'_>) -> SqliteResult<GroupBinding> {
    Ok(GroupBinding {
        group_id: row.get(0)?,
        level_id: row.get(1)?,
        notes: row.get(2)?,
        created_at: parse_ts(&row.get::<_, String>(3)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::quality_level::{QualityLevel, QualityLevelDraft};
    use crate::domain::types::now_ts;
    use crate::repository::QualityLevelRepository;

    fn setup() -> (Arc<Mutex<Connection>>, String) {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        let level = QualityLevel::new(
            QualityLevelDraft {
                code: "2.5".to_string(),
                name: "NQA 2.5".to_string(),
                rigor: Default::default(),
                active: true,
            }
            .validate()
            .unwrap(),
            now_ts(),
        );
        QualityLevelRepository::insert_tx(&conn, &level).unwrap();
        (Arc::new(Mutex::new(conn)), level.level_id)
    }

    fn binding(group_id: i64, level_id: &str) -> GroupBinding {
        GroupBinding {
            group_id,
            level_id: level_id.to_string(),
            notes: Some("来料".to_string()),
            created_at: now_ts(),
        }
    }

    #[test]
    fn test_insert_find_and_list() {
        let (conn, level_id) = setup();
        let repo = GroupBindingRepository::new(conn.clone());
        {
            let c = conn.lock().unwrap();
            GroupBindingRepository::insert_tx(&c, &binding(43, &level_id)).unwrap();
            GroupBindingRepository::insert_tx(&c, &binding(7, &level_id)).unwrap();
        }

        let found = repo.find_by_group(43).unwrap().unwrap();
        assert_eq!(found.level_id, level_id);
        assert_eq!(found.notes.as_deref(), Some("来料"));
        assert!(repo.find_by_group(1).unwrap().is_none());

        let ids: Vec<i64> = repo.list_all().unwrap().iter().map(|b| b.group_id).collect();
        assert_eq!(ids, vec![7, 43]);
        assert_eq!(repo.list_by_level(&level_id).unwrap().len(), 2);
        assert_eq!(repo.bound_group_ids().unwrap(), [7, 43].into_iter().collect());
        assert_eq!(repo.count_all().unwrap(), 2);
    }

    #[test]
    fn test_group_id_is_unique() {
        let (conn, level_id) = setup();
        let c = conn.lock().unwrap();
        GroupBindingRepository::insert_tx(&c, &binding(42, &level_id)).unwrap();
        assert!(GroupBindingRepository::insert_tx(&c, &binding(42, &level_id)).is_err());
        assert_eq!(GroupBindingRepository::count_by_level_tx(&c, &level_id).unwrap(), 1);
    }

    #[test]
    fn test_delete_reports_rows() {
        let (conn, level_id) = setup();
        let c = conn.lock().unwrap();
        GroupBindingRepository::insert_tx(&c, &binding(42, &level_id)).unwrap();
        assert_eq!(GroupBindingRepository::delete_tx(&c, 42).unwrap(), 1);
        assert_eq!(GroupBindingRepository::delete_tx(&c, 42).unwrap(), 0);
    }
}
