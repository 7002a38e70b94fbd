// ==========================================
// 抽样方案引擎 - 分类分组目录（外部协作方）
// ==========================================
// 职责: 只读消费外部系统的分组目录，提供存在性检查
// 说明: product_group 表由外部系统维护，本 crate 不建表、不写入
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use std::sync::{Arc, Mutex, MutexGuard};

// ==========================================
// GroupDirectory - 分组目录接口
// ==========================================
pub trait GroupDirectory: Send + Sync {
    /// 分组是否存在且启用
    fn exists(&self, group_id: i64) -> RepositoryResult<bool>;

    /// 全部启用分组 ID（升序）
    fn list_group_ids(&self) -> RepositoryResult<Vec<i64>>;
}

// ==========================================
// SqliteGroupDirectory - 读取 product_group 表
// ==========================================
pub struct SqliteGroupDirectory {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteGroupDirectory {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn table_exists(conn: &Connection) -> RepositoryResult<bool> {
        let found = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type='table' AND name='product_group' LIMIT 1",
                [],
                |_row| Ok(true),
            )
            .optional()?;
        Ok(found.unwrap_or(false))
    }
}

impl GroupDirectory for SqliteGroupDirectory {
    fn exists(&self, group_id: i64) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        if !Self::table_exists(&conn)? {
            tracing::warn!("product_group 表不存在，分组 {} 视为不存在", group_id);
            return Ok(false);
        }
        let found = conn
            .query_row(
                "SELECT 1 FROM product_group WHERE group_id = ?1 AND active = 1",
                params![group_id],
                |_row| Ok(true),
            )
            .optional()?;
        Ok(found.unwrap_or(false))
    }

    fn list_group_ids(&self) -> RepositoryResult<Vec<i64>> {
        let conn = self.get_conn()?;
        if !Self::table_exists(&conn)? {
            return Ok(Vec::new());
        }
        let mut stmt =
            conn.prepare("SELECT group_id FROM product_group WHERE active = 1 ORDER BY group_id ASC")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(ids)
    }
}
