// ==========================================
// 抽样方案引擎 - SQLite 连接初始化与建表
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为，避免“部分连接外键开启/部分不开启”
// - 统一 busy_timeout，并发写入时让第二个写者排队而不是立即失败
// - 建表脚本幂等，供应用启动和测试共用
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::OptionalExtension;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 初始化核心表结构（幂等）
///
/// 三张业务表: quality_level / sampling_range / group_binding
/// 两张支撑表: audit_log / config_kv
///
/// 说明：product_group（分组目录）属于外部系统，这里不建。
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS quality_level (
            level_id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            rigor TEXT NOT NULL DEFAULT 'NORMAL'
                CHECK (rigor IN ('REDUCED', 'NORMAL', 'TIGHTENED')),
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sampling_range (
            range_id TEXT PRIMARY KEY,
            level_id TEXT NOT NULL REFERENCES quality_level(level_id),
            lot_min INTEGER NOT NULL CHECK (lot_min >= 1),
            lot_max INTEGER NOT NULL,
            sample_size INTEGER NOT NULL CHECK (sample_size >= 1),
            ac INTEGER NOT NULL CHECK (ac >= 0),
            re INTEGER NOT NULL,
            shelf_life_months INTEGER,
            shelf_life_days INTEGER,
            days_70 INTEGER,
            notes TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            CHECK (lot_max >= lot_min),
            CHECK (re > ac)
        );

        CREATE INDEX IF NOT EXISTS idx_sampling_range_level_lot
            ON sampling_range(level_id, lot_min);

        CREATE TABLE IF NOT EXISTS group_binding (
            group_id INTEGER PRIMARY KEY,
            level_id TEXT NOT NULL REFERENCES quality_level(level_id),
            notes TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_group_binding_level
            ON group_binding(level_id);

        CREATE TABLE IF NOT EXISTS audit_log (
            audit_id TEXT PRIMARY KEY,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            action_type TEXT NOT NULL,
            action_ts TEXT NOT NULL,
            actor TEXT NOT NULL,
            before_json TEXT,
            after_json TEXT,
            changes_json TEXT,
            detail TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_audit_log_entity
            ON audit_log(entity_type, entity_id);

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL DEFAULT 'global',
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;

    Ok(())
}

/// 打开连接、应用 PRAGMA 并保证表结构存在
pub fn open_and_init(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = open_sqlite_connection(db_path)?;
    init_schema(&conn)?;

    match read_schema_version(&conn)? {
        Some(v) if v > CURRENT_SCHEMA_VERSION => {
            tracing::warn!(
                "数据库 schema_version={} 高于当前代码期望的 {}，请确认程序版本",
                v,
                CURRENT_SCHEMA_VERSION
            );
        }
        _ => {}
    }

    Ok(conn)
}

/// 在 IMMEDIATE 事务中执行写操作
///
/// BEGIN IMMEDIATE 在事务开始时即获取写锁，跨连接/进程串行化“先检查后写入”；
/// 闭包返回 Err 时事务随 drop 回滚，不会留下部分写入。
pub fn with_immediate_transaction<T, F>(conn: &Arc<Mutex<Connection>>, f: F) -> RepositoryResult<T>
where
    F: FnOnce(&Transaction<'_>) -> RepositoryResult<T>,
{
    let mut guard = conn
        .lock()
        .map_err(|e| RepositoryError::LockError(e.to_string()))?;
    let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();

        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_schema_rejects_inverted_range() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();

        conn.execute(
            "INSERT INTO quality_level (level_id, code, name, rigor, active, created_at, updated_at)
             VALUES ('L1', '2.5', '2.5', 'NORMAL', 1, '2026-01-01 00:00:00', '2026-01-01 00:00:00')",
            [],
        )
        .unwrap();

        let result = conn.execute(
            "INSERT INTO sampling_range (range_id, level_id, lot_min, lot_max, sample_size, ac, re, active, created_at, updated_at)
             VALUES ('R1', 'L1', 10, 5, 2, 0, 1, 1, '2026-01-01 00:00:00', '2026-01-01 00:00:00')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));

        let result: RepositoryResult<()> = with_immediate_transaction(&conn, |tx| {
            tx.execute(
                "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', 'k', 'v')",
                [],
            )?;
            Err(RepositoryError::ValidationError("abort".to_string()))
        });
        assert!(result.is_err());

        let n: i64 = conn
            .lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM config_kv", [], |row| row.get(0))
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_read_schema_version_without_table() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);
    }
}
