// ==========================================
// 抽样方案引擎 - 审计日志数据仓储
// ==========================================
// 红线: 所有写入必须记录
// 说明: AuditSink 是审计协作方的接入点；默认实现写 audit_log 表
// ==========================================

use crate::domain::audit_log::{AuditAction, AuditEntity, AuditLog, FieldChange};
use crate::domain::types::{parse_ts, TIMESTAMP_FORMAT};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex, MutexGuard};

// ==========================================
// AuditSink - 审计协作方接口
// ==========================================
pub trait AuditSink: Send + Sync {
    fn record(&self, log: &AuditLog) -> RepositoryResult<()>;
}

/// 不记录任何内容（审计关闭时使用）
pub struct NoOpAuditSink;

impl AuditSink for NoOpAuditSink {
    fn record(&self, _log: &AuditLog) -> RepositoryResult<()> {
        Ok(())
    }
}

// ==========================================
// AuditLogRepository - 审计日志仓储
// ==========================================
pub struct AuditLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AuditLogRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入审计日志
    ///
    /// # 返回
    /// - `Ok(audit_id)`: 成功插入
    pub fn insert(&self, log: &AuditLog) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        let changes_json = serde_json::to_string(&log.changes)
            .map_err(|e| RepositoryError::InternalError(format!("审计差异序列化失败: {}", e)))?;

        conn.execute(
            r#"
            INSERT INTO audit_log (
                audit_id, entity_type, entity_id, action_type, action_ts, actor,
                before_json, after_json, changes_json, detail
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                log.audit_id,
                log.entity_type.to_db_str(),
                log.entity_id,
                log.action_type.to_db_str(),
                log.action_ts.format(TIMESTAMP_FORMAT).to_string(),
                log.actor,
                log.before_json.as_ref().map(|v| v.to_string()),
                log.after_json.as_ref().map(|v| v.to_string()),
                changes_json,
                log.detail,
            ],
        )?;

        Ok(log.audit_id.clone())
    }

    /// 查询某实体的审计记录（按时间升序）
    pub fn find_by_entity(&self, entity_type: AuditEntity, entity_id: &str) -> RepositoryResult<Vec<AuditLog>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT audit_id, entity_type, entity_id, action_type, action_ts, actor,
                   before_json, after_json, changes_json, detail
            FROM audit_log
            WHERE entity_type = ?1 AND entity_id = ?2
            ORDER BY action_ts ASC, rowid ASC
            "#,
        )?;
        let logs = stmt
            .query_map(params![entity_type.to_db_str(), entity_id], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(logs)
    }

    /// 最近 N 条审计记录（按时间倒序）
    pub fn list_recent(&self, limit: usize) -> RepositoryResult<Vec<AuditLog>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT audit_id, entity_type, entity_id, action_type, action_ts, actor,
                   before_json, after_json, changes_json, detail
            FROM audit_log
            ORDER BY action_ts DESC, rowid DESC
            LIMIT ?1
            "#,
        )?;
        let logs = stmt
            .query_map(params![limit as i64], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(logs)
    }
}

impl AuditSink for AuditLogRepository {
    fn record(&self, log: &AuditLog) -> RepositoryResult<()> {
        self.insert(log).map(|_| ())
    }
}

fn map_row(row: &Row<'_>) -> SqliteResult<AuditLog> {
    let parse_json = |s: Option<String>| s.and_then(|v| serde_json::from_str(&v).ok());
    let changes: Vec<FieldChange> = row
        .get::<_, Option<String>>(8)?
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();

    Ok(AuditLog {
        audit_id: row.get(0)?,
        entity_type: AuditEntity::parse(&row.get::<_, String>(1)?).unwrap_or(AuditEntity::QualityLevel),
        entity_id: row.get(2)?,
        action_type: AuditAction::parse(&row.get::<_, String>(3)?).unwrap_or(AuditAction::Update),
        action_ts: parse_ts(&row.get::<_, String>(4)?),
        actor: row.get(5)?,
        before_json: parse_json(row.get(6)?),
        after_json: parse_json(row.get(7)?),
        changes,
        detail: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::now_ts;
    use serde_json::json;

    fn setup() -> AuditLogRepository {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        AuditLogRepository::new(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_insert_and_find_by_entity() {
        let repo = setup();
        let log = AuditLog::from_snapshots(
            AuditEntity::SamplingRange,
            "R1",
            AuditAction::Update,
            "inspector",
            Some(json!({"lot_max": 8})),
            Some(json!({"lot_max": 10})),
            now_ts(),
        )
        .with_detail("ajuste de faixa");

        repo.record(&log).unwrap();

        let found = repo.find_by_entity(AuditEntity::SamplingRange, "R1").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].action_type, AuditAction::Update);
        assert_eq!(found[0].changes.len(), 1);
        assert_eq!(found[0].changes[0].field, "lot_max");
        assert_eq!(found[0].detail.as_deref(), Some("ajuste de faixa"));

        assert!(repo.find_by_entity(AuditEntity::QualityLevel, "R1").unwrap().is_empty());
        assert_eq!(repo.list_recent(10).unwrap().len(), 1);
    }
}
