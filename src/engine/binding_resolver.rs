// ==========================================
// 抽样方案引擎 - 分组绑定解析
// ==========================================
// 职责: 分类分组 → NQA 的绑定、解绑、解析
// 约束: 一个分组至多一个绑定；不做隐式替换，必须先解绑
// ==========================================

use crate::db::with_immediate_transaction;
use crate::directory::GroupDirectory;
use crate::domain::group_binding::{BindingResolution, GroupBinding};
use crate::domain::types::now_ts;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::{GroupBindingRepository, QualityLevelRepository};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};

/// 绑定备注最大长度
const MAX_BINDING_NOTES_LEN: usize = 500;

pub struct GroupBindingResolver {
    conn: Arc<Mutex<Connection>>,
    binding_repo: Arc<GroupBindingRepository>,
    directory: Arc<dyn GroupDirectory>,
}

impl GroupBindingResolver {
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        binding_repo: Arc<GroupBindingRepository>,
        directory: Arc<dyn GroupDirectory>,
    ) -> Self {
        Self {
            conn,
            binding_repo,
            directory,
        }
    }

    /// 绑定分组到 NQA
    ///
    /// # 错误
    /// - NotFound: 分组不在目录中，或 NQA 不存在
    /// - AlreadyBound: 分组已有绑定（返回现有 level_id）
    #[instrument(skip(self, notes))]
    pub fn bind(&self, group_id: i64, level_id: &str, notes: Option<String>) -> RepositoryResult<GroupBinding> {
        let notes = notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        if matches!(notes, Some(ref n) if n.chars().count() > MAX_BINDING_NOTES_LEN) {
            return Err(RepositoryError::field(
                "notes",
                format!("备注长度不能超过 {} 个字符", MAX_BINDING_NOTES_LEN),
            ));
        }

        // 目录与业务表可能共用连接，必须在事务外检查
        if !self.directory.exists(group_id)? {
            return Err(RepositoryError::not_found("ProductGroup", group_id));
        }

        let binding = with_immediate_transaction(&self.conn, |tx| {
            if QualityLevelRepository::find_by_id_tx(tx, level_id)?.is_none() {
                return Err(RepositoryError::not_found("QualityLevel", level_id));
            }
            if let Some(existing) = GroupBindingRepository::find_by_group_tx(tx, group_id)? {
                warn!(group_id, bound_to = %existing.level_id, "分组已绑定，拒绝重复绑定");
                return Err(RepositoryError::AlreadyBound {
                    group_id,
                    level_id: existing.level_id,
                });
            }

            let binding = GroupBinding {
                group_id,
                level_id: level_id.to_string(),
                notes,
                created_at: now_ts(),
            };
            GroupBindingRepository::insert_tx(tx, &binding)?;
            Ok(binding)
        })?;

        info!(group_id, level_id = %level_id, "分组已绑定");
        Ok(binding)
    }

    /// 解除分组绑定
    ///
    /// # 错误
    /// - NotFound: 分组没有绑定
    #[instrument(skip(self))]
    pub fn unbind(&self, group_id: i64) -> RepositoryResult<GroupBinding> {
        let removed = with_immediate_transaction(&self.conn, |tx| {
            let existing = GroupBindingRepository::find_by_group_tx(tx, group_id)?
                .ok_or_else(|| RepositoryError::not_found("GroupBinding", group_id))?;
            GroupBindingRepository::delete_tx(tx, group_id)?;
            Ok(existing)
        })?;

        info!(group_id, level_id = %removed.level_id, "分组已解绑");
        Ok(removed)
    }

    /// 解析分组的 NQA；未绑定是正常结果
    #[instrument(skip(self))]
    pub fn resolve(&self, group_id: i64) -> RepositoryResult<BindingResolution> {
        let resolution = match self.binding_repo.find_by_group(group_id)? {
            Some(b) => BindingResolution::Bound { level_id: b.level_id },
            None => BindingResolution::Unbound { group_id },
        };
        debug!(?resolution, "分组解析完成");
        Ok(resolution)
    }

    pub fn list_all(&self) -> RepositoryResult<Vec<GroupBinding>> {
        self.binding_repo.list_all()
    }

    pub fn get_by_group(&self, group_id: i64) -> RepositoryResult<Option<GroupBinding>> {
        self.binding_repo.find_by_group(group_id)
    }

    pub fn list_by_level(&self, level_id: &str) -> RepositoryResult<Vec<GroupBinding>> {
        self.binding_repo.list_by_level(level_id)
    }

    /// 目录中尚未绑定的分组（升序）
    pub fn list_unbound_groups(&self) -> RepositoryResult<Vec<i64>> {
        let all = self.directory.list_group_ids()?;
        let bound = self.binding_repo.bound_group_ids()?;
        Ok(all.into_iter().filter(|id| !bound.contains(id)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::quality_level::{QualityLevel, QualityLevelDraft};
    use std::collections::BTreeSet;

    struct FixedDirectory(BTreeSet<i64>);

    impl GroupDirectory for FixedDirectory {
        fn exists(&self, group_id: i64) -> RepositoryResult<bool> {
            Ok(self.0.contains(&group_id))
        }

        fn list_group_ids(&self) -> RepositoryResult<Vec<i64>> {
            Ok(self.0.iter().copied().collect())
        }
    }

    fn setup() -> (GroupBindingResolver, Arc<Mutex<Connection>>) {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let directory = Arc::new(FixedDirectory([7, 42, 43].into_iter().collect()));
        let resolver = GroupBindingResolver::new(
            conn.clone(),
            Arc::new(GroupBindingRepository::new(conn.clone())),
            directory,
        );
        (resolver, conn)
    }

    fn insert_level(conn: &Arc<Mutex<Connection>>, code: &str) -> String {
        let level = QualityLevel::new(
            QualityLevelDraft {
                code: code.to_string(),
                name: code.to_string(),
                rigor: Default::default(),
                active: true,
            }
            .validate()
            .unwrap(),
            now_ts(),
        );
        QualityLevelRepository::insert_tx(&conn.lock().unwrap(), &level).unwrap();
        level.level_id
    }

    #[test]
    fn test_bind_then_rebind_requires_unbind() {
        let (resolver, conn) = setup();
        let a = insert_level(&conn, "2.5");
        let b = insert_level(&conn, "4.0");

        resolver.bind(42, &a, Some("  ".to_string())).unwrap();
        assert_eq!(resolver.resolve(42).unwrap().level_id(), Some(a.as_str()));

        match resolver.bind(42, &b, None).unwrap_err() {
            RepositoryError::AlreadyBound { group_id, level_id } => {
                assert_eq!(group_id, 42);
                assert_eq!(level_id, a);
            }
            other => panic!("expected AlreadyBound, got {:?}", other),
        }

        resolver.unbind(42).unwrap();
        assert_eq!(resolver.resolve(42).unwrap(), BindingResolution::Unbound { group_id: 42 });
        resolver.bind(42, &b, None).unwrap();
        assert_eq!(resolver.get_by_group(42).unwrap().unwrap().level_id, b);
    }

    #[test]
    fn test_bind_checks_group_and_level() {
        let (resolver, conn) = setup();
        let a = insert_level(&conn, "2.5");

        assert!(matches!(
            resolver.bind(999, &a, None),
            Err(RepositoryError::NotFound { ref entity, .. }) if entity == "ProductGroup"
        ));
        assert!(matches!(
            resolver.bind(42, "no-such-level", None),
            Err(RepositoryError::NotFound { ref entity, .. }) if entity == "QualityLevel"
        ));
        assert!(resolver.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_unbind_missing_is_not_found() {
        let (resolver, _conn) = setup();
        assert!(matches!(resolver.unbind(42), Err(RepositoryError::NotFound { .. })));
    }

    #[test]
    fn test_list_unbound_groups() {
        let (resolver, conn) = setup();
        let a = insert_level(&conn, "2.5");
        resolver.bind(42, &a, None).unwrap();

        assert_eq!(resolver.list_unbound_groups().unwrap(), vec![7, 43]);
        assert_eq!(resolver.list_by_level(&a).unwrap().len(), 1);
    }
}
