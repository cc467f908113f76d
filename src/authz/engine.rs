use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::cache::PermissionCache;
use crate::errors::{AppError, AppResult};
use crate::utils::utc_now;

/// Source of a user's raw grant set. The database-backed source is the only
/// production implementation; tests substitute fixed maps.
#[async_trait]
pub trait PermissionSource: Send + Sync {
    async fn permissions_for(&self, user_id: Uuid) -> AppResult<HashSet<String>>;
}

pub struct DbPermissionSource {
    pool: SqlitePool,
}

impl DbPermissionSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PermissionSource for DbPermissionSource {
    /// Grants come only from the user's active, unexpired membership's role.
    /// No active membership is an empty set, not an error; a database
    /// failure propagates.
    async fn permissions_for(&self, user_id: Uuid) -> AppResult<HashSet<String>> {
        let keys: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT p.key
            FROM permissions p
            INNER JOIN role_permissions rp ON rp.permission_id = p.id
            INNER JOIN user_memberships um ON um.role_id = rp.role_id
            WHERE um.user_id = ?
              AND um.is_active = 1
              AND (um.expires_at IS NULL OR um.expires_at > ?)
            "#,
        )
        .bind(user_id.to_string())
        .bind(utc_now())
        .fetch_all(&self.pool)
        .await?;

        Ok(keys.into_iter().collect())
    }
}

/// Does `keys` grant `key`? True for the global `*`, the key verbatim, or
/// an ancestor wildcard. For `a.b.c`: `a.b.*`, then `a.*`, most-specific
/// first, short-circuiting. Explicit prefix-splitting on purpose; no
/// pattern library.
pub fn grants(keys: &HashSet<String>, key: &str) -> bool {
    if keys.contains("*") || keys.contains(key) {
        return true;
    }

    let mut prefix = key;
    while let Some(idx) = prefix.rfind('.') {
        prefix = &prefix[..idx];
        if keys.contains(&format!("{prefix}.*")) {
            return true;
        }
    }

    false
}

#[derive(Clone)]
pub struct PermissionEngine {
    source: Arc<dyn PermissionSource>,
    cache: Arc<PermissionCache>,
}

impl PermissionEngine {
    pub fn new(pool: SqlitePool, cache: PermissionCache) -> Self {
        Self::with_source(Arc::new(DbPermissionSource::new(pool)), cache)
    }

    pub fn with_source(source: Arc<dyn PermissionSource>, cache: PermissionCache) -> Self {
        Self {
            source,
            cache: Arc::new(cache),
        }
    }

    /// The user's effective permission set, cached for the cache TTL.
    pub async fn get_user_permissions(&self, user_id: Uuid) -> AppResult<Arc<HashSet<String>>> {
        if let Some(cached) = self.cache.get(&user_id) {
            return Ok(cached);
        }

        let permissions = Arc::new(self.source.permissions_for(user_id).await?);
        self.cache.put(user_id, Arc::clone(&permissions));

        tracing::debug!(
            user_id = %user_id,
            count = permissions.len(),
            "resolved permission set"
        );

        Ok(permissions)
    }

    pub async fn has_permission(&self, user_id: Uuid, key: &str) -> AppResult<bool> {
        let permissions = self.get_user_permissions(user_id).await?;
        Ok(grants(&permissions, key))
    }

    pub async fn has_any_permission(&self, user_id: Uuid, keys: &[&str]) -> AppResult<bool> {
        let permissions = self.get_user_permissions(user_id).await?;
        Ok(keys.iter().any(|key| grants(&permissions, key)))
    }

    pub async fn has_all_permissions(&self, user_id: Uuid, keys: &[&str]) -> AppResult<bool> {
        let permissions = self.get_user_permissions(user_id).await?;
        Ok(keys.iter().all(|key| grants(&permissions, key)))
    }

    /// Guard for mutating handlers. The `AuthUser` extractor has already
    /// rejected missing identity with 401; this rejects an authenticated
    /// caller without the key as 403.
    pub async fn require(&self, user_id: Uuid, key: &str) -> AppResult<()> {
        if self.has_permission(user_id, key).await? {
            Ok(())
        } else {
            tracing::debug!(user_id = %user_id, permission = %key, "permission denied");
            Err(AppError::forbidden(format!("missing permission '{key}'")))
        }
    }

    pub async fn require_any(&self, user_id: Uuid, keys: &[&str]) -> AppResult<()> {
        if self.has_any_permission(user_id, keys).await? {
            Ok(())
        } else {
            tracing::debug!(user_id = %user_id, permissions = ?keys, "permission denied");
            Err(AppError::forbidden(format!(
                "missing any of permissions {keys:?}"
            )))
        }
    }

    pub async fn require_all(&self, user_id: Uuid, keys: &[&str]) -> AppResult<()> {
        if self.has_all_permissions(user_id, keys).await? {
            Ok(())
        } else {
            Err(AppError::forbidden(format!(
                "missing one of permissions {keys:?}"
            )))
        }
    }

    /// Must be called by every code path that mutates a user's membership or
    /// a role's permission set. Only affects this process; see
    /// `PermissionCache` on cross-instance staleness.
    pub fn clear_user(&self, user_id: Uuid) {
        self.cache.remove(&user_id);
    }

    pub fn clear_all(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    struct FixedSource {
        grants: HashMap<Uuid, HashSet<String>>,
    }

    #[async_trait]
    impl PermissionSource for FixedSource {
        async fn permissions_for(&self, user_id: Uuid) -> AppResult<HashSet<String>> {
            Ok(self.grants.get(&user_id).cloned().unwrap_or_default())
        }
    }

    fn engine_with(user: Uuid, keys: &[&str]) -> PermissionEngine {
        let mut grants = HashMap::new();
        grants.insert(user, keys.iter().map(|k| k.to_string()).collect());
        PermissionEngine::with_source(
            Arc::new(FixedSource { grants }),
            PermissionCache::new(Duration::from_secs(60)),
        )
    }

    fn set(keys: &[&str]) -> HashSet<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn exact_key_grants() {
        assert!(grants(&set(&["event.read"]), "event.read"));
        assert!(!grants(&set(&["event.read"]), "event.update"));
    }

    #[test]
    fn ancestor_wildcards_grant_most_specific_first() {
        assert!(grants(&set(&["event.*"]), "event.read"));
        assert!(grants(&set(&["a.*"]), "a.b.c"));
        assert!(grants(&set(&["a.b.*"]), "a.b.c"));
        assert!(!grants(&set(&["a.b.*"]), "a.c"));
    }

    #[test]
    fn global_wildcard_grants_everything() {
        assert!(grants(&set(&["*"]), "anything.at.all"));
    }

    #[test]
    fn no_match_denies() {
        assert!(!grants(&set(&[]), "event.read"));
        assert!(!grants(&set(&["news.*"]), "event.read"));
    }

    #[tokio::test]
    async fn empty_grant_set_for_unknown_user() {
        let engine = engine_with(Uuid::new_v4(), &["event.read"]);
        let other = Uuid::new_v4();
        let permissions = engine.get_user_permissions(other).await.unwrap();
        assert!(permissions.is_empty());
        assert!(!engine.has_permission(other, "event.read").await.unwrap());
    }

    #[tokio::test]
    async fn any_and_all_combinators() {
        let user = Uuid::new_v4();
        let engine = engine_with(user, &["news.read", "event.*"]);

        assert!(engine
            .has_any_permission(user, &["resource.delete", "event.update"])
            .await
            .unwrap());
        assert!(engine
            .has_all_permissions(user, &["news.read", "event.update"])
            .await
            .unwrap());
        assert!(!engine
            .has_all_permissions(user, &["news.read", "resource.delete"])
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn require_distinguishes_denial() {
        let user = Uuid::new_v4();
        let engine = engine_with(user, &["event.read"]);

        engine.require(user, "event.read").await.unwrap();
        let err = engine.require(user, "event.update").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
