use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use uuid::Uuid;

const DEFAULT_TTL_SECS: u64 = 300;

struct Entry {
    cached_at: Instant,
    permissions: Arc<HashSet<String>>,
}

/// Per-user permission cache with a fixed TTL.
///
/// Explicitly constructed and injected (never module state) so tests can
/// reset it deterministically. Process-local: in a multi-instance
/// deployment, invalidation only reaches the instance that handled the
/// membership-changing write; other instances serve stale grants until
/// their own TTL expires. That staleness window is accepted and bounded by
/// the TTL, not a bug to fix here.
pub struct PermissionCache {
    ttl: Duration,
    entries: Mutex<HashMap<Uuid, Entry>>,
}

impl PermissionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// TTL from PERMISSION_CACHE_TTL_SECS, defaulting to five minutes.
    pub fn from_env() -> Self {
        let ttl_secs = std::env::var("PERMISSION_CACHE_TTL_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TTL_SECS);
        Self::new(Duration::from_secs(ttl_secs))
    }

    pub fn get(&self, user_id: &Uuid) -> Option<Arc<HashSet<String>>> {
        let entries = self.entries.lock().expect("permission cache poisoned");
        entries.get(user_id).and_then(|entry| {
            if entry.cached_at.elapsed() < self.ttl {
                Some(Arc::clone(&entry.permissions))
            } else {
                None
            }
        })
    }

    pub fn put(&self, user_id: Uuid, permissions: Arc<HashSet<String>>) {
        let mut entries = self.entries.lock().expect("permission cache poisoned");
        entries.insert(
            user_id,
            Entry {
                cached_at: Instant::now(),
                permissions,
            },
        );
    }

    pub fn remove(&self, user_id: &Uuid) {
        let mut entries = self.entries.lock().expect("permission cache poisoned");
        entries.remove(user_id);
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock().expect("permission cache poisoned");
        entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(values: &[&str]) -> Arc<HashSet<String>> {
        Arc::new(values.iter().map(|v| v.to_string()).collect())
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = PermissionCache::new(Duration::from_millis(0));
        let user = Uuid::new_v4();
        cache.put(user, keys(&["news.read"]));
        assert!(cache.get(&user).is_none());
    }

    #[test]
    fn entries_survive_within_ttl() {
        let cache = PermissionCache::new(Duration::from_secs(60));
        let user = Uuid::new_v4();
        cache.put(user, keys(&["news.read"]));
        assert!(cache.get(&user).is_some());
    }

    #[test]
    fn remove_and_clear_invalidate() {
        let cache = PermissionCache::new(Duration::from_secs(60));
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();
        cache.put(user, keys(&["news.read"]));
        cache.put(other, keys(&["event.read"]));

        cache.remove(&user);
        assert!(cache.get(&user).is_none());
        assert!(cache.get(&other).is_some());

        cache.clear();
        assert!(cache.get(&other).is_none());
    }
}
