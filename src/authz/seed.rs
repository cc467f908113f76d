//! Static ACL catalog and its idempotent loader.
//!
//! Every entity upserts by natural key (tier code, role code, permission
//! key) and each role's permission mapping is fully replaced on every run,
//! so re-seeding after adding permissions never duplicates or strands
//! mappings. Wildcard patterns expand against the complete permission
//! catalog as it exists in the database at seed time.

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::AppResult;
use crate::utils::utc_now;

pub struct TierSpec {
    pub code: &'static str,
    pub name_ko: &'static str,
    pub name_en: &'static str,
    pub annual_fee: f64,
    pub benefits: &'static [&'static str],
    pub sort_order: i64,
}

pub const TIERS: &[TierSpec] = &[
    TierSpec {
        code: "associate",
        name_ko: "준회원",
        name_en: "Associate",
        annual_fee: 0.0,
        benefits: &["newsletter"],
        sort_order: 1,
    },
    TierSpec {
        code: "corporate",
        name_ko: "정회원",
        name_en: "Corporate",
        annual_fee: 500_000.0,
        benefits: &["newsletter", "member-directory", "event-discount"],
        sort_order: 2,
    },
    TierSpec {
        code: "premium",
        name_ko: "특별회원",
        name_en: "Premium",
        annual_fee: 2_000_000.0,
        benefits: &["newsletter", "member-directory", "event-discount", "premium-content", "sponsor-listing"],
        sort_order: 3,
    },
];

pub const ROLES: &[(&str, &str, &str)] = &[
    ("guest", "Guest", "Unverified account, public content only"),
    ("member", "Member", "Verified member, reads member content"),
    ("editor", "Editor", "Writes news and resources, drafts events"),
    ("operator", "Operator", "Runs content and member operations"),
    ("admin", "Administrator", "Full access"),
];

pub const PERMISSIONS: &[(&str, &str)] = &[
    ("news.read", "Read member-gated news"),
    ("news.create", "Create news posts"),
    ("news.update", "Update news posts and translations"),
    ("news.delete", "Delete news posts"),
    ("news.manage", "Full news administration"),
    ("event.read", "Read member-gated events"),
    ("event.create", "Create event posts"),
    ("event.update", "Update event posts and translations"),
    ("event.delete", "Delete event posts"),
    ("event.manage", "Full event administration incl. rosters"),
    ("resource.read", "Read member-gated resources"),
    ("resource.create", "Create resource posts"),
    ("resource.update", "Update resource posts and translations"),
    ("resource.delete", "Delete resource posts"),
    ("resource.manage", "Full resource administration"),
    ("member.read", "Read the member directory"),
    ("member.manage", "Manage member companies"),
    ("inquiry.read", "Read inquiries"),
    ("inquiry.manage", "Manage inquiries"),
    ("acl.manage", "Manage roles, tiers and memberships"),
    ("*", "Full access"),
];

/// Role -> permission patterns. `resource.*` style prefixes expand against
/// the catalog; `*` passes through as the literal global grant.
pub const ROLE_PATTERNS: &[(&str, &[&str])] = &[
    ("guest", &[]),
    ("member", &["news.read", "event.read", "resource.read"]),
    (
        "editor",
        &["news.*", "resource.*", "event.read", "event.create", "event.update"],
    ),
    (
        "operator",
        &["news.*", "event.*", "resource.*", "member.read", "inquiry.*"],
    ),
    ("admin", &["*"]),
];

/// Expand patterns against the full permission catalog. Prefix patterns
/// pick up keys added after the pattern was written; unknown exact keys are
/// skipped with a warning rather than failing the seed.
pub fn expand_patterns(patterns: &[&str], catalog: &[String]) -> Vec<String> {
    let mut expanded = Vec::new();

    for pattern in patterns {
        if *pattern == "*" {
            expanded.push("*".to_string());
        } else if let Some(prefix) = pattern.strip_suffix(".*") {
            let dotted = format!("{prefix}.");
            for key in catalog {
                if key.starts_with(&dotted) {
                    expanded.push(key.clone());
                }
            }
        } else if catalog.iter().any(|key| key == pattern) {
            expanded.push(pattern.to_string());
        } else {
            tracing::warn!(pattern = %pattern, "role pattern references unknown permission, skipped");
        }
    }

    expanded.sort();
    expanded.dedup();
    expanded
}

/// Idempotent seed: safe to run at every startup and from the seed binary.
pub async fn seed(pool: &SqlitePool) -> AppResult<()> {
    let now = utc_now();
    let mut tx = pool.begin().await?;

    for tier in TIERS {
        let benefits = serde_json::to_string(tier.benefits)
            .map_err(|err| crate::errors::AppError::internal(err.to_string()))?;
        sqlx::query(
            "INSERT INTO tiers (id, code, name_ko, name_en, annual_fee, benefits, sort_order, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (code) DO UPDATE SET \
               name_ko = excluded.name_ko, name_en = excluded.name_en, \
               annual_fee = excluded.annual_fee, benefits = excluded.benefits, \
               sort_order = excluded.sort_order, updated_at = excluded.updated_at",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(tier.code)
        .bind(tier.name_ko)
        .bind(tier.name_en)
        .bind(tier.annual_fee)
        .bind(&benefits)
        .bind(tier.sort_order)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    for (code, name, description) in ROLES {
        sqlx::query(
            "INSERT INTO roles (id, code, name, description, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT (code) DO UPDATE SET \
               name = excluded.name, description = excluded.description, \
               updated_at = excluded.updated_at",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(code)
        .bind(name)
        .bind(description)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    for (key, description) in PERMISSIONS {
        sqlx::query(
            "INSERT INTO permissions (id, key, description, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (key) DO UPDATE SET \
               description = excluded.description, updated_at = excluded.updated_at",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(key)
        .bind(description)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    // Expansion reads the catalog as persisted, so patterns pick up keys
    // that were added to PERMISSIONS after the pattern was written.
    let catalog: Vec<String> = sqlx::query_scalar("SELECT key FROM permissions")
        .fetch_all(&mut *tx)
        .await?;

    for (role_code, patterns) in ROLE_PATTERNS {
        let role_id: String = sqlx::query_scalar("SELECT id FROM roles WHERE code = ?")
            .bind(role_code)
            .fetch_one(&mut *tx)
            .await?;

        // Full replacement keeps re-runs free of stale mappings.
        sqlx::query("DELETE FROM role_permissions WHERE role_id = ?")
            .bind(&role_id)
            .execute(&mut *tx)
            .await?;

        for key in expand_patterns(patterns, &catalog) {
            sqlx::query(
                "INSERT INTO role_permissions (role_id, permission_id, created_at) \
                 SELECT ?, id, ? FROM permissions WHERE key = ?",
            )
            .bind(&role_id)
            .bind(now)
            .bind(&key)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;
    tracing::info!("ACL catalog seeded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<String> {
        PERMISSIONS.iter().map(|(key, _)| key.to_string()).collect()
    }

    #[test]
    fn prefix_pattern_expands_to_all_current_keys() {
        let expanded = expand_patterns(&["event.*"], &catalog());
        assert!(expanded.contains(&"event.read".to_string()));
        assert!(expanded.contains(&"event.manage".to_string()));
        assert_eq!(expanded.len(), 5);
    }

    #[test]
    fn prefix_pattern_picks_up_later_additions() {
        let mut extended = catalog();
        extended.push("event.archive".to_string());
        let expanded = expand_patterns(&["event.*"], &extended);
        assert!(expanded.contains(&"event.archive".to_string()));
    }

    #[test]
    fn global_wildcard_passes_through_literally() {
        assert_eq!(expand_patterns(&["*"], &catalog()), vec!["*".to_string()]);
    }

    #[test]
    fn unknown_exact_keys_are_skipped() {
        let expanded = expand_patterns(&["event.read", "bogus.key"], &catalog());
        assert_eq!(expanded, vec!["event.read".to_string()]);
    }

    #[test]
    fn duplicate_expansion_is_deduped() {
        let expanded = expand_patterns(&["event.*", "event.read"], &catalog());
        assert_eq!(expanded.iter().filter(|k| *k == "event.read").count(), 1);
    }
}
