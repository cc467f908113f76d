use sqlx::sqlite::SqliteConnection;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::membership::{
    DbUserMembership, MembershipUpdateRequest, MembershipView, UserMembership,
};
use crate::utils::utc_now;

const MEMBERSHIP_COLUMNS: &str = "id, user_id, tier_id, role_id, is_active, started_at, \
     expires_at, created_at, updated_at";

#[derive(FromRow)]
struct DbMembershipViewRow {
    #[sqlx(flatten)]
    membership: DbUserMembership,
    tier_code: String,
    role_code: String,
}

/// The user's currently active, unexpired membership with tier/role codes
/// resolved. `None` when the user has no active membership.
pub async fn active_membership(pool: &SqlitePool, user_id: Uuid) -> AppResult<Option<MembershipView>> {
    let row = sqlx::query_as::<_, DbMembershipViewRow>(
        "SELECT m.id, m.user_id, m.tier_id, m.role_id, m.is_active, m.started_at, m.expires_at, \
         m.created_at, m.updated_at, t.code AS tier_code, r.code AS role_code \
         FROM user_memberships m \
         INNER JOIN tiers t ON t.id = m.tier_id \
         INNER JOIN roles r ON r.id = m.role_id \
         WHERE m.user_id = ? AND m.is_active = 1 \
           AND (m.expires_at IS NULL OR m.expires_at > ?) \
         ORDER BY m.started_at DESC LIMIT 1",
    )
    .bind(user_id.to_string())
    .bind(utc_now())
    .fetch_optional(pool)
    .await?;

    row.map(|row| {
        Ok(MembershipView {
            membership: row.membership.try_into()?,
            tier_code: row.tier_code,
            role_code: row.role_code,
        })
    })
    .transpose()
}

/// Create the inferred membership for a freshly registered user, inside the
/// caller's transaction so user + membership land atomically.
pub(crate) async fn create_membership_on(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    tier_code: &str,
    role_code: &str,
) -> AppResult<UserMembership> {
    let now = utc_now();
    let id = Uuid::new_v4();

    let tier_id: Option<String> = sqlx::query_scalar("SELECT id FROM tiers WHERE code = ?")
        .bind(tier_code)
        .fetch_optional(&mut *conn)
        .await?;
    let tier_id = tier_id
        .ok_or_else(|| AppError::configuration(format!("tier '{tier_code}' is not seeded")))?;

    let role_id: Option<String> = sqlx::query_scalar("SELECT id FROM roles WHERE code = ?")
        .bind(role_code)
        .fetch_optional(&mut *conn)
        .await?;
    let role_id = role_id
        .ok_or_else(|| AppError::configuration(format!("role '{role_code}' is not seeded")))?;

    sqlx::query(
        "INSERT INTO user_memberships (id, user_id, tier_id, role_id, is_active, started_at, \
         expires_at, created_at, updated_at) VALUES (?, ?, ?, ?, 1, ?, NULL, ?, ?)",
    )
    .bind(id.to_string())
    .bind(user_id.to_string())
    .bind(&tier_id)
    .bind(&role_id)
    .bind(now)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let row = sqlx::query_as::<_, DbUserMembership>(&format!(
        "SELECT {MEMBERSHIP_COLUMNS} FROM user_memberships WHERE id = ?"
    ))
    .bind(id.to_string())
    .fetch_one(&mut *conn)
    .await?;

    row.try_into()
}

/// Admin edit of a user's membership. Updates the latest membership row in
/// place (or creates one when the user has none). Callers must clear the
/// user's permission cache afterwards.
pub async fn set_membership(
    pool: &SqlitePool,
    user_id: Uuid,
    request: &MembershipUpdateRequest,
) -> AppResult<MembershipView> {
    ensure_user_exists(pool, user_id).await?;

    let existing_id: Option<String> = sqlx::query_scalar(
        "SELECT id FROM user_memberships WHERE user_id = ? ORDER BY started_at DESC LIMIT 1",
    )
    .bind(user_id.to_string())
    .fetch_optional(pool)
    .await?;

    let now = utc_now();

    let membership_id = match existing_id {
        Some(id) => id,
        None => {
            let mut conn = pool.acquire().await?;
            let tier = request.tier_code.as_deref().unwrap_or(crate::authz::tiers::ASSOCIATE);
            let role = request.role_code.as_deref().unwrap_or(crate::authz::roles::MEMBER);
            let membership = create_membership_on(&mut *conn, user_id, tier, role).await?;
            membership.id.to_string()
        }
    };

    if let Some(tier_code) = &request.tier_code {
        let tier_id: Option<String> = sqlx::query_scalar("SELECT id FROM tiers WHERE code = ?")
            .bind(tier_code)
            .fetch_optional(pool)
            .await?;
        let tier_id =
            tier_id.ok_or_else(|| AppError::not_found(format!("unknown tier '{tier_code}'")))?;
        sqlx::query("UPDATE user_memberships SET tier_id = ?, updated_at = ? WHERE id = ?")
            .bind(&tier_id)
            .bind(now)
            .bind(&membership_id)
            .execute(pool)
            .await?;
    }

    if let Some(role_code) = &request.role_code {
        let role_id: Option<String> = sqlx::query_scalar("SELECT id FROM roles WHERE code = ?")
            .bind(role_code)
            .fetch_optional(pool)
            .await?;
        let role_id =
            role_id.ok_or_else(|| AppError::not_found(format!("unknown role '{role_code}'")))?;
        sqlx::query("UPDATE user_memberships SET role_id = ?, updated_at = ? WHERE id = ?")
            .bind(&role_id)
            .bind(now)
            .bind(&membership_id)
            .execute(pool)
            .await?;
    }

    if let Some(is_active) = request.is_active {
        sqlx::query("UPDATE user_memberships SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(is_active)
            .bind(now)
            .bind(&membership_id)
            .execute(pool)
            .await?;
    }

    if request.expires_at.is_some() {
        sqlx::query("UPDATE user_memberships SET expires_at = ?, updated_at = ? WHERE id = ?")
            .bind(request.expires_at)
            .bind(now)
            .bind(&membership_id)
            .execute(pool)
            .await?;
    }

    membership_view(pool, &membership_id).await
}

async fn membership_view(pool: &SqlitePool, membership_id: &str) -> AppResult<MembershipView> {
    let row = sqlx::query_as::<_, DbMembershipViewRow>(
        "SELECT m.id, m.user_id, m.tier_id, m.role_id, m.is_active, m.started_at, m.expires_at, \
         m.created_at, m.updated_at, t.code AS tier_code, r.code AS role_code \
         FROM user_memberships m \
         INNER JOIN tiers t ON t.id = m.tier_id \
         INNER JOIN roles r ON r.id = m.role_id \
         WHERE m.id = ?",
    )
    .bind(membership_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("membership not found"))?;

    Ok(MembershipView {
        membership: row.membership.try_into()?,
        tier_code: row.tier_code,
        role_code: row.role_code,
    })
}

async fn ensure_user_exists(pool: &SqlitePool, user_id: Uuid) -> AppResult<()> {
    let exists: Option<String> =
        sqlx::query_scalar("SELECT id FROM users WHERE id = ? AND deleted_at IS NULL")
            .bind(user_id.to_string())
            .fetch_optional(pool)
            .await?;

    exists
        .map(|_| ())
        .ok_or_else(|| AppError::not_found("user not found"))
}
