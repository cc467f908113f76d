//! ACL admin surface: catalog listings, membership edits, re-seeding.
//! Every membership-affecting mutation clears the permission cache for the
//! touched user on this instance.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{keys, seed};
use crate::errors::AppResult;
use crate::events::log_activity;
use crate::jwt::AuthUser;
use crate::models::membership::{
    DbPermission, DbRole, EffectivePermissionsResponse, MembershipUpdateRequest, MembershipView,
    Permission, Role,
};
use crate::store::memberships;

#[utoipa::path(
    get,
    path = "/api/acl/roles",
    tag = "ACL",
    responses((status = 200, description = "Role catalog", body = [Role])),
    security(("bearerAuth" = []))
)]
pub async fn list_roles(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<Role>>> {
    state.authz.require(auth.user_id, keys::ACL_MANAGE).await?;

    let rows = sqlx::query_as::<_, DbRole>(
        "SELECT id, code, name, description, created_at, updated_at FROM roles ORDER BY code",
    )
    .fetch_all(&state.pool)
    .await?;

    let roles = rows
        .into_iter()
        .map(Role::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(roles))
}

#[utoipa::path(
    get,
    path = "/api/acl/permissions",
    tag = "ACL",
    responses((status = 200, description = "Permission catalog", body = [Permission])),
    security(("bearerAuth" = []))
)]
pub async fn list_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<Permission>>> {
    state.authz.require(auth.user_id, keys::ACL_MANAGE).await?;

    let rows = sqlx::query_as::<_, DbPermission>(
        "SELECT id, key, description, created_at, updated_at FROM permissions ORDER BY key",
    )
    .fetch_all(&state.pool)
    .await?;

    let permissions = rows
        .into_iter()
        .map(Permission::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(permissions))
}

#[utoipa::path(
    get,
    path = "/api/acl/users/{user_id}/permissions",
    tag = "ACL",
    params(("user_id" = Uuid, Path, description = "User id")),
    responses((status = 200, description = "Effective permission set", body = EffectivePermissionsResponse)),
    security(("bearerAuth" = []))
)]
pub async fn effective_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<EffectivePermissionsResponse>> {
    state.authz.require(auth.user_id, keys::ACL_MANAGE).await?;

    let membership = memberships::active_membership(&state.pool, user_id).await?;
    let grants = state.authz.get_user_permissions(user_id).await?;

    let mut permissions: Vec<String> = grants.iter().cloned().collect();
    permissions.sort();

    Ok(Json(EffectivePermissionsResponse {
        user_id,
        role: membership.map(|m| m.role_code),
        permissions,
    }))
}

#[utoipa::path(
    put,
    path = "/api/acl/users/{user_id}/membership",
    tag = "ACL",
    params(("user_id" = Uuid, Path, description = "User id")),
    request_body = MembershipUpdateRequest,
    responses(
        (status = 200, description = "Membership updated", body = MembershipView),
        (status = 404, description = "Unknown user, tier or role")
    ),
    security(("bearerAuth" = []))
)]
pub async fn set_membership(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<MembershipUpdateRequest>,
) -> AppResult<Json<MembershipView>> {
    state.authz.require(auth.user_id, keys::ACL_MANAGE).await?;

    let view = memberships::set_membership(&state.pool, user_id, &payload).await?;

    // The grant set may have changed; drop the cached entry immediately on
    // this instance. Other instances age out via their own TTL.
    state.authz.clear_user(user_id);

    log_activity(&state.event_bus, "updated", Some(auth.user_id), &view.membership);

    Ok(Json(view))
}

#[utoipa::path(
    post,
    path = "/api/acl/seed",
    tag = "ACL",
    responses((status = 204, description = "Catalog re-seeded")),
    security(("bearerAuth" = []))
)]
pub async fn reseed(State(state): State<AppState>, auth: AuthUser) -> AppResult<StatusCode> {
    state.authz.require(auth.user_id, keys::ACL_MANAGE).await?;

    seed::seed(&state.pool).await?;

    // Role -> permission mappings were rebuilt wholesale.
    state.authz.clear_all();

    Ok(StatusCode::NO_CONTENT)
}
