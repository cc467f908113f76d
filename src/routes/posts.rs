use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::keys;
use crate::errors::{AppError, AppResult};
use crate::events::log_activity;
use crate::jwt::{AuthUser, MaybeAuthUser};
use crate::models::meta::{
    MetaEntry, MetaIncrementRequest, MetaIncrementResponse, MetaUpsertRequest, MetaValue,
};
use crate::models::post::{
    resolve_translation, Locale, Post, PostCreateRequest, PostListResponse, PostStatus, PostType,
    PostUpdateRequest, PostWithTranslations, Visibility,
};
use crate::models::registration::{AttendeeInfo, EventRegistration, RosterEntry};
use crate::models::translation::{Translation, TranslationUpsertRequest};
use crate::store::{memberships, meta, posts, registrations};

// =============================================================================
// LISTING
// =============================================================================

#[derive(Debug, Deserialize, IntoParams)]
pub struct PostListQuery {
    pub post_type: Option<String>,
    pub status: Option<String>,
    pub visibility: Option<String>,
    /// Comma-separated; a post matches when it carries any of them.
    pub tags: Option<String>,
    pub author_id: Option<Uuid>,
    pub search: Option<String>,
    /// The literal string "true" restricts events to future event dates.
    pub upcoming: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/posts",
    tag = "Posts",
    params(PostListQuery),
    responses((status = 200, description = "Filtered, paginated posts", body = PostListResponse))
)]
pub async fn list_posts(
    State(state): State<AppState>,
    MaybeAuthUser(caller): MaybeAuthUser,
    Query(query): Query<PostListQuery>,
) -> AppResult<Json<PostListResponse>> {
    let post_type = query
        .post_type
        .as_deref()
        .map(|value| {
            PostType::parse(value)
                .ok_or_else(|| AppError::validation("post_type", format!("unknown value '{value}'")))
        })
        .transpose()?;

    let scope = access_scope(&state, caller.as_ref(), post_type).await?;

    let status = match &scope {
        // Non-manage callers only ever see published content.
        Some(_) => Some(PostStatus::Published),
        None => query
            .status
            .as_deref()
            .map(|value| {
                PostStatus::parse(value)
                    .ok_or_else(|| AppError::validation("status", format!("unknown value '{value}'")))
            })
            .transpose()?,
    };

    let visibility = query
        .visibility
        .as_deref()
        .map(|value| {
            Visibility::parse(value)
                .ok_or_else(|| AppError::validation("visibility", format!("unknown value '{value}'")))
        })
        .transpose()?;

    let tags = query
        .tags
        .as_deref()
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let filters = posts::PostFilters {
        post_type,
        status,
        visibility,
        tags,
        author_id: query.author_id,
        search: query.search.clone().filter(|s| !s.trim().is_empty()),
        upcoming: query.upcoming.as_deref() == Some("true"),
        allowed_visibility: scope,
        limit: query.limit,
        offset: query.offset,
    };

    let (items, total) = posts::list_posts(&state.pool, &filters).await?;

    Ok(Json(PostListResponse { posts: items, total }))
}

/// Visibility ceiling for a caller: `None` means unrestricted (a manage
/// grant for the type in question), otherwise the allowed visibility list.
async fn access_scope(
    state: &AppState,
    caller: Option<&AuthUser>,
    post_type: Option<PostType>,
) -> AppResult<Option<Vec<Visibility>>> {
    let Some(caller) = caller else {
        return Ok(Some(vec![Visibility::Public]));
    };

    let manage = match post_type {
        Some(post_type) => {
            state
                .authz
                .has_permission(caller.user_id, &post_type.permission("manage"))
                .await?
        }
        None => {
            state
                .authz
                .has_any_permission(
                    caller.user_id,
                    &[keys::NEWS_MANAGE, keys::EVENT_MANAGE, keys::RESOURCE_MANAGE],
                )
                .await?
        }
    };

    if manage {
        return Ok(None);
    }

    let mut allowed = vec![Visibility::Public];
    if let Some(membership) = memberships::active_membership(&state.pool, caller.user_id).await? {
        allowed.push(Visibility::Members);
        if membership.tier_code == crate::authz::tiers::PREMIUM {
            allowed.push(Visibility::Premium);
        }
    }

    Ok(Some(allowed))
}

// =============================================================================
// SINGLE POST
// =============================================================================

#[derive(Debug, Deserialize, IntoParams)]
pub struct PostGetQuery {
    /// Hints the default display locale; all translations are returned.
    pub locale: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/posts/{id}",
    tag = "Posts",
    params(("id" = Uuid, Path, description = "Post id"), PostGetQuery),
    responses(
        (status = 200, description = "Post with all translations and meta", body = PostWithTranslations),
        (status = 404, description = "Post not found")
    )
)]
pub async fn get_post(
    State(state): State<AppState>,
    MaybeAuthUser(caller): MaybeAuthUser,
    Path(id): Path<Uuid>,
    Query(query): Query<PostGetQuery>,
) -> AppResult<Json<PostWithTranslations>> {
    let locale = query
        .locale
        .as_deref()
        .map(|value| {
            Locale::parse(value)
                .ok_or_else(|| AppError::validation("locale", format!("unknown value '{value}'")))
        })
        .transpose()?;

    let (post, translations, meta_entries) = posts::get_post_with_translations(&state.pool, id).await?;
    authorize_read(&state, caller.as_ref(), &post).await?;

    let display = resolve_translation(&post, &translations, locale);

    Ok(Json(PostWithTranslations {
        post,
        translations,
        meta: meta_entries,
        display,
    }))
}

/// Read gate for a single post. Managers of the type see everything; other
/// callers see published content within their visibility ceiling. Drafts and
/// archived posts stay unobservable (404) rather than hinting at existence.
async fn authorize_read(state: &AppState, caller: Option<&AuthUser>, post: &Post) -> AppResult<()> {
    let manage_key = post.post_type.permission("manage");

    if let Some(caller) = caller {
        if state.authz.has_permission(caller.user_id, &manage_key).await? {
            return Ok(());
        }
    }

    if post.status != PostStatus::Published {
        return Err(AppError::not_found("post not found"));
    }

    match post.visibility {
        Visibility::Public => Ok(()),
        Visibility::Members | Visibility::Premium => {
            let caller = caller.ok_or_else(|| AppError::unauthorized("sign in required"))?;
            let membership = memberships::active_membership(&state.pool, caller.user_id)
                .await?
                .ok_or_else(|| AppError::forbidden("active membership required"))?;

            if post.visibility == Visibility::Premium
                && membership.tier_code != crate::authz::tiers::PREMIUM
            {
                return Err(AppError::forbidden("premium membership required"));
            }
            Ok(())
        }
        Visibility::Internal => match caller {
            Some(_) => Err(AppError::forbidden(format!("missing permission '{manage_key}'"))),
            None => Err(AppError::unauthorized("sign in required")),
        },
    }
}

// =============================================================================
// MUTATIONS
// =============================================================================

#[utoipa::path(
    post,
    path = "/api/posts",
    tag = "Posts",
    request_body = PostCreateRequest,
    responses(
        (status = 201, description = "Post created", body = Post),
        (status = 409, description = "Slug already in use")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_post(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<PostCreateRequest>,
) -> AppResult<(StatusCode, Json<Post>)> {
    state
        .authz
        .require(auth.user_id, &payload.post_type.permission("create"))
        .await?;

    let post = posts::create_post(&state.pool, auth.user_id, &payload).await?;

    log_activity(&state.event_bus, "created", Some(auth.user_id), &post);

    Ok((StatusCode::CREATED, Json(post)))
}

#[utoipa::path(
    patch,
    path = "/api/posts/{id}",
    tag = "Posts",
    params(("id" = Uuid, Path, description = "Post id")),
    request_body = PostUpdateRequest,
    responses(
        (status = 200, description = "Post updated", body = Post),
        (status = 404, description = "Post not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_post(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<PostUpdateRequest>,
) -> AppResult<Json<Post>> {
    let existing = posts::get_post(&state.pool, id).await?;
    state
        .authz
        .require(auth.user_id, &existing.post_type.permission("update"))
        .await?;

    let post = posts::update_post(&state.pool, id, &payload).await?;

    log_activity(&state.event_bus, "updated", Some(auth.user_id), &post);

    Ok(Json(post))
}

#[utoipa::path(
    delete,
    path = "/api/posts/{id}",
    tag = "Posts",
    params(("id" = Uuid, Path, description = "Post id")),
    responses(
        (status = 204, description = "Post deleted with translations, meta and registrations"),
        (status = 404, description = "Post not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_post(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let existing = posts::get_post(&state.pool, id).await?;
    state
        .authz
        .require(auth.user_id, &existing.post_type.permission("delete"))
        .await?;

    let post = posts::delete_post(&state.pool, id).await?;

    log_activity(&state.event_bus, "deleted", Some(auth.user_id), &post);

    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// TRANSLATIONS
// =============================================================================

#[utoipa::path(
    post,
    path = "/api/posts/{id}/translations",
    tag = "Posts",
    params(("id" = Uuid, Path, description = "Post id")),
    request_body = TranslationUpsertRequest,
    responses((status = 200, description = "Translation upserted", body = Translation)),
    security(("bearerAuth" = []))
)]
pub async fn upsert_translation(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<TranslationUpsertRequest>,
) -> AppResult<Json<Translation>> {
    let post = posts::get_post(&state.pool, id).await?;
    state
        .authz
        .require(auth.user_id, &post.post_type.permission("update"))
        .await?;

    let translation = posts::upsert_translation(&state.pool, id, &payload).await?;

    log_activity(&state.event_bus, "updated", Some(auth.user_id), &post);

    Ok(Json(translation))
}

// =============================================================================
// META
// =============================================================================

#[derive(Debug, Deserialize, IntoParams)]
pub struct MetaQuery {
    pub key: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/posts/{id}/meta",
    tag = "Posts",
    params(("id" = Uuid, Path, description = "Post id"), MetaQuery),
    responses((status = 200, description = "Single value or full meta array", body = [MetaEntry]))
)]
pub async fn get_meta(
    State(state): State<AppState>,
    MaybeAuthUser(caller): MaybeAuthUser,
    Path(id): Path<Uuid>,
    Query(query): Query<MetaQuery>,
) -> AppResult<Json<Vec<MetaEntry>>> {
    let post = posts::get_post(&state.pool, id).await?;
    authorize_read(&state, caller.as_ref(), &post).await?;

    match query.key.as_deref() {
        Some(key) => {
            let entry = meta::get_meta(&state.pool, id, key)
                .await?
                .ok_or_else(|| AppError::not_found(format!("no meta value for '{key}'")))?;
            Ok(Json(vec![entry]))
        }
        None => Ok(Json(meta::get_all_meta(&state.pool, id).await?)),
    }
}

#[utoipa::path(
    post,
    path = "/api/posts/{id}/meta",
    tag = "Posts",
    params(("id" = Uuid, Path, description = "Post id")),
    request_body = MetaUpsertRequest,
    responses(
        (status = 200, description = "Meta value upserted", body = MetaEntry),
        (status = 400, description = "Unknown key or mismatched value type")
    ),
    security(("bearerAuth" = []))
)]
pub async fn set_meta(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<MetaUpsertRequest>,
) -> AppResult<Json<MetaEntry>> {
    let post = posts::get_post(&state.pool, id).await?;
    state
        .authz
        .require(auth.user_id, &post.post_type.permission("update"))
        .await?;

    let value = MetaValue::from_json(&payload.key, &payload.value)?;
    let entry = meta::set_meta(&state.pool, id, &payload.key, &value).await?;

    Ok(Json(entry))
}

#[utoipa::path(
    post,
    path = "/api/posts/{id}/meta/increment",
    tag = "Posts",
    params(("id" = Uuid, Path, description = "Post id")),
    request_body = MetaIncrementRequest,
    responses((status = 200, description = "New counter value", body = MetaIncrementResponse)),
    security(("bearerAuth" = []))
)]
pub async fn increment_meta(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<MetaIncrementRequest>,
) -> AppResult<Json<MetaIncrementResponse>> {
    let post = posts::get_post(&state.pool, id).await?;
    state
        .authz
        .require(auth.user_id, &post.post_type.permission("update"))
        .await?;

    let value = meta::increment_meta_number(&state.pool, id, &payload.key, payload.amount).await?;

    Ok(Json(MetaIncrementResponse {
        key: payload.key,
        value,
    }))
}

// =============================================================================
// EVENT REGISTRATION
// =============================================================================

#[utoipa::path(
    post,
    path = "/api/posts/{id}/register",
    tag = "Registrations",
    params(("id" = Uuid, Path, description = "Event post id")),
    request_body = AttendeeInfo,
    responses(
        (status = 201, description = "Registered (or reactivated)", body = EventRegistration),
        (status = 409, description = "Already actively registered")
    ),
    security(("bearerAuth" = []))
)]
pub async fn register_for_event(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AttendeeInfo>,
) -> AppResult<(StatusCode, Json<EventRegistration>)> {
    let registration = registrations::register(&state.pool, id, auth.user_id, &payload).await?;

    log_activity(&state.event_bus, "created", Some(auth.user_id), &registration);

    Ok((StatusCode::CREATED, Json(registration)))
}

#[utoipa::path(
    get,
    path = "/api/posts/{id}/registrations",
    tag = "Registrations",
    params(("id" = Uuid, Path, description = "Event post id")),
    responses((status = 200, description = "Roster with attendee identity", body = [RosterEntry])),
    security(("bearerAuth" = []))
)]
pub async fn list_event_registrations(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<RosterEntry>>> {
    // Roster rows carry other users' contact details; manage-only.
    state.authz.require(auth.user_id, keys::EVENT_MANAGE).await?;

    let roster = registrations::list_for_event(&state.pool, id).await?;
    Ok(Json(roster))
}
