use sqlx::sqlite::SqliteConnection;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::errors::{conflict_on_unique, AppError, AppResult};
use crate::models::meta::{MetaEntry, MetaValue, EVENT_DATE_KEY};
use crate::models::post::{
    DbPost, Locale, Post, PostCreateRequest, PostStatus, PostType, PostUpdateRequest, Visibility,
};
use crate::models::translation::{DbTranslation, Translation, TranslationUpsertRequest};
use crate::store::meta;
use crate::utils::{slugify, utc_now};

const POST_COLUMNS: &str = "id, post_type, status, visibility, slug, primary_locale, author_id, \
     cover_image_url, list_image_url, is_featured, tags, published_at, scheduled_at, expires_at, \
     created_at, updated_at";

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

/// Filters for the unified post listing. One implementation serves news,
/// events and resources alike.
#[derive(Debug, Default, Clone)]
pub struct PostFilters {
    pub post_type: Option<PostType>,
    pub status: Option<PostStatus>,
    pub visibility: Option<Visibility>,
    /// Match-any-of semantics against the post's tag set.
    pub tags: Vec<String>,
    pub author_id: Option<Uuid>,
    /// Case-insensitive substring over translation title/excerpt/content and slug.
    pub search: Option<String>,
    /// Restrict event posts to those whose event.eventDate meta lies strictly
    /// in the future at query time.
    pub upcoming: bool,
    /// Visibility ceiling for the caller; `None` means unrestricted (manage).
    pub allowed_visibility: Option<Vec<Visibility>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, filters: &PostFilters) {
    builder.push(" WHERE 1 = 1");

    if let Some(post_type) = filters.post_type {
        builder.push(" AND posts.post_type = ").push_bind(post_type.as_str());
    }
    if let Some(status) = filters.status {
        builder.push(" AND posts.status = ").push_bind(status.as_str());
    }
    if let Some(visibility) = filters.visibility {
        builder.push(" AND posts.visibility = ").push_bind(visibility.as_str());
    }
    if let Some(allowed) = &filters.allowed_visibility {
        builder.push(" AND posts.visibility IN (");
        let mut separated = builder.separated(", ");
        for visibility in allowed {
            separated.push_bind(visibility.as_str());
        }
        builder.push(")");
    }
    if let Some(author_id) = filters.author_id {
        builder.push(" AND posts.author_id = ").push_bind(author_id.to_string());
    }
    if !filters.tags.is_empty() {
        builder.push(" AND EXISTS (SELECT 1 FROM json_each(posts.tags) WHERE json_each.value IN (");
        let mut separated = builder.separated(", ");
        for tag in &filters.tags {
            separated.push_bind(tag.clone());
        }
        builder.push("))");
    }
    if let Some(search) = &filters.search {
        let pattern = format!("%{}%", search.to_lowercase());
        builder
            .push(" AND (LOWER(posts.slug) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR EXISTS (SELECT 1 FROM post_translations tr WHERE tr.post_id = posts.id AND (")
            .push("LOWER(tr.title) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(COALESCE(tr.excerpt, '')) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(COALESCE(tr.content, '')) LIKE ")
            .push_bind(pattern)
            .push(")))");
    }
    if filters.upcoming {
        // Meta-layer join, served by the (key, value_timestamp) index.
        builder
            .push(" AND EXISTS (SELECT 1 FROM post_meta m WHERE m.post_id = posts.id AND m.key = ")
            .push_bind(EVENT_DATE_KEY)
            .push(" AND m.value_timestamp > ")
            .push_bind(utc_now())
            .push(")");
    }
}

/// Filtered, paginated listing. The total count is computed independently of
/// the page window for page-count display.
pub async fn list_posts(pool: &SqlitePool, filters: &PostFilters) -> AppResult<(Vec<Post>, i64)> {
    let mut count_builder = QueryBuilder::new("SELECT COUNT(*) FROM posts");
    push_filters(&mut count_builder, filters);
    let total: i64 = count_builder.build_query_scalar().fetch_one(pool).await?;

    let limit = filters.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = filters.offset.unwrap_or(0).max(0);

    let mut builder = QueryBuilder::new(format!("SELECT {POST_COLUMNS} FROM posts"));
    push_filters(&mut builder, filters);
    builder
        .push(" ORDER BY COALESCE(posts.published_at, posts.created_at) DESC, posts.id")
        .push(" LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let rows: Vec<DbPost> = builder.build_query_as().fetch_all(pool).await?;
    let posts = rows
        .into_iter()
        .map(Post::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok((posts, total))
}

pub async fn get_post(pool: &SqlitePool, id: Uuid) -> AppResult<Post> {
    let row = sqlx::query_as::<_, DbPost>(&format!(
        "SELECT {POST_COLUMNS} FROM posts WHERE id = ?"
    ))
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("post not found"))?;

    row.try_into()
}

/// Post plus all of its translations and meta. Translations come back in
/// locale creation order so the fallback pick is deterministic.
pub async fn get_post_with_translations(
    pool: &SqlitePool,
    id: Uuid,
) -> AppResult<(Post, Vec<Translation>, Vec<MetaEntry>)> {
    let post = get_post(pool, id).await?;

    let translation_rows = sqlx::query_as::<_, DbTranslation>(
        "SELECT id, post_id, locale, title, subtitle, excerpt, content, seo_title, seo_description, \
         created_at, updated_at FROM post_translations WHERE post_id = ? ORDER BY created_at, id",
    )
    .bind(id.to_string())
    .fetch_all(pool)
    .await?;

    let translations = translation_rows
        .into_iter()
        .map(Translation::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    let meta_entries = meta::get_all_meta(pool, id).await?;

    Ok((post, translations, meta_entries))
}

/// Create a post with its initial translations and meta as one atomic unit:
/// a failure partway leaves zero rows, never a post without translations.
pub async fn create_post(
    pool: &SqlitePool,
    author_id: Uuid,
    request: &PostCreateRequest,
) -> AppResult<Post> {
    let now = utc_now();
    let id = Uuid::new_v4();
    let primary_locale = request.primary_locale.unwrap_or(Locale::Ko);

    let slug = match &request.slug {
        Some(slug) if !slug.trim().is_empty() => slug.trim().to_string(),
        _ => derived_slug(request, primary_locale, &id),
    };

    let tags = serde_json::to_string(request.tags.as_deref().unwrap_or_default())
        .map_err(|err| AppError::internal(err.to_string()))?;

    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO posts (id, post_type, status, visibility, slug, primary_locale, author_id, \
         cover_image_url, list_image_url, is_featured, tags, scheduled_at, expires_at, created_at, updated_at) \
         VALUES (?, ?, 'draft', ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(request.post_type.as_str())
    .bind(request.visibility.unwrap_or(Visibility::Public).as_str())
    .bind(&slug)
    .bind(primary_locale.as_str())
    .bind(author_id.to_string())
    .bind(&request.cover_image_url)
    .bind(&request.list_image_url)
    .bind(request.is_featured.unwrap_or(false))
    .bind(&tags)
    .bind(request.scheduled_at)
    .bind(request.expires_at)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(|err| conflict_on_unique(err, "slug already in use"))?;

    for translation in &request.translations {
        upsert_translation_on(&mut *tx, id, translation).await?;
    }

    for (key, value) in &request.meta {
        let typed = MetaValue::from_json(key, value)?;
        meta::set_meta_on(&mut *tx, id, key, &typed).await?;
    }

    tx.commit().await?;

    get_post(pool, id).await
}

fn derived_slug(request: &PostCreateRequest, primary_locale: Locale, id: &Uuid) -> String {
    let title = request
        .translations
        .iter()
        .find(|t| t.locale == primary_locale)
        .or_else(|| request.translations.first())
        .map(|t| t.title.as_str())
        .unwrap_or_default();

    let slug = slugify(title);
    if slug.is_empty() {
        // Non-ASCII titles slug to nothing; fall back to an id-derived slug.
        format!("{}-{}", request.post_type.as_str(), &id.to_string()[..8])
    } else {
        slug
    }
}

/// Partial update of post fields only (translations and meta have their own
/// endpoints). Publishing stamps published_at when it was never set.
pub async fn update_post(pool: &SqlitePool, id: Uuid, request: &PostUpdateRequest) -> AppResult<Post> {
    let mut post = get_post(pool, id).await?;

    if let Some(status) = request.status {
        if status == PostStatus::Published && post.published_at.is_none() {
            post.published_at = Some(utc_now());
        }
        post.status = status;
    }
    if let Some(visibility) = request.visibility {
        post.visibility = visibility;
    }
    if let Some(slug) = &request.slug {
        post.slug = slug.trim().to_string();
    }
    if let Some(primary_locale) = request.primary_locale {
        post.primary_locale = primary_locale;
    }
    if request.cover_image_url.is_some() {
        post.cover_image_url = request.cover_image_url.clone();
    }
    if request.list_image_url.is_some() {
        post.list_image_url = request.list_image_url.clone();
    }
    if let Some(is_featured) = request.is_featured {
        post.is_featured = is_featured;
    }
    if let Some(tags) = &request.tags {
        post.tags = tags.clone();
    }
    if request.scheduled_at.is_some() {
        post.scheduled_at = request.scheduled_at;
    }
    if request.expires_at.is_some() {
        post.expires_at = request.expires_at;
    }

    let now = utc_now();
    let tags = serde_json::to_string(&post.tags).map_err(|err| AppError::internal(err.to_string()))?;

    sqlx::query(
        "UPDATE posts SET status = ?, visibility = ?, slug = ?, primary_locale = ?, \
         cover_image_url = ?, list_image_url = ?, is_featured = ?, tags = ?, published_at = ?, \
         scheduled_at = ?, expires_at = ?, updated_at = ? WHERE id = ?",
    )
    .bind(post.status.as_str())
    .bind(post.visibility.as_str())
    .bind(&post.slug)
    .bind(post.primary_locale.as_str())
    .bind(&post.cover_image_url)
    .bind(&post.list_image_url)
    .bind(post.is_featured)
    .bind(&tags)
    .bind(post.published_at)
    .bind(post.scheduled_at)
    .bind(post.expires_at)
    .bind(now)
    .bind(id.to_string())
    .execute(pool)
    .await
    .map_err(|err| conflict_on_unique(err, "slug already in use"))?;

    post.updated_at = now;
    Ok(post)
}

/// Explicit admin delete; the schema cascades to translations, meta and
/// registrations. Returns the deleted post for activity logging.
pub async fn delete_post(pool: &SqlitePool, id: Uuid) -> AppResult<Post> {
    let post = get_post(pool, id).await?;

    sqlx::query("DELETE FROM posts WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;

    Ok(post)
}

pub async fn upsert_translation(
    pool: &SqlitePool,
    post_id: Uuid,
    request: &TranslationUpsertRequest,
) -> AppResult<Translation> {
    // Surface a missing post as 404 rather than a foreign-key failure.
    let _ = get_post(pool, post_id).await?;

    let mut conn = pool.acquire().await?;
    upsert_translation_on(&mut *conn, post_id, request).await
}

/// Insert-if-absent-else-update on (post_id, locale): never a second row for
/// the same locale.
pub(crate) async fn upsert_translation_on(
    conn: &mut SqliteConnection,
    post_id: Uuid,
    request: &TranslationUpsertRequest,
) -> AppResult<Translation> {
    if request.title.trim().is_empty() {
        return Err(AppError::validation("title", "must not be empty"));
    }

    let now = utc_now();

    sqlx::query(
        "INSERT INTO post_translations (id, post_id, locale, title, subtitle, excerpt, content, \
         seo_title, seo_description, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT (post_id, locale) DO UPDATE SET \
           title = excluded.title, subtitle = excluded.subtitle, excerpt = excluded.excerpt, \
           content = excluded.content, seo_title = excluded.seo_title, \
           seo_description = excluded.seo_description, updated_at = excluded.updated_at",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(post_id.to_string())
    .bind(request.locale.as_str())
    .bind(request.title.trim())
    .bind(&request.subtitle)
    .bind(&request.excerpt)
    .bind(&request.content)
    .bind(&request.seo_title)
    .bind(&request.seo_description)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let row = sqlx::query_as::<_, DbTranslation>(
        "SELECT id, post_id, locale, title, subtitle, excerpt, content, seo_title, seo_description, \
         created_at, updated_at FROM post_translations WHERE post_id = ? AND locale = ?",
    )
    .bind(post_id.to_string())
    .bind(request.locale.as_str())
    .fetch_one(&mut *conn)
    .await?;

    row.try_into()
}
