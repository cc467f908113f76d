//! One-time backfill of the pre-migration news/events/resources tables into
//! the unified post model. Each record migrates inside its own transaction:
//! one bad row is logged and skipped, the batch continues, and the run
//! reports migrated vs failed counts. Not part of steady-state operation.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteConnection;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::meta::MetaValue;
use crate::models::post::{Locale, PostType, Visibility};
use crate::models::translation::TranslationUpsertRequest;
use crate::store::{meta, posts};
use crate::utils::{slugify, utc_now};

#[derive(Debug, Default, Clone, Copy)]
pub struct MigrationReport {
    pub migrated: usize,
    pub failed: usize,
}

impl MigrationReport {
    fn absorb(&mut self, other: MigrationReport) {
        self.migrated += other.migrated;
        self.failed += other.failed;
    }
}

#[derive(Debug, FromRow)]
struct LegacyNews {
    id: String,
    title_ko: Option<String>,
    title_en: Option<String>,
    content_ko: Option<String>,
    content_en: Option<String>,
    category: Option<String>,
    view_count: i64,
    image_urls: Option<String>,
    published_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct LegacyEvent {
    id: String,
    title_ko: Option<String>,
    title_en: Option<String>,
    description_ko: Option<String>,
    description_en: Option<String>,
    event_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    registration_deadline: Option<DateTime<Utc>>,
    location: Option<String>,
    capacity: Option<i64>,
    fee: Option<f64>,
    is_public: bool,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct LegacyResource {
    id: String,
    title_ko: Option<String>,
    title_en: Option<String>,
    description_ko: Option<String>,
    description_en: Option<String>,
    category: Option<String>,
    file_url: Option<String>,
    file_name: Option<String>,
    file_size: Option<i64>,
    file_type: Option<String>,
    access_level: Option<String>,
    download_count: i64,
    created_at: DateTime<Utc>,
}

pub async fn migrate_news(pool: &SqlitePool) -> AppResult<MigrationReport> {
    let rows = sqlx::query_as::<_, LegacyNews>(
        "SELECT id, title_ko, title_en, content_ko, content_en, category, view_count, image_urls, \
         published_at, created_at FROM legacy_news ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    let mut report = MigrationReport::default();
    for row in rows {
        let legacy_id = row.id.clone();
        match migrate_one_news(pool, row).await {
            Ok(()) => report.migrated += 1,
            Err(err) => {
                report.failed += 1;
                tracing::error!(legacy_id = %legacy_id, error = %err, "news row failed to migrate");
            }
        }
    }

    Ok(report)
}

async fn migrate_one_news(pool: &SqlitePool, row: LegacyNews) -> AppResult<()> {
    let mut tx = pool.begin().await?;

    let post_id = insert_post_shell(
        &mut *tx,
        PostType::News,
        Visibility::Public,
        primary_locale(&row.title_ko, &row.title_en)?,
        &row.title_ko,
        &row.title_en,
        &row.id,
        row.published_at.or(Some(row.created_at)),
        row.created_at,
    )
    .await?;

    write_bilingual_translations(
        &mut *tx,
        post_id,
        &row.title_ko,
        &row.content_ko,
        &row.title_en,
        &row.content_en,
    )
    .await?;

    if let Some(category) = &row.category {
        meta::set_meta_on(&mut *tx, post_id, "news.category", &MetaValue::Text(category.clone())).await?;
    }
    meta::set_meta_on(&mut *tx, post_id, "news.viewCount", &MetaValue::Number(row.view_count as f64))
        .await?;
    if let Some(raw) = &row.image_urls {
        meta::set_meta_on(&mut *tx, post_id, "news.images", &MetaValue::Json(parse_image_list(raw)))
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn migrate_events(pool: &SqlitePool) -> AppResult<MigrationReport> {
    let rows = sqlx::query_as::<_, LegacyEvent>(
        "SELECT id, title_ko, title_en, description_ko, description_en, event_date, end_date, \
         registration_deadline, location, capacity, fee, is_public, created_at \
         FROM legacy_events ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    let mut report = MigrationReport::default();
    for row in rows {
        let legacy_id = row.id.clone();
        match migrate_one_event(pool, row).await {
            Ok(()) => report.migrated += 1,
            Err(err) => {
                report.failed += 1;
                tracing::error!(legacy_id = %legacy_id, error = %err, "event row failed to migrate");
            }
        }
    }

    Ok(report)
}

async fn migrate_one_event(pool: &SqlitePool, row: LegacyEvent) -> AppResult<()> {
    let mut tx = pool.begin().await?;

    let visibility = if row.is_public { Visibility::Public } else { Visibility::Members };
    let post_id = insert_post_shell(
        &mut *tx,
        PostType::Event,
        visibility,
        primary_locale(&row.title_ko, &row.title_en)?,
        &row.title_ko,
        &row.title_en,
        &row.id,
        Some(row.created_at),
        row.created_at,
    )
    .await?;

    write_bilingual_translations(
        &mut *tx,
        post_id,
        &row.title_ko,
        &row.description_ko,
        &row.title_en,
        &row.description_en,
    )
    .await?;

    if let Some(event_date) = row.event_date {
        meta::set_meta_on(&mut *tx, post_id, "event.eventDate", &MetaValue::Timestamp(event_date))
            .await?;
    }
    if let Some(end_date) = row.end_date {
        meta::set_meta_on(&mut *tx, post_id, "event.endDate", &MetaValue::Timestamp(end_date)).await?;
    }
    if let Some(deadline) = row.registration_deadline {
        meta::set_meta_on(
            &mut *tx,
            post_id,
            "event.registrationDeadline",
            &MetaValue::Timestamp(deadline),
        )
        .await?;
    }
    if let Some(location) = &row.location {
        meta::set_meta_on(&mut *tx, post_id, "event.location", &MetaValue::Text(location.clone()))
            .await?;
    }
    if let Some(capacity) = row.capacity {
        meta::set_meta_on(&mut *tx, post_id, "event.capacity", &MetaValue::Number(capacity as f64))
            .await?;
    }
    if let Some(fee) = row.fee {
        meta::set_meta_on(&mut *tx, post_id, "event.fee", &MetaValue::Number(fee)).await?;
    }
    meta::set_meta_on(&mut *tx, post_id, "event.isPublic", &MetaValue::Bool(row.is_public)).await?;

    tx.commit().await?;
    Ok(())
}

pub async fn migrate_resources(pool: &SqlitePool) -> AppResult<MigrationReport> {
    let rows = sqlx::query_as::<_, LegacyResource>(
        "SELECT id, title_ko, title_en, description_ko, description_en, category, file_url, \
         file_name, file_size, file_type, access_level, download_count, created_at \
         FROM legacy_resources ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    let mut report = MigrationReport::default();
    for row in rows {
        let legacy_id = row.id.clone();
        match migrate_one_resource(pool, row).await {
            Ok(()) => report.migrated += 1,
            Err(err) => {
                report.failed += 1;
                tracing::error!(legacy_id = %legacy_id, error = %err, "resource row failed to migrate");
            }
        }
    }

    Ok(report)
}

async fn migrate_one_resource(pool: &SqlitePool, row: LegacyResource) -> AppResult<()> {
    let mut tx = pool.begin().await?;

    let visibility = match row.access_level.as_deref() {
        Some("members") => Visibility::Members,
        Some("premium") => Visibility::Premium,
        _ => Visibility::Public,
    };

    let post_id = insert_post_shell(
        &mut *tx,
        PostType::Resource,
        visibility,
        primary_locale(&row.title_ko, &row.title_en)?,
        &row.title_ko,
        &row.title_en,
        &row.id,
        Some(row.created_at),
        row.created_at,
    )
    .await?;

    write_bilingual_translations(
        &mut *tx,
        post_id,
        &row.title_ko,
        &row.description_ko,
        &row.title_en,
        &row.description_en,
    )
    .await?;

    if let Some(category) = &row.category {
        meta::set_meta_on(&mut *tx, post_id, "resource.category", &MetaValue::Text(category.clone()))
            .await?;
    }
    if let Some(file_url) = &row.file_url {
        meta::set_meta_on(&mut *tx, post_id, "resource.fileUrl", &MetaValue::Text(file_url.clone()))
            .await?;
    }
    if let Some(file_name) = &row.file_name {
        meta::set_meta_on(&mut *tx, post_id, "resource.fileName", &MetaValue::Text(file_name.clone()))
            .await?;
    }
    if let Some(file_size) = row.file_size {
        meta::set_meta_on(&mut *tx, post_id, "resource.fileSize", &MetaValue::Number(file_size as f64))
            .await?;
    }
    if let Some(file_type) = &row.file_type {
        meta::set_meta_on(&mut *tx, post_id, "resource.fileType", &MetaValue::Text(file_type.clone()))
            .await?;
    }
    if let Some(access_level) = &row.access_level {
        meta::set_meta_on(
            &mut *tx,
            post_id,
            "resource.accessLevel",
            &MetaValue::Text(access_level.clone()),
        )
        .await?;
    }
    meta::set_meta_on(
        &mut *tx,
        post_id,
        "resource.downloadCount",
        &MetaValue::Number(row.download_count as f64),
    )
    .await?;

    tx.commit().await?;
    Ok(())
}

pub async fn migrate_all(pool: &SqlitePool) -> AppResult<MigrationReport> {
    let mut report = MigrationReport::default();
    report.absorb(migrate_news(pool).await?);
    report.absorb(migrate_events(pool).await?);
    report.absorb(migrate_resources(pool).await?);
    Ok(report)
}

fn primary_locale(title_ko: &Option<String>, title_en: &Option<String>) -> AppResult<Locale> {
    if title_ko.as_deref().is_some_and(|t| !t.trim().is_empty()) {
        Ok(Locale::Ko)
    } else if title_en.as_deref().is_some_and(|t| !t.trim().is_empty()) {
        Ok(Locale::En)
    } else {
        Err(AppError::validation("title", "legacy row has no title in any locale"))
    }
}

#[allow(clippy::too_many_arguments)]
async fn insert_post_shell(
    conn: &mut SqliteConnection,
    post_type: PostType,
    visibility: Visibility,
    primary_locale: Locale,
    title_ko: &Option<String>,
    title_en: &Option<String>,
    legacy_id: &str,
    published_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
) -> AppResult<Uuid> {
    let id = Uuid::new_v4();
    let slug = generated_slug(&mut *conn, post_type, title_ko, title_en, legacy_id).await?;
    let now = utc_now();

    sqlx::query(
        "INSERT INTO posts (id, post_type, status, visibility, slug, primary_locale, author_id, \
         is_featured, tags, published_at, created_at, updated_at) \
         VALUES (?, ?, 'published', ?, ?, ?, NULL, 0, '[]', ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(post_type.as_str())
    .bind(visibility.as_str())
    .bind(&slug)
    .bind(primary_locale.as_str())
    .bind(published_at)
    .bind(created_at)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(id)
}

/// Machine-generated slugs disambiguate with a numeric suffix, so slug
/// collisions cannot fail a migration run.
async fn generated_slug(
    conn: &mut SqliteConnection,
    post_type: PostType,
    title_ko: &Option<String>,
    title_en: &Option<String>,
    legacy_id: &str,
) -> AppResult<String> {
    let base = title_en
        .as_deref()
        .map(slugify)
        .filter(|s| !s.is_empty())
        .or_else(|| title_ko.as_deref().map(slugify).filter(|s| !s.is_empty()))
        .unwrap_or_else(|| {
            let short = &legacy_id[..legacy_id.len().min(8)];
            format!("{}-{}", post_type.as_str(), short)
        });

    let mut candidate = base.clone();
    let mut suffix = 2;
    loop {
        let taken: Option<String> = sqlx::query_scalar("SELECT id FROM posts WHERE slug = ?")
            .bind(&candidate)
            .fetch_optional(&mut *conn)
            .await?;
        if taken.is_none() {
            return Ok(candidate);
        }
        candidate = format!("{base}-{suffix}");
        suffix += 1;
    }
}

async fn write_bilingual_translations(
    conn: &mut SqliteConnection,
    post_id: Uuid,
    title_ko: &Option<String>,
    content_ko: &Option<String>,
    title_en: &Option<String>,
    content_en: &Option<String>,
) -> AppResult<()> {
    if let Some(title) = title_ko.as_deref().filter(|t| !t.trim().is_empty()) {
        let request = TranslationUpsertRequest {
            locale: Locale::Ko,
            title: title.to_string(),
            subtitle: None,
            excerpt: None,
            content: content_ko.clone(),
            seo_title: None,
            seo_description: None,
        };
        posts::upsert_translation_on(&mut *conn, post_id, &request).await?;
    }

    if let Some(title) = title_en.as_deref().filter(|t| !t.trim().is_empty()) {
        let request = TranslationUpsertRequest {
            locale: Locale::En,
            title: title.to_string(),
            subtitle: None,
            excerpt: None,
            content: content_en.clone(),
            seo_title: None,
            seo_description: None,
        };
        posts::upsert_translation_on(&mut *conn, post_id, &request).await?;
    }

    Ok(())
}

fn parse_image_list(raw: &str) -> Value {
    serde_json::from_str::<Value>(raw)
        .ok()
        .filter(Value::is_array)
        .unwrap_or_else(|| serde_json::json!([raw]))
}
