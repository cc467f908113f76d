use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnection;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::meta::{kind_for_key, DbPostMeta, MetaEntry, MetaKind, MetaValue};
use crate::utils::utc_now;

const META_COLUMNS: &str = "id, post_id, key, value_text, value_number, value_bool, \
     value_timestamp, value_json, created_at, updated_at";

/// Upsert one catalog key for a post. The value lands in exactly one typed
/// column, selected by the key's declared kind.
pub async fn set_meta(pool: &SqlitePool, post_id: Uuid, key: &str, value: &MetaValue) -> AppResult<MetaEntry> {
    ensure_post_exists(pool, post_id).await?;

    let mut conn = pool.acquire().await?;
    set_meta_on(&mut *conn, post_id, key, value).await?;

    get_meta(pool, post_id, key)
        .await?
        .ok_or_else(|| AppError::internal("meta row missing after upsert"))
}

pub(crate) async fn set_meta_on(
    conn: &mut SqliteConnection,
    post_id: Uuid,
    key: &str,
    value: &MetaValue,
) -> AppResult<()> {
    // Callers must have coerced through MetaValue::from_json, but guard the
    // catalog here too so no writer can invent ad-hoc keys.
    if kind_for_key(key).is_none() {
        return Err(AppError::validation("key", format!("unknown meta key '{key}'")));
    }

    let mut value_text: Option<String> = None;
    let mut value_number: Option<f64> = None;
    let mut value_bool: Option<bool> = None;
    let mut value_timestamp: Option<DateTime<Utc>> = None;
    let mut value_json: Option<String> = None;

    match value {
        MetaValue::Text(s) => value_text = Some(s.clone()),
        MetaValue::Number(n) => value_number = Some(*n),
        MetaValue::Bool(b) => value_bool = Some(*b),
        MetaValue::Timestamp(ts) => value_timestamp = Some(*ts),
        MetaValue::Json(v) => {
            value_json = Some(
                serde_json::to_string(v).map_err(|err| AppError::internal(err.to_string()))?,
            )
        }
    }

    let now = utc_now();

    sqlx::query(
        "INSERT INTO post_meta (id, post_id, key, value_text, value_number, value_bool, \
         value_timestamp, value_json, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT (post_id, key) DO UPDATE SET \
           value_text = excluded.value_text, value_number = excluded.value_number, \
           value_bool = excluded.value_bool, value_timestamp = excluded.value_timestamp, \
           value_json = excluded.value_json, updated_at = excluded.updated_at",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(post_id.to_string())
    .bind(key)
    .bind(value_text)
    .bind(value_number)
    .bind(value_bool)
    .bind(value_timestamp)
    .bind(value_json)
    .bind(now)
    .bind(now)
    .execute(conn)
    .await?;

    Ok(())
}

/// Atomic increment of a numeric meta value; creates the row at `amount`
/// when absent. A single store-level statement, so concurrent bumps to the
/// same counter never lose updates.
pub async fn increment_meta_number(
    pool: &SqlitePool,
    post_id: Uuid,
    key: &str,
    amount: f64,
) -> AppResult<f64> {
    match kind_for_key(key) {
        Some(MetaKind::Number) => {}
        Some(_) => {
            return Err(AppError::validation("key", format!("'{key}' is not a numeric meta key")))
        }
        None => return Err(AppError::validation("key", format!("unknown meta key '{key}'"))),
    }

    ensure_post_exists(pool, post_id).await?;

    let now = utc_now();

    let new_value: f64 = sqlx::query_scalar(
        "INSERT INTO post_meta (id, post_id, key, value_number, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?) \
         ON CONFLICT (post_id, key) DO UPDATE SET \
           value_number = COALESCE(post_meta.value_number, 0) + excluded.value_number, \
           updated_at = excluded.updated_at \
         RETURNING value_number",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(post_id.to_string())
    .bind(key)
    .bind(amount)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(new_value)
}

pub async fn get_meta(pool: &SqlitePool, post_id: Uuid, key: &str) -> AppResult<Option<MetaEntry>> {
    let row = sqlx::query_as::<_, DbPostMeta>(&format!(
        "SELECT {META_COLUMNS} FROM post_meta WHERE post_id = ? AND key = ?"
    ))
    .bind(post_id.to_string())
    .bind(key)
    .fetch_optional(pool)
    .await?;

    row.map(MetaEntry::try_from).transpose()
}

pub async fn get_all_meta(pool: &SqlitePool, post_id: Uuid) -> AppResult<Vec<MetaEntry>> {
    let rows = sqlx::query_as::<_, DbPostMeta>(&format!(
        "SELECT {META_COLUMNS} FROM post_meta WHERE post_id = ? ORDER BY key"
    ))
    .bind(post_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(MetaEntry::try_from).collect()
}

async fn ensure_post_exists(pool: &SqlitePool, post_id: Uuid) -> AppResult<()> {
    let exists: Option<String> = sqlx::query_scalar("SELECT id FROM posts WHERE id = ?")
        .bind(post_id.to_string())
        .fetch_optional(pool)
        .await?;

    exists
        .map(|_| ())
        .ok_or_else(|| AppError::not_found("post not found"))
}
