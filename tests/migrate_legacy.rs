mod common;

use anyhow::Result;
use axum::http::StatusCode;
use chrono::{Duration, Utc};
use serde_json::json;
use sqlx::SqlitePool;
use uuid::Uuid;

use chamber::store::legacy;
use common::{body_json, request, spawn_app};

async fn insert_legacy_news(
    pool: &SqlitePool,
    title_ko: Option<&str>,
    title_en: Option<&str>,
    view_count: i64,
) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO legacy_news (id, title_ko, title_en, content_ko, content_en, category, \
         view_count, image_urls, published_at, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(title_ko)
    .bind(title_en)
    .bind(title_ko.map(|t| format!("{t} 본문")))
    .bind(title_en.map(|t| format!("{t} body")))
    .bind("announcement")
    .bind(view_count)
    .bind(r#"["https://cdn.example.com/a.jpg"]"#)
    .bind(Utc::now() - Duration::days(30))
    .bind(Utc::now() - Duration::days(31))
    .execute(pool)
    .await?;
    Ok(id)
}

/// A legacy row with no English title migrates to a ko-only translation;
/// fetching it for locale=en serves the ko title through fallback.
#[tokio::test]
async fn ko_only_news_falls_back_for_english_readers() -> Result<()> {
    let test_app = spawn_app().await?;

    insert_legacy_news(&test_app.pool, Some("신년 인사"), None, 42).await?;

    let report = legacy::migrate_news(&test_app.pool).await?;
    assert_eq!(report.migrated, 1);
    assert_eq!(report.failed, 0);

    let post_id: String = sqlx::query_scalar("SELECT id FROM posts WHERE post_type = 'news'")
        .fetch_one(&test_app.pool)
        .await?;

    let locale_count: i64 =
        sqlx::query_scalar("SELECT COUNT(1) FROM post_translations WHERE post_id = ?")
            .bind(&post_id)
            .fetch_one(&test_app.pool)
            .await?;
    assert_eq!(locale_count, 1);

    let response = request(
        &test_app.app,
        "GET",
        &format!("/api/posts/{post_id}?locale=en"),
        None,
        None,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await?;
    assert_eq!(body["display"]["title"], "신년 인사");
    assert_eq!(body["primary_locale"], "ko");

    // The meta contract carried over
    assert!(body["meta"]
        .as_array()
        .unwrap()
        .iter()
        .any(|entry| entry["key"] == "news.viewCount" && entry["value"] == json!(42.0)));

    Ok(())
}

/// Machine-generated slugs disambiguate with numeric suffixes instead of
/// colliding.
#[tokio::test]
async fn colliding_titles_get_suffixed_slugs() -> Result<()> {
    let test_app = spawn_app().await?;

    for _ in 0..3 {
        insert_legacy_news(&test_app.pool, Some("공지"), Some("Notice"), 0).await?;
    }

    let report = legacy::migrate_news(&test_app.pool).await?;
    assert_eq!(report.migrated, 3);
    assert_eq!(report.failed, 0);

    let mut slugs: Vec<String> =
        sqlx::query_scalar("SELECT slug FROM posts WHERE post_type = 'news' ORDER BY slug")
            .fetch_all(&test_app.pool)
            .await?;
    slugs.sort();
    assert_eq!(slugs, vec!["notice", "notice-2", "notice-3"]);

    Ok(())
}

/// One bad record is logged and skipped; the rest of the batch lands.
#[tokio::test]
async fn bad_rows_are_skipped_not_fatal() -> Result<()> {
    let test_app = spawn_app().await?;

    insert_legacy_news(&test_app.pool, Some("정상 글"), None, 1).await?;
    // No title in any locale: unmigratable
    insert_legacy_news(&test_app.pool, None, None, 2).await?;
    insert_legacy_news(&test_app.pool, None, Some("Fine too"), 3).await?;

    let report = legacy::migrate_news(&test_app.pool).await?;
    assert_eq!(report.migrated, 2);
    assert_eq!(report.failed, 1);

    let post_count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM posts")
        .fetch_one(&test_app.pool)
        .await?;
    assert_eq!(post_count, 2);

    Ok(())
}

#[tokio::test]
async fn legacy_events_map_into_the_meta_catalog() -> Result<()> {
    let test_app = spawn_app().await?;

    let event_date = Utc::now() + Duration::days(14);
    sqlx::query(
        "INSERT INTO legacy_events (id, title_ko, title_en, description_ko, description_en, \
         event_date, end_date, registration_deadline, location, capacity, fee, is_public, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind("하반기 포럼")
    .bind("H2 Forum")
    .bind("포럼 설명")
    .bind("Forum description")
    .bind(event_date)
    .bind(event_date + Duration::hours(6))
    .bind(event_date - Duration::days(3))
    .bind("Lotte Hotel")
    .bind(120_i64)
    .bind(50000.0_f64)
    .bind(false)
    .bind(Utc::now() - Duration::days(60))
    .execute(&test_app.pool)
    .await?;

    let report = legacy::migrate_events(&test_app.pool).await?;
    assert_eq!(report.migrated, 1);

    let post_id: String = sqlx::query_scalar("SELECT id FROM posts WHERE post_type = 'event'")
        .fetch_one(&test_app.pool)
        .await?;

    // Non-public legacy events become members-only
    let visibility: String = sqlx::query_scalar("SELECT visibility FROM posts WHERE id = ?")
        .bind(&post_id)
        .fetch_one(&test_app.pool)
        .await?;
    assert_eq!(visibility, "members");

    let keys: Vec<String> =
        sqlx::query_scalar("SELECT key FROM post_meta WHERE post_id = ? ORDER BY key")
            .bind(&post_id)
            .fetch_all(&test_app.pool)
            .await?;
    assert_eq!(
        keys,
        vec![
            "event.capacity",
            "event.endDate",
            "event.eventDate",
            "event.fee",
            "event.isPublic",
            "event.location",
            "event.registrationDeadline",
        ]
    );

    // The migrated event date drives the upcoming filter like any other
    let upcoming: i64 = sqlx::query_scalar(
        "SELECT COUNT(1) FROM post_meta WHERE post_id = ? AND key = 'event.eventDate' \
         AND value_timestamp > ?",
    )
    .bind(&post_id)
    .bind(Utc::now())
    .fetch_one(&test_app.pool)
    .await?;
    assert_eq!(upcoming, 1);

    Ok(())
}

#[tokio::test]
async fn legacy_resources_carry_files_and_counters() -> Result<()> {
    let test_app = spawn_app().await?;

    sqlx::query(
        "INSERT INTO legacy_resources (id, title_ko, title_en, description_ko, description_en, \
         category, file_url, file_name, file_size, file_type, access_level, download_count, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind("회원 명부")
    .bind("Member Directory")
    .bind(Option::<String>::None)
    .bind(Option::<String>::None)
    .bind("directory")
    .bind("https://files.example.com/directory.pdf")
    .bind("directory.pdf")
    .bind(1_048_576_i64)
    .bind("application/pdf")
    .bind("members")
    .bind(77_i64)
    .bind(Utc::now() - Duration::days(10))
    .execute(&test_app.pool)
    .await?;

    let report = legacy::migrate_all(&test_app.pool).await?;
    assert_eq!(report.migrated, 1);
    assert_eq!(report.failed, 0);

    let post_id: String = sqlx::query_scalar("SELECT id FROM posts WHERE post_type = 'resource'")
        .fetch_one(&test_app.pool)
        .await?;

    let download_count: f64 = sqlx::query_scalar(
        "SELECT value_number FROM post_meta WHERE post_id = ? AND key = 'resource.downloadCount'",
    )
    .bind(&post_id)
    .fetch_one(&test_app.pool)
    .await?;
    assert_eq!(download_count, 77.0);

    let file_url: String = sqlx::query_scalar(
        "SELECT value_text FROM post_meta WHERE post_id = ? AND key = 'resource.fileUrl'",
    )
    .bind(&post_id)
    .fetch_one(&test_app.pool)
    .await?;
    assert_eq!(file_url, "https://files.example.com/directory.pdf");

    Ok(())
}
