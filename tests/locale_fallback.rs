mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::{body_json, register_user, request, set_role, spawn_app};

/// A post whose primary locale (ko) has no translation still serves a
/// usable title for every requested locale.
#[tokio::test]
async fn missing_primary_locale_falls_back_to_first_available() -> Result<()> {
    let test_app = spawn_app().await?;
    let (admin_id, token) = register_user(&test_app.app, "Admin", "admin@example.com").await?;
    set_role(&test_app.pool, admin_id, "admin").await?;

    let response = request(
        &test_app.app,
        "POST",
        "/api/posts",
        Some(&token),
        Some(json!({
            "post_type": "news",
            "slug": "bilateral-summit",
            "primary_locale": "ko",
            "translations": [
                { "locale": "en", "title": "Bilateral Summit" },
                { "locale": "zh", "title": "双边峰会" }
            ]
        })),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await?;
    let id = body["id"].as_str().unwrap().to_string();

    let response = request(
        &test_app.app,
        "PATCH",
        &format!("/api/posts/{id}"),
        Some(&token),
        Some(json!({ "status": "published" })),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);

    // Requesting the absent primary locale: first available wins (en was
    // created first)
    let response = request(
        &test_app.app,
        "GET",
        &format!("/api/posts/{id}?locale=ko"),
        None,
        None,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await?;
    assert_eq!(body["display"]["title"], "Bilateral Summit");

    // Exact locale still wins when present
    let response = request(
        &test_app.app,
        "GET",
        &format!("/api/posts/{id}?locale=zh"),
        None,
        None,
    )
    .await?;
    let body = body_json(response).await?;
    assert_eq!(body["display"]["title"], "双边峰会");

    // All translations are returned regardless of the locale hint
    assert_eq!(body["translations"].as_array().unwrap().len(), 2);

    Ok(())
}

#[tokio::test]
async fn post_without_translations_degrades_to_slug() -> Result<()> {
    let test_app = spawn_app().await?;
    let (admin_id, token) = register_user(&test_app.app, "Admin", "admin@example.com").await?;
    set_role(&test_app.pool, admin_id, "admin").await?;

    let response = request(
        &test_app.app,
        "POST",
        "/api/posts",
        Some(&token),
        Some(json!({
            "post_type": "resource",
            "slug": "bare-resource"
        })),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await?;
    let id = body["id"].as_str().unwrap().to_string();

    let response = request(
        &test_app.app,
        "GET",
        &format!("/api/posts/{id}?locale=en"),
        Some(&token),
        None,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await?;
    assert_eq!(body["display"]["title"], "bare-resource");
    assert_eq!(body["display"]["content"], "");
    assert_eq!(body["display"]["excerpt"], "");

    Ok(())
}

/// Upserting the same locale twice keeps exactly one row carrying the
/// latest values.
#[tokio::test]
async fn translation_upsert_is_idempotent() -> Result<()> {
    let test_app = spawn_app().await?;
    let (admin_id, token) = register_user(&test_app.app, "Admin", "admin@example.com").await?;
    set_role(&test_app.pool, admin_id, "admin").await?;

    let response = request(
        &test_app.app,
        "POST",
        "/api/posts",
        Some(&token),
        Some(json!({
            "post_type": "news",
            "slug": "quarterly-digest",
            "translations": [{ "locale": "ko", "title": "분기 소식" }]
        })),
    )
    .await?;
    let body = body_json(response).await?;
    let id = body["id"].as_str().unwrap().to_string();

    for title in ["Quarterly Digest", "Quarterly Digest (final)"] {
        let response = request(
            &test_app.app,
            "POST",
            &format!("/api/posts/{id}/translations"),
            Some(&token),
            Some(json!({ "locale": "en", "title": title })),
        )
        .await?;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(1) FROM post_translations WHERE post_id = ? AND locale = 'en'",
    )
    .bind(&id)
    .fetch_one(&test_app.pool)
    .await?;
    assert_eq!(count, 1);

    let title: String = sqlx::query_scalar(
        "SELECT title FROM post_translations WHERE post_id = ? AND locale = 'en'",
    )
    .bind(&id)
    .fetch_one(&test_app.pool)
    .await?;
    assert_eq!(title, "Quarterly Digest (final)");

    Ok(())
}
