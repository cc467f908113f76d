mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::{body_json, register_user, request, set_role, spawn_app};

#[tokio::test]
async fn create_with_translations_and_meta_is_atomic() -> Result<()> {
    let test_app = spawn_app().await?;
    let (admin_id, token) = register_user(&test_app.app, "Admin", "admin@example.com").await?;
    set_role(&test_app.pool, admin_id, "admin").await?;

    let response = request(
        &test_app.app,
        "POST",
        "/api/posts",
        Some(&token),
        Some(json!({
            "post_type": "event",
            "slug": "gala-dinner",
            "tags": ["networking", "annual"],
            "translations": [
                { "locale": "ko", "title": "갈라 디너" },
                { "locale": "en", "title": "Gala Dinner" }
            ],
            "meta": {
                "event.location": "Grand Hyatt Seoul",
                "event.capacity": 250,
                "event.isPublic": true
            }
        })),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await?;
    let id = body["id"].as_str().unwrap().to_string();
    assert_eq!(body["status"], "draft");
    assert_eq!(body["slug"], "gala-dinner");

    // Both unit members landed with the post
    let translation_count: i64 =
        sqlx::query_scalar("SELECT COUNT(1) FROM post_translations WHERE post_id = ?")
            .bind(&id)
            .fetch_one(&test_app.pool)
            .await?;
    assert_eq!(translation_count, 2);

    let meta_count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM post_meta WHERE post_id = ?")
        .bind(&id)
        .fetch_one(&test_app.pool)
        .await?;
    assert_eq!(meta_count, 3);

    Ok(())
}

#[tokio::test]
async fn create_with_bad_meta_key_leaves_no_rows() -> Result<()> {
    let test_app = spawn_app().await?;
    let (admin_id, token) = register_user(&test_app.app, "Admin", "admin@example.com").await?;
    set_role(&test_app.pool, admin_id, "admin").await?;

    let response = request(
        &test_app.app,
        "POST",
        "/api/posts",
        Some(&token),
        Some(json!({
            "post_type": "event",
            "slug": "broken-event",
            "translations": [{ "locale": "ko", "title": "이벤트" }],
            "meta": { "event.notInCatalog": "x" }
        })),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Transaction rolled back: no post, no translations
    let post_count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM posts WHERE slug = ?")
        .bind("broken-event")
        .fetch_one(&test_app.pool)
        .await?;
    assert_eq!(post_count, 0);

    Ok(())
}

#[tokio::test]
async fn duplicate_slug_conflicts() -> Result<()> {
    let test_app = spawn_app().await?;
    let (admin_id, token) = register_user(&test_app.app, "Admin", "admin@example.com").await?;
    set_role(&test_app.pool, admin_id, "admin").await?;

    for expected in [StatusCode::CREATED, StatusCode::CONFLICT] {
        let response = request(
            &test_app.app,
            "POST",
            "/api/posts",
            Some(&token),
            Some(json!({
                "post_type": "news",
                "slug": "annual-report",
                "translations": [{ "locale": "en", "title": "Annual Report" }]
            })),
        )
        .await?;
        assert_eq!(response.status(), expected);
    }

    Ok(())
}

#[tokio::test]
async fn publishing_stamps_published_at_once() -> Result<()> {
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
            "slug": "press-release",
            "translations": [{ "locale": "en", "title": "Press Release" }]
        })),
    )
    .await?;
    let body = body_json(response).await?;
    let id = body["id"].as_str().unwrap().to_string();
    assert!(body["published_at"].is_null());

    let response = request(
        &test_app.app,
        "PATCH",
        &format!("/api/posts/{id}"),
        Some(&token),
        Some(json!({ "status": "published" })),
    )
    .await?;
    let body = body_json(response).await?;
    let first_published_at = body["published_at"].as_str().unwrap().to_string();

    // Archiving and re-publishing keeps the original timestamp
    let response = request(
        &test_app.app,
        "PATCH",
        &format!("/api/posts/{id}"),
        Some(&token),
        Some(json!({ "status": "archived" })),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = request(
        &test_app.app,
        "PATCH",
        &format!("/api/posts/{id}"),
        Some(&token),
        Some(json!({ "status": "published" })),
    )
    .await?;
    let body = body_json(response).await?;
    assert_eq!(body["published_at"].as_str().unwrap(), first_published_at);

    Ok(())
}

#[tokio::test]
async fn delete_cascades_to_translations_meta_and_registrations() -> Result<()> {
    let test_app = spawn_app().await?;
    let (admin_id, token) = register_user(&test_app.app, "Admin", "admin@example.com").await?;
    set_role(&test_app.pool, admin_id, "admin").await?;

    let event_id =
        common::create_published_post(&test_app.app, &token, "event", "doomed-event", "행사").await?;

    let response = request(
        &test_app.app,
        "POST",
        &format!("/api/posts/{event_id}/meta"),
        Some(&token),
        Some(json!({ "key": "event.location", "value": "COEX" })),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = request(
        &test_app.app,
        "POST",
        &format!("/api/posts/{event_id}/register"),
        Some(&token),
        Some(json!({ "name": "Admin", "email": "admin@example.com" })),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = request(
        &test_app.app,
        "DELETE",
        &format!("/api/posts/{event_id}"),
        Some(&token),
        None,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    for table in ["post_translations", "post_meta"] {
        let count: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(1) FROM {table} WHERE post_id = ?"))
                .bind(event_id.to_string())
                .fetch_one(&test_app.pool)
                .await?;
        assert_eq!(count, 0, "{table} not cascaded");
    }

    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(1) FROM event_registrations WHERE event_id = ?")
            .bind(event_id.to_string())
            .fetch_one(&test_app.pool)
            .await?;
    assert_eq!(count, 0, "registrations not cascaded");

    Ok(())
}

#[tokio::test]
async fn listing_filters_and_pagination() -> Result<()> {
    let test_app = spawn_app().await?;
    let (admin_id, token) = register_user(&test_app.app, "Admin", "admin@example.com").await?;
    set_role(&test_app.pool, admin_id, "admin").await?;

    for (slug, title, tags) in [
        ("fair-2024", "Trade Fair 2024", json!(["trade", "fair"])),
        ("forum-2024", "Investment Forum", json!(["investment"])),
        ("mixer-2024", "Autumn Mixer", json!(["networking"])),
    ] {
        let response = request(
            &test_app.app,
            "POST",
            "/api/posts",
            Some(&token),
            Some(json!({
                "post_type": "news",
                "slug": slug,
                "tags": tags,
                "translations": [{ "locale": "en", "title": title }]
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
    }

    // Tag filter matches any of the requested tags
    let response = request(
        &test_app.app,
        "GET",
        "/api/posts?tags=trade,networking",
        None,
        None,
    )
    .await?;
    let body = body_json(response).await?;
    assert_eq!(body["total"], 2);

    // Substring search over translation titles, case-insensitive
    let response = request(&test_app.app, "GET", "/api/posts?search=FORUM", None, None).await?;
    let body = body_json(response).await?;
    assert_eq!(body["total"], 1);
    assert_eq!(body["posts"][0]["slug"], "forum-2024");

    // Search also covers slugs
    let response = request(&test_app.app, "GET", "/api/posts?search=mixer-20", None, None).await?;
    let body = body_json(response).await?;
    assert_eq!(body["total"], 1);

    // Pagination window shrinks items but not total
    let response = request(
        &test_app.app,
        "GET",
        "/api/posts?limit=2&offset=0",
        None,
        None,
    )
    .await?;
    let body = body_json(response).await?;
    assert_eq!(body["total"], 3);
    assert_eq!(body["posts"].as_array().unwrap().len(), 2);

    let response = request(
        &test_app.app,
        "GET",
        "/api/posts?limit=2&offset=2",
        None,
        None,
    )
    .await?;
    let body = body_json(response).await?;
    assert_eq!(body["total"], 3);
    assert_eq!(body["posts"].as_array().unwrap().len(), 1);

    Ok(())
}
