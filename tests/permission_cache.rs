mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::{register_user, request, set_role, spawn_app};

/// A role change written straight to the store (bypassing the API, as a
/// second instance's write would) is NOT visible until the TTL expires:
/// the accepted, bounded staleness window of the process-local cache.
#[tokio::test]
async fn direct_store_changes_stay_stale_within_ttl() -> Result<()> {
    let test_app = spawn_app().await?;
    let (user_id, token) = register_user(&test_app.app, "Member", "member@example.com").await?;

    // Prime the cache: member lacks news.create
    let create_body = json!({
        "post_type": "news",
        "translations": [{ "locale": "ko", "title": "뉴스" }]
    });
    let response = request(&test_app.app, "POST", "/api/posts", Some(&token), Some(create_body.clone()))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Promote without telling this instance
    set_role(&test_app.pool, user_id, "admin").await?;

    // Still forbidden: the cached grant set is served until the TTL runs out
    let response = request(&test_app.app, "POST", "/api/posts", Some(&token), Some(create_body))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    Ok(())
}

/// Membership edits through the ACL surface invalidate the cache on this
/// instance, so the new grants apply on the very next request.
#[tokio::test]
async fn api_membership_edit_invalidates_immediately() -> Result<()> {
    let test_app = spawn_app().await?;
    let (admin_id, admin_token) = register_user(&test_app.app, "Admin", "admin@example.com").await?;
    set_role(&test_app.pool, admin_id, "admin").await?;

    let (user_id, token) = register_user(&test_app.app, "Writer", "writer@example.com").await?;

    let create_body = json!({
        "post_type": "news",
        "translations": [{ "locale": "ko", "title": "뉴스" }]
    });

    // Prime the cache with the member grant set
    let response = request(&test_app.app, "POST", "/api/posts", Some(&token), Some(create_body.clone()))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Promote through the API: clears the user's cache entry
    let response = request(
        &test_app.app,
        "PUT",
        &format!("/api/acl/users/{user_id}/membership"),
        Some(&admin_token),
        Some(json!({ "role_code": "editor" })),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = request(&test_app.app, "POST", "/api/posts", Some(&token), Some(create_body))
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);

    Ok(())
}

/// Demotion through the API takes effect immediately as well: the bounded
/// staleness window only applies to writes that bypass invalidation.
#[tokio::test]
async fn demotion_through_api_applies_immediately() -> Result<()> {
    let test_app = spawn_app().await?;
    let (admin_id, admin_token) = register_user(&test_app.app, "Admin", "admin@example.com").await?;
    set_role(&test_app.pool, admin_id, "admin").await?;

    let (editor_id, editor_token) =
        register_user(&test_app.app, "Editor", "editor@example.com").await?;

    let response = request(
        &test_app.app,
        "PUT",
        &format!("/api/acl/users/{editor_id}/membership"),
        Some(&admin_token),
        Some(json!({ "role_code": "editor" })),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let create_body = json!({
        "post_type": "news",
        "translations": [{ "locale": "ko", "title": "에디터 뉴스" }]
    });
    let response = request(
        &test_app.app,
        "POST",
        "/api/posts",
        Some(&editor_token),
        Some(create_body.clone()),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = request(
        &test_app.app,
        "PUT",
        &format!("/api/acl/users/{editor_id}/membership"),
        Some(&admin_token),
        Some(json!({ "role_code": "member" })),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = request(
        &test_app.app,
        "POST",
        "/api/posts",
        Some(&editor_token),
        Some(create_body),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    Ok(())
}
