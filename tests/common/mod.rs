#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt;
use uuid::Uuid;

pub struct TestApp {
    // Keeps the database file alive for the duration of the test.
    pub _dir: TempDir,
    pub pool: SqlitePool,
    pub app: Router,
}

pub async fn spawn_app() -> Result<TestApp> {
    let dir = tempfile::tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test.db");

    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"),
    )
    .await?;
    migrator.run(&pool).await?;

    std::env::set_var("JWT_SECRET", "test-secret");
    let app = chamber::create_app(pool.clone()).await?;

    Ok(TestApp {
        _dir: dir,
        pool,
        app,
    })
}

pub async fn request(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Result<Response> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }

    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?,
        None => builder.body(Body::empty())?,
    };

    Ok(app.clone().oneshot(request).await?)
}

pub async fn body_json(response: Response) -> Result<Value> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Register a user through the API; returns (user_id, bearer token).
pub async fn register_user(app: &Router, name: &str, email: &str) -> Result<(Uuid, String)> {
    let response = request(
        app,
        "POST",
        "/auth/register",
        None,
        Some(json!({
            "name": name,
            "email": email,
            "password": "password123"
        })),
    )
    .await?;

    anyhow::ensure!(
        response.status() == 201,
        "registration failed with {}",
        response.status()
    );

    let body = body_json(response).await?;
    let token = body["token"].as_str().context("token missing")?.to_string();
    let user_id = Uuid::parse_str(body["user"]["id"].as_str().context("user id missing")?)?;
    Ok((user_id, token))
}

/// Flip the user's membership role directly in the store. Deliberately does
/// NOT touch the permission cache, so tests can observe the staleness
/// window; API-driven membership edits clear it.
pub async fn set_role(pool: &SqlitePool, user_id: Uuid, role_code: &str) -> Result<()> {
    sqlx::query(
        "UPDATE user_memberships SET role_id = (SELECT id FROM roles WHERE code = ?) WHERE user_id = ?",
    )
    .bind(role_code)
    .bind(user_id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_tier(pool: &SqlitePool, user_id: Uuid, tier_code: &str) -> Result<()> {
    sqlx::query(
        "UPDATE user_memberships SET tier_id = (SELECT id FROM tiers WHERE code = ?) WHERE user_id = ?",
    )
    .bind(tier_code)
    .bind(user_id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Create a published post through the API as the given (sufficiently
/// privileged) caller and return its id.
pub async fn create_published_post(
    app: &Router,
    token: &str,
    post_type: &str,
    slug: &str,
    title: &str,
) -> Result<Uuid> {
    let response = request(
        app,
        "POST",
        "/api/posts",
        Some(token),
        Some(json!({
            "post_type": post_type,
            "slug": slug,
            "translations": [{ "locale": "ko", "title": title }]
        })),
    )
    .await?;
    anyhow::ensure!(
        response.status() == 201,
        "post creation failed with {}",
        response.status()
    );
    let body = body_json(response).await?;
    let id = Uuid::parse_str(body["id"].as_str().context("post id missing")?)?;

    let response = request(
        app,
        "PATCH",
        &format!("/api/posts/{id}"),
        Some(token),
        Some(json!({ "status": "published" })),
    )
    .await?;
    anyhow::ensure!(
        response.status() == 200,
        "publishing failed with {}",
        response.status()
    );

    Ok(id)
}
