mod common;

use anyhow::Result;
use axum::http::StatusCode;
use chrono::{Duration, Utc};
use serde_json::json;

use common::{body_json, create_published_post, register_user, request, set_role, spawn_app};

/// The upcoming filter compares the event.eventDate meta timestamp against
/// wall-clock now: future-dated events are included, past ones excluded.
#[tokio::test]
async fn upcoming_filters_on_event_date_meta() -> Result<()> {
    let test_app = spawn_app().await?;
    let (admin_id, token) = register_user(&test_app.app, "Admin", "admin@example.com").await?;
    set_role(&test_app.pool, admin_id, "admin").await?;

    let future_event =
        create_published_post(&test_app.app, &token, "event", "future-event", "미래 행사").await?;
    let past_event =
        create_published_post(&test_app.app, &token, "event", "past-event", "지난 행사").await?;
    let undated_event =
        create_published_post(&test_app.app, &token, "event", "undated-event", "미정 행사").await?;

    let future_date = (Utc::now() + Duration::days(1)).to_rfc3339();
    let past_date = (Utc::now() - Duration::days(1)).to_rfc3339();

    for (id, date) in [(future_event, &future_date), (past_event, &past_date)] {
        let response = request(
            &test_app.app,
            "POST",
            &format!("/api/posts/{id}/meta"),
            Some(&token),
            Some(json!({ "key": "event.eventDate", "value": date })),
        )
        .await?;
        assert_eq!(response.status(), StatusCode::OK);
    }

    // upcoming=true keeps only the future-dated event; an event without a
    // date is not "upcoming"
    let response = request(
        &test_app.app,
        "GET",
        "/api/posts?post_type=event&upcoming=true",
        None,
        None,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await?;
    assert_eq!(body["total"], 1);
    assert_eq!(body["posts"][0]["slug"], "future-event");

    // Without the filter all three remain visible
    let response = request(&test_app.app, "GET", "/api/posts?post_type=event", None, None).await?;
    let body = body_json(response).await?;
    assert_eq!(body["total"], 3);

    // Anything except the literal "true" leaves the filter off
    let response = request(
        &test_app.app,
        "GET",
        "/api/posts?post_type=event&upcoming=1",
        None,
        None,
    )
    .await?;
    let body = body_json(response).await?;
    assert_eq!(body["total"], 3);

    // Moving the event date into the past drops it from the upcoming list
    let response = request(
        &test_app.app,
        "POST",
        &format!("/api/posts/{future_event}/meta"),
        Some(&token),
        Some(json!({ "key": "event.eventDate", "value": past_date })),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = request(
        &test_app.app,
        "GET",
        "/api/posts?post_type=event&upcoming=true",
        None,
        None,
    )
    .await?;
    let body = body_json(response).await?;
    assert_eq!(body["total"], 0);

    let _ = (past_event, undated_event);
    Ok(())
}
