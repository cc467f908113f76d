use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::models;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health,
        routes::auth::register,
        routes::auth::login,
        routes::auth::me,
        routes::auth::logout,
        routes::posts::list_posts,
        routes::posts::get_post,
        routes::posts::create_post,
        routes::posts::update_post,
        routes::posts::delete_post,
        routes::posts::upsert_translation,
        routes::posts::get_meta,
        routes::posts::set_meta,
        routes::posts::increment_meta,
        routes::posts::register_for_event,
        routes::posts::list_event_registrations,
        routes::registrations::cancel,
        routes::registrations::set_status,
        routes::registrations::my_registrations,
        routes::acl::list_roles,
        routes::acl::list_permissions,
        routes::acl::effective_permissions,
        routes::acl::set_membership,
        routes::acl::reseed
    ),
    components(
        schemas(
            models::user::User,
            models::user::AuthResponse,
            models::user::LoginRequest,
            models::user::RegisterRequest,
            models::post::Post,
            models::post::PostType,
            models::post::PostStatus,
            models::post::Visibility,
            models::post::Locale,
            models::post::PostCreateRequest,
            models::post::PostUpdateRequest,
            models::post::PostListResponse,
            models::post::PostWithTranslations,
            models::post::TranslationView,
            models::translation::Translation,
            models::translation::TranslationUpsertRequest,
            models::meta::MetaEntry,
            models::meta::MetaUpsertRequest,
            models::meta::MetaIncrementRequest,
            models::meta::MetaIncrementResponse,
            models::registration::EventRegistration,
            models::registration::RegistrationStatus,
            models::registration::PaymentStatus,
            models::registration::AttendeeInfo,
            models::registration::RegistrationStatusRequest,
            models::registration::RosterEntry,
            models::registration::UserRegistration,
            models::membership::Role,
            models::membership::Permission,
            models::membership::UserMembership,
            models::membership::MembershipView,
            models::membership::MembershipUpdateRequest,
            models::membership::EffectivePermissionsResponse,
            routes::health::HealthResponse
        )
    ),
    tags(
        (name = "Auth", description = "Authentication"),
        (name = "Posts", description = "Unified multilingual content"),
        (name = "Registrations", description = "Event registration"),
        (name = "ACL", description = "Roles, permissions and memberships"),
        (name = "Health", description = "Liveness")
    )
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
    let mut doc = serde_json::to_value(ApiDoc::openapi())?;

    ensure_security_components(&mut doc);
    ensure_servers(&mut doc, port);

    Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> Router {
    let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
        .try_it_out_enabled(true)
        .persist_authorization(true);

    let doc_json = Arc::new(serde_json::to_value(&doc).expect("OpenAPI serialization must succeed"));

    let json_route = {
        let doc_json = Arc::clone(&doc_json);
        get(move || {
            let doc_json = Arc::clone(&doc_json);
            async move { Json((*doc_json).clone()) }
        })
    };

    Router::new()
        .route("/api-docs/openapi.json", json_route)
        .merge(SwaggerUi::new("/docs").config(swagger_config))
}

fn ensure_security_components(doc: &mut Value) {
    let components = doc
        .as_object_mut()
        .expect("OpenAPI root must be an object")
        .entry("components")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .expect("components must be an object");

    let schemes = components
        .entry("securitySchemes")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .expect("securitySchemes must be an object");

    schemes.insert(
        "bearerAuth".to_string(),
        json!({
            "type": "http",
            "scheme": "bearer",
            "bearerFormat": "JWT"
        }),
    );
}

fn ensure_servers(doc: &mut Value, port: u16) {
    let server_url = format!("http://localhost:{port}");

    match doc.get_mut("servers") {
        Some(Value::Array(servers)) => {
            let present = servers
                .iter()
                .any(|entry| entry.get("url").and_then(Value::as_str) == Some(server_url.as_str()));
            if !present {
                servers.push(json!({ "url": server_url }));
            }
        }
        _ => {
            doc["servers"] = json!([{ "url": server_url }]);
        }
    }
}
