use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, patch, post, put};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{seed, PermissionCache, PermissionEngine};
use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::routes::{acl, auth, health, posts, registrations};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub authz: PermissionEngine,
    pub event_bus: EventBus,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, authz: PermissionEngine, event_bus: EventBus) -> Self {
        Self {
            pool,
            jwt: Arc::new(jwt),
            authz,
            event_bus,
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;

    // The ACL seed is idempotent; running it at every startup keeps the
    // catalog current after deploys that add permissions.
    seed::seed(&pool).await?;

    let authz = PermissionEngine::new(pool.clone(), PermissionCache::from_env());

    let (event_bus, event_rx) = init_event_bus();
    tokio::spawn(start_activity_listener(event_rx, pool.clone()));

    let state = AppState::new(pool, jwt_config, authz, event_bus);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout));

    let post_routes = Router::new()
        .route("/", get(posts::list_posts).post(posts::create_post))
        .route(
            "/:id",
            get(posts::get_post)
                .patch(posts::update_post)
                .delete(posts::delete_post),
        )
        .route("/:id/translations", post(posts::upsert_translation))
        .route("/:id/meta", get(posts::get_meta).post(posts::set_meta))
        .route("/:id/meta/increment", post(posts::increment_meta))
        .route("/:id/register", post(posts::register_for_event))
        .route("/:id/registrations", get(posts::list_event_registrations));

    let registration_routes = Router::new()
        .route("/:id/cancel", post(registrations::cancel))
        .route("/:id/status", patch(registrations::set_status));

    let acl_routes = Router::new()
        .route("/roles", get(acl::list_roles))
        .route("/permissions", get(acl::list_permissions))
        .route("/users/:user_id/permissions", get(acl::effective_permissions))
        .route("/users/:user_id/membership", put(acl::set_membership))
        .route("/seed", post(acl::reseed));

    let router = Router::new()
        .route("/health", get(health::health))
        .nest("/auth", auth_routes)
        .nest("/api/posts", post_routes)
        .nest("/api/registrations", registration_routes)
        .route("/api/me/registrations", get(registrations::my_registrations))
        .nest("/api/acl", acl_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
