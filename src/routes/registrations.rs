use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::keys;
use crate::errors::AppResult;
use crate::events::log_activity;
use crate::jwt::AuthUser;
use crate::models::registration::{
    EventRegistration, RegistrationStatusRequest, UserRegistration,
};
use crate::store::registrations;

#[utoipa::path(
    post,
    path = "/api/registrations/{id}/cancel",
    tag = "Registrations",
    params(("id" = Uuid, Path, description = "Registration id")),
    responses(
        (status = 200, description = "Cancelled (no-op when already cancelled)", body = EventRegistration),
        (status = 403, description = "Not the registrant and not an event manager")
    ),
    security(("bearerAuth" = []))
)]
pub async fn cancel(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<EventRegistration>> {
    let is_admin = state
        .authz
        .has_permission(auth.user_id, keys::EVENT_MANAGE)
        .await?;

    let registration = registrations::cancel(&state.pool, id, auth.user_id, is_admin).await?;

    log_activity(&state.event_bus, "updated", Some(auth.user_id), &registration);

    Ok(Json(registration))
}

#[utoipa::path(
    patch,
    path = "/api/registrations/{id}/status",
    tag = "Registrations",
    params(("id" = Uuid, Path, description = "Registration id")),
    request_body = RegistrationStatusRequest,
    responses(
        (status = 200, description = "Status advanced", body = EventRegistration),
        (status = 400, description = "Transition not allowed by the state machine")
    ),
    security(("bearerAuth" = []))
)]
pub async fn set_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<RegistrationStatusRequest>,
) -> AppResult<Json<EventRegistration>> {
    state.authz.require(auth.user_id, keys::EVENT_MANAGE).await?;

    let registration = registrations::set_status(&state.pool, id, payload.status).await?;

    log_activity(&state.event_bus, "updated", Some(auth.user_id), &registration);

    Ok(Json(registration))
}

#[utoipa::path(
    get,
    path = "/api/me/registrations",
    tag = "Registrations",
    responses((status = 200, description = "Caller's registrations with event context", body = [UserRegistration])),
    security(("bearerAuth" = []))
)]
pub async fn my_registrations(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<UserRegistration>>> {
    let items = registrations::list_for_user(&state.pool, auth.user_id).await?;
    Ok(Json(items))
}
