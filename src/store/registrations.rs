use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::errors::{conflict_on_unique, AppError, AppResult};
use crate::models::registration::{
    AttendeeInfo, DbEventRegistration, EventRegistration, RegistrationStatus, RosterEntry,
    UserRegistration,
};
use crate::utils::utc_now;

const REGISTRATION_COLUMNS: &str = "id, event_id, user_id, attendee_name, attendee_email, \
     attendee_phone, attendee_company, status, payment_status, registered_at, created_at, updated_at";

/// Register a user for an event post.
///
/// An active (non-cancelled) prior registration is a conflict; a cancelled
/// one is reactivated in place (same row id) so downstream references
/// (analytics, mail threads) stay stable. The duplicate check is an
/// optimization: the partial unique index on (event_id, user_id) where
/// status != 'cancelled' is the real enforcement point, and a race that
/// slips past the check surfaces as the same Conflict.
pub async fn register(
    pool: &SqlitePool,
    event_id: Uuid,
    user_id: Uuid,
    attendee: &AttendeeInfo,
) -> AppResult<EventRegistration> {
    ensure_event_post(pool, event_id).await?;

    let existing = sqlx::query_as::<_, DbEventRegistration>(&format!(
        "SELECT {REGISTRATION_COLUMNS} FROM event_registrations \
         WHERE event_id = ? AND user_id = ? ORDER BY created_at DESC LIMIT 1"
    ))
    .bind(event_id.to_string())
    .bind(user_id.to_string())
    .fetch_optional(pool)
    .await?;

    let now = utc_now();

    if let Some(row) = existing {
        if row.status != "cancelled" {
            return Err(AppError::conflict("already registered for this event"));
        }

        // Reactivation: reset status, refresh the snapshot and the
        // registered_at marker, keep the id.
        sqlx::query(
            "UPDATE event_registrations SET status = 'registered', attendee_name = ?, \
             attendee_email = ?, attendee_phone = ?, attendee_company = ?, registered_at = ?, \
             updated_at = ? WHERE id = ?",
        )
        .bind(&attendee.name)
        .bind(&attendee.email)
        .bind(&attendee.phone)
        .bind(&attendee.company)
        .bind(now)
        .bind(now)
        .bind(&row.id)
        .execute(pool)
        .await
        .map_err(|err| conflict_on_unique(err, "already registered for this event"))?;

        let id = Uuid::parse_str(&row.id)
            .map_err(|err| AppError::internal(format!("invalid registration id: {err}")))?;
        return get_registration(pool, id).await;
    }

    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO event_registrations (id, event_id, user_id, attendee_name, attendee_email, \
         attendee_phone, attendee_company, status, payment_status, registered_at, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, 'registered', 'free', ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(event_id.to_string())
    .bind(user_id.to_string())
    .bind(&attendee.name)
    .bind(&attendee.email)
    .bind(&attendee.phone)
    .bind(&attendee.company)
    .bind(now)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .map_err(|err| conflict_on_unique(err, "already registered for this event"))?;

    get_registration(pool, id).await
}

pub async fn get_registration(pool: &SqlitePool, id: Uuid) -> AppResult<EventRegistration> {
    let row = sqlx::query_as::<_, DbEventRegistration>(&format!(
        "SELECT {REGISTRATION_COLUMNS} FROM event_registrations WHERE id = ?"
    ))
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("registration not found"))?;

    row.try_into()
}

/// Cancel a registration. Permitted for the registering user or an admin
/// caller; no-op-safe when already cancelled.
pub async fn cancel(
    pool: &SqlitePool,
    registration_id: Uuid,
    actor_id: Uuid,
    actor_is_admin: bool,
) -> AppResult<EventRegistration> {
    let registration = get_registration(pool, registration_id).await?;

    if registration.user_id != actor_id && !actor_is_admin {
        return Err(AppError::forbidden("not your registration"));
    }

    if registration.status == RegistrationStatus::Cancelled {
        return Ok(registration);
    }

    if !registration.status.can_transition(RegistrationStatus::Cancelled) {
        return Err(AppError::validation(
            "status",
            format!("cannot cancel a registration in status '{}'", registration.status.as_str()),
        ));
    }

    update_status(pool, registration_id, RegistrationStatus::Cancelled).await
}

/// Admin transition (approve / mark attended / cancel). Reactivation is not
/// reachable here; it goes through `register`.
pub async fn set_status(
    pool: &SqlitePool,
    registration_id: Uuid,
    status: RegistrationStatus,
) -> AppResult<EventRegistration> {
    let registration = get_registration(pool, registration_id).await?;

    if registration.status == status {
        return Ok(registration);
    }

    if !registration.status.can_transition(status) {
        return Err(AppError::validation(
            "status",
            format!(
                "cannot move registration from '{}' to '{}'",
                registration.status.as_str(),
                status.as_str()
            ),
        ));
    }

    update_status(pool, registration_id, status).await
}

async fn update_status(
    pool: &SqlitePool,
    registration_id: Uuid,
    status: RegistrationStatus,
) -> AppResult<EventRegistration> {
    sqlx::query("UPDATE event_registrations SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(utc_now())
        .bind(registration_id.to_string())
        .execute(pool)
        .await?;

    get_registration(pool, registration_id).await
}

#[derive(FromRow)]
struct DbRosterRow {
    #[sqlx(flatten)]
    registration: DbEventRegistration,
    user_name: Option<String>,
    user_email: Option<String>,
}

/// Roster for an event, joined with minimal user identity. Handlers gate
/// this behind event.manage; it is never served to other callers.
pub async fn list_for_event(pool: &SqlitePool, event_id: Uuid) -> AppResult<Vec<RosterEntry>> {
    ensure_event_post(pool, event_id).await?;

    let rows = sqlx::query_as::<_, DbRosterRow>(
        "SELECT r.id, r.event_id, r.user_id, r.attendee_name, r.attendee_email, r.attendee_phone, \
         r.attendee_company, r.status, r.payment_status, r.registered_at, r.created_at, r.updated_at, \
         u.name AS user_name, u.email AS user_email \
         FROM event_registrations r \
         LEFT JOIN users u ON u.id = r.user_id AND u.deleted_at IS NULL \
         WHERE r.event_id = ? ORDER BY r.registered_at",
    )
    .bind(event_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(RosterEntry {
                registration: row.registration.try_into()?,
                user_name: row.user_name,
                user_email: row.user_email,
            })
        })
        .collect()
}

#[derive(FromRow)]
struct DbUserRegistrationRow {
    #[sqlx(flatten)]
    registration: DbEventRegistration,
    event_slug: Option<String>,
    event_title: Option<String>,
}

/// A user's registrations with the underlying event attached. LEFT JOIN so
/// a registration whose event is gone still lists with a null event
/// reference instead of erroring.
pub async fn list_for_user(pool: &SqlitePool, user_id: Uuid) -> AppResult<Vec<UserRegistration>> {
    let rows = sqlx::query_as::<_, DbUserRegistrationRow>(
        "SELECT r.id, r.event_id, r.user_id, r.attendee_name, r.attendee_email, r.attendee_phone, \
         r.attendee_company, r.status, r.payment_status, r.registered_at, r.created_at, r.updated_at, \
         p.slug AS event_slug, \
         (SELECT t.title FROM post_translations t \
            WHERE t.post_id = p.id AND t.locale = p.primary_locale) AS event_title \
         FROM event_registrations r \
         LEFT JOIN posts p ON p.id = r.event_id \
         WHERE r.user_id = ? ORDER BY r.registered_at DESC",
    )
    .bind(user_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(UserRegistration {
                registration: row.registration.try_into()?,
                event_slug: row.event_slug,
                event_title: row.event_title,
            })
        })
        .collect()
}

async fn ensure_event_post(pool: &SqlitePool, event_id: Uuid) -> AppResult<()> {
    let post_type: Option<String> = sqlx::query_scalar("SELECT post_type FROM posts WHERE id = ?")
        .bind(event_id.to_string())
        .fetch_optional(pool)
        .await?;

    match post_type.as_deref() {
        Some("event") => Ok(()),
        Some(_) => Err(AppError::not_found("post is not an event")),
        None => Err(AppError::not_found("event not found")),
    }
}
