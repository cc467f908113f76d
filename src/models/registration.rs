use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::{Loggable, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Registered,
    Approved,
    Cancelled,
    Attended,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Registered => "registered",
            RegistrationStatus::Approved => "approved",
            RegistrationStatus::Cancelled => "cancelled",
            RegistrationStatus::Attended => "attended",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "registered" => Some(RegistrationStatus::Registered),
            "approved" => Some(RegistrationStatus::Approved),
            "cancelled" => Some(RegistrationStatus::Cancelled),
            "attended" => Some(RegistrationStatus::Attended),
            _ => None,
        }
    }

    /// Admin-driven transitions. Reactivation (cancelled -> registered) goes
    /// through `register`, not here; attended is terminal.
    pub fn can_transition(self, to: RegistrationStatus) -> bool {
        use RegistrationStatus::*;
        matches!(
            (self, to),
            (Registered, Approved) | (Registered, Cancelled) | (Approved, Cancelled) | (Approved, Attended)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Free,
    Paid,
    Pending,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Free => "free",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Pending => "pending",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "free" => Some(PaymentStatus::Free),
            "paid" => Some(PaymentStatus::Paid),
            "pending" => Some(PaymentStatus::Pending),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EventRegistration {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub attendee_name: String,
    pub attendee_email: String,
    pub attendee_phone: Option<String>,
    pub attendee_company: Option<String>,
    pub status: RegistrationStatus,
    pub payment_status: PaymentStatus,
    pub registered_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for EventRegistration {
    fn entity_type() -> &'static str { "registration" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Important }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbEventRegistration {
    pub id: String,
    pub event_id: String,
    pub user_id: String,
    pub attendee_name: String,
    pub attendee_email: String,
    pub attendee_phone: Option<String>,
    pub attendee_company: Option<String>,
    pub status: String,
    pub payment_status: String,
    pub registered_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbEventRegistration> for EventRegistration {
    type Error = AppError;

    fn try_from(value: DbEventRegistration) -> Result<Self, Self::Error> {
        Ok(EventRegistration {
            id: Uuid::parse_str(&value.id)
                .map_err(|err| AppError::internal(format!("invalid registration id: {err}")))?,
            event_id: Uuid::parse_str(&value.event_id)
                .map_err(|err| AppError::internal(format!("invalid event id: {err}")))?,
            user_id: Uuid::parse_str(&value.user_id)
                .map_err(|err| AppError::internal(format!("invalid user id: {err}")))?,
            attendee_name: value.attendee_name,
            attendee_email: value.attendee_email,
            attendee_phone: value.attendee_phone,
            attendee_company: value.attendee_company,
            status: RegistrationStatus::parse(&value.status)
                .ok_or_else(|| AppError::internal("invalid registration status"))?,
            payment_status: PaymentStatus::parse(&value.payment_status)
                .ok_or_else(|| AppError::internal("invalid payment status"))?,
            registered_at: value.registered_at,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

/// Contact snapshot captured at registration time, independent of the
/// user's current profile.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AttendeeInfo {
    #[schema(example = "Ada Lovelace")]
    pub name: String,
    #[schema(example = "ada@example.com")]
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegistrationStatusRequest {
    pub status: RegistrationStatus,
}

/// Roster row: registration joined with minimal user identity. Admin-only.
#[derive(Debug, Serialize, ToSchema)]
pub struct RosterEntry {
    #[serde(flatten)]
    pub registration: EventRegistration,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
}

/// A user's registration joined with the underlying event, tolerating the
/// event having been deleted.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserRegistration {
    #[serde(flatten)]
    pub registration: EventRegistration,
    pub event_slug: Option<String>,
    pub event_title: Option<String>,
}
