use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::{Loggable, Severity};

// =============================================================================
// TIER: paid membership level, catalog data independent of access control
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Tier {
    pub id: Uuid,
    pub code: String,
    pub name_ko: String,
    pub name_en: String,
    pub annual_fee: f64,
    pub benefits: Vec<String>,
    pub sort_order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbTier {
    pub id: String,
    pub code: String,
    pub name_ko: String,
    pub name_en: String,
    pub annual_fee: f64,
    pub benefits: String,
    pub sort_order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbTier> for Tier {
    type Error = AppError;

    fn try_from(value: DbTier) -> Result<Self, Self::Error> {
        Ok(Tier {
            id: Uuid::parse_str(&value.id)
                .map_err(|err| AppError::internal(format!("invalid tier id: {err}")))?,
            code: value.code,
            name_ko: value.name_ko,
            name_en: value.name_en,
            annual_fee: value.annual_fee,
            benefits: serde_json::from_str(&value.benefits)
                .map_err(|err| AppError::internal(format!("invalid benefits json: {err}")))?,
            sort_order: value.sort_order,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

// =============================================================================
// ROLE / PERMISSION
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Role {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Role {
    fn entity_type() -> &'static str { "role" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbRole {
    pub id: String,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbRole> for Role {
    type Error = AppError;

    fn try_from(value: DbRole) -> Result<Self, Self::Error> {
        Ok(Role {
            id: Uuid::parse_str(&value.id)
                .map_err(|err| AppError::internal(format!("invalid role id: {err}")))?,
            code: value.code,
            name: value.name,
            description: value.description,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Permission {
    pub id: Uuid,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Permission {
    fn entity_type() -> &'static str { "permission" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbPermission {
    pub id: String,
    pub key: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbPermission> for Permission {
    type Error = AppError;

    fn try_from(value: DbPermission) -> Result<Self, Self::Error> {
        Ok(Permission {
            id: Uuid::parse_str(&value.id)
                .map_err(|err| AppError::internal(format!("invalid permission id: {err}")))?,
            key: value.key,
            description: value.description,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

// =============================================================================
// USER MEMBERSHIP: binds a user to one tier and one role
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserMembership {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tier_id: Uuid,
    pub role_id: Uuid,
    pub is_active: bool,
    pub started_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for UserMembership {
    fn entity_type() -> &'static str { "membership" }
    fn subject_id(&self) -> Uuid { self.user_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbUserMembership {
    pub id: String,
    pub user_id: String,
    pub tier_id: String,
    pub role_id: String,
    pub is_active: bool,
    pub started_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbUserMembership> for UserMembership {
    type Error = AppError;

    fn try_from(value: DbUserMembership) -> Result<Self, Self::Error> {
        Ok(UserMembership {
            id: Uuid::parse_str(&value.id)
                .map_err(|err| AppError::internal(format!("invalid membership id: {err}")))?,
            user_id: Uuid::parse_str(&value.user_id)
                .map_err(|err| AppError::internal(format!("invalid user id: {err}")))?,
            tier_id: Uuid::parse_str(&value.tier_id)
                .map_err(|err| AppError::internal(format!("invalid tier id: {err}")))?,
            role_id: Uuid::parse_str(&value.role_id)
                .map_err(|err| AppError::internal(format!("invalid role id: {err}")))?,
            is_active: value.is_active,
            started_at: value.started_at,
            expires_at: value.expires_at,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

/// Active membership with tier/role codes resolved, as consumed by the
/// visibility rules and the admin UI.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MembershipView {
    #[serde(flatten)]
    pub membership: UserMembership,
    pub tier_code: String,
    pub role_code: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MembershipUpdateRequest {
    #[schema(example = "corporate")]
    pub tier_code: Option<String>,
    #[schema(example = "editor")]
    pub role_code: Option<String>,
    pub is_active: Option<bool>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EffectivePermissionsResponse {
    pub user_id: Uuid,
    pub role: Option<String>,
    pub permissions: Vec<String>,
}
