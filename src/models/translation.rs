use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::post::Locale;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Translation {
    pub id: Uuid,
    pub post_id: Uuid,
    pub locale: Locale,
    pub title: String,
    pub subtitle: Option<String>,
    pub excerpt: Option<String>,
    pub content: Option<String>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbTranslation {
    pub id: String,
    pub post_id: String,
    pub locale: String,
    pub title: String,
    pub subtitle: Option<String>,
    pub excerpt: Option<String>,
    pub content: Option<String>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbTranslation> for Translation {
    type Error = AppError;

    fn try_from(value: DbTranslation) -> Result<Self, Self::Error> {
        Ok(Translation {
            id: Uuid::parse_str(&value.id)
                .map_err(|err| AppError::internal(format!("invalid translation id: {err}")))?,
            post_id: Uuid::parse_str(&value.post_id)
                .map_err(|err| AppError::internal(format!("invalid post id: {err}")))?,
            locale: Locale::parse(&value.locale)
                .ok_or_else(|| AppError::internal("invalid locale"))?,
            title: value.title,
            subtitle: value.subtitle,
            excerpt: value.excerpt,
            content: value.content,
            seo_title: value.seo_title,
            seo_description: value.seo_description,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

/// Upsert payload for one locale. Title is the only required field; a post
/// need not carry every locale; readers fall back to the primary locale.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TranslationUpsertRequest {
    pub locale: Locale,
    #[schema(example = "2024 Annual General Meeting")]
    pub title: String,
    pub subtitle: Option<String>,
    pub excerpt: Option<String>,
    pub content: Option<String>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
}
