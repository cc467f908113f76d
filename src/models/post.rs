use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::meta::MetaEntry;
use crate::models::translation::Translation;

// =============================================================================
// DISCRIMINATORS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PostType {
    News,
    Event,
    Resource,
}

impl PostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostType::News => "news",
            PostType::Event => "event",
            PostType::Resource => "resource",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "news" => Some(PostType::News),
            "event" => Some(PostType::Event),
            "resource" => Some(PostType::Resource),
            _ => None,
        }
    }

    /// Permission key for an action on this content type, e.g. "event.update".
    pub fn permission(&self, action: &str) -> String {
        format!("{}.{}", self.as_str(), action)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Published,
    Archived,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
            PostStatus::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(PostStatus::Draft),
            "published" => Some(PostStatus::Published),
            "archived" => Some(PostStatus::Archived),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Members,
    Premium,
    Internal,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Members => "members",
            Visibility::Premium => "premium",
            Visibility::Internal => "internal",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "public" => Some(Visibility::Public),
            "members" => Some(Visibility::Members),
            "premium" => Some(Visibility::Premium),
            "internal" => Some(Visibility::Internal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    Ko,
    En,
    Zh,
}

impl Locale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Locale::Ko => "ko",
            Locale::En => "en",
            Locale::Zh => "zh",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ko" => Some(Locale::Ko),
            "en" => Some(Locale::En),
            "zh" => Some(Locale::Zh),
            _ => None,
        }
    }
}

// =============================================================================
// POST
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Post {
    pub id: Uuid,
    pub post_type: PostType,
    pub status: PostStatus,
    pub visibility: Visibility,
    pub slug: String,
    pub primary_locale: Locale,
    pub author_id: Option<Uuid>,
    pub cover_image_url: Option<String>,
    pub list_image_url: Option<String>,
    pub is_featured: bool,
    pub tags: Vec<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl crate::events::Loggable for Post {
    fn entity_type() -> &'static str { "post" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbPost {
    pub id: String,
    pub post_type: String,
    pub status: String,
    pub visibility: String,
    pub slug: String,
    pub primary_locale: String,
    pub author_id: Option<String>,
    pub cover_image_url: Option<String>,
    pub list_image_url: Option<String>,
    pub is_featured: bool,
    pub tags: String,
    pub published_at: Option<DateTime<Utc>>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbPost> for Post {
    type Error = AppError;

    fn try_from(value: DbPost) -> Result<Self, Self::Error> {
        let tags: Vec<String> = serde_json::from_str(&value.tags)
            .map_err(|err| AppError::internal(format!("invalid tags json: {err}")))?;

        Ok(Post {
            id: Uuid::parse_str(&value.id)
                .map_err(|err| AppError::internal(format!("invalid post id: {err}")))?,
            post_type: PostType::parse(&value.post_type)
                .ok_or_else(|| AppError::internal("invalid post_type"))?,
            status: PostStatus::parse(&value.status)
                .ok_or_else(|| AppError::internal("invalid status"))?,
            visibility: Visibility::parse(&value.visibility)
                .ok_or_else(|| AppError::internal("invalid visibility"))?,
            slug: value.slug,
            primary_locale: Locale::parse(&value.primary_locale)
                .ok_or_else(|| AppError::internal("invalid primary_locale"))?,
            author_id: value
                .author_id
                .map(|id| Uuid::parse_str(&id))
                .transpose()
                .map_err(|err| AppError::internal(format!("invalid author id: {err}")))?,
            cover_image_url: value.cover_image_url,
            list_image_url: value.list_image_url,
            is_featured: value.is_featured,
            tags,
            published_at: value.published_at,
            scheduled_at: value.scheduled_at,
            expires_at: value.expires_at,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

// =============================================================================
// REQUEST / RESPONSE SHAPES
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct PostCreateRequest {
    pub post_type: PostType,
    pub visibility: Option<Visibility>,
    /// Slug is derived from the primary translation's title when omitted.
    pub slug: Option<String>,
    pub primary_locale: Option<Locale>,
    pub cover_image_url: Option<String>,
    pub list_image_url: Option<String>,
    pub is_featured: Option<bool>,
    pub tags: Option<Vec<String>>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Initial translations, written in the same transaction as the post.
    #[serde(default)]
    pub translations: Vec<crate::models::translation::TranslationUpsertRequest>,
    /// Initial meta values keyed by catalog key, same transaction.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub meta: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PostUpdateRequest {
    pub status: Option<PostStatus>,
    pub visibility: Option<Visibility>,
    pub slug: Option<String>,
    pub primary_locale: Option<Locale>,
    pub cover_image_url: Option<String>,
    pub list_image_url: Option<String>,
    pub is_featured: Option<bool>,
    pub tags: Option<Vec<String>>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PostListResponse {
    pub posts: Vec<Post>,
    pub total: i64,
}

/// A post assembled with every translation and meta row. Admin UIs read all
/// locales at once; public display uses `display`, resolved with fallback.
#[derive(Debug, Serialize, ToSchema)]
pub struct PostWithTranslations {
    #[serde(flatten)]
    pub post: Post,
    pub translations: Vec<Translation>,
    pub meta: Vec<MetaEntry>,
    pub display: TranslationView,
}

/// Locale-resolved view of a post's text. Always usable: a post with no
/// translations at all degrades to its slug as title.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TranslationView {
    pub locale: Option<Locale>,
    pub title: String,
    pub subtitle: Option<String>,
    pub excerpt: String,
    pub content: String,
}

/// Locale fallback: requested locale, else the post's primary locale, else
/// the first available translation (callers pass rows ordered by creation),
/// else a degenerate view built from the slug.
pub fn resolve_translation(
    post: &Post,
    translations: &[Translation],
    requested: Option<Locale>,
) -> TranslationView {
    let pick = requested
        .and_then(|loc| translations.iter().find(|t| t.locale == loc))
        .or_else(|| translations.iter().find(|t| t.locale == post.primary_locale))
        .or_else(|| translations.first());

    match pick {
        Some(t) => TranslationView {
            locale: Some(t.locale),
            title: t.title.clone(),
            subtitle: t.subtitle.clone(),
            excerpt: t.excerpt.clone().unwrap_or_default(),
            content: t.content.clone().unwrap_or_default(),
        },
        None => TranslationView {
            locale: None,
            title: post.slug.clone(),
            subtitle: None,
            excerpt: String::new(),
            content: String::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(primary: Locale) -> Post {
        Post {
            id: Uuid::new_v4(),
            post_type: PostType::News,
            status: PostStatus::Published,
            visibility: Visibility::Public,
            slug: "annual-meeting".to_string(),
            primary_locale: primary,
            author_id: None,
            cover_image_url: None,
            list_image_url: None,
            is_featured: false,
            tags: vec![],
            published_at: None,
            scheduled_at: None,
            expires_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn translation(post_id: Uuid, locale: Locale, title: &str) -> Translation {
        Translation {
            id: Uuid::new_v4(),
            post_id,
            locale,
            title: title.to_string(),
            subtitle: None,
            excerpt: None,
            content: Some(format!("{title} body")),
            seo_title: None,
            seo_description: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn exact_locale_wins() {
        let p = post(Locale::Ko);
        let rows = vec![
            translation(p.id, Locale::Ko, "총회"),
            translation(p.id, Locale::En, "Meeting"),
        ];
        let view = resolve_translation(&p, &rows, Some(Locale::En));
        assert_eq!(view.title, "Meeting");
        assert_eq!(view.locale, Some(Locale::En));
    }

    #[test]
    fn falls_back_to_primary_locale() {
        let p = post(Locale::Ko);
        let rows = vec![
            translation(p.id, Locale::Ko, "총회"),
            translation(p.id, Locale::En, "Meeting"),
        ];
        let view = resolve_translation(&p, &rows, Some(Locale::Zh));
        assert_eq!(view.title, "총회");
    }

    #[test]
    fn falls_back_to_first_available_when_primary_missing() {
        let p = post(Locale::Ko);
        let rows = vec![
            translation(p.id, Locale::En, "Meeting"),
            translation(p.id, Locale::Zh, "会议"),
        ];
        let view = resolve_translation(&p, &rows, None);
        assert_eq!(view.title, "Meeting");
    }

    #[test]
    fn degenerate_fallback_uses_slug() {
        let p = post(Locale::Ko);
        let view = resolve_translation(&p, &[], Some(Locale::En));
        assert_eq!(view.title, "annual-meeting");
        assert_eq!(view.content, "");
        assert_eq!(view.excerpt, "");
        assert!(view.locale.is_none());
    }
}
