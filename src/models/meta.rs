use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::errors::AppError;

/// The persisted meta-key catalog. This is the contract between writers and
/// readers; `set_meta` rejects keys outside it.
pub const META_KEYS: &[&str] = &[
    "news.category",
    "news.viewCount",
    "news.images",
    "event.eventDate",
    "event.endDate",
    "event.registrationDeadline",
    "event.location",
    "event.category",
    "event.eventType",
    "event.capacity",
    "event.fee",
    "event.isPublic",
    "event.requiresApproval",
    "event.speakers",
    "event.program",
    "event.images",
    "resource.category",
    "resource.fileUrl",
    "resource.fileName",
    "resource.fileSize",
    "resource.fileType",
    "resource.accessLevel",
    "resource.downloadCount",
];

pub const EVENT_DATE_KEY: &str = "event.eventDate";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaKind {
    Text,
    Number,
    Bool,
    Timestamp,
    Json,
}

/// Storage kind for a catalog key, decided by the field-name suffix.
/// Returns `None` for keys outside the catalog.
pub fn kind_for_key(key: &str) -> Option<MetaKind> {
    if !META_KEYS.contains(&key) {
        return None;
    }

    let field = key.rsplit('.').next().unwrap_or(key);
    let kind = if field.ends_with("Count") || matches!(field, "capacity" | "fee" | "fileSize") {
        MetaKind::Number
    } else if matches!(field, "eventDate" | "endDate" | "registrationDeadline") {
        MetaKind::Timestamp
    } else if matches!(field, "isPublic" | "requiresApproval") {
        MetaKind::Bool
    } else if matches!(field, "images" | "speakers" | "program") {
        MetaKind::Json
    } else {
        MetaKind::Text
    };

    Some(kind)
}

/// A meta value at the application boundary. Exactly one typed column holds
/// it at the storage edge.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Json(Value),
}

impl MetaValue {
    /// Coerce an API-supplied JSON value into the kind the catalog declares
    /// for `key`. Unknown keys and kind mismatches are validation errors.
    pub fn from_json(key: &str, value: &Value) -> Result<Self, AppError> {
        let kind = kind_for_key(key)
            .ok_or_else(|| AppError::validation("key", format!("unknown meta key '{key}'")))?;

        match kind {
            MetaKind::Text => value
                .as_str()
                .map(|s| MetaValue::Text(s.to_string()))
                .ok_or_else(|| AppError::validation("value", format!("'{key}' expects a string"))),
            MetaKind::Number => value
                .as_f64()
                .map(MetaValue::Number)
                .ok_or_else(|| AppError::validation("value", format!("'{key}' expects a number"))),
            MetaKind::Bool => value
                .as_bool()
                .map(MetaValue::Bool)
                .ok_or_else(|| AppError::validation("value", format!("'{key}' expects a boolean"))),
            MetaKind::Timestamp => value
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| MetaValue::Timestamp(dt.with_timezone(&Utc)))
                .ok_or_else(|| {
                    AppError::validation("value", format!("'{key}' expects an RFC3339 timestamp"))
                }),
            MetaKind::Json => Ok(MetaValue::Json(value.clone())),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            MetaValue::Text(s) => Value::String(s.clone()),
            MetaValue::Number(n) => serde_json::json!(n),
            MetaValue::Bool(b) => Value::Bool(*b),
            MetaValue::Timestamp(ts) => Value::String(ts.to_rfc3339()),
            MetaValue::Json(v) => v.clone(),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbPostMeta {
    pub id: String,
    pub post_id: String,
    pub key: String,
    pub value_text: Option<String>,
    pub value_number: Option<f64>,
    pub value_bool: Option<bool>,
    pub value_timestamp: Option<DateTime<Utc>>,
    pub value_json: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbPostMeta {
    /// Read back whichever typed column is populated.
    pub fn value(&self) -> Result<MetaValue, AppError> {
        if let Some(ref s) = self.value_text {
            return Ok(MetaValue::Text(s.clone()));
        }
        if let Some(n) = self.value_number {
            return Ok(MetaValue::Number(n));
        }
        if let Some(b) = self.value_bool {
            return Ok(MetaValue::Bool(b));
        }
        if let Some(ts) = self.value_timestamp {
            return Ok(MetaValue::Timestamp(ts));
        }
        if let Some(ref raw) = self.value_json {
            let value: Value = serde_json::from_str(raw)
                .map_err(|err| AppError::internal(format!("invalid meta json: {err}")))?;
            return Ok(MetaValue::Json(value));
        }
        Err(AppError::internal(format!(
            "meta row '{}' has no populated value column",
            self.key
        )))
    }
}

/// API shape for one meta entry.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MetaEntry {
    pub key: String,
    #[schema(value_type = Object)]
    pub value: Value,
}

impl TryFrom<DbPostMeta> for MetaEntry {
    type Error = AppError;

    fn try_from(row: DbPostMeta) -> Result<Self, Self::Error> {
        let value = row.value()?.to_json();
        Ok(MetaEntry { key: row.key, value })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MetaUpsertRequest {
    #[schema(example = "event.location")]
    pub key: String,
    #[schema(value_type = Object)]
    pub value: Value,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MetaIncrementRequest {
    #[schema(example = "news.viewCount")]
    pub key: String,
    #[schema(example = 1)]
    pub amount: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MetaIncrementResponse {
    pub key: String,
    pub value: f64,
}
