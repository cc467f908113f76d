use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use uuid::Uuid;

pub mod loggable;
pub use loggable::{Loggable, Severity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    pub severity: Severity,
    pub payload: Value,
}

pub type EventBus = broadcast::Sender<DomainEvent>;

pub fn init_event_bus() -> (EventBus, broadcast::Receiver<DomainEvent>) {
    broadcast::channel(1024)
}

/// Emit an activity event for any entity implementing `Loggable`.
/// Fire and forget: logging failures must not break the API path.
pub fn log_activity<T: Loggable>(
    event_bus: &EventBus,
    action: &str,
    actor_id: Option<Uuid>,
    entity: &T,
) {
    let event = DomainEvent {
        id: Uuid::new_v4(),
        name: format!("{}.{}", T::entity_type(), action),
        occurred_at: Utc::now(),
        actor_id,
        subject_id: Some(entity.subject_id()),
        severity: entity.severity_for_action(action),
        payload: serde_json::to_value(entity).unwrap_or_default(),
    };

    let _ = event_bus.send(event);
}

/// Background projection of domain events into the activity_log table.
pub async fn start_activity_listener(mut rx: broadcast::Receiver<DomainEvent>, pool: SqlitePool) {
    tracing::info!("activity listener started");
    while let Ok(event) = rx.recv().await {
        let description = describe(&event.name);
        let properties = serde_json::to_string(&event.payload).unwrap_or_default();

        let result = sqlx::query(
            "INSERT INTO activity_log (id, event_name, description, actor_id, subject_id, occurred_at, properties, severity) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(event.id.to_string())
        .bind(&event.name)
        .bind(description)
        .bind(event.actor_id.map(|id| id.to_string()))
        .bind(event.subject_id.map(|id| id.to_string()))
        .bind(event.occurred_at)
        .bind(&properties)
        .bind(event.severity.as_str())
        .execute(&pool)
        .await;

        if let Err(err) = result {
            tracing::error!(error = %err, event = %event.name, "failed to save activity log");
        }
    }
}

fn describe(event_name: &str) -> &'static str {
    match event_name {
        "post.created" => "Post created",
        "post.updated" => "Post updated",
        "post.deleted" => "Post deleted",
        "registration.created" => "Event registration created",
        "registration.updated" => "Event registration updated",
        "membership.updated" => "Membership changed",
        "user.registered" => "New user registered",
        _ => "System event",
    }
}
