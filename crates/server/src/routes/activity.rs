//! Side records written alongside mutations: audit entries and notifications.
//!
//! Failures here are logged and swallowed so the primary operation still succeeds.

use db::models::{
    audit_log::{AuditLog, NewAuditLog},
    notification::{CreateNotification, Notification, NotificationKind},
};
use serde_json::Value;
use sqlx::SqlitePool;
use uuid::Uuid;

pub async fn record_audit(
    pool: &SqlitePool,
    actor_id: Uuid,
    action: &str,
    entity_type: &str,
    entity_id: Uuid,
    details: Value,
) {
    let entry = NewAuditLog {
        actor_id: Some(actor_id),
        action: action.to_string(),
        entity_type: entity_type.to_string(),
        entity_id: Some(entity_id),
        details,
    };
    if let Err(error) = AuditLog::record(pool, entry).await {
        tracing::warn!(?error, action, entity_type, %entity_id, "failed to write audit log");
    }
}

pub async fn notify(
    pool: &SqlitePool,
    user_id: Uuid,
    kind: NotificationKind,
    title: impl Into<String>,
    message: impl Into<String>,
    link: Option<String>,
) {
    let data = CreateNotification {
        user_id,
        title: title.into(),
        message: message.into(),
        kind: Some(kind),
        link,
    };
    if let Err(error) = Notification::create(pool, &data).await {
        tracing::warn!(?error, %user_id, "failed to create notification");
    }
}
