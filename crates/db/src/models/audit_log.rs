use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, SqlitePool, types::Json};
use utils::pagination::{Page, Pagination};
use uuid::Uuid;

use crate::listing::{Conditions, fetch_page};

/// Append-only record of a mutation.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    /// Dotted verb such as `garden.delete`.
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub details: Json<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAuditLog {
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub details: Value,
}

#[derive(Debug, Clone, Default)]
pub struct AuditLogFilter {
    pub actor_id: Option<Uuid>,
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
    pub action: Option<String>,
}

const COLUMNS: &str = "id, actor_id, action, entity_type, entity_id, details, created_at";

pub const SORTABLE: &[&str] = &["created_at", "action", "entity_type"];

impl AuditLog {
    pub async fn record(pool: &SqlitePool, entry: NewAuditLog) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, AuditLog>(&format!(
            r#"INSERT INTO audit_logs (id, actor_id, action, entity_type, entity_id, details, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING {COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(entry.actor_id)
        .bind(entry.action)
        .bind(entry.entity_type)
        .bind(entry.entity_id)
        .bind(Json(entry.details))
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn list(
        pool: &SqlitePool,
        filter: &AuditLogFilter,
        pagination: &Pagination,
    ) -> Result<Page<Self>, sqlx::Error> {
        fetch_page(
            pool,
            "audit_logs",
            COLUMNS,
            |qb| {
                let mut conditions = Conditions::default();
                if let Some(actor_id) = filter.actor_id {
                    conditions.next(qb);
                    qb.push("actor_id = ").push_bind(actor_id);
                }
                if let Some(entity_type) = &filter.entity_type {
                    conditions.next(qb);
                    qb.push("entity_type = ").push_bind(entity_type.clone());
                }
                if let Some(entity_id) = filter.entity_id {
                    conditions.next(qb);
                    qb.push("entity_id = ").push_bind(entity_id);
                }
                if let Some(action) = &filter.action {
                    conditions.next(qb);
                    qb.push("action = ").push_bind(action.clone());
                }
            },
            pagination,
        )
        .await
    }
}
