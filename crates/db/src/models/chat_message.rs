use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use utils::pagination::{Page, Pagination};
use uuid::Uuid;

use crate::listing::fetch_page;

/// A message in a garden's chat room. The room id is the garden id.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub garden_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

const COLUMNS: &str = "id, garden_id, sender_id, content, created_at";

impl ChatMessage {
    pub async fn create(
        pool: &SqlitePool,
        garden_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ChatMessage>(&format!(
            r#"INSERT INTO chat_messages (id, garden_id, sender_id, content, created_at)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING {COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(garden_id)
        .bind(sender_id)
        .bind(content)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    /// Room history, oldest first.
    pub async fn list_for_garden(
        pool: &SqlitePool,
        garden_id: Uuid,
        pagination: &Pagination,
    ) -> Result<Page<Self>, sqlx::Error> {
        fetch_page(
            pool,
            "chat_messages",
            COLUMNS,
            |qb| {
                qb.push(" WHERE garden_id = ").push_bind(garden_id);
            },
            pagination,
        )
        .await
    }
}
