use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use utils::pagination::{Page, Pagination};
use uuid::Uuid;

use crate::listing::fetch_page;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize, EnumString, Display, Default,
)]
#[sqlx(type_name = "document_category", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DocumentCategory {
    Rules,
    Minutes,
    Guide,
    Form,
    Media,
    #[default]
    Other,
}

/// A garden document or media item. The file itself lives at `url`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub garden_id: Uuid,
    pub uploaded_by: Uuid,
    pub title: String,
    pub url: String,
    pub category: DocumentCategory,
    pub mime_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDocument {
    pub title: String,
    pub url: String,
    pub category: Option<DocumentCategory>,
    pub mime_type: Option<String>,
}

const COLUMNS: &str = "id, garden_id, uploaded_by, title, url, category, mime_type, created_at";

pub const SORTABLE: &[&str] = &["title", "category", "created_at"];

impl Document {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Document>(&format!("SELECT {COLUMNS} FROM documents WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_garden(
        pool: &SqlitePool,
        garden_id: Uuid,
        category: Option<DocumentCategory>,
        pagination: &Pagination,
    ) -> Result<Page<Self>, sqlx::Error> {
        fetch_page(
            pool,
            "documents",
            COLUMNS,
            |qb| {
                qb.push(" WHERE garden_id = ").push_bind(garden_id);
                if let Some(category) = category {
                    qb.push(" AND category = ").push_bind(category);
                }
            },
            pagination,
        )
        .await
    }

    pub async fn create(
        pool: &SqlitePool,
        garden_id: Uuid,
        uploaded_by: Uuid,
        data: &CreateDocument,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Document>(&format!(
            r#"INSERT INTO documents (id, garden_id, uploaded_by, title, url, category, mime_type, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               RETURNING {COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(garden_id)
        .bind(uploaded_by)
        .bind(&data.title)
        .bind(&data.url)
        .bind(data.category.unwrap_or_default())
        .bind(&data.mime_type)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
