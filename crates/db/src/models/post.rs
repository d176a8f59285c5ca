use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, types::Json};
use utils::pagination::{Page, Pagination};
use uuid::Uuid;

use crate::listing::{Conditions, fetch_page, push_garden_visibility};

/// Community forum post, optionally scoped to one garden.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub garden_id: Option<Uuid>,
    pub title: String,
    pub content: String,
    pub tags: Json<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePost {
    pub garden_id: Option<Uuid>,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePost {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub garden_id: Option<Uuid>,
    pub author_id: Option<Uuid>,
    pub tag: Option<String>,
    /// Hide posts from private gardens this user does not belong to.
    pub visible_to: Option<Uuid>,
}

const COLUMNS: &str = "id, author_id, garden_id, title, content, tags, created_at, updated_at";

pub const SORTABLE: &[&str] = &["title", "created_at", "updated_at"];

fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

impl Post {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Post>(&format!("SELECT {COLUMNS} FROM posts WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(
        pool: &SqlitePool,
        filter: &PostFilter,
        pagination: &Pagination,
    ) -> Result<Page<Self>, sqlx::Error> {
        fetch_page(
            pool,
            "posts",
            COLUMNS,
            |qb| {
                let mut conditions = Conditions::default();
                if let Some(user_id) = filter.visible_to {
                    conditions.next(qb);
                    push_garden_visibility(qb, user_id);
                }
                if let Some(garden_id) = filter.garden_id {
                    conditions.next(qb);
                    qb.push("garden_id = ").push_bind(garden_id);
                }
                if let Some(author_id) = filter.author_id {
                    conditions.next(qb);
                    qb.push("author_id = ").push_bind(author_id);
                }
                if let Some(tag) = &filter.tag {
                    conditions.next(qb);
                    qb.push("EXISTS (SELECT 1 FROM json_each(posts.tags) WHERE value = ")
                        .push_bind(tag.trim().to_lowercase())
                        .push(")");
                }
            },
            pagination,
        )
        .await
    }

    pub async fn create(
        pool: &SqlitePool,
        author_id: Uuid,
        data: &CreatePost,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Post>(&format!(
            r#"INSERT INTO posts (id, author_id, garden_id, title, content, tags, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
               RETURNING {COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(author_id)
        .bind(data.garden_id)
        .bind(&data.title)
        .bind(&data.content)
        .bind(Json(normalize_tags(&data.tags)))
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdatePost,
    ) -> Result<Self, sqlx::Error> {
        let existing = Self::find_by_id(pool, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        let tags = match &data.tags {
            Some(tags) => normalize_tags(tags),
            None => existing.tags.0.clone(),
        };

        sqlx::query_as::<_, Post>(&format!(
            r#"UPDATE posts SET title = $2, content = $3, tags = $4, updated_at = $5
               WHERE id = $1
               RETURNING {COLUMNS}"#
        ))
        .bind(id)
        .bind(data.title.as_ref().unwrap_or(&existing.title))
        .bind(data.content.as_ref().unwrap_or(&existing.content))
        .bind(Json(tags))
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_lowercased_and_deduplicated() {
        let tags = vec![
            " Compost ".to_string(),
            "compost".to_string(),
            String::new(),
            "Tomatoes".to_string(),
        ];
        assert_eq!(normalize_tags(&tags), vec!["compost", "tomatoes"]);
    }
}
