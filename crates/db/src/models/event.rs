use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;
use utils::pagination::{Page, Pagination};
use uuid::Uuid;

use crate::listing::{Conditions, fetch_page, push_garden_visibility};

#[derive(Debug, Error)]
pub enum EventError {
    #[error("event not found")]
    NotFound,
    #[error("event is at capacity")]
    Full,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    /// `None` for platform-wide events.
    pub garden_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub capacity: Option<i64>,
    pub created_by: Uuid,
    pub attendee_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn is_full(&self) -> bool {
        self.capacity
            .is_some_and(|capacity| self.attendee_count >= capacity)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateEvent {
    pub garden_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub capacity: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateEvent {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub capacity: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub garden_id: Option<Uuid>,
    /// Only events starting at or after this instant.
    pub starts_after: Option<DateTime<Utc>>,
    pub attendee_id: Option<Uuid>,
    /// Hide events from private gardens this user does not belong to.
    pub visible_to: Option<Uuid>,
}

const COLUMNS: &str = "id, garden_id, title, description, location, starts_at, ends_at, capacity, created_by, \
     (SELECT COUNT(*) FROM event_attendees a WHERE a.event_id = events.id) AS attendee_count, \
     created_at, updated_at";

pub const SORTABLE: &[&str] = &["title", "starts_at", "created_at"];

impl Event {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Event>(&format!("SELECT {COLUMNS} FROM events WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(
        pool: &SqlitePool,
        filter: &EventFilter,
        pagination: &Pagination,
    ) -> Result<Page<Self>, sqlx::Error> {
        fetch_page(
            pool,
            "events",
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
                if let Some(starts_after) = filter.starts_after {
                    conditions.next(qb);
                    qb.push("starts_at >= ").push_bind(starts_after);
                }
                if let Some(attendee_id) = filter.attendee_id {
                    conditions.next(qb);
                    qb.push("id IN (SELECT event_id FROM event_attendees WHERE user_id = ")
                        .push_bind(attendee_id)
                        .push(")");
                }
            },
            pagination,
        )
        .await
    }

    pub async fn create(
        pool: &SqlitePool,
        created_by: Uuid,
        data: &CreateEvent,
    ) -> Result<Self, sqlx::Error> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"INSERT INTO events (id, garden_id, title, description, location, starts_at, ends_at, capacity, created_by, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)"#,
        )
        .bind(id)
        .bind(data.garden_id)
        .bind(&data.title)
        .bind(&data.description)
        .bind(&data.location)
        .bind(data.starts_at)
        .bind(data.ends_at)
        .bind(data.capacity)
        .bind(created_by)
        .bind(Utc::now())
        .execute(pool)
        .await?;

        Self::find_by_id(pool, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateEvent,
    ) -> Result<Self, sqlx::Error> {
        let existing = Self::find_by_id(pool, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        let title = data.title.as_ref().unwrap_or(&existing.title);
        let description = data.description.as_ref().or(existing.description.as_ref());
        let location = data.location.as_ref().or(existing.location.as_ref());
        let starts_at = data.starts_at.unwrap_or(existing.starts_at);
        let ends_at = data.ends_at.or(existing.ends_at);
        let capacity = data.capacity.or(existing.capacity);

        sqlx::query(
            r#"UPDATE events
               SET title = $2, description = $3, location = $4, starts_at = $5, ends_at = $6,
                   capacity = $7, updated_at = $8
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(title)
        .bind(description)
        .bind(location)
        .bind(starts_at)
        .bind(ends_at)
        .bind(capacity)
        .bind(Utc::now())
        .execute(pool)
        .await?;

        Self::find_by_id(pool, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Register `user_id` as attending. Repeating an RSVP is a no-op, and a
    /// new RSVP against a full event fails with [`EventError::Full`].
    pub async fn rsvp(pool: &SqlitePool, id: Uuid, user_id: Uuid) -> Result<Self, EventError> {
        // Write lock up front: a deferred BEGIN can hit SQLITE_BUSY on upgrade.
        let mut tx = pool.begin_with("BEGIN IMMEDIATE").await?;

        let capacity: Option<Option<i64>> =
            sqlx::query_scalar("SELECT capacity FROM events WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let capacity = capacity.ok_or(EventError::NotFound)?;

        let already: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM event_attendees WHERE event_id = $1 AND user_id = $2)",
        )
        .bind(id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        if !already {
            let attending: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM event_attendees WHERE event_id = $1")
                    .bind(id)
                    .fetch_one(&mut *tx)
                    .await?;
            if capacity.is_some_and(|capacity| attending >= capacity) {
                return Err(EventError::Full);
            }

            sqlx::query(
                "INSERT INTO event_attendees (event_id, user_id, responded_at) VALUES ($1, $2, $3)",
            )
            .bind(id)
            .bind(user_id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Self::find_by_id(pool, id).await?.ok_or(EventError::NotFound)
    }

    pub async fn cancel_rsvp(
        pool: &SqlitePool,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Self, EventError> {
        sqlx::query("DELETE FROM event_attendees WHERE event_id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;
        Self::find_by_id(pool, id).await?.ok_or(EventError::NotFound)
    }

    pub async fn attendees(pool: &SqlitePool, id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM event_attendees WHERE event_id = $1 ORDER BY rowid ASC",
        )
        .bind(id)
        .fetch_all(pool)
        .await
    }
}
