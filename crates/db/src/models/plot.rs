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
#[sqlx(type_name = "plot_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PlotStatus {
    #[default]
    Available,
    Assigned,
    Maintenance,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Plot {
    pub id: Uuid,
    pub garden_id: Uuid,
    pub name: String,
    pub size_sqm: Option<f64>,
    pub soil_type: Option<String>,
    pub status: PlotStatus,
    pub assigned_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePlot {
    pub name: String,
    pub size_sqm: Option<f64>,
    pub soil_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePlot {
    pub name: Option<String>,
    pub size_sqm: Option<f64>,
    pub soil_type: Option<String>,
    pub status: Option<PlotStatus>,
}

const COLUMNS: &str =
    "id, garden_id, name, size_sqm, soil_type, status, assigned_to, created_at, updated_at";

pub const SORTABLE: &[&str] = &["name", "status", "size_sqm", "created_at"];

impl Plot {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Plot>(&format!("SELECT {COLUMNS} FROM plots WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_garden(
        pool: &SqlitePool,
        garden_id: Uuid,
        status: Option<PlotStatus>,
        pagination: &Pagination,
    ) -> Result<Page<Self>, sqlx::Error> {
        fetch_page(
            pool,
            "plots",
            COLUMNS,
            |qb| {
                qb.push(" WHERE garden_id = ").push_bind(garden_id);
                if let Some(status) = status {
                    qb.push(" AND status = ").push_bind(status);
                }
            },
            pagination,
        )
        .await
    }

    pub async fn create(
        pool: &SqlitePool,
        garden_id: Uuid,
        data: &CreatePlot,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Plot>(&format!(
            r#"INSERT INTO plots (id, garden_id, name, size_sqm, soil_type, status, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
               RETURNING {COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(garden_id)
        .bind(&data.name)
        .bind(data.size_sqm)
        .bind(&data.soil_type)
        .bind(PlotStatus::Available)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdatePlot,
    ) -> Result<Self, sqlx::Error> {
        let existing = Self::find_by_id(pool, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        let name = data.name.as_ref().unwrap_or(&existing.name);
        let size_sqm = data.size_sqm.or(existing.size_sqm);
        let soil_type = data.soil_type.as_ref().or(existing.soil_type.as_ref());
        let status = data.status.unwrap_or(existing.status);

        sqlx::query_as::<_, Plot>(&format!(
            r#"UPDATE plots
               SET name = $2, size_sqm = $3, soil_type = $4, status = $5, updated_at = $6
               WHERE id = $1
               RETURNING {COLUMNS}"#
        ))
        .bind(id)
        .bind(name)
        .bind(size_sqm)
        .bind(soil_type)
        .bind(status)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    /// Hand the plot to `user_id`, replacing any previous assignee.
    pub async fn assign(pool: &SqlitePool, id: Uuid, user_id: Uuid) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Plot>(&format!(
            r#"UPDATE plots
               SET assigned_to = $2, status = $3, updated_at = $4
               WHERE id = $1
               RETURNING {COLUMNS}"#
        ))
        .bind(id)
        .bind(user_id)
        .bind(PlotStatus::Assigned)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await?
        .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn release(pool: &SqlitePool, id: Uuid) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Plot>(&format!(
            r#"UPDATE plots
               SET assigned_to = NULL, status = $2, updated_at = $3
               WHERE id = $1
               RETURNING {COLUMNS}"#
        ))
        .bind(id)
        .bind(PlotStatus::Available)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await?
        .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM plots WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
