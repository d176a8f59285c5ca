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
#[sqlx(type_name = "watering_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WateringMethod {
    #[default]
    Manual,
    Sprinkler,
    Drip,
    Rain,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WaterLog {
    pub id: Uuid,
    pub plot_id: Uuid,
    pub user_id: Uuid,
    pub amount_liters: f64,
    pub method: WateringMethod,
    pub notes: Option<String>,
    pub watered_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateWaterLog {
    pub amount_liters: f64,
    pub method: Option<WateringMethod>,
    pub notes: Option<String>,
    /// Defaults to now.
    pub watered_at: Option<DateTime<Utc>>,
}

const COLUMNS: &str = "id, plot_id, user_id, amount_liters, method, notes, watered_at, created_at";

pub const SORTABLE: &[&str] = &["watered_at", "amount_liters", "created_at"];

impl WaterLog {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, WaterLog>(&format!("SELECT {COLUMNS} FROM water_logs WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_plot(
        pool: &SqlitePool,
        plot_id: Uuid,
        pagination: &Pagination,
    ) -> Result<Page<Self>, sqlx::Error> {
        fetch_page(
            pool,
            "water_logs",
            COLUMNS,
            |qb| {
                qb.push(" WHERE plot_id = ").push_bind(plot_id);
            },
            pagination,
        )
        .await
    }

    pub async fn create(
        pool: &SqlitePool,
        plot_id: Uuid,
        user_id: Uuid,
        data: &CreateWaterLog,
    ) -> Result<Self, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as::<_, WaterLog>(&format!(
            r#"INSERT INTO water_logs (id, plot_id, user_id, amount_liters, method, notes, watered_at, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               RETURNING {COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(plot_id)
        .bind(user_id)
        .bind(data.amount_liters)
        .bind(data.method.unwrap_or_default())
        .bind(&data.notes)
        .bind(data.watered_at.unwrap_or(now))
        .bind(now)
        .fetch_one(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM water_logs WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
