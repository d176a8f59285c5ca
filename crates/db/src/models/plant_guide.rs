use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use utils::pagination::{Page, Pagination};
use uuid::Uuid;

use crate::listing::{fetch_page, like_pattern};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize, EnumString, Display, Default,
)]
#[sqlx(type_name = "water_needs", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WaterNeeds {
    Low,
    #[default]
    Medium,
    High,
}

/// Reference card for a crop.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PlantGuide {
    pub id: Uuid,
    pub name: String,
    pub scientific_name: Option<String>,
    pub description: Option<String>,
    pub sunlight: Option<String>,
    pub water_needs: WaterNeeds,
    pub planting_season: Option<String>,
    pub days_to_harvest: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePlantGuide {
    pub name: String,
    pub scientific_name: Option<String>,
    pub description: Option<String>,
    pub sunlight: Option<String>,
    pub water_needs: Option<WaterNeeds>,
    pub planting_season: Option<String>,
    pub days_to_harvest: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePlantGuide {
    pub name: Option<String>,
    pub scientific_name: Option<String>,
    pub description: Option<String>,
    pub sunlight: Option<String>,
    pub water_needs: Option<WaterNeeds>,
    pub planting_season: Option<String>,
    pub days_to_harvest: Option<i64>,
}

const COLUMNS: &str = "id, name, scientific_name, description, sunlight, water_needs, planting_season, days_to_harvest, created_at, updated_at";

pub const SORTABLE: &[&str] = &["name", "days_to_harvest", "created_at"];

impl PlantGuide {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, PlantGuide>(&format!(
            "SELECT {COLUMNS} FROM plant_guides WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Case-insensitive substring match on common and scientific names.
    pub async fn search(
        pool: &SqlitePool,
        query: Option<&str>,
        pagination: &Pagination,
    ) -> Result<Page<Self>, sqlx::Error> {
        let pattern = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| like_pattern(&q.to_lowercase()));

        fetch_page(
            pool,
            "plant_guides",
            COLUMNS,
            |qb| {
                if let Some(pattern) = &pattern {
                    qb.push(" WHERE lower(name) LIKE ")
                        .push_bind(pattern.clone())
                        .push(" ESCAPE '\\' OR lower(coalesce(scientific_name, '')) LIKE ")
                        .push_bind(pattern.clone())
                        .push(" ESCAPE '\\'");
                }
            },
            pagination,
        )
        .await
    }

    pub async fn create(pool: &SqlitePool, data: &CreatePlantGuide) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, PlantGuide>(&format!(
            r#"INSERT INTO plant_guides (id, name, scientific_name, description, sunlight, water_needs, planting_season, days_to_harvest, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
               RETURNING {COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(&data.name)
        .bind(&data.scientific_name)
        .bind(&data.description)
        .bind(&data.sunlight)
        .bind(data.water_needs.unwrap_or_default())
        .bind(&data.planting_season)
        .bind(data.days_to_harvest)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdatePlantGuide,
    ) -> Result<Self, sqlx::Error> {
        let existing = Self::find_by_id(pool, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        sqlx::query_as::<_, PlantGuide>(&format!(
            r#"UPDATE plant_guides
               SET name = $2, scientific_name = $3, description = $4, sunlight = $5,
                   water_needs = $6, planting_season = $7, days_to_harvest = $8, updated_at = $9
               WHERE id = $1
               RETURNING {COLUMNS}"#
        ))
        .bind(id)
        .bind(data.name.as_ref().unwrap_or(&existing.name))
        .bind(data.scientific_name.as_ref().or(existing.scientific_name.as_ref()))
        .bind(data.description.as_ref().or(existing.description.as_ref()))
        .bind(data.sunlight.as_ref().or(existing.sunlight.as_ref()))
        .bind(data.water_needs.unwrap_or(existing.water_needs))
        .bind(data.planting_season.as_ref().or(existing.planting_season.as_ref()))
        .bind(data.days_to_harvest.or(existing.days_to_harvest))
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM plant_guides WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
