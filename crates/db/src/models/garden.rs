//! Gardens and their membership roster.
//!
//! Every garden has exactly one owner, recorded both on the garden row and as
//! an `owner` membership so roster queries see a single source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use utils::pagination::{Page, Pagination};
use uuid::Uuid;

use crate::listing::{Conditions, fetch_page, like_pattern};

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Garden {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub location: String,
    pub size_sqm: Option<f64>,
    pub owner_id: Uuid,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateGarden {
    pub name: String,
    pub description: Option<String>,
    pub location: String,
    pub size_sqm: Option<f64>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateGarden {
    pub name: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub size_sqm: Option<f64>,
    pub is_public: Option<bool>,
}

/// Role of a user inside one garden. `SecondAdmin` manages the garden without owning it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize, EnumString, Display, Default,
)]
#[sqlx(type_name = "garden_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GardenRole {
    Owner,
    SecondAdmin,
    #[default]
    Member,
}

impl GardenRole {
    pub fn can_manage(self) -> bool {
        matches!(self, GardenRole::Owner | GardenRole::SecondAdmin)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct GardenMember {
    pub garden_id: Uuid,
    pub user_id: Uuid,
    pub role: GardenRole,
    pub joined_at: DateTime<Utc>,
}

/// Roster row with the member's display fields.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct GardenMemberProfile {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: GardenRole,
    pub joined_at: DateTime<Utc>,
}

/// A garden as seen from one member's side.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Membership {
    pub garden_id: Uuid,
    pub garden_name: String,
    pub role: GardenRole,
}

const COLUMNS: &str =
    "id, name, description, location, size_sqm, owner_id, is_public, created_at, updated_at";

pub const SORTABLE: &[&str] = &["name", "location", "created_at", "updated_at"];

#[derive(Debug, Clone, Default)]
pub struct GardenFilter {
    /// Restrict to gardens that are public or that this user belongs to.
    pub visible_to: Option<Uuid>,
    pub owner_id: Option<Uuid>,
    pub search: Option<String>,
}

impl Garden {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Garden>(&format!("SELECT {COLUMNS} FROM gardens WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(
        pool: &SqlitePool,
        filter: &GardenFilter,
        pagination: &Pagination,
    ) -> Result<Page<Self>, sqlx::Error> {
        fetch_page(
            pool,
            "gardens",
            COLUMNS,
            |qb| {
                let mut conditions = Conditions::default();
                if let Some(user_id) = filter.visible_to {
                    conditions.next(qb);
                    qb.push("(is_public = 1 OR id IN (SELECT garden_id FROM garden_members WHERE user_id = ")
                        .push_bind(user_id)
                        .push("))");
                }
                if let Some(owner_id) = filter.owner_id {
                    conditions.next(qb);
                    qb.push("owner_id = ").push_bind(owner_id);
                }
                if let Some(search) = &filter.search {
                    conditions.next(qb);
                    let pattern = like_pattern(search);
                    qb.push("(name LIKE ")
                        .push_bind(pattern.clone())
                        .push(" ESCAPE '\\' OR location LIKE ")
                        .push_bind(pattern)
                        .push(" ESCAPE '\\')");
                }
            },
            pagination,
        )
        .await
    }

    /// Insert the garden and its owner membership in one transaction.
    pub async fn create(
        pool: &SqlitePool,
        owner_id: Uuid,
        data: &CreateGarden,
    ) -> Result<Self, sqlx::Error> {
        let now = Utc::now();
        let mut tx = pool.begin().await?;

        let garden = sqlx::query_as::<_, Garden>(&format!(
            r#"INSERT INTO gardens (id, name, description, location, size_sqm, owner_id, is_public, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
               RETURNING {COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(&data.name)
        .bind(&data.description)
        .bind(&data.location)
        .bind(data.size_sqm)
        .bind(owner_id)
        .bind(data.is_public.unwrap_or(true))
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO garden_members (garden_id, user_id, role, joined_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(garden.id)
        .bind(owner_id)
        .bind(GardenRole::Owner)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(garden)
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateGarden,
    ) -> Result<Self, sqlx::Error> {
        let existing = Self::find_by_id(pool, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        let name = data.name.as_ref().unwrap_or(&existing.name);
        let description = data.description.as_ref().or(existing.description.as_ref());
        let location = data.location.as_ref().unwrap_or(&existing.location);
        let size_sqm = data.size_sqm.or(existing.size_sqm);
        let is_public = data.is_public.unwrap_or(existing.is_public);

        sqlx::query_as::<_, Garden>(&format!(
            r#"UPDATE gardens
               SET name = $2, description = $3, location = $4, size_sqm = $5, is_public = $6, updated_at = $7
               WHERE id = $1
               RETURNING {COLUMNS}"#
        ))
        .bind(id)
        .bind(name)
        .bind(description)
        .bind(location)
        .bind(size_sqm)
        .bind(is_public)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM gardens WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

impl GardenMember {
    pub async fn find(
        pool: &SqlitePool,
        garden_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, GardenMember>(
            r#"SELECT garden_id, user_id, role, joined_at
               FROM garden_members
               WHERE garden_id = $1 AND user_id = $2"#,
        )
        .bind(garden_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn list_profiles(
        pool: &SqlitePool,
        garden_id: Uuid,
    ) -> Result<Vec<GardenMemberProfile>, sqlx::Error> {
        sqlx::query_as::<_, GardenMemberProfile>(
            r#"SELECT gm.user_id, u.name, u.email, gm.role, gm.joined_at
               FROM garden_members gm
               INNER JOIN users u ON u.id = gm.user_id
               WHERE gm.garden_id = $1
               ORDER BY gm.rowid ASC"#,
        )
        .bind(garden_id)
        .fetch_all(pool)
        .await
    }

    pub async fn memberships_for_user(
        pool: &SqlitePool,
        user_id: Uuid,
    ) -> Result<Vec<Membership>, sqlx::Error> {
        sqlx::query_as::<_, Membership>(
            r#"SELECT gm.garden_id, g.name AS garden_name, gm.role
               FROM garden_members gm
               INNER JOIN gardens g ON g.id = gm.garden_id
               WHERE gm.user_id = $1
               ORDER BY gm.rowid ASC"#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    pub async fn add(
        pool: &SqlitePool,
        garden_id: Uuid,
        user_id: Uuid,
        role: GardenRole,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, GardenMember>(
            r#"INSERT INTO garden_members (garden_id, user_id, role, joined_at)
               VALUES ($1, $2, $3, $4)
               RETURNING garden_id, user_id, role, joined_at"#,
        )
        .bind(garden_id)
        .bind(user_id)
        .bind(role)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn update_role(
        pool: &SqlitePool,
        garden_id: Uuid,
        user_id: Uuid,
        role: GardenRole,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, GardenMember>(
            r#"UPDATE garden_members SET role = $3
               WHERE garden_id = $1 AND user_id = $2
               RETURNING garden_id, user_id, role, joined_at"#,
        )
        .bind(garden_id)
        .bind(user_id)
        .bind(role)
        .fetch_optional(pool)
        .await?
        .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn remove(
        pool: &SqlitePool,
        garden_id: Uuid,
        user_id: Uuid,
    ) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM garden_members WHERE garden_id = $1 AND user_id = $2")
                .bind(garden_id)
                .bind(user_id)
                .execute(pool)
                .await?;
        Ok(result.rows_affected())
    }
}
