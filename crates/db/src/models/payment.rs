use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use thiserror::Error;
use utils::pagination::{Page, Pagination};
use uuid::Uuid;

use crate::listing::{Conditions, fetch_page};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize, EnumString, Display, Default,
)]
#[sqlx(type_name = "currency", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Currency {
    #[default]
    Usd,
    Eur,
    Gbp,
    Cad,
    Aud,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize, EnumString, Display)]
#[sqlx(type_name = "payment_purpose", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentPurpose {
    PlotFee,
    Membership,
    Donation,
    Event,
    Other,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize, EnumString, Display, Default,
)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    /// `pending` settles to `completed` or `failed`; only `completed` can be refunded.
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Pending, PaymentStatus::Completed)
                | (PaymentStatus::Pending, PaymentStatus::Failed)
                | (PaymentStatus::Completed, PaymentStatus::Refunded)
        )
    }
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment not found")]
    NotFound,
    #[error("cannot move payment from {from} to {to}")]
    InvalidTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub garden_id: Option<Uuid>,
    pub plot_id: Option<Uuid>,
    /// Minor currency units.
    pub amount_cents: i64,
    pub currency: Currency,
    pub purpose: PaymentPurpose,
    pub status: PaymentStatus,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePayment {
    pub garden_id: Option<Uuid>,
    pub plot_id: Option<Uuid>,
    pub amount_cents: i64,
    pub currency: Option<Currency>,
    pub purpose: PaymentPurpose,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub user_id: Option<Uuid>,
    pub garden_id: Option<Uuid>,
    pub status: Option<PaymentStatus>,
}

const COLUMNS: &str = "id, user_id, garden_id, plot_id, amount_cents, currency, purpose, status, reference, created_at, updated_at";

pub const SORTABLE: &[&str] = &["amount_cents", "status", "created_at", "updated_at"];

impl Payment {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Payment>(&format!("SELECT {COLUMNS} FROM payments WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(
        pool: &SqlitePool,
        filter: &PaymentFilter,
        pagination: &Pagination,
    ) -> Result<Page<Self>, sqlx::Error> {
        fetch_page(
            pool,
            "payments",
            COLUMNS,
            |qb| {
                let mut conditions = Conditions::default();
                if let Some(user_id) = filter.user_id {
                    conditions.next(qb);
                    qb.push("user_id = ").push_bind(user_id);
                }
                if let Some(garden_id) = filter.garden_id {
                    conditions.next(qb);
                    qb.push("garden_id = ").push_bind(garden_id);
                }
                if let Some(status) = filter.status {
                    conditions.next(qb);
                    qb.push("status = ").push_bind(status);
                }
            },
            pagination,
        )
        .await
    }

    pub async fn create(
        pool: &SqlitePool,
        user_id: Uuid,
        data: &CreatePayment,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Payment>(&format!(
            r#"INSERT INTO payments (id, user_id, garden_id, plot_id, amount_cents, currency, purpose, status, reference, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
               RETURNING {COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(data.garden_id)
        .bind(data.plot_id)
        .bind(data.amount_cents)
        .bind(data.currency.unwrap_or_default())
        .bind(data.purpose)
        .bind(PaymentStatus::Pending)
        .bind(&data.reference)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    /// Move a payment to `next`, rejecting transitions the lifecycle does not allow.
    pub async fn update_status(
        pool: &SqlitePool,
        id: Uuid,
        next: PaymentStatus,
    ) -> Result<Self, PaymentError> {
        let existing = Self::find_by_id(pool, id)
            .await?
            .ok_or(PaymentError::NotFound)?;

        if !existing.status.can_transition_to(next) {
            return Err(PaymentError::InvalidTransition {
                from: existing.status,
                to: next,
            });
        }

        // Guard on the old status so a concurrent transition cannot be overwritten.
        sqlx::query_as::<_, Payment>(&format!(
            r#"UPDATE payments SET status = $2, updated_at = $3
               WHERE id = $1 AND status = $4
               RETURNING {COLUMNS}"#
        ))
        .bind(id)
        .bind(next)
        .bind(Utc::now())
        .bind(existing.status)
        .fetch_optional(pool)
        .await?
        .ok_or(PaymentError::InvalidTransition {
            from: existing.status,
            to: next,
        })
    }
}
