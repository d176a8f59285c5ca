use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

/// Printable code that resolves to a plot.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QrCode {
    pub id: Uuid,
    pub plot_id: Uuid,
    pub code: String,
    pub created_by: Uuid,
    pub scan_count: i64,
    pub created_at: DateTime<Utc>,
}

const COLUMNS: &str = "id, plot_id, code, created_by, scan_count, created_at";

impl QrCode {
    pub async fn create(
        pool: &SqlitePool,
        plot_id: Uuid,
        created_by: Uuid,
        code: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, QrCode>(&format!(
            r#"INSERT INTO qr_codes (id, plot_id, code, created_by, scan_count, created_at)
               VALUES ($1, $2, $3, $4, 0, $5)
               RETURNING {COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(plot_id)
        .bind(code)
        .bind(created_by)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_code(pool: &SqlitePool, code: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, QrCode>(&format!("SELECT {COLUMNS} FROM qr_codes WHERE code = $1"))
            .bind(code)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_plot(pool: &SqlitePool, plot_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, QrCode>(&format!(
            "SELECT {COLUMNS} FROM qr_codes WHERE plot_id = $1 ORDER BY rowid ASC"
        ))
        .bind(plot_id)
        .fetch_all(pool)
        .await
    }

    /// Count a scan and return the updated code.
    pub async fn record_scan(pool: &SqlitePool, code: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, QrCode>(&format!(
            "UPDATE qr_codes SET scan_count = scan_count + 1 WHERE code = $1 RETURNING {COLUMNS}"
        ))
        .bind(code)
        .fetch_optional(pool)
        .await
    }
}
