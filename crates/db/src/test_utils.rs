//! Test pools backed by a throwaway SQLite file.
//!
//! Migrations run once against a template database. Each test then gets its
//! own copy of that file, which is much faster than migrating per test.

use std::{str::FromStr, sync::OnceLock, time::Duration};

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use tempfile::TempDir;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::{
    DBService,
    models::{
        garden::{CreateGarden, Garden},
        user::{CreateUser, User, UserRole},
    },
};

static TEMPLATE_DIR: OnceLock<TempDir> = OnceLock::new();
static TEMPLATE_READY: OnceCell<()> = OnceCell::const_new();

fn template_dir() -> &'static TempDir {
    TEMPLATE_DIR.get_or_init(|| TempDir::new().expect("Failed to create template temp dir"))
}

fn connect_options(path: &std::path::Path) -> SqliteConnectOptions {
    SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
        .expect("Invalid test database URL")
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
}

async fn ensure_template_ready() {
    TEMPLATE_READY
        .get_or_init(|| async {
            let template_path = template_dir().path().join("template.db");
            let pool = SqlitePoolOptions::new()
                .min_connections(0)
                .max_connections(1)
                .connect_with(connect_options(&template_path))
                .await
                .expect("Failed to create template pool");

            DBService::migrate(&pool)
                .await
                .expect("Failed to run migrations on template");

            // Closing checkpoints the WAL so the copy below is complete.
            pool.close().await;
            tracing::debug!("Template database ready at {:?}", template_path);
        })
        .await;
}

/// Create a migrated pool. Keep the returned `TempDir` alive for the test's duration.
pub async fn create_test_pool() -> (SqlitePool, TempDir) {
    ensure_template_ready().await;

    let temp_dir = TempDir::new().expect("Failed to create test temp dir");
    let db_path = temp_dir.path().join("test.db");
    std::fs::copy(template_dir().path().join("template.db"), &db_path)
        .expect("Failed to copy template database");

    let pool = SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(connect_options(&db_path))
        .await
        .expect("Failed to create test pool");

    (pool, temp_dir)
}

/// Insert a user with a placeholder password hash.
pub async fn seed_user(pool: &SqlitePool, name: &str, role: UserRole) -> User {
    let data = CreateUser {
        name: name.to_string(),
        email: format!("{}-{}@example.test", name.to_lowercase(), Uuid::new_v4()),
        password_hash: "not-a-real-hash".to_string(),
        role,
    };
    User::create(pool, &data)
        .await
        .expect("Failed to create test user")
}

/// Insert a public garden owned by `owner_id`.
pub async fn seed_garden(pool: &SqlitePool, owner_id: Uuid, name: &str) -> Garden {
    let data = CreateGarden {
        name: name.to_string(),
        description: None,
        location: "Riverside".to_string(),
        size_sqm: Some(400.0),
        is_public: Some(true),
    };
    Garden::create(pool, owner_id, &data)
        .await
        .expect("Failed to create test garden")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_test_pool() {
        let (pool, _temp_dir) = create_test_pool().await;

        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM gardens")
            .fetch_one(&pool)
            .await
            .expect("Failed to query gardens table");

        assert_eq!(result.0, 0);
    }

    #[tokio::test]
    async fn test_template_reuse() {
        let (pool1, _temp1) = create_test_pool().await;
        let (pool2, _temp2) = create_test_pool().await;

        seed_user(&pool1, "Ada", UserRole::User).await;

        let in_first: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&pool1)
            .await
            .expect("Pool 1 should work");
        let in_second: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&pool2)
            .await
            .expect("Pool 2 should work");

        assert_eq!(in_first.0, 1);
        assert_eq!(in_second.0, 0);
    }

    #[tokio::test]
    async fn test_foreign_keys_enforced() {
        let (pool, _temp_dir) = create_test_pool().await;

        let result = sqlx::query(
            "INSERT INTO plots (id, garden_id, name, status, created_at, updated_at) \
             VALUES ($1, $2, 'Bed 1', 'available', datetime('now'), datetime('now'))",
        )
        .bind(Uuid::new_v4())
        .bind(Uuid::new_v4())
        .execute(&pool)
        .await;

        assert!(result.is_err(), "orphan plot should violate the garden foreign key");
    }
}
