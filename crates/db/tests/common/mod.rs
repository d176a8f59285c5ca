//! Shared setup for the database integration tests.

#![allow(dead_code)]

use std::str::FromStr;

use db::{
    DBService,
    models::{
        garden::{CreateGarden, Garden},
        user::{CreateUser, User, UserRole},
    },
};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
};
use tempfile::TempDir;

/// Create a file-backed SQLite pool with migrations applied.
pub async fn setup_test_pool() -> (SqlitePool, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.db");

    let options =
        SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.to_string_lossy()))
            .expect("Invalid database URL")
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePool::connect_with(options)
        .await
        .expect("Failed to create pool");

    DBService::migrate(&pool)
        .await
        .expect("Failed to run migrations");

    (pool, temp_dir)
}

pub async fn create_user(pool: &SqlitePool, name: &str) -> User {
    create_user_with_role(pool, name, UserRole::User).await
}

pub async fn create_user_with_role(pool: &SqlitePool, name: &str, role: UserRole) -> User {
    let data = CreateUser {
        name: name.to_string(),
        email: format!("{}@example.test", name.to_lowercase()),
        password_hash: "hash".to_string(),
        role,
    };
    User::create(pool, &data)
        .await
        .expect("Failed to create test user")
}

pub async fn create_garden(pool: &SqlitePool, owner: &User, name: &str, is_public: bool) -> Garden {
    let data = CreateGarden {
        name: name.to_string(),
        description: Some("Shared beds by the river".to_string()),
        location: "Riverside".to_string(),
        size_sqm: Some(250.0),
        is_public: Some(is_public),
    };
    Garden::create(pool, owner.id, &data)
        .await
        .expect("Failed to create test garden")
}
