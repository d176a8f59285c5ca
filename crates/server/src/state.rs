use std::sync::Arc;

use sqlx::SqlitePool;

use crate::{auth::JwtService, chat::ChatHub, config::ServerConfig};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<ServerConfig>,
    pub jwt: Arc<JwtService>,
    pub chat: ChatHub,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: ServerConfig) -> Self {
        let jwt = JwtService::new(Arc::clone(&config.jwt_secret), config.jwt_ttl);
        Self {
            pool,
            config: Arc::new(config),
            jwt: Arc::new(jwt),
            chat: ChatHub::default(),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn jwt(&self) -> Arc<JwtService> {
        Arc::clone(&self.jwt)
    }

    pub fn chat(&self) -> &ChatHub {
        &self.chat
    }
}
