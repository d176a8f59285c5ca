use axum::{Router, extract::State, response::Json, routing::get};
use db::DBService;
use serde::Serialize;
use utils::build_info::BUILD_INFO;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub git_commit: &'static str,
    pub build_timestamp: &'static str,
    pub environment: &'static str,
    pub database_ready: bool,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// Reports `degraded` rather than failing when the database is unreachable.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database_ready = DBService::ping(state.pool()).await;

    Json(HealthResponse {
        status: if database_ready { "ok" } else { "degraded" },
        version: BUILD_INFO.version,
        git_commit: BUILD_INFO.git_commit,
        build_timestamp: BUILD_INFO.build_timestamp,
        environment: if state.config().is_production() {
            "production"
        } else {
            "development"
        },
        database_ready,
    })
}
