use anyhow::{Context, Error as AnyhowError};
use db::{DBService, DbInitError};
use server::{
    AppState,
    config::{ConfigError, ServerConfig},
    file_logging, routes,
};
use thiserror::Error;
use utils::build_info::BUILD_INFO;

#[derive(Debug, Error)]
pub enum GardenServerError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Database(#[from] DbInitError),
    #[error(transparent)]
    Other(#[from] AnyhowError),
}

#[tokio::main]
async fn main() -> Result<(), GardenServerError> {
    dotenvy::dotenv().ok();

    let config = ServerConfig::from_env()?;
    let _file_log_guard = file_logging::init_logging(&config.log_level);

    let db = DBService::new(&config.database_url).await?;
    let bind_addr = config.bind_addr();
    let environment = if config.is_production() {
        "production"
    } else {
        "development"
    };

    let state = AppState::new(db.pool.clone(), config);
    let app_router = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    let local_addr = listener.local_addr()?;
    tracing::info!(
        version = BUILD_INFO.version,
        git_commit = BUILD_INFO.git_commit,
        environment,
        "Server running on http://{local_addr}"
    );

    axum::serve(listener, app_router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Closing database connection pool...");
    db.pool.close().await;
    tracing::info!("Database connection pool closed");

    Ok(())
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let terminate = async {
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
            } else {
                tracing::error!("Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }
}
