pub mod auth;
pub mod chat;
pub mod config;
pub mod error;
pub mod file_logging;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod validation;

pub use state::AppState;
