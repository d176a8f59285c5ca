use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, Request, header, header::HeaderName},
    middleware::from_fn_with_state,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::{DefaultOnFailure, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, field};

use crate::{
    AppState,
    auth::require_auth,
    chat,
    config::ServerConfig,
    error::ApiError,
    middleware::{attach_error_stack, security_header_layers},
};

pub mod access;
pub mod activity;
pub mod audit_logs;
pub mod auth;
pub mod documents;
pub mod events;
pub mod gardens;
pub mod health;
pub mod notifications;
pub mod payments;
pub mod plant_guides;
pub mod plots;
pub mod posts;
pub mod tasks;
pub mod users;

pub fn router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            let request_id = request
                .extensions()
                .get::<RequestId>()
                .and_then(|id| id.header_value().to_str().ok());
            let span = tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = field::Empty
            );
            if let Some(request_id) = request_id {
                span.record("request_id", field::display(request_id));
            }
            span
        })
        .on_response(DefaultOnResponse::new().level(Level::INFO))
        .on_failure(DefaultOnFailure::new().level(Level::ERROR));

    let public = Router::<AppState>::new()
        .merge(health::router())
        .merge(auth::public_router());

    let protected = Router::<AppState>::new()
        .merge(auth::protected_router())
        .merge(users::router())
        .merge(gardens::router(&state))
        .merge(plots::router(&state))
        .merge(tasks::router(&state))
        .merge(events::router(&state))
        .merge(plant_guides::router())
        .merge(documents::router(&state))
        .merge(payments::router())
        .merge(notifications::router())
        .merge(audit_logs::router())
        .merge(posts::router(&state))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let mut app = Router::<AppState>::new()
        .nest("/api", public.merge(protected))
        .merge(chat::router())
        .fallback(route_not_found)
        .layer(from_fn_with_state(state.clone(), attach_error_stack))
        .layer(DefaultBodyLimit::max(state.config().body_limit_bytes));

    for header_layer in security_header_layers(state.config().is_production()) {
        app = app.layer(header_layer);
    }

    app.layer(cors_layer(state.config()))
        .layer(trace_layer)
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            "x-request-id",
        )))
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static("x-request-id"),
            MakeRequestUuid {},
        ))
        .with_state(state)
}

async fn route_not_found() -> ApiError {
    ApiError::NotFound("Route not found".to_string())
}

/// Permissive unless origins are configured; a restricted list allows cookies.
fn cors_layer(config: &ServerConfig) -> CorsLayer {
    if config.cors_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::warn!(%origin, ?error, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}
