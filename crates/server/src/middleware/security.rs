//! Hardened response headers and development-only error detail.

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderName, HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::{AppState, error::ErrorReport};

const HSTS_VALUE: &str = "max-age=15552000; includeSubDomains";

/// Header layers applied to every response. HSTS only goes out in production.
pub fn security_header_layers(production: bool) -> Vec<SetResponseHeaderLayer<HeaderValue>> {
    let mut layers = vec![
        header_layer(header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        header_layer(header::X_FRAME_OPTIONS, "DENY"),
        header_layer(header::REFERRER_POLICY, "no-referrer"),
        header_layer(header::X_XSS_PROTECTION, "0"),
    ];
    if production {
        layers.push(header_layer(header::STRICT_TRANSPORT_SECURITY, HSTS_VALUE));
    }
    layers
}

fn header_layer(name: HeaderName, value: &'static str) -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::if_not_present(name, HeaderValue::from_static(value))
}

/// In development, rewrite error bodies to carry the debug chain as `stack`.
pub async fn attach_error_stack(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    if !state.config.is_development() {
        return response;
    }

    let Some(report) = response.extensions().get::<ErrorReport>().cloned() else {
        return response;
    };

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(header::CONTENT_LENGTH);
    let body = report.body.with_stack(report.detail);
    let mut rebuilt = (parts.status, Json(body)).into_response();
    for (name, value) in parts.headers.iter() {
        rebuilt.headers_mut().insert(name.clone(), value.clone());
    }
    rebuilt
}
